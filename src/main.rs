use clap::Parser;
use prop_engine::cli::{Cli, Commands};
use prop_engine::config::Config;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing file means defaults; a broken one is an error
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Warning: {} not found, using default configuration", cli.config);
        Config::default()
    };

    let _telemetry = prop_engine::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(config)?;
        }
        Commands::Run(args) => {
            tracing::info!("Starting paper trading mode");
            args.execute(config).await?;
        }
        Commands::CheckConfig => {
            println!("Configuration OK: {}", cli.config);
            println!(
                "  Account: balance={} contract={} lot_step={}",
                config.account.start_balance, config.account.contract_size, config.account.lot_step
            );
            println!(
                "  Prop: daily_dd={}% total_dd={}% (margin {}%) risk={}% max_positions={} max_open_risk={}% max_daily_trades={}",
                config.prop.max_daily_dd_pct,
                config.prop.max_total_dd_pct,
                config.prop.dd_safety_margin_pct,
                config.prop.risk_per_trade_pct,
                config.prop.max_positions,
                config.prop.max_open_risk_pct,
                config.prop.max_daily_trades
            );
            println!(
                "  Execution: max_spread={}xATR max_slippage={}xATR min_bb_width={}",
                config.execution.max_spread_atr,
                config.execution.max_slippage_atr,
                config.execution.min_bb_width
            );
            println!(
                "  Manager: {} trailing tiers, roi={}, giveback={}, deadfish={}, time_stop={} bars",
                config.manager.trailing_tiers.len(),
                config.manager.roi.enabled,
                config.manager.giveback.enabled,
                config.manager.deadfish.enabled,
                config.manager.time_stop.max_bars
            );
        }
    }

    Ok(())
}
