//! Backtest analytics and reporting

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::audit::AuditStats;
use crate::position::Position;

/// Account equity after a bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub equity: Decimal,
}

/// Summary statistics from backtest
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub start_balance: Decimal,
    pub end_balance: Decimal,
    /// Realized P&L
    pub net_pnl: Decimal,
    /// Net P&L as percent of the start balance
    pub return_pct: Decimal,
    /// Total number of closed trades
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Win rate percentage
    pub win_rate: Decimal,
    /// Mean result in R
    pub expectancy_r: Decimal,
    /// Sum of results in R
    pub total_r: Decimal,
    pub avg_win_r: Decimal,
    pub avg_loss_r: Decimal,
    /// Gross profit over gross loss; None without losing trades
    pub profit_factor: Option<Decimal>,
    /// Largest peak-to-trough equity drop in cash
    pub max_drawdown: Decimal,
    /// Largest peak-to-trough equity drop in percent of the peak
    pub max_drawdown_pct: Decimal,
    /// Deepest intraday drawdown against the day's start balance (negative)
    pub worst_daily_dd_pct: Decimal,
    pub signals_accepted: usize,
    pub signals_rejected: usize,
    pub exits_by_kind: BTreeMap<&'static str, usize>,
    pub rejections_by_reason: BTreeMap<&'static str, usize>,
    pub verdicts: BTreeMap<&'static str, usize>,
    /// Counterfactuals still open when the data ended
    pub unresolved_counterfactuals: usize,
}

/// Complete backtest results
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    /// Summary statistics
    pub summary: BacktestSummary,
    /// Closed positions in exit order
    pub trades: Vec<Position>,
    pub equity_curve: Vec<EquityPoint>,
    pub stats: AuditStats,
}

impl BacktestSummary {
    pub fn compute(
        start_balance: Decimal,
        trades: &[Position],
        equity_curve: &[EquityPoint],
        worst_daily_dd_pct: Decimal,
        stats: &AuditStats,
        unresolved_counterfactuals: usize,
    ) -> Self {
        let results: Vec<Decimal> = trades.iter().filter_map(Position::result_r).collect();
        let pnls: Vec<Decimal> = trades.iter().filter_map(Position::realized_pnl).collect();

        let wins: Vec<Decimal> = results.iter().copied().filter(|r| *r > Decimal::ZERO).collect();
        let losses: Vec<Decimal> = results.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
        let total_r: Decimal = results.iter().sum();
        let net_pnl: Decimal = pnls.iter().sum();

        let gross_profit: Decimal = pnls.iter().filter(|p| **p > Decimal::ZERO).sum();
        let gross_loss: Decimal = pnls
            .iter()
            .filter(|p| **p < Decimal::ZERO)
            .map(|p| p.abs())
            .sum();

        let (max_drawdown, max_drawdown_pct) = max_drawdown(start_balance, equity_curve);

        Self {
            start_balance,
            end_balance: start_balance + net_pnl,
            net_pnl,
            return_pct: ratio_pct(net_pnl, start_balance),
            total_trades: results.len(),
            wins: wins.len(),
            losses: losses.len(),
            win_rate: ratio_pct(Decimal::from(wins.len()), Decimal::from(results.len())),
            expectancy_r: mean(&results),
            total_r,
            avg_win_r: mean(&wins),
            avg_loss_r: mean(&losses),
            profit_factor: (gross_loss > Decimal::ZERO).then(|| gross_profit / gross_loss),
            max_drawdown,
            max_drawdown_pct,
            worst_daily_dd_pct,
            signals_accepted: stats.accepted,
            signals_rejected: stats.rejected,
            exits_by_kind: stats.exits.clone(),
            rejections_by_reason: stats.rejections.clone(),
            verdicts: stats.verdicts.clone(),
            unresolved_counterfactuals,
        }
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let profit_factor = self
            .profit_factor
            .map_or_else(|| "n/a".to_string(), |pf| format!("{:.2}", pf));

        let mut out = format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Net P&L:          {:+.2} ({:+.2}%)
End Balance:      {:.2}
Total R:          {:+.2}
Expectancy:       {:+.3}R
Win Rate:         {:.1}% ({} W / {} L)
Avg Win / Loss:   {:+.2}R / {:+.2}R
Profit Factor:    {}
Max Drawdown:     {:.2} ({:.2}%)
Worst Daily DD:   {:.2}%

ACTIVITY
───────────────────────────────────────────────────────
Total Trades:     {}
Signals:          {} accepted / {} rejected
"#,
            self.net_pnl,
            self.return_pct,
            self.end_balance,
            self.total_r,
            self.expectancy_r,
            self.win_rate,
            self.wins,
            self.losses,
            self.avg_win_r,
            self.avg_loss_r,
            profit_factor,
            self.max_drawdown,
            self.max_drawdown_pct,
            self.worst_daily_dd_pct,
            self.total_trades,
            self.signals_accepted,
            self.signals_rejected,
        );

        section(&mut out, "EXITS", &self.exits_by_kind);
        section(&mut out, "REJECTIONS", &self.rejections_by_reason);
        section(&mut out, "COUNTERFACTUALS", &self.verdicts);
        if self.unresolved_counterfactuals > 0 {
            let _ = writeln!(out, "  {:<16}{}", "unresolved", self.unresolved_counterfactuals);
        }
        out.push_str("══════════════════════════════════════════════════════\n");
        out
    }
}

fn section(out: &mut String, title: &str, counts: &BTreeMap<&'static str, usize>) {
    if counts.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}", title);
    out.push_str("───────────────────────────────────────────────────────\n");
    for (code, count) in counts {
        let _ = writeln!(out, "  {:<16}{}", code, count);
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len())
}

fn ratio_pct(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part / whole * dec!(100)
}

/// Peak-to-trough drop over the equity curve, starting from `start`
fn max_drawdown(start: Decimal, curve: &[EquityPoint]) -> (Decimal, Decimal) {
    let mut peak = start;
    let mut worst = Decimal::ZERO;
    let mut worst_pct = Decimal::ZERO;
    for point in curve {
        peak = peak.max(point.equity);
        let drop = peak - point.equity;
        if drop > worst {
            worst = drop;
            worst_pct = ratio_pct(drop, peak);
        }
    }
    (worst, worst_pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(hour: u32, equity: Decimal) -> EquityPoint {
        EquityPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap(),
            balance: equity,
            equity,
        }
    }

    #[test]
    fn test_max_drawdown_tracks_peak() {
        let curve = vec![
            point(1, dec!(101000)),
            point(2, dec!(99990)),
            point(3, dec!(102000)),
            point(4, dec!(101490)),
        ];
        let (cash, pct) = max_drawdown(dec!(100000), &curve);
        assert_eq!(cash, dec!(1010));
        assert_eq!(pct, dec!(1));
    }

    #[test]
    fn test_empty_backtest_summary() {
        let summary =
            BacktestSummary::compute(dec!(100000), &[], &[], dec!(0), &AuditStats::default(), 0);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, dec!(0));
        assert_eq!(summary.expectancy_r, dec!(0));
        assert!(summary.profit_factor.is_none());
        assert_eq!(summary.end_balance, dec!(100000));
    }

    #[test]
    fn test_format_table_sections() {
        let mut stats = AuditStats::default();
        stats.rejections.insert("max_positions", 2);
        let summary =
            BacktestSummary::compute(dec!(100000), &[], &[], dec!(-0.5), &stats, 1);

        let table = summary.format_table();
        assert!(table.contains("BACKTEST RESULTS"));
        assert!(table.contains("REJECTIONS"));
        assert!(table.contains("max_positions"));
        assert!(table.contains("unresolved"));
        assert!(!table.contains("EXITS"));
        assert!(table.contains("Profit Factor:    n/a"));
    }
}
