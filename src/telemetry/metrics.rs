//! Prometheus metrics
//!
//! Recorded through the `metrics` facade; a no-op until a recorder is
//! installed by `init_telemetry`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::decision::{ExitKind, RejectReason};
use crate::risk::AccountState;

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Daily drawdown percentage (negative in drawdown)
    DailyDrawdownPct,
    /// Total drawdown percentage (negative in drawdown)
    TotalDrawdownPct,
    /// Open position count
    OpenPositions,
    /// Cumulative risk cash of open positions
    OpenRisk,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "prop_equity",
            GaugeMetric::DailyDrawdownPct => "prop_daily_dd_pct",
            GaugeMetric::TotalDrawdownPct => "prop_total_dd_pct",
            GaugeMetric::OpenPositions => "prop_open_positions",
            GaugeMetric::OpenRisk => "prop_open_risk",
        }
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

/// Publish account gauges
pub fn record_account(account: &AccountState) {
    set_gauge(GaugeMetric::Equity, to_f64(account.equity));
    set_gauge(GaugeMetric::DailyDrawdownPct, to_f64(account.daily_dd_pct()));
    set_gauge(GaugeMetric::TotalDrawdownPct, to_f64(account.total_dd_pct()));
    set_gauge(GaugeMetric::OpenPositions, account.open_positions as f64);
    set_gauge(GaugeMetric::OpenRisk, to_f64(account.open_risk_cash));
}

/// Count an evaluated signal
pub fn record_signal(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    ::metrics::counter!("prop_signals_total", "outcome" => outcome).increment(1);
}

pub fn record_rejection(reason: RejectReason) {
    ::metrics::counter!("prop_rejections_total", "reason" => reason.code()).increment(1);
}

pub fn record_exit(kind: ExitKind) {
    ::metrics::counter!("prop_exits_total", "kind" => kind.code()).increment(1);
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
