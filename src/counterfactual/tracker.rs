//! Counterfactual resolution

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Counterfactual;
use crate::feed::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterfactualConfig {
    pub enabled: bool,
    /// Bars after which an unresolved counterfactual times out
    pub max_bars: u32,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bars: 50,
        }
    }
}

/// Resolves counterfactuals against later bars. Feeds reporting only.
#[derive(Debug, Default)]
pub struct CounterfactualTracker {
    config: CounterfactualConfig,
    active: Vec<Counterfactual>,
    resolved: Vec<Counterfactual>,
}

impl CounterfactualTracker {
    pub fn new(config: CounterfactualConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            resolved: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Start tracking; ignored when tracking is disabled
    pub fn track(&mut self, counterfactual: Counterfactual) {
        if !self.config.enabled {
            return;
        }
        debug!(
            id = %counterfactual.id,
            instrument = %counterfactual.instrument,
            origin = ?counterfactual.origin,
            "Tracking counterfactual"
        );
        self.active.push(counterfactual);
    }

    /// Advance every active counterfactual on `bar.instrument`, returning those
    /// resolved by this bar
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<Counterfactual> {
        let max_bars = self.config.max_bars;
        let mut newly_resolved = Vec::new();
        let mut still_active = Vec::with_capacity(self.active.len());

        for mut cf in self.active.drain(..) {
            if cf.observe(bar, max_bars) {
                debug!(id = %cf.id, verdict = ?cf.verdict(), "Counterfactual resolved");
                newly_resolved.push(cf);
            } else {
                still_active.push(cf);
            }
        }
        self.active = still_active;
        self.resolved.extend(newly_resolved.iter().cloned());
        newly_resolved
    }

    pub fn active(&self) -> &[Counterfactual] {
        &self.active
    }

    pub fn resolved(&self) -> &[Counterfactual] {
        &self.resolved
    }

    pub fn drain_resolved(&mut self) -> Vec<Counterfactual> {
        std::mem::take(&mut self.resolved)
    }
}
