// src/health.rs
//
// Derives the two health signals the decision engine consumes from the
// bucketed occupancy state. The scheduler itself treats these as external
// inputs; this is the rule the simulation harness (and any host that has
// no better signal) uses to produce them.

use serde::{Deserialize, Serialize};

use crate::types::OccupancyState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Lowest bucket counted as healthy (below it the stage is starving).
    pub band_low: u8,
    /// Highest bucket counted as healthy.
    pub band_high: u8,
    /// Any bucket at or above this is a stall.
    pub near_full: u8,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            band_low: 1,
            band_high: 4,
            near_full: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub throughput_good: bool,
    pub core_stall: bool,
}

impl PipelineHealth {
    pub fn classify(state: OccupancyState, t: &HealthThresholds) -> Self {
        let buckets = state.buckets();
        Self {
            throughput_good: buckets
                .iter()
                .all(|&b| (t.band_low..=t.band_high).contains(&b)),
            core_stall: buckets.iter().any(|&b| b >= t.near_full),
        }
    }
}
