// src/supervisor.rs
//
// Gating supervisor: turns the engine's recommendation into one clock
// enable per stage per tick.
//
// Override ladder, evaluated fresh every tick (never cached):
//   1. reset        -> everything cleared, all stages enabled
//   2. disabled     -> recommendations ignored, divider 0 for every stage
//   3. core stall   -> all stages enabled
//   4. any queue bucket >= safety ceiling -> all stages enabled
// Only when none fires does the per-stage modulo counter gate the clock.
// Every override resets the counters so gated re-entry starts at phase 0.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SupervisorConfig;
use crate::engine::Recommendation;
use crate::types::{Override, TickInputs, NUM_STAGES};

/// Busy/idle tick counts for one stage over one decision window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageWindow {
    pub active: u32,
    pub idle: u32,
}

impl StageWindow {
    fn record(&mut self, busy: bool) {
        if busy {
            self.active = self.active.wrapping_add(1);
        } else {
            self.idle = self.idle.wrapping_add(1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupervisorStats {
    /// Recommendations adopted since reset.
    pub total_decisions: u32,
    /// Stage-ticks with the clock gated off since reset.
    pub cycles_saved: u64,
    /// Activity in the window that is still open.
    pub window: [StageWindow; NUM_STAGES],
    /// Activity in the window closed by the last adoption.
    pub last_window: [StageWindow; NUM_STAGES],
}

/// Per-tick supervisor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateOutput {
    pub dividers: [u8; NUM_STAGES],
    pub enable: [bool; NUM_STAGES],
    pub adopted: bool,
    pub override_applied: Override,
}

impl GateOutput {
    fn full_speed(why: Override) -> Self {
        Self {
            dividers: [0; NUM_STAGES],
            enable: [true; NUM_STAGES],
            adopted: false,
            override_applied: why,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatingSupervisor {
    cfg: SupervisorConfig,
    adopted: [u8; NUM_STAGES],
    counters: [u8; NUM_STAGES],
    enabled: bool,
    stats: SupervisorStats,
}

impl GatingSupervisor {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            adopted: [0; NUM_STAGES],
            counters: [0; NUM_STAGES],
            enabled: false,
            stats: SupervisorStats::default(),
        }
    }

    pub fn adopted(&self) -> [u8; NUM_STAGES] {
        self.adopted
    }

    pub fn counters(&self) -> [u8; NUM_STAGES] {
        self.counters
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.adopted = [0; NUM_STAGES];
        self.counters = [0; NUM_STAGES];
        self.enabled = false;
        self.stats = SupervisorStats::default();
    }

    /// Advance one tick. `rec` is the engine output committed on the
    /// previous tick.
    pub fn step(&mut self, inputs: &TickInputs, rec: Recommendation) -> GateOutput {
        if inputs.reset {
            self.reset();
            return GateOutput::full_speed(Override::Reset);
        }

        if !inputs.enable {
            if self.enabled {
                info!("gating supervisor disabled; all stages at full speed");
            }
            self.enabled = false;
            self.adopted = [0; NUM_STAGES];
            self.counters = [0; NUM_STAGES];
            self.record_activity(inputs);
            return GateOutput::full_speed(Override::Disabled);
        }
        self.enabled = true;

        let adopted_now = rec.valid;
        if adopted_now {
            self.adopt(rec);
        }
        // After adoption, so the adoption tick opens the new window.
        self.record_activity(inputs);

        let why = if inputs.core_stall {
            Override::Stall
        } else if inputs.state.any_at_or_above(self.cfg.safety_ceiling) {
            Override::OccupancyCeiling
        } else {
            Override::None
        };
        if why.is_active() {
            self.counters = [0; NUM_STAGES];
            return GateOutput {
                adopted: adopted_now,
                ..GateOutput::full_speed(why)
            };
        }

        let mut enable = [true; NUM_STAGES];
        if !adopted_now {
            for (i, en) in enable.iter_mut().enumerate() {
                *en = self.gate_stage(i);
            }
        }

        GateOutput {
            dividers: self.adopted,
            enable,
            adopted: adopted_now,
            override_applied: Override::None,
        }
    }

    /// Adopt all four dividers and restart every counter in the same tick.
    fn adopt(&mut self, rec: Recommendation) {
        self.adopted = rec.action.dividers();
        self.counters = [0; NUM_STAGES];
        self.stats.total_decisions = self.stats.total_decisions.wrapping_add(1);
        self.stats.last_window = self.stats.window;
        self.stats.window = [StageWindow::default(); NUM_STAGES];
        debug!(
            dividers = ?self.adopted,
            total_decisions = self.stats.total_decisions,
            "adopted recommendation"
        );
    }

    fn record_activity(&mut self, inputs: &TickInputs) {
        for (w, &busy) in self.stats.window.iter_mut().zip(inputs.stage_busy.iter()) {
            w.record(busy);
        }
    }

    fn gate_stage(&mut self, i: usize) -> bool {
        if self.counters[i] == self.adopted[i] {
            self.counters[i] = 0;
            true
        } else {
            self.counters[i] = self.counters[i].wrapping_add(1);
            self.stats.cycles_saved = self.stats.cycles_saved.wrapping_add(1);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, OccupancyState};

    fn low() -> TickInputs {
        TickInputs::enabled(OccupancyState::from_buckets([1, 1, 1]))
    }

    fn pulse(dividers: [u8; NUM_STAGES]) -> Recommendation {
        Recommendation {
            action: Action::from_dividers(dividers),
            valid: true,
        }
    }

    #[test]
    fn divider_one_alternates_from_adoption() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        let out = s.step(&low(), pulse([1, 0, 2, 3]));
        assert!(out.adopted);
        assert_eq!(out.enable, [true; 4]);

        let idle = Recommendation::default();
        let mut trace = Vec::new();
        for _ in 0..8 {
            trace.push(s.step(&low(), idle).enable);
        }
        let stage0: Vec<bool> = trace.iter().map(|e| e[0]).collect();
        let stage1: Vec<bool> = trace.iter().map(|e| e[1]).collect();
        let stage2: Vec<bool> = trace.iter().map(|e| e[2]).collect();
        assert_eq!(stage0, [false, true, false, true, false, true, false, true]);
        assert_eq!(stage1, [true; 8]);
        assert_eq!(stage2, [false, false, true, false, false, true, false, false]);
    }

    #[test]
    fn pulse_without_valid_is_ignored() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        let rec = Recommendation {
            action: Action::from_dividers([3, 3, 3, 3]),
            valid: false,
        };
        let out = s.step(&low(), rec);
        assert!(!out.adopted);
        assert_eq!(s.adopted(), [0; 4]);
        assert_eq!(out.enable, [true; 4]);
    }

    #[test]
    fn disabled_ignores_pulses() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        let off = TickInputs {
            enable: false,
            ..low()
        };
        let out = s.step(&off, pulse([1, 1, 1, 1]));
        assert_eq!(out.override_applied, Override::Disabled);
        assert_eq!(out.enable, [true; 4]);
        assert_eq!(out.dividers, [0; 4]);
        assert_eq!(s.stats().total_decisions, 0);
    }

    #[test]
    fn occupancy_ceiling_forces_enable_and_resets_phase() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        s.step(&low(), pulse([1, 1, 1, 1]));
        s.step(&low(), Recommendation::default());
        assert_eq!(s.counters(), [1; 4]);

        let full = TickInputs::enabled(OccupancyState::from_buckets([0, 6, 0]));
        let out = s.step(&full, Recommendation::default());
        assert_eq!(out.override_applied, Override::OccupancyCeiling);
        assert_eq!(out.enable, [true; 4]);
        assert_eq!(s.counters(), [0; 4]);
        // The adopted divider survives the override.
        assert_eq!(s.adopted(), [1; 4]);

        let out = s.step(&low(), Recommendation::default());
        assert_eq!(out.enable, [false; 4]);
    }

    #[test]
    fn stall_forces_enable() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        s.step(&low(), pulse([1, 1, 1, 1]));
        let stalled = TickInputs {
            core_stall: true,
            ..low()
        };
        for _ in 0..5 {
            let out = s.step(&stalled, Recommendation::default());
            assert_eq!(out.enable, [true; 4]);
            assert_eq!(out.override_applied, Override::Stall);
        }
    }

    #[test]
    fn bookkeeping_counts_busy_and_saved_cycles() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        let busy = TickInputs {
            stage_busy: [true, false, true, false],
            ..low()
        };
        s.step(&busy, pulse([1, 0, 0, 0]));
        for _ in 0..4 {
            s.step(&busy, Recommendation::default());
        }
        let stats = s.stats();
        assert_eq!(stats.total_decisions, 1);
        // Stage 0 gated on 2 of the 4 post-adoption ticks.
        assert_eq!(stats.cycles_saved, 2);
        // The adoption tick opened a new window; it and the 4 after count.
        assert_eq!(stats.window[0], StageWindow { active: 5, idle: 0 });
        assert_eq!(stats.window[1], StageWindow { active: 0, idle: 5 });

        s.step(&busy, pulse([0; 4]));
        let stats = s.stats();
        assert_eq!(stats.last_window[0].active, 5);
        assert_eq!(stats.window[0].active, 1);
        assert_eq!(stats.total_decisions, 2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = GatingSupervisor::new(SupervisorConfig::default());
        s.step(&low(), pulse([1, 1, 1, 1]));
        s.step(&low(), Recommendation::default());
        let out = s.step(
            &TickInputs {
                reset: true,
                ..low()
            },
            Recommendation::default(),
        );
        assert_eq!(out.override_applied, Override::Reset);
        assert_eq!(s.adopted(), [0; 4]);
        assert_eq!(s.stats(), SupervisorStats::default());
    }
}
