// src/scheduler.rs
//
// Single-threaded tick driver wiring the decision engine to the gating
// supervisor.
//
// `advance` has register semantics: the supervisor consumes the engine
// recommendation committed on the *previous* tick, and the engine's new
// recommendation only becomes visible on the next one. Both halves read
// the same start-of-tick inputs and neither reads the other's this-tick
// result, so the evaluation order inside a tick cannot change any output.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::{DecisionEngine, EngineStats, EpisodeReport};
use crate::lfsr::{ByteSource, Lfsr16};
use crate::supervisor::{GatingSupervisor, SupervisorStats};
use crate::types::{TickInputs, TickOutputs};

/// Read-only statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub engine: EngineStats,
    pub supervisor: SupervisorStats,
}

#[derive(Debug, Clone)]
pub struct Scheduler<R: ByteSource = Lfsr16> {
    engine: DecisionEngine<R>,
    supervisor: GatingSupervisor,
    ticks: u64,
}

impl Scheduler<Lfsr16> {
    pub fn new(cfg: &Config) -> Self {
        Self::from_parts(
            DecisionEngine::with_seed(cfg.engine.clone(), cfg.seed),
            GatingSupervisor::new(cfg.supervisor.clone()),
        )
    }
}

impl<R: ByteSource> Scheduler<R> {
    pub fn with_source(cfg: &Config, rng: R) -> Self {
        Self::from_parts(
            DecisionEngine::new(cfg.engine.clone(), rng),
            GatingSupervisor::new(cfg.supervisor.clone()),
        )
    }

    fn from_parts(engine: DecisionEngine<R>, supervisor: GatingSupervisor) -> Self {
        Self {
            engine,
            supervisor,
            ticks: 0,
        }
    }

    /// Advance one tick.
    pub fn advance(&mut self, inputs: &TickInputs) -> TickOutputs {
        let committed = self.engine.output();
        let gate = self.supervisor.step(inputs, committed);
        let rec = self.engine.step(inputs);
        self.ticks = self.ticks.wrapping_add(1);

        TickOutputs {
            dividers: gate.dividers,
            stage_enable: gate.enable,
            decision_changed: gate.adopted,
            recommendation: rec.action,
            update_valid: rec.valid,
            override_applied: gate.override_applied,
        }
    }

    /// Drive `advance` over a sequence of inputs.
    pub fn run<'a, I>(&mut self, inputs: I) -> Vec<TickOutputs>
    where
        I: IntoIterator<Item = &'a TickInputs>,
    {
        inputs.into_iter().map(|i| self.advance(i)).collect()
    }

    /// Out-of-band reset, equivalent to one tick with `reset` asserted.
    pub fn reset(&mut self) -> TickOutputs {
        self.advance(&TickInputs {
            reset: true,
            ..TickInputs::default()
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks,
            engine: self.engine.stats(),
            supervisor: self.supervisor.stats(),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn engine(&self) -> &DecisionEngine<R> {
        &self.engine
    }

    pub fn supervisor(&self) -> &GatingSupervisor {
        &self.supervisor
    }

    pub fn last_episode(&self) -> Option<EpisodeReport> {
        self.engine.last_episode()
    }
}
