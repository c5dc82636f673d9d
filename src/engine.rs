// src/engine.rs
//
// Decision engine: online tabular controller that recommends a divider
// action once per decision interval.
//
// Every `update_interval` ticks a five-tick episode runs, one phase per tick:
//
//   Observe -> Reward -> Update -> Select -> Execute
//
// The engine owns the lookup table exclusively. Its only output is the
// action it emits on Execute together with a one-tick `valid` pulse; the
// emitted action has already passed the override ladder (occupancy
// ceiling, stall, divider clamp), so a consumer never sees a raw table
// entry.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::fixed::{self, QValue};
use crate::lfsr::{ByteSource, Lfsr16};
use crate::qtable::QTable;
use crate::types::{Action, OccupancyState, TickInputs, NUM_STAGES};

/// Which episode phase runs on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EpisodePhase {
    #[default]
    Idle,
    Observe,
    Reward,
    Update,
    Select,
    Execute,
}

impl EpisodePhase {
    fn next(self) -> Self {
        match self {
            EpisodePhase::Idle => EpisodePhase::Idle,
            EpisodePhase::Observe => EpisodePhase::Reward,
            EpisodePhase::Reward => EpisodePhase::Update,
            EpisodePhase::Update => EpisodePhase::Select,
            EpisodePhase::Select => EpisodePhase::Execute,
            EpisodePhase::Execute => EpisodePhase::Idle,
        }
    }
}

/// Which rule shaped the emitted action on Execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecuteOverride {
    /// Selected action emitted unchanged.
    #[default]
    None,
    /// At least one divider was reduced to the clamp ceiling.
    Clamped,
    /// A queue bucket reached the engine safety ceiling.
    OccupancyCeiling,
    /// `core_stall` was asserted.
    Stall,
}

/// The episode whose reward is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub state: OccupancyState,
    /// Table value in force for `state` when the episode closed.
    pub q: QValue,
    /// Action selected (before overrides) for `state`.
    pub action: Action,
}

/// Summary of the most recent completed episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub state: OccupancyState,
    pub reward: Option<QValue>,
    pub updated_q: Option<QValue>,
    pub selected: Action,
    pub emitted: Action,
    pub explored: bool,
    pub override_applied: ExecuteOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Completed reward/update cycles.
    pub episodes: u32,
    pub explorations: u32,
    pub exploitations: u32,
    pub cumulative_reward: i32,
    pub average_reward: i32,
}

/// Engine output register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    /// Asserted only on the Execute tick.
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine<R: ByteSource = Lfsr16> {
    cfg: EngineConfig,
    rng: R,
    table: QTable,
    phase: EpisodePhase,
    interval_counter: u32,
    enabled: bool,

    // Per-episode latches.
    observed: OccupancyState,
    reward: Option<QValue>,
    updated_q: Option<QValue>,
    selected: Action,
    explored: bool,

    previous: Option<EpisodeRecord>,
    output: Recommendation,
    last_episode: Option<EpisodeReport>,
    stats: EngineStats,
}

impl DecisionEngine<Lfsr16> {
    pub fn with_seed(cfg: EngineConfig, seed: u16) -> Self {
        Self::new(cfg, Lfsr16::new(seed))
    }
}

impl<R: ByteSource> DecisionEngine<R> {
    pub fn new(cfg: EngineConfig, rng: R) -> Self {
        Self {
            cfg,
            rng,
            table: QTable::new(),
            phase: EpisodePhase::Idle,
            interval_counter: 0,
            enabled: false,
            observed: OccupancyState::EMPTY,
            reward: None,
            updated_q: None,
            selected: Action::FULL_SPEED,
            explored: false,
            previous: None,
            output: Recommendation::default(),
            last_episode: None,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn output(&self) -> Recommendation {
        self.output
    }

    pub fn previous(&self) -> Option<EpisodeRecord> {
        self.previous
    }

    pub fn last_episode(&self) -> Option<EpisodeReport> {
        self.last_episode
    }

    /// Return to the power-on state: safe table, zeroed statistics,
    /// restarted random stream.
    pub fn reset(&mut self) {
        self.table.reset();
        self.stats = EngineStats::default();
        self.rng.reseed();
        self.last_episode = None;
        self.enabled = false;
        self.go_idle();
    }

    fn go_idle(&mut self) {
        self.phase = EpisodePhase::Idle;
        self.interval_counter = 0;
        self.previous = None;
        self.reward = None;
        self.updated_q = None;
        self.selected = Action::FULL_SPEED;
        self.explored = false;
        self.output = Recommendation::default();
    }

    /// Advance one tick and return the committed output register.
    pub fn step(&mut self, inputs: &TickInputs) -> Recommendation {
        if inputs.reset {
            self.reset();
            info!("decision engine reset");
            return self.output;
        }
        if !inputs.enable {
            if self.enabled {
                info!("decision engine disabled; holding safe default");
            }
            self.enabled = false;
            self.go_idle();
            return self.output;
        }
        if !self.enabled {
            debug!("decision engine enabled");
            self.enabled = true;
        }

        // The valid pulse lasts one tick; the action register holds.
        self.output.valid = false;

        match self.phase {
            EpisodePhase::Idle => {}
            EpisodePhase::Observe => self.observe(inputs.state),
            EpisodePhase::Reward => self.reward(inputs.throughput_good, inputs.core_stall),
            EpisodePhase::Update => self.update(),
            EpisodePhase::Select => self.select(),
            EpisodePhase::Execute => self.execute(inputs.state, inputs.core_stall),
        }

        self.interval_counter += 1;
        if self.interval_counter >= self.cfg.update_interval {
            self.interval_counter = 0;
            self.phase = EpisodePhase::Observe;
        } else {
            self.phase = self.phase.next();
        }

        self.output
    }

    fn observe(&mut self, state: OccupancyState) {
        self.observed = state;
        self.reward = None;
        self.updated_q = None;
    }

    fn reward(&mut self, throughput_good: bool, core_stall: bool) {
        // Nothing has run yet whose effect could be scored.
        if self.previous.is_none() {
            return;
        }
        let r = fixed::reward_for(throughput_good, core_stall);
        self.stats.cumulative_reward = fixed::accumulate(self.stats.cumulative_reward, r);
        self.reward = Some(r);
    }

    fn update(&mut self) {
        let (Some(prev), Some(r)) = (self.previous, self.reward) else {
            return;
        };
        let new_q = fixed::q_update(r, prev.q, self.cfg.learning_rate, self.cfg.lr_shift);
        // Credit the action that actually ran, not a maximum over the next
        // state's values.
        self.table.store(prev.state, new_q, prev.action);
        self.updated_q = Some(new_q);

        self.stats.episodes = self.stats.episodes.wrapping_add(1);
        self.stats.average_reward =
            fixed::average(self.stats.cumulative_reward, self.stats.episodes);
    }

    fn select(&mut self) {
        let draw = self.rng.next_byte();
        if draw < self.cfg.epsilon {
            let bits = self.rng.next_byte();
            self.selected = explore_action(bits, self.cfg.explore_mask);
            self.explored = true;
            self.stats.explorations = self.stats.explorations.wrapping_add(1);
        } else {
            self.selected = self.table.best_action(self.observed);
            self.explored = false;
            self.stats.exploitations = self.stats.exploitations.wrapping_add(1);
        }
    }

    fn execute(&mut self, state: OccupancyState, core_stall: bool) {
        let (emitted, why) = self.apply_overrides(self.selected, state, core_stall);
        self.output = Recommendation {
            action: emitted,
            valid: true,
        };
        self.previous = Some(EpisodeRecord {
            state: self.observed,
            q: self.table.q(self.observed),
            action: self.selected,
        });

        let report = EpisodeReport {
            state: self.observed,
            reward: self.reward,
            updated_q: self.updated_q,
            selected: self.selected,
            emitted,
            explored: self.explored,
            override_applied: why,
        };
        debug!(
            state = report.state.bits(),
            reward = ?report.reward,
            q = ?report.updated_q,
            selected = format_args!("{:#06x}", report.selected.bits()),
            emitted = format_args!("{:#06x}", report.emitted.bits()),
            explored = report.explored,
            override_applied = ?why,
            "episode executed"
        );
        self.last_episode = Some(report);
    }

    /// Override ladder, highest priority first.
    fn apply_overrides(
        &self,
        action: Action,
        state: OccupancyState,
        core_stall: bool,
    ) -> (Action, ExecuteOverride) {
        if state.any_at_or_above(self.cfg.safety_ceiling) {
            return (Action::FULL_SPEED, ExecuteOverride::OccupancyCeiling);
        }
        if core_stall {
            return (Action::FULL_SPEED, ExecuteOverride::Stall);
        }
        let clamped = action.clamped(self.cfg.divider_max);
        if clamped != action {
            (clamped, ExecuteOverride::Clamped)
        } else {
            (clamped, ExecuteOverride::None)
        }
    }
}

/// Exploration action: stage `i` takes bits `2i..2i+1` of `bits`, masked.
pub fn explore_action(bits: u8, mask: u8) -> Action {
    let mut dividers = [0u8; NUM_STAGES];
    for (i, d) in dividers.iter_mut().enumerate() {
        *d = (bits >> (2 * i)) & mask;
    }
    Action::from_dividers(dividers)
}
