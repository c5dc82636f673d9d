//! Clockgate core library.
//!
//! Adaptive clock gating for a four-stage streaming pixel pipeline. Every
//! tick the scheduler decides which stages may advance, using a small
//! online tabular controller layered under hard safety overrides.
//!
//! # Architecture
//!
//! - **Decision Engine** (`engine`): 512-entry lookup table from bucketed
//!   queue occupancy to a learned value and best divider action. Runs one
//!   five-tick episode (observe, reward, update, select, execute) per
//!   decision interval and emits a safety-checked recommendation.
//!
//! - **Gating Supervisor** (`supervisor`): adopts recommendations on the
//!   engine's valid pulse, gates each stage with a modulo counter, and
//!   forces full speed whenever disabled, stalled, or near full.
//!
//! - **Scheduler** (`scheduler`): the `advance(inputs) -> outputs` step
//!   function joining the two with register semantics.
//!
//! Around the core: `config` (profiles, env overrides, validation),
//! `telemetry` (JSONL sinks), `perf_log` (monitoring word + run
//! summaries) and `sim` (a deterministic synthetic pipeline).
//!
//! Design principle: "Policy learns decisions, supervisor enforces safety"

pub mod config;
pub mod engine;
pub mod fixed;
pub mod health;
pub mod lfsr;
pub mod perf_log;
pub mod qtable;
pub mod scheduler;
pub mod sim;
pub mod supervisor;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    resolve_effective_profile, ClampProfile, Config, ConfigError, EffectiveProfile,
    EngineConfig, ProfileSource, RngKind, SupervisorConfig, CONFIG_VERSION,
};

pub use engine::{
    explore_action, DecisionEngine, EngineStats, EpisodePhase, EpisodeRecord, EpisodeReport,
    ExecuteOverride, Recommendation,
};

pub use fixed::{reward_for, QValue};

pub use health::{HealthThresholds, PipelineHealth};

pub use lfsr::{ByteSource, ChaChaSource, Lfsr16, ScriptedBytes, DEFAULT_LFSR_SEED};

pub use perf_log::{PerfComparison, PerfSample, PerfSummary, QueueVerdict};

pub use qtable::{QEntry, QTable};

pub use scheduler::{Scheduler, SchedulerStats};

pub use sim::{
    run_simulation, SimSummary, StageReport, SyntheticPipeline, WorkloadConfig, MAX_SAMPLES,
};

pub use supervisor::{GateOutput, GatingSupervisor, StageWindow, SupervisorStats};

pub use telemetry::{DecisionRecord, EventSink, JsonlSink, NoopSink};

pub use types::{
    Action, OccupancyState, Override, StageId, TickInputs, TickOutputs, NUM_QUEUES, NUM_STAGES,
    NUM_STATES,
};
