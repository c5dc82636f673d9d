// src/sim.rs
//
// Deterministic synthetic pipeline for exercising the scheduler.
//
// Four stages in a line, separated by three bounded queues:
//
//   source -> stage0 -> q1 -> stage1 -> q2 -> stage2 -> q3 -> stage3 -> sink
//
// A stage only advances on ticks where its clock enable is asserted. When
// enabled and it has work, it finishes one item with its service
// probability; it blocks while its output queue is full. All randomness
// comes from a seeded ChaCha8 stream, so a (config, workload, seed) triple
// always replays the same run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{Config, RngKind, CONFIG_VERSION};
use crate::health::PipelineHealth;
use crate::lfsr::{ByteSource, ChaChaSource};
use crate::perf_log::{PerfSample, PerfSummary};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::telemetry::{DecisionRecord, EventSink};
use crate::types::{
    OccupancyState, Override, StageId, TickInputs, MAX_BUCKET, NUM_QUEUES, NUM_STAGES,
};

/// Per-tick samples kept for the run summary; later ticks are still logged
/// to the sink but not aggregated.
pub const MAX_SAMPLES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Items each queue holds.
    pub queue_capacity: u16,
    /// Probability a new item arrives at stage 0 per tick.
    pub arrival_prob: f64,
    /// Per-stage probability of finishing an item on an enabled tick.
    pub service_prob: [f64; NUM_STAGES],
    /// Probability per tick that a burst of arrivals starts.
    pub burst_prob: f64,
    /// Length of a burst in ticks; arrivals are certain during a burst.
    pub burst_len: u32,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            arrival_prob: 0.35,
            service_prob: [0.9, 0.8, 0.7, 0.6],
            burst_prob: 0.001,
            burst_len: 200,
            seed: 42,
        }
    }
}

impl WorkloadConfig {
    /// No bursts, unit service: a steady, lightly loaded pipeline.
    pub fn steady() -> Self {
        Self {
            arrival_prob: 0.2,
            service_prob: [1.0; NUM_STAGES],
            burst_prob: 0.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticPipeline {
    cfg: WorkloadConfig,
    rng: ChaCha8Rng,
    /// Stage 0 input backlog (unbounded source side).
    pending: u32,
    queues: [u16; NUM_QUEUES],
    busy: [bool; NUM_STAGES],
    burst_left: u32,
    completed: u64,
}

impl SyntheticPipeline {
    pub fn new(cfg: WorkloadConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            rng,
            pending: 0,
            queues: [0; NUM_QUEUES],
            busy: [false; NUM_STAGES],
            burst_left: 0,
            completed: 0,
        }
    }

    pub fn queue_levels(&self) -> [u16; NUM_QUEUES] {
        self.queues
    }

    /// Busy flags from the last tick.
    pub fn busy(&self) -> [bool; NUM_STAGES] {
        self.busy
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Quantise queue levels into 0..=7 buckets.
    pub fn state(&self) -> OccupancyState {
        let cap = u32::from(self.cfg.queue_capacity.max(1));
        let levels = self.queues.map(|q| {
            let b = u32::from(q) * (u32::from(MAX_BUCKET) + 1) / (cap + 1);
            b.min(u32::from(MAX_BUCKET)) as u8
        });
        OccupancyState::from_buckets(levels)
    }

    /// Advance one tick with the given clock enables.
    pub fn tick(&mut self, enable: [bool; NUM_STAGES]) {
        if self.burst_left == 0 && self.rng.gen_bool(self.cfg.burst_prob.clamp(0.0, 1.0)) {
            self.burst_left = self.cfg.burst_len;
        }
        let arrival = if self.burst_left > 0 {
            self.burst_left -= 1;
            true
        } else {
            self.rng.gen_bool(self.cfg.arrival_prob.clamp(0.0, 1.0))
        };
        if arrival {
            self.pending = self.pending.saturating_add(1);
        }

        // Downstream first so an item moves at most one hop per tick.
        let cap = self.cfg.queue_capacity;
        for stage in (0..NUM_STAGES).rev() {
            let has_input = if stage == 0 {
                self.pending > 0
            } else {
                self.queues[stage - 1] > 0
            };
            let has_room = stage == NUM_STAGES - 1 || self.queues[stage] < cap;
            self.busy[stage] = enable[stage] && has_input;
            if !(self.busy[stage] && has_room) {
                continue;
            }
            let p = self.cfg.service_prob[stage].clamp(0.0, 1.0);
            if !self.rng.gen_bool(p) {
                continue;
            }
            if stage == 0 {
                self.pending -= 1;
            } else {
                self.queues[stage - 1] -= 1;
            }
            if stage == NUM_STAGES - 1 {
                self.completed += 1;
            } else {
                self.queues[stage] += 1;
            }
        }
    }
}

/// Clock activity of one stage over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageId,
    pub enabled_ticks: u64,
    pub gated_ticks: u64,
}

impl StageReport {
    fn new(stage: StageId) -> Self {
        Self {
            stage,
            enabled_ticks: 0,
            gated_ticks: 0,
        }
    }

    /// Fraction of ticks the stage clock ran.
    pub fn duty(&self) -> f64 {
        let total = self.enabled_ticks + self.gated_ticks;
        if total == 0 {
            return 1.0;
        }
        self.enabled_ticks as f64 / total as f64
    }
}

/// Outcome of one simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSummary {
    pub config_version: String,
    pub config_digest: String,
    pub profile: String,
    pub rng: String,
    pub workload_seed: u64,
    pub ticks: u64,
    pub rl_enabled: bool,
    pub items_completed: u64,
    pub decisions_logged: u64,
    pub stall_override_ticks: u64,
    pub ceiling_override_ticks: u64,
    pub stats: SchedulerStats,
    pub stages: Vec<StageReport>,
    pub perf: Option<PerfSummary>,
}

/// SHA-256 over the config's debug rendering, hex encoded.
pub fn config_digest(cfg: &Config) -> String {
    hex::encode(Sha256::digest(format!("{cfg:?}").as_bytes()))
}

/// Run `ticks` ticks of the scheduler against a synthetic pipeline.
///
/// With `rl_enabled == false` the scheduler sees `enable = 0` every tick,
/// which yields the full-speed baseline. Exploration bytes come from the
/// source named by `cfg.rng`.
pub fn run_simulation(
    cfg: &Config,
    workload: &WorkloadConfig,
    ticks: u64,
    rl_enabled: bool,
    sink: &mut dyn EventSink,
) -> SimSummary {
    match cfg.rng {
        RngKind::Lfsr => drive(Scheduler::new(cfg), cfg, workload, ticks, rl_enabled, sink),
        RngKind::Chacha => {
            let rng = ChaChaSource::new(u64::from(cfg.seed));
            drive(
                Scheduler::with_source(cfg, rng),
                cfg,
                workload,
                ticks,
                rl_enabled,
                sink,
            )
        }
    }
}

fn drive<R: ByteSource>(
    mut scheduler: Scheduler<R>,
    cfg: &Config,
    workload: &WorkloadConfig,
    ticks: u64,
    rl_enabled: bool,
    sink: &mut dyn EventSink,
) -> SimSummary {
    let mut pipeline = SyntheticPipeline::new(workload.clone());
    let cap = usize::try_from(ticks).map_or(MAX_SAMPLES, |t| t.min(MAX_SAMPLES));
    let mut samples = Vec::with_capacity(cap);
    let mut stages = StageId::ALL.map(StageReport::new);
    let mut decisions_logged = 0u64;
    let mut stall_override_ticks = 0u64;
    let mut ceiling_override_ticks = 0u64;

    info!(
        ticks,
        rl_enabled,
        profile = cfg.profile.as_str(),
        rng = cfg.rng.as_str(),
        interval = cfg.engine.update_interval,
        "simulation start"
    );

    for tick in 0..ticks {
        let state = pipeline.state();
        let health = PipelineHealth::classify(state, &cfg.health);
        let inputs = TickInputs {
            state,
            stage_busy: pipeline.busy(),
            core_stall: health.core_stall,
            throughput_good: health.throughput_good,
            enable: rl_enabled,
            reset: false,
        };

        let out = scheduler.advance(&inputs);
        match out.override_applied {
            Override::Stall => stall_override_ticks += 1,
            Override::OccupancyCeiling => ceiling_override_ticks += 1,
            _ => {}
        }
        for report in stages.iter_mut() {
            if out.stage_enable[report.stage.index()] {
                report.enabled_ticks += 1;
            } else {
                report.gated_ticks += 1;
            }
        }

        if out.update_valid {
            if let Some(report) = scheduler.last_episode() {
                let record = DecisionRecord::new(tick, &report, &scheduler.stats());
                sink.log_decision(&record);
                decisions_logged += 1;
            }
        }

        let sample = PerfSample::from_tick(&inputs, &out);
        sink.log_sample(tick, &sample);
        if samples.len() < MAX_SAMPLES {
            samples.push(sample);
        }

        pipeline.tick(out.stage_enable);
    }
    sink.flush();

    let stats = scheduler.stats();
    debug!(?stats, "simulation stats");

    SimSummary {
        config_version: CONFIG_VERSION.to_string(),
        config_digest: config_digest(cfg),
        profile: cfg.profile.as_str().to_string(),
        rng: cfg.rng.as_str().to_string(),
        workload_seed: workload.seed,
        ticks,
        rl_enabled,
        items_completed: pipeline.completed(),
        decisions_logged,
        stall_override_ticks,
        ceiling_override_ticks,
        stats,
        stages: stages.to_vec(),
        perf: PerfSummary::from_samples(&samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopSink;

    #[test]
    fn pipeline_is_deterministic_for_a_seed() {
        let mut a = SyntheticPipeline::new(WorkloadConfig::default());
        let mut b = SyntheticPipeline::new(WorkloadConfig::default());
        for t in 0..5_000u32 {
            let en = [true, t % 2 == 0, true, t % 3 == 0];
            a.tick(en);
            b.tick(en);
            assert_eq!(a.queue_levels(), b.queue_levels());
        }
        assert_eq!(a.completed(), b.completed());
    }

    #[test]
    fn frozen_stage_backs_up_its_input_queue() {
        let mut p = SyntheticPipeline::new(WorkloadConfig {
            arrival_prob: 1.0,
            service_prob: [1.0; NUM_STAGES],
            burst_prob: 0.0,
            ..WorkloadConfig::default()
        });
        for _ in 0..500 {
            p.tick([true, false, true, true]);
        }
        assert_eq!(p.queue_levels()[0], 64);
        assert_eq!(p.state().bucket(0), 7);
        assert_eq!(p.completed(), 0);
    }

    #[test]
    fn buckets_quantise_capacity() {
        let mut p = SyntheticPipeline::new(WorkloadConfig::default());
        p.queues = [0, 32, 64];
        assert_eq!(p.state().buckets(), [0, 3, 7]);
    }

    #[test]
    fn disabled_run_never_gates() {
        let mut cfg = Config::default();
        cfg.engine.update_interval = 50;
        let summary = run_simulation(&cfg, &WorkloadConfig::default(), 2_000, false, &mut NoopSink);
        assert_eq!(summary.stats.supervisor.cycles_saved, 0);
        assert_eq!(summary.stats.engine.explorations, 0);
        assert_eq!(summary.stats.engine.exploitations, 0);
        assert_eq!(summary.decisions_logged, 0);
        let perf = summary.perf.unwrap();
        assert_eq!(perf.throttle_count, 0);
        assert!((perf.rl_enabled_pct - 0.0).abs() < 1e-9);
    }

    #[test]
    fn digest_tracks_config_changes() {
        let a = Config::default();
        let mut b = Config::default();
        b.engine.epsilon = 0;
        assert_eq!(config_digest(&a), config_digest(&a.clone()));
        assert_ne!(config_digest(&a), config_digest(&b));
        assert_eq!(config_digest(&a).len(), 64);
    }

    #[test]
    fn stage_reports_cover_every_tick() {
        let mut cfg = Config::default();
        cfg.engine.update_interval = 100;
        cfg.engine.epsilon = 255;
        let ticks = 5_000;
        let summary = run_simulation(&cfg, &WorkloadConfig::steady(), ticks, true, &mut NoopSink);
        assert_eq!(summary.stages.len(), NUM_STAGES);
        let gated: u64 = summary.stages.iter().map(|r| r.gated_ticks).sum();
        assert_eq!(gated, summary.stats.supervisor.cycles_saved);
        for (report, stage) in summary.stages.iter().zip(StageId::ALL) {
            assert_eq!(report.stage, stage);
            assert_eq!(report.enabled_ticks + report.gated_ticks, ticks);
            assert!(report.duty() > 0.0 && report.duty() <= 1.0);
        }
    }

    #[test]
    fn chacha_source_is_selectable_and_replays() {
        let mut cfg = Config::default();
        cfg.engine.update_interval = 50;
        cfg.rng = RngKind::Chacha;
        let a = run_simulation(&cfg, &WorkloadConfig::default(), 3_000, true, &mut NoopSink);
        let b = run_simulation(&cfg, &WorkloadConfig::default(), 3_000, true, &mut NoopSink);
        assert_eq!(a, b);
        assert_eq!(a.rng, "chacha");
        assert_eq!(
            a.stats.engine.explorations + a.stats.engine.exploitations,
            59
        );
    }

    #[test]
    fn summary_aggregates_at_most_max_samples() {
        let mut cfg = Config::default();
        cfg.engine.update_interval = 50;
        let summary = run_simulation(&cfg, &WorkloadConfig::default(), 1_000, true, &mut NoopSink);
        assert_eq!(summary.perf.unwrap().count, 1_000);
    }
}
