// src/perf_log.rs
//
// Performance sampling for monitoring collaborators.
//
// A `PerfSample` is the 32-bit snapshot word host tooling consumes:
//
//   [31:28] stage busy flags (stage 0 in bit 31)
//   [27:25] queue1 bucket   [24:22] queue2 bucket   [21:19] queue3 bucket
//   [18:15] div0  [14:11] div1  [10:7] div2  [6:3] div3
//   [2]     controller enabled
//   [1:0]   zero
//
// `PerfSummary` aggregates a run of samples; `PerfComparison` contrasts a
// controller-on run against a controller-off baseline.

use serde::{Deserialize, Serialize};

use crate::types::{OccupancyState, TickInputs, TickOutputs, NUM_QUEUES, NUM_STAGES};

/// Samples with any bucket at or above this count as queue stress.
pub const STRESS_BUCKET: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerfSample {
    pub stage_busy: [bool; NUM_STAGES],
    pub buckets: [u8; NUM_QUEUES],
    pub dividers: [u8; NUM_STAGES],
    pub rl_enabled: bool,
}

impl PerfSample {
    pub fn from_tick(inputs: &TickInputs, outputs: &TickOutputs) -> Self {
        Self {
            stage_busy: inputs.stage_busy,
            buckets: inputs.state.buckets(),
            dividers: outputs.dividers,
            rl_enabled: inputs.enable,
        }
    }

    pub fn pack(&self) -> u32 {
        let mut w = 0u32;
        for (i, &b) in self.stage_busy.iter().enumerate() {
            w |= u32::from(b) << (31 - i);
        }
        for (i, &q) in self.buckets.iter().enumerate() {
            w |= u32::from(q & 0x7) << (25 - 3 * i);
        }
        for (i, &d) in self.dividers.iter().enumerate() {
            w |= u32::from(d & 0xF) << (15 - 4 * i);
        }
        w |= u32::from(self.rl_enabled) << 2;
        w
    }

    pub fn unpack(w: u32) -> Self {
        let mut s = PerfSample::default();
        for (i, b) in s.stage_busy.iter_mut().enumerate() {
            *b = (w >> (31 - i)) & 1 == 1;
        }
        for (i, q) in s.buckets.iter_mut().enumerate() {
            *q = ((w >> (25 - 3 * i)) & 0x7) as u8;
        }
        for (i, d) in s.dividers.iter_mut().enumerate() {
            *d = ((w >> (15 - 4 * i)) & 0xF) as u8;
        }
        s.rl_enabled = (w >> 2) & 1 == 1;
        s
    }

    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.pack().to_be_bytes()
    }

    pub fn state(&self) -> OccupancyState {
        OccupancyState::from_buckets(self.buckets)
    }

    pub fn is_throttled(&self) -> bool {
        self.dividers.iter().any(|&d| d != 0)
    }

    pub fn is_stressed(&self) -> bool {
        self.buckets.iter().any(|&b| b >= STRESS_BUCKET)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfSummary {
    pub count: usize,
    pub rl_enabled_pct: f64,
    pub queue_avg: [f64; NUM_QUEUES],
    pub queue_max: [u8; NUM_QUEUES],
    pub divider_avg: [f64; NUM_STAGES],
    pub throttle_count: usize,
    pub throttle_pct: f64,
    pub stress_count: usize,
    pub stress_pct: f64,
}

impl PerfSummary {
    /// None for an empty run.
    pub fn from_samples(samples: &[PerfSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mut queue_sum = [0u64; NUM_QUEUES];
        let mut queue_max = [0u8; NUM_QUEUES];
        let mut div_sum = [0u64; NUM_STAGES];
        let mut enabled = 0usize;
        let mut throttle_count = 0usize;
        let mut stress_count = 0usize;

        for s in samples {
            for (i, &q) in s.buckets.iter().enumerate() {
                queue_sum[i] += u64::from(q);
                queue_max[i] = queue_max[i].max(q);
            }
            for (i, &d) in s.dividers.iter().enumerate() {
                div_sum[i] += u64::from(d);
            }
            enabled += usize::from(s.rl_enabled);
            throttle_count += usize::from(s.is_throttled());
            stress_count += usize::from(s.is_stressed());
        }

        Some(Self {
            count: samples.len(),
            rl_enabled_pct: 100.0 * enabled as f64 / n,
            queue_avg: queue_sum.map(|v| v as f64 / n),
            queue_max,
            divider_avg: div_sum.map(|v| v as f64 / n),
            throttle_count,
            throttle_pct: 100.0 * throttle_count as f64 / n,
            stress_count,
            stress_pct: 100.0 * stress_count as f64 / n,
        })
    }

    pub fn mean_queue_load(&self) -> f64 {
        self.queue_avg.iter().sum::<f64>() / NUM_QUEUES as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueVerdict {
    Improved,
    Worsened,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfComparison {
    /// Mean baseline queue load minus mean controlled queue load.
    pub queue_improvement: f64,
    pub throttle_pct_delta: f64,
    pub stress_pct_delta: f64,
    pub verdict: QueueVerdict,
}

impl PerfComparison {
    /// Changes smaller than this are reported as neutral.
    pub const NEUTRAL_BAND: f64 = 0.1;

    pub fn compare(controlled: &PerfSummary, baseline: &PerfSummary) -> Self {
        let queue_improvement = baseline.mean_queue_load() - controlled.mean_queue_load();
        let verdict = if queue_improvement > Self::NEUTRAL_BAND {
            QueueVerdict::Improved
        } else if queue_improvement < -Self::NEUTRAL_BAND {
            QueueVerdict::Worsened
        } else {
            QueueVerdict::Neutral
        };
        Self {
            queue_improvement,
            throttle_pct_delta: controlled.throttle_pct - baseline.throttle_pct,
            stress_pct_delta: controlled.stress_pct - baseline.stress_pct,
            verdict,
        }
    }
}
