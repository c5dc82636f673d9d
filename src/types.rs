// src/types.rs
//
// Core value types shared by the decision engine and the gating supervisor:
// the discretised occupancy state, the packed divider action, and the
// per-tick input / output records.

use serde::{Deserialize, Serialize};

/// Number of clock-gated pipeline stages.
pub const NUM_STAGES: usize = 4;

/// Number of monitored queues feeding the state.
pub const NUM_QUEUES: usize = 3;

/// Number of distinct discretised states (three 3-bit buckets).
pub const NUM_STATES: usize = 512;

/// Highest occupancy bucket.
pub const MAX_BUCKET: u8 = 7;

/// Highest nominal divider value.
pub const MAX_DIVIDER: u8 = 15;

/// Pipeline stage identifiers, in divider-field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Resize,
    Grayscale,
    Contrast,
    Blur,
}

impl StageId {
    pub const ALL: [StageId; NUM_STAGES] = [
        StageId::Resize,
        StageId::Grayscale,
        StageId::Contrast,
        StageId::Blur,
    ];

    pub fn index(self) -> usize {
        match self {
            StageId::Resize => 0,
            StageId::Grayscale => 1,
            StageId::Contrast => 2,
            StageId::Blur => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Resize => "resize",
            StageId::Grayscale => "grayscale",
            StageId::Contrast => "contrast",
            StageId::Blur => "blur",
        }
    }
}

/// Discretised occupancy state: three 3-bit buckets packed into 9 bits.
///
/// Layout: `queue1` in bits 8..6, `queue2` in bits 5..3, `queue3` in bits 2..0.
/// Bits above 8 are always zero, so the value doubles as a table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccupancyState(u16);

impl OccupancyState {
    pub const EMPTY: OccupancyState = OccupancyState(0);

    /// Pack three buckets. Values above 7 are saturated to 7.
    pub fn from_buckets(buckets: [u8; NUM_QUEUES]) -> Self {
        let b = buckets.map(|v| u16::from(v.min(MAX_BUCKET)));
        OccupancyState((b[0] << 6) | (b[1] << 3) | b[2])
    }

    /// Interpret the low 9 bits of a raw word.
    pub fn from_bits(bits: u16) -> Self {
        OccupancyState(bits & 0x1FF)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn bucket(self, queue: usize) -> u8 {
        debug_assert!(queue < NUM_QUEUES);
        let shift = 6 - 3 * queue as u16;
        ((self.0 >> shift) & 0x7) as u8
    }

    pub fn buckets(self) -> [u8; NUM_QUEUES] {
        [self.bucket(0), self.bucket(1), self.bucket(2)]
    }

    pub fn max_bucket(self) -> u8 {
        self.buckets().into_iter().max().unwrap_or(0)
    }

    /// True when any bucket is at or above `ceiling`.
    pub fn any_at_or_above(self, ceiling: u8) -> bool {
        self.buckets().iter().any(|&b| b >= ceiling)
    }
}

/// Four 4-bit divider fields packed into 16 bits.
///
/// Stage 0 occupies bits 15..12, stage 3 bits 3..0. A divider `d` means the
/// stage is enabled once every `d + 1` ticks; 0 is full speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(u16);

impl Action {
    /// All stages at full speed. Always legal.
    pub const FULL_SPEED: Action = Action(0);

    pub fn from_bits(bits: u16) -> Self {
        Action(bits)
    }

    /// Pack four dividers. Values above 15 are truncated to their low nibble.
    pub fn from_dividers(dividers: [u8; NUM_STAGES]) -> Self {
        let mut bits = 0u16;
        for (i, d) in dividers.iter().enumerate() {
            bits |= u16::from(d & 0xF) << (12 - 4 * i);
        }
        Action(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn divider(self, stage: usize) -> u8 {
        debug_assert!(stage < NUM_STAGES);
        ((self.0 >> (12 - 4 * stage)) & 0xF) as u8
    }

    pub fn dividers(self) -> [u8; NUM_STAGES] {
        [
            self.divider(0),
            self.divider(1),
            self.divider(2),
            self.divider(3),
        ]
    }

    /// Field-wise `min(divider, max)`.
    pub fn clamped(self, max: u8) -> Self {
        Action::from_dividers(self.dividers().map(|d| d.min(max)))
    }

    pub fn is_full_speed(self) -> bool {
        self.0 == 0
    }
}

/// Inputs sampled once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickInputs {
    pub state: OccupancyState,
    pub stage_busy: [bool; NUM_STAGES],
    pub core_stall: bool,
    pub throughput_good: bool,
    pub enable: bool,
    pub reset: bool,
}

impl TickInputs {
    /// Enabled, healthy-looking inputs with the given occupancy.
    pub fn enabled(state: OccupancyState) -> Self {
        Self {
            state,
            enable: true,
            ..Self::default()
        }
    }
}

/// Which rule (if any) forced the supervisor to full speed on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Override {
    #[default]
    None,
    Reset,
    Disabled,
    Stall,
    OccupancyCeiling,
}

impl Override {
    pub fn is_active(self) -> bool {
        self != Override::None
    }
}

/// Everything the scheduler emits on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickOutputs {
    /// Effective dividers driving the stages this tick (all 0 under an override).
    pub dividers: [u8; NUM_STAGES],
    /// Per-stage clock enable for this tick.
    pub stage_enable: [bool; NUM_STAGES],
    /// The supervisor adopted a new recommendation this tick.
    pub decision_changed: bool,
    /// Engine recommendation committed this tick.
    pub recommendation: Action,
    /// One-tick pulse accompanying a fresh recommendation.
    pub update_valid: bool,
    /// Supervisor override applied this tick.
    pub override_applied: Override,
}
