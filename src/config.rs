// src/config.rs
//
// Central configuration for the clock-gating scheduler.
//
// Every tunable constant of the decision engine and the gating supervisor
// lives here, plus the health thresholds the simulation harness uses to
// derive `throughput_good` / `core_stall`. Defaults reproduce the final
// safety revision of the controller (divider clamp 1, exploration 0..=1);
// `ClampProfile::Legacy` restores the earlier, looser clamp of 3.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::fixed::{QValue, LEARNING_RATE, LR_SHIFT};
use crate::health::HealthThresholds;
use crate::lfsr::DEFAULT_LFSR_SEED;
use crate::types::{MAX_BUCKET, MAX_DIVIDER};

/// Config schema version, recorded in telemetry and run summaries.
pub const CONFIG_VERSION: &str = "clockgate-cfg-v1";

/// Shortest legal decision interval: one tick per episode phase.
pub const MIN_UPDATE_INTERVAL: u32 = 5;

/// Divider clamp preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampProfile {
    /// Clamp 1, exploration fields 0..=1.
    #[default]
    Final,
    /// Clamp 3, exploration fields 0..=3.
    Legacy,
}

impl ClampProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClampProfile::Final => "final",
            ClampProfile::Legacy => "legacy",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<ClampProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "final" | "safe" | "f" => Some(ClampProfile::Final),
            "legacy" | "loose" | "l" => Some(ClampProfile::Legacy),
            _ => None,
        }
    }

    pub fn divider_max(&self) -> u8 {
        match self {
            ClampProfile::Final => 1,
            ClampProfile::Legacy => 3,
        }
    }

    pub fn explore_mask(&self) -> u8 {
        match self {
            ClampProfile::Final => 0b01,
            ClampProfile::Legacy => 0b11,
        }
    }
}

/// Where the effective profile came from.
///
/// Precedence order (highest to lowest): CLI, `CLOCKGATE_PROFILE`, default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

/// Resolved profile with its source.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveProfile {
    pub profile: ClampProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    pub fn log_startup(&self) {
        info!(
            profile = self.profile.as_str(),
            source = self.source.as_str(),
            "effective clamp profile"
        );
    }
}

/// Resolve the clamp profile: `cli_profile`, then `CLOCKGATE_PROFILE`, then
/// the default. An unparseable env value is ignored with a warning.
pub fn resolve_effective_profile(cli_profile: Option<ClampProfile>) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = std::env::var("CLOCKGATE_PROFILE") {
        if !env_val.is_empty() {
            if let Some(p) = ClampProfile::parse(&env_val) {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Env,
                };
            }
            warn!(value = %env_val, "invalid CLOCKGATE_PROFILE; ignoring");
        }
    }

    EffectiveProfile {
        profile: ClampProfile::default(),
        source: ProfileSource::Default,
    }
}

/// Decision engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks between episode starts.
    pub update_interval: u32,
    /// Explore iff the drawn byte is below this value (26 ≈ 10%).
    pub epsilon: u8,
    /// Per-field mask applied to exploration bits.
    pub explore_mask: u8,
    /// Learning-rate numerator.
    pub learning_rate: QValue,
    /// Learning-rate right shift.
    pub lr_shift: u32,
    /// Any bucket at or above this forces the emitted action to full speed.
    pub safety_ceiling: u8,
    /// Upper bound applied to every emitted divider.
    pub divider_max: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval: 1000,
            epsilon: 26,
            explore_mask: ClampProfile::Final.explore_mask(),
            learning_rate: LEARNING_RATE,
            lr_shift: LR_SHIFT,
            safety_ceiling: 2,
            divider_max: ClampProfile::Final.divider_max(),
        }
    }
}

/// Gating supervisor parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Any bucket at or above this forces every stage enabled.
    pub safety_ceiling: u8,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { safety_ceiling: 6 }
    }
}

/// Exploration byte source used by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RngKind {
    /// 16-bit LFSR, bit-compatible with the hardware controller.
    #[default]
    Lfsr,
    /// ChaCha8 stream seeded from `seed`.
    Chacha,
}

impl RngKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RngKind::Lfsr => "lfsr",
            RngKind::Chacha => "chacha",
        }
    }
}

/// Files are read through `ConfigFile`, so engine fields a file leaves out
/// come from the preset of the profile it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct Config {
    pub profile: ClampProfile,
    pub engine: EngineConfig,
    pub supervisor: SupervisorConfig,
    pub health: HealthThresholds,
    /// Seed for exploration draws. Zero is remapped to the LFSR default.
    pub seed: u16,
    pub rng: RngKind,
}

/// On-disk form of `Config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    profile: ClampProfile,
    engine: EngineOverrides,
    supervisor: SupervisorConfig,
    health: HealthThresholds,
    seed: Option<u16>,
    rng: RngKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EngineOverrides {
    update_interval: Option<u32>,
    epsilon: Option<u8>,
    explore_mask: Option<u8>,
    learning_rate: Option<QValue>,
    lr_shift: Option<u32>,
    safety_ceiling: Option<u8>,
    divider_max: Option<u8>,
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        let mut cfg = Config::for_profile(file.profile);
        let e = file.engine;
        let engine = &mut cfg.engine;
        engine.update_interval = e.update_interval.unwrap_or(engine.update_interval);
        engine.epsilon = e.epsilon.unwrap_or(engine.epsilon);
        engine.explore_mask = e.explore_mask.unwrap_or(engine.explore_mask);
        engine.learning_rate = e.learning_rate.unwrap_or(engine.learning_rate);
        engine.lr_shift = e.lr_shift.unwrap_or(engine.lr_shift);
        engine.safety_ceiling = e.safety_ceiling.unwrap_or(engine.safety_ceiling);
        engine.divider_max = e.divider_max.unwrap_or(engine.divider_max);
        cfg.supervisor = file.supervisor;
        cfg.health = file.health;
        cfg.seed = file.seed.unwrap_or(cfg.seed);
        cfg.rng = file.rng;
        cfg
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(ClampProfile::Final)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("update_interval {0} is shorter than one episode (5 ticks)")]
    IntervalTooShort(u32),
    #[error("divider_max {0} exceeds the 4-bit field maximum 15")]
    DividerMaxOutOfRange(u8),
    #[error("explore_mask {0:#04b} is wider than a 2-bit lane")]
    ExploreMaskTooWide(u8),
    #[error("{which} safety ceiling {value} outside 1..=7")]
    CeilingOutOfRange { which: &'static str, value: u8 },
    #[error("lr_shift {0} must be below 16")]
    ShiftTooLarge(u32),
    #[error("health band {low}..={high} is empty or exceeds bucket range")]
    InvalidHealthBand { low: u8, high: u8 },
}

impl Config {
    pub fn for_profile(profile: ClampProfile) -> Self {
        let engine = EngineConfig {
            divider_max: profile.divider_max(),
            explore_mask: profile.explore_mask(),
            ..EngineConfig::default()
        };
        Self {
            profile,
            engine,
            supervisor: SupervisorConfig::default(),
            health: HealthThresholds::default(),
            seed: DEFAULT_LFSR_SEED,
            rng: RngKind::default(),
        }
    }

    /// Build a Config from a profile, then apply environment overrides:
    ///
    ///   - CLOCKGATE_UPDATE_INTERVAL  (u32, ticks)
    ///   - CLOCKGATE_EPSILON          (u8, 0..=255)
    ///   - CLOCKGATE_DIVIDER_MAX      (u8, 0..=15)
    ///   - CLOCKGATE_SEED             (u16, decimal or 0x-hex)
    ///   - CLOCKGATE_RNG              (lfsr | chacha)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_profile(profile: ClampProfile) -> Self {
        let mut cfg = Config::for_profile(profile);

        if let Some(v) = env_override::<u32>("CLOCKGATE_UPDATE_INTERVAL") {
            cfg.engine.update_interval = v;
        }
        if let Some(v) = env_override::<u8>("CLOCKGATE_EPSILON") {
            cfg.engine.epsilon = v;
        }
        if let Some(v) = env_override::<u8>("CLOCKGATE_DIVIDER_MAX") {
            cfg.engine.divider_max = v;
        }
        if let Ok(raw) = std::env::var("CLOCKGATE_SEED") {
            match parse_seed(&raw) {
                Some(v) => {
                    cfg.seed = v;
                    info!(var = "CLOCKGATE_SEED", value = v, "overrode default");
                }
                None => warn!(var = "CLOCKGATE_SEED", raw = %raw, "could not parse; using default"),
            }
        }
        if let Ok(raw) = std::env::var("CLOCKGATE_RNG") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "lfsr" => cfg.rng = RngKind::Lfsr,
                "chacha" => cfg.rng = RngKind::Chacha,
                _ => warn!(var = "CLOCKGATE_RNG", raw = %raw, "could not parse; using default"),
            }
        }

        cfg
    }

    /// Load a config file, picking the format from the extension
    /// (`.yaml` / `.yml` for YAML, anything else as JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::load_yaml(path),
            _ => Self::load_json(path),
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = read_config(path)?;
        let cfg: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = read_config(path)?;
        let cfg: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if e.update_interval < MIN_UPDATE_INTERVAL {
            return Err(ConfigError::IntervalTooShort(e.update_interval));
        }
        if e.divider_max > MAX_DIVIDER {
            return Err(ConfigError::DividerMaxOutOfRange(e.divider_max));
        }
        if e.explore_mask > 0b11 {
            return Err(ConfigError::ExploreMaskTooWide(e.explore_mask));
        }
        if e.lr_shift >= 16 {
            return Err(ConfigError::ShiftTooLarge(e.lr_shift));
        }
        check_ceiling("engine", e.safety_ceiling)?;
        check_ceiling("supervisor", self.supervisor.safety_ceiling)?;
        let h = &self.health;
        if h.band_low > h.band_high || h.band_high > MAX_BUCKET {
            return Err(ConfigError::InvalidHealthBand {
                low: h.band_low,
                high: h.band_high,
            });
        }
        check_ceiling("near-full", h.near_full)?;
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn check_ceiling(which: &'static str, value: u8) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_BUCKET {
        return Err(ConfigError::CeilingOutOfRange { which, value });
    }
    Ok(())
}

fn env_override<T>(var: &'static str) -> Option<T>
where
    T: FromStr + std::fmt::Display,
{
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!(var, value = %v, "overrode default");
            Some(v)
        }
        Err(_) => {
            warn!(var, raw = %raw, "could not parse; using default");
            None
        }
    }
}

fn parse_seed(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}
