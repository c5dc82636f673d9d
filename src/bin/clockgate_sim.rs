// src/bin/clockgate_sim.rs
//
// Research harness: drives the scheduler against the synthetic pipeline.
//
// - Profile precedence: --profile > CLOCKGATE_PROFILE > final.
// - --config loads a JSON/YAML config instead of the profile preset.
// - --compare runs a controller-off baseline with the same workload seed
//   and reports the difference.
// - The run summary is printed as JSON (or written to --out).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use clockgate::{
    resolve_effective_profile, run_simulation, ClampProfile, Config, EventSink, JsonlSink,
    NoopSink, PerfComparison, RngKind, WorkloadConfig,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    Final,
    Legacy,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RngArg {
    Lfsr,
    Chacha,
}

#[derive(Debug, Parser)]
#[command(
    name = "clockgate_sim",
    about = "Adaptive clock-gating scheduler simulator (research harness)",
    version
)]
struct Args {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 100_000)]
    ticks: u64,

    /// Divider clamp profile. If omitted, uses CLOCKGATE_PROFILE (default final).
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// JSON or YAML config file; replaces the profile preset and env overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workload seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Exploration byte source. If omitted, uses the config (default lfsr).
    #[arg(long, value_enum)]
    rng: Option<RngArg>,

    /// Decision interval override (ticks).
    #[arg(long)]
    interval: Option<u32>,

    /// Run with the controller disabled (full-speed baseline).
    #[arg(long)]
    rl_off: bool,

    /// Also run the disabled baseline and print a comparison.
    #[arg(long, conflicts_with = "rl_off")]
    compare: bool,

    /// Optional JSONL path for decision records.
    #[arg(long)]
    log_jsonl: Option<PathBuf>,

    /// Include one packed monitoring word per tick in the JSONL log.
    #[arg(long, requires = "log_jsonl")]
    samples: bool,

    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// `CLOCKGATE_LOG` > `RUST_LOG` > verbosity flag.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = std::env::var("CLOCKGATE_LOG")
        .ok()
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).without_time().compact())
        .init();
}

fn build_config(args: &Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let cli_profile = args.profile.map(|p| match p {
                ProfileArg::Final => ClampProfile::Final,
                ProfileArg::Legacy => ClampProfile::Legacy,
            });
            let effective = resolve_effective_profile(cli_profile);
            effective.log_startup();
            Config::from_env_or_profile(effective.profile)
        }
    };
    if let Some(rng) = args.rng {
        cfg.rng = match rng {
            RngArg::Lfsr => RngKind::Lfsr,
            RngArg::Chacha => RngKind::Chacha,
        };
    }
    if let Some(interval) = args.interval {
        cfg.engine.update_interval = interval;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Build the telemetry sink as a trait object so we can choose between
/// JsonlSink and NoopSink at runtime.
fn build_sink(args: &Args) -> Box<dyn EventSink> {
    match &args.log_jsonl {
        Some(path) => match JsonlSink::create(path) {
            Ok(s) => Box::new(s.with_samples(args.samples)),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to create log file; falling back to NoopSink"
                );
                Box::new(NoopSink)
            }
        },
        None => Box::new(NoopSink),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cfg = build_config(&args)?;
    let workload = WorkloadConfig {
        seed: args.seed,
        ..WorkloadConfig::default()
    };

    let mut sink = build_sink(&args);
    let summary = run_simulation(&cfg, &workload, args.ticks, !args.rl_off, sink.as_mut());
    info!(
        completed = summary.items_completed,
        cycles_saved = summary.stats.supervisor.cycles_saved,
        episodes = summary.stats.engine.episodes,
        "run finished"
    );
    for report in &summary.stages {
        info!(
            stage = report.stage.as_str(),
            duty = report.duty(),
            gated = report.gated_ticks,
            "stage clock activity"
        );
    }

    let payload = if args.compare {
        let baseline = run_simulation(&cfg, &workload, args.ticks, false, &mut NoopSink);
        let comparison = match (&summary.perf, &baseline.perf) {
            (Some(on), Some(off)) => Some(PerfComparison::compare(on, off)),
            _ => None,
        };
        serde_json::to_string_pretty(&serde_json::json!({
            "controlled": summary,
            "baseline": baseline,
            "comparison": comparison,
        }))?
    } else {
        serde_json::to_string_pretty(&summary)?
    };

    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, payload).with_context(|| format!("writing {}", path.display()))?;
            println!("clockgate_sim: wrote {}", path.display());
        }
        None => println!("{payload}"),
    }
    Ok(())
}
