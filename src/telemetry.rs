// src/telemetry.rs
//
// Telemetry sinks for the scheduler harness.
// - EventSink: trait used by the simulation runner
// - NoopSink:  discards all events
// - JsonlSink: one JSON object per line (decisions and, optionally, samples)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CONFIG_VERSION;
use crate::engine::{EpisodeReport, ExecuteOverride};
use crate::fixed::QValue;
use crate::perf_log::PerfSample;
use crate::scheduler::SchedulerStats;
use crate::types::{NUM_QUEUES, NUM_STAGES};

/// One engine decision, written when the recommendation is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub config_version: String,
    pub tick: u64,
    pub state: u16,
    pub buckets: [u8; NUM_QUEUES],
    pub reward: Option<QValue>,
    pub updated_q: Option<QValue>,
    pub selected: [u8; NUM_STAGES],
    pub emitted: [u8; NUM_STAGES],
    pub explored: bool,
    pub override_applied: ExecuteOverride,
    pub episodes: u32,
    pub explorations: u32,
    pub exploitations: u32,
    pub average_reward: i32,
    pub cycles_saved: u64,
}

impl DecisionRecord {
    pub fn new(tick: u64, report: &EpisodeReport, stats: &SchedulerStats) -> Self {
        Self {
            config_version: CONFIG_VERSION.to_string(),
            tick,
            state: report.state.bits(),
            buckets: report.state.buckets(),
            reward: report.reward,
            updated_q: report.updated_q,
            selected: report.selected.dividers(),
            emitted: report.emitted.dividers(),
            explored: report.explored,
            override_applied: report.override_applied,
            episodes: stats.engine.episodes,
            explorations: stats.engine.explorations,
            exploitations: stats.engine.exploitations,
            average_reward: stats.engine.average_reward,
            cycles_saved: stats.supervisor.cycles_saved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SampleLine {
    tick: u64,
    word: u32,
}

/// Abstract sink for scheduler telemetry.
pub trait EventSink {
    fn log_decision(&mut self, record: &DecisionRecord);

    /// Per-tick monitoring word. Most sinks ignore it.
    fn log_sample(&mut self, _tick: u64, _sample: &PerfSample) {}

    fn flush(&mut self) {}
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_decision(&mut self, _record: &DecisionRecord) {
        // intentionally no-op
    }
}

/// JSONL file sink.
pub struct JsonlSink {
    writer: BufWriter<File>,
    with_samples: bool,
    write_errors: u64,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            with_samples: false,
            write_errors: 0,
        })
    }

    /// Also write one line per tick with the packed monitoring word.
    pub fn with_samples(mut self, enabled: bool) -> Self {
        self.with_samples = enabled;
        self
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    fn write_line<T: Serialize>(&mut self, value: &T) {
        // A failing sink must never stall the scheduler; count and move on.
        let result = serde_json::to_writer(&mut self.writer, value)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(err) = result {
            if self.write_errors == 0 {
                warn!(error = %err, "telemetry write failed; further failures are counted silently");
            }
            self.write_errors += 1;
        }
    }
}

impl EventSink for JsonlSink {
    fn log_decision(&mut self, record: &DecisionRecord) {
        self.write_line(record);
    }

    fn log_sample(&mut self, tick: u64, sample: &PerfSample) {
        if self.with_samples {
            self.write_line(&SampleLine {
                tick,
                word: sample.pack(),
            });
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!(error = %err, "telemetry flush failed");
            self.write_errors += 1;
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, OccupancyState};
    use std::fs;

    fn report() -> EpisodeReport {
        EpisodeReport {
            state: OccupancyState::from_buckets([1, 0, 1]),
            reward: Some(-50),
            updated_q: Some(-7),
            selected: Action::from_dividers([1, 0, 0, 1]),
            emitted: Action::from_dividers([1, 0, 0, 1]),
            explored: true,
            override_applied: ExecuteOverride::None,
        }
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        {
            let mut sink = JsonlSink::create(&path).unwrap().with_samples(true);
            let rec = DecisionRecord::new(14, &report(), &SchedulerStats::default());
            sink.log_decision(&rec);
            sink.log_sample(15, &PerfSample::default());
            sink.flush();
            assert_eq!(sink.write_errors(), 0);
        }
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: DecisionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.tick, 14);
        assert_eq!(parsed.selected, [1, 0, 0, 1]);
        assert_eq!(parsed.reward, Some(-50));
        assert!(lines[1].contains("\"word\":0"));
    }

    #[test]
    fn samples_are_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.jsonl");
        {
            let mut sink = JsonlSink::create(&path).unwrap();
            sink.log_sample(1, &PerfSample::default());
        }
        assert!(fs::read_to_string(&path).unwrap().is_empty());
    }

    #[test]
    fn record_serialization_is_deterministic() {
        let rec = DecisionRecord::new(3, &report(), &SchedulerStats::default());
        let a = serde_json::to_string(&rec).unwrap();
        let b = serde_json::to_string(&rec.clone()).unwrap();
        assert_eq!(a, b);
    }
}
