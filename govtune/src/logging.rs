//! logging.rs
//!
//! Retrain telemetry sinks.
//!
//! Operator-facing logs are single `key=value` lines on stderr. Anything an
//! experiment wants to analyse afterwards goes through a [`RetrainSink`] as
//! one JSON object per line.
//!
//! # Environment variables
//!
//! - `GOVTUNE_TELEMETRY_MODE`: `"off"` (default) or `"jsonl"`.
//! - `GOVTUNE_TELEMETRY_PATH`: JSONL output path, required for `"jsonl"`.
//! - `GOVTUNE_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends instead of
//!   truncating.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::types::ActionVector;

/// Structured events emitted by the training controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RetrainEvent {
    RetrainStarted {
        rows: usize,
        valid_rows: usize,
        dropped_rows: usize,
    },
    WarmStartCompleted {
        rows: usize,
        steps: u64,
        mean_step_reward: f64,
    },
    TrialCompleted {
        trial: usize,
        score: Option<f64>,
        params: serde_json::Value,
    },
    Evaluated {
        episodes: usize,
        mean_reward: f64,
        std_reward: f64,
    },
    RetrainFinished {
        status: &'static str,
        mean_reward: f64,
        action: Option<ActionVector>,
    },
}

/// Receives controller events.
pub trait RetrainSink: Send {
    fn emit(&mut self, event: &RetrainEvent);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl RetrainSink for NoopSink {
    fn emit(&mut self, _event: &RetrainEvent) {}
}

/// Collects events in memory. Used by tests and the replay tool.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<RetrainEvent>,
}

impl RetrainSink for MemorySink {
    fn emit(&mut self, event: &RetrainEvent) {
        self.events.push(event.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    /// Parse mode from environment. Defaults to Off.
    pub fn from_env() -> Self {
        match env::var("GOVTUNE_TELEMETRY_MODE") {
            Ok(s) if s.eq_ignore_ascii_case("jsonl") => TelemetryMode::Jsonl,
            _ => TelemetryMode::Off,
        }
    }
}

/// JSONL sink. Opens its file lazily on the first event.
///
/// I/O failures disable the sink instead of failing the retrain.
pub struct JsonlSink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    pub fn from_env() -> Self {
        let mode = TelemetryMode::from_env();
        let path = match mode {
            TelemetryMode::Jsonl => env::var("GOVTUNE_TELEMETRY_PATH").ok().map(PathBuf::from),
            TelemetryMode::Off => None,
        };
        let append = env::var("GOVTUNE_TELEMETRY_APPEND")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            mode,
            path,
            append,
            writer: None,
        }
    }

    /// Sink writing to an explicit path, truncating it.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let Some(path) = self.path.clone() else {
                self.mode = TelemetryMode::Off;
                return None;
            };
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(&path) {
                Ok(f) => self.writer = Some(BufWriter::new(f)),
                Err(e) => {
                    eprintln!(
                        "govtune | telemetry disabled | path={} err={}",
                        path.display(),
                        e
                    );
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }
}

impl RetrainSink for JsonlSink {
    fn emit(&mut self, event: &RetrainEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Some(w) = self.ensure_writer() {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }
}
