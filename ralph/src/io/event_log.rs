//! Append-only run log.
//!
//! One JSON object per line, in emission order, never rewritten. The log is
//! opt-in: without a configured path events still reach the caller's callback
//! and `tracing`, but nothing is written to disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{Mode, StopReason};
use crate::io::run_state::now_rfc3339;

/// Event-specific payload, tagged by `event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EventKind {
    Start {
        max: u32,
        until_done: bool,
    },
    IterationStart {
        iteration: u32,
    },
    IterationEnd {
        iteration: u32,
        exit_code: i32,
        commit: Option<String>,
        progress_status: Option<String>,
        done: bool,
    },
    Error {
        iteration: u32,
        exit_code: i32,
    },
    Stop {
        iteration: u32,
        reason: StopReason,
    },
    Done {
        iteration: u32,
    },
}

/// A log record: timestamp, mode and branch plus the event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub ts: String,
    pub mode: Mode,
    pub branch: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LogEvent {
    pub fn now(mode: Mode, branch: Option<&str>, kind: EventKind) -> Self {
        Self {
            ts: now_rfc3339(),
            mode,
            branch: branch.map(str::to_string),
            kind,
        }
    }
}

/// JSONL sink for [`LogEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, event: &LogEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let line = serde_json::to_string(event).context("serialize log event")?;
        append_line(path, &line).with_context(|| format!("append run log {}", path.display()))
    }
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
