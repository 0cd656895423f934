//! Shared deterministic types for the iteration loop.
//!
//! These types define stable contracts between the engine, the persisted run
//! state and the run log. They carry no I/O and serialize to fixed spellings.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which prompt the loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Produce or mature the requirements document on an isolated branch.
    Plan,
    /// Implement against the plan, committing after each iteration.
    Build,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Build => "build",
        }
    }

    /// Default prompt file name for this mode (`PROMPT_plan.md` / `PROMPT_build.md`).
    pub fn prompt_file_name(self) -> String {
        format!("PROMPT_{}.md", self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plan" => Ok(Mode::Plan),
            "build" => Ok(Mode::Build),
            other => Err(anyhow!("invalid mode: {other} (expected plan or build)")),
        }
    }
}

/// Output format requested from the agent (`--output-format`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Text,
    Json,
    #[default]
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::StreamJson => "stream-json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded in `last_result` of the persisted run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    /// The loop has begun but no iteration has finished yet.
    Started,
    /// The most recent iteration succeeded and work remains.
    Ok,
    /// The progress document reports completion.
    Done,
    /// The most recent agent invocation exited non-zero.
    Error,
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::Ok => "ok",
            Self::Done => "done",
            Self::Error => "error",
        })
    }
}

/// Why the loop stopped on its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Iteration budget (`max`) exhausted.
    Max,
    /// Wall-clock budget exhausted.
    Time,
}

/// Whether the build loop should stop once the progress document reports done.
///
/// Plan mode has no notion of done and always runs to its budget. Build mode
/// honours an explicit override and otherwise defaults to `true`, both for a
/// single `run` and for the build phase of `loop`.
pub fn resolve_until_done(mode: Mode, explicit: Option<bool>, _composed: bool) -> bool {
    match mode {
        Mode::Plan => false,
        Mode::Build => explicit.unwrap_or(true),
    }
}
