//! Run state storage for iteration bookkeeping.
//!
//! The store reflects only the most recent iteration. Every write merges an
//! update over whatever is on disk, so fields a caller does not mention keep
//! their previous values.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::{Mode, RunResult};

/// Persisted bookkeeping for the most recent run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunState {
    pub last_mode: Option<Mode>,
    /// Iterations completed by the most recent run (0 before the first finishes).
    pub last_iteration: Option<u32>,
    pub last_result: Option<RunResult>,
    /// `Status:` label of the progress document after the last iteration.
    pub last_progress_status: Option<String>,
    /// Commit created by the last build iteration, if it changed anything.
    pub last_commit: Option<String>,
    pub branch: Option<String>,
    pub plan_branch: Option<String>,
    pub started_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Partial update merged over the persisted state.
///
/// `None` leaves a field untouched. Nullable fields use `Some(None)` to clear
/// the stored value.
#[derive(Debug, Clone, Default)]
pub struct RunStateUpdate {
    pub last_mode: Option<Mode>,
    pub last_iteration: Option<u32>,
    pub last_result: Option<RunResult>,
    pub last_progress_status: Option<Option<String>>,
    pub last_commit: Option<Option<String>>,
    pub branch: Option<Option<String>>,
    pub plan_branch: Option<Option<String>>,
    pub started_at: Option<String>,
}

impl RunState {
    fn apply(&mut self, update: RunStateUpdate) {
        if let Some(mode) = update.last_mode {
            self.last_mode = Some(mode);
        }
        if let Some(iteration) = update.last_iteration {
            self.last_iteration = Some(iteration);
        }
        if let Some(result) = update.last_result {
            self.last_result = Some(result);
        }
        if let Some(status) = update.last_progress_status {
            self.last_progress_status = status;
        }
        if let Some(commit) = update.last_commit {
            self.last_commit = commit;
        }
        if let Some(branch) = update.branch {
            self.branch = branch;
        }
        if let Some(plan_branch) = update.plan_branch {
            self.plan_branch = plan_branch;
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
    }
}

/// File-backed store for [`RunState`].
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state; a missing or corrupt file reads as `None`.
    pub fn read(&self) -> Option<RunState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %self.path.display(), err = %err, "no run state");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "ignoring unparseable run state");
                None
            }
        }
    }

    /// Merge `update` over the persisted state, stamp `updated_at`, and persist.
    pub fn write(&self, update: RunStateUpdate) -> Result<RunState> {
        let mut state = self.read().unwrap_or_default();
        state.apply(update);
        state.updated_at = Some(now_rfc3339());
        debug!(
            path = %self.path.display(),
            last_iteration = ?state.last_iteration,
            last_result = ?state.last_result,
            "writing run state"
        );
        let mut buf = serde_json::to_string_pretty(&state).context("serialize run state")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        Ok(state)
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write via temp file + rename so readers never observe a partial file.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}
