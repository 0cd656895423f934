//! Canonical file locations for a loop invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::Mode;
use crate::io::git::Git;

pub const PROGRESS_FILE: &str = "IMPLEMENTATION_PLAN.md";
pub const REQUIREMENTS_FILE: &str = "REQUIREMENTS.md";
pub const CONFIG_FILE: &str = "ralph.toml";

/// Documents the loop reads from the ralph directory.
#[derive(Debug, Clone)]
pub struct RalphPaths {
    pub ralph_dir: PathBuf,
    pub progress_path: PathBuf,
    pub requirements_path: PathBuf,
    pub config_path: PathBuf,
}

impl RalphPaths {
    pub fn new(ralph_dir: impl Into<PathBuf>) -> Self {
        let ralph_dir = ralph_dir.into();
        Self {
            progress_path: ralph_dir.join(PROGRESS_FILE),
            requirements_path: ralph_dir.join(REQUIREMENTS_FILE),
            config_path: ralph_dir.join(CONFIG_FILE),
            ralph_dir,
        }
    }

    /// Default prompt for `mode` (`PROMPT_plan.md` / `PROMPT_build.md`).
    pub fn prompt_path(&self, mode: Mode) -> PathBuf {
        self.ralph_dir.join(mode.prompt_file_name())
    }
}

/// Persisted loop state, tied to the repository rather than the invocation directory.
///
/// Inside a repository this lives under `<git-dir>/ralph/`, which no checkout
/// touches. Outside one it falls back to `<workdir>/.ralph/`.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub run_state_path: PathBuf,
    pub plan_branch_path: PathBuf,
}

impl StatePaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            run_state_path: state_dir.join("state.json"),
            plan_branch_path: state_dir.join("plan-branch"),
            state_dir,
        }
    }

    pub fn locate(workdir: &Path, git: &Git) -> Result<Self> {
        let state_dir = if git.is_repo() {
            git.git_dir()
                .context("locate repository metadata directory")?
                .join("ralph")
        } else {
            workdir.join(".ralph")
        };
        debug!(state_dir = %state_dir.display(), "state directory");
        Ok(Self::new(state_dir))
    }
}
