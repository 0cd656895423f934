//! Read-only summary for `ralph status`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::core::progress::{ProgressSnapshot, RequirementsReadiness};
use crate::io::documents::{read_progress, read_requirements};
use crate::io::git::Git;
use crate::io::paths::{RalphPaths, StatePaths};
use crate::io::plan_branch::PlanBranchLedger;
use crate::io::run_state::{RunState, RunStateStore};

/// Snapshot of everything ralph knows about the current checkout.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub in_repo: bool,
    pub current_branch: Option<String>,
    pub plan_branch: Option<String>,
    pub state_dir: PathBuf,
    pub run_state: Option<RunState>,
    pub progress_path: PathBuf,
    pub progress: ProgressSnapshot,
    pub requirements_path: PathBuf,
    pub requirements: RequirementsReadiness,
}

impl StatusReport {
    pub fn collect(workdir: &Path, paths: &RalphPaths) -> Result<Self> {
        let git = Git::new(workdir);
        let in_repo = git.is_repo();
        let state_paths = StatePaths::locate(workdir, &git)?;
        let current_branch = if in_repo {
            match git.current_branch() {
                Ok(branch) => Some(branch),
                Err(err) => {
                    debug!(err = %format!("{err:#}"), "current branch unavailable");
                    None
                }
            }
        } else {
            None
        };
        let plan_branch = PlanBranchLedger::new(git, &state_paths.plan_branch_path).read_record()?;

        Ok(Self {
            in_repo,
            current_branch,
            plan_branch,
            run_state: RunStateStore::new(&state_paths.run_state_path).read(),
            state_dir: state_paths.state_dir,
            progress: read_progress(&paths.progress_path),
            progress_path: paths.progress_path.clone(),
            requirements: read_requirements(&paths.requirements_path),
            requirements_path: paths.requirements_path.clone(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let branch = match (&self.current_branch, self.in_repo) {
            (Some(branch), _) => branch.as_str(),
            (None, true) => "(detached)",
            (None, false) => "(not a git repository)",
        };
        let _ = writeln!(out, "branch:       {branch}");
        let _ = writeln!(
            out,
            "plan branch:  {}",
            self.plan_branch.as_deref().unwrap_or("(none)")
        );
        let _ = writeln!(out, "state dir:    {}", self.state_dir.display());

        match &self.run_state {
            Some(state) => {
                let mode = state
                    .last_mode
                    .map_or_else(|| "-".to_string(), |mode| mode.to_string());
                let result = state
                    .last_result
                    .map_or_else(|| "-".to_string(), |result| result.to_string());
                let _ = writeln!(
                    out,
                    "last run:     {mode}, iteration {}, {result}",
                    state.last_iteration.unwrap_or(0)
                );
                let _ = writeln!(
                    out,
                    "last commit:  {}",
                    state.last_commit.as_deref().unwrap_or("(none)")
                );
                if let Some(updated_at) = &state.updated_at {
                    let _ = writeln!(out, "updated at:   {updated_at}");
                }
            }
            None => {
                let _ = writeln!(out, "last run:     (none)");
            }
        }

        if self.progress.exists {
            let _ = writeln!(
                out,
                "progress:     {} (status: {}, unchecked: {}, {})",
                self.progress_path.display(),
                self.progress.status.as_deref().unwrap_or("unknown"),
                self.progress.unchecked,
                if self.progress.done { "done" } else { "not done" }
            );
        } else {
            let _ = writeln!(out, "progress:     {} (missing)", self.progress_path.display());
        }

        if self.requirements.exists {
            let _ = writeln!(
                out,
                "requirements: {} (status: {}, {})",
                self.requirements_path.display(),
                self.requirements.status.as_deref().unwrap_or("unknown"),
                if self.requirements.ready { "ready" } else { "not ready" }
            );
        } else {
            let _ = writeln!(
                out,
                "requirements: {} (missing)",
                self.requirements_path.display()
            );
        }
        out
    }
}
