//! Plan branch lifecycle: create an isolated branch for planning, record it,
//! and move later build runs back onto it.
//!
//! The record is a one-line file under the repository's metadata directory so
//! it survives checkouts. It is never deleted automatically.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::naming::{MAX_PLAN_BRANCH_CANDIDATES, plan_branch_base, plan_branch_candidate};
use crate::io::git::Git;

/// Reads and mutates branch state on behalf of plan and build runs.
#[derive(Debug, Clone)]
pub struct PlanBranchLedger {
    git: Git,
    record_path: PathBuf,
}

impl PlanBranchLedger {
    pub fn new(git: Git, record_path: impl Into<PathBuf>) -> Self {
        Self {
            git,
            record_path: record_path.into(),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Recorded plan branch, if any.
    pub fn read_record(&self) -> Result<Option<String>> {
        if !self.record_path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.record_path)
            .with_context(|| format!("read plan branch record {}", self.record_path.display()))?;
        let name = contents.trim();
        if name.is_empty() {
            warn!(path = %self.record_path.display(), "empty plan branch record ignored");
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    pub fn write_record(&self, branch: &str) -> Result<()> {
        if let Some(parent) = self.record_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.record_path, format!("{branch}\n"))
            .with_context(|| format!("write plan branch record {}", self.record_path.display()))
    }

    /// Create a brand-new plan branch, switch to it and record it.
    pub fn ensure_plan_branch(&self, requested: Option<&str>) -> Result<String> {
        self.ensure_plan_branch_at(requested, Utc::now())
    }

    /// [`Self::ensure_plan_branch`] with an explicit clock, for deterministic naming.
    #[instrument(skip_all, fields(requested))]
    pub fn ensure_plan_branch_at(
        &self,
        requested: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let branch = match requested {
            Some(name) => {
                if self.git.branch_exists(name)? {
                    bail!(
                        "plan branch '{name}' already exists; choose another --plan-branch or delete it with `git branch -D {name}`"
                    );
                }
                name.to_string()
            }
            None => self.unused_branch_name(&plan_branch_base(now))?,
        };
        self.git
            .create_and_switch(&branch)
            .with_context(|| format!("create plan branch {branch}"))?;
        self.write_record(&branch)?;
        info!(branch = %branch, "plan branch created");
        Ok(branch)
    }

    /// Switch to the recorded plan branch when it differs from the current one.
    ///
    /// Returns `None` when nothing is recorded. A dirty working tree blocks the
    /// switch rather than carrying uncommitted work across branches.
    #[instrument(skip_all)]
    pub fn sync_to_recorded_plan_branch(&self) -> Result<Option<String>> {
        let Some(recorded) = self.read_record()? else {
            debug!("no plan branch recorded");
            return Ok(None);
        };
        if !self.git.branch_exists(&recorded)? {
            return Err(anyhow!(
                "recorded plan branch '{recorded}' no longer exists; remove {} to continue on the current branch",
                self.record_path.display()
            ));
        }
        let current = self.git.current_branch()?;
        if current == recorded {
            debug!(branch = %recorded, "already on recorded plan branch");
            return Ok(Some(recorded));
        }
        let dirty = self.git.status_porcelain()?;
        if !dirty.is_empty() {
            let paths: Vec<&str> = dirty.iter().map(|entry| entry.path.as_str()).collect();
            return Err(anyhow!(
                "working tree not clean; commit or stash changes before switching from '{current}' to plan branch '{recorded}' (changed: {})",
                paths.join(", ")
            ));
        }
        self.git
            .switch_to(&recorded)
            .with_context(|| format!("switch to plan branch {recorded}"))?;
        info!(from = %current, to = %recorded, "switched to recorded plan branch");
        Ok(Some(recorded))
    }

    fn unused_branch_name(&self, base: &str) -> Result<String> {
        for n in 1..=MAX_PLAN_BRANCH_CANDIDATES {
            let candidate = plan_branch_candidate(base, n);
            if !self.git.branch_exists(&candidate)? {
                return Ok(candidate);
            }
            debug!(candidate = %candidate, "plan branch name taken");
        }
        Err(anyhow!(
            "unable to find an unused plan branch name from '{base}' after {MAX_PLAN_BRANCH_CANDIDATES} attempts"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use chrono::TimeZone;

    fn ledger(repo: &TestRepo) -> PlanBranchLedger {
        PlanBranchLedger::new(repo.git(), repo.state_paths().plan_branch_path)
    }

    #[test]
    fn unnamed_plan_branches_in_same_second_do_not_collide() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);
        let git = repo.git();
        let now = Utc
            .with_ymd_and_hms(2026, 10, 19, 8, 30, 15)
            .single()
            .expect("time");

        let first = ledger.ensure_plan_branch_at(None, now).expect("first");
        git.switch_to("main").expect("back to main");
        let second = ledger.ensure_plan_branch_at(None, now).expect("second");

        assert_eq!(first, "plan-20261019T083015Z");
        assert_eq!(second, "plan-20261019T083015Z-2");
        assert!(git.branch_exists(&first).expect("exists"));
        assert!(git.branch_exists(&second).expect("exists"));
        assert_eq!(ledger.read_record().expect("record"), Some(second.clone()));
        assert_eq!(git.current_branch().expect("branch"), second);
    }

    #[test]
    fn requested_existing_branch_is_fatal() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);

        let err = ledger.ensure_plan_branch(Some("main")).unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(ledger.read_record().expect("record"), None);
    }

    #[test]
    fn record_is_single_line() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);
        ledger.ensure_plan_branch(Some("plan-x")).expect("create");
        let raw = fs::read_to_string(ledger.record_path()).expect("read");
        assert_eq!(raw, "plan-x\n");
    }

    #[test]
    fn sync_without_record_is_a_no_op() {
        let repo = TestRepo::new().expect("repo");
        let synced = ledger(&repo).sync_to_recorded_plan_branch().expect("sync");
        assert_eq!(synced, None);
        assert_eq!(repo.git().current_branch().expect("branch"), "main");
    }

    #[test]
    fn sync_switches_back_to_recorded_branch() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);
        ledger.ensure_plan_branch(Some("plan-x")).expect("create");
        repo.git().switch_to("main").expect("switch");

        let synced = ledger.sync_to_recorded_plan_branch().expect("sync");

        assert_eq!(synced.as_deref(), Some("plan-x"));
        assert_eq!(repo.git().current_branch().expect("branch"), "plan-x");
    }

    #[test]
    fn sync_refuses_dirty_tree() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);
        ledger.ensure_plan_branch(Some("plan-x")).expect("create");
        repo.git().switch_to("main").expect("switch");
        fs::write(repo.path().join("scratch.txt"), "wip\n").expect("write");

        let err = ledger.sync_to_recorded_plan_branch().unwrap_err();

        assert!(err.to_string().contains("working tree not clean"));
        assert_eq!(repo.git().current_branch().expect("branch"), "main");
    }

    #[test]
    fn sync_fails_when_recorded_branch_is_gone() {
        let repo = TestRepo::new().expect("repo");
        let ledger = ledger(&repo);
        ledger.write_record("plan-missing").expect("write record");

        let err = ledger.sync_to_recorded_plan_branch().unwrap_err();

        assert!(err.to_string().contains("no longer exists"));
    }
}
