//! Git adapter for the loop.
//!
//! The loop creates branches, switches between them and commits after build
//! iterations, so we keep a small, explicit wrapper around `git` subprocess
//! calls. Any unexpected git failure is returned as an error and ends the run.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True iff `workdir` is inside a git working tree.
    ///
    /// Never fails: a missing `git` binary or a non-repository both yield `false`.
    pub fn is_repo(&self) -> bool {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => {
                out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true"
            }
            Err(err) => {
                warn!(err = %err, "git unavailable, treating as non-repository");
                false
            }
        }
    }

    /// Absolute path of the repository's private metadata directory (`.git`).
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self
            .run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])
            .context("determine current branch")?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (check out a branch first)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Return the full HEAD sha.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True iff there are no pending changes (untracked files count as changes).
    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.status_porcelain()?.is_empty())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create a new branch at current HEAD and check it out.
    ///
    /// Refuses to reuse an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn create_and_switch(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            bail!("branch '{branch}' already exists");
        }
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn switch_to(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_checked(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Stage everything and commit it.
    ///
    /// Returns `Ok(None)` without committing when nothing changed, otherwise the
    /// sha of the new commit.
    #[instrument(skip_all)]
    pub fn commit_all(&self, message: &str) -> Result<Option<String>> {
        self.add_all()?;
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(None);
        }
        self.ensure_identity()?;
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        let sha = self.head_sha()?;
        debug!(commit = %sha, "committed");
        Ok(Some(sha))
    }

    /// Fail with an actionable message when git cannot determine a commit identity.
    ///
    /// Identities from `GIT_AUTHOR_*` / `GIT_COMMITTER_*` environment variables
    /// count the same as configured ones.
    pub fn ensure_identity(&self) -> Result<()> {
        for var in ["GIT_AUTHOR_IDENT", "GIT_COMMITTER_IDENT"] {
            let out = self.run(&["var", var])?;
            if !out.status.success() {
                warn!(var, stderr = %String::from_utf8_lossy(&out.stderr).trim(), "no git identity");
                bail!(
                    "git identity not configured ({var} unavailable); run `git config user.name \"Your Name\"` and `git config user.email you@example.com`"
                );
            }
        }
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {} (is git installed?)", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
