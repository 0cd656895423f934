//! Test-only helpers: throwaway git repositories and a scripted agent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::io::agent::{Agent, AgentRequest};
use crate::io::git::Git;
use crate::io::paths::StatePaths;

/// A git repository in a temp dir with one commit on `main`.
pub struct TestRepo {
    temp: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path();
        git(root, &["init", "-q"])?;
        git(root, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        git(root, &["config", "user.email", "ralph@example.com"])?;
        git(root, &["config", "user.name", "Ralph Test"])?;
        git(root, &["config", "commit.gpgsign", "false"])?;
        fs::write(root.join("README.md"), "# test\n").context("write README.md")?;
        git(root, &["add", "-A"])?;
        git(root, &["commit", "-q", "-m", "initial"])?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::locate(self.path(), &self.git()).expect("locate state paths")
    }

    /// Write `contents` to `rel` (creating parent dirs) and return the full path.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Stage and commit everything in the working tree.
    pub fn commit(&self, message: &str) {
        git(self.path(), &["add", "-A"]).expect("git add");
        git(self.path(), &["commit", "-q", "-m", message]).expect("git commit");
    }

    /// Drop the repo-local identity and stop git from guessing one.
    pub fn forget_identity(&self) {
        git(self.path(), &["config", "--unset", "user.name"]).expect("unset user.name");
        git(self.path(), &["config", "--unset", "user.email"]).expect("unset user.email");
        git(self.path(), &["config", "user.useConfigOnly", "true"]).expect("set useConfigOnly");
    }

    pub fn commit_count(&self) -> usize {
        let out = Command::new("git")
            .args(["rev-list", "--count", "HEAD"])
            .current_dir(self.path())
            .output()
            .expect("git rev-list");
        String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse()
            .expect("commit count")
    }
}

fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.success() {
        bail!("git {} failed", args.join(" "));
    }
    Ok(())
}

/// One scripted agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    pub exit_code: i32,
    /// Files written (relative to the request workdir) before returning.
    pub writes: Vec<(String, String)>,
}

impl ScriptedRun {
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            writes: Vec::new(),
        }
    }

    pub fn writing(mut self, rel: &str, contents: &str) -> Self {
        self.writes.push((rel.to_string(), contents.to_string()));
        self
    }
}

/// Agent that replays a fixed queue of runs without spawning processes.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    runs: RefCell<VecDeque<ScriptedRun>>,
    prompts: RefCell<Vec<String>>,
    probes: RefCell<u32>,
}

impl ScriptedAgent {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Number of install/auth probes performed.
    pub fn probes(&self) -> u32 {
        *self.probes.borrow()
    }

    pub fn assert_drained(&self) {
        assert!(
            self.runs.borrow().is_empty(),
            "scripted agent has {} unused runs",
            self.runs.borrow().len()
        );
    }
}

impl Agent for ScriptedAgent {
    fn check_installed(&self) -> Result<()> {
        *self.probes.borrow_mut() += 1;
        Ok(())
    }

    fn check_auth(&self) -> Result<()> {
        *self.probes.borrow_mut() += 1;
        Ok(())
    }

    fn run(&self, request: &AgentRequest<'_>) -> Result<i32> {
        self.prompts.borrow_mut().push(request.prompt.to_string());
        let run = self
            .runs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent exhausted"))?;
        for (rel, contents) in &run.writes {
            let path = request.workdir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(run.exit_code)
    }
}
