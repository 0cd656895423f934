//! The iteration loop behind `ralph run`.
//!
//! One invocation walks `INIT → branch setup → PRECHECK → RUNNING → STOPPED`:
//! validate inputs, put the repository on the right branch, short-circuit if
//! the progress document already says done, probe the agent, then invoke it
//! once per pass until a budget runs out, the work is done, or the agent fails.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::types::{Mode, RunResult, StopReason, resolve_until_done};
use crate::exit_codes;
use crate::io::agent::{Agent, AgentRequest};
use crate::io::documents::read_progress;
use crate::io::event_log::{EventKind, EventLog, LogEvent};
use crate::io::git::Git;
use crate::io::interrupt::Interrupt;
use crate::io::paths::{RalphPaths, StatePaths};
use crate::io::plan_branch::PlanBranchLedger;
use crate::io::run_state::{RunStateStore, RunStateUpdate, now_rfc3339};

/// Policy for a single engine run. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// Directory the agent runs in and git commands operate on.
    pub workdir: PathBuf,
    /// Prompt file, re-read before every iteration.
    pub prompt_path: PathBuf,
    pub progress_path: PathBuf,
    /// Iteration budget (0 = unlimited).
    pub max_iterations: u32,
    /// Wall-clock budget (zero = unlimited).
    pub max_duration: Duration,
    /// Pause after each completed iteration.
    pub sleep: Duration,
    pub until_done: bool,
    pub skip_auth_check: bool,
    /// Explicit plan branch name; auto-generated when `None`.
    pub plan_branch: Option<String>,
    /// JSONL run log; nothing is written when `None`.
    pub log_path: Option<PathBuf>,
}

impl RunConfig {
    /// Defaults for `mode` using the documents in `paths`.
    pub fn new(mode: Mode, workdir: impl Into<PathBuf>, paths: &RalphPaths) -> Self {
        Self {
            mode,
            workdir: workdir.into(),
            prompt_path: paths.prompt_path(mode),
            progress_path: paths.progress_path.clone(),
            max_iterations: 0,
            max_duration: Duration::ZERO,
            sleep: Duration::ZERO,
            until_done: resolve_until_done(mode, None, false),
            skip_auth_check: false,
            plan_branch: None,
            log_path: None,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Progress was already done before the first iteration; the agent never ran.
    AlreadyDone,
    /// Progress reached done after an iteration.
    Done,
    MaxIterations,
    TimeLimit,
    /// The agent exited non-zero; the run ends with its exit code.
    AgentFailed { exit_code: i32 },
}

/// Summary of an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub mode: Mode,
    /// Iterations that completed successfully.
    pub iterations: u32,
    pub branch: Option<String>,
    pub stop: RunStop,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.stop {
            RunStop::AgentFailed { exit_code } => exit_code,
            _ => exit_codes::OK,
        }
    }
}

/// Stamps events with mode and branch, then fans them out to the log and the caller.
struct Emitter<'a, F> {
    log: EventLog,
    mode: Mode,
    branch: Option<&'a str>,
    on_event: F,
}

impl<F: FnMut(&LogEvent)> Emitter<'_, F> {
    fn emit(&mut self, kind: EventKind) -> Result<()> {
        let event = LogEvent::now(self.mode, self.branch, kind);
        info!(mode = %event.mode, branch = ?event.branch, event = ?event.kind, "run event");
        self.log.record(&event)?;
        (self.on_event)(&event);
        Ok(())
    }
}

/// Run the agent loop described by `config`.
///
/// Fatal preconditions (missing prompt, git failures, failed probes) are
/// errors. Agent failure is not: it ends the run with
/// [`RunStop::AgentFailed`]. An interrupt surfaces as
/// [`crate::io::interrupt::Interrupted`] without recording the interrupted
/// iteration.
#[instrument(skip_all, fields(mode = %config.mode, max = config.max_iterations))]
pub fn run_iterations<A: Agent, F: FnMut(&LogEvent)>(
    config: &RunConfig,
    agent: &A,
    interrupt: &Interrupt,
    on_event: F,
) -> Result<RunOutcome> {
    if !config.prompt_path.is_file() {
        bail!(
            "prompt file not found: {}. Run 'ralph init' first.",
            config.prompt_path.display()
        );
    }

    let git = Git::new(&config.workdir);
    let in_repo = git.is_repo();
    let state_paths = StatePaths::locate(&config.workdir, &git)?;
    let ledger = PlanBranchLedger::new(git.clone(), &state_paths.plan_branch_path);
    let store = RunStateStore::new(&state_paths.run_state_path);

    let (branch, plan_branch) = match config.mode {
        Mode::Plan => {
            if !in_repo {
                bail!(
                    "plan mode requires a git repository ({} is not inside one)",
                    config.workdir.display()
                );
            }
            let name = ledger.ensure_plan_branch(config.plan_branch.as_deref())?;
            (Some(name.clone()), Some(name))
        }
        Mode::Build if in_repo => match ledger.sync_to_recorded_plan_branch()? {
            Some(name) => (Some(name.clone()), Some(name)),
            None => (Some(git.current_branch()?), None),
        },
        Mode::Build => (None, None),
    };
    debug!(?branch, ?plan_branch, in_repo, "branch setup complete");

    let mut emitter = Emitter {
        log: EventLog::new(config.log_path.clone()),
        mode: config.mode,
        branch: branch.as_deref(),
        on_event,
    };
    let outcome = |iterations: u32, stop: RunStop| RunOutcome {
        mode: config.mode,
        iterations,
        branch: branch.clone(),
        stop,
    };

    if config.mode == Mode::Build && config.until_done {
        let progress = read_progress(&config.progress_path);
        if progress.done {
            info!("progress already done, skipping agent");
            emitter.emit(EventKind::Done { iteration: 0 })?;
            store.write(RunStateUpdate {
                last_mode: Some(config.mode),
                last_iteration: Some(0),
                last_result: Some(RunResult::Done),
                last_progress_status: Some(progress.status),
                branch: Some(branch.clone()),
                plan_branch: Some(plan_branch.clone()),
                ..RunStateUpdate::default()
            })?;
            return Ok(outcome(0, RunStop::AlreadyDone));
        }
    }

    agent.check_installed()?;
    if config.skip_auth_check {
        debug!("auth check skipped");
    } else {
        agent.check_auth()?;
    }

    emitter.emit(EventKind::Start {
        max: config.max_iterations,
        until_done: config.until_done,
    })?;
    store.write(RunStateUpdate {
        last_mode: Some(config.mode),
        last_iteration: Some(0),
        last_result: Some(RunResult::Started),
        last_progress_status: Some(None),
        last_commit: Some(None),
        branch: Some(branch.clone()),
        plan_branch: Some(plan_branch.clone()),
        started_at: Some(now_rfc3339()),
    })?;

    let started = Instant::now();
    let mut completed = 0u32;
    let stop = loop {
        if config.max_iterations > 0 && completed >= config.max_iterations {
            emitter.emit(EventKind::Stop {
                iteration: completed,
                reason: StopReason::Max,
            })?;
            break RunStop::MaxIterations;
        }
        if !config.max_duration.is_zero() && started.elapsed() >= config.max_duration {
            emitter.emit(EventKind::Stop {
                iteration: completed,
                reason: StopReason::Time,
            })?;
            break RunStop::TimeLimit;
        }

        let prompt = fs::read_to_string(&config.prompt_path)
            .with_context(|| format!("read prompt {}", config.prompt_path.display()))?;
        let iteration = completed + 1;
        emitter.emit(EventKind::IterationStart { iteration })?;

        let exit_code = agent.run(&AgentRequest {
            workdir: &config.workdir,
            prompt: &prompt,
        })?;
        if exit_code != 0 {
            emitter.emit(EventKind::Error {
                iteration,
                exit_code,
            })?;
            store.write(RunStateUpdate {
                last_result: Some(RunResult::Error),
                ..RunStateUpdate::default()
            })?;
            return Ok(outcome(completed, RunStop::AgentFailed { exit_code }));
        }
        completed = iteration;

        let progress = read_progress(&config.progress_path);
        let is_build = config.mode == Mode::Build;
        let commit = if is_build && in_repo {
            git.commit_all(&commit_message(iteration, progress.done))?
        } else {
            None
        };
        let result = if is_build && progress.done {
            RunResult::Done
        } else {
            RunResult::Ok
        };
        store.write(RunStateUpdate {
            last_iteration: Some(iteration),
            last_result: Some(result),
            last_progress_status: Some(progress.status.clone()),
            last_commit: Some(commit.clone()),
            ..RunStateUpdate::default()
        })?;
        emitter.emit(EventKind::IterationEnd {
            iteration,
            exit_code,
            commit,
            progress_status: progress.status,
            done: progress.done,
        })?;

        if is_build && config.until_done && progress.done {
            emitter.emit(EventKind::Done { iteration })?;
            break RunStop::Done;
        }

        if !config.sleep.is_zero() {
            debug!(sleep_ms = config.sleep.as_millis(), "sleeping between iterations");
            interrupt.sleep(config.sleep)?;
        }
    };

    Ok(outcome(completed, stop))
}

fn commit_message(iteration: u32, done: bool) -> String {
    let mut message = format!("ralph: build iteration {iteration}");
    if done {
        message.push_str(" (done)");
    }
    message
}
