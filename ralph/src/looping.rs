//! Plan-then-build composition for `ralph loop`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::core::progress::RequirementsReadiness;
use crate::core::types::{Mode, resolve_until_done};
use crate::engine::{RunConfig, RunOutcome, RunStop, run_iterations};
use crate::exit_codes;
use crate::io::agent::Agent;
use crate::io::documents::read_requirements;
use crate::io::event_log::LogEvent;
use crate::io::interrupt::Interrupt;

/// Inputs for `run_loop`.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Caller's policy for the build phase.
    pub build: RunConfig,
    pub plan_prompt_path: PathBuf,
    pub requirements_path: PathBuf,
    /// Iteration budget for the plan phase.
    pub plan_max: u32,
    /// Explicit plan branch name for the plan phase.
    pub plan_branch: Option<String>,
}

/// Progress notifications from `run_loop`.
#[derive(Debug)]
pub enum LoopProgress<'a> {
    /// Requirements are ready, so the plan phase will not run.
    PlanSkipped(&'a RequirementsReadiness),
    /// A phase is about to start.
    Phase(Mode),
    Event(&'a LogEvent),
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub readiness: RequirementsReadiness,
    /// `None` when the plan phase was skipped.
    pub plan: Option<RunOutcome>,
    /// `None` when the plan phase failed.
    pub build: Option<RunOutcome>,
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        [&self.plan, &self.build]
            .into_iter()
            .flatten()
            .map(RunOutcome::exit_code)
            .find(|code| *code != exit_codes::OK)
            .unwrap_or(exit_codes::OK)
    }
}

/// Run the plan phase unless requirements are ready, then the build phase.
///
/// A plan phase that ends in agent failure ends the loop; fatal errors from
/// either phase propagate.
pub fn run_loop<A: Agent, F: FnMut(LoopProgress<'_>)>(
    config: &LoopConfig,
    agent: &A,
    interrupt: &Interrupt,
    mut on_progress: F,
) -> Result<LoopOutcome> {
    let readiness = read_requirements(&config.requirements_path);

    let plan = if readiness.ready {
        info!(status = ?readiness.status, "requirements ready, skipping plan phase");
        on_progress(LoopProgress::PlanSkipped(&readiness));
        None
    } else {
        let plan_config = RunConfig {
            mode: Mode::Plan,
            prompt_path: config.plan_prompt_path.clone(),
            max_iterations: config.plan_max,
            max_duration: Duration::ZERO,
            sleep: Duration::ZERO,
            until_done: resolve_until_done(Mode::Plan, None, true),
            plan_branch: config.plan_branch.clone(),
            ..config.build.clone()
        };
        on_progress(LoopProgress::Phase(Mode::Plan));
        let outcome = run_iterations(&plan_config, agent, interrupt, |event| {
            on_progress(LoopProgress::Event(event));
        })?;
        if let RunStop::AgentFailed { exit_code } = outcome.stop {
            info!(exit_code, "plan phase failed, not building");
            return Ok(LoopOutcome {
                readiness,
                plan: Some(outcome),
                build: None,
            });
        }
        Some(outcome)
    };

    let build_config = RunConfig {
        mode: Mode::Build,
        plan_branch: None,
        ..config.build.clone()
    };
    on_progress(LoopProgress::Phase(Mode::Build));
    let build = run_iterations(&build_config, agent, interrupt, |event| {
        on_progress(LoopProgress::Event(event));
    })?;

    Ok(LoopOutcome {
        readiness,
        plan,
        build: Some(build),
    })
}
