//! Agent abstraction for iteration execution.
//!
//! The [`Agent`] trait decouples the loop from the actual coding-agent CLI
//! (by default `cursor-agent`). Tests use scripted agents that return
//! predetermined exit codes without spawning processes.

use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::OutputFormat;
use crate::io::interrupt::{Interrupt, Interrupted, POLL_INTERVAL};
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_AGENT_CMD: &str = "cursor-agent";

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

static NOT_AUTHENTICATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not authenticated|not logged in|login required")
        .expect("auth regex compiles")
});

/// How to invoke the agent CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    pub command: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub output_format: OutputFormat,
    pub force: bool,
    pub verbose: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            command: DEFAULT_AGENT_CMD.to_string(),
            api_key: None,
            model: None,
            output_format: OutputFormat::default(),
            force: true,
            verbose: false,
        }
    }
}

impl AgentOptions {
    /// Arguments for one non-interactive iteration; the prompt goes to stdin.
    pub fn iteration_args(&self) -> Vec<String> {
        let mut args = self.credential_args();
        args.push("--print".to_string());
        args.push("--output-format".to_string());
        args.push(self.output_format.as_str().to_string());
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.force {
            args.push("--force".to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }

    fn credential_args(&self) -> Vec<String> {
        match &self.api_key {
            Some(key) => vec!["--api-key".to_string(), key.clone()],
            None => Vec::new(),
        }
    }
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest<'a> {
    /// Working directory for the agent process.
    pub workdir: &'a Path,
    /// Prompt text written to the agent's stdin.
    pub prompt: &'a str,
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Fail with installation guidance when the agent cannot be run at all.
    fn check_installed(&self) -> Result<()>;

    /// Fail with login guidance when the agent reports it is not authenticated.
    fn check_auth(&self) -> Result<()>;

    /// Run one iteration to completion and return its exit code.
    fn run(&self, request: &AgentRequest<'_>) -> Result<i32>;
}

/// Agent that spawns the configured CLI with inherited stdout/stderr.
pub struct CliAgent {
    options: AgentOptions,
    interrupt: Interrupt,
}

impl CliAgent {
    pub fn new(options: AgentOptions, interrupt: Interrupt) -> Self {
        Self { options, interrupt }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }
}

impl Agent for CliAgent {
    #[instrument(skip_all, fields(command = %self.options.command))]
    fn check_installed(&self) -> Result<()> {
        let cmd_name = &self.options.command;
        let mut cmd = Command::new(cmd_name);
        cmd.arg("--version");
        let probe = run_command_with_timeout(cmd, PROBE_TIMEOUT, PROBE_OUTPUT_LIMIT_BYTES);
        let output = match probe {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => bail!(
                "agent CLI not found (expected '{cmd_name}'); install it and ensure it is on your PATH, or pass --agent-cmd"
            ),
            Err(err) => return Err(err).with_context(|| format!("run '{cmd_name} --version'")),
        };
        if output.timed_out || !output.status.success() {
            let msg = output.combined_text();
            bail!(
                "agent CLI check failed: {}",
                if msg.is_empty() { "non-zero exit" } else { msg.as_str() }
            );
        }
        debug!(version = %output.combined_text(), "agent CLI available");
        Ok(())
    }

    #[instrument(skip_all, fields(command = %self.options.command))]
    fn check_auth(&self) -> Result<()> {
        let cmd_name = &self.options.command;
        let mut cmd = Command::new(cmd_name);
        cmd.args(self.options.credential_args()).arg("status");
        let output = run_command_with_timeout(cmd, PROBE_TIMEOUT, PROBE_OUTPUT_LIMIT_BYTES)
            .context("check agent auth status")?;
        let text = output.combined_text();
        if output.timed_out || !output.status.success() || NOT_AUTHENTICATED.is_match(&text) {
            warn!(exit_code = ?output.status.code(), "agent not authenticated");
            bail!(
                "agent CLI is not authenticated; run '{cmd_name} login' or set CURSOR_API_KEY / --api-key (or pass --skip-auth-check)"
            );
        }
        debug!("agent authenticated");
        Ok(())
    }

    #[instrument(skip_all, fields(command = %self.options.command))]
    fn run(&self, request: &AgentRequest<'_>) -> Result<i32> {
        let args = self.options.iteration_args();
        info!(workdir = %request.workdir.display(), "starting agent");
        let spawned = Command::new(&self.options.command)
            .args(&args)
            .current_dir(request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                error!(err = %err, "failed to spawn agent");
                return Ok(1);
            }
        };

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let prompt = request.prompt.to_string();
        // Written off-thread so an agent that never reads stdin cannot block interrupts.
        let writer = thread::spawn(move || match stdin.write_all(prompt.as_bytes()) {
            Err(err) if err.kind() != ErrorKind::BrokenPipe => {
                warn!(err = %err, "failed to write prompt to agent");
            }
            _ => {}
        });

        let status = loop {
            if self.interrupt.is_set() {
                warn!("interrupt received, stopping agent");
                let _ = child.kill();
                let _ = child.wait();
                return Err(Interrupted.into());
            }
            if let Some(status) = child
                .wait_timeout(POLL_INTERVAL)
                .context("wait for agent")?
            {
                break status;
            }
        };
        if writer.join().is_err() {
            warn!("prompt writer thread panicked");
        }
        // Ctrl-C in a terminal reaches the agent too, which may exit before the next poll.
        if self.interrupt.is_set() || killed_by_sigint(&status) {
            warn!(status = %status, "agent stopped by interrupt");
            return Err(Interrupted.into());
        }

        let code = status.code().unwrap_or(1);
        debug!(exit_code = code, "agent finished");
        Ok(code)
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: &ExitStatus) -> bool {
    false
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.root_cause()
        .downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}
