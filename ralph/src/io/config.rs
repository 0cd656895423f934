//! Loop defaults stored in `ralph.toml` in the ralph directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::OutputFormat;
use crate::io::agent::DEFAULT_AGENT_CMD;

/// Loop configuration (TOML).
///
/// Every key is optional; command-line flags and environment variables take
/// precedence over values found here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    /// Agent CLI to invoke.
    pub agent_cmd: String,

    /// Model passed to the agent with `--model`.
    pub model: Option<String>,

    pub output_format: OutputFormat,

    /// Pass `--force` so the agent may edit files in print mode.
    pub force: bool,

    pub verbose: bool,

    /// Pause between iterations, in seconds.
    pub sleep_secs: u64,

    /// Wall-clock budget for a run, in seconds (0 = unlimited).
    pub max_duration_secs: u64,

    /// Iteration budget for the plan phase of `ralph loop`.
    pub plan_max: u32,

    pub skip_auth_check: bool,

    /// Append-only run log. Relative paths resolve against the ralph directory.
    pub log_file: Option<PathBuf>,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            agent_cmd: DEFAULT_AGENT_CMD.to_string(),
            model: None,
            output_format: OutputFormat::StreamJson,
            force: true,
            verbose: false,
            sleep_secs: 0,
            max_duration_secs: 0,
            plan_max: 3,
            skip_auth_check: false,
            log_file: None,
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_cmd.trim().is_empty() {
            return Err(anyhow!("agent_cmd must be non-empty"));
        }
        if self.plan_max == 0 {
            return Err(anyhow!("plan_max must be > 0"));
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(anyhow!("model must be non-empty when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}
