//! Command-line entry point for ralph.
//!
//! Runs a coding agent repeatedly against a fixed prompt, in plan or build
//! mode, keeping planning work on its own git branch and committing after
//! every build iteration.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};

use ralph::core::types::{Mode, OutputFormat, StopReason, resolve_until_done};
use ralph::engine::{RunConfig, run_iterations};
use ralph::exit_codes;
use ralph::io::agent::{AgentOptions, CliAgent};
use ralph::io::config::{RalphConfig, load_config};
use ralph::io::event_log::{EventKind, LogEvent};
use ralph::io::init::{InitOptions, init_ralph_dir};
use ralph::io::interrupt::{Interrupt, Interrupted};
use ralph::io::paths::RalphPaths;
use ralph::logging;
use ralph::looping::{LoopConfig, LoopProgress, run_loop};
use ralph::status::StatusReport;

const AGENT_CMD_ENV: &str = "RALPH_AGENT_CMD";
const TEMPLATES_DIR_ENV: &str = "RALPH_TEMPLATES_DIR";

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Run a coding agent in a loop against a fixed prompt"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write prompt, plan, requirements and config templates.
    Init {
        /// Target directory (default: current directory).
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the agent in plan or build mode: `ralph run [plan|build] [max]`.
    Run(RunArgs),
    /// Plan until requirements are ready, then build.
    Loop(LoopArgs),
    /// Show branch, run state and document status.
    Status {
        /// Ralph directory holding the documents (default: current directory).
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Optional mode (`plan` or `build`) followed by an optional iteration budget.
    #[arg(value_name = "MODE|MAX")]
    positional: Vec<String>,
    /// Prompt mode (default: build).
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Max iterations (0 = unlimited).
    #[arg(long, value_name = "N")]
    max: Option<u32>,
    /// Name for the plan branch instead of a timestamp.
    #[arg(long, value_name = "NAME")]
    plan_branch: Option<String>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct LoopArgs {
    /// Max build iterations (0 = unlimited).
    #[arg(long, value_name = "N")]
    max: Option<u32>,
    /// Max plan iterations (default: config `plan_max`, else 3).
    #[arg(long, value_name = "N")]
    plan_max: Option<u32>,
    /// Name for the plan branch instead of a timestamp.
    #[arg(long, value_name = "NAME")]
    plan_branch: Option<String>,
    /// Requirements document (default: REQUIREMENTS.md in the ralph directory).
    #[arg(long, value_name = "PATH")]
    requirements_file: Option<PathBuf>,
    #[command(flatten)]
    common: CommonArgs,
}

/// Flags shared by `run` and `loop`.
#[derive(Args, Default)]
struct CommonArgs {
    /// Ralph directory holding prompts, plan and config (default: current directory).
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
    /// Prompt file (default: PROMPT_<mode>.md in the ralph directory).
    #[arg(long, value_name = "PATH")]
    prompt_file: Option<PathBuf>,
    /// Progress document (default: IMPLEMENTATION_PLAN.md in the ralph directory).
    #[arg(long, value_name = "PATH")]
    progress_file: Option<PathBuf>,
    /// Wall-clock budget in seconds (0 = unlimited).
    #[arg(long, value_name = "SECS")]
    max_duration: Option<u64>,
    /// Pause between iterations in seconds.
    #[arg(long, value_name = "SECS")]
    sleep: Option<u64>,
    /// Stop the build loop once the progress document reports done (build default).
    #[arg(long, overrides_with = "no_until_done")]
    until_done: bool,
    #[arg(long, overrides_with = "until_done")]
    no_until_done: bool,
    #[arg(long, value_enum, value_name = "FORMAT")]
    output_format: Option<OutputFormat>,
    /// Allow file changes in print mode (default).
    #[arg(long, overrides_with = "no_force")]
    force: bool,
    #[arg(long, overrides_with = "force")]
    no_force: bool,
    /// API key passed to the agent (else the agent reads CURSOR_API_KEY).
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,
    /// Agent CLI command (default: cursor-agent, or RALPH_AGENT_CMD).
    #[arg(long, value_name = "CMD")]
    agent_cmd: Option<String>,
    #[arg(long, value_name = "NAME")]
    model: Option<String>,
    /// Skip the agent `status` check.
    #[arg(long)]
    skip_auth_check: bool,
    /// Pass --verbose to the agent.
    #[arg(long)]
    verbose: bool,
    /// Append JSONL run events to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl CommonArgs {
    fn explicit_until_done(&self) -> Option<bool> {
        flag_pair(self.until_done, self.no_until_done)
    }
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
            eprintln!("Interrupted");
            exit_codes::INTERRUPTED
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse_from(normalize_args(env::args_os()));
    match cli.command {
        Command::Init { dir, force } => cmd_init(dir, force),
        Command::Run(args) => cmd_run(args),
        Command::Loop(args) => cmd_loop(args),
        Command::Status { dir } => cmd_status(dir),
    }
}

/// Anything that is not a subcommand means `run`: `ralph plan 5`, `ralph 5`,
/// `ralph --max 2`, or a bare `ralph`. `-v` is accepted for `--version`.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args: Vec<OsString> = args.into_iter().collect();
    let first = args.get(1).map(|arg| arg.to_string_lossy().into_owned());
    match first.as_deref() {
        Some("-v") => args[1] = OsString::from("--version"),
        Some("-h" | "--help" | "-V" | "--version" | "help") => {}
        Some(name) if Cli::command().find_subcommand(name).is_some() => {}
        _ => args.insert(args.len().min(1), OsString::from("run")),
    }
    args
}

fn cmd_init(dir: Option<PathBuf>, force: bool) -> Result<i32> {
    let cwd = env::current_dir().context("resolve current directory")?;
    let target = dir.map_or_else(|| cwd.clone(), |dir| cwd.join(dir));
    let options = InitOptions {
        force,
        templates_dir: env_value(TEMPLATES_DIR_ENV).map(|dir| cwd.join(dir)),
    };
    for entry in init_ralph_dir(&target, &options)? {
        let shown = entry.path.strip_prefix(&cwd).unwrap_or(&entry.path);
        println!("{} {}", entry.action, shown.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let (mode, max) = parse_positionals(&args.positional, args.mode, args.max)?;
    let settings = Settings::load(&args.common)?;
    let mut config = settings.run_config(&args.common, mode);
    config.max_iterations = max;
    config.until_done = resolve_until_done(mode, args.common.explicit_until_done(), false);
    config.plan_branch = args.plan_branch;

    let interrupt = Interrupt::install()?;
    let agent = CliAgent::new(settings.agent.clone(), interrupt.clone());
    let outcome = run_iterations(&config, &agent, &interrupt, |event| {
        report_event(event, &config.prompt_path, &settings.agent);
    })?;
    Ok(outcome.exit_code())
}

fn cmd_loop(args: LoopArgs) -> Result<i32> {
    let settings = Settings::load(&args.common)?;
    let mut build = settings.run_config(&args.common, Mode::Build);
    build.max_iterations = args.max.unwrap_or(0);
    build.until_done = resolve_until_done(Mode::Build, args.common.explicit_until_done(), true);
    let plan_max = args.plan_max.unwrap_or(settings.config.plan_max);
    if plan_max == 0 {
        bail!("--plan-max must be > 0");
    }
    let requirements_path = match &args.requirements_file {
        Some(path) => settings.workdir.join(path),
        None => settings.paths.requirements_path.clone(),
    };
    let config = LoopConfig {
        plan_prompt_path: settings.paths.prompt_path(Mode::Plan),
        requirements_path,
        plan_max,
        plan_branch: args.plan_branch,
        build,
    };

    let interrupt = Interrupt::install()?;
    let agent = CliAgent::new(settings.agent.clone(), interrupt.clone());
    let outcome = run_loop(&config, &agent, &interrupt, |progress| match progress {
        LoopProgress::PlanSkipped(readiness) => println!(
            "Requirements ready (Status: {}); skipping plan phase.",
            readiness.status.as_deref().unwrap_or("unknown")
        ),
        LoopProgress::Phase(mode) => println!("\n>>> {mode} phase"),
        LoopProgress::Event(event) => {
            let prompt = match event.mode {
                Mode::Plan => &config.plan_prompt_path,
                Mode::Build => &config.build.prompt_path,
            };
            report_event(event, prompt, &settings.agent);
        }
    })?;
    Ok(outcome.exit_code())
}

fn cmd_status(dir: Option<PathBuf>) -> Result<i32> {
    let workdir = env::current_dir().context("resolve current directory")?;
    let ralph_dir = dir.map_or_else(|| workdir.clone(), |dir| workdir.join(dir));
    let report = StatusReport::collect(&workdir, &RalphPaths::new(ralph_dir))?;
    print!("{}", report.render());
    Ok(exit_codes::OK)
}

/// `[plan|build] [max]`, with `--mode` / `--max` taking precedence.
fn parse_positionals(
    positional: &[String],
    mode: Option<Mode>,
    max: Option<u32>,
) -> Result<(Mode, u32)> {
    let mut rest = positional.iter().map(String::as_str).peekable();
    let mode = match mode {
        Some(mode) => mode,
        None => match rest.peek().and_then(|arg| arg.parse::<Mode>().ok()) {
            Some(mode) => {
                rest.next();
                mode
            }
            None => Mode::Build,
        },
    };
    let max = match max {
        Some(max) => max,
        None => match rest.peek().and_then(|arg| arg.parse::<u32>().ok()) {
            Some(max) => {
                rest.next();
                max
            }
            None => 0,
        },
    };
    let unknown: Vec<&str> = rest.collect();
    if !unknown.is_empty() {
        bail!("unknown arguments: {}", unknown.join(" "));
    }
    Ok((mode, max))
}

/// Config file, environment and flags resolved into one place.
struct Settings {
    workdir: PathBuf,
    paths: RalphPaths,
    config: RalphConfig,
    agent: AgentOptions,
}

impl Settings {
    fn load(common: &CommonArgs) -> Result<Self> {
        let workdir = env::current_dir().context("resolve current directory")?;
        let ralph_dir = common
            .dir
            .as_ref()
            .map_or_else(|| workdir.clone(), |dir| workdir.join(dir));
        let paths = RalphPaths::new(ralph_dir);
        let config = load_config(&paths.config_path)?;
        let agent = agent_options(common, &config, env_value(AGENT_CMD_ENV));
        Ok(Self {
            workdir,
            paths,
            config,
            agent,
        })
    }

    fn run_config(&self, common: &CommonArgs, mode: Mode) -> RunConfig {
        let mut config = RunConfig::new(mode, &self.workdir, &self.paths);
        if let Some(prompt) = &common.prompt_file {
            config.prompt_path = self.workdir.join(prompt);
        }
        if let Some(progress) = &common.progress_file {
            config.progress_path = self.workdir.join(progress);
        }
        config.max_duration =
            Duration::from_secs(common.max_duration.unwrap_or(self.config.max_duration_secs));
        config.sleep = Duration::from_secs(common.sleep.unwrap_or(self.config.sleep_secs));
        config.skip_auth_check = common.skip_auth_check || self.config.skip_auth_check;
        config.log_path = match (&common.log_file, &self.config.log_file) {
            (Some(path), _) => Some(self.workdir.join(path)),
            (None, Some(path)) => Some(self.paths.ralph_dir.join(path)),
            (None, None) => None,
        };
        config
    }
}

/// Flag > environment > config file > built-in default.
fn agent_options(
    common: &CommonArgs,
    config: &RalphConfig,
    env_command: Option<String>,
) -> AgentOptions {
    AgentOptions {
        command: common
            .agent_cmd
            .clone()
            .or(env_command)
            .unwrap_or_else(|| config.agent_cmd.clone()),
        api_key: common.api_key.clone(),
        model: common.model.clone().or_else(|| config.model.clone()),
        output_format: common.output_format.unwrap_or(config.output_format),
        force: flag_pair(common.force, common.no_force).unwrap_or(config.force),
        verbose: common.verbose || config.verbose,
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn report_event(event: &LogEvent, prompt: &Path, agent: &AgentOptions) {
    match &event.kind {
        EventKind::Start { max, until_done } => {
            print_banner(event, prompt, agent, *max, *until_done);
        }
        EventKind::IterationStart { .. } => {}
        EventKind::IterationEnd {
            iteration, commit, ..
        } => {
            if let Some(commit) = commit {
                println!("Committed {commit}");
            }
            println!("\n==== LOOP {iteration} ====");
        }
        EventKind::Error {
            iteration,
            exit_code,
        } => {
            eprintln!("Agent exited with code {exit_code} on iteration {iteration}");
        }
        EventKind::Stop {
            iteration,
            reason: StopReason::Max,
        } => println!("Reached max iterations: {iteration}"),
        EventKind::Stop {
            reason: StopReason::Time,
            ..
        } => println!("Reached max duration"),
        EventKind::Done { iteration: 0 } => {
            println!("Progress already marked done; nothing to do.");
        }
        EventKind::Done { iteration } => {
            println!("Progress marked done after {iteration} iteration(s).");
        }
    }
}

fn print_banner(
    event: &LogEvent,
    prompt: &Path,
    agent: &AgentOptions,
    max: u32,
    until_done: bool,
) {
    let shown = env::current_dir()
        .ok()
        .and_then(|cwd| prompt.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| prompt.to_path_buf());
    println!("------------------------------");
    println!("Mode:   {}", event.mode);
    println!("Prompt: {}", shown.display());
    println!("Agent:  {}", agent.command);
    println!("Format: {}", agent.output_format);
    println!(
        "Force:  {}",
        if agent.force { "enabled" } else { "disabled" }
    );
    if let Some(model) = &agent.model {
        println!("Model:  {model}");
    }
    if max > 0 {
        println!("Max:    {max} iterations");
    }
    if let Some(branch) = &event.branch {
        println!("Branch: {branch}");
    }
    if until_done {
        println!("Until:  done");
    }
    println!("------------------------------");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(normalize_args(args.iter().map(OsString::from)))
    }

    #[test]
    fn parse_init_force() {
        let cli = parse(&["ralph", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, dir: None }));
    }

    #[test]
    fn shorthand_mode_means_run() {
        let cli = parse(&["ralph", "plan", "5"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.positional, vec!["plan", "5"]);
        let (mode, max) = parse_positionals(&args.positional, args.mode, args.max).expect("parse");
        assert_eq!(mode, Mode::Plan);
        assert_eq!(max, 5);
    }

    #[test]
    fn bare_max_and_flags_mean_run() {
        for argv in [
            &["ralph", "5"][..],
            &["ralph", "--max", "2"][..],
            &["ralph"][..],
        ] {
            let cli = parse(argv);
            assert!(matches!(cli.command, Command::Run(_)), "{argv:?}");
        }
        let Command::Run(args) = parse(&["ralph", "5"]).command else {
            panic!("expected run");
        };
        let (mode, max) = parse_positionals(&args.positional, args.mode, args.max).expect("parse");
        assert_eq!((mode, max), (Mode::Build, 5));
    }

    #[test]
    fn subcommands_and_version_flags_pass_through() {
        let argv = |args: &[&str]| normalize_args(args.iter().map(OsString::from));
        assert_eq!(argv(&["ralph", "status"]), vec!["ralph", "status"]);
        assert_eq!(argv(&["ralph", "loop"])[1], "loop");
        assert_eq!(argv(&["ralph", "help"])[1], "help");
        assert_eq!(argv(&["ralph", "-v"])[1], "--version");
        assert_eq!(argv(&["ralph", "--help"])[1], "--help");
    }

    #[test]
    fn positionals_default_to_unbounded_build() {
        assert_eq!(parse_positionals(&[], None, None).expect("parse"), (Mode::Build, 0));
        assert_eq!(
            parse_positionals(&["7".to_string()], None, None).expect("parse"),
            (Mode::Build, 7)
        );
    }

    #[test]
    fn flags_take_precedence_over_positionals() {
        let positional = vec!["3".to_string()];
        let (mode, max) =
            parse_positionals(&positional, Some(Mode::Plan), None).expect("parse");
        assert_eq!((mode, max), (Mode::Plan, 3));
        let err = parse_positionals(&positional, None, Some(2)).unwrap_err();
        assert!(err.to_string().contains("unknown arguments: 3"));
    }

    #[test]
    fn unknown_positional_is_rejected() {
        let err = parse_positionals(&["build".to_string(), "soon".to_string()], None, None)
            .unwrap_err();
        assert!(err.to_string().contains("unknown arguments: soon"));
    }

    #[test]
    fn force_flags_resolve_last_wins() {
        let cli = parse(&["ralph", "run", "--force", "--no-force"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(flag_pair(args.common.force, args.common.no_force), Some(false));
    }

    #[test]
    fn until_done_flags_resolve() {
        let cli = parse(&["ralph", "loop", "--no-until-done", "--plan-max", "2"]);
        let Command::Loop(args) = cli.command else {
            panic!("expected loop");
        };
        assert_eq!(args.common.explicit_until_done(), Some(false));
        assert_eq!(args.plan_max, Some(2));
    }

    #[test]
    fn agent_options_follow_precedence() {
        let config = RalphConfig {
            agent_cmd: "from-config".to_string(),
            model: Some("config-model".to_string()),
            force: false,
            ..RalphConfig::default()
        };

        let defaults = agent_options(&CommonArgs::default(), &config, None);
        assert_eq!(defaults.command, "from-config");
        assert_eq!(defaults.model.as_deref(), Some("config-model"));
        assert!(!defaults.force);

        let from_env = agent_options(&CommonArgs::default(), &config, Some("from-env".into()));
        assert_eq!(from_env.command, "from-env");

        let flags = CommonArgs {
            agent_cmd: Some("from-flag".to_string()),
            model: Some("flag-model".to_string()),
            force: true,
            output_format: Some(OutputFormat::Text),
            ..CommonArgs::default()
        };
        let resolved = agent_options(&flags, &config, Some("from-env".into()));
        assert_eq!(resolved.command, "from-flag");
        assert_eq!(resolved.model.as_deref(), Some("flag-model"));
        assert!(resolved.force);
        assert_eq!(resolved.output_format, OutputFormat::Text);
    }

    #[test]
    fn invalid_output_format_is_a_parse_error() {
        let result = Cli::try_parse_from(["ralph", "run", "--output-format", "yaml"]);
        assert!(result.is_err());
    }
}
