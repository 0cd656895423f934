//! CLI tests for `ralph run`, `ralph init` and `ralph status`.
//!
//! Spawns the ralph binary against scratch repositories with `/bin/sh` stub
//! agents and checks exit codes, stdout and on-disk artifacts.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ralph::exit_codes;
use ralph::test_support::TestRepo;

const OPEN_PLAN: &str = "Status: in progress\n- [ ] task\n";

/// Stub agent answering the version and status probes, then running `body` for iterations.
fn stub_agent(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("agent.sh");
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\n  --version) echo 'agent 1.0'; exit 0 ;;\n  status) echo 'Logged in'; exit 0 ;;\nesac\ncat > /dev/null\n{body}\n"
    );
    fs::write(&path, script).expect("write stub");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn ralph(dir: &Path, args: &[&str]) -> Output {
    ralph_with(dir, args, |_| {})
}

fn ralph_with(dir: &Path, args: &[&str], configure: impl FnOnce(&mut Command)) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ralph"));
    cmd.current_dir(dir)
        .env_remove("RALPH_AGENT_CMD")
        .env_remove("RALPH_TEMPLATES_DIR")
        .args(args);
    configure(&mut cmd);
    cmd.output().expect("spawn ralph")
}

const IDENTITY_VARS: [&str; 4] = [
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "GIT_COMMITTER_NAME",
    "GIT_COMMITTER_EMAIL",
];

/// Keep git away from user and system config so only the repo and env decide identity.
fn isolate_git(cmd: &mut Command, home: &Path) {
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env_remove("GIT_CONFIG_GLOBAL")
        .env_remove("EMAIL");
    for var in IDENTITY_VARS {
        cmd.env_remove(var);
    }
}

fn log_events(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .expect("read log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn repo_with_prompt(progress: &str) -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.write("PROMPT_build.md", "build it\n");
    repo.write("IMPLEMENTATION_PLAN.md", progress);
    repo.commit("add ralph files");
    repo
}

#[test]
fn done_progress_exits_zero_without_touching_agent() {
    let repo = repo_with_prompt("- [x] task\nDONE\n");

    let output = ralph(
        repo.path(),
        &["run", "build", "--agent-cmd", "/nonexistent/agent"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    assert!(stdout(&output).contains("already marked done"));
    assert!(repo.git().is_clean().expect("clean"));
    let state_files: Vec<String> = fs::read_dir(repo.state_paths().state_dir)
        .expect("state dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(state_files, vec!["state.json"]);
}

#[test]
fn done_progress_with_log_file_records_single_done_event() {
    let repo = repo_with_prompt("DONE\n");
    let tools = tempfile::tempdir().expect("tempdir");
    let log = tools.path().join("run.jsonl");

    let output = ralph(
        repo.path(),
        &[
            "run",
            "--agent-cmd",
            "/nonexistent/agent",
            "--log-file",
            log.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    let events = log_events(&log);
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0]["event"], "done");
    assert_eq!(events[0]["iteration"], 0);
}

#[test]
fn agent_exit_code_is_propagated() {
    let repo = repo_with_prompt(OPEN_PLAN);
    let tools = tempfile::tempdir().expect("tempdir");
    let agent = stub_agent(tools.path(), "exit 3");
    let log = tools.path().join("run.jsonl");

    let output = ralph(
        repo.path(),
        &[
            "run",
            "build",
            "5",
            "--agent-cmd",
            agent.to_str().expect("utf8 path"),
            "--log-file",
            log.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(output.status.code(), Some(3), "{}", stderr(&output));
    let events: Vec<String> = log_events(&log)
        .iter()
        .map(|value| value["event"].as_str().expect("event").to_string())
        .collect();
    assert_eq!(events, vec!["start", "iteration-start", "error"]);
}

#[test]
fn agent_receives_configured_args_and_loop_reaches_max() {
    let repo = repo_with_prompt(OPEN_PLAN);
    let tools = tempfile::tempdir().expect("tempdir");
    let args_file = tools.path().join("args.txt");
    let agent = stub_agent(
        tools.path(),
        &format!("echo \"$@\" > '{}'\nexit 0", args_file.display()),
    );

    let output = ralph(
        repo.path(),
        &[
            "run",
            "--max",
            "1",
            "--no-force",
            "--model",
            "m1",
            "--skip-auth-check",
            "--agent-cmd",
            agent.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    assert_eq!(
        fs::read_to_string(&args_file).expect("args").trim(),
        "--print --output-format stream-json --model m1"
    );
    let out = stdout(&output);
    assert!(out.contains("Mode:   build"));
    assert!(out.contains("Force:  disabled"));
    assert!(out.contains("==== LOOP 1 ===="));
    assert!(out.contains("Reached max iterations: 1"));
}

#[test]
fn missing_prompt_is_fatal() {
    let repo = TestRepo::new().expect("repo");

    let output = ralph(repo.path(), &["run", "plan", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("Error: prompt file not found"));
}

#[test]
fn unauthenticated_agent_is_fatal() {
    let repo = repo_with_prompt(OPEN_PLAN);
    let tools = tempfile::tempdir().expect("tempdir");
    let agent = tools.path().join("agent.sh");
    fs::write(
        &agent,
        "#!/bin/sh\ncase \"$1\" in\n  --version) echo 'agent 1.0' ;;\n  *) echo 'Error: not logged in'; exit 1 ;;\nesac\n",
    )
    .expect("write stub");
    fs::set_permissions(&agent, fs::Permissions::from_mode(0o755)).expect("chmod");

    let output = ralph(
        repo.path(),
        &["run", "1", "--agent-cmd", agent.to_str().expect("utf8 path")],
    );

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("not authenticated"));
}

#[test]
fn init_writes_then_skips_templates() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = ralph(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK), "{}", stderr(&first));
    assert!(stdout(&first).contains("write PROMPT_build.md"));
    assert!(temp.path().join("REQUIREMENTS.md").is_file());

    let second = ralph(temp.path(), &["init"]);
    assert!(stdout(&second).contains("skip PROMPT_build.md"));

    let forced = ralph(temp.path(), &["init", "--force"]);
    assert!(stdout(&forced).contains("overwrite PROMPT_build.md"));
}

#[test]
fn status_reports_branch_and_documents() {
    let repo = repo_with_prompt(OPEN_PLAN);

    let output = ralph(repo.path(), &["status"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("branch:       main"));
    assert!(out.contains("unchecked: 1, not done"));
}

#[test]
fn missing_git_identity_is_fatal_on_commit() {
    let repo = repo_with_prompt(OPEN_PLAN);
    repo.forget_identity();
    let tools = tempfile::tempdir().expect("tempdir");
    let agent = stub_agent(tools.path(), "echo work > work.txt\nexit 0");

    let output = ralph_with(
        repo.path(),
        &["run", "1", "--skip-auth-check", "--agent-cmd", agent.to_str().expect("utf8 path")],
        |cmd| isolate_git(cmd, tools.path()),
    );

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr(&output).contains("git identity not configured"), "{}", stderr(&output));
    assert_eq!(repo.commit_count(), 2);
}

#[test]
fn git_identity_from_environment_is_enough_to_commit() {
    let repo = repo_with_prompt(OPEN_PLAN);
    repo.forget_identity();
    let tools = tempfile::tempdir().expect("tempdir");
    let agent = stub_agent(tools.path(), "echo work > work.txt\nexit 0");

    let output = ralph_with(
        repo.path(),
        &["run", "1", "--skip-auth-check", "--agent-cmd", agent.to_str().expect("utf8 path")],
        |cmd| {
            isolate_git(cmd, tools.path());
            for var in IDENTITY_VARS {
                let value = if var.ends_with("EMAIL") { "ci@example.com" } else { "CI" };
                cmd.env(var, value);
            }
        },
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    assert_eq!(repo.commit_count(), 3);
    assert!(repo.git().is_clean().expect("clean"));
}

#[test]
fn suggested_log_location_keeps_build_commits_clean() {
    let template = include_str!("../templates/ralph.toml");
    let log_line = template
        .lines()
        .find_map(|line| line.strip_prefix("# log_file = "))
        .expect("log_file suggestion");
    let repo = TestRepo::new().expect("repo");
    repo.write("PROMPT_build.md", "build it\n");
    repo.write("IMPLEMENTATION_PLAN.md", OPEN_PLAN);
    repo.write("ralph.toml", &format!("log_file = {log_line}\n"));
    repo.commit("add ralph files");
    let tools = tempfile::tempdir().expect("tempdir");
    let agent = stub_agent(tools.path(), "echo work > work.txt\nexit 0");

    let output = ralph(
        repo.path(),
        &["run", "2", "--skip-auth-check", "--agent-cmd", agent.to_str().expect("utf8 path")],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{}", stderr(&output));
    assert!(repo.git().is_clean().expect("clean"));
    let log = repo.path().join(log_line.trim_matches('"'));
    let events = log_events(&log);
    assert_eq!(events.last().expect("events")["event"], "stop");
}
