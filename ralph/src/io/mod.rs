//! I/O helpers for ralph commands.

pub mod agent;
pub mod config;
pub mod documents;
pub mod event_log;
pub mod git;
pub mod init;
pub mod interrupt;
pub mod paths;
pub mod plan_branch;
pub mod process;
pub mod run_state;
