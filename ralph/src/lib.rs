//! Plan/build agent loop orchestrator.
//!
//! ralph invokes an external coding agent over and over with the same prompt.
//! Plan runs happen on a dedicated branch; build runs commit after every
//! iteration and stop once the progress document reports done.
//!
//! - **[`core`]**: Pure, deterministic logic (document parsing, branch naming,
//!   defaulting rules). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, git, agent processes).
//!
//! Orchestration modules ([`engine`], [`looping`], [`status`]) combine the two
//! to implement CLI commands.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
