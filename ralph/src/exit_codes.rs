//! Stable exit codes for ralph CLI commands.
//!
//! A run that ends because the agent failed exits with the agent's own code.

/// Command succeeded, or the loop stopped normally (budget reached or done).
pub const OK: i32 = 0;
/// Fatal precondition: invalid flags/config, missing prompt, git or auth failure.
pub const INVALID: i32 = 1;
/// The operator interrupted the run (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;
