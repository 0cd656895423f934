//! Plan branch naming.

use chrono::{DateTime, Utc};

/// Upper bound on candidates tried for an auto-named plan branch.
pub const MAX_PLAN_BRANCH_CANDIDATES: u32 = 100;

/// Base name derived from a UTC instant: `plan-20261019T083015Z`.
pub fn plan_branch_base(now: DateTime<Utc>) -> String {
    format!("plan-{}", now.format("%Y%m%dT%H%M%SZ"))
}

/// Candidate `n` (1-indexed) for `base`: the base itself, then `base-2`, `base-3`, ...
pub fn plan_branch_candidate(base: &str, n: u32) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}
