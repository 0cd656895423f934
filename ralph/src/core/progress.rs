//! Completion and readiness signals parsed from human-authored documents.
//!
//! The contract is deliberately narrow: a `Status:` line, a standalone `DONE`
//! line, and markdown checklist items. Anything that does not match degrades
//! to an unknown value; parsing never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*status[ \t]*:[ \t]*(.+)$").expect("status regex compiles")
});
static UNCHECKED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*[-*][ \t]+\[ \]").expect("checklist regex compiles")
});

/// Status words that mark a requirements document as ready for building.
const READY_WORDS: [&str; 3] = ["ready", "approved", "final"];

/// Snapshot of the progress document at one iteration boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub exists: bool,
    pub status: Option<String>,
    pub done_marker: bool,
    pub unchecked: usize,
    pub done: bool,
}

/// Readiness of the requirements document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequirementsReadiness {
    pub exists: bool,
    pub status: Option<String>,
    pub ready: bool,
}

/// First `Status: <label>` value in the text, trimmed.
pub fn status_label(text: &str) -> Option<String> {
    let caps = STATUS_LINE.captures(text)?;
    let label = caps.get(1)?.as_str().trim();
    if label.is_empty() {
        return None;
    }
    Some(label.to_string())
}

pub fn parse_progress(text: &str) -> ProgressSnapshot {
    let status = status_label(text);
    let done_marker = text
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("DONE"));
    let unchecked = UNCHECKED_ITEM.find_iter(text).count();
    ProgressSnapshot {
        exists: true,
        status,
        done_marker,
        unchecked,
        done: done_marker && unchecked == 0,
    }
}

pub fn parse_requirements(text: &str) -> RequirementsReadiness {
    let status = status_label(text);
    let ready = status.as_deref().is_some_and(is_ready_label);
    RequirementsReadiness {
        exists: true,
        status,
        ready,
    }
}

/// True iff the first alphabetic run of the label is a ready word.
///
/// `"Ready for build"` and `"approved-v2"` are ready; `"Draft"` and
/// `"not ready"` are not.
fn is_ready_label(label: &str) -> bool {
    let token: String = label
        .chars()
        .skip_while(|c| !c.is_alphabetic())
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    READY_WORDS.contains(&token.as_str())
}
