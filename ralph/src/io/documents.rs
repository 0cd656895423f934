//! Read the progress and requirements documents from disk.
//!
//! A missing or unreadable document is a state, not an error: it yields a
//! snapshot with `exists == false` and every signal off.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::progress::{
    ProgressSnapshot, RequirementsReadiness, parse_progress, parse_requirements,
};

pub fn read_progress(path: &Path) -> ProgressSnapshot {
    match read_optional(path) {
        Some(text) => {
            let snapshot = parse_progress(&text);
            debug!(
                path = %path.display(),
                status = ?snapshot.status,
                unchecked = snapshot.unchecked,
                done = snapshot.done,
                "progress read"
            );
            snapshot
        }
        None => ProgressSnapshot::default(),
    }
}

pub fn read_requirements(path: &Path) -> RequirementsReadiness {
    match read_optional(path) {
        Some(text) => {
            let readiness = parse_requirements(&text);
            debug!(path = %path.display(), status = ?readiness.status, ready = readiness.ready, "requirements read");
            readiness
        }
        None => RequirementsReadiness::default(),
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable document treated as missing");
            None
        }
    }
}
