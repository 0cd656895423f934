//! Scaffolding for `ralph init`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Files written by `ralph init`, with their embedded default contents.
const TEMPLATES: [(&str, &str); 6] = [
    ("AGENTS.md", include_str!("../../templates/AGENTS.md")),
    (
        "IMPLEMENTATION_PLAN.md",
        include_str!("../../templates/IMPLEMENTATION_PLAN.md"),
    ),
    ("PROMPT_build.md", include_str!("../../templates/PROMPT_build.md")),
    ("PROMPT_plan.md", include_str!("../../templates/PROMPT_plan.md")),
    ("REQUIREMENTS.md", include_str!("../../templates/REQUIREMENTS.md")),
    ("ralph.toml", include_str!("../../templates/ralph.toml")),
];

/// Options for `init_ralph_dir`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
    /// Read templates from this directory instead of the built-in copies.
    pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAction {
    Write,
    Overwrite,
    Skip,
}

impl fmt::Display for InitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
        })
    }
}

/// What happened to one scaffolded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitEntry {
    pub action: InitAction,
    pub path: PathBuf,
}

/// Write the prompt, plan, requirements and config files into `target`.
///
/// Existing files are skipped unless `options.force` is set.
pub fn init_ralph_dir(target: &Path, options: &InitOptions) -> Result<Vec<InitEntry>> {
    if let Some(dir) = options.templates_dir.as_deref().filter(|dir| !dir.is_dir()) {
        bail!("templates directory not found: {}", dir.display());
    }
    fs::create_dir_all(target).with_context(|| format!("create directory {}", target.display()))?;

    let mut entries = Vec::with_capacity(TEMPLATES.len());
    for (name, builtin) in TEMPLATES {
        let contents = template_contents(options.templates_dir.as_deref(), name, builtin)?;
        let path = target.join(name);
        let existed = path.exists();
        let action = match (existed, options.force) {
            (true, false) => InitAction::Skip,
            (true, true) => InitAction::Overwrite,
            (false, _) => InitAction::Write,
        };
        if action != InitAction::Skip {
            fs::write(&path, contents).with_context(|| format!("write file {}", path.display()))?;
        }
        debug!(path = %path.display(), %action, "init");
        entries.push(InitEntry { action, path });
    }
    Ok(entries)
}

fn template_contents(dir: Option<&Path>, name: &str, builtin: &str) -> Result<String> {
    let Some(dir) = dir else {
        return Ok(builtin.to_string());
    };
    let src = dir.join(name);
    if !src.is_file() {
        bail!("missing template: {}", src.display());
    }
    fs::read_to_string(&src).with_context(|| format!("read template {}", src.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_to_string(path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    #[test]
    fn init_writes_every_template() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("ralph");

        let entries = init_ralph_dir(&target, &InitOptions::default()).expect("init");

        assert_eq!(entries.len(), TEMPLATES.len());
        assert!(entries.iter().all(|e| e.action == InitAction::Write));
        for (name, builtin) in TEMPLATES {
            assert_eq!(read_to_string(&target.join(name)), builtin);
        }
    }

    #[test]
    fn init_skips_existing_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path();
        fs::write(target.join("AGENTS.md"), "custom").expect("write custom");

        let entries = init_ralph_dir(target, &InitOptions::default()).expect("init");

        let agents = entries
            .iter()
            .find(|e| e.path.ends_with("AGENTS.md"))
            .expect("agents entry");
        assert_eq!(agents.action, InitAction::Skip);
        assert_eq!(read_to_string(&target.join("AGENTS.md")), "custom");
    }

    #[test]
    fn init_with_force_overwrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path();
        fs::write(target.join("PROMPT_build.md"), "custom").expect("write custom");

        let options = InitOptions {
            force: true,
            ..InitOptions::default()
        };
        let entries = init_ralph_dir(target, &options).expect("init");

        let prompt = entries
            .iter()
            .find(|e| e.path.ends_with("PROMPT_build.md"))
            .expect("prompt entry");
        assert_eq!(prompt.action, InitAction::Overwrite);
        assert_ne!(read_to_string(&target.join("PROMPT_build.md")), "custom");
    }

    #[test]
    fn templates_dir_override_is_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        let templates = temp.path().join("templates");
        fs::create_dir_all(&templates).expect("mkdir");
        for (name, _) in TEMPLATES {
            fs::write(templates.join(name), format!("custom {name}\n")).expect("write template");
        }
        let target = temp.path().join("out");

        let options = InitOptions {
            force: false,
            templates_dir: Some(templates),
        };
        init_ralph_dir(&target, &options).expect("init");

        assert_eq!(
            read_to_string(&target.join("PROMPT_plan.md")),
            "custom PROMPT_plan.md\n"
        );
    }

    #[test]
    fn missing_templates_dir_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = InitOptions {
            force: false,
            templates_dir: Some(temp.path().join("nope")),
        };
        let err = init_ralph_dir(temp.path(), &options).unwrap_err();
        assert!(err.to_string().contains("templates directory not found"));
    }

    #[test]
    fn missing_single_template_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let templates = temp.path().join("templates");
        fs::create_dir_all(&templates).expect("mkdir");
        let options = InitOptions {
            force: false,
            templates_dir: Some(templates),
        };
        let err = init_ralph_dir(&temp.path().join("out"), &options).unwrap_err();
        assert!(err.to_string().contains("missing template"));
    }

    #[test]
    fn builtin_plan_template_is_not_done() {
        let (_, plan) = TEMPLATES[1];
        assert!(!crate::core::progress::parse_progress(plan).done);
    }
}
