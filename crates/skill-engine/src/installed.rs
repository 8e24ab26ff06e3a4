//! Discovery of skills already installed in the local skill roots.

use skill_core::manifest::MANIFEST_FILE;
use skill_core::{LocalSkill, Scope};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// List installed skills in both roots. Project skills come first.
pub fn discover_installed(user_root: &Path, project_root: Option<&Path>) -> Vec<LocalSkill> {
    let mut skills = Vec::new();
    if let Some(root) = project_root {
        scan_directory(root, Scope::Project, &mut skills);
    }
    scan_directory(user_root, Scope::User, &mut skills);
    debug!(count = skills.len(), "discovered installed skills");
    skills
}

/// Installed skills by name; a project skill shadows a user skill of the same name.
pub fn installed_by_name(skills: Vec<LocalSkill>) -> HashMap<String, LocalSkill> {
    let mut by_name = HashMap::new();
    for skill in skills {
        by_name.entry(skill.name.clone()).or_insert(skill);
    }
    by_name
}

/// Immediate subdirectories of `dir` that contain a manifest.
fn scan_directory(dir: &Path, scope: Scope, skills: &mut Vec<LocalSkill>) {
    if !dir.is_dir() {
        debug!(path = %dir.display(), "skills directory not found, skipping");
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to read skills directory");
            return;
        }
    };

    let mut found: Vec<LocalSkill> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some(LocalSkill {
                name,
                scope,
                path: entry.path(),
            })
        })
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    skills.extend(found);
}
