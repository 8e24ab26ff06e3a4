//! SKILL.md manifest parsing and skill-name validation.
//!
//! A manifest is a leading `---` delimited YAML block followed by a markdown body.
//! Parsing here is lenient: a malformed manifest still yields a (mostly empty)
//! result plus warnings, because the catalog must list the directory anyway.

use serde_yaml::Value;
use thiserror::Error;

/// Manifest file name looked up in every skill directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Maximum skill name length.
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("missing YAML frontmatter")]
    MissingFrontmatter,
    #[error("failed to parse YAML frontmatter: {0}")]
    InvalidYaml(String),
    #[error("invalid skill name: {0}")]
    InvalidName(String),
}

/// Fields extracted from a manifest, plus any problems found on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub body: String,
    pub warnings: Vec<String>,
}

/// Validates a skill name (the directory basename).
///
/// Rules:
/// - 1-64 characters
/// - Lowercase ASCII letters, digits, and hyphens only
/// - Must not start or end with a hyphen
pub fn validate_skill_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName("name cannot be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ManifestError::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} characters (got {})",
            name.len()
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ManifestError::InvalidName(
            "name cannot start or end with a hyphen".to_string(),
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(ManifestError::InvalidName(format!(
            "invalid character '{c}': only lowercase letters, numbers, and hyphens allowed"
        )));
    }
    Ok(())
}

pub fn is_valid_skill_name(name: &str) -> bool {
    validate_skill_name(name).is_ok()
}

/// Last non-empty segment of a repository-relative directory.
pub fn skill_name_from_dir(skill_dir: &str) -> String {
    skill_dir
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .unwrap_or("")
        .to_string()
}

/// Repository-relative path of the manifest inside `skill_dir`.
pub fn manifest_path(skill_dir: &str) -> String {
    if skill_dir.is_empty() {
        MANIFEST_FILE.to_string()
    } else {
        format!("{skill_dir}/{MANIFEST_FILE}")
    }
}

/// Whether a repository path names a manifest file.
pub fn is_manifest_path(path: &str) -> bool {
    path == MANIFEST_FILE || path.ends_with(&format!("/{MANIFEST_FILE}"))
}

/// Split content into (frontmatter, body).
fn split_frontmatter(content: &str) -> Result<(&str, &str), ManifestError> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err(ManifestError::MissingFrontmatter);
    };
    let after_newline = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .ok_or(ManifestError::MissingFrontmatter)?;

    // Empty frontmatter: closing delimiter directly after the opening one.
    if let Some(rest) = after_newline.strip_prefix("---") {
        return Ok(("", strip_leading_newline(rest)));
    }

    let (pos, skip) = match after_newline.find("\n---") {
        Some(pos) => (pos, 4),
        None => return Err(ManifestError::MissingFrontmatter),
    };
    let frontmatter = after_newline[..pos].trim_end_matches('\r');
    Ok((frontmatter, strip_leading_newline(&after_newline[pos + skip..])))
}

fn strip_leading_newline(s: &str) -> &str {
    s.strip_prefix('\n')
        .or_else(|| s.strip_prefix("\r\n"))
        .unwrap_or(s)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

/// Parse manifest content without failing.
///
/// Missing or unparsable frontmatter is reported as a warning and leaves
/// `name`/`description` unset.
pub fn parse_manifest(content: &str) -> Manifest {
    let (frontmatter, body) = match split_frontmatter(content) {
        Ok(parts) => parts,
        Err(e) => {
            return Manifest {
                body: content.trim().to_string(),
                warnings: vec![format!("Invalid {MANIFEST_FILE}: {e}")],
                ..Manifest::default()
            };
        }
    };

    let body = body.trim().to_string();
    if frontmatter.trim().is_empty() {
        return Manifest {
            body,
            ..Manifest::default()
        };
    }

    match serde_yaml::from_str::<Value>(frontmatter) {
        Ok(value) => Manifest {
            name: string_field(&value, "name"),
            description: string_field(&value, "description"),
            body,
            warnings: Vec::new(),
        },
        Err(e) => Manifest {
            body,
            warnings: vec![format!(
                "Invalid {MANIFEST_FILE}: {}",
                ManifestError::InvalidYaml(e.to_string())
            )],
            ..Manifest::default()
        },
    }
}
