//! Catalog sources: the built-in curated repository plus user-defined ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSource {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_subpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_identity_id: Option<String>,
}

pub fn curated_sources() -> Vec<CatalogSource> {
    vec![CatalogSource {
        id: "anthropic".to_string(),
        label: "Anthropic".to_string(),
        description: Some("Anthropic's public skills repository".to_string()),
        source: "anthropics/skills".to_string(),
        default_subpath: Some("skills".to_string()),
        git_identity_id: None,
    }]
}

fn trimmed_field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse the `skillCatalogs` array of a settings document.
///
/// Entries missing `id`, `label` or `source` are dropped; the first entry wins
/// for duplicate ids.
pub fn parse_custom_sources(settings: &Value) -> Vec<CatalogSource> {
    let Some(entries) = settings.get("skillCatalogs").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for entry in entries {
        if !entry.is_object() {
            continue;
        }
        let id = trimmed_field(entry, "id");
        let label = trimmed_field(entry, "label");
        let source = trimmed_field(entry, "source");
        if id.is_empty() || label.is_empty() || source.is_empty() {
            continue;
        }
        if !seen.insert(id.to_string()) {
            continue;
        }
        sources.push(CatalogSource {
            id: id.to_string(),
            label: label.to_string(),
            description: Some(source.to_string()),
            source: source.to_string(),
            default_subpath: non_empty(trimmed_field(entry, "subpath")),
            git_identity_id: non_empty(trimmed_field(entry, "gitIdentityId")),
        });
    }
    sources
}

/// Custom sources from the settings file; unreadable settings yield none.
pub fn load_custom_sources(settings_file: &Path) -> Vec<CatalogSource> {
    let content = match std::fs::read_to_string(settings_file) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %settings_file.display(), error = %e, "failed to read settings");
            }
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(settings) => parse_custom_sources(&settings),
        Err(e) => {
            warn!(path = %settings_file.display(), error = %e, "failed to parse settings");
            Vec::new()
        }
    }
}

/// Curated sources followed by custom ones.
pub fn all_sources(settings_file: &Path) -> Vec<CatalogSource> {
    let mut sources = curated_sources();
    sources.extend(load_custom_sources(settings_file));
    sources
}
