//! Request, result, and catalog types shared by the engine and its callers.
//!
//! Wire names are camelCase to match the JSON boundary consumed by the UI.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ErrorBody, RepoError};
use crate::source::RepoSource;

/// Optional credential reference for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,
}

impl Identity {
    pub fn with_key(path: impl Into<PathBuf>) -> Self {
        Self {
            ssh_key_path: Some(path.into()),
        }
    }

    /// The SSH key, ignoring an empty path.
    pub fn ssh_key(&self) -> Option<&Path> {
        self.ssh_key_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Install scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Project,
}

impl Scope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "user" => Some(Self::User),
            "project" => Some(Self::Project),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-wide conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    SkipAll,
    OverwriteAll,
}

/// Per-skill conflict decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictDecision {
    Skip,
    Overwrite,
}

impl ConflictDecision {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "skip" => Some(Self::Skip),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// Whether a catalog entry is already present locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledBadge {
    pub is_installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

/// One discovered skill directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Catalog source this item came from (absent for ad-hoc scans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// The source string as the caller supplied it.
    pub repo_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_subpath: Option<String>,
    pub skill_dir: String,
    pub skill_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub installable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstalledBadge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub normalized_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_subpath: Option<String>,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSelection {
    pub skill_dir: String,
}

impl InstallSelection {
    pub fn new(skill_dir: impl Into<String>) -> Self {
        Self {
            skill_dir: skill_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSkill {
    pub skill_name: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSkill {
    pub skill_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillConflict {
    pub skill_name: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub installed: Vec<InstalledSkill>,
    pub skipped: Vec<SkippedSkill>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub source: String,
    #[serde(default)]
    pub subpath: Option<String>,
    #[serde(default)]
    pub default_subpath: Option<String>,
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Identity store lookup; an inline `identity` key takes precedence.
    #[serde(default)]
    pub git_identity_id: Option<String>,
}

impl ScanRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub source: String,
    #[serde(default)]
    pub subpath: Option<String>,
    #[serde(default)]
    pub default_subpath: Option<String>,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub git_identity_id: Option<String>,
    /// `user` or `project`; anything else is rejected at install time.
    pub scope: String,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub user_skill_dir: Option<PathBuf>,
    pub selections: Vec<InstallSelection>,
    #[serde(default)]
    pub conflict_policy: Option<ConflictPolicy>,
    #[serde(default)]
    pub conflict_decisions: HashMap<String, ConflictDecision>,
}

/// `{ok:true, normalizedRepo, effectiveSubpath?, items}` or `{ok:false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<Result<ScanResult, RepoError>> for ScanResponse {
    fn from(result: Result<ScanResult, RepoError>) -> Self {
        match result {
            Ok(result) => Self {
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                result: None,
                error: Some(e.to_body()),
            },
        }
    }
}

/// `{ok:true, installed, skipped}` or `{ok:false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: Option<InstallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<Result<InstallOutcome, RepoError>> for InstallResponse {
    fn from(result: Result<InstallOutcome, RepoError>) -> Self {
        match result {
            Ok(outcome) => Self {
                ok: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                outcome: None,
                error: Some(e.to_body()),
            },
        }
    }
}

/// Aggregated catalog across all configured sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub ok: bool,
    pub sources: Vec<crate::catalog::CatalogSource>,
    pub items_by_source: HashMap<String, Vec<CatalogItem>>,
}

/// Skills already present in a local skill root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSkill {
    pub name: String,
    pub scope: Scope,
    pub path: PathBuf,
}

/// Resolve a source and pick the effective subpath.
///
/// The resolver's subpath (explicit or embedded) wins, then a non-empty default.
pub fn effective_subpath(source: &RepoSource, default_subpath: Option<&str>) -> Option<String> {
    source
        .subpath
        .clone()
        .or_else(|| default_subpath.and_then(crate::source::normalize_subpath))
}
