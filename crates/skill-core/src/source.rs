//! Repository reference parsing.
//!
//! Accepts `git@host:owner/repo[.git]`, `https://host/owner/repo[.git]`, and the
//! shorthand `owner/repo[/subpath...]` (GitHub). Every resolved source carries both
//! canonical clone URLs so the transport can be chosen at dial time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host assumed for the `owner/repo` shorthand.
pub const DEFAULT_HOST: &str = "github.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("repository source is required")]
    Empty,
    #[error("unsupported repository source format: {0}")]
    Unsupported(String),
    #[error("repository source is missing the {0}")]
    MissingPart(&'static str),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// A resolved repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSource {
    pub host: String,
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    pub clone_url_ssh: String,
    pub clone_url_https: String,
    /// Always `owner/repo`.
    pub normalized_repo: String,
}

impl RepoSource {
    fn new(host: &str, owner: &str, repo: &str, subpath: Option<String>) -> Result<Self> {
        let owner = owner.trim();
        let repo = repo.trim();
        let repo = repo.strip_suffix(".git").unwrap_or(repo).trim();

        if !is_path_segment(owner) {
            return Err(SourceError::MissingPart("owner"));
        }
        if !is_path_segment(repo) {
            return Err(SourceError::MissingPart("repository name"));
        }

        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            subpath,
            clone_url_ssh: format!("git@{host}:{owner}/{repo}.git"),
            clone_url_https: format!("https://{host}/{owner}/{repo}.git"),
            normalized_repo: format!("{owner}/{repo}"),
        })
    }

    /// Pick the clone URL for the transport in use.
    pub fn clone_url(&self, use_ssh: bool) -> &str {
        if use_ssh {
            &self.clone_url_ssh
        } else {
            &self.clone_url_https
        }
    }
}

/// Resolve a free-form repository reference.
///
/// An explicit `subpath` always wins over one embedded in the shorthand form.
pub fn resolve(raw: &str, subpath: Option<&str>) -> Result<RepoSource> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SourceError::Empty);
    }

    let explicit_subpath = subpath.and_then(normalize_subpath);

    if let Some(rest) = raw.strip_prefix("git@") {
        return parse_ssh(raw, rest, explicit_subpath);
    }

    if let Some(rest) = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
    {
        return parse_https(raw, rest, explicit_subpath);
    }

    parse_shorthand(raw, explicit_subpath)
}

fn parse_ssh(raw: &str, rest: &str, subpath: Option<String>) -> Result<RepoSource> {
    let Some((host, path)) = rest.split_once(':') else {
        return Err(SourceError::Unsupported(raw.to_string()));
    };
    if !is_host(host) {
        return Err(SourceError::Unsupported(raw.to_string()));
    }
    let Some((owner, repo)) = path.split_once('/') else {
        return Err(SourceError::Unsupported(raw.to_string()));
    };
    if has_forbidden_chars(owner) || has_forbidden_chars(repo) || repo.contains('/') {
        return Err(SourceError::Unsupported(raw.to_string()));
    }
    RepoSource::new(host, owner, repo, subpath)
}

fn parse_https(raw: &str, rest: &str, subpath: Option<String>) -> Result<RepoSource> {
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let mut parts = rest.split('/');
    let (Some(host), Some(owner), Some(repo), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SourceError::Unsupported(raw.to_string()));
    };
    if !is_host(host) || has_forbidden_chars(owner) || has_forbidden_chars(repo) {
        return Err(SourceError::Unsupported(raw.to_string()));
    }
    RepoSource::new(host, owner, repo, subpath)
}

fn parse_shorthand(raw: &str, explicit_subpath: Option<String>) -> Result<RepoSource> {
    let mut parts = raw.splitn(3, '/');
    let (Some(owner), Some(repo)) = (parts.next(), parts.next()) else {
        return Err(SourceError::Unsupported(raw.to_string()));
    };
    if owner.is_empty()
        || repo.is_empty()
        || owner.contains(char::is_whitespace)
        || repo.contains(char::is_whitespace)
        || owner.contains(':')
    {
        return Err(SourceError::Unsupported(raw.to_string()));
    }

    let embedded = parts.next().and_then(normalize_subpath);
    RepoSource::new(DEFAULT_HOST, owner, repo, explicit_subpath.or(embedded))
}

/// Trim whitespace and surrounding slashes; empty means "no subpath".
pub fn normalize_subpath(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('/').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a repository-relative directory (`skills/foo`).
///
/// Returns `None` for paths that are empty, absolute, contain `.`/`..` segments,
/// or have a segment starting with `-` (which git would read as an option).
pub fn normalize_repo_path(value: &str) -> Option<String> {
    let trimmed = value.trim().replace('\\', "/");
    if trimmed.starts_with('/') {
        return None;
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." || segment.starts_with('-') {
            return None;
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn is_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

fn has_forbidden_chars(part: &str) -> bool {
    part.contains(char::is_whitespace) || part.contains('#') || part.contains('?')
}

fn is_path_segment(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains('/')
}
