//! Git identity profiles stored as JSON (`{"profiles": [...]}`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read identity store: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse identity store: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

/// `{id, name}` pair offered to callers when authentication is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<IdentityProfile>,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    profiles: Vec<IdentityProfile>,
}

impl IdentityStore {
    pub fn from_profiles(profiles: Vec<IdentityProfile>) -> Self {
        Self { profiles }
    }

    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let file: ProfilesFile = serde_json::from_str(&content)?;
        Ok(Self::from_profiles(file.profiles))
    }

    /// Like [`IdentityStore::load`], but any failure yields an empty store.
    pub fn try_load(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable identity store");
            Self::default()
        })
    }

    pub fn profiles(&self) -> &[IdentityProfile] {
        &self.profiles
    }

    /// SSH key of the given profile, trimmed; empty keys count as absent.
    pub fn resolve_ssh_key(&self, identity_id: &str) -> Option<PathBuf> {
        let id = identity_id.trim();
        if id.is_empty() {
            return None;
        }
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.ssh_key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(PathBuf::from)
    }

    pub fn summaries(&self) -> Vec<IdentitySummary> {
        self.profiles
            .iter()
            .map(|p| IdentitySummary {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "profiles": [
            {"id": "work", "name": "Work", "userName": "Me", "userEmail": "me@corp", "sshKey": " /keys/work "},
            {"id": "home", "name": "Home", "sshKey": "   "},
            {"id": "plain", "name": "Plain"}
        ]
    }"#;

    #[test]
    fn load_parses_profiles() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("git-identities.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = IdentityStore::load(&path).unwrap();
        assert_eq!(store.profiles().len(), 3);
        assert_eq!(store.profiles()[0].user_email.as_deref(), Some("me@corp"));
    }

    #[test]
    fn resolve_ssh_key_trims_and_ignores_empty() {
        let file: ProfilesFile = serde_json::from_str(SAMPLE).unwrap();
        let store = IdentityStore::from_profiles(file.profiles);
        assert_eq!(store.resolve_ssh_key("work"), Some(PathBuf::from("/keys/work")));
        assert_eq!(store.resolve_ssh_key(" work "), Some(PathBuf::from("/keys/work")));
        assert_eq!(store.resolve_ssh_key("home"), None);
        assert_eq!(store.resolve_ssh_key("plain"), None);
        assert_eq!(store.resolve_ssh_key("missing"), None);
        assert_eq!(store.resolve_ssh_key(""), None);
    }

    #[test]
    fn summaries_list_id_and_name() {
        let file: ProfilesFile = serde_json::from_str(SAMPLE).unwrap();
        let summaries = IdentityStore::from_profiles(file.profiles).summaries();
        assert_eq!(summaries[0].id, "work");
        assert_eq!(summaries[0].name, "Work");
        assert_eq!(summaries.len(), 3);
    }

    #[test]
    fn missing_file_is_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = IdentityStore::load(&tmp.path().join("nope.json")).unwrap();
        assert!(store.profiles().is_empty());
    }

    #[test]
    fn unparsable_file_errors_but_try_load_recovers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            IdentityStore::load(&path),
            Err(IdentityError::Parse(_))
        ));
        assert!(IdentityStore::try_load(&path).profiles().is_empty());
    }
}
