//! Operation-level error taxonomy for scan and install.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentitySummary;
use crate::source::SourceError;
use crate::types::SkillConflict;

/// Wire name of a [`RepoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidSource,
    ToolUnavailable,
    AuthRequired,
    NetworkError,
    Conflicts,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSource => "invalidSource",
            Self::ToolUnavailable => "toolUnavailable",
            Self::AuthRequired => "authRequired",
            Self::NetworkError => "networkError",
            Self::Conflicts => "conflicts",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("{0}")]
    InvalidSource(String),
    #[error("git is not available: {0}")]
    ToolUnavailable(String),
    #[error("{message}")]
    AuthRequired { message: String, ssh_only: bool },
    #[error("{0}")]
    NetworkError(String),
    #[error("skill conflicts detected: {}", conflict_names(.0))]
    Conflicts(Vec<SkillConflict>),
    #[error("{0}")]
    Unknown(String),
}

fn conflict_names(conflicts: &[SkillConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.skill_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, RepoError>;

impl From<SourceError> for RepoError {
    fn from(e: SourceError) -> Self {
        Self::InvalidSource(e.to_string())
    }
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSource(_) => ErrorKind::InvalidSource,
            Self::ToolUnavailable(_) => ErrorKind::ToolUnavailable,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::NetworkError(_) => ErrorKind::NetworkError,
            Self::Conflicts(_) => ErrorKind::Conflicts,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let mut body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            ssh_only: None,
            conflicts: None,
            identities: None,
        };
        match self {
            Self::AuthRequired { ssh_only, .. } => body.ssh_only = Some(*ssh_only),
            Self::Conflicts(conflicts) => body.conflicts = Some(conflicts.clone()),
            _ => {}
        }
        body
    }
}

/// Serialized error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<SkillConflict>>,
    /// Known git identities, offered on `authRequired`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<IdentitySummary>>,
}
