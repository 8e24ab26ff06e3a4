//! Configuration for the skill catalog and installer.
//!
//! Uses the same `key=value` file format as the rest of the tooling.
//! Precedence: CLI flags > `--config` file > `.skills/config` > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default location of the workspace-local config file.
pub const LOCAL_CONFIG_PATH: &str = ".skills/config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("invalid url rewrite (expected base=prefix): {0}")]
    InvalidRewrite(String),
}

/// A `url.<base>.insteadOf=<prefix>` pair handed to git on every call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UrlRewrite {
    /// URL prefix git should actually dial.
    pub base: String,
    /// URL prefix as written in the clone URL.
    pub instead_of: String,
}

/// Catalog and installer configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Tooling
    pub git_bin: PathBuf,
    pub url_rewrites: Vec<UrlRewrite>,

    // Install targets
    /// Root for `user`-scope installs.
    pub user_skill_dir: PathBuf,
    /// Root for `project`-scope installs, relative to the working directory.
    pub project_skill_dir: PathBuf,

    /// Parent directory for ephemeral clones.
    pub temp_dir: PathBuf,

    // Subprocess limits
    pub probe_timeout_ms: u64,
    pub metadata_timeout_ms: u64,
    pub listing_timeout_ms: u64,
    pub checkout_timeout_ms: u64,
    pub clone_timeout_ms: u64,
    pub max_buffer_bytes: usize,

    // Copy rules for installs
    /// Fail an install on symlinks instead of skipping them.
    pub reject_symlinks: bool,
    pub preserve_permissions: bool,

    /// Maximum concurrent manifest reads during a scan.
    pub scan_concurrency: usize,
    pub cache_ttl_ms: u64,

    // External stores
    pub identities_file: PathBuf,
    pub settings_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git_bin: PathBuf::from("git"),
            url_rewrites: Vec::new(),
            user_skill_dir: home_config_dir().join("opencode/skill"),
            project_skill_dir: PathBuf::from(".opencode/skill"),
            temp_dir: std::env::temp_dir(),
            probe_timeout_ms: 5_000,
            metadata_timeout_ms: 15_000,
            listing_timeout_ms: 30_000,
            checkout_timeout_ms: 60_000,
            clone_timeout_ms: 90_000,
            max_buffer_bytes: 10 * 1024 * 1024,
            reject_symlinks: true,
            preserve_permissions: true,
            scan_concurrency: 10,
            cache_ttl_ms: 30 * 60 * 1000,
            identities_file: home_config_dir().join("openchamber/git-identities.json"),
            settings_file: home_config_dir().join("openchamber/settings.json"),
        }
    }
}

/// `~/.config`, falling back to a relative path when no home directory is known.
fn home_config_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".config"), |h| h.join(".config"))
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load `--config` if given, else `.skills/config` under `workspace_root` when present.
    pub fn discover(explicit: Option<&Path>, workspace_root: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = workspace_root.join(LOCAL_CONFIG_PATH);
        if local.is_file() {
            return Self::from_file(&local);
        }
        Ok(Self::default())
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content, &path.display().to_string())
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str, source: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value, source)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn apply_value(&mut self, key: &str, value: &str, source: &str) -> Result<(), ConfigError> {
        match key {
            "git_bin" => self.git_bin = PathBuf::from(value),
            "url_rewrites" => self.url_rewrites = Self::parse_rewrites(value)?,
            "user_skill_dir" => self.user_skill_dir = expand_home(value),
            "project_skill_dir" => self.project_skill_dir = PathBuf::from(value),
            "temp_dir" => self.temp_dir = expand_home(value),
            "probe_timeout_ms" => self.probe_timeout_ms = Self::parse_int(key, value)?,
            "metadata_timeout_ms" => self.metadata_timeout_ms = Self::parse_int(key, value)?,
            "listing_timeout_ms" => self.listing_timeout_ms = Self::parse_int(key, value)?,
            "checkout_timeout_ms" => self.checkout_timeout_ms = Self::parse_int(key, value)?,
            "clone_timeout_ms" => self.clone_timeout_ms = Self::parse_int(key, value)?,
            "max_buffer_bytes" => self.max_buffer_bytes = Self::parse_int(key, value)?,
            "reject_symlinks" => self.reject_symlinks = Self::parse_bool(key, value)?,
            "preserve_permissions" => self.preserve_permissions = Self::parse_bool(key, value)?,
            "scan_concurrency" => {
                let n: usize = Self::parse_int(key, value)?;
                if n == 0 {
                    return Err(ConfigError::InvalidInt {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.scan_concurrency = n;
            }
            "cache_ttl_ms" => self.cache_ttl_ms = Self::parse_int(key, value)?,
            "identities_file" => self.identities_file = expand_home(value),
            "settings_file" => self.settings_file = expand_home(value),
            _ => {
                warn!(key, source, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Parse a boolean value (`true/1/yes/on`, `false/0/no/off`).
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Whitespace-separated `base=prefix` pairs.
    fn parse_rewrites(value: &str) -> Result<Vec<UrlRewrite>, ConfigError> {
        value
            .split_whitespace()
            .map(|pair| match pair.split_once('=') {
                Some((base, instead_of)) if !base.is_empty() && !instead_of.is_empty() => {
                    Ok(UrlRewrite {
                        base: base.to_string(),
                        instead_of: instead_of.to_string(),
                    })
                }
                _ => Err(ConfigError::InvalidRewrite(pair.to_string())),
            })
            .collect()
    }

    /// Target root for `project`-scope installs under `working_directory`.
    pub fn project_root(&self, working_directory: &Path) -> PathBuf {
        working_directory.join(&self.project_skill_dir)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_millis(self.clone_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Expand a leading `~/` against the home directory.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(value), |h| h.join(rest)),
        None => PathBuf::from(value),
    }
}
