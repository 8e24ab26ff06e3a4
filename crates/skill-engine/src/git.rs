//! Non-interactive git subprocess runner.
//!
//! Every call runs with prompts disabled and a hard timeout, so a hung network
//! operation always ends in a failure result instead of blocking. Credentials are
//! injected per call through `-c core.sshCommand=...`; nothing touches the
//! process-wide environment.

use skill_core::config::{Config, UrlRewrite};
use skill_core::{Identity, RepoError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to execute git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u128 },
    #[error("git {command} output exceeded {limit} bytes")]
    BufferExceeded { command: String, limit: usize },
    #[error("git {command} failed: {message}")]
    Failed {
        command: String,
        message: String,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
}

pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    /// Text used for failure classification.
    pub fn detail(&self) -> String {
        match self {
            Self::Failed { stderr, stdout, .. } => {
                let combined = format!("{}\n{}", stderr.trim(), stdout.trim());
                let combined = combined.trim();
                if combined.is_empty() {
                    self.to_string()
                } else {
                    combined.to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Git runner configuration.
#[derive(Debug, Clone)]
pub struct GitConfig {
    pub git_bin: PathBuf,
    pub url_rewrites: Vec<UrlRewrite>,
    pub probe_timeout: Duration,
    pub metadata_timeout: Duration,
    pub listing_timeout: Duration,
    pub checkout_timeout: Duration,
    pub clone_timeout: Duration,
    /// Per-stream output ceiling.
    pub max_buffer_bytes: usize,
}

impl GitConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            git_bin: config.git_bin.clone(),
            url_rewrites: config.url_rewrites.clone(),
            probe_timeout: config.probe_timeout(),
            metadata_timeout: config.metadata_timeout(),
            listing_timeout: config.listing_timeout(),
            checkout_timeout: config.checkout_timeout(),
            clone_timeout: config.clone_timeout(),
            max_buffer_bytes: config.max_buffer_bytes,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions<'a> {
    pub working_dir: Option<&'a Path>,
    pub timeout: Duration,
    pub identity: Option<&'a Identity>,
}

impl<'a> RunOptions<'a> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            working_dir: None,
            timeout,
            identity: None,
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: &'a Path) -> Self {
        self.working_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Option<&'a Identity>) -> Self {
        self.identity = identity;
        self
    }
}

/// Whether a failure message looks like an authentication problem.
pub fn classify_auth_error(text: &str) -> bool {
    const NEEDLES: [&str; 4] = [
        "permission denied",
        "publickey",
        "could not read from remote repository",
        "authentication failed",
    ];
    let lower = text.to_lowercase();
    NEEDLES.iter().any(|needle| lower.contains(needle))
        || lower
            .lines()
            .any(|line| line.trim_start().starts_with("fatal: could not"))
}

/// Map a failed clone to the operation-level taxonomy.
pub fn clone_failure(err: &GitError) -> RepoError {
    let detail = err.detail();
    if classify_auth_error(&detail) {
        RepoError::AuthRequired {
            message: "Authentication required to access this repository".to_string(),
            ssh_only: true,
        }
    } else {
        RepoError::NetworkError(detail)
    }
}

/// Quote a value for the POSIX shell git uses to run `core.sshCommand`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[derive(Debug, Clone)]
pub struct GitRunner {
    config: GitConfig,
}

impl GitRunner {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Environment applied to every call.
    pub fn env_overrides(identity: Option<&Identity>) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        env.insert("GIT_TERMINAL_PROMPT", "0".to_string());
        env.insert("GCM_INTERACTIVE", "Never".to_string());
        env.insert("LC_ALL", "C".to_string());
        // GIT_SSH_COMMAND outranks core.sshCommand, so only set it without a key.
        if identity.and_then(Identity::ssh_key).is_none() {
            env.insert("GIT_SSH_COMMAND", "ssh -o BatchMode=yes".to_string());
        }
        env
    }

    /// Global `-c` options placed ahead of the caller's arguments.
    fn global_args(&self, identity: Option<&Identity>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = identity.and_then(Identity::ssh_key) {
            args.push("-c".to_string());
            args.push(format!(
                "core.sshCommand=ssh -i {} -o IdentitiesOnly=yes -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
                shell_quote(&key.to_string_lossy())
            ));
        }
        for rewrite in &self.config.url_rewrites {
            args.push("-c".to_string());
            args.push(format!(
                "url.{}.insteadOf={}",
                rewrite.base, rewrite.instead_of
            ));
        }
        args
    }

    /// Run git with the given arguments.
    pub async fn run<I, S>(&self, args: I, options: RunOptions<'_>) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let label = command_label(&args);
        let limit = self.config.max_buffer_bytes;

        let mut process = Command::new(&self.config.git_bin);
        process
            .args(self.global_args(options.identity))
            .args(&args)
            .envs(Self::env_overrides(options.identity))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = options.working_dir {
            process.current_dir(dir);
        }

        debug!(command = %label, timeout_ms = options.timeout.as_millis(), "running git");
        let mut child = process.spawn()?;

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(read_bounded(stdout, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_bounded(stderr, limit)));

        let status = tokio::select! {
            result = child.wait() => result?,
            () = tokio::time::sleep(options.timeout) => {
                if let Err(e) = child.kill().await {
                    warn!(command = %label, error = %e, "failed to kill timed-out git");
                }
                let _ = child.wait().await;
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                warn!(command = %label, timeout_ms = options.timeout.as_millis(), "git timed out");
                return Err(GitError::Timeout {
                    command: label,
                    timeout_ms: options.timeout.as_millis(),
                });
            }
        };

        let (stdout, stdout_exceeded) = collect(stdout_task).await;
        let (stderr, stderr_exceeded) = collect(stderr_task).await;
        if stdout_exceeded || stderr_exceeded {
            warn!(command = %label, limit, "git output exceeded buffer limit");
            return Err(GitError::BufferExceeded {
                command: label,
                limit,
            });
        }

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !status.success() {
            let exit_code = status.code();
            let signal = exit_signal(&status);
            let message = match stderr.trim() {
                "" => format!("exited with {status}"),
                text => text.to_string(),
            };
            debug!(command = %label, ?exit_code, ?signal, "git failed");
            return Err(GitError::Failed {
                command: label,
                message,
                stdout,
                stderr,
                exit_code,
                signal,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    /// Probe `git --version`; any failure means the tool is unavailable.
    pub async fn assert_available(&self) -> std::result::Result<(), RepoError> {
        self.run(["--version"], RunOptions::new(self.config.probe_timeout))
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(git_bin = %self.config.git_bin.display(), error = %e, "git unavailable");
                RepoError::ToolUnavailable(e.to_string())
            })
    }

    /// Shallow, blob-filtered, no-checkout clone; retried once without the filter.
    ///
    /// A partially created target is removed before the retry.
    pub async fn clone_narrow(
        &self,
        url: &str,
        target: &Path,
        identity: Option<&Identity>,
    ) -> std::result::Result<(), RepoError> {
        let target_arg = target.to_string_lossy().into_owned();
        let options = RunOptions::new(self.config.clone_timeout).with_identity(identity);

        let filtered = [
            "clone",
            "--depth",
            "1",
            "--filter=blob:none",
            "--no-checkout",
            url,
            target_arg.as_str(),
        ];
        match self.run(filtered, options).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!(url, error = %e, "filtered clone failed; retrying without filter");
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(target).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %target.display(), error = %e, "failed to remove partial clone");
            }
        }

        let plain = ["clone", "--depth", "1", "--no-checkout", url, target_arg.as_str()];
        self.run(plain, options).await.map(|_| ()).map_err(|e| {
            warn!(url, error = %e, "clone failed");
            clone_failure(&e)
        })
    }
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new(GitConfig::default())
    }
}

/// First non-option argument, for logs and error messages.
fn command_label(args: &[String]) -> String {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-C" | "-c" => {
                iter.next();
            }
            a if a.starts_with('-') => {}
            a => return a.to_string(),
        }
    }
    args.first().cloned().unwrap_or_default()
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

async fn collect(task: Option<JoinHandle<std::io::Result<(Vec<u8>, bool)>>>) -> (Vec<u8>, bool) {
    match task {
        Some(handle) => match handle.await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to read git output");
                (Vec::new(), false)
            }
            Err(e) => {
                warn!(error = %e, "git output reader panicked");
                (Vec::new(), false)
            }
        },
        None => (Vec::new(), false),
    }
}

/// Read up to `max_bytes`, draining the rest. The flag reports truncation.
async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    max_bytes: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 8192];
    let mut exceeded = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        let remaining = max_bytes.saturating_sub(buf.len());
        if n > remaining {
            exceeded = true;
            buf.extend_from_slice(&chunk[..remaining]);
            // Keep reading so the child never blocks on a full pipe.
            while reader.read(&mut chunk).await? > 0 {}
            break;
        }

        buf.extend_from_slice(&chunk[..n]);
    }

    Ok((buf, exceeded))
}
