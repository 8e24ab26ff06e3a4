//! Conflict-aware installation of selected skill directories.
//!
//! Flow: validate request, plan selections (no I/O), pre-flight conflict gate,
//! narrow clone, cone sparse checkout of the selected directories, then copy each
//! skill independently. Nothing is cloned or written if the gate finds an
//! unresolved conflict; after that, each skill succeeds or fails on its own.

use skill_core::config::Config;
use skill_core::manifest::{is_valid_skill_name, skill_name_from_dir, MANIFEST_FILE};
use skill_core::source::{normalize_repo_path, resolve};
use skill_core::{
    ConflictDecision, Identity, InstallOutcome, InstallRequest, InstalledSkill, RepoError, Scope,
    SkillConflict, SkippedSkill,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conflict::ConflictResolver;
use crate::copy::{copy_dir, CopyPolicy};
use crate::git::{GitRunner, RunOptions};
use crate::workdir::{remove_quietly, EphemeralDir};

const INSTALL_DIR_PREFIX: &str = "skills-install";

pub const REASON_INVALID_NAME: &str = "Invalid skill name (directory basename)";
pub const REASON_INVALID_PATH: &str = "Invalid skill directory path";
pub const REASON_DUPLICATE: &str = "Duplicate skill name in selection";
pub const REASON_MANIFEST_MISSING: &str = "SKILL.md not found in selected directory";
pub const REASON_ALREADY_INSTALLED: &str = "Already installed (skipped)";
pub const REASON_APPEARED: &str = "Target appeared during install (skipped)";

/// Installer configuration.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Parent directory for ephemeral clones.
    pub temp_dir: PathBuf,
    /// `project`-scope root, relative to the working directory.
    pub project_skill_dir: PathBuf,
    pub copy_policy: CopyPolicy,
}

impl InstallerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            project_skill_dir: config.project_skill_dir.clone(),
            copy_policy: CopyPolicy {
                reject_symlinks: config.reject_symlinks,
                preserve_permissions: config.preserve_permissions,
            },
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One selection after validation.
#[derive(Debug, Clone)]
struct InstallPlan {
    skill_dir: String,
    skill_name: String,
    target: PathBuf,
    /// Why this plan will not be installed; `None` means installable.
    blocked: Option<&'static str>,
}

impl InstallPlan {
    fn installable(&self) -> bool {
        self.blocked.is_none()
    }

    fn skip(&self, reason: impl Into<String>) -> SkippedSkill {
        SkippedSkill {
            skill_name: self.skill_name.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    git: Arc<GitRunner>,
    config: InstallerConfig,
}

impl Installer {
    pub fn new(git: Arc<GitRunner>, config: InstallerConfig) -> Self {
        Self { git, config }
    }

    pub async fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, RepoError> {
        self.git.assert_available().await?;

        let scope = Scope::parse(&request.scope).ok_or_else(|| {
            RepoError::InvalidSource(format!("invalid scope: {}", request.scope))
        })?;
        let user_skill_dir = request
            .user_skill_dir
            .as_deref()
            .ok_or_else(|| RepoError::InvalidSource("user skill directory is required".to_string()))?;
        let root = match scope {
            Scope::User => user_skill_dir.to_path_buf(),
            Scope::Project => request
                .working_directory
                .as_deref()
                .map(|cwd| cwd.join(&self.config.project_skill_dir))
                .ok_or_else(|| {
                    RepoError::InvalidSource(
                        "project scope requires a working directory".to_string(),
                    )
                })?,
        };

        let source = resolve(&request.source, request.subpath.as_deref())?;
        let identity = request.identity.as_ref();
        let use_ssh = identity.and_then(Identity::ssh_key).is_some();

        if request.selections.is_empty() {
            return Err(RepoError::InvalidSource("no skills selected".to_string()));
        }

        let plans = plan_selections(
            request.selections.iter().map(|s| s.skill_dir.as_str()),
            &root,
        );

        let resolver =
            ConflictResolver::new(&request.conflict_decisions, request.conflict_policy);
        let conflicts = self.conflict_gate(&plans, scope, &resolver).await;
        if !conflicts.is_empty() {
            info!(
                repo = %source.normalized_repo,
                conflicts = conflicts.len(),
                "install blocked by unresolved conflicts"
            );
            return Err(RepoError::Conflicts(conflicts));
        }

        let mut outcome = InstallOutcome::default();
        let selected: Vec<&str> = plans
            .iter()
            .filter(|p| p.installable())
            .map(|p| p.skill_dir.as_str())
            .collect();
        if selected.is_empty() {
            outcome.skipped = plans
                .iter()
                .filter_map(|p| p.blocked.map(|reason| p.skip(reason)))
                .collect();
            return Ok(outcome);
        }

        info!(
            repo = %source.normalized_repo,
            scope = %scope,
            skills = selected.len(),
            "installing skills"
        );

        let workdir = EphemeralDir::new(&self.config.temp_dir, INSTALL_DIR_PREFIX);
        let result = self
            .install_from_clone(
                workdir.path(),
                source.clone_url(use_ssh),
                &selected,
                &plans,
                scope,
                &resolver,
                identity,
            )
            .await;
        workdir.cleanup().await;

        let outcome = result?;
        info!(
            installed = outcome.installed.len(),
            skipped = outcome.skipped.len(),
            "install complete"
        );
        Ok(outcome)
    }

    /// Unresolved conflicts among installable plans. Performs no writes.
    async fn conflict_gate(
        &self,
        plans: &[InstallPlan],
        scope: Scope,
        resolver: &ConflictResolver<'_>,
    ) -> Vec<SkillConflict> {
        let mut conflicts = Vec::new();
        for plan in plans.iter().filter(|p| p.installable()) {
            let exists = path_exists(&plan.target).await;
            if resolver.resolve(&plan.skill_name, exists).is_none() {
                conflicts.push(SkillConflict {
                    skill_name: plan.skill_name.clone(),
                    scope,
                });
            }
        }
        conflicts
    }

    #[allow(clippy::too_many_arguments)]
    async fn install_from_clone(
        &self,
        repo_dir: &Path,
        clone_url: &str,
        selected: &[&str],
        plans: &[InstallPlan],
        scope: Scope,
        resolver: &ConflictResolver<'_>,
        identity: Option<&Identity>,
    ) -> Result<InstallOutcome, RepoError> {
        self.git.clone_narrow(clone_url, repo_dir, identity).await?;
        self.checkout_selected(repo_dir, selected, identity).await?;

        let repo_root = tokio::fs::canonicalize(repo_dir)
            .await
            .map_err(|e| RepoError::Unknown(format!("failed to resolve clone directory: {e}")))?;

        let mut outcome = InstallOutcome::default();
        for plan in plans {
            match self.install_plan(&repo_root, plan, scope, resolver).await {
                Ok(installed) => {
                    info!(skill = %installed.skill_name, scope = %scope, "installed skill");
                    outcome.installed.push(installed);
                }
                Err(skipped) => {
                    warn!(skill = %skipped.skill_name, reason = %skipped.reason, "skipped skill");
                    outcome.skipped.push(skipped);
                }
            }
        }
        Ok(outcome)
    }

    /// Cone sparse checkout of exactly the selected directories.
    async fn checkout_selected(
        &self,
        repo_dir: &Path,
        selected: &[&str],
        identity: Option<&Identity>,
    ) -> Result<(), RepoError> {
        let git_config = self.git.config();
        let repo = repo_dir.to_string_lossy().into_owned();

        let mut set_args = vec!["-C", repo.as_str(), "sparse-checkout", "set"];
        set_args.extend_from_slice(selected);

        let steps = [
            (
                vec!["-C", repo.as_str(), "sparse-checkout", "init", "--cone"],
                git_config.metadata_timeout,
            ),
            (set_args, git_config.listing_timeout),
            (
                vec!["-C", repo.as_str(), "checkout", "--force", "HEAD"],
                git_config.checkout_timeout,
            ),
        ];
        for (args, timeout) in steps {
            let options = RunOptions::new(timeout).with_identity(identity);
            self.git.run(&args, options).await.map_err(|e| {
                warn!(error = %e, "sparse checkout of selected skills failed");
                RepoError::Unknown(e.detail())
            })?;
        }
        Ok(())
    }

    /// Install a single plan. Every failure becomes a skipped entry.
    async fn install_plan(
        &self,
        repo_root: &Path,
        plan: &InstallPlan,
        scope: Scope,
        resolver: &ConflictResolver<'_>,
    ) -> Result<InstalledSkill, SkippedSkill> {
        if let Some(reason) = plan.blocked {
            return Err(plan.skip(reason));
        }

        let src = repo_root.join(&plan.skill_dir);
        if !tokio::fs::metadata(src.join(MANIFEST_FILE))
            .await
            .is_ok_and(|m| m.is_file())
        {
            return Err(plan.skip(REASON_MANIFEST_MISSING));
        }

        // Existence is re-checked here; the target may have changed since the gate.
        let exists = path_exists(&plan.target).await;
        match resolver.resolve(&plan.skill_name, exists) {
            None => return Err(plan.skip(REASON_APPEARED)),
            Some(ConflictDecision::Skip) if exists => {
                return Err(plan.skip(REASON_ALREADY_INSTALLED));
            }
            Some(ConflictDecision::Overwrite) if exists => {
                debug!(target = %plan.target.display(), "removing existing skill");
                remove_path(&plan.target)
                    .await
                    .map_err(|e| plan.skip(format!("Copy failed: {e}")))?;
            }
            Some(_) => {}
        }

        let real_src = tokio::fs::canonicalize(&src)
            .await
            .map_err(|e| plan.skip(format!("Copy failed: {e}")))?;
        if !real_src.starts_with(repo_root) {
            return Err(plan.skip("Copy failed: source escapes the repository"));
        }

        if let Some(parent) = plan.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| plan.skip(format!("Copy failed: {e}")))?;
        }

        match copy_dir(&src, &plan.target, self.config.copy_policy).await {
            Ok(files) => {
                debug!(skill = %plan.skill_name, files, "copied skill");
                Ok(InstalledSkill {
                    skill_name: plan.skill_name.clone(),
                    scope,
                })
            }
            Err(e) => {
                remove_quietly(&plan.target).await;
                Err(plan.skip(format!("Copy failed: {e}")))
            }
        }
    }
}

/// Validate and name every selection. Pure; no filesystem access.
fn plan_selections<'a>(selections: impl Iterator<Item = &'a str>, root: &Path) -> Vec<InstallPlan> {
    let mut seen = HashSet::new();
    selections
        .map(|raw| {
            let Some(skill_dir) = normalize_repo_path(raw) else {
                let skill_name = skill_name_from_dir(raw.trim());
                return InstallPlan {
                    target: root.join(&skill_name),
                    skill_dir: raw.to_string(),
                    skill_name,
                    blocked: Some(REASON_INVALID_PATH),
                };
            };
            let skill_name = skill_name_from_dir(&skill_dir);
            let blocked = if !is_valid_skill_name(&skill_name) {
                Some(REASON_INVALID_NAME)
            } else if !seen.insert(skill_name.clone()) {
                Some(REASON_DUPLICATE)
            } else {
                None
            };
            InstallPlan {
                target: root.join(&skill_name),
                skill_dir,
                skill_name,
                blocked,
            }
        })
        .collect()
}

/// True for anything at `path`, dangling symlinks included.
async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
