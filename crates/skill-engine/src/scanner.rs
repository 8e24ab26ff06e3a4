//! Repository scanning: narrow clone, manifest discovery, bounded-concurrency parsing.
//!
//! Discovery first tries a no-cone sparse checkout of just the manifest files and
//! reads them from disk. If any step of that fails, it falls back to listing the
//! tree at HEAD and reading each manifest from the object store.

use skill_core::config::Config;
use skill_core::manifest::{
    is_manifest_path, is_valid_skill_name, manifest_path, parse_manifest, skill_name_from_dir,
};
use skill_core::source::{normalize_repo_path, resolve};
use skill_core::{
    effective_subpath, CatalogItem, Identity, RepoError, RepoSource, ScanRequest, ScanResult,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::git::{CommandOutput, GitRunner, RunOptions};
use crate::workdir::EphemeralDir;

const SCAN_DIR_PREFIX: &str = "skills-scan";

/// Upper bound on concurrent manifest reads, whatever the config asks for.
pub const MAX_SCAN_CONCURRENCY: usize = 10;

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Parent directory for ephemeral clones.
    pub temp_dir: PathBuf,
    /// Maximum concurrent manifest reads.
    pub concurrency: usize,
}

impl ScannerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            concurrency: config.scan_concurrency.clamp(1, MAX_SCAN_CONCURRENCY),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryScanner {
    git: Arc<GitRunner>,
    config: ScannerConfig,
}

/// Where manifest bodies are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestSource {
    WorkingTree,
    ObjectStore,
}

/// Per-scan context shared by the manifest workers.
#[derive(Debug)]
struct ScanContext {
    git: Arc<GitRunner>,
    repo_dir: PathBuf,
    identity: Option<Identity>,
    repo_source: String,
    repo_subpath: Option<String>,
    manifests: ManifestSource,
}

impl RepositoryScanner {
    pub fn new(git: Arc<GitRunner>, config: ScannerConfig) -> Self {
        Self { git, config }
    }

    /// Scan a repository for skill directories.
    ///
    /// The ephemeral clone is removed before returning on every path.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResult, RepoError> {
        self.git.assert_available().await?;

        let source = resolve(&request.source, request.subpath.as_deref())?;
        let subpath = scan_subpath(&source, request.default_subpath.as_deref())?;

        let identity = request.identity.as_ref();
        let use_ssh = identity.and_then(Identity::ssh_key).is_some();
        let workdir = EphemeralDir::new(&self.config.temp_dir, SCAN_DIR_PREFIX);

        info!(
            repo = %source.normalized_repo,
            subpath = subpath.as_deref().unwrap_or(""),
            ssh = use_ssh,
            "scanning repository"
        );

        let items = self
            .scan_clone(
                workdir.path(),
                source.clone_url(use_ssh),
                &request.source,
                subpath.as_deref(),
                identity,
            )
            .await;
        workdir.cleanup().await;

        let items = items?;
        info!(repo = %source.normalized_repo, items = items.len(), "scan complete");
        Ok(ScanResult {
            normalized_repo: source.normalized_repo,
            effective_subpath: subpath,
            items,
        })
    }

    async fn scan_clone(
        &self,
        repo_dir: &Path,
        clone_url: &str,
        repo_source: &str,
        subpath: Option<&str>,
        identity: Option<&Identity>,
    ) -> Result<Vec<CatalogItem>, RepoError> {
        self.git.clone_narrow(clone_url, repo_dir, identity).await?;

        let (paths, manifests) = match self.sparse_manifest_paths(repo_dir, subpath, identity).await {
            Some(paths) if !paths.is_empty() => (paths, ManifestSource::WorkingTree),
            _ => match self.listed_manifest_paths(repo_dir, subpath, identity).await {
                Some(paths) => (paths, ManifestSource::ObjectStore),
                None => return Ok(Vec::new()),
            },
        };

        let dirs = candidate_dirs(&paths);
        debug!(manifests = paths.len(), candidates = dirs.len(), ?manifests, "discovered manifests");

        let ctx = Arc::new(ScanContext {
            git: Arc::clone(&self.git),
            repo_dir: repo_dir.to_path_buf(),
            identity: identity.cloned(),
            repo_source: repo_source.to_string(),
            repo_subpath: subpath.map(ToString::to_string),
            manifests,
        });
        Ok(self.build_items(ctx, dirs).await)
    }

    /// Fast path: sparse-checkout only manifest files and list them.
    ///
    /// Returns `None` if any step fails.
    async fn sparse_manifest_paths(
        &self,
        repo_dir: &Path,
        subpath: Option<&str>,
        identity: Option<&Identity>,
    ) -> Option<Vec<String>> {
        let git_config = self.git.config();
        let repo = repo_dir.to_string_lossy().into_owned();
        let patterns = match subpath {
            Some(sub) => vec![format!("{sub}/SKILL.md"), format!("{sub}/**/SKILL.md")],
            None => vec!["SKILL.md".to_string(), "**/SKILL.md".to_string()],
        };

        let steps: [(Vec<String>, std::time::Duration); 3] = [
            (
                args(&["-C", repo.as_str(), "sparse-checkout", "init", "--no-cone"]),
                git_config.metadata_timeout,
            ),
            (
                [args(&["-C", repo.as_str(), "sparse-checkout", "set"]), patterns].concat(),
                git_config.listing_timeout,
            ),
            (
                args(&["-C", repo.as_str(), "checkout", "--force", "HEAD"]),
                git_config.checkout_timeout,
            ),
        ];
        for (step_args, timeout) in steps {
            let options = RunOptions::new(timeout).with_identity(identity);
            if let Err(e) = self.git.run(&step_args, options).await {
                debug!(error = %e, "sparse manifest checkout failed; falling back to tree listing");
                return None;
            }
        }

        let listing = self
            .git
            .run(
                ["-C", repo.as_str(), "ls-files"],
                RunOptions::new(git_config.metadata_timeout).with_identity(identity),
            )
            .await;
        match listing {
            Ok(output) => Some(manifest_paths(&output, subpath)),
            Err(e) => {
                debug!(error = %e, "ls-files failed; falling back to tree listing");
                None
            }
        }
    }

    /// Fallback: list the tree at HEAD. `None` means the listing itself failed.
    async fn listed_manifest_paths(
        &self,
        repo_dir: &Path,
        subpath: Option<&str>,
        identity: Option<&Identity>,
    ) -> Option<Vec<String>> {
        let repo = repo_dir.to_string_lossy().into_owned();
        let mut list_args = args(&["-C", repo.as_str(), "ls-tree", "-r", "--name-only", "HEAD"]);
        if let Some(sub) = subpath {
            list_args.push("--".to_string());
            list_args.push(sub.to_string());
        }

        let options = RunOptions::new(self.git.config().listing_timeout).with_identity(identity);
        match self.git.run(&list_args, options).await {
            Ok(output) => Some(manifest_paths(&output, subpath)),
            Err(e) => {
                warn!(error = %e, "failed to list repository tree; returning empty catalog");
                None
            }
        }
    }

    async fn build_items(&self, ctx: Arc<ScanContext>, dirs: Vec<String>) -> Vec<CatalogItem> {
        if dirs.is_empty() {
            return Vec::new();
        }

        let limit = self.fan_out(dirs.len());
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for dir in dirs {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                build_item(&ctx, dir).await
            });
        }

        let mut items = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "manifest worker failed"),
            }
        }

        items.sort_by(|a, b| {
            a.skill_name
                .cmp(&b.skill_name)
                .then_with(|| a.skill_dir.cmp(&b.skill_dir))
        });
        items
    }

    /// Concurrent manifest reads for `candidates` directories.
    fn fan_out(&self, candidates: usize) -> usize {
        self.config
            .concurrency
            .clamp(1, MAX_SCAN_CONCURRENCY)
            .min(candidates)
            .max(1)
    }
}

/// The repository subpath a scan of `source` covers, normalized.
///
/// Shared with the cache so equivalent spellings (`skills//a`, `skills/a/`) map to
/// one entry.
pub fn scan_subpath(
    source: &RepoSource,
    default_subpath: Option<&str>,
) -> Result<Option<String>, RepoError> {
    effective_subpath(source, default_subpath)
        .map(|raw| {
            normalize_repo_path(&raw).ok_or_else(|| {
                RepoError::InvalidSource(format!("invalid repository subpath: {raw}"))
            })
        })
        .transpose()
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Manifest paths from a git listing, restricted to `subpath`.
///
/// `ls-files` lists the whole index regardless of the sparse patterns, so the
/// subpath filter is applied here for both discovery paths.
fn manifest_paths(output: &CommandOutput, subpath: Option<&str>) -> Vec<String> {
    output
        .lines()
        .filter(|path| is_manifest_path(path))
        .filter(|path| within_subpath(path, subpath))
        .map(ToString::to_string)
        .collect()
}

fn within_subpath(path: &str, subpath: Option<&str>) -> bool {
    match subpath {
        Some(sub) => path
            .strip_prefix(sub)
            .is_some_and(|rest| rest.starts_with('/')),
        None => true,
    }
}

/// Distinct parent directories of manifest paths, excluding a root manifest.
fn candidate_dirs(paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| path.rsplit_once('/').map(|(dir, _)| dir))
        .filter(|dir| !dir.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn read_manifest(ctx: &ScanContext, repo_path: &str) -> Option<String> {
    if ctx.manifests == ManifestSource::WorkingTree {
        match tokio::fs::read_to_string(ctx.repo_dir.join(repo_path)).await {
            Ok(content) => return Some(content),
            Err(e) => debug!(path = repo_path, error = %e, "manifest missing from working tree"),
        }
    }

    let repo = ctx.repo_dir.to_string_lossy();
    let object = format!("HEAD:{repo_path}");
    let options =
        RunOptions::new(ctx.git.config().metadata_timeout).with_identity(ctx.identity.as_ref());
    match ctx
        .git
        .run(["-C", &*repo, "show", object.as_str()], options)
        .await
    {
        Ok(output) => Some(output.stdout),
        Err(e) => {
            warn!(path = repo_path, error = %e, "failed to read manifest");
            None
        }
    }
}

async fn build_item(ctx: &ScanContext, skill_dir: String) -> CatalogItem {
    let skill_name = skill_name_from_dir(&skill_dir);
    let mut warnings = Vec::new();
    let mut frontmatter_name = None;
    let mut description = None;

    match read_manifest(ctx, &manifest_path(&skill_dir)).await {
        Some(content) => {
            let manifest = parse_manifest(&content);
            frontmatter_name = manifest.name;
            description = manifest.description;
            warnings.extend(manifest.warnings);
        }
        None => warnings.push("Failed to read SKILL.md".to_string()),
    }

    let installable = is_valid_skill_name(&skill_name);
    if !installable {
        warnings.push("Skill directory name is not a valid skill name".to_string());
    }

    CatalogItem {
        source_id: None,
        repo_source: ctx.repo_source.clone(),
        repo_subpath: ctx.repo_subpath.clone(),
        skill_dir,
        skill_name,
        frontmatter_name,
        description,
        installable,
        warnings,
        installed: None,
    }
}
