//! Request-level facade over the scanner, installer, cache, and identity store.

use skill_core::catalog::{all_sources, CatalogSource};
use skill_core::config::Config;
use skill_core::source::resolve;
use skill_core::{
    CatalogItem, CatalogResponse, ErrorKind, Identity, IdentityStore,
    InstallRequest, InstallResponse, InstalledBadge, LocalSkill, RepoError, ScanCache, ScanRequest,
    ScanResponse, ScanResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::git::{GitConfig, GitRunner};
use crate::installed::{discover_installed, installed_by_name};
use crate::installer::{Installer, InstallerConfig};
use crate::scanner::{scan_subpath, RepositoryScanner, ScannerConfig};

#[derive(Debug)]
pub struct SkillService {
    config: Config,
    git: Arc<GitRunner>,
    scanner: RepositoryScanner,
    installer: Installer,
    cache: Arc<ScanCache>,
    identities: IdentityStore,
}

impl SkillService {
    /// Build from config, loading the identity store from `identities_file`.
    pub fn new(config: Config) -> Self {
        let identities = IdentityStore::try_load(&config.identities_file);
        let cache = Arc::new(ScanCache::new(config.cache_ttl()));
        Self::with_parts(config, cache, identities)
    }

    pub fn with_parts(config: Config, cache: Arc<ScanCache>, identities: IdentityStore) -> Self {
        let git = Arc::new(GitRunner::new(GitConfig::from_config(&config)));
        Self {
            scanner: RepositoryScanner::new(Arc::clone(&git), ScannerConfig::from_config(&config)),
            installer: Installer::new(Arc::clone(&git), InstallerConfig::from_config(&config)),
            git,
            config,
            cache,
            identities,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    /// Inline key wins; otherwise look the identity id up in the store.
    fn resolve_identity(&self, inline: Option<&Identity>, identity_id: Option<&str>) -> Option<Identity> {
        if let Some(identity) = inline.filter(|i| i.ssh_key().is_some()) {
            return Some(identity.clone());
        }
        identity_id
            .and_then(|id| self.identities.resolve_ssh_key(id))
            .map(Identity::with_key)
    }

    /// Cache partition for a request's credentials.
    fn identity_key(identity: Option<&Identity>, identity_id: Option<&str>) -> Option<String> {
        identity_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .or_else(|| {
                identity
                    .and_then(Identity::ssh_key)
                    .map(|k| k.display().to_string())
            })
    }

    /// Scan through the cache. `refresh` bypasses (and then replaces) a cached entry.
    ///
    /// A cache hit never spawns git. Request errors found before the cache lookup
    /// still report a missing git tool first.
    pub async fn scan_result(&self, request: &ScanRequest, refresh: bool) -> Result<ScanResult, RepoError> {
        let (source, subpath) = match resolve(&request.source, request.subpath.as_deref())
            .map_err(RepoError::from)
            .and_then(|source| {
                let subpath = scan_subpath(&source, request.default_subpath.as_deref())?;
                Ok((source, subpath))
            }) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.git.assert_available().await?;
                return Err(e);
            }
        };
        let identity = self.resolve_identity(request.identity.as_ref(), request.git_identity_id.as_deref());
        let key = ScanCache::key(
            &source.normalized_repo,
            subpath.as_deref(),
            Self::identity_key(identity.as_ref(), request.git_identity_id.as_deref()).as_deref(),
        );

        if !refresh {
            if let Some(cached) = self.cache.get(&key) {
                debug!(key = %key, "scan cache hit");
                return Ok(cached);
            }
        }

        let request = ScanRequest {
            identity,
            ..request.clone()
        };
        let result = self.scanner.scan(&request).await?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    pub async fn scan(&self, request: &ScanRequest, refresh: bool) -> ScanResponse {
        let mut response = ScanResponse::from(self.scan_result(request, refresh).await);
        if let Some(error) = response.error.as_mut() {
            if error.kind == ErrorKind::AuthRequired {
                error.identities = Some(self.identities.summaries());
            }
        }
        response
    }

    /// Install, filling in the configured user skill directory when absent.
    pub async fn install(&self, request: &InstallRequest) -> InstallResponse {
        let request = InstallRequest {
            identity: self.resolve_identity(request.identity.as_ref(), request.git_identity_id.as_deref()),
            user_skill_dir: request
                .user_skill_dir
                .clone()
                .or_else(|| Some(self.config.user_skill_dir.clone())),
            ..request.clone()
        };
        let mut response = InstallResponse::from(self.installer.install(&request).await);
        if let Some(error) = response.error.as_mut() {
            if error.kind == ErrorKind::AuthRequired {
                error.identities = Some(self.identities.summaries());
            }
        }
        response
    }

    pub fn sources(&self) -> Vec<CatalogSource> {
        all_sources(&self.config.settings_file)
    }

    fn project_root(&self, working_directory: Option<&Path>) -> Option<PathBuf> {
        working_directory.map(|cwd| self.config.project_root(cwd))
    }

    pub fn installed(&self, working_directory: Option<&Path>) -> Vec<LocalSkill> {
        discover_installed(
            &self.config.user_skill_dir,
            self.project_root(working_directory).as_deref(),
        )
    }

    /// Aggregate every catalog source. A failing source contributes no items.
    ///
    /// Install badges are computed per call, so cached scans never carry stale state.
    pub async fn catalog(&self, working_directory: Option<&Path>, refresh: bool) -> CatalogResponse {
        let sources = self.sources();
        let installed = installed_by_name(self.installed(working_directory));
        let mut items_by_source = HashMap::new();

        for source in &sources {
            let request = ScanRequest {
                source: source.source.clone(),
                default_subpath: source.default_subpath.clone(),
                git_identity_id: source.git_identity_id.clone(),
                ..ScanRequest::default()
            };
            let items = match self.scan_result(&request, refresh).await {
                Ok(result) => result.items,
                Err(e) => {
                    warn!(source = %source.id, error = %e, "catalog source scan failed");
                    Vec::new()
                }
            };

            let items: Vec<CatalogItem> = items
                .into_iter()
                .map(|mut item| {
                    let local = installed.get(&item.skill_name);
                    item.source_id = Some(source.id.clone());
                    item.installed = Some(InstalledBadge {
                        is_installed: local.is_some(),
                        scope: local.map(|s| s.scope),
                    });
                    item
                })
                .collect();
            items_by_source.insert(source.id.clone(), items);
        }

        CatalogResponse {
            ok: true,
            sources,
            items_by_source,
        }
    }
}
