//! End-to-end scan and install against local bare mirrors.
//!
//! Sources resolve to their canonical `https://github.com/...` URLs; a
//! `url.<mirror>.insteadOf=https://github.com/` rewrite points git at a bare
//! repository on disk, so no network is involved.

use serde_json::Value;
use skill_core::config::{Config, UrlRewrite};
use skill_core::{
    ConflictDecision, ConflictPolicy, ErrorKind, IdentityStore, InstallRequest, InstallSelection,
    RepoError, ScanCache, ScanRequest, Scope,
};
use skill_engine::installer::{REASON_ALREADY_INSTALLED, REASON_INVALID_NAME, REASON_MANIFEST_MISSING};
use skill_engine::{GitConfig, GitRunner, Installer, InstallerConfig, RepositoryScanner, ScannerConfig, SkillService};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

const SKILL_A: &str = "---\nname: skill-a\ndescription: First skill\n---\n\n# A\n";
const SKILL_B: &str = "---\nname: skill-b\ndescription: Second skill\n---\n\n# B\n";

struct Fixture {
    dir: TempDir,
    config: Config,
}

impl Fixture {
    /// Create `octocat/<repo>` as a bare mirror containing `files`.
    fn new(repo: &str, files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let fixture = Self {
            config: Config {
                url_rewrites: vec![UrlRewrite {
                    base: format!("file://{}/", dir.path().join("mirror").display()),
                    instead_of: "https://github.com/".to_string(),
                }],
                temp_dir: dir.path().join("clones"),
                user_skill_dir: dir.path().join("user-skills"),
                identities_file: dir.path().join("identities.json"),
                settings_file: dir.path().join("settings.json"),
                ..Config::default()
            },
            dir,
        };
        std::fs::create_dir_all(&fixture.config.temp_dir).unwrap();
        fixture.add_repo(repo, files);
        fixture
    }

    fn add_repo(&self, repo: &str, files: &[(&str, &str)]) {
        let work = self.dir.path().join("work").join(repo);
        std::fs::create_dir_all(&work).unwrap();
        git(&work, &["init", "-q"]);
        for (path, content) in files {
            let full = work.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        self.commit(&work);
    }

    fn work_dir(&self, repo: &str) -> PathBuf {
        self.dir.path().join("work").join(repo)
    }

    fn commit(&self, work: &Path) {
        git(work, &["add", "-A"]);
        git(work, &["commit", "-q", "-m", "fixture"]);
        let repo = work.file_name().unwrap().to_string_lossy().into_owned();
        let mirror = self.dir.path().join("mirror/octocat").join(format!("{repo}.git"));
        let _ = std::fs::remove_dir_all(&mirror);
        std::fs::create_dir_all(mirror.parent().unwrap()).unwrap();
        git(
            self.dir.path(),
            &["clone", "-q", "--bare", &work.to_string_lossy(), &mirror.to_string_lossy()],
        );
    }

    fn git(&self) -> Arc<GitRunner> {
        Arc::new(GitRunner::new(GitConfig::from_config(&self.config)))
    }

    fn scanner(&self) -> RepositoryScanner {
        RepositoryScanner::new(self.git(), ScannerConfig::from_config(&self.config))
    }

    fn installer(&self) -> Installer {
        Installer::new(self.git(), InstallerConfig::from_config(&self.config))
    }

    fn user_dir(&self) -> &Path {
        &self.config.user_skill_dir
    }

    fn install_request(&self, selections: &[&str]) -> InstallRequest {
        InstallRequest {
            source: "octocat/skills".to_string(),
            scope: "user".to_string(),
            user_skill_dir: Some(self.config.user_skill_dir.clone()),
            selections: selections.iter().map(|s| InstallSelection::new(*s)).collect(),
            ..InstallRequest::default()
        }
    }

    /// Ephemeral clones must never outlive an operation.
    fn assert_no_leftover_clones(&self) {
        let leftovers: Vec<_> = std::fs::read_dir(&self.config.temp_dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name())
            .collect();
        assert!(leftovers.is_empty(), "leftover clone dirs: {leftovers:?}");
    }
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "user.name=Fixture",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn standard_repo() -> Fixture {
    Fixture::new(
        "skills",
        &[
            ("README.md", "# Skills\n"),
            ("SKILL.md", "---\nname: root\n---\n"),
            ("skills/b/SKILL.md", SKILL_B),
            ("skills/a/SKILL.md", SKILL_A),
            ("skills/a/references/guide.md", "Guide.\n"),
            ("other/c/SKILL.md", "---\nname: c\n---\n"),
            ("docs/notes.md", "No manifest here.\n"),
        ],
    )
}

// --- Scan ---

#[tokio::test]
async fn scan_subpath_returns_sorted_installable_items() {
    let fx = standard_repo();
    let request = ScanRequest {
        subpath: Some("skills".to_string()),
        ..ScanRequest::new("octocat/skills")
    };

    let result = fx.scanner().scan(&request).await.unwrap();
    assert_eq!(result.normalized_repo, "octocat/skills");
    assert_eq!(result.effective_subpath.as_deref(), Some("skills"));

    let names: Vec<_> = result.items.iter().map(|i| i.skill_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(result.items.iter().all(|i| i.installable));
    assert_eq!(result.items[0].skill_dir, "skills/a");
    assert_eq!(result.items[0].frontmatter_name.as_deref(), Some("skill-a"));
    assert_eq!(result.items[0].description.as_deref(), Some("First skill"));
    assert_eq!(result.items[0].repo_source, "octocat/skills");
    assert!(result.items[0].warnings.is_empty());
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn scan_without_subpath_excludes_root_manifest() {
    let fx = standard_repo();
    let result = fx.scanner().scan(&ScanRequest::new("octocat/skills")).await.unwrap();

    let dirs: Vec<_> = result.items.iter().map(|i| i.skill_dir.as_str()).collect();
    assert_eq!(dirs, vec!["skills/a", "skills/b", "other/c"]);
    assert!(result.effective_subpath.is_none());
}

#[tokio::test]
async fn scan_uses_default_subpath_when_source_has_none() {
    let fx = standard_repo();
    let request = ScanRequest {
        default_subpath: Some("other".to_string()),
        ..ScanRequest::new("octocat/skills")
    };
    let result = fx.scanner().scan(&request).await.unwrap();
    assert_eq!(result.effective_subpath.as_deref(), Some("other"));
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].skill_name, "c");
}

#[tokio::test]
async fn scan_embedded_subpath_in_shorthand() {
    let fx = standard_repo();
    let result = fx
        .scanner()
        .scan(&ScanRequest::new("octocat/skills/skills"))
        .await
        .unwrap();
    assert_eq!(result.effective_subpath.as_deref(), Some("skills"));
    assert_eq!(result.items.len(), 2);
}

#[tokio::test]
async fn scan_reports_manifest_and_name_problems_as_warnings() {
    let fx = Fixture::new(
        "skills",
        &[
            ("skills/plain/SKILL.md", "# Just markdown\n"),
            ("skills/Bad_Name/SKILL.md", "---\nname: bad\ndescription: Bad\n---\n"),
            ("skills/broken/SKILL.md", "---\nname: [unclosed\n---\n"),
        ],
    );
    let result = fx.scanner().scan(&ScanRequest::new("octocat/skills")).await.unwrap();
    assert_eq!(result.items.len(), 3);

    let by_name: HashMap<_, _> = result
        .items
        .iter()
        .map(|i| (i.skill_name.as_str(), i))
        .collect();

    let plain = by_name["plain"];
    assert!(plain.installable);
    assert!(plain.description.is_none());
    assert!(plain.warnings.iter().any(|w| w.contains("frontmatter")));

    let bad = by_name["Bad_Name"];
    assert!(!bad.installable);
    assert_eq!(bad.description.as_deref(), Some("Bad"));
    assert!(bad.warnings.iter().any(|w| w.contains("not a valid skill name")));

    let broken = by_name["broken"];
    assert!(broken.installable);
    assert!(broken.warnings.iter().any(|w| w.contains("failed to parse YAML")));
}

#[tokio::test]
async fn scan_of_missing_repository_fails_without_leaking() {
    let fx = standard_repo();
    let err = fx
        .scanner()
        .scan(&ScanRequest::new("octocat/does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NetworkError(_) | RepoError::AuthRequired { .. }
    ));
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn scan_with_unknown_subpath_is_empty() {
    let fx = standard_repo();
    let request = ScanRequest {
        subpath: Some("nowhere".to_string()),
        ..ScanRequest::new("octocat/skills")
    };
    let result = fx.scanner().scan(&request).await.unwrap();
    assert!(result.items.is_empty());
    fx.assert_no_leftover_clones();
}

#[cfg(unix)]
#[tokio::test]
async fn scan_falls_back_to_tree_listing_when_sparse_checkout_fails() {
    use std::os::unix::fs::PermissionsExt;

    let mut fx = standard_repo();
    let wrapper = fx.dir.path().join("git-no-sparse");
    std::fs::write(
        &wrapper,
        "#!/bin/sh\nfor arg in \"$@\"; do\n  [ \"$arg\" = sparse-checkout ] && exit 1\ndone\nexec git \"$@\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();
    fx.config.git_bin = wrapper;

    let request = ScanRequest {
        subpath: Some("skills".to_string()),
        ..ScanRequest::new("octocat/skills")
    };
    let result = fx.scanner().scan(&request).await.unwrap();

    let items: Vec<_> = result
        .items
        .iter()
        .map(|i| (i.skill_name.as_str(), i.description.as_deref(), i.warnings.len()))
        .collect();
    assert_eq!(
        items,
        vec![("a", Some("First skill"), 0), ("b", Some("Second skill"), 0)]
    );
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn scan_with_more_directories_than_workers() {
    let manifests: Vec<(String, String)> = (1..=14)
        .map(|n| {
            (
                format!("skills/skill-{n:02}/SKILL.md"),
                format!("---\nname: skill-{n:02}\ndescription: Skill {n}\n---\n"),
            )
        })
        .collect();
    let files: Vec<(&str, &str)> = manifests
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_str()))
        .collect();
    let fx = Fixture::new("many", &files);
    assert!(files.len() > fx.config.scan_concurrency);

    let request = ScanRequest {
        subpath: Some("skills".to_string()),
        ..ScanRequest::new("octocat/many")
    };
    let result = fx.scanner().scan(&request).await.unwrap();

    assert_eq!(result.items.len(), 14);
    for (n, item) in (1..=14).zip(&result.items) {
        assert_eq!(item.skill_name, format!("skill-{n:02}"));
        assert_eq!(item.description, Some(format!("Skill {n}")));
        assert!(item.installable);
    }
    fx.assert_no_leftover_clones();
}

// --- Install ---

#[tokio::test]
async fn install_copies_selected_skill_tree() {
    let fx = standard_repo();
    let outcome = fx
        .installer()
        .install(&fx.install_request(&["skills/a"]))
        .await
        .unwrap();

    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(outcome.installed[0].skill_name, "a");
    assert_eq!(outcome.installed[0].scope, Scope::User);
    assert!(outcome.skipped.is_empty());
    assert_eq!(
        std::fs::read_to_string(fx.user_dir().join("a/SKILL.md")).unwrap(),
        SKILL_A
    );
    assert!(fx.user_dir().join("a/references/guide.md").is_file());
    assert!(!fx.user_dir().join("b").exists());
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn install_existing_target_without_decision_is_conflict() {
    let fx = standard_repo();
    let existing = fx.user_dir().join("a");
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join("SKILL.md"), "local copy").unwrap();

    let err = fx
        .installer()
        .install(&fx.install_request(&["skills/a", "skills/b"]))
        .await
        .unwrap_err();
    match &err {
        RepoError::Conflicts(conflicts) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].skill_name, "a");
            assert_eq!(conflicts[0].scope, Scope::User);
        }
        other => panic!("expected conflicts, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Conflicts);

    assert_eq!(std::fs::read_to_string(existing.join("SKILL.md")).unwrap(), "local copy");
    assert!(!fx.user_dir().join("b").exists());
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn install_overwrite_all_replaces_target() {
    let fx = standard_repo();
    let existing = fx.user_dir().join("a");
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join("SKILL.md"), "local copy").unwrap();
    std::fs::write(existing.join("stale.txt"), "stale").unwrap();

    let mut request = fx.install_request(&["skills/a"]);
    request.conflict_policy = Some(ConflictPolicy::OverwriteAll);
    let outcome = fx.installer().install(&request).await.unwrap();

    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(std::fs::read_to_string(existing.join("SKILL.md")).unwrap(), SKILL_A);
    assert!(!existing.join("stale.txt").exists());
}

#[tokio::test]
async fn install_skip_decision_keeps_existing_target() {
    let fx = standard_repo();
    let existing = fx.user_dir().join("a");
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join("SKILL.md"), "local copy").unwrap();

    let mut request = fx.install_request(&["skills/a", "skills/b"]);
    request.conflict_policy = Some(ConflictPolicy::OverwriteAll);
    request
        .conflict_decisions
        .insert("a".to_string(), ConflictDecision::Skip);
    let outcome = fx.installer().install(&request).await.unwrap();

    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(outcome.installed[0].skill_name, "b");
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].skill_name, "a");
    assert_eq!(outcome.skipped[0].reason, REASON_ALREADY_INSTALLED);
    assert_eq!(std::fs::read_to_string(existing.join("SKILL.md")).unwrap(), "local copy");
}

#[tokio::test]
async fn install_invalid_name_is_skipped_while_valid_installs() {
    let fx = Fixture::new(
        "skills",
        &[
            ("skills/good/SKILL.md", SKILL_A),
            ("skills/Bad_Name/SKILL.md", SKILL_B),
        ],
    );
    let outcome = fx
        .installer()
        .install(&fx.install_request(&["skills/good", "skills/Bad_Name"]))
        .await
        .unwrap();

    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(outcome.installed[0].skill_name, "good");
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].skill_name, "Bad_Name");
    assert_eq!(outcome.skipped[0].reason, REASON_INVALID_NAME);
    assert!(!fx.user_dir().join("Bad_Name").exists());
}

#[tokio::test]
async fn install_directory_without_manifest_is_skipped() {
    let fx = standard_repo();
    let outcome = fx
        .installer()
        .install(&fx.install_request(&["docs", "skills/b"]))
        .await
        .unwrap();
    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(outcome.skipped[0].skill_name, "docs");
    assert_eq!(outcome.skipped[0].reason, REASON_MANIFEST_MISSING);
    assert!(!fx.user_dir().join("docs").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn install_symlink_fails_only_that_skill() {
    let fx = Fixture::new(
        "skills",
        &[
            ("skills/safe/SKILL.md", SKILL_A),
            ("skills/evil/SKILL.md", SKILL_B),
            ("skills/evil/nested/readme.md", "x"),
        ],
    );
    let work = fx.work_dir("skills");
    std::os::unix::fs::symlink("/etc/hostname", work.join("skills/evil/nested/link")).unwrap();
    fx.commit(&work);

    let outcome = fx
        .installer()
        .install(&fx.install_request(&["skills/evil", "skills/safe"]))
        .await
        .unwrap();

    assert_eq!(outcome.installed.len(), 1);
    assert_eq!(outcome.installed[0].skill_name, "safe");
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].skill_name, "evil");
    assert!(outcome.skipped[0].reason.starts_with("Copy failed"));
    assert!(!fx.user_dir().join("evil").exists());
    assert!(fx.user_dir().join("safe/SKILL.md").is_file());
    fx.assert_no_leftover_clones();
}

#[tokio::test]
async fn install_project_scope_targets_working_directory() {
    let fx = standard_repo();
    let project = fx.dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    let mut request = fx.install_request(&["skills/b"]);
    request.scope = "project".to_string();
    request.working_directory = Some(project.clone());
    let outcome = fx.installer().install(&request).await.unwrap();

    assert_eq!(outcome.installed[0].scope, Scope::Project);
    assert!(project.join(".opencode/skill/b/SKILL.md").is_file());
    assert!(!fx.user_dir().join("b").exists());
}

#[tokio::test]
async fn install_from_missing_repository_is_network_error() {
    let fx = standard_repo();
    let mut request = fx.install_request(&["skills/a"]);
    request.source = "octocat/does-not-exist".to_string();
    let err = fx.installer().install(&request).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::NetworkError(_) | RepoError::AuthRequired { .. }
    ));
    assert!(!fx.user_dir().join("a").exists());
    fx.assert_no_leftover_clones();
}

// --- Service ---

fn service(fx: &Fixture) -> SkillService {
    SkillService::with_parts(
        fx.config.clone(),
        Arc::new(ScanCache::new(fx.config.cache_ttl())),
        IdentityStore::default(),
    )
}

#[tokio::test]
async fn service_scan_is_cached_until_refresh() {
    let fx = standard_repo();
    let service = service(&fx);
    let request = ScanRequest {
        subpath: Some("skills".to_string()),
        ..ScanRequest::new("octocat/skills")
    };

    let first = service.scan(&request, false).await;
    assert!(first.ok);
    assert_eq!(service.cache().len(), 1);

    // Remove the mirror: a cached scan must not touch git.
    std::fs::remove_dir_all(fx.dir.path().join("mirror/octocat/skills.git")).unwrap();
    let second = service.scan(&request, false).await;
    assert!(second.ok);
    assert_eq!(second.result, first.result);

    let refreshed = service.scan(&request, true).await;
    assert!(!refreshed.ok);
    let value: Value = serde_json::to_value(&refreshed).unwrap();
    assert_eq!(value["ok"], false);
    assert!(value["error"]["kind"] == "networkError" || value["error"]["kind"] == "authRequired");
}

#[tokio::test]
async fn service_install_response_serializes_outcome() {
    let fx = standard_repo();
    let mut request = fx.install_request(&["skills/a"]);
    request.user_skill_dir = None;

    let response = service(&fx).install(&request).await;
    let value: Value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(value["installed"][0]["skillName"], "a");
    assert_eq!(value["installed"][0]["scope"], "user");
    assert!(fx.user_dir().join("a/SKILL.md").is_file());
}

#[tokio::test]
async fn service_catalog_aggregates_sources_with_badges() {
    let fx = standard_repo();
    std::fs::write(
        &fx.config.settings_file,
        r#"{"skillCatalogs":[{"id":"team","label":"Team","source":"octocat/skills","subpath":"skills"}]}"#,
    )
    .unwrap();
    let installed = fx.user_dir().join("b");
    std::fs::create_dir_all(&installed).unwrap();
    std::fs::write(installed.join("SKILL.md"), SKILL_B).unwrap();

    let catalog = service(&fx).catalog(None, false).await;
    assert!(catalog.ok);
    let ids: Vec<_> = catalog.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["anthropic", "team"]);

    // The curated source has no mirror here and contributes nothing.
    assert!(catalog.items_by_source["anthropic"].is_empty());

    let team = &catalog.items_by_source["team"];
    assert_eq!(team.len(), 2);
    assert!(team.iter().all(|i| i.source_id.as_deref() == Some("team")));
    let a = team.iter().find(|i| i.skill_name == "a").unwrap();
    let b = team.iter().find(|i| i.skill_name == "b").unwrap();
    assert_eq!(a.installed.as_ref().map(|badge| badge.is_installed), Some(false));
    let badge = b.installed.as_ref().unwrap();
    assert!(badge.is_installed);
    assert_eq!(badge.scope, Some(Scope::User));
    fx.assert_no_leftover_clones();
}
