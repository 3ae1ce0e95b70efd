//! Knowledge package lifecycle against a fake git remote and an in-memory store.

mod common;

use std::path::Path;

use common::{write_file, FakeVcs};
use specfold::config::ProjectConfig;
use specfold::fingerprint::{FingerprintStore, JsonFingerprintStore};
use specfold::integrations::IntegrationRegistry;
use specfold::knowledge::{package_prefix, KnowledgeManager};
use specfold::project::Project;
use specfold::SpecfoldError;
use specfold_core::classify::required_collections;
use specfold_core::models::GetRequest;
use specfold_core::store::memory::InMemoryStore;
use specfold_core::store::{document_ids_by_path_prefix, DocumentStore};
use tempfile::TempDir;

const KB_URL: &str = "https://github.com/acme/kb.git";
const KB_SOURCE: &str = "github:acme/kb";
const PKG_DIR: &str = ".specfold/knowledge/team-github-acme-kb";

struct Fixture {
    _tmp: TempDir,
    remotes: TempDir,
    project: Project,
    store: InMemoryStore,
    fingerprints: JsonFingerprintStore,
    integrations: IntegrationRegistry,
}

impl Fixture {
    async fn new(config: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let project = Project::new(tmp.path());
        std::fs::write(project.config_path(), config).unwrap();
        let store = InMemoryStore::new();
        store
            .ensure_collections(&required_collections())
            .await
            .unwrap();
        let fingerprints = JsonFingerprintStore::new(&project);
        Self {
            _tmp: tmp,
            remotes: TempDir::new().unwrap(),
            project,
            store,
            fingerprints,
            integrations: IntegrationRegistry::builtin(),
        }
    }

    /// A directory under the remotes root to hold one ref's tree.
    fn tree(&self, name: &str, files: &[(&str, &str)]) -> std::path::PathBuf {
        let root = self.remotes.path().join(name);
        for (rel, body) in files {
            write_file(&root, rel, body);
        }
        root
    }

    fn manager<'a>(&'a self, vcs: &'a FakeVcs) -> KnowledgeManager<'a> {
        KnowledgeManager::new(
            &self.project,
            vcs,
            Some(&self.store as &dyn DocumentStore),
            &self.fingerprints,
            &self.integrations,
        )
    }

    fn pkg(&self) -> std::path::PathBuf {
        self.project.resolve(PKG_DIR)
    }

    async fn ids(&self, collection: &str) -> Vec<String> {
        self.store
            .get_documents(collection, &GetRequest::default())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect()
    }
}

fn multi_package_tree() -> Vec<(&'static str, &'static str)> {
    vec![
        ("team/docs/rules/errors.md", "# Errors\nUse thiserror."),
        ("team/docs/adrs/001-sqlite.md", "# ADR 1\nSQLite."),
        ("team/skills/review/SKILL.md", "review skill"),
        ("other/docs/rules/z.md", "# Not ours"),
    ]
}

#[tokio::test]
async fn add_multi_package_layout_flattens_and_indexes() {
    let fx = Fixture::new("ai_tool = \"cursor\"\n[editor]\ntheme = \"dark\"\n").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));

    let stats = fx.manager(&vcs).add("team", KB_SOURCE, "main").await.unwrap();
    assert_eq!(stats.added, 2);
    assert_eq!(stats.errors, 0);

    let pkg = fx.pkg();
    assert!(pkg.join("docs/rules/errors.md").is_file());
    assert!(pkg.join("docs/adrs/001-sqlite.md").is_file());
    assert!(!pkg.join("team").exists());
    assert!(!pkg.join("other").exists());

    assert_eq!(
        fx.ids("rules").await,
        vec![format!("{}/docs/rules/errors.md", PKG_DIR)]
    );
    assert_eq!(
        fx.ids("business-and-architecture").await,
        vec![format!("{}/docs/adrs/001-sqlite.md", PKG_DIR)]
    );

    let config = ProjectConfig::load(&fx.project).unwrap();
    let entry = config.find_knowledge("team").unwrap();
    assert_eq!(entry.source, KB_SOURCE);
    assert_eq!(entry.version, "main");
    let saved = std::fs::read_to_string(fx.project.config_path()).unwrap();
    assert!(saved.contains("theme = \"dark\""));
}

#[tokio::test]
async fn add_single_package_layout_uses_root_folders() {
    let fx = Fixture::new("").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(
        KB_URL,
        "main",
        &fx.tree(
            "main",
            &[
                ("rules/naming.md", "# Naming"),
                ("features/login.feature", "Feature: Login"),
                ("README.md", "not checked out"),
            ],
        ),
    );

    let stats = fx.manager(&vcs).add("team", KB_SOURCE, "main").await.unwrap();
    assert_eq!(stats.added, 2);

    let pkg = fx.pkg();
    assert!(pkg.join("rules/naming.md").is_file());
    assert!(pkg.join("features/login.feature").is_file());
    assert!(!pkg.join("README.md").exists());
    assert_eq!(
        fx.ids("features").await,
        vec![format!("{}/features/login.feature", PKG_DIR)]
    );
    assert!(vcs
        .calls()
        .iter()
        .any(|c| c.starts_with("sparse-checkout set docs/adrs")));
}

#[tokio::test]
async fn update_to_new_version_reindexes_changed_files() {
    let fx = Fixture::new("").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    vcs.add_remote(
        KB_URL,
        "v2",
        &fx.tree(
            "v2",
            &[
                ("team/docs/rules/errors.md", "# Errors\nUse thiserror and anyhow."),
                ("team/docs/adrs/001-sqlite.md", "# ADR 1\nSQLite."),
            ],
        ),
    );

    let manager = fx.manager(&vcs);
    manager.add("team", KB_SOURCE, "main").await.unwrap();
    let stats = manager.update("team", Some("v2")).await.unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.skipped, 1);

    let body = std::fs::read_to_string(fx.pkg().join("docs/rules/errors.md")).unwrap();
    assert!(body.contains("anyhow"));
    assert!(!fx.pkg().join("team").exists());

    let config = ProjectConfig::load(&fx.project).unwrap();
    assert_eq!(config.find_knowledge("team").unwrap().version, "v2");
}

#[tokio::test]
async fn failed_update_keeps_version_and_files() {
    let fx = Fixture::new("").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    let manager = fx.manager(&vcs);
    manager.add("team", KB_SOURCE, "main").await.unwrap();
    let saved = std::fs::read_to_string(fx.project.config_path()).unwrap();

    let err = manager.update("team", Some("nope")).await.unwrap_err();
    let git = err
        .chain()
        .find_map(|e| e.downcast_ref::<SpecfoldError>())
        .unwrap();
    assert!(matches!(git, SpecfoldError::Git { .. }));

    let config = ProjectConfig::load(&fx.project).unwrap();
    assert_eq!(config.find_knowledge("team").unwrap().version, "main");
    assert_eq!(
        std::fs::read_to_string(fx.project.config_path()).unwrap(),
        saved
    );
    assert!(fx.pkg().join("docs/rules/errors.md").is_file());
    assert_eq!(
        fx.ids("rules").await,
        vec![format!("{}/docs/rules/errors.md", PKG_DIR)]
    );
}

#[tokio::test]
async fn update_clears_root_content_from_an_earlier_layout() {
    let fx = Fixture::new("").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    vcs.add_remote(
        KB_URL,
        "v2",
        &fx.tree("v2", &[("team/docs/rules/errors.md", "# Errors v2")]),
    );
    let manager = fx.manager(&vcs);
    manager.add("team", KB_SOURCE, "main").await.unwrap();
    assert!(fx.pkg().join("skills/review/SKILL.md").is_file());
    write_file(&fx.pkg(), "rules/stale.md", "# From a single-package layout");

    manager.update("team", Some("v2")).await.unwrap();

    let pkg = fx.pkg();
    assert!(!pkg.join("rules").exists());
    assert!(!pkg.join("skills").exists());
    assert!(!pkg.join("team").exists());
    assert!(pkg.join(".git").is_dir());
    let body = std::fs::read_to_string(pkg.join("docs/rules/errors.md")).unwrap();
    assert_eq!(body, "# Errors v2");
}

#[tokio::test]
async fn update_unknown_package_is_an_error() {
    let fx = Fixture::new("").await;
    let vcs = FakeVcs::new();
    let err = fx.manager(&vcs).update("ghost", None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SpecfoldError>(),
        Some(SpecfoldError::PackageNotFound(_))
    ));
}

#[tokio::test]
async fn remove_purges_documents_fingerprints_and_directory() {
    let fx = Fixture::new("").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    let manager = fx.manager(&vcs);
    manager.add("team", KB_SOURCE, "main").await.unwrap();

    let prefix = package_prefix("team", KB_SOURCE);
    assert!(fx
        .fingerprints
        .get(&format!("{}docs/rules/errors.md", prefix))
        .is_some());

    let report = manager.remove("team").await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.fingerprints, 2);

    assert!(document_ids_by_path_prefix(&fx.store, &prefix)
        .await
        .unwrap()
        .is_empty());
    assert!(fx
        .fingerprints
        .get(&format!("{}docs/rules/errors.md", prefix))
        .is_none());
    assert!(!fx.pkg().exists());
    let config = ProjectConfig::load(&fx.project).unwrap();
    assert!(config.knowledge().is_empty());
}

#[tokio::test]
async fn failed_add_leaves_no_directory_and_no_entry() {
    let fx = Fixture::new("ai_tool = \"cursor\"\n").await;
    let vcs = FakeVcs::new();

    let err = fx
        .manager(&vcs)
        .add("team", KB_SOURCE, "main")
        .await
        .unwrap_err();
    let git = err
        .chain()
        .find_map(|e| e.downcast_ref::<SpecfoldError>())
        .unwrap();
    assert!(matches!(git, SpecfoldError::Git { .. }));

    assert!(!fx.pkg().exists());
    let config = ProjectConfig::load(&fx.project).unwrap();
    assert!(config.knowledge().is_empty());
    assert_eq!(
        std::fs::read_to_string(fx.project.config_path()).unwrap(),
        "ai_tool = \"cursor\"\n"
    );
}

#[tokio::test]
async fn unsupported_source_is_rejected_before_cloning() {
    let fx = Fixture::new("").await;
    let vcs = FakeVcs::new();
    let err = fx
        .manager(&vcs)
        .add("team", "not a source", "main")
        .await
        .unwrap_err();
    let typed = err
        .chain()
        .find_map(|e| e.downcast_ref::<SpecfoldError>())
        .unwrap();
    assert!(matches!(typed, SpecfoldError::UnsupportedSource(_)));
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn install_all_continues_past_failures() {
    let config = format!(
        "[[knowledge]]\nname = \"team\"\nsource = \"{}\"\nversion = \"main\"\n\n\
         [[knowledge]]\nname = \"broken\"\nsource = \"github:acme/missing\"\nversion = \"main\"\n",
        KB_SOURCE
    );
    let fx = Fixture::new(&config).await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));

    let manager = fx.manager(&vcs);
    let report = manager.install_all(false).await.unwrap();
    assert_eq!(report.installed, vec!["team".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(fx.pkg().join("docs/rules/errors.md").is_file());

    // Second run updates in place; --force clones again.
    let again = manager.install_all(false).await.unwrap();
    assert_eq!(again.installed, vec!["team".to_string()]);
    assert!(vcs.calls().iter().any(|c| c == "fetch main"));

    let forced = manager.install_all(true).await.unwrap();
    assert_eq!(forced.installed, vec!["team".to_string()]);
    assert_eq!(fx.ids("rules").await.len(), 1);
    assert_eq!(
        ProjectConfig::load(&fx.project).unwrap().knowledge().len(),
        2
    );
}

#[tokio::test]
async fn list_and_show_report_install_status() {
    let config = format!(
        "[[knowledge]]\nname = \"team\"\nsource = \"{}\"\nversion = \"main\"\n",
        KB_SOURCE
    );
    let fx = Fixture::new(&config).await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    let manager = fx.manager(&vcs);

    let before = manager.list().unwrap();
    assert_eq!(before.len(), 1);
    assert!(!before[0].installed);
    assert_eq!(before[0].file_count, None);

    manager.install_all(false).await.unwrap();
    let shown = manager.show("team").unwrap();
    assert!(shown.installed);
    assert_eq!(shown.path, PKG_DIR);
    // errors.md, 001-sqlite.md and the skill file; .git is not counted.
    assert_eq!(shown.file_count, Some(3));
}

#[tokio::test]
async fn list_without_config_is_empty() {
    let tmp = TempDir::new().unwrap();
    let project = Project::new(tmp.path());
    let fingerprints = JsonFingerprintStore::new(&project);
    let integrations = IntegrationRegistry::builtin();
    let vcs = FakeVcs::new();
    let manager = KnowledgeManager::new(&project, &vcs, None, &fingerprints, &integrations);
    assert!(manager.list().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn claude_desktop_links_package_skills() {
    let fx = Fixture::new("ai_tool = \"claude-desktop\"\n").await;
    let mut vcs = FakeVcs::new();
    vcs.add_remote(KB_URL, "main", &fx.tree("main", &multi_package_tree()));
    let manager = fx.manager(&vcs);

    manager.add("team", KB_SOURCE, "main").await.unwrap();
    let link = fx.project.root().join(".claude/skills/review");
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        fx.pkg().join("skills/review")
    );

    manager.remove("team").await.unwrap();
    assert!(link.symlink_metadata().is_err());
    assert!(!Path::new(&fx.pkg()).exists());
}
