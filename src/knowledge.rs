//! Knowledge packages: externally hosted context trees fetched with a
//! sparse checkout into `.specfold/knowledge/<name>-<normalized source>/`.
//!
//! # Layouts
//!
//! A source repository can hold many packages, one per top-level folder
//! named after the package, or be a single package whose context folders
//! sit at the repository root. Fetching first checks out only `<name>/`;
//! if that yields content the folder is flattened into the package root,
//! otherwise the root-level context folders in [`SPARSE_PATHS`] are checked
//! out instead.
//!
//! A single-package repository that happens to contain a non-empty
//! top-level folder with the package's own name is treated as the
//! multi-package layout.
//!
//! # Consistency
//!
//! Removing a package purges its documents (every collection) and its
//! fingerprints before the directory is deleted, so an interrupted removal
//! never leaves indexed documents for files that no longer exist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use specfold_core::classify::{required_collections, KNOWLEDGE_ROOT};
use specfold_core::store::{document_ids_by_path_prefix, DocumentStore};
use tracing::{info, warn};

use crate::config::{KnowledgeEntry, ProjectConfig};
use crate::enumerate;
use crate::error::SpecfoldError;
use crate::fingerprint::FingerprintStore;
use crate::git::Vcs;
use crate::integrations::{IntegrationRegistry, SkillLinker};
use crate::io::count_files;
use crate::progress::NoProgress;
use crate::project::Project;
use crate::reindex::{ReindexStats, Reindexer};

/// Root-level folders checked out for a single-package repository.
pub const SPARSE_PATHS: &[&str] = &[
    "docs/adrs",
    "docs/business",
    "docs/features",
    "docs/rules",
    "docs/ui-intent",
    "adrs",
    "business",
    "features",
    "rules",
    "ui-intent",
    "skills",
    "templates",
];

/// Collapse runs of `:`, `/` and `\` into `-` and trim leading/trailing `-`.
pub fn normalize_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_run = false;
    for c in source.chars() {
        if matches!(c, ':' | '/' | '\\') {
            if !in_run {
                out.push('-');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out.trim_matches('-').to_string()
}

pub fn package_dir_name(name: &str, source: &str) -> String {
    format!("{}-{}", name, normalize_source(source))
}

/// Project-relative package directory, e.g. `.specfold/knowledge/kb-github-acme-kb`.
pub fn package_rel_path(name: &str, source: &str) -> String {
    format!("{}/{}", KNOWLEDGE_ROOT, package_dir_name(name, source))
}

/// Id prefix shared by every file of the package.
pub fn package_prefix(name: &str, source: &str) -> String {
    format!("{}/", package_rel_path(name, source))
}

/// Resolve a source locator to a clonable URL.
///
/// `github:owner/repo` and bare `owner/repo` map to GitHub over HTTPS;
/// `https://` and `git@` URLs are used as-is.
pub fn source_to_git_url(source: &str) -> Option<String> {
    let s = source.trim();
    if let Some(rest) = s.strip_prefix("github:") {
        let rest = rest.trim_matches('/');
        if rest.is_empty() {
            return None;
        }
        return Some(format!("https://github.com/{}.git", rest));
    }
    if s.starts_with("https://") || s.starts_with("git@") {
        return Some(s.to_string());
    }
    if s.contains('/') && !s.contains(char::is_whitespace) {
        return Some(format!("https://github.com/{}.git", s.trim_matches('/')));
    }
    None
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = path.symlink_metadata()?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
    .with_context(|| format!("Failed to remove {}", path.display()))
}

fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Move the contents of `<pkg_path>/<name>/` up into `pkg_path`.
///
/// Everything already at the root except `.git` and the subfolder is
/// deleted first, so content from an earlier layout does not survive.
pub fn flatten_package_subfolder(pkg_path: &Path, name: &str) -> Result<()> {
    let subfolder = pkg_path.join(name);
    if !subfolder.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(pkg_path)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name == ".git" || file_name == name {
            continue;
        }
        remove_path(&entry.path())?;
    }

    // The subfolder may itself contain an entry called `name`.
    let staging = pkg_path.join(format!(".flatten-{}", name));
    std::fs::rename(&subfolder, &staging)?;
    for entry in std::fs::read_dir(&staging)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let dest = pkg_path.join(entry.file_name());
        if dest.symlink_metadata().is_ok() {
            remove_path(&dest)?;
        }
        std::fs::rename(entry.path(), &dest)
            .with_context(|| format!("Failed to move {} into package root", dest.display()))?;
    }
    std::fs::remove_dir_all(&staging)?;
    Ok(())
}

/// Fresh sparse clone of a package. Any previous directory is replaced.
/// On failure the partial directory is removed.
pub fn clone_package(
    vcs: &dyn Vcs,
    project: &Project,
    name: &str,
    source: &str,
    version: &str,
) -> Result<PathBuf> {
    let url = source_to_git_url(source)
        .ok_or_else(|| SpecfoldError::UnsupportedSource(source.to_string()))?;
    let pkg_path = project.knowledge_root().join(package_dir_name(name, source));
    if pkg_path.exists() {
        std::fs::remove_dir_all(&pkg_path)?;
    }
    std::fs::create_dir_all(project.knowledge_root())?;

    info!(package = name, %url, version, "cloning knowledge package");
    if let Err(e) = sparse_fetch(vcs, &url, &pkg_path, name, version) {
        if pkg_path.exists() {
            let _ = std::fs::remove_dir_all(&pkg_path);
        }
        return Err(e);
    }
    Ok(pkg_path)
}

fn sparse_fetch(vcs: &dyn Vcs, url: &str, pkg_path: &Path, name: &str, version: &str) -> Result<()> {
    vcs.clone_blobless(url, pkg_path)?;
    vcs.sparse_checkout_init(pkg_path)?;
    vcs.sparse_checkout_set(pkg_path, &[name])?;
    vcs.checkout(pkg_path, version)?;

    let name_dir = pkg_path.join(name);
    if is_non_empty_dir(&name_dir) {
        return flatten_package_subfolder(pkg_path, name);
    }
    if name_dir.exists() {
        std::fs::remove_dir_all(&name_dir)?;
    }
    vcs.sparse_checkout_set(pkg_path, SPARSE_PATHS)?;
    vcs.checkout(pkg_path, version)
}

/// Fetch and check out `version` in an existing package directory,
/// flattening again when the multi-package layout shows up.
pub fn update_checkout(
    vcs: &dyn Vcs,
    project: &Project,
    name: &str,
    source: &str,
    version: &str,
) -> Result<PathBuf> {
    let pkg_path = project.knowledge_root().join(package_dir_name(name, source));
    if !pkg_path.is_dir() {
        return Err(SpecfoldError::PackageDirMissing(pkg_path).into());
    }
    info!(package = name, version, "updating knowledge package");
    vcs.fetch(&pkg_path, version)?;
    vcs.checkout(&pkg_path, version)?;
    if is_non_empty_dir(&pkg_path.join(name)) {
        flatten_package_subfolder(&pkg_path, name)?;
    }
    Ok(pkg_path)
}

/// A declared package and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStatus {
    pub entry: KnowledgeEntry,
    pub path: String,
    pub installed: bool,
    /// Files on disk, excluding `.git`; `None` when not installed.
    pub file_count: Option<usize>,
}

/// Result of a package removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub documents: usize,
    pub fingerprints: usize,
}

/// Result of `install_all`: processed names and failures with their message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Runs package operations against one project.
///
/// `store` is `None` when the project has no initialized store; packages
/// are then fetched and registered but not indexed.
pub struct KnowledgeManager<'a> {
    project: &'a Project,
    vcs: &'a dyn Vcs,
    store: Option<&'a dyn DocumentStore>,
    fingerprints: &'a dyn FingerprintStore,
    integrations: &'a IntegrationRegistry,
}

impl<'a> KnowledgeManager<'a> {
    pub fn new(
        project: &'a Project,
        vcs: &'a dyn Vcs,
        store: Option<&'a dyn DocumentStore>,
        fingerprints: &'a dyn FingerprintStore,
        integrations: &'a IntegrationRegistry,
    ) -> Self {
        Self {
            project,
            vcs,
            store,
            fingerprints,
            integrations,
        }
    }

    fn status_of(&self, entry: KnowledgeEntry) -> PackageStatus {
        let path = package_rel_path(&entry.name, &entry.source);
        let absolute = self.project.resolve(&path);
        let installed = absolute.is_dir();
        PackageStatus {
            file_count: installed.then(|| count_files(&absolute)),
            entry,
            path,
            installed,
        }
    }

    /// Declared packages with install status. No config means no packages.
    pub fn list(&self) -> Result<Vec<PackageStatus>> {
        let config = match ProjectConfig::load(self.project) {
            Ok(config) => config,
            Err(e)
                if matches!(
                    e.downcast_ref::<SpecfoldError>(),
                    Some(SpecfoldError::MissingConfig(_))
                ) =>
            {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };
        Ok(config
            .knowledge()
            .into_iter()
            .map(|entry| self.status_of(entry))
            .collect())
    }

    pub fn show(&self, name: &str) -> Result<PackageStatus> {
        let config = ProjectConfig::load(self.project)?;
        let entry = config
            .find_knowledge(name)
            .ok_or_else(|| SpecfoldError::PackageNotFound(name.to_string()))?;
        Ok(self.status_of(entry))
    }

    /// Fetch, register and index a package. Registration happens only
    /// after the checkout succeeded.
    pub async fn add(&self, name: &str, source: &str, version: &str) -> Result<ReindexStats> {
        let mut config = ProjectConfig::load(self.project)?;
        clone_package(self.vcs, self.project, name, source, version)
            .with_context(|| format!("Failed to fetch knowledge package '{}'", name))?;

        config.upsert_knowledge(KnowledgeEntry {
            name: name.to_string(),
            source: source.to_string(),
            version: version.to_string(),
        });
        config.save()?;

        let stats = self.index_package(name, source).await?;
        self.link_skills(&config, name, source);
        info!(package = name, indexed = stats.indexed(), "knowledge package added");
        Ok(stats)
    }

    /// Move a package to `version` (or its registered version) and reindex.
    pub async fn update(&self, name: &str, version: Option<&str>) -> Result<ReindexStats> {
        let mut config = ProjectConfig::load(self.project)?;
        let entry = config
            .find_knowledge(name)
            .ok_or_else(|| SpecfoldError::PackageNotFound(name.to_string()))?;
        let reference = version.unwrap_or(&entry.version);

        update_checkout(self.vcs, self.project, name, &entry.source, reference)
            .with_context(|| format!("Failed to update knowledge package '{}'", name))?;

        if let Some(new_version) = version {
            config.upsert_knowledge(KnowledgeEntry {
                version: new_version.to_string(),
                ..entry.clone()
            });
            config.save()?;
        }

        let stats = self.index_package(name, &entry.source).await?;
        info!(package = name, indexed = stats.indexed(), "knowledge package updated");
        Ok(stats)
    }

    /// Purge documents and fingerprints, unlink skills, unregister, then
    /// delete the directory.
    pub async fn remove(&self, name: &str) -> Result<RemovalReport> {
        let mut config = ProjectConfig::load(self.project)?;
        let entry = config
            .find_knowledge(name)
            .ok_or_else(|| SpecfoldError::PackageNotFound(name.to_string()))?;

        let report = self.purge(&config, &entry).await?;
        config.remove_knowledge(name);
        config.save()?;

        let pkg_path = self.project.knowledge_root().join(package_dir_name(name, &entry.source));
        if pkg_path.exists() {
            std::fs::remove_dir_all(&pkg_path)
                .with_context(|| format!("Failed to delete {}", pkg_path.display()))?;
        }
        info!(
            package = name,
            documents = report.documents,
            fingerprints = report.fingerprints,
            "knowledge package removed"
        );
        Ok(report)
    }

    /// Install every declared package. With `force`, each one is purged and
    /// cloned fresh; otherwise present packages are updated and missing
    /// ones cloned. Failures are collected and the loop continues.
    pub async fn install_all(&self, force: bool) -> Result<InstallReport> {
        let config = ProjectConfig::load(self.project)?;
        if let Some(store) = self.store {
            store.ensure_collections(&required_collections()).await?;
        }

        let mut report = InstallReport::default();
        for entry in config.knowledge() {
            match self.install_one(&config, &entry, force).await {
                Ok(()) => report.installed.push(entry.name.clone()),
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(package = %entry.name, error = %message, "knowledge package failed");
                    report.failed.push((entry.name.clone(), message));
                }
            }
        }
        Ok(report)
    }

    async fn install_one(&self, config: &ProjectConfig, entry: &KnowledgeEntry, force: bool) -> Result<()> {
        let pkg_path = self
            .project
            .knowledge_root()
            .join(package_dir_name(&entry.name, &entry.source));

        if force {
            if pkg_path.exists() {
                self.purge(config, entry).await?;
            }
            clone_package(self.vcs, self.project, &entry.name, &entry.source, &entry.version)?;
        } else if pkg_path.exists() {
            update_checkout(self.vcs, self.project, &entry.name, &entry.source, &entry.version)?;
        } else {
            clone_package(self.vcs, self.project, &entry.name, &entry.source, &entry.version)?;
        }

        self.index_package(&entry.name, &entry.source).await?;
        self.link_skills(config, &entry.name, &entry.source);
        Ok(())
    }

    /// Delete the package's documents and fingerprints and unlink its skills.
    async fn purge(&self, config: &ProjectConfig, entry: &KnowledgeEntry) -> Result<RemovalReport> {
        let prefix = package_prefix(&entry.name, &entry.source);
        let mut report = RemovalReport::default();

        if let Some(store) = self.store {
            for (collection, ids) in document_ids_by_path_prefix(store, &prefix).await? {
                report.documents += store.delete_documents(&collection, &ids).await?;
            }
        }
        report.fingerprints = self.fingerprints.remove_by_prefix(&prefix)?;

        if let Some(linker) = self.active_linker(config) {
            let pkg_path = self.project.resolve(&package_rel_path(&entry.name, &entry.source));
            if let Err(e) = linker.unlink_knowledge_skills(self.project.root(), &pkg_path) {
                warn!(package = %entry.name, error = %e, "unlinking skills failed");
            }
        }
        Ok(report)
    }

    async fn index_package(&self, name: &str, source: &str) -> Result<ReindexStats> {
        let Some(store) = self.store else {
            return Ok(ReindexStats::default());
        };
        store.ensure_collections(&required_collections()).await?;
        let files = enumerate::files_in_directory(self.project, &package_rel_path(name, source))?;
        let reindexer = Reindexer::new(self.project, store, self.fingerprints);
        Ok(reindexer.reindex_many(&files, &NoProgress).await)
    }

    fn active_linker(&self, config: &ProjectConfig) -> Option<&dyn SkillLinker> {
        let id = config.ai_tool()?;
        self.integrations.get(id)?.skill_linker()
    }

    fn link_skills(&self, config: &ProjectConfig, name: &str, source: &str) {
        let Some(linker) = self.active_linker(config) else {
            return;
        };
        let pkg_path = self.project.resolve(&package_rel_path(name, source));
        match linker.link_knowledge_skills(self.project.root(), &pkg_path) {
            Ok(n) if n > 0 => info!(package = name, skills = n, "linked skills"),
            Ok(_) => {}
            Err(e) => warn!(package = name, error = %e, "linking skills failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_collapses_separator_runs() {
        assert_eq!(
            normalize_source("github:acme/cross-knowledge/commons"),
            "github-acme-cross-knowledge-commons"
        );
        assert_eq!(
            normalize_source("https://example.com/a.git"),
            "https-example.com-a.git"
        );
        assert_eq!(normalize_source("/lead\\\\and:/trail/"), "lead-and-trail");
        assert_eq!(
            package_dir_name("commons", "github:acme/kb"),
            "commons-github-acme-kb"
        );
        assert_eq!(
            package_prefix("commons", "github:acme/kb"),
            ".specfold/knowledge/commons-github-acme-kb/"
        );
    }

    #[test]
    fn source_locators() {
        assert_eq!(
            source_to_git_url("github:acme/kb").as_deref(),
            Some("https://github.com/acme/kb.git")
        );
        assert_eq!(
            source_to_git_url("acme/kb").as_deref(),
            Some("https://github.com/acme/kb.git")
        );
        assert_eq!(
            source_to_git_url("git@github.com:acme/kb.git").as_deref(),
            Some("git@github.com:acme/kb.git")
        );
        assert_eq!(
            source_to_git_url(" https://gitlab.com/acme/kb.git ").as_deref(),
            Some("https://gitlab.com/acme/kb.git")
        );
        assert_eq!(source_to_git_url("just-a-name"), None);
        assert_eq!(source_to_git_url("acme / kb"), None);
        assert_eq!(source_to_git_url("github:"), None);
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel).unwrap();
    }

    #[test]
    fn flatten_moves_subfolder_up_and_drops_leftovers() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path();
        touch(pkg, ".git/HEAD");
        touch(pkg, "adr/stale.md");
        touch(pkg, "README.md");
        touch(pkg, "commons/docs/adrs/a.md");
        touch(pkg, "commons/rules/r.md");

        flatten_package_subfolder(pkg, "commons").unwrap();

        assert!(pkg.join("docs/adrs/a.md").is_file());
        assert!(pkg.join("rules/r.md").is_file());
        assert!(pkg.join(".git/HEAD").is_file());
        assert!(!pkg.join("commons").exists());
        assert!(!pkg.join("adr").exists());
        assert!(!pkg.join("README.md").exists());
    }

    #[test]
    fn flatten_handles_nested_folder_with_same_name() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path();
        touch(pkg, "kb/kb/notes.md");
        touch(pkg, "kb/rules/r.md");

        flatten_package_subfolder(pkg, "kb").unwrap();

        assert!(pkg.join("kb/notes.md").is_file());
        assert!(pkg.join("rules/r.md").is_file());
        assert!(!pkg.join(".flatten-kb").exists());
    }

    #[test]
    fn flatten_without_subfolder_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "rules/r.md");
        flatten_package_subfolder(dir.path(), "commons").unwrap();
        assert!(dir.path().join("rules/r.md").is_file());
    }
}
