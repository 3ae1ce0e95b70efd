//! Content fingerprints for change detection.
//!
//! The store is one JSON document mapping logical id to its digest and the
//! time it was last indexed:
//!
//! ```json
//! { "docs/rules/x.md": { "fingerprint": "9f86…", "last_indexed_at": "2026-01-01T00:00:00Z" } }
//! ```
//!
//! Each mutation reads the whole file and rewrites it atomically. An
//! unreadable or corrupt file reads as empty, so everything looks new.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specfold_core::compute_fingerprint;
use tracing::warn;

use crate::enumerate;
use crate::io::atomic_write;
use crate::project::Project;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// Result of comparing a file on disk with its stored fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeStatus {
    pub changed: bool,
    pub current_fingerprint: Option<String>,
    pub stored_fingerprint: Option<String>,
    pub exists_on_disk: bool,
}

/// Files needing reindex and stored ids whose file is gone, both sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangedDocuments {
    pub changed_or_new: Vec<String>,
    pub deleted: Vec<String>,
}

/// Persistent id → fingerprint mapping.
pub trait FingerprintStore: Send + Sync {
    /// Record `content`'s digest for `id`. Persisted before returning.
    fn update(&self, id: &str, content: &[u8]) -> Result<()>;

    /// Compare the file for `id` (or `path` when given) with the stored digest.
    fn has_changed(&self, id: &str, path: Option<&Path>) -> Result<ChangeStatus>;

    /// Changed or new files within an optional collection or directory scope,
    /// plus every stored id whose file no longer exists.
    fn list_changed(
        &self,
        collection: Option<&str>,
        directories: Option<&[String]>,
    ) -> Result<ChangedDocuments>;

    /// Drop every entry whose id starts with `prefix`. Returns how many.
    fn remove_by_prefix(&self, prefix: &str) -> Result<usize>;

    fn get(&self, id: &str) -> Option<FingerprintEntry>;
}

/// [`FingerprintStore`] backed by `fingerprints.json` in the data directory.
pub struct JsonFingerprintStore {
    project: Project,
    path: PathBuf,
}

impl JsonFingerprintStore {
    pub fn new(project: &Project) -> Self {
        Self {
            project: project.clone(),
            path: project.fingerprint_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, FingerprintEntry> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "fingerprint store unreadable, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn save(&self, entries: &BTreeMap<String, FingerprintEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        atomic_write(&self.path, json.as_bytes())
    }
}

impl FingerprintStore for JsonFingerprintStore {
    fn update(&self, id: &str, content: &[u8]) -> Result<()> {
        let mut entries = self.load();
        entries.insert(
            id.to_string(),
            FingerprintEntry {
                fingerprint: compute_fingerprint(content),
                last_indexed_at: Some(Utc::now()),
            },
        );
        self.save(&entries)
    }

    fn has_changed(&self, id: &str, path: Option<&Path>) -> Result<ChangeStatus> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.project.resolve(id));
        let stored_fingerprint = self.load().remove(id).map(|e| e.fingerprint);

        if !file.is_file() {
            return Ok(ChangeStatus {
                changed: true,
                current_fingerprint: None,
                stored_fingerprint,
                exists_on_disk: false,
            });
        }

        let current = compute_fingerprint(&std::fs::read(&file)?);
        Ok(ChangeStatus {
            changed: stored_fingerprint.as_deref() != Some(current.as_str()),
            current_fingerprint: Some(current),
            stored_fingerprint,
            exists_on_disk: true,
        })
    }

    fn list_changed(
        &self,
        collection: Option<&str>,
        directories: Option<&[String]>,
    ) -> Result<ChangedDocuments> {
        let candidates = match (collection, directories) {
            (Some(name), _) => enumerate::files_in_collection(&self.project, name),
            (None, Some(dirs)) if !dirs.is_empty() => {
                enumerate::files_in_directories(&self.project, dirs)?
            }
            _ => enumerate::all_files(&self.project),
        };

        let entries = self.load();
        let mut changed_or_new = Vec::new();
        for id in candidates {
            let Ok(bytes) = std::fs::read(self.project.resolve(&id)) else {
                continue;
            };
            let current = compute_fingerprint(&bytes);
            if entries.get(&id).map(|e| e.fingerprint.as_str()) != Some(current.as_str()) {
                changed_or_new.push(id);
            }
        }

        let deleted = entries
            .keys()
            .filter(|id| !self.project.resolve(id).exists())
            .cloned()
            .collect();

        Ok(ChangedDocuments {
            changed_or_new,
            deleted,
        })
    }

    fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|id, _| !id.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&entries)?;
        }
        Ok(removed)
    }

    fn get(&self, id: &str) -> Option<FingerprintEntry> {
        self.load().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Project, JsonFingerprintStore) {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path());
        let store = JsonFingerprintStore::new(&project);
        (dir, project, store)
    }

    fn write(project: &Project, rel: &str, body: &str) {
        let path = project.resolve(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn update_then_unchanged() {
        let (_dir, project, store) = setup();
        write(&project, "docs/rules/x.md", "# X");
        store.update("docs/rules/x.md", b"# X").unwrap();

        let status = store.has_changed("docs/rules/x.md", None).unwrap();
        assert!(!status.changed);
        assert!(status.exists_on_disk);
        assert_eq!(status.current_fingerprint, status.stored_fingerprint);
        assert_eq!(status.current_fingerprint.unwrap().len(), 64);
    }

    #[test]
    fn unknown_id_is_new_whether_or_not_on_disk() {
        let (_dir, project, store) = setup();
        let missing = store.has_changed("docs/rules/none.md", None).unwrap();
        assert!(missing.changed);
        assert!(missing.stored_fingerprint.is_none());
        assert!(!missing.exists_on_disk);

        write(&project, "docs/rules/new.md", "new");
        let fresh = store.has_changed("docs/rules/new.md", None).unwrap();
        assert!(fresh.changed);
        assert!(fresh.stored_fingerprint.is_none());
        assert!(fresh.exists_on_disk);
    }

    #[test]
    fn deleted_file_is_changed_and_listed_as_deleted() {
        let (_dir, project, store) = setup();
        write(&project, "docs/rules/gone.md", "bye");
        store.update("docs/rules/gone.md", b"bye").unwrap();
        std::fs::remove_file(project.resolve("docs/rules/gone.md")).unwrap();

        let status = store.has_changed("docs/rules/gone.md", None).unwrap();
        assert!(status.changed);
        assert!(!status.exists_on_disk);
        assert!(status.stored_fingerprint.is_some());

        let listed = store.list_changed(None, None).unwrap();
        assert_eq!(listed.deleted, vec!["docs/rules/gone.md"]);
        assert!(listed.changed_or_new.is_empty());
    }

    #[test]
    fn list_changed_scopes_candidates_but_not_deleted() {
        let (_dir, project, store) = setup();
        write(&project, "docs/rules/a.md", "a");
        write(&project, "docs/rules/b.md", "b");
        write(&project, "docs/features/f.feature", "Feature: f");
        store.update("docs/rules/a.md", b"a").unwrap();
        store.update("docs/adrs/old.md", b"old").unwrap();

        let rules = store.list_changed(Some("rules"), None).unwrap();
        assert_eq!(rules.changed_or_new, vec!["docs/rules/b.md"]);
        assert_eq!(rules.deleted, vec!["docs/adrs/old.md"]);

        let dirs = vec!["docs/features".to_string(), "docs/missing".to_string()];
        let scoped = store.list_changed(None, Some(&dirs)).unwrap();
        assert_eq!(scoped.changed_or_new, vec!["docs/features/f.feature"]);

        let unknown = store.list_changed(Some("nope"), None).unwrap();
        assert!(unknown.changed_or_new.is_empty());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let (_dir, project, store) = setup();
        std::fs::create_dir_all(project.data_dir()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        write(&project, "docs/rules/x.md", "x");
        assert!(store.has_changed("docs/rules/x.md", None).unwrap().changed);

        store.update("docs/rules/x.md", b"x").unwrap();
        assert!(!store.has_changed("docs/rules/x.md", None).unwrap().changed);
    }

    #[test]
    fn remove_by_prefix_only_touches_matching_ids() {
        let (_dir, _project, store) = setup();
        store.update(".specfold/knowledge/kb-a/rules/x.md", b"1").unwrap();
        store.update(".specfold/knowledge/kb-a/adrs/y.md", b"2").unwrap();
        store.update(".specfold/knowledge/kb-ab/rules/z.md", b"3").unwrap();
        store.update("docs/rules/x.md", b"4").unwrap();

        let removed = store.remove_by_prefix(".specfold/knowledge/kb-a/").unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(".specfold/knowledge/kb-ab/rules/z.md").is_some());
        assert!(store.get("docs/rules/x.md").is_some());
        assert_eq!(store.remove_by_prefix("nothing/").unwrap(), 0);
    }
}
