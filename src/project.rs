//! Project root and the fixed paths derived from it.
//!
//! Every core operation receives a [`Project`] explicitly; only `main`
//! looks at the current working directory.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};
use specfold_core::classify::{normalize, KNOWLEDGE_ROOT};

pub const CONFIG_FILE: &str = "specfold.toml";
pub const DATA_DIR: &str = ".specfold/data/context";
pub const STORE_FILE: &str = "store.sqlite";
pub const FINGERPRINT_FILE: &str = "fingerprints.json";

/// Directories `init` creates and `validate` checks.
pub const REQUIRED_DIRS: &[&str] = &[
    "docs/adrs",
    "docs/business",
    "docs/features",
    "docs/rules",
    "docs/ui-intent",
    DATA_DIR,
];

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join(STORE_FILE)
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.data_dir().join(FINGERPRINT_FILE)
    }

    pub fn knowledge_root(&self) -> PathBuf {
        self.root.join(KNOWLEDGE_ROOT)
    }

    /// The store counts as initialized once its database file exists.
    pub fn store_initialized(&self) -> bool {
        self.store_path().is_file()
    }

    /// Absolute location of a logical file id.
    pub fn resolve(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Logical id of `path`: relative to the root, forward slashes.
    ///
    /// Relative inputs are taken as relative to the project root. Paths
    /// outside the root are rejected.
    pub fn relative_id(&self, path: &Path) -> Result<String> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let relative = match absolute.strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                let canon_root = self.root.canonicalize()?;
                let canon_path = absolute.canonicalize()?;
                match canon_path.strip_prefix(&canon_root) {
                    Ok(rel) => rel.to_path_buf(),
                    Err(_) => bail!(
                        "{} is outside the project root {}",
                        path.display(),
                        self.root.display()
                    ),
                }
            }
        };
        let mut parts: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        bail!(
                            "{} is outside the project root {}",
                            path.display(),
                            self.root.display()
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(normalize(&parts.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_id_uses_forward_slashes() {
        let project = Project::new("/work/app");
        let id = project
            .relative_id(Path::new("/work/app/docs/rules/x.md"))
            .unwrap();
        assert_eq!(id, "docs/rules/x.md");
        let id = project.relative_id(Path::new("./docs/rules/y.md")).unwrap();
        assert_eq!(id, "docs/rules/y.md");
    }

    #[test]
    fn relative_id_resolves_parent_segments() {
        let project = Project::new("/work/app");
        let id = project
            .relative_id(Path::new("docs/rules/../rules/x.md"))
            .unwrap();
        assert_eq!(id, "docs/rules/x.md");
        let id = project
            .relative_id(Path::new("/work/app/docs/adrs/../../docs/rules/x.md"))
            .unwrap();
        assert_eq!(id, "docs/rules/x.md");
    }

    #[test]
    fn relative_id_rejects_climbing_above_the_root() {
        let project = Project::new("/work/app");
        let err = project
            .relative_id(Path::new("../sibling/docs/rules/x.md"))
            .unwrap_err();
        assert!(err.to_string().contains("outside the project root"));
    }

    #[test]
    fn fixed_paths_hang_off_the_root() {
        let project = Project::new("/work/app");
        assert_eq!(
            project.fingerprint_path(),
            PathBuf::from("/work/app/.specfold/data/context/fingerprints.json")
        );
        assert_eq!(
            project.knowledge_root(),
            PathBuf::from("/work/app/.specfold/knowledge")
        );
        assert!(!project.store_initialized());
    }
}
