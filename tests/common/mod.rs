//! Shared fixtures: a filesystem-backed fake for the `Vcs` trait.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use specfold::git::Vcs;
use specfold::SpecfoldError;
use walkdir::WalkDir;

struct Checkout {
    url: String,
    sparse: Vec<String>,
    tracked: Vec<String>,
}

/// Remotes are plain directories: `url -> ref -> tree`. A checkout copies
/// the files of the tree that match the sparse path list.
#[derive(Default)]
pub struct FakeVcs {
    remotes: HashMap<String, HashMap<String, PathBuf>>,
    checkouts: Mutex<HashMap<PathBuf, Checkout>>,
    calls: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the files under `tree` as `reference` of `url`.
    pub fn add_remote(&mut self, url: &str, reference: &str, tree: &Path) {
        self.remotes
            .entry(url.to_string())
            .or_default()
            .insert(reference.to_string(), tree.to_path_buf());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail(command: &str, stderr: &str) -> anyhow::Error {
        SpecfoldError::Git {
            command: command.to_string(),
            stderr: stderr.to_string(),
        }
        .into()
    }

    fn tree_for(&self, url: &str, reference: &str) -> Result<PathBuf> {
        self.remotes
            .get(url)
            .and_then(|refs| refs.get(reference))
            .cloned()
            .ok_or_else(|| {
                Self::fail(
                    "checkout",
                    &format!("error: pathspec '{}' did not match", reference),
                )
            })
    }
}

fn matches_sparse(rel: &str, sparse: &[String]) -> bool {
    sparse
        .iter()
        .any(|s| rel == s || rel.starts_with(&format!("{}/", s)))
}

impl Vcs for FakeVcs {
    fn clone_blobless(&self, url: &str, dest: &Path) -> Result<()> {
        self.log(format!("clone {}", url));
        if !self.remotes.contains_key(url) {
            return Err(Self::fail(
                "clone",
                &format!("fatal: repository '{}' not found", url),
            ));
        }
        std::fs::create_dir_all(dest.join(".git"))?;
        self.checkouts.lock().unwrap().insert(
            dest.to_path_buf(),
            Checkout {
                url: url.to_string(),
                sparse: Vec::new(),
                tracked: Vec::new(),
            },
        );
        Ok(())
    }

    fn sparse_checkout_init(&self, repo: &Path) -> Result<()> {
        self.log("sparse-checkout init".to_string());
        if !self.checkouts.lock().unwrap().contains_key(repo) {
            return Err(Self::fail("sparse-checkout init", "fatal: not a git repository"));
        }
        Ok(())
    }

    fn sparse_checkout_set(&self, repo: &Path, paths: &[&str]) -> Result<()> {
        self.log(format!("sparse-checkout set {}", paths.join(" ")));
        let mut checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts
            .get_mut(repo)
            .ok_or_else(|| Self::fail("sparse-checkout set", "fatal: not a git repository"))?;
        checkout.sparse = paths.iter().map(|p| p.to_string()).collect();
        Ok(())
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        self.log(format!("checkout {}", reference));
        let mut checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts
            .get_mut(repo)
            .ok_or_else(|| Self::fail("checkout", "fatal: not a git repository"))?;
        let tree = self.tree_for(&checkout.url, reference)?;

        for rel in checkout.tracked.drain(..) {
            let _ = std::fs::remove_file(repo.join(rel));
        }

        for entry in WalkDir::new(&tree).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&tree)?
                .to_string_lossy()
                .replace('\\', "/");
            if !matches_sparse(&rel, &checkout.sparse) {
                continue;
            }
            let dest = repo.join(&rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
            checkout.tracked.push(rel);
        }
        Ok(())
    }

    fn fetch(&self, repo: &Path, reference: &str) -> Result<()> {
        self.log(format!("fetch {}", reference));
        let checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts
            .get(repo)
            .ok_or_else(|| Self::fail("fetch", "fatal: not a git repository"))?;
        self.tree_for(&checkout.url, reference)
            .map(|_| ())
            .map_err(|_| Self::fail("fetch", &format!("fatal: couldn't find remote ref {}", reference)))
    }
}

/// Write `body` at `root/rel`, creating parents.
pub fn write_file(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}
