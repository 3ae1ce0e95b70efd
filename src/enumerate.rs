//! Candidate file discovery for reindex and change listing.
//!
//! Every function returns logical ids (project-relative, forward slashes),
//! sorted and deduplicated, and only ids that classify to a collection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use specfold_core::classify::{
    self, file_name_matches, is_under, mapping_for_collection, mapping_for_directory, normalize,
    COLLECTION_MAPPINGS, KNOWLEDGE_PATH_MAPPINGS, KNOWLEDGE_ROOT,
};
use walkdir::WalkDir;

use crate::error::SpecfoldError;
use crate::project::Project;

/// Values accepted by `reindex --type`, with the directories and glob each one scans.
pub const TYPE_FILTERS: &[(&str, &[&str], &str)] = &[
    ("rules", &["docs/rules"], "*.md"),
    ("feature", &["docs/features"], "*.feature"),
    ("md", &["docs/adrs", "docs/business"], "*.md"),
    ("yaml", &["docs/ui-intent"], "*.yaml"),
];

/// What a reindex run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexScope {
    File(PathBuf),
    Type(String),
    Directory(String),
    All,
}

impl ReindexScope {
    /// Pick the scope from CLI inputs: file, then type, then directory.
    pub fn from_flags(
        file: Option<PathBuf>,
        doc_type: Option<String>,
        directory: Option<String>,
    ) -> Self {
        match (file, doc_type, directory) {
            (Some(f), _, _) => ReindexScope::File(f),
            (None, Some(t), _) => ReindexScope::Type(t),
            (None, None, Some(d)) => ReindexScope::Directory(d),
            (None, None, None) => ReindexScope::All,
        }
    }
}

pub fn files_for_scope(project: &Project, scope: &ReindexScope) -> Result<Vec<String>> {
    match scope {
        ReindexScope::File(path) => single_file(project, path).map(|id| vec![id]),
        ReindexScope::Type(kind) => files_for_type(project, kind),
        ReindexScope::Directory(dir) => files_in_directory(project, dir),
        ReindexScope::All => Ok(all_files(project)),
    }
}

fn single_file(project: &Project, path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project.root().join(path)
    };
    if !absolute.is_file() {
        return Err(SpecfoldError::FileNotFound(path.display().to_string()).into());
    }
    let id = project.relative_id(&absolute)?;
    if classify::classify(&id).is_none() {
        return Err(SpecfoldError::NotContextFile(id).into());
    }
    Ok(id)
}

pub fn files_for_type(project: &Project, kind: &str) -> Result<Vec<String>> {
    let (_, dirs, pattern) = TYPE_FILTERS
        .iter()
        .find(|(name, _, _)| *name == kind)
        .ok_or_else(|| SpecfoldError::UnknownType {
            kind: kind.to_string(),
            valid: TYPE_FILTERS
                .iter()
                .map(|(name, _, _)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        })?;
    let mut ids = BTreeSet::new();
    for dir in dirs.iter() {
        walk_matching(project, dir, pattern, &mut ids);
    }
    Ok(finish(ids))
}

/// Files under one directory. The directory must exist and be either a
/// collection directory or inside the knowledge root.
pub fn files_in_directory(project: &Project, dir: &str) -> Result<Vec<String>> {
    let dir = normalize(dir).trim_end_matches('/').to_string();
    if !project.root().join(&dir).is_dir() {
        return Err(SpecfoldError::DirectoryNotFound(dir).into());
    }
    let mut ids = BTreeSet::new();
    collect_directory(project, &dir, &mut ids)?;
    Ok(finish(ids))
}

/// Files in the given collection, project directories and packages alike.
/// An unknown collection yields nothing.
pub fn files_in_collection(project: &Project, name: &str) -> Vec<String> {
    let Some(mapping) = mapping_for_collection(name) else {
        return Vec::new();
    };
    let mut ids = BTreeSet::new();
    for dir in mapping.directories {
        walk_matching(project, dir, mapping.file_pattern, &mut ids);
    }
    for package in package_dirs(project) {
        collect_package(project, &package, &mut ids);
    }
    finish(ids)
        .into_iter()
        .filter(|id| classify::collection_for(id) == Some(name))
        .collect()
}

/// Union of several directories. Missing directories are skipped.
pub fn files_in_directories(project: &Project, dirs: &[String]) -> Result<Vec<String>> {
    let mut ids = BTreeSet::new();
    for dir in dirs {
        let dir = normalize(dir).trim_end_matches('/').to_string();
        if !project.root().join(&dir).is_dir() {
            continue;
        }
        collect_directory(project, &dir, &mut ids)?;
    }
    Ok(finish(ids))
}

/// Every context file: all collection directories plus every package.
pub fn all_files(project: &Project) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for mapping in COLLECTION_MAPPINGS {
        for dir in mapping.directories {
            walk_matching(project, dir, mapping.file_pattern, &mut ids);
        }
    }
    for package in package_dirs(project) {
        collect_package(project, &package, &mut ids);
    }
    finish(ids)
}

fn collect_directory(project: &Project, dir: &str, ids: &mut BTreeSet<String>) -> Result<()> {
    if is_under(dir, KNOWLEDGE_ROOT) {
        let below = dir
            .strip_prefix(KNOWLEDGE_ROOT)
            .unwrap_or_default()
            .trim_start_matches('/');
        match below.split('/').next().filter(|s| !s.is_empty()) {
            None => {
                for package in package_dirs(project) {
                    collect_package(project, &package, ids);
                }
            }
            Some(package) => {
                let package_rel = format!("{}/{}", KNOWLEDGE_ROOT, package);
                let mut found = BTreeSet::new();
                collect_package(project, &package_rel, &mut found);
                ids.extend(found.into_iter().filter(|id| is_under(id, dir)));
            }
        }
        return Ok(());
    }

    let mapping = mapping_for_directory(dir).ok_or_else(|| SpecfoldError::InvalidDirectory {
        dir: dir.to_string(),
        valid: COLLECTION_MAPPINGS
            .iter()
            .flat_map(|m| m.directories.iter().copied())
            .chain(std::iter::once(KNOWLEDGE_ROOT))
            .collect::<Vec<_>>()
            .join(", "),
    })?;
    walk_matching(project, dir, mapping.file_pattern, ids);
    Ok(())
}

/// Relative paths of every package directory under the knowledge root.
pub fn package_dirs(project: &Project) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(project.knowledge_root()) else {
        return Vec::new();
    };
    let mut dirs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| format!("{}/{}", KNOWLEDGE_ROOT, e.file_name().to_string_lossy()))
        .collect();
    dirs.sort();
    dirs
}

fn collect_package(project: &Project, package_rel: &str, ids: &mut BTreeSet<String>) {
    for mapping in KNOWLEDGE_PATH_MAPPINGS {
        let dir = format!("{}/{}", package_rel, mapping.segment);
        walk_matching(project, &dir, mapping.file_pattern, ids);
    }
}

fn walk_matching(project: &Project, dir: &str, pattern: &str, ids: &mut BTreeSet<String>) {
    let root = project.root().join(dir);
    if !root.is_dir() {
        return;
    }
    let walker = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !file_name_matches(pattern, &name) {
            continue;
        }
        if let Ok(id) = project.relative_id(entry.path()) {
            ids.insert(id);
        }
    }
}

fn finish(ids: BTreeSet<String>) -> Vec<String> {
    ids.into_iter()
        .filter(|id| classify::classify(id).is_some())
        .collect()
}
