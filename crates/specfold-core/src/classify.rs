//! Routing of project files to document-store collections.
//!
//! Two declarative tables drive everything:
//!
//! - [`COLLECTION_MAPPINGS`]: project-root directories → collection.
//! - [`KNOWLEDGE_PATH_MAPPINGS`]: path segments inside a knowledge package →
//!   collection. Packages may use either a nested `docs/<kind>` layout or a
//!   flat `<kind>` layout; both spellings route to the same collection.
//!
//! ```text
//! docs/rules/naming.md                                   → rules / rules
//! .specfold/knowledge/commons-github-org-kb/adrs/001.md  → business-and-architecture / adr
//! src/main.rs                                            → (not a context file)
//! ```
//!
//! Classification is a pure function of the path string: callers pass the
//! path relative to the project root (either separator style).

use std::sync::OnceLock;

use globset::{Glob, GlobMatcher};

/// Two-segment prefix under which knowledge packages are checked out.
pub const KNOWLEDGE_ROOT: &str = ".specfold/knowledge";

/// A project-root collection: the directories it owns and the file glob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionMapping {
    pub name: &'static str,
    pub directories: &'static [&'static str],
    pub file_pattern: &'static str,
    pub doc_type: &'static str,
}

/// A path segment inside a knowledge package routed to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgePathMapping {
    pub segment: &'static str,
    pub file_pattern: &'static str,
    pub collection: &'static str,
    pub doc_type: &'static str,
}

pub const COLLECTION_MAPPINGS: &[CollectionMapping] = &[
    CollectionMapping {
        name: "business-and-architecture",
        directories: &["docs/adrs", "docs/business"],
        file_pattern: "*.md",
        doc_type: "adr",
    },
    CollectionMapping {
        name: "features",
        directories: &["docs/features"],
        file_pattern: "*.feature",
        doc_type: "feature",
    },
    CollectionMapping {
        name: "rules",
        directories: &["docs/rules"],
        file_pattern: "*.md",
        doc_type: "rules",
    },
    CollectionMapping {
        name: "uisi",
        directories: &["docs/ui-intent"],
        file_pattern: "*.yaml",
        doc_type: "ui-intent",
    },
];

/// Evaluated in declared order; the first matching entry wins.
pub const KNOWLEDGE_PATH_MAPPINGS: &[KnowledgePathMapping] = &[
    KnowledgePathMapping {
        segment: "docs/adrs",
        file_pattern: "*.md",
        collection: "business-and-architecture",
        doc_type: "adr",
    },
    KnowledgePathMapping {
        segment: "adrs",
        file_pattern: "*.md",
        collection: "business-and-architecture",
        doc_type: "adr",
    },
    KnowledgePathMapping {
        segment: "docs/business",
        file_pattern: "*.md",
        collection: "business-and-architecture",
        doc_type: "project-doc",
    },
    KnowledgePathMapping {
        segment: "business",
        file_pattern: "*.md",
        collection: "business-and-architecture",
        doc_type: "project-doc",
    },
    KnowledgePathMapping {
        segment: "docs/features",
        file_pattern: "*.feature",
        collection: "features",
        doc_type: "feature",
    },
    KnowledgePathMapping {
        segment: "features",
        file_pattern: "*.feature",
        collection: "features",
        doc_type: "feature",
    },
    KnowledgePathMapping {
        segment: "docs/rules",
        file_pattern: "*.md",
        collection: "rules",
        doc_type: "rules",
    },
    KnowledgePathMapping {
        segment: "rules",
        file_pattern: "*.md",
        collection: "rules",
        doc_type: "rules",
    },
    KnowledgePathMapping {
        segment: "docs/ui-intent",
        file_pattern: "*.yaml",
        collection: "uisi",
        doc_type: "ui-intent",
    },
    KnowledgePathMapping {
        segment: "ui-intent",
        file_pattern: "*.yaml",
        collection: "uisi",
        doc_type: "ui-intent",
    },
];

/// Names of the collections every initialized store must contain.
pub fn required_collections() -> Vec<&'static str> {
    COLLECTION_MAPPINGS.iter().map(|m| m.name).collect()
}

/// Look up a project-root mapping by collection name.
pub fn mapping_for_collection(name: &str) -> Option<&'static CollectionMapping> {
    COLLECTION_MAPPINGS.iter().find(|m| m.name == name)
}

/// Look up the mapping that declares `dir` as one of its directories.
///
/// Exact membership only: `docs/rules/sub` is not a collection directory.
pub fn mapping_for_directory(dir: &str) -> Option<&'static CollectionMapping> {
    let dir = normalize(dir);
    let dir = dir.trim_end_matches('/');
    COLLECTION_MAPPINGS
        .iter()
        .find(|m| m.directories.iter().any(|d| *d == dir))
}

/// The collection and semantic type a path routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub collection: &'static str,
    pub doc_type: &'static str,
}

/// Convert backslashes to forward slashes and drop a leading `./`.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    match unified.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => unified,
    }
}

/// True when `path` is `dir` itself or lies beneath it (segment-aware).
pub fn is_under(path: &str, dir: &str) -> bool {
    match path.strip_prefix(dir) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Split a path below [`KNOWLEDGE_ROOT`] into `(package_dir, rest)`.
///
/// Returns `None` unless the path has at least one segment after the
/// package directory.
pub fn split_knowledge_path(path: &str) -> Option<(&str, &str)> {
    let below_root = path.strip_prefix(KNOWLEDGE_ROOT)?.strip_prefix('/')?;
    let (package_dir, rest) = below_root.split_once('/')?;
    if package_dir.is_empty() || rest.is_empty() {
        return None;
    }
    Some((package_dir, rest))
}

fn compiled_patterns() -> &'static [(&'static str, GlobMatcher)] {
    static PATTERNS: OnceLock<Vec<(&'static str, GlobMatcher)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut patterns: Vec<&'static str> = COLLECTION_MAPPINGS
            .iter()
            .map(|m| m.file_pattern)
            .chain(KNOWLEDGE_PATH_MAPPINGS.iter().map(|m| m.file_pattern))
            .collect();
        patterns.sort_unstable();
        patterns.dedup();
        patterns
            .into_iter()
            .filter_map(|p| Glob::new(p).ok().map(|g| (p, g.compile_matcher())))
            .collect()
    })
}

/// Match a bare file name against a glob such as `*.md`.
pub fn file_name_matches(pattern: &str, file_name: &str) -> bool {
    if let Some((_, matcher)) = compiled_patterns().iter().find(|(p, _)| *p == pattern) {
        return matcher.is_match(file_name);
    }
    Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(file_name))
        .unwrap_or(false)
}

/// Classify a project-relative path. `None` means "not a context file".
pub fn classify(relative_path: &str) -> Option<Classification> {
    let path = normalize(relative_path);
    let file_name = path.rsplit('/').next().filter(|n| !n.is_empty())?;

    if let Some((_, rest)) = split_knowledge_path(&path) {
        return KNOWLEDGE_PATH_MAPPINGS
            .iter()
            .find(|m| is_under(rest, m.segment) && file_name_matches(m.file_pattern, file_name))
            .map(|m| Classification {
                collection: m.collection,
                doc_type: m.doc_type,
            });
    }

    COLLECTION_MAPPINGS
        .iter()
        .find(|m| {
            m.directories.iter().any(|d| is_under(&path, d))
                && file_name_matches(m.file_pattern, file_name)
        })
        .map(|m| Classification {
            collection: m.name,
            doc_type: m.doc_type,
        })
}

/// Collection name for a project-relative path.
pub fn collection_for(relative_path: &str) -> Option<&'static str> {
    classify(relative_path).map(|c| c.collection)
}

/// Semantic type label for a project-relative path.
pub fn type_for(relative_path: &str) -> Option<&'static str> {
    classify(relative_path).map(|c| c.doc_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_files_route_by_directory_and_glob() {
        assert_eq!(collection_for("docs/rules/x.md"), Some("rules"));
        assert_eq!(type_for("docs/rules/x.md"), Some("rules"));
        assert_eq!(
            collection_for("docs/adrs/001-use-sqlite.md"),
            Some("business-and-architecture")
        );
        assert_eq!(type_for("docs/business/vision.md"), Some("adr"));
        assert_eq!(collection_for("docs/features/login.feature"), Some("features"));
        assert_eq!(collection_for("docs/ui-intent/checkout.yaml"), Some("uisi"));
        assert_eq!(type_for("docs/ui-intent/checkout.yaml"), Some("ui-intent"));
    }

    #[test]
    fn nested_files_still_classify() {
        assert_eq!(collection_for("docs/rules/backend/errors.md"), Some("rules"));
    }

    #[test]
    fn wrong_extension_or_directory_is_not_context() {
        assert_eq!(classify("docs/rules/x.txt"), None);
        assert_eq!(classify("docs/features/login.md"), None);
        assert_eq!(classify("src/main.rs"), None);
        assert_eq!(classify("README.md"), None);
    }

    #[test]
    fn directory_prefix_is_segment_aware() {
        assert_eq!(classify("docs/rules-old/x.md"), None);
        assert_eq!(classify("docs/adrsx/001.md"), None);
    }

    #[test]
    fn backslashes_are_normalized() {
        assert_eq!(collection_for("docs\\rules\\x.md"), Some("rules"));
        assert_eq!(collection_for("./docs/rules/x.md"), Some("rules"));
    }

    #[test]
    fn knowledge_package_nested_and_flat_layouts() {
        let nested = ".specfold/knowledge/commons-github-org-kb/docs/adrs/001.md";
        let flat = ".specfold/knowledge/commons-github-org-kb/adrs/001.md";
        assert_eq!(collection_for(nested), Some("business-and-architecture"));
        assert_eq!(collection_for(flat), Some("business-and-architecture"));
        assert_eq!(type_for(flat), Some("adr"));
        assert_eq!(
            type_for(".specfold/knowledge/pkg/business/market.md"),
            Some("project-doc")
        );
        assert_eq!(
            collection_for(".specfold/knowledge/pkg/features/a.feature"),
            Some("features")
        );
    }

    #[test]
    fn knowledge_package_unmapped_paths_are_rejected() {
        assert_eq!(classify(".specfold/knowledge/pkg/skills/review/SKILL.md"), None);
        assert_eq!(classify(".specfold/knowledge/pkg/README.md"), None);
        assert_eq!(classify(".specfold/knowledge/pkg"), None);
        // Project-root table never applies inside a package.
        assert_eq!(classify(".specfold/knowledge/pkg/docs/rules/x.txt"), None);
    }

    #[test]
    fn classification_is_order_independent() {
        let paths = [
            "docs/rules/x.md",
            ".specfold/knowledge/p/rules/y.md",
            "src/lib.rs",
            "docs/features/f.feature",
        ];
        let first: Vec<_> = paths.iter().map(|p| classify(p)).collect();
        let reversed: Vec<_> = paths.iter().rev().map(|p| classify(p)).collect();
        let mut reversed = reversed;
        reversed.reverse();
        assert_eq!(first, reversed);
        assert_eq!(first, paths.iter().map(|p| classify(p)).collect::<Vec<_>>());
    }

    #[test]
    fn split_knowledge_path_requires_package_and_rest() {
        assert_eq!(
            split_knowledge_path(".specfold/knowledge/pkg/adrs/a.md"),
            Some(("pkg", "adrs/a.md"))
        );
        assert_eq!(split_knowledge_path(".specfold/knowledge/pkg"), None);
        assert_eq!(split_knowledge_path(".specfold/knowledge"), None);
        assert_eq!(split_knowledge_path(".specfold/knowledgebase/pkg/a.md"), None);
    }

    #[test]
    fn directory_membership_is_exact() {
        assert_eq!(mapping_for_directory("docs/rules").map(|m| m.name), Some("rules"));
        assert_eq!(
            mapping_for_directory("docs/business/").map(|m| m.name),
            Some("business-and-architecture")
        );
        assert!(mapping_for_directory("docs/rules/sub").is_none());
        assert!(mapping_for_directory("docs").is_none());
    }

    #[test]
    fn required_collections_are_the_four_canonical_ones() {
        assert_eq!(
            required_collections(),
            vec!["business-and-architecture", "features", "rules", "uisi"]
        );
    }
}
