//! Data types exchanged with a [`DocumentStore`](crate::store::DocumentStore).
//!
//! Documents are keyed by a caller-supplied id inside a named collection.
//! For indexed context files the id is the project-relative path with
//! forward slashes, and the same value is stored as `file_path` metadata.

use serde::{Deserialize, Serialize};

/// Free-form per-document or per-collection metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the logical file identifier of an indexed file.
pub const FILE_PATH_KEY: &str = "file_path";
/// Metadata key holding the semantic type label (`adr`, `rules`, ...).
pub const TYPE_KEY: &str = "type";
/// Metadata key holding the collection name the file was routed to.
pub const COLLECTION_KEY: &str = "collection";

/// Build the metadata attached to an indexed context file.
pub fn file_metadata(file_path: &str, doc_type: &str, collection: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(FILE_PATH_KEY.to_string(), file_path.into());
    meta.insert(TYPE_KEY.to_string(), doc_type.into());
    meta.insert(COLLECTION_KEY.to_string(), collection.into());
    meta
}

/// A document to be added to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A partial update for an existing document. `None` fields are left as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// A stored document as returned by get/peek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

/// Name and metadata of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub metadata: Metadata,
}

/// Filters shared by get and query requests.
///
/// `metadata` is an equality filter: every key must be present on the
/// document with an equal value. `content_contains` is a plain substring
/// test on the document body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub content_contains: Option<String>,
}

impl DocumentFilter {
    pub fn is_empty(&self) -> bool {
        self.metadata.as_ref().map_or(true, |m| m.is_empty()) && self.content_contains.is_none()
    }

    /// Returns `true` if the document satisfies every configured filter.
    pub fn matches(&self, content: &str, metadata: &Metadata) -> bool {
        if let Some(wanted) = &self.metadata {
            let all_equal = wanted
                .iter()
                .all(|(key, value)| metadata.get(key).map_or(false, |v| v == value));
            if !all_equal {
                return false;
            }
        }
        match &self.content_contains {
            Some(needle) => content.contains(needle.as_str()),
            None => true,
        }
    }
}

/// Get documents by id list and/or filter, with optional pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default, flatten)]
    pub filter: DocumentFilter,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Free-text query against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default, flatten)]
    pub filter: DocumentFilter,
}

fn default_n_results() -> usize {
    5
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            n_results: default_n_results(),
            filter: DocumentFilter::default(),
        }
    }
}

/// One ranked query hit. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub score: f64,
}
