//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the narrow interface the indexing pipeline
//! and the MCP bridge talk to. It models a named-collection document service:
//! collections hold documents keyed by a caller-supplied id, each with text
//! content and free-form metadata.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_collections`](DocumentStore::ensure_collections) | Create any missing required collection |
//! | [`list_collections`](DocumentStore::list_collections) | Collection names, paginated |
//! | [`create_collection`](DocumentStore::create_collection) | Get-or-create a collection |
//! | [`document_exists`](DocumentStore::document_exists) | Existence check by id |
//! | [`add_documents`](DocumentStore::add_documents) | Insert new documents |
//! | [`update_documents`](DocumentStore::update_documents) | Replace content and/or metadata |
//! | [`query`](DocumentStore::query) | Free-text search with filters |
//! | [`get_documents`](DocumentStore::get_documents) | Fetch by ids or filter |
//! | [`fork_collection`](DocumentStore::fork_collection) | Copy a collection |

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    CollectionInfo, DocumentUpdate, GetRequest, Metadata, NewDocument, QueryMatch, QueryRequest,
    StoredDocument, FILE_PATH_KEY,
};

/// Abstract collection-oriented document store.
///
/// Unknown collections are an error for every operation except
/// [`document_exists`](DocumentStore::document_exists), which answers `false`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create every collection in `required` that does not exist yet.
    ///
    /// Returns the names that were created.
    async fn ensure_collections(&self, required: &[&str]) -> Result<Vec<String>>;

    /// List collection names in name order.
    async fn list_collections(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<String>>;

    /// Create a collection; a no-op if it already exists.
    async fn create_collection(&self, name: &str, metadata: Option<Metadata>) -> Result<()>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    async fn collection_count(&self, name: &str) -> Result<usize>;

    /// Return up to `limit` documents in id order.
    async fn peek(&self, name: &str, limit: usize) -> Result<Vec<StoredDocument>>;

    async fn document_exists(&self, collection: &str, id: &str) -> Result<bool>;

    /// Insert documents. Fails if any id already exists in the collection.
    async fn add_documents(&self, collection: &str, docs: &[NewDocument]) -> Result<usize>;

    /// Update existing documents. Missing ids are skipped and not counted.
    async fn update_documents(&self, collection: &str, updates: &[DocumentUpdate])
        -> Result<usize>;

    /// Delete documents by id. Returns how many existed.
    async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<usize>;

    /// Free-text search, best match first, capped at `n_results`.
    async fn query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<QueryMatch>>;

    /// Fetch documents by ids and/or filter, in id order, then paginate.
    async fn get_documents(
        &self,
        collection: &str,
        request: &GetRequest,
    ) -> Result<Vec<StoredDocument>>;

    /// Rename a collection and/or replace its metadata.
    async fn modify_collection(
        &self,
        name: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Copy every document of `name` into a fresh collection `new_name`,
    /// replacing any existing collection of that name.
    async fn fork_collection(
        &self,
        name: &str,
        new_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<()>;
}

/// Collect, per collection, the ids of documents whose `file_path`
/// metadata starts with `prefix`.
///
/// Every collection the store lists is scanned. Collections without a match
/// are left out of the result.
pub async fn document_ids_by_path_prefix(
    store: &dyn DocumentStore,
    prefix: &str,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut result = BTreeMap::new();
    for collection in store.list_collections(None, None).await? {
        let docs = store
            .get_documents(&collection, &GetRequest::default())
            .await?;
        let matching: Vec<String> = docs
            .into_iter()
            .filter(|d| {
                d.metadata
                    .get(FILE_PATH_KEY)
                    .and_then(|v| v.as_str())
                    .map_or(false, |fp| fp.starts_with(prefix))
            })
            .map(|d| d.id)
            .collect();
        if !matching.is_empty() {
            result.insert(collection, matching);
        }
    }
    Ok(result)
}

/// Apply `offset` then `limit` to an already ordered list.
pub fn paginate<T>(items: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Vec<T> {
    let skipped = items.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(n) => skipped.take(n).collect(),
        None => skipped.collect(),
    }
}

/// Lowercased alphanumeric query terms; shared by backends for consistency.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .map(|t| t.trim_matches('-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
