//! In-memory [`DocumentStore`] implementation for tests and embedding.
//!
//! Collections live in a `BTreeMap` behind `std::sync::RwLock`, so ids come
//! back in sorted order. Query scoring counts how many query terms occur in
//! the document body.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    CollectionInfo, DocumentUpdate, GetRequest, Metadata, NewDocument, QueryMatch, QueryRequest,
    StoredDocument,
};

use super::{paginate, query_terms, DocumentStore};

#[derive(Debug, Clone, Default)]
struct Collection {
    metadata: Metadata,
    docs: BTreeMap<String, StoredDocument>,
}

/// In-memory store for testing and library embedding.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(name: &str) -> anyhow::Error {
    anyhow!("collection not found: {}", name)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_collections(&self, required: &[&str]) -> Result<Vec<String>> {
        let mut collections = self.write()?;
        let mut created = Vec::new();
        for name in required {
            if !collections.contains_key(*name) {
                collections.insert(name.to_string(), Collection::default());
                created.push(name.to_string());
            }
        }
        Ok(created)
    }

    async fn list_collections(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<String>> {
        let names: Vec<String> = self.read()?.keys().cloned().collect();
        Ok(paginate(names, limit, offset))
    }

    async fn create_collection(&self, name: &str, metadata: Option<Metadata>) -> Result<()> {
        self.write()?
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                metadata: metadata.unwrap_or_default(),
                docs: BTreeMap::new(),
            });
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.read()?;
        let col = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            metadata: col.metadata.clone(),
        })
    }

    async fn collection_count(&self, name: &str) -> Result<usize> {
        let collections = self.read()?;
        Ok(collections.get(name).ok_or_else(|| missing(name))?.docs.len())
    }

    async fn peek(&self, name: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        let collections = self.read()?;
        let col = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(col.docs.values().take(limit).cloned().collect())
    }

    async fn document_exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .read()?
            .get(collection)
            .map_or(false, |c| c.docs.contains_key(id)))
    }

    async fn add_documents(&self, collection: &str, docs: &[NewDocument]) -> Result<usize> {
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        if let Some(dup) = docs.iter().find(|d| col.docs.contains_key(&d.id)) {
            bail!(
                "document '{}' already exists in collection '{}'",
                dup.id,
                collection
            );
        }
        for doc in docs {
            col.docs.insert(
                doc.id.clone(),
                StoredDocument {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                },
            );
        }
        Ok(docs.len())
    }

    async fn update_documents(
        &self,
        collection: &str,
        updates: &[DocumentUpdate],
    ) -> Result<usize> {
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let mut updated = 0;
        for update in updates {
            if let Some(doc) = col.docs.get_mut(&update.id) {
                if let Some(content) = &update.content {
                    doc.content = content.clone();
                }
                if let Some(metadata) = &update.metadata {
                    doc.metadata = metadata.clone();
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        Ok(ids.iter().filter(|id| col.docs.remove(*id).is_some()).count())
    }

    async fn query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<QueryMatch>> {
        let terms = query_terms(&request.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let collections = self.read()?;
        let col = collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;
        let mut matches: Vec<QueryMatch> = col
            .docs
            .values()
            .filter(|d| request.filter.matches(&d.content, &d.metadata))
            .filter_map(|d| {
                let body = d.content.to_lowercase();
                let hits = terms.iter().filter(|t| body.contains(t.as_str())).count();
                (hits > 0).then(|| QueryMatch {
                    id: d.id.clone(),
                    content: d.content.clone(),
                    metadata: d.metadata.clone(),
                    score: hits as f64 / terms.len() as f64,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.n_results);
        Ok(matches)
    }

    async fn get_documents(
        &self,
        collection: &str,
        request: &GetRequest,
    ) -> Result<Vec<StoredDocument>> {
        let collections = self.read()?;
        let col = collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;
        let docs: Vec<StoredDocument> = col
            .docs
            .values()
            .filter(|d| {
                request
                    .ids
                    .as_ref()
                    .map_or(true, |ids| ids.iter().any(|id| *id == d.id))
            })
            .filter(|d| request.filter.matches(&d.content, &d.metadata))
            .cloned()
            .collect();
        Ok(paginate(docs, request.limit, request.offset))
    }

    async fn modify_collection(
        &self,
        name: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(target) = new_name {
            if target != name && collections.contains_key(target) {
                bail!("collection already exists: {}", target);
            }
        }
        let mut col = collections.remove(name).ok_or_else(|| missing(name))?;
        if let Some(metadata) = new_metadata {
            col.metadata = metadata;
        }
        collections.insert(new_name.unwrap_or(name).to_string(), col);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.write()?.remove(name).ok_or_else(|| missing(name))?;
        Ok(())
    }

    async fn fork_collection(
        &self,
        name: &str,
        new_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let mut collections = self.write()?;
        let docs = collections
            .get(name)
            .ok_or_else(|| missing(name))?
            .docs
            .clone();
        collections.insert(
            new_name.to_string(),
            Collection {
                metadata: metadata.unwrap_or_default(),
                docs,
            },
        );
        Ok(())
    }
}
