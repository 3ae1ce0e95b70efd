//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Documents live in a `documents` table keyed by `(collection, id)`; the
//! body is mirrored into the `documents_fts` FTS5 table for free-text
//! query. Metadata is stored as JSON text and filtered in Rust.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use specfold_core::models::{
    CollectionInfo, DocumentUpdate, GetRequest, Metadata, NewDocument, QueryMatch, QueryRequest,
    StoredDocument,
};
use specfold_core::store::{paginate, query_terms, DocumentStore};

use crate::{db, migrate};

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn require_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            bail!("collection not found: {}", name);
        }
        Ok(())
    }

    async fn all_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata_json FROM documents WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }
}

fn parse_metadata(json: &str) -> Metadata {
    serde_json::from_str(json).unwrap_or_default()
}

fn row_to_document(row: &SqliteRow) -> StoredDocument {
    let metadata_json: String = row.get("metadata_json");
    StoredDocument {
        id: row.get("id"),
        content: row.get("content"),
        metadata: parse_metadata(&metadata_json),
    }
}

/// Quote each term so FTS5 syntax characters in user text are inert.
fn fts_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_collections(&self, required: &[&str]) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for name in required {
            let result =
                sqlx::query("INSERT OR IGNORE INTO collections (name, metadata_json) VALUES (?, '{}')")
                    .bind(*name)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 1 {
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
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(paginate(names, limit, offset))
    }

    async fn create_collection(&self, name: &str, metadata: Option<Metadata>) -> Result<()> {
        let metadata_json = serde_json::to_string(&metadata.unwrap_or_default())?;
        sqlx::query("INSERT OR IGNORE INTO collections (name, metadata_json) VALUES (?, ?)")
            .bind(name)
            .bind(metadata_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let metadata_json: Option<String> =
            sqlx::query_scalar("SELECT metadata_json FROM collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let metadata_json = metadata_json.ok_or_else(|| anyhow!("collection not found: {}", name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            metadata: parse_metadata(&metadata_json),
        })
    }

    async fn collection_count(&self, name: &str) -> Result<usize> {
        self.require_collection(name).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn peek(&self, name: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        self.require_collection(name).await?;
        let rows = sqlx::query(
            "SELECT id, content, metadata_json FROM documents WHERE collection = ? ORDER BY id LIMIT ?",
        )
        .bind(name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document_exists(&self, collection: &str, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_documents(&self, collection: &str, docs: &[NewDocument]) -> Result<usize> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let exists: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM documents WHERE collection = ? AND id = ?",
            )
            .bind(collection)
            .bind(&doc.id)
            .fetch_one(&mut *tx)
            .await?;
            if exists {
                bail!(
                    "document '{}' already exists in collection '{}'",
                    doc.id,
                    collection
                );
            }
            sqlx::query(
                "INSERT INTO documents (collection, id, content, metadata_json) VALUES (?, ?, ?, ?)",
            )
            .bind(collection)
            .bind(&doc.id)
            .bind(&doc.content)
            .bind(serde_json::to_string(&doc.metadata)?)
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO documents_fts (collection, doc_id, content) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(&doc.id)
                .bind(&doc.content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(docs.len())
    }

    async fn update_documents(
        &self,
        collection: &str,
        updates: &[DocumentUpdate],
    ) -> Result<usize> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for update in updates {
            let found = sqlx::query(
                "SELECT id FROM documents WHERE collection = ? AND id = ?",
            )
            .bind(collection)
            .bind(&update.id)
            .fetch_optional(&mut *tx)
            .await?;
            if found.is_none() {
                continue;
            }
            if let Some(content) = &update.content {
                sqlx::query("UPDATE documents SET content = ? WHERE collection = ? AND id = ?")
                    .bind(content)
                    .bind(collection)
                    .bind(&update.id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM documents_fts WHERE collection = ? AND doc_id = ?")
                    .bind(collection)
                    .bind(&update.id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "INSERT INTO documents_fts (collection, doc_id, content) VALUES (?, ?, ?)",
                )
                .bind(collection)
                .bind(&update.id)
                .bind(content)
                .execute(&mut *tx)
                .await?;
            }
            if let Some(metadata) = &update.metadata {
                sqlx::query(
                    "UPDATE documents SET metadata_json = ? WHERE collection = ? AND id = ?",
                )
                .bind(serde_json::to_string(metadata)?)
                .bind(collection)
                .bind(&update.id)
                .execute(&mut *tx)
                .await?;
            }
            updated += 1;
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<usize> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected() as usize;
            sqlx::query("DELETE FROM documents_fts WHERE collection = ? AND doc_id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<QueryMatch>> {
        self.require_collection(collection).await?;
        let terms = query_terms(&request.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.content, d.metadata_json, documents_fts.rank AS rank
            FROM documents_fts
            JOIN documents d
              ON d.collection = documents_fts.collection AND d.id = documents_fts.doc_id
            WHERE documents_fts MATCH ? AND documents_fts.collection = ?
            ORDER BY rank
            "#,
        )
        .bind(fts_expression(&terms))
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<QueryMatch> = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                let doc = row_to_document(row);
                QueryMatch {
                    id: doc.id,
                    content: doc.content,
                    metadata: doc.metadata,
                    score: -rank, // bm25 rank is lower-is-better
                }
            })
            .filter(|m| request.filter.matches(&m.content, &m.metadata))
            .collect();
        matches.truncate(request.n_results);
        Ok(matches)
    }

    async fn get_documents(
        &self,
        collection: &str,
        request: &GetRequest,
    ) -> Result<Vec<StoredDocument>> {
        self.require_collection(collection).await?;
        let docs: Vec<StoredDocument> = self
            .all_documents(collection)
            .await?
            .into_iter()
            .filter(|d| {
                request
                    .ids
                    .as_ref()
                    .map_or(true, |ids| ids.iter().any(|id| *id == d.id))
            })
            .filter(|d| request.filter.matches(&d.content, &d.metadata))
            .collect();
        Ok(paginate(docs, request.limit, request.offset))
    }

    async fn modify_collection(
        &self,
        name: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<()> {
        self.require_collection(name).await?;
        let target = new_name.filter(|t| *t != name);
        if let Some(target) = target {
            if self.collection_exists(target).await? {
                bail!("collection already exists: {}", target);
            }
        }
        let mut tx = self.pool.begin().await?;
        if let Some(metadata) = new_metadata {
            sqlx::query("UPDATE collections SET metadata_json = ? WHERE name = ?")
                .bind(serde_json::to_string(&metadata)?)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(target) = target {
            for sql in [
                "UPDATE collections SET name = ? WHERE name = ?",
                "UPDATE documents SET collection = ? WHERE collection = ?",
                "UPDATE documents_fts SET collection = ? WHERE collection = ?",
            ] {
                sqlx::query(sql)
                    .bind(target)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.require_collection(name).await?;
        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM documents_fts WHERE collection = ?",
            "DELETE FROM documents WHERE collection = ?",
            "DELETE FROM collections WHERE name = ?",
        ] {
            sqlx::query(sql).bind(name).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fork_collection(
        &self,
        name: &str,
        new_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.require_collection(name).await?;
        if name == new_name {
            bail!("cannot fork collection '{}' onto itself", name);
        }
        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM documents_fts WHERE collection = ?",
            "DELETE FROM documents WHERE collection = ?",
            "DELETE FROM collections WHERE name = ?",
        ] {
            sqlx::query(sql).bind(new_name).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO collections (name, metadata_json) VALUES (?, ?)")
            .bind(new_name)
            .bind(serde_json::to_string(&metadata.unwrap_or_default())?)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, content, metadata_json)
            SELECT ?, id, content, metadata_json FROM documents WHERE collection = ?
            "#,
        )
        .bind(new_name)
        .bind(name)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO documents_fts (collection, doc_id, content)
            SELECT ?, id, content FROM documents WHERE collection = ?
            "#,
        )
        .bind(new_name)
        .bind(name)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
