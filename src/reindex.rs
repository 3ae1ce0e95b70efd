//! Reindex engine.
//!
//! Per file: classify, compare fingerprints, then add or update the
//! document and record the new fingerprint. The fingerprint is written
//! only after the store write succeeds, so a failed write is retried on
//! the next run instead of being reported as unchanged.
//!
//! Batches isolate failures: one unreadable file is counted and logged and
//! the rest of the batch still runs.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use specfold_core::classify::{self, required_collections};
use specfold_core::models::{file_metadata, DocumentUpdate, NewDocument};
use specfold_core::store::DocumentStore;
use tracing::{debug, warn};

use crate::enumerate::{self, ReindexScope};
use crate::error::SpecfoldError;
use crate::fingerprint::{FingerprintStore, JsonFingerprintStore};
use crate::progress::{ProgressMode, ReindexEvent, ReindexProgress};
use crate::project::Project;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    Added,
    Updated,
    Skipped,
}

impl ReindexOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexOutcome::Added => "added",
            ReindexOutcome::Updated => "updated",
            ReindexOutcome::Skipped => "skipped",
        }
    }
}

/// Aggregate counts for a batch, plus the message of each failed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failures: Vec<(String, String)>,
}

impl ReindexStats {
    fn record(&mut self, outcome: ReindexOutcome) {
        match outcome {
            ReindexOutcome::Added => self.added += 1,
            ReindexOutcome::Updated => self.updated += 1,
            ReindexOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Files that were written to the store.
    pub fn indexed(&self) -> usize {
        self.added + self.updated
    }
}

/// What a real run would do with a file, without doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunStatus {
    New,
    Changed,
    Unchanged,
    Invalid,
}

impl DryRunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DryRunStatus::New => "New",
            DryRunStatus::Changed => "Changed",
            DryRunStatus::Unchanged => "Unchanged",
            DryRunStatus::Invalid => "Invalid",
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            DryRunStatus::New => "Add",
            DryRunStatus::Changed => "Update",
            DryRunStatus::Unchanged | DryRunStatus::Invalid => "Skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunRow {
    pub id: String,
    pub status: DryRunStatus,
}

/// Drives indexing of project files into a document store.
pub struct Reindexer<'a> {
    project: &'a Project,
    store: &'a dyn DocumentStore,
    fingerprints: &'a dyn FingerprintStore,
}

impl<'a> Reindexer<'a> {
    pub fn new(
        project: &'a Project,
        store: &'a dyn DocumentStore,
        fingerprints: &'a dyn FingerprintStore,
    ) -> Self {
        Self {
            project,
            store,
            fingerprints,
        }
    }

    /// Index one file by logical id.
    pub async fn reindex_file(&self, id: &str) -> Result<ReindexOutcome> {
        let class = classify::classify(id)
            .ok_or_else(|| SpecfoldError::NotContextFile(id.to_string()))?;

        let status = self.fingerprints.has_changed(id, None)?;
        if !status.changed && status.stored_fingerprint.is_some() {
            debug!(file = id, "unchanged");
            return Ok(ReindexOutcome::Skipped);
        }

        let path = self.project.resolve(id);
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let content = String::from_utf8(bytes.clone())
            .with_context(|| format!("{} is not valid UTF-8", id))?;
        let metadata = file_metadata(id, class.doc_type, class.collection);

        let outcome = if self.store.document_exists(class.collection, id).await? {
            self.store
                .update_documents(
                    class.collection,
                    &[DocumentUpdate {
                        id: id.to_string(),
                        content: Some(content),
                        metadata: Some(metadata),
                    }],
                )
                .await?;
            ReindexOutcome::Updated
        } else {
            self.store
                .add_documents(
                    class.collection,
                    &[NewDocument {
                        id: id.to_string(),
                        content,
                        metadata,
                    }],
                )
                .await?;
            ReindexOutcome::Added
        };

        self.fingerprints.update(id, &bytes)?;
        debug!(file = id, collection = class.collection, outcome = outcome.as_str(), "indexed");
        Ok(outcome)
    }

    /// Index every id, counting failures instead of stopping at them.
    pub async fn reindex_many(
        &self,
        ids: &[String],
        progress: &dyn ReindexProgress,
    ) -> ReindexStats {
        let mut stats = ReindexStats::default();
        let total = ids.len() as u64;
        for (i, id) in ids.iter().enumerate() {
            let status = match self.reindex_file(id).await {
                Ok(outcome) => {
                    stats.record(outcome);
                    outcome.as_str()
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(file = %id, error = %message, "reindex failed");
                    stats.errors += 1;
                    stats.failures.push((id.clone(), message));
                    "error"
                }
            };
            progress.report(ReindexEvent::Processed {
                n: i as u64 + 1,
                total,
                id: id.clone(),
                status,
            });
        }
        stats
    }

    /// Classify each id as a real run would, without writing anything.
    pub async fn dry_run(&self, ids: &[String]) -> Vec<DryRunRow> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let status = match classify::collection_for(id) {
                None => DryRunStatus::Invalid,
                Some(collection) => self.dry_run_status(id, collection).await,
            };
            rows.push(DryRunRow {
                id: id.clone(),
                status,
            });
        }
        rows
    }

    async fn dry_run_status(&self, id: &str, collection: &str) -> DryRunStatus {
        let Ok(status) = self.fingerprints.has_changed(id, None) else {
            return DryRunStatus::New;
        };
        if !status.changed && status.stored_fingerprint.is_some() {
            return DryRunStatus::Unchanged;
        }
        match self.store.document_exists(collection, id).await {
            Ok(true) => DryRunStatus::Changed,
            _ => DryRunStatus::New,
        }
    }
}

/// Flags of the `reindex` command.
#[derive(Debug, Clone)]
pub struct ReindexOptions {
    pub scope: ReindexScope,
    pub dry_run: bool,
    pub verbose: bool,
    pub interactive: bool,
}

/// Prints one line per file to stdout for `--verbose`.
struct VerboseProgress;

impl ReindexProgress for VerboseProgress {
    fn report(&self, event: ReindexEvent) {
        if let ReindexEvent::Processed { id, status, .. } = event {
            let marker = match status {
                "added" => "+ Added",
                "updated" => "~ Updated",
                "skipped" => "o Unchanged",
                _ => "x Failed",
            };
            println!("  {} {}", marker, id);
        }
    }
}

pub async fn run_reindex(project: &Project, options: &ReindexOptions) -> Result<()> {
    if !project.store_initialized() {
        return Err(SpecfoldError::NotInitialized(project.store_path()).into());
    }
    let store = SqliteStore::open(&project.store_path()).await?;
    let fingerprints = JsonFingerprintStore::new(project);

    let created = store.ensure_collections(&required_collections()).await?;
    if !created.is_empty() {
        println!("Creating missing collections...");
        for name in &created {
            println!("  created collection '{}'", name);
        }
    }

    let files = enumerate::files_for_scope(project, &options.scope)?;
    if files.is_empty() {
        println!("No files found to reindex.");
        return Ok(());
    }

    let reindexer = Reindexer::new(project, &store, &fingerprints);

    if options.dry_run {
        println!("Dry run: no changes will be written.");
        print_dry_run(&reindexer.dry_run(&files).await);
        return Ok(());
    }

    if options.interactive && !confirm(&files)? {
        println!("Aborted.");
        return Ok(());
    }

    let progress: Box<dyn ReindexProgress> = if options.verbose {
        Box::new(VerboseProgress)
    } else {
        ProgressMode::default_for_tty().reporter()
    };
    progress.report(ReindexEvent::Discovered {
        label: scope_label(&options.scope),
        total: files.len() as u64,
    });
    let stats = reindexer.reindex_many(&files, progress.as_ref()).await;
    store.close().await;

    if options.verbose {
        for (id, message) in &stats.failures {
            println!("  error processing {}: {}", id, message);
        }
    }
    print_summary(&stats);
    Ok(())
}

fn scope_label(scope: &ReindexScope) -> String {
    match scope {
        ReindexScope::File(path) => path.display().to_string(),
        ReindexScope::Type(kind) => format!("type:{}", kind),
        ReindexScope::Directory(dir) => dir.clone(),
        ReindexScope::All => "all".to_string(),
    }
}

fn confirm(files: &[String]) -> Result<bool> {
    println!("Files to reindex: {}", files.len());
    for id in files.iter().take(10) {
        println!("  - {}", id);
    }
    if files.len() > 10 {
        println!("  ... and {} more", files.len() - 10);
    }
    print!("Reindex these files? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn print_dry_run(rows: &[DryRunRow]) {
    let width = rows
        .iter()
        .map(|r| r.id.len())
        .max()
        .unwrap_or(0)
        .max("File".len());
    println!("{:<width$}  {:<9}  Action", "File", "Status", width = width);
    for row in rows {
        println!(
            "{:<width$}  {:<9}  {}",
            row.id,
            row.status.label(),
            row.status.action(),
            width = width
        );
    }
}

pub fn print_summary(stats: &ReindexStats) {
    println!();
    println!("Reindexing summary");
    println!("  Files added:    {}", stats.added);
    println!("  Files updated:  {}", stats.updated);
    println!("  Files skipped:  {}", stats.skipped);
    if stats.errors > 0 {
        println!("  Errors:         {}", stats.errors);
        println!("Reindexing completed with {} error(s).", stats.errors);
    } else {
        println!("Reindexing completed successfully.");
    }
}

/// `changed` command: list files needing reindex and stored ids whose file is gone.
pub fn run_changed(
    project: &Project,
    collection: Option<&str>,
    directories: &[String],
) -> Result<()> {
    let fingerprints = JsonFingerprintStore::new(project);
    let dirs = (!directories.is_empty()).then_some(directories);
    let changed = fingerprints.list_changed(collection, dirs)?;

    println!("Changed or new ({}):", changed.changed_or_new.len());
    for id in &changed.changed_or_new {
        println!("  {}", id);
    }
    println!("Deleted ({}):", changed.deleted.len());
    for id in &changed.deleted {
        println!("  {}", id);
    }
    Ok(())
}
