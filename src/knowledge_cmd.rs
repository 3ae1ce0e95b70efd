//! `knowledge` subcommands: wiring of [`KnowledgeManager`] to the real
//! git binary, the project's store, and stdout reports.

use anyhow::Result;
use specfold_core::store::DocumentStore;

use crate::fingerprint::JsonFingerprintStore;
use crate::git::GitCli;
use crate::integrations::IntegrationRegistry;
use crate::knowledge::{KnowledgeManager, PackageStatus};
use crate::project::Project;
use crate::reindex::print_summary;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone)]
pub enum KnowledgeAction {
    List,
    Add {
        name: String,
        source: String,
        version: String,
    },
    Remove {
        name: String,
    },
    Update {
        name: String,
        version: Option<String>,
    },
    Show {
        name: String,
    },
    Install {
        force: bool,
    },
}

pub async fn run_knowledge(project: &Project, action: KnowledgeAction) -> Result<()> {
    let store = if project.store_initialized() {
        Some(SqliteStore::open(&project.store_path()).await?)
    } else {
        None
    };
    let fingerprints = JsonFingerprintStore::new(project);
    let integrations = IntegrationRegistry::builtin();
    let vcs = GitCli;
    let manager = KnowledgeManager::new(
        project,
        &vcs,
        store.as_ref().map(|s| s as &dyn DocumentStore),
        &fingerprints,
        &integrations,
    );

    let result = execute(&manager, store.is_some(), action).await;
    if let Some(store) = &store {
        store.close().await;
    }
    result
}

async fn execute(
    manager: &KnowledgeManager<'_>,
    indexed: bool,
    action: KnowledgeAction,
) -> Result<()> {
    match action {
        KnowledgeAction::List => {
            let packages = manager.list()?;
            if packages.is_empty() {
                println!("No knowledge packages declared.");
                return Ok(());
            }
            println!("{:<20} {:<40} {:<12} STATUS", "NAME", "SOURCE", "VERSION");
            for pkg in &packages {
                let status = if pkg.installed { "installed" } else { "missing" };
                println!(
                    "{:<20} {:<40} {:<12} {}",
                    pkg.entry.name, pkg.entry.source, pkg.entry.version, status
                );
            }
        }
        KnowledgeAction::Add {
            name,
            source,
            version,
        } => {
            let stats = manager.add(&name, &source, &version).await?;
            println!("Added knowledge package '{}' ({} @ {})", name, source, version);
            report_indexing(indexed, &stats);
        }
        KnowledgeAction::Update { name, version } => {
            let stats = manager.update(&name, version.as_deref()).await?;
            println!("Updated knowledge package '{}'", name);
            report_indexing(indexed, &stats);
        }
        KnowledgeAction::Remove { name } => {
            let report = manager.remove(&name).await?;
            println!("Removed knowledge package '{}'", name);
            println!("  documents deleted:   {}", report.documents);
            println!("  fingerprints purged: {}", report.fingerprints);
        }
        KnowledgeAction::Show { name } => {
            print_status(&manager.show(&name)?);
        }
        KnowledgeAction::Install { force } => {
            let report = manager.install_all(force).await?;
            for name in &report.installed {
                println!("  ok   {}", name);
            }
            for (name, message) in &report.failed {
                println!("  FAIL {}: {}", name, message);
            }
            println!(
                "Installed {} package(s), {} failed.",
                report.installed.len(),
                report.failed.len()
            );
        }
    }
    Ok(())
}

fn report_indexing(indexed: bool, stats: &crate::reindex::ReindexStats) {
    if indexed {
        print_summary(stats);
    } else {
        println!("Context store not initialized; run `specfold init` then `specfold reindex` to index it.");
    }
}

fn print_status(pkg: &PackageStatus) {
    println!("Name:    {}", pkg.entry.name);
    println!("Source:  {}", pkg.entry.source);
    println!("Version: {}", pkg.entry.version);
    println!("Path:    {}", pkg.path);
    if pkg.installed {
        println!("Status:  installed");
        println!("Files:   {}", pkg.file_count.unwrap_or(0));
    } else {
        println!("Status:  not installed");
    }
}
