//! `init` and `validate`: project layout, config and store bootstrap.

use anyhow::{bail, Result};
use specfold_core::classify::required_collections;
use specfold_core::store::DocumentStore;
use tracing::info;

use crate::config::ProjectConfig;
use crate::error::SpecfoldError;
use crate::integrations::IntegrationRegistry;
use crate::project::{Project, CONFIG_FILE, REQUIRED_DIRS};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub created_dirs: Vec<String>,
    pub config_created: bool,
    pub created_collections: Vec<String>,
}

/// Create directories, config and store. Re-running only fills in what is missing.
pub async fn init_project(
    project: &Project,
    ai_tool: Option<&str>,
    integrations: &IntegrationRegistry,
) -> Result<InitReport> {
    if let Some(id) = ai_tool {
        integrations.require(id)?;
    }

    let mut report = InitReport::default();
    for dir in REQUIRED_DIRS {
        let path = project.root().join(dir);
        if !path.is_dir() {
            std::fs::create_dir_all(&path)?;
            report.created_dirs.push(dir.to_string());
        }
    }

    let config_path = project.config_path();
    let mut config = if config_path.is_file() {
        ProjectConfig::load_from(&config_path)?
    } else {
        report.config_created = true;
        ProjectConfig::empty(&config_path)
    };
    if let Some(id) = ai_tool {
        config.set_ai_tool(id);
    }
    if report.config_created || ai_tool.is_some() {
        config.save()?;
    }

    let store = SqliteStore::open(&project.store_path()).await?;
    report.created_collections = store.ensure_collections(&required_collections()).await?;
    store.close().await;

    info!(root = %project.root().display(), "project initialized");
    Ok(report)
}

pub async fn run_init(project: &Project, ai_tool: Option<&str>) -> Result<()> {
    let integrations = IntegrationRegistry::builtin();
    let report = init_project(project, ai_tool, &integrations).await?;

    for dir in &report.created_dirs {
        println!("  created {}/", dir);
    }
    if report.config_created {
        println!("  created {}", CONFIG_FILE);
    }
    for name in &report.created_collections {
        println!("  created collection '{}'", name);
    }
    if let Some(id) = ai_tool {
        println!("  ai_tool set to '{}'", id);
    }
    println!("Project initialized at {}", project.root().display());
    Ok(())
}

/// One line of validation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn pass(&mut self, message: String) {
        self.checks.push(Check { ok: true, message });
    }

    fn fail(&mut self, message: String, error: String) {
        self.checks.push(Check { ok: false, message });
        self.errors.push(error);
    }

    fn warn(&mut self, message: String) {
        self.checks.push(Check {
            ok: false,
            message: message.clone(),
        });
        self.warnings.push(message);
    }
}

/// Check layout, store and config. Never mutates the project.
pub async fn validate_project(
    project: &Project,
    integrations: &IntegrationRegistry,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    for dir in REQUIRED_DIRS {
        if project.root().join(dir).is_dir() {
            report.pass(format!("{}/", dir));
        } else {
            report.fail(
                format!("{}/ (missing)", dir),
                format!("Missing directory: {}", dir),
            );
        }
    }

    if project.store_initialized() {
        report.pass("context store exists".to_string());
        let store = SqliteStore::open(&project.store_path()).await?;
        let existing = store.list_collections(None, None).await?;
        for name in required_collections() {
            if existing.iter().any(|c| c == name) {
                report.pass(format!("collection '{}'", name));
            } else {
                report.fail(
                    format!("collection '{}' (missing)", name),
                    format!("Missing collection: {}", name),
                );
            }
        }
        store.close().await;
    } else {
        report.fail(
            "context store (missing)".to_string(),
            "Context store not found".to_string(),
        );
    }

    match ProjectConfig::load(project) {
        Ok(config) => {
            report.pass(format!("{} exists", CONFIG_FILE));
            if let Some(id) = config.ai_tool() {
                match integrations.get(id) {
                    Some(_) => report.pass(format!("ai_tool '{}'", id)),
                    None => report.warn(format!("Unknown ai_tool in config: '{}'", id)),
                }
            }
        }
        Err(e) => match e.downcast_ref::<SpecfoldError>() {
            Some(SpecfoldError::MissingConfig(_)) => {
                report.warn(format!("{} not found", CONFIG_FILE))
            }
            _ => report.fail(format!("{} (invalid)", CONFIG_FILE), format!("{:#}", e)),
        },
    }

    Ok(report)
}

pub async fn run_validate(project: &Project) -> Result<()> {
    let integrations = IntegrationRegistry::builtin();
    let report = validate_project(project, &integrations).await?;

    for check in &report.checks {
        let mark = if check.ok { "ok" } else { "!!" };
        println!("  [{}] {}", mark, check.message);
    }
    println!();
    if !report.errors.is_empty() {
        for error in &report.errors {
            println!("  - {}", error);
        }
        bail!(
            "validation failed: {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
    }
    println!(
        "Validation passed with {} warning(s).",
        report.warnings.len()
    );
    Ok(())
}
