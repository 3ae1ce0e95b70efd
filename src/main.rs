//! # specfold CLI
//!
//! Indexes a project's context documents into a local store and manages
//! knowledge packages.
//!
//! ## Usage
//!
//! ```bash
//! specfold --project ./my-app <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `specfold init [--ai <id>]` | Create directories, config and the context store |
//! | `specfold validate` | Check project layout, store and config |
//! | `specfold changed` | List files needing reindex and deleted files |
//! | `specfold reindex [FILE]` | Index new or changed context files |
//! | `specfold knowledge <cmd>` | Manage knowledge packages (list, add, remove, update, show, install) |
//! | `specfold mcp` | Serve the context store over MCP on stdio |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what would be indexed under docs/rules
//! specfold reindex --directory docs/rules --dry-run
//!
//! # Reindex one file
//! specfold reindex docs/adrs/0001-use-sqlite.md
//!
//! # Pin a knowledge package to a tag
//! specfold knowledge update team --version v2.1.0
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use specfold::enumerate::ReindexScope;
use specfold::knowledge_cmd::{run_knowledge, KnowledgeAction};
use specfold::project::Project;
use specfold::reindex::{run_changed, run_reindex, ReindexOptions};
use specfold::{init, mcp};

/// specfold: incremental context indexing for AI-assisted projects.
#[derive(Parser)]
#[command(
    name = "specfold",
    about = "Incremental context indexing and knowledge packages for AI-assisted projects",
    version,
    long_about = "specfold classifies a project's ADRs, business docs, features, rules and UI \
    intent into collections, keeps a local store in sync using content fingerprints, and \
    fetches versioned knowledge packages from git."
)]
struct Cli {
    /// Project root. Defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the project layout and context store.
    ///
    /// Safe to run again; only missing pieces are created.
    Init {
        /// AI host integration to record in specfold.toml (cursor, claude-desktop).
        #[arg(long)]
        ai: Option<String>,
    },

    /// Validate the project structure.
    Validate,

    /// List context files that changed since they were last indexed.
    Changed {
        /// Only consider files of this collection.
        #[arg(long)]
        collection: Option<String>,

        /// Only consider files under these directories (repeatable).
        #[arg(long = "directory")]
        directories: Vec<String>,
    },

    /// Index new or changed context files.
    ///
    /// Scope precedence: FILE, then --type, then --directory, then everything.
    Reindex {
        /// A single context file to reindex.
        file: Option<PathBuf>,

        /// Type filter: rules, feature, md, yaml.
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Directory to reindex (a context directory or a knowledge package path).
        #[arg(long)]
        directory: Option<String>,

        /// Show what would be indexed without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print one line per processed file.
        #[arg(long)]
        verbose: bool,

        /// Ask for confirmation before indexing.
        #[arg(long)]
        interactive: bool,
    },

    /// Manage knowledge packages.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCommand,
    },

    /// Serve the context store over MCP on stdin/stdout.
    Mcp,
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    /// List declared packages and whether they are installed.
    List,

    /// Fetch a package, register it and index its documents.
    Add {
        name: String,
        /// `github:owner/repo`, `owner/repo`, an https URL or a git@ URL.
        source: String,
        /// Branch, tag or commit.
        #[arg(default_value = "main")]
        version: String,
    },

    /// Remove a package with its indexed documents and fingerprints.
    Remove { name: String },

    /// Fetch and check out a package's version again, then reindex it.
    Update {
        name: String,
        /// New version to pin; defaults to the registered one.
        #[arg(long)]
        version: Option<String>,
    },

    /// Show a package's details.
    Show { name: String },

    /// Install every package declared in specfold.toml.
    Install {
        /// Remove and fetch every package from scratch.
        #[arg(long)]
        force: bool,
    },
}

impl From<KnowledgeCommand> for KnowledgeAction {
    fn from(cmd: KnowledgeCommand) -> Self {
        match cmd {
            KnowledgeCommand::List => KnowledgeAction::List,
            KnowledgeCommand::Add {
                name,
                source,
                version,
            } => KnowledgeAction::Add {
                name,
                source,
                version,
            },
            KnowledgeCommand::Remove { name } => KnowledgeAction::Remove { name },
            KnowledgeCommand::Update { name, version } => KnowledgeAction::Update { name, version },
            KnowledgeCommand::Show { name } => KnowledgeAction::Show { name },
            KnowledgeCommand::Install { force } => KnowledgeAction::Install { force },
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let project = Project::new(cli.project);

    match cli.command {
        Commands::Init { ai } => {
            init::run_init(&project, ai.as_deref()).await?;
        }
        Commands::Validate => {
            init::run_validate(&project).await?;
        }
        Commands::Changed {
            collection,
            directories,
        } => {
            run_changed(&project, collection.as_deref(), &directories)?;
        }
        Commands::Reindex {
            file,
            doc_type,
            directory,
            dry_run,
            verbose,
            interactive,
        } => {
            let options = ReindexOptions {
                scope: ReindexScope::from_flags(file, doc_type, directory),
                dry_run,
                verbose,
                interactive,
            };
            run_reindex(&project, &options).await?;
        }
        Commands::Knowledge { action } => {
            run_knowledge(&project, action.into()).await?;
        }
        Commands::Mcp => {
            mcp::run_stdio(project).await?;
        }
    }

    Ok(())
}
