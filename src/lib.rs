//! # specfold
//!
//! Incremental indexing of a project's context documents (ADRs, business
//! docs, Gherkin features, rules, UI intent) into a collection-oriented
//! document store, plus versioned knowledge packages fetched from git.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌─────────────────┐
//! │ docs/ + .spec│──▶│  Classifier  │──▶│ Reindex engine  │
//! │ fold/knowled │   │  Enumerator  │   │ + fingerprints  │
//! └──────▲───────┘   └─────────────┘   └───────┬─────────┘
//!        │                                     ▼
//! ┌──────┴───────┐                      ┌──────────────┐
//! │ Knowledge    │                      │ SQLite store │◀── MCP (stdio)
//! │ packages/git │                      │ FTS5         │
//! └──────────────┘                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! specfold init --ai claude-desktop
//! specfold reindex --dry-run
//! specfold reindex
//! specfold knowledge add team github:acme/standards
//! specfold mcp
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`project`] | Project root and fixed paths |
//! | [`config`] | `specfold.toml` read/write |
//! | [`enumerate`] | Candidate files per scope |
//! | [`fingerprint`] | Content digests for change detection |
//! | [`reindex`] | Reindex engine and `reindex`/`changed` commands |
//! | [`knowledge`] | Knowledge package manager |
//! | [`integrations`] | AI host integrations and skill linking |
//! | [`git`] | Version-control seam |
//! | [`sqlite_store`] | SQLite document store |
//! | [`mcp`] | MCP stdio server |
//! | [`init`] | `init` and `validate` |
//!
//! Classification tables, the store trait and the in-memory store live in
//! [`specfold_core`], re-exported under its own name.

pub mod config;
pub mod db;
pub mod enumerate;
pub mod error;
pub mod fingerprint;
pub mod git;
pub mod init;
pub mod integrations;
pub mod io;
pub mod knowledge;
pub mod knowledge_cmd;
pub mod mcp;
pub mod migrate;
pub mod progress;
pub mod project;
pub mod reindex;
pub mod sqlite_store;

pub use specfold_core;
pub use error::SpecfoldError;
