//! # specfold core
//!
//! Pure logic shared by the `specfold` CLI and library: the collection
//! tables, the path classifier, the document-store abstraction with an
//! in-memory backend, and the content digest used for change detection.
//!
//! This crate performs no filesystem or process I/O. Everything that touches
//! the project tree, git, or SQLite lives in the `specfold` crate.

pub mod classify;
pub mod digest;
pub mod models;
pub mod store;

pub use classify::{classify, collection_for, type_for, Classification};
pub use digest::compute_fingerprint;
