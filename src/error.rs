//! Typed failure conditions.
//!
//! Operations return `anyhow::Result` and attach context as they go; the
//! variants below are the conditions callers may want to tell apart, and
//! can be recovered with `err.downcast_ref::<SpecfoldError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecfoldError {
    #[error("context store not initialized at {0}: run 'specfold init'")]
    NotInitialized(PathBuf),

    #[error("configuration file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("not a context file: {0} (must be in a context directory with a matching extension)")]
    NotContextFile(String),

    #[error("invalid context directory: {dir} (valid: {valid})")]
    InvalidDirectory { dir: String, valid: String },

    #[error("unknown type '{kind}' (valid: {valid})")]
    UnknownType { kind: String, valid: String },

    #[error("unsupported knowledge source: {0} (use github:owner/repo or a git URL)")]
    UnsupportedSource(String),

    #[error("knowledge package not found: {0}")]
    PackageNotFound(String),

    #[error("knowledge package directory missing: {0}")]
    PackageDirMissing(PathBuf),

    #[error("unknown AI integration '{id}' (known: {known})")]
    UnknownIntegration { id: String, known: String },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_error_carries_stderr() {
        let err = SpecfoldError::Git {
            command: "clone".into(),
            stderr: "repository not found".into(),
        };
        assert_eq!(err.to_string(), "git clone failed: repository not found");
    }

    #[test]
    fn typed_error_survives_anyhow_context() {
        use anyhow::Context;
        let result: anyhow::Result<()> =
            Err(SpecfoldError::PackageNotFound("commons".into())).context("removing package");
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SpecfoldError>(),
            Some(SpecfoldError::PackageNotFound(name)) if name == "commons"
        ));
    }
}
