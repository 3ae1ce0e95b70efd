//! Version-control operations used to fetch knowledge packages.
//!
//! [`Vcs`] is the seam the package manager depends on; [`GitCli`] shells
//! out to the `git` binary. Failures carry git's stderr as
//! [`SpecfoldError::Git`].

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::SpecfoldError;

pub trait Vcs: Send + Sync {
    /// Clone `url` into `dest` without blobs and without checking out files.
    fn clone_blobless(&self, url: &str, dest: &Path) -> Result<()>;

    /// Enable non-cone sparse checkout in `repo`.
    fn sparse_checkout_init(&self, repo: &Path) -> Result<()>;

    /// Replace the sparse path list of `repo`.
    fn sparse_checkout_set(&self, repo: &Path, paths: &[&str]) -> Result<()>;

    fn checkout(&self, repo: &Path, reference: &str) -> Result<()>;

    /// Fetch `reference` from `origin`.
    fn fetch(&self, repo: &Path, reference: &str) -> Result<()>;
}

/// [`Vcs`] backed by the `git` command-line tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn run(&self, subcommand: &str, repo: Option<&Path>, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args);
        debug!(?args, "running git");

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute 'git {}'", subcommand))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpecfoldError::Git {
                command: subcommand.to_string(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Vcs for GitCli {
    fn clone_blobless(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        self.run(
            "clone",
            None,
            &["clone", "--filter=blob:none", "--no-checkout", url, &dest],
        )
    }

    fn sparse_checkout_init(&self, repo: &Path) -> Result<()> {
        self.run(
            "sparse-checkout init",
            Some(repo),
            &["sparse-checkout", "init", "--no-cone"],
        )
    }

    fn sparse_checkout_set(&self, repo: &Path, paths: &[&str]) -> Result<()> {
        let mut args = vec!["sparse-checkout", "set"];
        args.extend_from_slice(paths);
        self.run("sparse-checkout set", Some(repo), &args)
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        self.run("checkout", Some(repo), &["checkout", reference])
    }

    fn fetch(&self, repo: &Path, reference: &str) -> Result<()> {
        self.run("fetch", Some(repo), &["fetch", "origin", reference])
    }
}
