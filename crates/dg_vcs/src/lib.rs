//! VCS collaborator contract (§6) and a `git`-CLI-backed implementation.
//!
//! The engine never shells out to `git` directly; every clone/fetch/
//! ls-remote call goes through the [`VcsClient`] trait so tests can swap in
//! `dg_fixtures`'s in-memory fake.

pub mod cli;

use async_trait::async_trait;
use std::path::Path;

pub use cli::CliVcs;

/// Error surfaced by a VCS operation. All variants map onto the §7
/// "transient I/O" error kind except [`VcsError::AuthRequired`], which the
/// caller treats specially (`Resolve`'s existence probe and `RepoStore`
/// both care whether the remote "exists, but requires auth").
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to execute git: {0}")]
    Spawn(String),
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("no matching remote heads")]
    NoMatchingHeads,
    #[error("repository requires authentication")]
    AuthRequired,
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// One line of `git ls-remote` output: a commit digest and the ref it
/// names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Lowercase hex-encoded 40-character SHA-1.
    pub digest: String,
    /// e.g. `refs/heads/master`, `refs/tags/v1.0.0`, `HEAD`.
    pub name: String,
}

/// The narrow VCS surface the engine needs: enumerate remote heads, and
/// clone/fetch/checkout a specific commit into a scratch directory (§6
/// "VCS collaborator contract").
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// `git ls-remote -q <url> <reference>`. `reference` is a glob pattern
    /// (`*` matches everything) or an exact ref name.
    async fn ls_remote(&self, url: &str, reference: &str) -> Result<Vec<RemoteRef>>;

    /// `git clone --no-checkout --depth=1 <url> <dest>`.
    async fn clone_shallow(&self, url: &str, dest: &Path) -> Result<()>;

    /// `git fetch origin <digest>`, run inside `dest`.
    async fn fetch(&self, dest: &Path, digest: &str) -> Result<()>;

    /// `git checkout --detach <digest>`, run inside `dest`.
    async fn checkout_detached(&self, dest: &Path, digest: &str) -> Result<()>;

    /// Probe whether `url` names a repository that actually exists,
    /// distinguishing "doesn't exist" from "exists, requires auth" (used by
    /// `Resolve`'s github.com/bitbucket.org short-circuit, §4.6).
    async fn exists(&self, url: &str) -> Result<bool> {
        match self.ls_remote(url, "HEAD").await {
            Ok(_) => Ok(true),
            Err(VcsError::AuthRequired) => Ok(true),
            Err(VcsError::NoMatchingHeads) => Ok(false),
            Err(other) => Err(other),
        }
    }
}
