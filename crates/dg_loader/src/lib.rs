//! Loader collaborator contract (§6) — language-specific package discovery
//! inside a cloned tree. The engine treats this as a black box: hand it a
//! directory and options, get back zero or more [`Repo`] records.

pub mod reference;
pub mod stub;

use async_trait::async_trait;
use dg_api::request::LoaderOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use reference::ReferenceLoader;
pub use stub::StubLoader;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("loader not implemented")]
    NotImplemented,
    #[error("failed to read source tree: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// A named remote of the repo the loader scanned (`{name, url}`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

/// `{repoPath, digest}` — one source file backing a package (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub repo_path: String,
    pub digest: Option<String>,
}

/// Package classification (§3 `PackageRow.type`); mirrors
/// `dg_api::response::PackageType` but is the loader's own contract type so
/// this crate does not need to carry RPC wire concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageType {
    Unknown,
    Stdlib,
    Library,
    Program,
}

/// One discovered package (§6 "Loader collaborator contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub import_path: String,
    pub imports: Vec<String>,
    pub package_type: PackageType,
    pub sources: Vec<SourceFile>,
}

/// `{from, remotes, packages}` — one loader result, usually one per cloned
/// directory, but a single clone can legitimately yield more than one
/// (e.g. a monorepo with independently-rooted modules).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub from: String,
    pub remotes: Vec<Remote>,
    pub packages: Vec<Package>,
}

/// Language-specific package discovery, invoked by the engine after a
/// repository has been cloned to a scratch directory (§4.3 step 5c).
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, dir: &Path, opts: &LoaderOptions) -> Result<Vec<Repo>>;
}
