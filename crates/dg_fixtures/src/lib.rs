//! In-memory test doubles for the KV, VCS, and Loader collaborators (§2,
//! §6), plus small builders for synthetic graphs. Every crate above
//! `dg_kv`/`dg_vcs`/`dg_loader` tests against these fakes instead of a real
//! `sled` store, `git` subprocess, or language toolchain — the same split
//! the source workspace drew between production backends and an
//! in-process fixtures crate.

use async_trait::async_trait;
use dg_api::request::LoaderOptions;
use dg_kv::{Kv, KvError, ScanControl};
use dg_loader::{Loader, LoaderError, Package, PackageType, Remote, Repo, SourceFile};
use dg_vcs::{RemoteRef, VcsClient, VcsError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// In-memory, ordered byte-keyed store backing `Kv`. A `BTreeMap` already
/// iterates in key order, so `scan`/`scan_from` are direct range queries —
/// no separate sort step needed.
#[derive(Default)]
pub struct MemoryKv {
    rows: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kv for MemoryKv {
    fn get(&self, key: &[u8]) -> dg_kv::Result<Option<Vec<u8>>> {
        Ok(self.rows.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> dg_kv::Result<()> {
        self.rows.lock().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> dg_kv::Result<()> {
        self.rows.lock().unwrap().remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> dg_kv::Result<()> {
        let rows = self.rows.lock().unwrap();
        for (k, v) in rows.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            if visit(k, v) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> dg_kv::Result<()> {
        let rows = self.rows.lock().unwrap();
        for (k, v) in rows.range(start.to_vec()..) {
            if visit(k, v) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Stand-in for `KvError::KeyNotFound`, re-exported so downstream fixtures
/// don't need a direct `dg_kv` dependency just to assert on it.
pub use dg_kv::KvError as FixtureKvError;

/// A scripted [`VcsClient`]: `ls_remote` answers are seeded per-URL;
/// anything not seeded returns [`VcsError::NoMatchingHeads`]. Clone/fetch/
/// checkout create an empty scratch directory so an end-to-end `Update`
/// test can run the engine's clone step without a real network or `git`
/// binary, then let a [`FixtureLoader`] supply the packages.
#[derive(Default)]
pub struct FixtureVcs {
    refs: Mutex<BTreeMap<String, Vec<RemoteRef>>>,
    auth_required: Mutex<Vec<String>>,
    fail: Mutex<Vec<String>>,
}

impl FixtureVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refs(self, url: impl Into<String>, refs: Vec<RemoteRef>) -> Self {
        self.refs.lock().unwrap().insert(url.into(), refs);
        self
    }

    pub fn with_auth_required(self, url: impl Into<String>) -> Self {
        self.auth_required.lock().unwrap().push(url.into());
        self
    }

    pub fn with_failure(self, url: impl Into<String>) -> Self {
        self.fail.lock().unwrap().push(url.into());
        self
    }

    /// Replaces a URL's seeded refs in place, for tests that need a
    /// `Check`/`Check` sequence to observe a digest change.
    pub fn set_refs(&self, url: impl Into<String>, refs: Vec<RemoteRef>) {
        self.refs.lock().unwrap().insert(url.into(), refs);
    }
}

#[async_trait]
impl VcsClient for FixtureVcs {
    async fn ls_remote(&self, url: &str, _reference: &str) -> dg_vcs::Result<Vec<RemoteRef>> {
        if self.fail.lock().unwrap().contains(&url.to_string()) {
            return Err(VcsError::CommandFailed {
                command: "ls-remote".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        if self.auth_required.lock().unwrap().contains(&url.to_string()) {
            return Err(VcsError::AuthRequired);
        }
        match self.refs.lock().unwrap().get(url) {
            Some(refs) if !refs.is_empty() => Ok(refs.clone()),
            _ => Err(VcsError::NoMatchingHeads),
        }
    }

    async fn clone_shallow(&self, _url: &str, dest: &Path) -> dg_vcs::Result<()> {
        std::fs::create_dir_all(dest).map_err(|e| VcsError::Spawn(e.to_string()))?;
        Ok(())
    }

    async fn fetch(&self, _dest: &Path, _digest: &str) -> dg_vcs::Result<()> {
        Ok(())
    }

    async fn checkout_detached(&self, _dest: &Path, _digest: &str) -> dg_vcs::Result<()> {
        Ok(())
    }
}

/// A scripted [`Loader`]: always returns the `Repo` records it was built
/// with, regardless of the scratch directory's actual contents.
pub struct FixtureLoader {
    repos: Vec<Repo>,
}

impl FixtureLoader {
    pub fn new(repos: Vec<Repo>) -> Self {
        Self { repos }
    }

    pub fn failing() -> FailingLoader {
        FailingLoader
    }
}

#[async_trait]
impl Loader for FixtureLoader {
    async fn load(&self, _dir: &Path, _opts: &LoaderOptions) -> dg_loader::Result<Vec<Repo>> {
        Ok(self.repos.clone())
    }
}

/// A [`Loader`] that always fails, for exercising `Update`'s partial-result
/// handling when the loader errors after a successful clone.
pub struct FailingLoader;

#[async_trait]
impl Loader for FailingLoader {
    async fn load(&self, _dir: &Path, _opts: &LoaderOptions) -> dg_loader::Result<Vec<Repo>> {
        Err(LoaderError::Io("simulated loader failure".to_string()))
    }
}

/// Builds a minimal synthetic `Repo` with the given import paths wired as a
/// simple chain (`paths[0]` imports `paths[1]`, `paths[1]` imports
/// `paths[2]`, ...), useful for `Update`/`AddAll` integration tests that
/// don't care about realistic source content.
pub fn chain_repo(from: &str, repository_url: &str, import_paths: &[&str]) -> Repo {
    let packages = import_paths
        .iter()
        .enumerate()
        .map(|(i, path)| Package {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            import_path: path.to_string(),
            imports: import_paths.get(i + 1).map(|next| vec![next.to_string()]).unwrap_or_default(),
            package_type: PackageType::Library,
            sources: vec![SourceFile {
                repo_path: format!("{}.go", path.rsplit('/').next().unwrap_or(path)),
                digest: None,
            }],
        })
        .collect();

    Repo {
        from: from.to_string(),
        remotes: vec![Remote {
            name: "origin".to_string(),
            url: repository_url.to_string(),
        }],
        packages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_kv_round_trips_and_scans_in_order() {
        let kv = MemoryKv::new();
        kv.put(b"b", b"2").unwrap();
        kv.put(b"a", b"1").unwrap();

        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"missing").unwrap(), None);

        let mut seen = Vec::new();
        kv.scan(b"", &mut |k, _| {
            seen.push(k.to_vec());
            ScanControl::Continue
        })
        .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn memory_kv_delete_is_idempotent() {
        let kv = MemoryKv::new();
        kv.delete(b"nowhere").unwrap();
        kv.put(b"k", b"v").unwrap();
        kv.delete(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
    }

    #[tokio::test]
    async fn fixture_vcs_returns_seeded_refs() {
        let vcs = FixtureVcs::new().with_refs(
            "https://example.com/r",
            vec![RemoteRef { digest: "deadbeef".into(), name: "refs/heads/master".into() }],
        );
        let refs = vcs.ls_remote("https://example.com/r", "*").await.unwrap();
        assert_eq!(refs[0].digest, "deadbeef");
    }

    #[tokio::test]
    async fn fixture_vcs_unseeded_url_has_no_matching_heads() {
        let vcs = FixtureVcs::new();
        let err = vcs.ls_remote("https://example.com/unknown", "*").await.unwrap_err();
        assert!(matches!(err, VcsError::NoMatchingHeads));
    }

    #[test]
    fn chain_repo_wires_sequential_imports() {
        let repo = chain_repo("fixture", "https://example.com/r", &["a", "b", "c"]);
        assert_eq!(repo.packages.len(), 3);
        assert_eq!(repo.packages[0].imports, vec!["b".to_string()]);
        assert!(repo.packages[2].imports.is_empty());
    }
}
