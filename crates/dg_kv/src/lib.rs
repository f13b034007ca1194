//! Ordered byte-keyed KV store contract (§2, §6) and a `sled`-backed
//! implementation.
//!
//! This crate treats the embedded store as a narrow external collaborator:
//! `Get`/`Put`/`Delete` by key, and an ordered `Scan(prefix, visit)` that a
//! visitor can terminate early by returning [`ScanControl::Stop`] (the
//! spec's `StopScan` sentinel). Everything above this crate (`dg_repostore`,
//! `dg_graph`) is written against the [`Kv`] trait, never against `sled`
//! directly, so an alternate ordered store can be dropped in without
//! touching a single call site.

use std::path::Path;
use std::sync::Arc;

/// Error surfaced by a KV operation.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The distinguished "key not found" signal (§2).
    #[error("key not found")]
    KeyNotFound,
    /// Any other storage-engine failure (corruption, I/O, ...).
    #[error("kv backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, KvError>;

/// What a [`Kv::scan`] visitor returns after each row: keep going, or stop
/// the scan early without that being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// Ordered byte-keyed map. Implementations must guarantee safe concurrent
/// readers and at least serialized writers (§5 "Shared resources").
pub trait Kv: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit every `(key, value)` pair whose key starts with `prefix`, in
    /// lexicographic ascending order, until the visitor returns
    /// [`ScanControl::Stop`] or the prefix is exhausted.
    fn scan(&self, prefix: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> Result<()>;

    /// Visit every `(key, value)` pair with key `>= start`, in lexicographic
    /// ascending order, across the *entire* remaining key space (unlike
    /// [`Kv::scan`], not bounded to a shared prefix), until the visitor
    /// returns [`ScanControl::Stop`] or the store is exhausted. This backs
    /// `Graph::Scan`'s "starting at startPrefix (inclusive)" pagination,
    /// where the caller's visitor — not the store — decides when the scan
    /// has left the range it cares about.
    fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> Result<()>;

    /// Convenience wrapper over [`Kv::get`] that turns a missing key into
    /// [`KvError::KeyNotFound`] instead of `Ok(None)`.
    fn get_required(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.get(key)?.ok_or(KvError::KeyNotFound)
    }
}

/// `sled`-backed [`Kv`] implementation. Two independent `sled::Db` instances
/// back RepoStore and Graph per the "two separate KV directories" layout
/// note (§6).
#[derive(Clone)]
pub struct SledKv {
    db: Arc<sled::Db>,
}

impl SledKv {
    /// Open (creating if absent) a read-write store at `path`.
    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing store at `path` without acquiring the write lock
    /// `sled` normally takes, for tooling that only reads (e.g. a snapshot
    /// copier run alongside a live server).
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .read_only(true)
            .open()
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl Kv for SledKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        tracing::trace!(key = %String::from_utf8_lossy(key), "kv get");
        Ok(self
            .db
            .get(key)
            .map_err(|e| KvError::Backend(e.to_string()))?
            .map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        tracing::trace!(key = %String::from_utf8_lossy(key), bytes = value.len(), "kv put");
        self.db
            .insert(key, value)
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db
            .remove(key)
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    fn scan(&self, prefix: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> Result<()> {
        for entry in self.db.scan_prefix(prefix) {
            let (k, v) = entry.map_err(|e| KvError::Backend(e.to_string()))?;
            if visit(&k, &v) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn scan_from(&self, start: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> ScanControl) -> Result<()> {
        for entry in self.db.range(start.to_vec()..) {
            let (k, v) = entry.map_err(|e| KvError::Backend(e.to_string()))?;
            if visit(&k, &v) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }
}
