//! Graph (§4.2): the package-granularity adjacency store keyed by import
//! path. Rows are bincode-encoded `PackageRow` values in a single ordered
//! KV, one per key, so lexicographic scans over import paths give both
//! prefix-match queries (`List`) and resumable pagination (`Scan`) for
//! free — the same trade the rest of this workspace makes by building on
//! `dg_kv::Kv` instead of inventing a bespoke index.

use dg_kv::{Kv, ScanControl};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("package row not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Kv(#[from] dg_kv::KvError),
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Package classification (§3 `PackageRow.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageType {
    Unknown,
    Stdlib,
    Library,
    Program,
}

impl Default for PackageType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// `{repoRelativePath, contentDigest}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub repo_relative_path: String,
    pub content_digest: Option<String>,
}

/// The internal, bincode-encoded `PackageRow` (§3). Distinct from
/// `dg_api::response::PackageRow`, the JSON wire DTO; the engine converts
/// between the two at the RPC boundary, matching how `dg_repostore` keeps
/// its own `RepoStatus` separate from the wire one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRow {
    pub name: String,
    pub import_path: String,
    pub repository: String,
    pub directs: Vec<String>,
    pub source_files: Vec<SourceFile>,
    pub package_type: PackageType,
    pub ranking: f64,
}

/// One package as handed to `Add`/`AddAll` by the engine, after it has
/// converted the loader's `Package` output. Kept separate from `PackageRow`
/// so callers never have to fill in `repository` or `ranking` themselves —
/// `Add` owns both.
#[derive(Debug, Clone)]
pub struct PackageInput {
    pub name: String,
    pub import_path: String,
    pub directs: Vec<String>,
    /// `None` means "the loader did not report source files this time";
    /// any existing digests on the stored row are preserved (§4.2).
    pub source_files: Option<Vec<SourceFile>>,
    pub package_type: PackageType,
}

pub struct Graph {
    kv: Arc<dyn Kv>,
}

impl Graph {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    fn key(import_path: &str) -> Vec<u8> {
        import_path.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<PackageRow> {
        bincode::deserialize(bytes).map_err(|e| GraphError::Encoding(e.to_string()))
    }

    fn encode(row: &PackageRow) -> Result<Vec<u8>> {
        bincode::serialize(row).map_err(|e| GraphError::Encoding(e.to_string()))
    }

    /// `Add(repo, pkg)` (§4.2): writes one row. Source-file digests from
    /// `pkg.source_files` replace the prior set when present; otherwise any
    /// existing digests are preserved. `repository` is always overwritten.
    pub fn add(&self, repository: &str, pkg: PackageInput) -> Result<()> {
        if pkg.import_path.is_empty() {
            return Err(GraphError::Encoding("import path must not be empty".to_string()));
        }
        let existing = self.kv.get(&Self::key(&pkg.import_path))?;
        let source_files = match pkg.source_files {
            Some(files) => files,
            None => existing
                .as_deref()
                .and_then(|bytes| Self::decode(bytes).ok())
                .map(|row| row.source_files)
                .unwrap_or_default(),
        };

        let row = PackageRow {
            name: pkg.name,
            import_path: pkg.import_path.clone(),
            repository: repository.to_string(),
            directs: dedup_preserve_order(pkg.directs),
            source_files,
            package_type: pkg.package_type,
            ranking: existing
                .as_deref()
                .and_then(|bytes| Self::decode(bytes).ok())
                .map(|row| row.ranking)
                .unwrap_or(0.0),
        };
        self.kv.put(&Self::key(&pkg.import_path), &Self::encode(&row)?)?;
        tracing::debug!(import_path = %pkg.import_path, repository, "graph row added");
        Ok(())
    }

    /// `AddAll(repo)` (§4.2): calls `Add` for every package. Returns the
    /// number of rows written.
    pub fn add_all(&self, repository: &str, packages: Vec<PackageInput>) -> Result<u64> {
        let mut count = 0u64;
        for pkg in packages {
            self.add(repository, pkg)?;
            count += 1;
        }
        Ok(count)
    }

    /// `Row(importPath)` (§4.2).
    pub fn row(&self, import_path: &str) -> Result<PackageRow> {
        let bytes = self
            .kv
            .get(&Self::key(import_path))?
            .ok_or_else(|| GraphError::NotFound(import_path.to_string()))?;
        Self::decode(&bytes)
    }

    /// `Remove(importPath)` (§4.2). Best-effort: removing an absent key is
    /// not an error (§8 boundary behavior).
    pub fn remove(&self, import_path: &str) -> Result<()> {
        self.kv.delete(&Self::key(import_path))?;
        Ok(())
    }

    /// `Scan(startPrefix, visit)` (§4.2): visits rows in lexicographic key
    /// order starting at `start_prefix` (inclusive), across the entire
    /// remaining key space. The visitor decides when to stop — by
    /// returning `ScanControl::Stop` once the keys it cares about have been
    /// left behind (e.g. `Match`'s "stops when the package prefix no
    /// longer matches").
    pub fn scan(
        &self,
        start_prefix: &str,
        mut visit: impl FnMut(&PackageRow) -> ScanControl,
    ) -> Result<()> {
        let mut err = None;
        self.kv.scan_from(start_prefix.as_bytes(), &mut |_key, value| {
            match Self::decode(value) {
                Ok(row) => visit(&row),
                Err(e) => {
                    err = Some(e);
                    ScanControl::Stop
                }
            }
        })?;
        if let Some(e) = err {
            return Err(e);
        }
        Ok(())
    }

    /// `List(prefix, visit)` (§4.2): visits every row whose import path
    /// starts with `prefix`, in lexicographic order.
    pub fn list(&self, prefix: &str, mut visit: impl FnMut(&PackageRow) -> ScanControl) -> Result<()> {
        let mut err = None;
        self.kv.scan(prefix.as_bytes(), &mut |_key, value| match Self::decode(value) {
            Ok(row) => visit(&row),
            Err(e) => {
                err = Some(e);
                ScanControl::Stop
            }
        })?;
        if let Some(e) = err {
            return Err(e);
        }
        Ok(())
    }

    /// `ScanUpdate(prefix, mutate)` (§4.2): rewrites every row under
    /// `prefix` for which `mutate` returns `true`. Collects the matching
    /// rows in a first read-only pass, then writes back in a second pass,
    /// so no write is ever issued while a scan iterator is live (§4.2 "must
    /// not hold a write transaction across the visitor call").
    pub fn scan_update(
        &self,
        prefix: &str,
        mut mutate: impl FnMut(&mut PackageRow) -> bool,
    ) -> Result<u64> {
        let mut rows = Vec::new();
        self.list(prefix, |row| {
            rows.push(row.clone());
            ScanControl::Continue
        })?;

        let mut updated = 0u64;
        for mut row in rows {
            if mutate(&mut row) {
                self.kv.put(&Self::key(&row.import_path), &Self::encode(&row)?)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// `EncodeToQuads(emit)` (§4.2 SUPPLEMENT): maps every row to RDF-shaped
    /// `(subject, predicate, object)` triples and hands them to `emit` in
    /// row-scan order. Producing a serialized RDF document (N-Triples,
    /// Turtle, ...) is the out-of-scope "format converter" from §1 — this
    /// only supplies the triples.
    pub fn encode_to_quads(&self, mut emit: impl FnMut(&str, &str, &str)) -> Result<()> {
        self.list("", |row| {
            for target in &row.directs {
                emit(&row.import_path, "imports", target);
            }
            emit(&row.import_path, "hasRepository", &row.repository);
            emit(&row.import_path, "hasType", package_type_tag(row.package_type));
            let ranking = row.ranking.to_string();
            emit(&row.import_path, "hasRanking", &ranking);
            ScanControl::Continue
        })
    }
}

fn package_type_tag(t: PackageType) -> &'static str {
    match t {
        PackageType::Unknown => "UNKNOWN",
        PackageType::Stdlib => "STDLIB",
        PackageType::Library => "LIBRARY",
        PackageType::Program => "PROGRAM",
    }
}

fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_fixtures::MemoryKv;

    fn pkg(import_path: &str, directs: &[&str]) -> PackageInput {
        PackageInput {
            name: import_path.rsplit('/').next().unwrap_or(import_path).to_string(),
            import_path: import_path.to_string(),
            directs: directs.iter().map(|s| s.to_string()).collect(),
            source_files: Some(vec![]),
            package_type: PackageType::Library,
        }
    }

    #[test]
    fn add_all_sets_repository_and_is_retrievable_by_row() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph
            .add_all(
                "https://github.com/u/repo",
                vec![pkg("github.com/u/repo/a", &["github.com/u/repo/b"]), pkg("github.com/u/repo/b", &[])],
            )
            .unwrap();

        let row = graph.row("github.com/u/repo/a").unwrap();
        assert_eq!(row.repository, "https://github.com/u/repo");
        assert_eq!(row.directs, vec!["github.com/u/repo/b".to_string()]);
    }

    #[test]
    fn add_dedups_direct_imports() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.add("https://x/r", pkg("x/r/a", &["x/r/b", "x/r/b", "x/r/c"])).unwrap();
        let row = graph.row("x/r/a").unwrap();
        assert_eq!(row.directs, vec!["x/r/b".to_string(), "x/r/c".to_string()]);
    }

    #[test]
    fn add_preserves_source_files_when_not_provided() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        let mut first = pkg("x/r/a", &[]);
        first.source_files = Some(vec![SourceFile {
            repo_relative_path: "a.go".to_string(),
            content_digest: Some("deadbeef".to_string()),
        }]);
        graph.add("https://x/r", first).unwrap();

        let mut second = pkg("x/r/a", &["x/r/b"]);
        second.source_files = None;
        graph.add("https://x/r", second).unwrap();

        let row = graph.row("x/r/a").unwrap();
        assert_eq!(row.source_files.len(), 1);
        assert_eq!(row.directs, vec!["x/r/b".to_string()]);
    }

    #[test]
    fn remove_of_absent_key_is_not_an_error() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.remove("nowhere").unwrap();
    }

    #[test]
    fn removing_every_added_package_leaves_the_graph_empty() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        let import_paths = ["x/r/a", "x/r/b", "x/r/c"];
        graph
            .add_all("https://x/r", vec![pkg("x/r/a", &["x/r/b"]), pkg("x/r/b", &["x/r/c"]), pkg("x/r/c", &[])])
            .unwrap();

        for path in import_paths {
            graph.remove(path).unwrap();
        }

        let mut remaining = 0;
        graph
            .scan("", |_row| {
                remaining += 1;
                ScanControl::Continue
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn list_is_prefix_bounded() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.add_all("r", vec![pkg("a/x", &[]), pkg("a/y", &[]), pkg("b/z", &[])]).unwrap();

        let mut seen = Vec::new();
        graph
            .list("a/", |row| {
                seen.push(row.import_path.clone());
                ScanControl::Continue
            })
            .unwrap();
        assert_eq!(seen, vec!["a/x".to_string(), "a/y".to_string()]);
    }

    #[test]
    fn scan_starts_inclusive_and_crosses_prefixes() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.add_all("r", vec![pkg("a/x", &[]), pkg("a/y", &[]), pkg("b/z", &[])]).unwrap();

        let mut seen = Vec::new();
        graph
            .scan("a/y", |row| {
                seen.push(row.import_path.clone());
                ScanControl::Continue
            })
            .unwrap();
        assert_eq!(seen, vec!["a/y".to_string(), "b/z".to_string()]);
    }

    #[test]
    fn scan_update_rewrites_only_rows_the_mutator_accepts() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.add_all("r", vec![pkg("a/x", &[]), pkg("a/y", &[])]).unwrap();

        let updated = graph
            .scan_update("", |row| {
                if row.import_path == "a/x" {
                    row.ranking = 42.0;
                    true
                } else {
                    false
                }
            })
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(graph.row("a/x").unwrap().ranking, 42.0);
        assert_eq!(graph.row("a/y").unwrap().ranking, 0.0);
    }

    #[test]
    fn encode_to_quads_emits_imports_and_metadata() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        graph.add("r", pkg("a/x", &["a/y"])).unwrap();

        let mut quads = Vec::new();
        graph
            .encode_to_quads(|s, p, o| quads.push((s.to_string(), p.to_string(), o.to_string())))
            .unwrap();

        assert!(quads.contains(&("a/x".to_string(), "imports".to_string(), "a/y".to_string())));
        assert!(quads.iter().any(|(_, p, _)| p == "hasRepository"));
    }
}
