//! Response DTOs for the depgraph RPC contract (§6).

use crate::bounds::Cursor;
use serde::{Deserialize, Serialize};

/// Top-level response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(flatten)]
    pub result: Result<ResponsePayload, crate::Error>,
}

/// Response payload variants, one per request variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "result")]
pub enum ResponsePayload {
    Update(UpdateResult),
    Scan(ScanResult),
    Rank(RankResult),
    Remove(RemoveResult),
    Match(MatchResult),
    Reverse(ReverseResult),
    Resolve(ResolveResult),
    RepoStatus(RepoStatusResult),
}

/// Package classification (§3 `PackageRow.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
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
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub repo_relative_path: String,
    pub content_digest: Option<String>,
}

/// Wire form of `PackageRow` (§3). Hex-encoded digests; the engine-internal
/// `dg_graph::PackageRow` is a separate bincode-encoded type converted
/// to/from this one at the RPC boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRow {
    pub name: String,
    pub import_path: String,
    pub repository: String,
    pub directs: Vec<String>,
    #[serde(default)]
    pub source_files: Vec<SourceFile>,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub ranking: f64,
}

/// A single entry of `RepoStatus.updates` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntry {
    /// Unix timestamp (seconds).
    pub when: i64,
    /// Hex-encoded SHA-1 digest superseded at `when`.
    pub digest: String,
}

/// Wire form of `RepoStatus` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStatus {
    pub repository: String,
    pub ref_name: String,
    /// Hex-encoded SHA-1, absent if never successfully checked.
    pub digest: Option<String>,
    pub error_count: u32,
    pub prefix: Option<String>,
    pub tag: Option<String>,
    /// Unix timestamp (seconds) of the last check, absent if never checked.
    pub last_check: Option<i64>,
    pub updates: Vec<UpdateEntry>,
}

/// `Update` result (§4.3 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub repository: String,
    pub needs_update: bool,
    pub reference: Option<String>,
    pub digest: Option<String>,
    pub num_packages: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    pub removed: bool,
}

/// `Scan` result tallies (§4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub scanned: u64,
    pub deduplicated: u64,
    pub sampled: u64,
    pub updated: u64,
    pub packages_updated: u64,
    pub elapsed_ms: u64,
}

/// `Rank` result (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankResult {
    pub num_rows: u64,
    pub updated: bool,
}

/// `Remove` result (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveResult {
    pub packages_removed: u64,
    pub repos_removed: u64,
}

/// `Match` result page (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default)]
    pub rows: Vec<PackageRow>,
    /// Key of the first row that did not fit in this page; `None` once the
    /// scan is exhausted.
    pub next_page: Option<Cursor>,
    pub count: u64,
}

/// A single reverse-dependency hit: `source` imports `target` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseDep {
    pub source: String,
    pub target: String,
}

/// `Reverse` result page (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseResult {
    pub deps: Vec<ReverseDep>,
    pub next_page: Option<Cursor>,
    pub count: u64,
}

/// `Resolve` result (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResult {
    pub repository: String,
    pub prefix: String,
    pub import_path: String,
}

/// `RepoStatus` result: every stored record matching the canonical URL,
/// including any `@@reference`-tagged heads (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoStatusResult {
    pub statuses: Vec<RepoStatus>,
}
