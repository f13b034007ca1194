//! Request DTOs for the depgraph RPC contract (§6).

use crate::bounds::{Concurrency, Damping, Iterations, SampleRate};
use crate::paging::Paging;
use serde::{Deserialize, Serialize};

/// Top-level request envelope. `token` carries the write-token metadata
/// string for mutating methods (§6); read methods ignore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: crate::ApiVersion,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub payload: RequestPayload,
}

/// Request payload variants, one per RPC method in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RequestPayload {
    Update(UpdateParams),
    Scan(ScanParams),
    Rank(RankParams),
    Remove(RemoveParams),
    Match(MatchParams),
    Reverse(ReverseParams),
    Resolve(ResolveParams),
    RepoStatus(RepoStatusParams),
}

impl RequestPayload {
    /// Whether this method mutates persistent state (§6 table); used by the
    /// RPC front-end to decide whether the write token must be checked.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            RequestPayload::Update(_)
                | RequestPayload::Scan(_)
                | RequestPayload::Rank(_)
                | RequestPayload::Remove(_)
        )
    }

    /// The bare method name, as carried on the JSON-RPC wire.
    pub fn method_name(&self) -> &'static str {
        match self {
            RequestPayload::Update(_) => "Update",
            RequestPayload::Scan(_) => "Scan",
            RequestPayload::Rank(_) => "Rank",
            RequestPayload::Remove(_) => "Remove",
            RequestPayload::Match(_) => "Match",
            RequestPayload::Reverse(_) => "Reverse",
            RequestPayload::Resolve(_) => "Resolve",
            RequestPayload::RepoStatus(_) => "RepoStatus",
        }
    }

    /// The single repository/package a request is "about", for request-scoped
    /// log spans. `Scan`/`Rank` operate over the whole graph, so they have
    /// none.
    pub fn subject(&self) -> String {
        match self {
            RequestPayload::Update(p) => p.repository.clone(),
            RequestPayload::Scan(_) => "-".to_string(),
            RequestPayload::Rank(_) => "-".to_string(),
            RequestPayload::Remove(p) => p.repositories.first().cloned().or_else(|| p.packages.first().cloned()).unwrap_or_default(),
            RequestPayload::Match(p) => p.package.clone().or_else(|| p.repository.clone()).unwrap_or_default(),
            RequestPayload::Reverse(p) => p.package.clone(),
            RequestPayload::Resolve(p) => p.package.clone(),
            RequestPayload::RepoStatus(p) => p.repository.clone(),
        }
    }
}

/// Loader option flags, passed through unexamined to the `Loader`
/// collaborator (§6 "Loader collaborator contract").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderOptions {
    #[serde(default)]
    pub hash_source_files: bool,
    #[serde(default)]
    pub use_import_comments: bool,
    #[serde(default)]
    pub trim_repo_prefix: bool,
    #[serde(default)]
    pub standard_library: bool,
    #[serde(default)]
    pub package_prefix: Option<String>,
}

/// `Update {repository, reference, checkOnly, reset, force, prefix,
/// loaderOptions}` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateParams {
    pub repository: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub check_only: bool,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub loader_options: LoaderOptions,
}

/// `Scan` parameters (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
    pub concurrency: Concurrency,
    #[serde(default = "SampleRate::always")]
    pub sample_rate: SampleRate,
    /// Minimum re-check interval in seconds, passed to `ShouldCheck` as `m`.
    #[serde(default)]
    pub min_interval_secs: u64,
    #[serde(default)]
    pub log_updates: bool,
    #[serde(default)]
    pub log_errors: bool,
}

/// `Rank` parameters (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankParams {
    #[serde(default)]
    pub iterations: Iterations,
    #[serde(default)]
    pub damping: Damping,
    #[serde(default = "crate::bounds::default_rank_scale")]
    pub scale: u32,
    #[serde(default)]
    pub update: bool,
}

/// `Remove` parameters (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveParams {
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub keep_packages: bool,
}

/// `Match` parameters (§4.6). Either `package` or `repository` (or both)
/// must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchParams {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
    #[serde(default)]
    pub count_only: bool,
}

/// `Reverse` parameters (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseParams {
    /// Candidate package pattern (exact or `/...` prefix).
    pub package: String,
    #[serde(default)]
    pub skip_intra_repo: bool,
    /// Regular expression over the source import path; a leading `(?!)`
    /// negates the match (§4.6).
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

/// `Resolve` parameters (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveParams {
    pub package: String,
}

/// `RepoStatus` parameters (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStatusParams {
    pub repository: String,
}
