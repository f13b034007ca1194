//! Push notification DTOs (server → client, unsolicited, §6).
//!
//! Each variant corresponds 1:1 to one of the `log.*` method names a client
//! opts into per-request (`log_updates`, `log_errors`, ...).

use serde::{Deserialize, Serialize};

/// A single push notification emitted while `Update`/`Scan`/`Rank`/`Remove`
/// is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Event {
    #[serde(rename = "log.progress")]
    Progress(ProgressEvent),
    #[serde(rename = "log.updated")]
    Updated(UpdatedEvent),
    #[serde(rename = "log.skipped")]
    Skipped(SkippedEvent),
    #[serde(rename = "log.updateError")]
    UpdateError(UpdateErrorEvent),
    #[serde(rename = "log.removeRepo")]
    RemoveRepo(RemoveRepoEvent),
    #[serde(rename = "log.removePackage")]
    RemovePackage(RemovePackageEvent),
    #[serde(rename = "log.updateRank")]
    UpdateRank(UpdateRankEvent),
}

/// A generic progress line, e.g. "scanned 120/4000 repositories".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
}

/// A repository was cloned and ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedEvent {
    pub repository: String,
    pub num_packages: u64,
}

/// A repository was visited during `Scan` but skipped (ineligible or not
/// sampled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub repository: String,
    pub reason: String,
}

/// An `Update` failed; the repository's `errorCount` was incremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateErrorEvent {
    pub repository: String,
    pub message: String,
}

/// A repository's status record(s) were purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRepoEvent {
    pub repository: String,
}

/// A package row was removed from the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovePackageEvent {
    pub import_path: String,
}

/// `Rank` finished computing (and optionally persisting) rankings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRankEvent {
    pub num_rows: u64,
    pub updated: bool,
}
