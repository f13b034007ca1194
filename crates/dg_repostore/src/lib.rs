//! RepoStore (§4.1): repository-state records keyed by canonical repo URL,
//! plus the `ShouldCheck` adaptive-scheduling eligibility rule.

pub mod url;

use dg_kv::{Kv, ScanControl};
use dg_vcs::{RemoteRef, VcsClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RepoStoreError {
    #[error("repo status not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Kv(#[from] dg_kv::KvError),
    #[error(transparent)]
    Vcs(#[from] dg_vcs::VcsError),
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, RepoStoreError>;

const MAX_UPDATES: usize = 20;

/// One prior-digest entry in `RepoStatus.updates` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub when: i64,
    pub digest: String,
}

/// The internal, bincode-encoded repository-state record (§3). Distinct
/// from `dg_api::response::RepoStatus`, the JSON wire DTO — the engine
/// converts between the two at the RPC boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub repository: String,
    pub ref_name: String,
    pub digest: Option<String>,
    pub error_count: u32,
    pub prefix: Option<String>,
    pub tag: Option<String>,
    pub last_check: Option<i64>,
    pub updates: Vec<UpdateEntry>,
}

impl RepoStatus {
    fn fresh(repository: &str, ref_name: &str) -> Self {
        Self {
            repository: repository.to_string(),
            ref_name: ref_name.to_string(),
            digest: None,
            error_count: 0,
            prefix: None,
            tag: None,
            last_check: None,
            updates: Vec::new(),
        }
    }
}

/// Options passed to `Check` (§4.1).
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub reference: Option<String>,
    pub prefix: Option<String>,
}

/// Result of a `Check` call.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub status: RepoStatus,
    pub needs_update: bool,
    pub error: Option<String>,
}

/// Reserved for store-level tuning knobs; empty today. The consecutive-
/// failure purge threshold (§4.3 step 3) lives on `dg_engine::EngineConfig`
/// instead, since purging a repo on error-limit overrun is `Update`'s call,
/// not `Check`'s — `Check` only counts failures and reports them.
#[derive(Debug, Clone, Default)]
pub struct RepoStoreConfig {}

pub struct RepoStore {
    kv: Arc<dyn Kv>,
    vcs: Arc<dyn VcsClient>,
    #[allow(dead_code)]
    config: RepoStoreConfig,
    now: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl RepoStore {
    pub fn new(kv: Arc<dyn Kv>, vcs: Arc<dyn VcsClient>, config: RepoStoreConfig) -> Self {
        Self {
            kv,
            vcs,
            config,
            now: Box::new(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0)
            }),
        }
    }

    /// Overrides the clock source; used by tests to make `ShouldCheck` and
    /// `updates` timestamps deterministic.
    pub fn with_clock(mut self, now: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.now = Box::new(now);
        self
    }

    fn key(&self, canonical_url: &str) -> Vec<u8> {
        canonical_url.as_bytes().to_vec()
    }

    fn load(&self, canonical_url: &str) -> Result<Option<RepoStatus>> {
        match self.kv.get(&self.key(canonical_url))? {
            Some(bytes) => {
                let status = bincode::deserialize(&bytes)
                    .map_err(|e| RepoStoreError::Encoding(e.to_string()))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    fn save(&self, status: &RepoStatus) -> Result<()> {
        let bytes =
            bincode::serialize(status).map_err(|e| RepoStoreError::Encoding(e.to_string()))?;
        self.kv.put(&self.key(&status.repository), &bytes)?;
        Ok(())
    }

    /// `Status(url)` (§4.1).
    pub fn status(&self, canonical_url: &str) -> Result<RepoStatus> {
        self.load(canonical_url)?
            .ok_or_else(|| RepoStoreError::NotFound(canonical_url.to_string()))
    }

    /// `Remove(url)` (§4.1).
    pub fn remove(&self, canonical_url: &str) -> Result<()> {
        self.kv.delete(&self.key(canonical_url))?;
        Ok(())
    }

    /// `Scan(visit)` (§4.1): lexicographic scan over every stored status.
    pub fn scan(&self, mut visit: impl FnMut(&RepoStatus) -> ScanControl) -> Result<()> {
        let mut err = None;
        self.kv.scan(b"", &mut |_key, value| {
            match bincode::deserialize::<RepoStatus>(value) {
                Ok(status) => visit(&status),
                Err(e) => {
                    err = Some(RepoStoreError::Encoding(e.to_string()));
                    ScanControl::Stop
                }
            }
        })?;
        if let Some(e) = err {
            return Err(e);
        }
        Ok(())
    }

    /// `Tags(baseUrl)` (§4.1): every stored status whose repository equals
    /// `base_url`, covering tagged keys (`base@@ref`).
    pub fn tags(&self, base_url: &str) -> Result<Vec<RepoStatus>> {
        let mut out = Vec::new();
        self.scan(|status| {
            if status.repository == base_url {
                out.push(status.clone());
            }
            ScanControl::Continue
        })?;
        Ok(out)
    }

    /// `Check(url, opts) -> CheckResult` (§4.1).
    pub async fn check(&self, canonical_url: &str, opts: &CheckOptions) -> Result<CheckResult> {
        let mut status = self
            .load(canonical_url)?
            .unwrap_or_else(|| RepoStatus::fresh(canonical_url, "*"));

        if let Some(requested) = &opts.reference {
            if requested != &status.ref_name {
                status.ref_name = requested.clone();
                status.digest = None;
            }
        }
        if let Some(prefix) = &opts.prefix {
            status.prefix = Some(prefix.clone());
        }

        let now = (self.now)();
        let has_tag_selector = status.ref_name != "*";
        let glob = if has_tag_selector { status.ref_name.as_str() } else { "*" };

        match self.vcs.ls_remote(canonical_url, glob).await {
            Ok(refs) => match select_best_head(&refs, has_tag_selector) {
                Some(best) => {
                    let needs_update = status.digest.as_deref() != Some(best.digest.as_str());
                    if needs_update {
                        if let Some(old) = status.digest.take() {
                            status.updates.push(UpdateEntry { when: now, digest: old });
                            if status.updates.len() > MAX_UPDATES {
                                let excess = status.updates.len() - MAX_UPDATES;
                                status.updates.drain(0..excess);
                            }
                        }
                        status.ref_name = best.name.clone();
                        status.digest = Some(best.digest.clone());
                    }
                    status.last_check = Some(now);
                    status.error_count = 0;
                    self.save(&status)?;
                    Ok(CheckResult { status, needs_update, error: None })
                }
                None => {
                    status.error_count += 1;
                    status.last_check = Some(now);
                    self.save(&status)?;
                    Ok(CheckResult {
                        status,
                        needs_update: false,
                        error: Some("no matching remote heads".to_string()),
                    })
                }
            },
            Err(e) => {
                status.error_count += 1;
                status.last_check = Some(now);
                self.save(&status)?;
                Ok(CheckResult { status, needs_update: false, error: Some(e.to_string()) })
            }
        }
    }
}

/// Picks the "best" head from `git ls-remote` output (§4.1):
/// `refs/heads/master` wins outright; otherwise the first ref under
/// `refs/heads/`, or (with a tag selector) under `refs/tags/`, or `HEAD`.
fn select_best_head(refs: &[RemoteRef], has_tag_selector: bool) -> Option<RemoteRef> {
    if let Some(r) = refs.iter().find(|r| r.name == "refs/heads/master") {
        return Some(r.clone());
    }
    if let Some(r) = refs.iter().find(|r| is_interesting(&r.name, has_tag_selector)) {
        return Some(r.clone());
    }
    refs.iter().find(|r| r.name == "HEAD").cloned()
}

fn is_interesting(name: &str, has_tag_selector: bool) -> bool {
    name.starts_with("refs/heads/")
        || (has_tag_selector && name.starts_with("refs/tags/"))
        || name == "HEAD"
}

/// `ShouldCheck` (§4.1): adaptive re-check eligibility.
pub fn should_check(status: &RepoStatus, min_interval_secs: u64, now: i64) -> bool {
    if min_interval_secs == 0 {
        return true;
    }
    let Some(last_check) = status.last_check else {
        return true;
    };
    if now - last_check < min_interval_secs as i64 {
        return false;
    }
    if status.updates.is_empty() {
        return true;
    }
    let first = status.updates.first().unwrap().when;
    let last = status.updates.last().unwrap().when;
    let avg = (last - first) / status.updates.len() as i64;
    now - last_check >= avg
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_fixtures::{FixtureVcs, MemoryKv};

    fn store(vcs: FixtureVcs) -> RepoStore {
        RepoStore::new(
            Arc::new(MemoryKv::new()),
            Arc::new(vcs),
            RepoStoreConfig::default(),
        )
        .with_clock(|| 1_000)
    }

    #[test]
    fn best_head_prefers_master() {
        let refs = vec![
            RemoteRef { digest: "aaaa".into(), name: "refs/heads/dev".into() },
            RemoteRef { digest: "bbbb".into(), name: "refs/heads/master".into() },
        ];
        assert_eq!(select_best_head(&refs, false).unwrap().name, "refs/heads/master");
    }

    #[test]
    fn best_head_falls_back_to_head() {
        let refs = vec![RemoteRef { digest: "cccc".into(), name: "HEAD".into() }];
        assert_eq!(select_best_head(&refs, false).unwrap().name, "HEAD");
    }

    #[test]
    fn best_head_ignores_tags_without_a_tag_selector() {
        let refs = vec![
            RemoteRef { digest: "aaaa".into(), name: "refs/tags/v1".into() },
            RemoteRef { digest: "bbbb".into(), name: "refs/heads/dev".into() },
        ];
        assert_eq!(select_best_head(&refs, false).unwrap().name, "refs/heads/dev");
    }

    #[test]
    fn best_head_picks_tag_when_selector_given() {
        let refs = vec![RemoteRef { digest: "aaaa".into(), name: "refs/tags/v1".into() }];
        assert_eq!(select_best_head(&refs, true).unwrap().name, "refs/tags/v1");
    }

    #[test]
    fn should_check_always_true_when_interval_zero() {
        let status = RepoStatus::fresh("x", "*");
        assert!(should_check(&status, 0, 9_999));
    }

    #[test]
    fn should_check_respects_minimum_interval() {
        let mut status = RepoStatus::fresh("x", "*");
        status.last_check = Some(1_000);
        assert!(!should_check(&status, 500, 1_100));
        assert!(should_check(&status, 500, 1_600));
    }

    #[test]
    fn should_check_backs_off_for_quiescent_repos() {
        let mut status = RepoStatus::fresh("x", "*");
        status.last_check = Some(2_000);
        status.updates = vec![
            UpdateEntry { when: 0, digest: "a".into() },
            UpdateEntry { when: 1_000, digest: "b".into() },
        ];
        // avg interval between updates is 500; now is only 100s past last_check.
        assert!(!should_check(&status, 10, 2_100));
        assert!(should_check(&status, 10, 2_600));
    }

    #[tokio::test]
    async fn check_increments_error_count_when_no_head_is_interesting() {
        let vcs = FixtureVcs::new().with_refs(
            "https://example.com/r",
            vec![RemoteRef { digest: "cafe".into(), name: "refs/pull/1/head".into() }],
        );
        let store = store(vcs);
        let result = store
            .check("https://example.com/r", &CheckOptions::default())
            .await
            .unwrap();
        assert!(!result.needs_update);
        assert_eq!(result.error.as_deref(), Some("no matching remote heads"));
        assert_eq!(store.status("https://example.com/r").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn check_without_tag_selector_falls_back_to_head_when_only_tags_exist() {
        let vcs = FixtureVcs::new().with_refs(
            "https://example.com/r",
            vec![
                RemoteRef { digest: "aaaa".into(), name: "refs/tags/v1".into() },
                RemoteRef { digest: "beef".into(), name: "HEAD".into() },
            ],
        );
        let store = store(vcs);
        let result = store
            .check("https://example.com/r", &CheckOptions::default())
            .await
            .unwrap();
        assert!(result.error.is_none());
        assert_eq!(result.status.ref_name, "HEAD");
        assert_eq!(result.status.digest.as_deref(), Some("beef"));
    }

    #[tokio::test]
    async fn check_without_tag_selector_and_no_head_reports_no_matching_heads() {
        let vcs = FixtureVcs::new().with_refs(
            "https://example.com/r",
            vec![RemoteRef { digest: "aaaa".into(), name: "refs/tags/v1".into() }],
        );
        let store = store(vcs);
        let result = store
            .check("https://example.com/r", &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("no matching remote heads"));
        assert_eq!(store.status("https://example.com/r").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn check_persists_new_status_on_first_check() {
        let vcs = FixtureVcs::new().with_refs(
            "https://example.com/r",
            vec![RemoteRef { digest: "deadbeef".into(), name: "refs/heads/master".into() }],
        );
        let store = store(vcs);
        let result = store
            .check("https://example.com/r", &CheckOptions::default())
            .await
            .unwrap();
        assert!(result.needs_update);
        assert_eq!(result.status.digest.as_deref(), Some("deadbeef"));
        assert_eq!(store.status("https://example.com/r").unwrap().digest.as_deref(), Some("deadbeef"));
    }
}
