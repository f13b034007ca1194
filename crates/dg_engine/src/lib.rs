//! Engine (§4.3–4.6): orchestrates `RepoStore` and `Graph` into the
//! `Update`/`Scan`/`Rank`/`Remove`/`Match`/`Reverse`/`Resolve`/`RepoStatus`
//! operations the RPC front-end exposes.

mod convert;
mod errors;
mod query;
pub mod telemetry;

use dg_api::event::{Event, RemovePackageEvent, RemoveRepoEvent, UpdateErrorEvent, UpdateRankEvent, UpdatedEvent};
use dg_api::request::{RankParams, RemoveParams, ScanParams, UpdateParams};
use dg_api::response::{RankResult, RemoveResult, ScanResult, UpdateResult};
use dg_api::{Error, ErrorCode};
use dg_graph::Graph;
use dg_kv::ScanControl;
use dg_loader::Loader;
use dg_repostore::{CheckOptions, RepoStore};
use dg_vcs::VcsClient;
use errors::{graph_err, repostore_err, vcs_err};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub use query::EventSink;

pub type Result<T> = std::result::Result<T, Error>;

/// Operator-tunable knobs not carried on a per-request basis (§6
/// `DEPSERVER_*` environment variables).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scratch directory clones are created under; one subdirectory per
    /// in-flight `Update`, removed when the update finishes.
    pub work_dir: PathBuf,
    /// Consecutive `ls-remote` failures after which a repo is purged.
    pub error_limit: Option<u32>,
    /// Bounds clone + load per repository (§5 "per-repository task
    /// timeout", default 5 minutes).
    pub task_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("depgraph-scratch"),
            error_limit: None,
            task_timeout: Duration::from_secs(300),
        }
    }
}

/// The engine. Cheap to clone — every field is an `Arc` — so `Scan`'s
/// worker pool can hand each task its own handle without sharing `&self`
/// across a `'static` future boundary.
#[derive(Clone)]
pub struct Engine {
    pub(crate) graph: Arc<Graph>,
    pub(crate) repostore: Arc<RepoStore>,
    vcs: Arc<dyn VcsClient>,
    loader: Arc<dyn Loader>,
    config: Arc<EngineConfig>,
    /// Mutual-exclusion gate shared by `Scan` and `Rank` (§5 "long-running
    /// operations ... are mutually exclusive system-wide").
    scanning: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        graph: Graph,
        repostore: RepoStore,
        vcs: Arc<dyn VcsClient>,
        loader: Arc<dyn Loader>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            repostore: Arc::new(repostore),
            vcs,
            loader,
            config: Arc::new(config),
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    fn acquire_scan_gate(&self) -> Result<ScanGateGuard> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::new(ErrorCode::Conflict, "scan already in progress"));
        }
        Ok(ScanGateGuard { flag: self.scanning.clone() })
    }

    fn scratch_dir(&self) -> PathBuf {
        let token: u64 = rand::random();
        self.config.work_dir.join(format!("update-{token:016x}"))
    }

    /// `Update` (§4.3).
    pub async fn update(&self, params: UpdateParams, events: Option<&EventSink>) -> Result<UpdateResult> {
        if params.check_only && params.force {
            return Err(Error::invalid("checkOnly and force are mutually exclusive"));
        }

        let canonical = dg_repostore::url::fix_repo_url(&params.repository);
        let key = match &params.reference {
            Some(reference) => format!("{canonical}@@{reference}"),
            None => canonical.clone(),
        };

        let check_opts = CheckOptions { reference: params.reference.clone(), prefix: params.prefix.clone() };
        let check = self.repostore.check(&key, &check_opts).await.map_err(repostore_err)?;

        if let Some(limit) = self.config.error_limit {
            if check.status.error_count >= limit {
                self.repostore.remove(&key).map_err(repostore_err)?;
                if let Some(sink) = events {
                    sink.emit(Event::RemoveRepo(RemoveRepoEvent { repository: canonical.clone() }));
                }
                return Ok(UpdateResult {
                    repository: canonical,
                    needs_update: false,
                    reference: Some(check.status.ref_name.clone()),
                    digest: check.status.digest.clone(),
                    num_packages: 0,
                    errors: vec![check
                        .error
                        .clone()
                        .unwrap_or_else(|| "consecutive error limit exceeded".to_string())],
                    removed: true,
                });
            }
        }

        if params.check_only {
            return Ok(UpdateResult {
                repository: canonical,
                needs_update: check.needs_update,
                reference: Some(check.status.ref_name.clone()),
                digest: check.status.digest.clone(),
                num_packages: 0,
                errors: check.error.into_iter().collect(),
                removed: false,
            });
        }

        if !check.needs_update && !params.force {
            return Ok(UpdateResult {
                repository: canonical,
                needs_update: false,
                reference: Some(check.status.ref_name.clone()),
                digest: check.status.digest.clone(),
                num_packages: 0,
                errors: check.error.into_iter().collect(),
                removed: false,
            });
        }

        let mut errors: Vec<String> = check.error.clone().into_iter().collect();

        if params.reset {
            let removed = self.remove_rows_for_repo(&canonical)?;
            tracing::info!(repository = %canonical, removed, "reset: cleared existing rows before update");
        }

        let Some(digest) = check.status.digest.clone() else {
            errors.push("no digest available to clone".to_string());
            return Ok(UpdateResult {
                repository: canonical,
                needs_update: check.needs_update,
                reference: Some(check.status.ref_name.clone()),
                digest: None,
                num_packages: 0,
                errors,
                removed: false,
            });
        };

        let scratch = self.scratch_dir();
        let clone_outcome = tokio::time::timeout(self.config.task_timeout, async {
            self.vcs.clone_shallow(&canonical, &scratch).await?;
            self.vcs.fetch(&scratch, &digest).await?;
            self.vcs.checkout_detached(&scratch, &digest).await
        })
        .await;

        let clone_result = match clone_outcome {
            Err(_) => {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                return Err(Error::new(ErrorCode::OperationCanceled, "clone timed out"));
            }
            Ok(result) => result,
        };

        if let Err(e) = clone_result {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
            if let Some(sink) = events {
                sink.emit(Event::UpdateError(UpdateErrorEvent {
                    repository: canonical.clone(),
                    message: e.to_string(),
                }));
            }
            return Err(vcs_err(e));
        }

        let mut loader_opts = params.loader_options.clone();
        if let Some(prefix) = &params.prefix {
            loader_opts.package_prefix = Some(prefix.clone());
        } else if loader_opts.package_prefix.is_none() {
            loader_opts.package_prefix = Some(canonical.clone());
        }

        let load_outcome = tokio::time::timeout(self.config.task_timeout, self.loader.load(&scratch, &loader_opts)).await;
        let _ = tokio::fs::remove_dir_all(&scratch).await;

        let repos = match load_outcome {
            Err(_) => {
                errors.push("loader timed out".to_string());
                Vec::new()
            }
            Ok(Err(e)) => {
                errors.push(e.to_string());
                if let Some(sink) = events {
                    sink.emit(Event::UpdateError(UpdateErrorEvent {
                        repository: canonical.clone(),
                        message: e.to_string(),
                    }));
                }
                Vec::new()
            }
            Ok(Ok(repos)) => repos,
        };

        let mut num_packages = 0u64;
        for repo in repos {
            if repo.remotes.is_empty() {
                return Err(Error::invalid("loader returned a repo with no remotes"));
            }
            let packages = repo.packages.into_iter().map(convert::loader_package_to_input).collect();
            num_packages += self.graph.add_all(&canonical, packages).map_err(graph_err)?;
        }

        if let Some(sink) = events {
            sink.emit(Event::Updated(UpdatedEvent { repository: canonical.clone(), num_packages }));
        }

        Ok(UpdateResult {
            repository: canonical,
            needs_update: true,
            reference: Some(check.status.ref_name.clone()),
            digest: Some(digest),
            num_packages,
            errors,
            removed: false,
        })
    }

    /// Removes every Graph row whose `repository` equals `canonical`.
    pub(crate) fn remove_rows_for_repo(&self, canonical: &str) -> Result<u64> {
        let mut to_remove = Vec::new();
        self.graph
            .list("", |row| {
                if row.repository == canonical {
                    to_remove.push(row.import_path.clone());
                }
                ScanControl::Continue
            })
            .map_err(graph_err)?;
        for import_path in &to_remove {
            self.graph.remove(import_path).map_err(graph_err)?;
        }
        Ok(to_remove.len() as u64)
    }

    /// `Scan` (§4.4): visits every stored `RepoStatus`, deduplicates,
    /// filters by eligibility and sample rate, and dispatches `Update`
    /// through a bounded worker pool.
    pub async fn scan(&self, params: ScanParams, events: Option<EventSink>) -> Result<ScanResult> {
        let _gate = self.acquire_scan_gate()?;
        let start = std::time::Instant::now();

        let mut statuses = Vec::new();
        self.repostore
            .scan(|status| {
                statuses.push(status.clone());
                ScanControl::Continue
            })
            .map_err(repostore_err)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut seen = std::collections::HashSet::new();
        let mut scanned = 0u64;
        let mut deduplicated = 0u64;
        let mut sampled = 0u64;

        let semaphore = Arc::new(Semaphore::new(params.concurrency.get() as usize));
        let mut join_set: JoinSet<(String, Result<UpdateResult>)> = JoinSet::new();

        for status in statuses {
            scanned += 1;
            if !seen.insert(status.repository.clone()) {
                deduplicated += 1;
                continue;
            }
            if !dg_repostore::should_check(&status, params.min_interval_secs, now) {
                if params.log_errors || params.log_updates {
                    if let Some(sink) = &events {
                        sink.emit(Event::Skipped(dg_api::event::SkippedEvent {
                            repository: status.repository.clone(),
                            reason: "ineligible".to_string(),
                        }));
                    }
                }
                continue;
            }
            let draw: f64 = rand::random();
            if draw >= params.sample_rate.get() {
                continue;
            }
            sampled += 1;

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let engine = self.clone();
            let repository = status.repository.clone();
            let reference = if status.ref_name == "*" { None } else { Some(status.ref_name.clone()) };
            let events = events.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let params = UpdateParams {
                    repository: repository.clone(),
                    reference,
                    check_only: false,
                    reset: false,
                    force: false,
                    prefix: None,
                    loader_options: Default::default(),
                };
                let result = engine.update(params, events.as_ref()).await;
                (repository, result)
            });
        }

        let mut updated = 0u64;
        let mut packages_updated = 0u64;
        while let Some(joined) = join_set.join_next().await {
            let (repository, result) = match joined {
                Ok(pair) => pair,
                Err(_join_error) => continue,
            };
            match result {
                Ok(r) => {
                    updated += 1;
                    packages_updated += r.num_packages;
                    if params.log_updates {
                        if let Some(sink) = &events {
                            sink.emit(Event::Updated(UpdatedEvent {
                                repository: repository.clone(),
                                num_packages: r.num_packages,
                            }));
                        }
                    }
                }
                Err(e) => {
                    if params.log_errors {
                        if let Some(sink) = &events {
                            sink.emit(Event::UpdateError(UpdateErrorEvent {
                                repository: repository.clone(),
                                message: e.to_string(),
                            }));
                        }
                    }
                }
            }
        }

        Ok(ScanResult {
            scanned,
            deduplicated,
            sampled,
            updated,
            packages_updated,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// `Rank` (§4.5): computes PageRank over the whole Graph.
    pub fn rank(&self, params: RankParams, events: Option<&EventSink>) -> Result<RankResult> {
        let _gate = self.acquire_scan_gate()?;

        struct Node {
            cur: f64,
            next: f64,
            links: Vec<String>,
        }

        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        let mut real_rows = 0u64;
        self.graph
            .list("", |row| {
                real_rows += 1;
                nodes.insert(
                    row.import_path.clone(),
                    Node { cur: 1.0, next: 0.0, links: row.directs.clone() },
                );
                ScanControl::Continue
            })
            .map_err(graph_err)?;

        if nodes.is_empty() {
            let result = RankResult { num_rows: 0, updated: false };
            if let Some(sink) = events {
                sink.emit(Event::UpdateRank(UpdateRankEvent { num_rows: result.num_rows, updated: result.updated }));
            }
            return Ok(result);
        }

        // Closure: every link target gets a stub node so the push step
        // below never has to special-case a missing entry.
        let targets: Vec<String> = nodes.values().flat_map(|n| n.links.iter().cloned()).collect();
        for target in targets {
            nodes.entry(target).or_insert(Node { cur: 1.0, next: 0.0, links: Vec::new() });
        }

        let n = nodes.len() as f64;
        for node in nodes.values_mut() {
            node.cur /= n;
        }

        let damping = params.damping.get();
        for _round in 0..params.iterations.get() {
            let mut pushed: BTreeMap<String, f64> = nodes.keys().map(|k| (k.clone(), 0.0)).collect();
            for node in nodes.values() {
                if node.links.is_empty() {
                    continue;
                }
                let weight = node.cur / node.links.len() as f64;
                for target in &node.links {
                    *pushed.get_mut(target).expect("closure inserted every link target") += weight;
                }
            }
            for (import_path, node) in nodes.iter_mut() {
                node.cur = (1.0 - damping) + damping * pushed[import_path];
                node.next = 0.0;
            }
        }

        let max_cur = nodes.values().map(|n| n.cur).fold(0.0_f64, f64::max);
        let scale_factor = 10f64.powi(params.scale as i32);
        for node in nodes.values_mut() {
            node.next = (scale_factor * node.cur / (max_cur + 1.0)).floor();
        }

        let mut updated = false;
        if params.update {
            let scaled = &nodes;
            let changed = self
                .graph
                .scan_update("", |row| match scaled.get(&row.import_path) {
                    Some(node) if node.next != row.ranking => {
                        row.ranking = node.next;
                        true
                    }
                    _ => false,
                })
                .map_err(graph_err)?;
            updated = changed > 0;
        }

        let result = RankResult { num_rows: real_rows, updated };
        if let Some(sink) = events {
            sink.emit(Event::UpdateRank(UpdateRankEvent { num_rows: result.num_rows, updated: result.updated }));
        }
        Ok(result)
    }

    /// `Remove` (§4.6).
    pub fn remove(&self, params: RemoveParams, events: Option<&EventSink>) -> Result<RemoveResult> {
        let mut packages_removed = 0u64;
        for import_path in &params.packages {
            if self.graph.row(import_path).is_ok() {
                packages_removed += 1;
                if let Some(sink) = events {
                    sink.emit(Event::RemovePackage(RemovePackageEvent { import_path: import_path.clone() }));
                }
            }
            self.graph.remove(import_path).map_err(graph_err)?;
        }

        let mut repos_removed = 0u64;
        for repository in &params.repositories {
            let canonical = dg_repostore::url::fix_repo_url(repository);
            let mut keys = vec![canonical.clone()];
            let tag_prefix = format!("{canonical}@@");
            self.repostore
                .scan(|status| {
                    if status.repository.starts_with(&tag_prefix) {
                        keys.push(status.repository.clone());
                    }
                    ScanControl::Continue
                })
                .map_err(repostore_err)?;

            for key in &keys {
                if self.repostore.status(key).is_ok() {
                    repos_removed += 1;
                }
                self.repostore.remove(key).map_err(repostore_err)?;
            }
            if let Some(sink) = events {
                sink.emit(Event::RemoveRepo(RemoveRepoEvent { repository: canonical.clone() }));
            }

            if !params.keep_packages {
                packages_removed += self.remove_rows_for_repo(&canonical)?;
            }
        }

        Ok(RemoveResult { packages_removed, repos_removed })
    }
}

/// RAII guard releasing the `scanning` gate on drop (normal return or
/// early `?`), so a failed `Scan`/`Rank` never wedges the gate open.
struct ScanGateGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ScanGateGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
