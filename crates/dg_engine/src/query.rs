//! `Match`, `Reverse`, `Resolve`, `RepoStatus` (§4.6) plus the push-event
//! sink type shared by `Update`/`Scan`/`Rank`/`Remove`.

use crate::convert::{package_row_to_wire, repo_status_to_wire};
use crate::errors::{graph_err, repostore_err, resolve_err};
use crate::{Engine, Result};
use dg_api::bounds::Cursor;
use dg_api::request::{MatchParams, RepoStatusParams, ResolveParams, ReverseParams};
use dg_api::response::{MatchResult, RepoStatusResult, ResolveResult, ReverseDep, ReverseResult};
use dg_api::{Error, ErrorCode};
use dg_kv::ScanControl;
use std::collections::HashMap;
use std::sync::Arc;

/// Push-notification sink: a cheap, cloneable handle the engine calls
/// synchronously while running a mutating method. `dg_rpc` wraps its
/// per-connection outbound channel in one of these; tests can wrap a
/// `Vec`-collecting closure instead.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(dg_api::Event) + Send + Sync>);

impl EventSink {
    pub fn new(f: impl Fn(dg_api::Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn emit(&self, event: dg_api::Event) {
        (self.0)(event)
    }
}

fn is_prefix_pattern(pattern: &str) -> bool {
    pattern.ends_with("/...")
}

/// The longest prefix of `pattern` guaranteed to be a literal byte string
/// shared by every import path the pattern can match — the key `Match`'s
/// scan starts at.
fn static_prefix(pattern: &str) -> String {
    match pattern.strip_suffix("/...") {
        Some(rest) => rest.to_string(),
        None => pattern.to_string(),
    }
}

fn package_matches(pattern: &str, import_path: &str) -> bool {
    if is_prefix_pattern(pattern) {
        let prefix = &pattern[..pattern.len() - "/...".len()];
        import_path == prefix || import_path.starts_with(&format!("{prefix}/"))
    } else {
        import_path == pattern
    }
}

impl Engine {
    /// `Match` (§4.6).
    pub fn match_query(&self, params: MatchParams) -> Result<MatchResult> {
        if params.package.is_none() && params.repository.is_none() {
            return Err(Error::invalid("match requires a package and/or a repository"));
        }

        let prefix = params.package.as_ref().map(|p| static_prefix(p));
        let start = if !params.paging.page_key.is_initial() {
            params.paging.page_key.get().to_string()
        } else {
            prefix.clone().unwrap_or_default()
        };
        let limit = params.paging.limit.get() as usize;

        let mut rows = Vec::new();
        let mut next_page = None;
        let mut fitted = 0u64;

        self.graph
            .scan(&start, |row| {
                if let (Some(pattern), Some(prefix)) = (&params.package, &prefix) {
                    if !package_matches(pattern, &row.import_path) {
                        if row.import_path.starts_with(prefix.as_str()) {
                            return ScanControl::Continue;
                        }
                        if row.import_path.as_str() > prefix.as_str() {
                            return ScanControl::Stop;
                        }
                        return ScanControl::Continue;
                    }
                }
                if let Some(repository) = &params.repository {
                    if &row.repository != repository {
                        return ScanControl::Continue;
                    }
                }
                if fitted as usize == limit {
                    next_page = Some(Cursor::from(row.import_path.clone()));
                    return ScanControl::Stop;
                }
                fitted += 1;
                if !params.count_only {
                    rows.push(package_row_to_wire(row));
                }
                ScanControl::Continue
            })
            .map_err(graph_err)?;

        Ok(MatchResult { rows, next_page, count: fitted })
    }

    /// `Reverse` (§4.6).
    pub fn reverse(&self, params: ReverseParams) -> Result<ReverseResult> {
        let is_prefix = is_prefix_pattern(&params.package);
        let prefix = static_prefix(&params.package);

        let (negate, pattern) = match params.filter.as_deref() {
            Some(f) => match f.strip_prefix("(?!)") {
                Some(rest) => (true, Some(rest)),
                None => (false, Some(f)),
            },
            None => (false, None),
        };
        let filter_re = pattern
            .map(regex::Regex::new)
            .transpose()
            .map_err(|e| Error::invalid(format!("invalid filter regex: {e}")))?;

        let start = if !params.paging.page_key.is_initial() {
            params.paging.page_key.get().to_string()
        } else {
            String::new()
        };
        let limit = params.paging.limit.get() as usize;

        let mut deps: Vec<ReverseDep> = Vec::new();
        let mut next_page = None;

        // Built up front rather than looked up row-by-row during the scan below:
        // Graph::scan holds its backing store open for the whole pass, so a nested
        // Graph::row call from inside the visitor would deadlock against it.
        let mut repo_of: HashMap<String, String> = HashMap::new();
        if params.skip_intra_repo {
            self.graph
                .list("", |row| {
                    repo_of.insert(row.import_path.clone(), row.repository.clone());
                    ScanControl::Continue
                })
                .map_err(graph_err)?;
        }

        self.graph
            .scan(&start, |row| {
                if let Some(re) = &filter_re {
                    let is_match = re.is_match(&row.import_path);
                    if is_match == negate {
                        return ScanControl::Continue;
                    }
                }

                let mut hits = Vec::new();
                for target in &row.directs {
                    let matches = if is_prefix {
                        target == &prefix || target.starts_with(&format!("{prefix}/"))
                    } else {
                        target == &params.package
                    };
                    if !matches {
                        continue;
                    }
                    if params.skip_intra_repo {
                        let target_repo = repo_of.get(target).map(String::as_str).unwrap_or_default();
                        if target_repo == row.repository {
                            continue;
                        }
                    }
                    hits.push(ReverseDep { source: row.import_path.clone(), target: target.clone() });
                }

                if hits.is_empty() {
                    return ScanControl::Continue;
                }
                if deps.len() + hits.len() > limit && !deps.is_empty() {
                    next_page = Some(Cursor::from(row.import_path.clone()));
                    return ScanControl::Stop;
                }
                deps.extend(hits);
                ScanControl::Continue
            })
            .map_err(graph_err)?;

        let count = deps.len() as u64;
        Ok(ReverseResult { deps, next_page, count })
    }

    /// `Resolve` (§4.6).
    pub async fn resolve(&self, params: ResolveParams) -> Result<ResolveResult> {
        let resolved = dg_resolve::resolve(&params.package, self.vcs.as_ref()).await.map_err(resolve_err)?;
        Ok(ResolveResult {
            repository: resolved.repository,
            prefix: resolved.prefix,
            import_path: resolved.import_path,
        })
    }

    /// `RepoStatus` (§4.6): every stored record whose key equals or is
    /// tagged from the canonical URL. `RepoStore::tags` only matches an
    /// exact `repository` field, so tagged (`canonical@@ref`) keys are
    /// found with a direct scan instead.
    pub fn repo_status(&self, params: RepoStatusParams) -> Result<RepoStatusResult> {
        let canonical = dg_repostore::url::fix_repo_url(&params.repository);
        let tag_prefix = format!("{canonical}@@");

        let mut statuses = Vec::new();
        self.repostore
            .scan(|status| {
                if status.repository == canonical || status.repository.starts_with(&tag_prefix) {
                    statuses.push(repo_status_to_wire(status));
                }
                ScanControl::Continue
            })
            .map_err(repostore_err)?;

        if statuses.is_empty() {
            return Err(Error::new(ErrorCode::NotFound, format!("no status recorded for {canonical}")));
        }

        Ok(RepoStatusResult { statuses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use dg_api::bounds::PageSize;
    use dg_api::Paging;
    use dg_fixtures::{FixtureLoader, FixtureVcs, MemoryKv};
    use dg_graph::{Graph, PackageInput, PackageType};
    use dg_repostore::{RepoStore, RepoStoreConfig};
    use dg_vcs::{RemoteRef, VcsClient};
    use std::time::Duration;

    fn pkg(import_path: &str, repository: &str, directs: &[&str]) -> (String, PackageInput) {
        (
            repository.to_string(),
            PackageInput {
                name: import_path.rsplit('/').next().unwrap_or(import_path).to_string(),
                import_path: import_path.to_string(),
                directs: directs.iter().map(|s| s.to_string()).collect(),
                source_files: Some(vec![]),
                package_type: PackageType::Library,
            },
        )
    }

    fn engine_with_graph(rows: Vec<(String, PackageInput)>) -> Engine {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        for (repository, pkg) in rows {
            graph.add(&repository, pkg).unwrap();
        }
        let repostore =
            RepoStore::new(Arc::new(MemoryKv::new()), Arc::new(FixtureVcs::new()), RepoStoreConfig::default());
        let vcs: Arc<dyn VcsClient> = Arc::new(FixtureVcs::new());
        let loader: Arc<dyn dg_loader::Loader> = Arc::new(FixtureLoader::new(vec![]));
        let config = EngineConfig {
            work_dir: std::env::temp_dir().join("depgraph-query-tests"),
            error_limit: None,
            task_timeout: Duration::from_secs(5),
        };
        Engine::new(graph, repostore, vcs, loader, config)
    }

    #[test]
    fn match_by_prefix_stops_outside_the_prefix() {
        let engine = engine_with_graph(vec![
            pkg("github.com/u/r/a", "https://github.com/u/r", &[]),
            pkg("github.com/u/r/b", "https://github.com/u/r", &[]),
            pkg("github.com/u/other/c", "https://github.com/u/other", &[]),
        ]);

        let result = engine
            .match_query(MatchParams {
                package: Some("github.com/u/r/...".to_string()),
                repository: None,
                paging: Paging::default(),
                count_only: false,
            })
            .unwrap();

        assert_eq!(result.count, 2);
        assert!(result.rows.iter().all(|r| r.import_path.starts_with("github.com/u/r")));
    }

    #[test]
    fn match_paginates_with_next_page_cursor() {
        let engine = engine_with_graph(vec![
            pkg("a/1", "r", &[]),
            pkg("a/2", "r", &[]),
            pkg("a/3", "r", &[]),
        ]);

        let result = engine
            .match_query(MatchParams {
                package: Some("a/...".to_string()),
                repository: None,
                paging: Paging { page_key: Default::default(), limit: PageSize::try_from(2).unwrap() },
                count_only: false,
            })
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.next_page.as_ref().unwrap().get(), "a/3");
    }

    #[test]
    fn match_page_concatenation_equals_one_unpaginated_call() {
        let engine = engine_with_graph(vec![
            pkg("a/1", "r", &[]),
            pkg("a/2", "r", &[]),
            pkg("a/3", "r", &[]),
            pkg("a/4", "r", &[]),
        ]);

        let whole = engine
            .match_query(MatchParams {
                package: Some("a/...".to_string()),
                repository: None,
                paging: Paging { page_key: Default::default(), limit: PageSize::try_from(100).unwrap() },
                count_only: false,
            })
            .unwrap();

        let first_page = engine
            .match_query(MatchParams {
                package: Some("a/...".to_string()),
                repository: None,
                paging: Paging { page_key: Default::default(), limit: PageSize::try_from(2).unwrap() },
                count_only: false,
            })
            .unwrap();
        let second_page = engine
            .match_query(MatchParams {
                package: Some("a/...".to_string()),
                repository: None,
                paging: Paging { page_key: first_page.next_page.clone().unwrap(), limit: PageSize::try_from(2).unwrap() },
                count_only: false,
            })
            .unwrap();

        assert!(second_page.next_page.is_none());
        let mut paginated: Vec<String> = first_page.rows.iter().chain(second_page.rows.iter()).map(|r| r.import_path.clone()).collect();
        let mut unpaginated: Vec<String> = whole.rows.iter().map(|r| r.import_path.clone()).collect();
        paginated.sort();
        unpaginated.sort();
        assert_eq!(paginated, unpaginated);
    }

    #[test]
    fn match_requires_package_or_repository() {
        let engine = engine_with_graph(vec![]);
        let err = engine
            .match_query(MatchParams { package: None, repository: None, paging: Paging::default(), count_only: false })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn reverse_finds_direct_importers() {
        let engine = engine_with_graph(vec![
            pkg("a", "r1", &["target/pkg"]),
            pkg("b", "r1", &[]),
            pkg("c", "r2", &["target/pkg"]),
        ]);

        let result = engine
            .reverse(ReverseParams {
                package: "target/pkg".to_string(),
                skip_intra_repo: false,
                filter: None,
                paging: Paging::default(),
            })
            .unwrap();

        assert_eq!(result.count, 2);
        assert!(result.deps.iter().any(|d| d.source == "a"));
        assert!(result.deps.iter().any(|d| d.source == "c"));
    }

    #[test]
    fn reverse_filter_negation_excludes_matches() {
        let engine = engine_with_graph(vec![
            pkg("vendor/a", "r1", &["target/pkg"]),
            pkg("app/b", "r1", &["target/pkg"]),
        ]);

        let result = engine
            .reverse(ReverseParams {
                package: "target/pkg".to_string(),
                skip_intra_repo: false,
                filter: Some("(?!)^vendor/".to_string()),
                paging: Paging::default(),
            })
            .unwrap();

        assert_eq!(result.count, 1);
        assert_eq!(result.deps[0].source, "app/b");
    }

    #[test]
    fn reverse_includes_first_rows_hits_even_past_the_limit() {
        let engine = engine_with_graph(vec![
            pkg("a", "r1", &["target/pkg/x", "target/pkg/y"]),
            pkg("b", "r1", &["target/pkg/z"]),
        ]);

        let result = engine
            .reverse(ReverseParams {
                package: "target/pkg/...".to_string(),
                skip_intra_repo: false,
                filter: None,
                paging: Paging { page_key: Default::default(), limit: PageSize::try_from(1).unwrap() },
            })
            .unwrap();

        // `a`'s two hits alone exceed limit=1, but since no rows had been
        // emitted yet they are included anyway so the page makes progress.
        assert_eq!(result.count, 2);
        assert!(result.deps.iter().all(|d| d.source == "a"));
        assert!(result.next_page.is_some());
    }

    #[test]
    fn repo_status_not_found_for_unknown_repository() {
        let engine = engine_with_graph(vec![]);
        let err = engine.repo_status(RepoStatusParams { repository: "https://example.com/none".to_string() }).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn resolve_uses_well_known_host_short_circuit() {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        let repostore =
            RepoStore::new(Arc::new(MemoryKv::new()), Arc::new(FixtureVcs::new()), RepoStoreConfig::default());
        let vcs_fixture = FixtureVcs::new().with_refs(
            "https://github.com/u/r",
            vec![RemoteRef { digest: "deadbeef".to_string(), name: "HEAD".to_string() }],
        );
        let vcs: Arc<dyn VcsClient> = Arc::new(vcs_fixture);
        let loader: Arc<dyn dg_loader::Loader> = Arc::new(FixtureLoader::new(vec![]));
        let config = EngineConfig {
            work_dir: std::env::temp_dir().join("depgraph-query-tests"),
            error_limit: None,
            task_timeout: Duration::from_secs(5),
        };
        let engine = Engine::new(graph, repostore, vcs, loader, config);

        let result = engine.resolve(ResolveParams { package: "github.com/u/r/sub".to_string() }).await.unwrap();
        assert_eq!(result.repository, "https://github.com/u/r");
        assert_eq!(result.prefix, "github.com/u/r");
    }
}
