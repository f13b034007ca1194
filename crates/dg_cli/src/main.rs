//! Thin CLI for depgraph that maps subcommands onto `dg_engine` calls (or,
//! for `serve`, onto the `dg_rpc` front-end).
//!
//! By default, it outputs JSON for machine consumption. Use --pretty for
//! human-readable output.

use clap::{Parser, Subcommand};
use dg_api::request::{
    LoaderOptions, MatchParams, RankParams, RemoveParams, RepoStatusParams, ResolveParams, ReverseParams, ScanParams,
    UpdateParams,
};
use dg_api::{Concurrency, Cursor, Damping, Iterations, PageSize, Paging, SampleRate};
use dg_engine::{Engine, EngineConfig, EventSink};
use dg_graph::Graph;
use dg_repostore::{RepoStore, RepoStoreConfig};
use dg_rpc::RpcConfig;
use dg_vcs::CliVcs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "depgraph")]
#[command(about = "Incrementally-updated dependency graph service over public source repositories")]
#[command(version)]
struct Cli {
    /// RepoStore KV directory
    #[arg(long, global = true, env = "DEPSERVER_REPO_DB", default_value = "./depgraph-data/repos")]
    repo_db: PathBuf,

    /// Graph KV directory
    #[arg(long, global = true, env = "DEPSERVER_GRAPH_DB", default_value = "./depgraph-data/graph")]
    graph_db: PathBuf,

    /// Scratch directory for in-flight clones
    #[arg(long, global = true, env = "DEPSERVER_WORK_DIR", default_value = "./depgraph-data/work")]
    work_dir: PathBuf,

    /// Write token mutating methods must carry (unset disables the check)
    #[arg(long, global = true, env = "DEPSERVER_WRITE_TOKEN")]
    write_token: Option<String>,

    /// Listen address for `serve` (ignored by every other subcommand)
    #[arg(long, global = true, env = "DEPSERVER_ADDR", default_value = "127.0.0.1:7000")]
    addr: String,

    /// Output pretty-printed JSON instead of compact JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Log filter (e.g., debug, dg_engine=trace, dg_vcs=debug)
    #[arg(long, global = true)]
    log: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Incrementally update one repository (§4.3)
    Update {
        repository: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        check_only: bool,
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        hash_source_files: bool,
        #[arg(long)]
        use_import_comments: bool,
        #[arg(long)]
        trim_repo_prefix: bool,
        #[arg(long)]
        standard_library: bool,
        #[arg(long)]
        package_prefix: Option<String>,
    },
    /// Sweep every known repository and update the eligible ones (§4.4)
    Scan {
        #[arg(long, default_value = "8")]
        concurrency: u32,
        #[arg(long, default_value = "1.0")]
        sample_rate: f64,
        #[arg(long, default_value = "0")]
        min_interval_secs: u64,
        #[arg(long)]
        log_updates: bool,
        #[arg(long)]
        log_errors: bool,
    },
    /// Recompute PageRank over the whole graph (§4.5)
    Rank {
        #[arg(long, default_value = "10")]
        iterations: u32,
        #[arg(long, default_value = "0.85")]
        damping: f64,
        #[arg(long, default_value = "4")]
        scale: u32,
        /// Persist the computed ranking back onto each package row
        #[arg(long)]
        update: bool,
    },
    /// Remove repositories and/or packages from the graph (§4.6)
    Remove {
        #[arg(long)]
        repository: Vec<String>,
        #[arg(long)]
        package: Vec<String>,
        #[arg(long)]
        keep_packages: bool,
    },
    /// Find packages by name and/or repository (§4.6)
    Match {
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        repository: Option<String>,
        #[arg(long, default_value = "")]
        page_key: String,
        #[arg(long, default_value = "100")]
        limit: u32,
        #[arg(long)]
        count_only: bool,
    },
    /// Find importers of a package, optionally filtered (§4.6)
    Reverse {
        package: String,
        #[arg(long)]
        skip_intra_repo: bool,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value = "")]
        page_key: String,
        #[arg(long, default_value = "100")]
        limit: u32,
    },
    /// Resolve a vanity import path to its backing repository (§4.6)
    Resolve { package: String },
    /// Report the persisted check/error state for one repository (§4.6)
    Status { repository: String },
    /// Start the JSON-RPC front-end
    Serve {
        /// Listen on a Unix-domain socket at this path instead of TCP
        #[arg(long)]
        unix_socket: Option<PathBuf>,
    },
}

fn build_engine(cli: &Cli) -> Result<Engine, Box<dyn std::error::Error>> {
    let repo_kv = Arc::new(dg_kv::SledKv::open_read_write(&cli.repo_db)?);
    let graph_kv = Arc::new(dg_kv::SledKv::open_read_write(&cli.graph_db)?);
    let vcs = Arc::new(CliVcs::new());
    let loader = Arc::new(dg_loader::ReferenceLoader);
    let repostore = RepoStore::new(repo_kv, vcs.clone(), RepoStoreConfig::default());
    let graph = Graph::new(graph_kv);
    let config = EngineConfig { work_dir: cli.work_dir.clone(), ..EngineConfig::default() };
    Ok(Engine::new(graph, repostore, vcs, loader, config))
}

/// Every CLI invocation opts into push notifications; since there is no
/// persistent connection to carry them over, they go to the log instead.
fn logging_event_sink() -> EventSink {
    EventSink::new(|event| tracing::info!(?event, "depgraph event"))
}

fn print_json(value: &impl serde::Serialize, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let json = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    writeln!(io::stdout(), "{json}")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    dg_engine::telemetry::init_telemetry(cli.log.as_deref(), cli.log_json);

    if let Commands::Serve { unix_socket } = &cli.command {
        let engine = build_engine(&cli)?;
        let rpc_config = RpcConfig { write_token: cli.write_token.clone() };
        if let Some(path) = unix_socket {
            dg_rpc::serve_unix(engine, path, rpc_config).await?;
        } else {
            let addr: SocketAddr = cli.addr.parse()?;
            dg_rpc::serve_tcp(engine, addr, rpc_config).await?;
        }
        return Ok(());
    }

    let engine = build_engine(&cli)?;
    let pretty = cli.pretty;

    match cli.command {
        Commands::Update {
            repository,
            reference,
            check_only,
            reset,
            force,
            prefix,
            hash_source_files,
            use_import_comments,
            trim_repo_prefix,
            standard_library,
            package_prefix,
        } => {
            let params = UpdateParams {
                repository,
                reference,
                check_only,
                reset,
                force,
                prefix,
                loader_options: LoaderOptions {
                    hash_source_files,
                    use_import_comments,
                    trim_repo_prefix,
                    standard_library,
                    package_prefix,
                },
            };
            let sink = logging_event_sink();
            let result = engine.update(params, Some(&sink)).await;
            print_json(&result, pretty)?;
        }
        Commands::Scan { concurrency, sample_rate, min_interval_secs, log_updates, log_errors } => {
            let params = ScanParams {
                concurrency: Concurrency::try_from(concurrency)?,
                sample_rate: SampleRate::try_from(sample_rate)?,
                min_interval_secs,
                log_updates,
                log_errors,
            };
            let sink = logging_event_sink();
            let result = engine.scan(params, Some(sink)).await;
            print_json(&result, pretty)?;
        }
        Commands::Rank { iterations, damping, scale, update } => {
            let params = RankParams {
                iterations: Iterations::try_from(iterations)?,
                damping: Damping::try_from(damping)?,
                scale,
                update,
            };
            let sink = logging_event_sink();
            let result = engine.rank(params, Some(&sink));
            print_json(&result, pretty)?;
        }
        Commands::Remove { repository, package, keep_packages } => {
            let params = RemoveParams { repositories: repository, packages: package, keep_packages };
            let sink = logging_event_sink();
            let result = engine.remove(params, Some(&sink));
            print_json(&result, pretty)?;
        }
        Commands::Match { package, repository, page_key, limit, count_only } => {
            let params = MatchParams {
                package,
                repository,
                paging: Paging { page_key: Cursor::from(page_key), limit: PageSize::try_from(limit)? },
                count_only,
            };
            let result = engine.match_query(params);
            print_json(&result, pretty)?;
        }
        Commands::Reverse { package, skip_intra_repo, filter, page_key, limit } => {
            let params = ReverseParams {
                package,
                skip_intra_repo,
                filter,
                paging: Paging { page_key: Cursor::from(page_key), limit: PageSize::try_from(limit)? },
            };
            let result = engine.reverse(params);
            print_json(&result, pretty)?;
        }
        Commands::Resolve { package } => {
            let result = engine.resolve(ResolveParams { package }).await;
            print_json(&result, pretty)?;
        }
        Commands::Status { repository } => {
            let result = engine.repo_status(RepoStatusParams { repository });
            print_json(&result, pretty)?;
        }
        Commands::Serve { .. } => unreachable!("handled above"),
    }

    Ok(())
}
