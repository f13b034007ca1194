//! JSON-RPC 2.0 transport for the depgraph engine (§6): line-delimited JSON
//! over either a TCP socket or a Unix-domain socket, with server-initiated
//! push notifications multiplexed onto the same connection.

use dg_api::event::Event;
use dg_api::request::RequestPayload;
use dg_api::response::ResponsePayload;
use dg_api::{Error, ErrorCode, Request, Response};
use dg_engine::telemetry::{new_request_id, RequestSpan};
use dg_engine::{Engine, EventSink};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Mutex;
use tracing::Instrument;

/// Per-listener policy: the write token mutating methods must carry, if
/// any is configured (§6 "Write-token carriage").
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    pub write_token: Option<String>,
}

/// Runs a JSON-RPC server over TCP until the listener errors. Each
/// connection is handled on its own task; the function itself only
/// returns on a bind or accept failure.
pub async fn serve_tcp(engine: Engine, addr: SocketAddr, config: RpcConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "depgraph rpc listening on tcp");
    let config = Arc::new(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        let engine = engine.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            if let Err(e) = handle_connection(read_half, write_half, engine, config).await {
                tracing::warn!(%peer, error = %e, "rpc connection ended with an io error");
            }
        });
    }
}

/// Runs a JSON-RPC server over a Unix-domain socket. Replaces a stale
/// socket file left behind by a previous run.
pub async fn serve_unix(engine: Engine, path: &Path, config: RpcConfig) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    tracing::info!(path = %path.display(), "depgraph rpc listening on unix socket");
    let config = Arc::new(config);
    loop {
        let (stream, _peer) = listener.accept().await?;
        let engine = engine.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            if let Err(e) = handle_connection(read_half, write_half, engine, config).await {
                tracing::warn!(error = %e, "rpc connection ended with an io error");
            }
        });
    }
}

/// Reads newline-delimited JSON requests off `read_half` and dispatches
/// each one to its own task, so one slow `Update` doesn't stall other
/// in-flight requests on the same connection. `write_half` is shared under
/// a mutex between response writes and the push-notification sink handed
/// to the engine for mutating methods.
async fn handle_connection<R, W>(read_half: R, write_half: W, engine: Engine, config: Arc<RpcConfig>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(write_half));
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let engine = engine.clone();
        let config = config.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let response = dispatch_line(&engine, &config, &line, &writer).await;
            write_frame(&writer, &response).await;
        });
    }
    Ok(())
}

fn check_token(config: &RpcConfig, token: Option<&str>) -> std::result::Result<(), Error> {
    match (&config.write_token, token) {
        (None, _) => Ok(()),
        (Some(expected), Some(got)) if expected == got => Ok(()),
        (Some(_), Some(_)) => Err(Error::new(ErrorCode::AuthRequired, "write token does not match")),
        (Some(_), None) => Err(Error::new(ErrorCode::AuthMissing, "write token required for this method")),
    }
}

/// Parses one request line, checks the write token when the method
/// mutates, runs it against the engine, and builds the response envelope.
/// A malformed line never panics the connection: it becomes an
/// `invalid_request` response against a best-effort id.
async fn dispatch_line<W: AsyncWrite + Unpin + Send + 'static>(
    engine: &Engine,
    config: &RpcConfig,
    line: &str,
    writer: &Arc<Mutex<W>>,
) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response {
                id: "unknown".to_string(),
                result: Err(Error::new(ErrorCode::InvalidRequest, format!("malformed request: {e}"))),
            };
        }
    };

    if request.payload.mutates() {
        if let Err(e) = check_token(config, request.token.as_deref()) {
            return Response { id: request.id, result: Err(e) };
        }
    }

    let sink_writer = writer.clone();
    let events = EventSink::new(move |event: Event| {
        let sink_writer = sink_writer.clone();
        tokio::spawn(async move { write_frame(&sink_writer, &event).await });
    });

    let request_id = new_request_id();
    let span = RequestSpan::new(&request_id, &request.payload.subject(), request.payload.method_name());
    let result = dispatch(engine, request.payload, events).instrument(span.enter()).await;
    Response { id: request.id, result }
}

async fn dispatch(engine: &Engine, payload: RequestPayload, events: EventSink) -> std::result::Result<ResponsePayload, Error> {
    match payload {
        RequestPayload::Update(params) => engine.update(params, Some(&events)).await.map(ResponsePayload::Update),
        RequestPayload::Scan(params) => engine.scan(params, Some(events)).await.map(ResponsePayload::Scan),
        RequestPayload::Rank(params) => engine.rank(params, Some(&events)).map(ResponsePayload::Rank),
        RequestPayload::Remove(params) => engine.remove(params, Some(&events)).map(ResponsePayload::Remove),
        RequestPayload::Match(params) => engine.match_query(params).map(ResponsePayload::Match),
        RequestPayload::Reverse(params) => engine.reverse(params).map(ResponsePayload::Reverse),
        RequestPayload::Resolve(params) => engine.resolve(params).await.map(ResponsePayload::Resolve),
        RequestPayload::RepoStatus(params) => engine.repo_status(params).map(ResponsePayload::RepoStatus),
    }
}

/// Serializes `value` as one line and writes it under the connection's
/// write mutex, so a response and a concurrently-emitted push notification
/// never interleave mid-line.
async fn write_frame<W, T>(writer: &Arc<Mutex<W>>, value: &T)
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize rpc frame");
            return;
        }
    };
    let mut w = writer.lock().await;
    if w.write_all(json.as_bytes()).await.is_err() {
        return;
    }
    if w.write_all(b"\n").await.is_err() {
        return;
    }
    let _ = w.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_api::request::{MatchParams, RepoStatusParams, UpdateParams};
    use dg_api::{ApiVersion, Paging};
    use dg_engine::EngineConfig;
    use dg_fixtures::{chain_repo, FixtureLoader, FixtureVcs, MemoryKv};
    use dg_graph::Graph;
    use dg_loader::Loader;
    use dg_repostore::{RepoStore, RepoStoreConfig};
    use dg_vcs::{RemoteRef, VcsClient};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpStream;

    /// Builds an engine and runs one `Update` against a seeded
    /// `FixtureVcs`/`FixtureLoader` pair so tests have a real row to query,
    /// without reaching into `Engine`'s crate-private fields.
    async fn test_engine() -> Engine {
        let graph = Graph::new(Arc::new(MemoryKv::new()));
        let refs = vec![RemoteRef { digest: "deadbeef".to_string(), name: "refs/heads/master".to_string() }];
        let repostore_vcs = FixtureVcs::new().with_refs("https://example.com/r", refs);
        let repostore = RepoStore::new(Arc::new(MemoryKv::new()), Arc::new(repostore_vcs), RepoStoreConfig::default());
        let vcs: Arc<dyn VcsClient> = Arc::new(FixtureVcs::new());
        let repo = chain_repo("fixture", "https://example.com/r", &["example.com/r/a"]);
        let loader: Arc<dyn Loader> = Arc::new(FixtureLoader::new(vec![repo]));
        let config = EngineConfig { work_dir: std::env::temp_dir(), error_limit: None, task_timeout: Duration::from_secs(5) };
        let engine = Engine::new(graph, repostore, vcs, loader, config);

        engine
            .update(
                UpdateParams {
                    repository: "https://example.com/r".to_string(),
                    reference: None,
                    check_only: false,
                    reset: false,
                    force: false,
                    prefix: None,
                    loader_options: Default::default(),
                },
                None,
            )
            .await
            .unwrap();
        engine
    }

    async fn request_response(addr: SocketAddr, request: &Request) -> Response {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut line = serde_json::to_string(request).unwrap();
        line.push('\n');
        stream.write_all(line.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if buf.contains(&b'\n') || n == 0 {
                break;
            }
        }
        let line = String::from_utf8(buf).unwrap();
        serde_json::from_str(line.lines().next().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn read_only_method_succeeds_without_a_token() {
        let engine = test_engine().await;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        let listener = TcpListener::from_std(listener).unwrap();
        let config = Arc::new(RpcConfig::default());
        tokio::spawn({
            let engine = engine.clone();
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    let engine = engine.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let (r, w) = stream.into_split();
                        let _ = handle_connection(r, w, engine, config).await;
                    });
                }
            }
        });

        let request = Request {
            version: ApiVersion::V0,
            id: "1".to_string(),
            token: None,
            payload: RequestPayload::RepoStatus(RepoStatusParams { repository: "https://nowhere.example".to_string() }),
        };
        let response = request_response(addr, &request).await;
        assert_eq!(response.id, "1");
        assert!(response.result.is_err());
        assert_eq!(response.result.unwrap_err().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn mutating_method_without_token_is_rejected_when_one_is_configured() {
        let engine = test_engine().await;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        let listener = TcpListener::from_std(listener).unwrap();
        let config = Arc::new(RpcConfig { write_token: Some("s3cret".to_string()) });
        tokio::spawn({
            let engine = engine.clone();
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    let engine = engine.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let (r, w) = stream.into_split();
                        let _ = handle_connection(r, w, engine, config).await;
                    });
                }
            }
        });

        let request = Request {
            version: ApiVersion::V0,
            id: "2".to_string(),
            token: None,
            payload: RequestPayload::Remove(dg_api::request::RemoveParams::default()),
        };
        let response = request_response(addr, &request).await;
        let err = response.result.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthMissing);
        assert_eq!(err.rpc_code, 400);
    }

    #[tokio::test]
    async fn match_over_the_wire_returns_the_seeded_row() {
        let engine = test_engine().await;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        let listener = TcpListener::from_std(listener).unwrap();
        let config = Arc::new(RpcConfig::default());
        tokio::spawn({
            let engine = engine.clone();
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    let engine = engine.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let (r, w) = stream.into_split();
                        let _ = handle_connection(r, w, engine, config).await;
                    });
                }
            }
        });

        let request = Request {
            version: ApiVersion::V0,
            id: "3".to_string(),
            token: None,
            payload: RequestPayload::Match(MatchParams {
                package: Some("example.com/r/a".to_string()),
                repository: None,
                paging: Paging::default(),
                count_only: false,
            }),
        };
        let response = request_response(addr, &request).await;
        match response.result.unwrap() {
            ResponsePayload::Match(result) => assert_eq!(result.count, 1),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
