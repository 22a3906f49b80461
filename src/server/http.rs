//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes::{self, FullBody};
use crate::types::AgoraError;
use crate::verify::{MemoryStore, MongoAccountStore, MongoRequestLedger, WorkflowEngine};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// JWT issue/verify
    pub jwt: JwtValidator,
    /// The verification workflow over the configured stores
    pub engine: WorkflowEngine,
    /// Store backing label, reported by /health
    pub backend: &'static str,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create AppState backed by MongoDB
    pub fn with_mongo(args: Args, jwt: JwtValidator, mongo: MongoClient) -> Self {
        let accounts = Arc::new(MongoAccountStore::new(mongo.clone()));
        let ledger = Arc::new(MongoRequestLedger::new(mongo));

        Self {
            args,
            jwt,
            engine: WorkflowEngine::new(accounts, ledger),
            backend: "mongodb",
            started_at: Instant::now(),
        }
    }

    /// Create AppState backed by the in-memory store (dev mode)
    pub fn in_memory(args: Args, jwt: JwtValidator) -> Self {
        let store = Arc::new(MemoryStore::new());

        Self {
            args,
            jwt,
            engine: WorkflowEngine::new(store.clone(), store),
            backend: "memory",
            started_at: Instant::now(),
        }
    }
}

/// Accept loop
pub async fn run(state: Arc<AppState>) -> Result<(), AgoraError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Agora listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<FullBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // Auth and verification routes consume the request body
    if path.starts_with("/auth") {
        return Ok(routes::handle_auth_request(req, Arc::clone(&state), &path).await);
    }

    if path.starts_with("/verify") {
        return Ok(routes::handle_verify_request(req, Arc::clone(&state), &path).await);
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        _ => routes::not_found_response(&path),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .unwrap()
}
