//! HTTP routes for Agora

pub mod auth_routes;
pub mod health;
pub mod verification;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{CallerContext, GuardChain};
use crate::server::AppState;
use crate::types::AgoraError;

pub use auth_routes::handle_auth_request;
pub use health::{health_check, version_info};
pub use verification::handle_verify_request;

pub type FullBody = Full<Bytes>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Map a domain error to its JSON error response
pub fn agora_error_response(err: &AgoraError) -> Response<FullBody> {
    error_response(err.status_code(), &err.to_string(), Some(err.code()))
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {path}"),
        None,
    )
}

/// Collect and deserialize a JSON request body
pub async fn parse_json_body<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, AgoraError> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| AgoraError::InvalidInput(format!("Failed to read body: {e}")))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| AgoraError::InvalidInput(format!("Invalid JSON body: {e}")))
}

fn auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the caller and evaluate a guard chain before a handler runs.
/// A guard failure produces the response directly so the handler body is
/// never reached.
#[allow(clippy::result_large_err)]
pub async fn authorize<B>(
    req: &Request<B>,
    state: &Arc<AppState>,
    chain: &GuardChain,
) -> Result<CallerContext, Response<FullBody>> {
    let ctx = CallerContext::resolve(
        auth_header(req),
        &state.jwt,
        state.engine.accounts().as_ref(),
    )
    .await
    .map_err(|e| agora_error_response(&e))?;

    chain
        .evaluate(&ctx)
        .map_err(|e| agora_error_response(&e))?;

    Ok(ctx)
}
