//! HTTP routes for the role-verification workflow
//!
//! - POST /verify/requests                 - Submit an elevation request (any authenticated account)
//! - GET  /verify/requests[?status=]       - List requests (admin)
//! - GET  /verify/requests/{id}            - Load one request with requester snapshot (admin)
//! - PUT  /verify/requests/{id}/decision   - Approve or reject a pending request (admin)
//! - POST /verify/requests/{id}/decline    - Reject a pending request (admin)

use bson::oid::ObjectId;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::auth::{GuardChain, Role};
use crate::db::schemas::{AccountDoc, RequestStatus, VerifyRequestDoc};
use crate::routes::{
    agora_error_response, authorize, error_response, json_response, not_found_response,
    parse_json_body, FullBody,
};
use crate::server::AppState;
use crate::types::AgoraError;
use crate::verify::Decision;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub requested_role: String,
    pub document_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub status: String,
}

/// Wire representation of a verification request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub requester: String,
    pub requested_role: Role,
    pub document_ref: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Requester account snapshot attached to single-request reads
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterSnapshot {
    pub id: String,
    pub identifier: String,
    pub role: Role,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: RequestView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_account: Option<RequesterSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<RequestDetail>,
    pub count: usize,
}

impl RequestView {
    fn from_doc(doc: &VerifyRequestDoc) -> Self {
        Self {
            id: doc._id.map(|o| o.to_hex()).unwrap_or_default(),
            requester: doc.requester.to_hex(),
            requested_role: doc.requested_role,
            document_ref: doc.document_ref.clone(),
            status: doc.status,
            created_at: doc.metadata.created_at.map(|t| t.try_to_rfc3339_string().unwrap_or_default()),
            updated_at: doc.metadata.updated_at.map(|t| t.try_to_rfc3339_string().unwrap_or_default()),
        }
    }
}

impl RequesterSnapshot {
    fn from_account(account: &AccountDoc) -> Self {
        Self {
            id: account._id.map(|o| o.to_hex()).unwrap_or_default(),
            identifier: account.identifier.clone(),
            role: account.role,
            verified: account.verified,
        }
    }
}

fn parse_object_id(raw: &str) -> Result<ObjectId, AgoraError> {
    ObjectId::parse_str(raw)
        .map_err(|_| AgoraError::InvalidInput(format!("invalid request id: {raw}")))
}

/// Route /verify/* requests
pub async fn handle_verify_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/verify").unwrap_or("");

    // Query string is carried separately from the path by the router
    let query = req.uri().query().map(|q| q.to_string());

    match (method, subpath) {
        (Method::POST, "/requests") => handle_submit(req, state).await,
        (Method::GET, "/requests") => handle_list(req, state, query.as_deref()).await,
        (Method::GET, p) if p.starts_with("/requests/") && !p.contains("/decision") => {
            let id = p.trim_start_matches("/requests/").to_string();
            handle_get(req, state, &id).await
        }
        (Method::PUT, p) if p.starts_with("/requests/") && p.ends_with("/decision") => {
            let id = p
                .trim_start_matches("/requests/")
                .trim_end_matches("/decision")
                .to_string();
            handle_decide(req, state, &id).await
        }
        (Method::POST, p) if p.starts_with("/requests/") && p.ends_with("/decline") => {
            let id = p
                .trim_start_matches("/requests/")
                .trim_end_matches("/decline")
                .to_string();
            handle_decline(req, state, &id).await
        }
        _ => not_found_response(path),
    }
}

/// POST /verify/requests - submit an elevation request for the caller
async fn handle_submit(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let ctx = match authorize(&req, &state, &GuardChain::login()).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    let requester = match ctx.account.as_ref().and_then(|a| a._id) {
        Some(id) => id,
        None => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Account no longer exists",
                Some("NOT_FOUND"),
            )
        }
    };

    let body: SubmitRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return agora_error_response(&e),
    };

    let requested_role: Role = match body.requested_role.parse() {
        Ok(r) => r,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown role: {}", body.requested_role),
                Some("INVALID_INPUT"),
            )
        }
    };

    match state
        .engine
        .submit(requester, requested_role, &body.document_ref)
        .await
    {
        Ok(request) => json_response(StatusCode::CREATED, &RequestView::from_doc(&request)),
        Err(e) => agora_error_response(&e),
    }
}

/// GET /verify/requests[?status=] - list requests for admin review
async fn handle_list(
    req: Request<Incoming>,
    state: Arc<AppState>,
    query: Option<&str>,
) -> Response<FullBody> {
    if let Err(resp) = authorize(&req, &state, &GuardChain::admin()).await {
        return resp;
    }

    let status = match status_filter(query) {
        Ok(s) => s,
        Err(e) => return agora_error_response(&e),
    };

    let requests = match state.engine.list(status).await {
        Ok(requests) => requests,
        Err(e) => return agora_error_response(&e),
    };

    let mut details = Vec::with_capacity(requests.len());
    for request in &requests {
        details.push(RequestDetail {
            request: RequestView::from_doc(request),
            requester_account: requester_snapshot(&state, request.requester).await,
        });
    }

    json_response(
        StatusCode::OK,
        &RequestListResponse {
            count: details.len(),
            requests: details,
        },
    )
}

/// Load a fresh requester snapshot, absent when the account is gone
async fn requester_snapshot(state: &AppState, id: ObjectId) -> Option<RequesterSnapshot> {
    match state.engine.accounts().get(id).await {
        Ok(account) => account.as_ref().map(RequesterSnapshot::from_account),
        Err(e) => {
            warn!("Failed to load requester snapshot for {}: {}", id, e);
            None
        }
    }
}

/// Parse an optional `status=` filter from the query string
fn status_filter(query: Option<&str>) -> Result<Option<RequestStatus>, AgoraError> {
    let Some(query) = query else {
        return Ok(None);
    };

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("status=") {
            let decoded = urlencoding::decode(value)
                .map_err(|_| AgoraError::InvalidInput("malformed query string".into()))?;
            return Ok(Some(decoded.parse()?));
        }
    }

    Ok(None)
}

/// GET /verify/requests/{id} - single request plus a fresh requester snapshot
async fn handle_get(req: Request<Incoming>, state: Arc<AppState>, id: &str) -> Response<FullBody> {
    if let Err(resp) = authorize(&req, &state, &GuardChain::admin()).await {
        return resp;
    }

    let oid = match parse_object_id(id) {
        Ok(oid) => oid,
        Err(e) => return agora_error_response(&e),
    };

    let request = match state.engine.get(oid).await {
        Ok(r) => r,
        Err(e) => return agora_error_response(&e),
    };

    // The requester may have been deleted since submission; surface the
    // request anyway with the snapshot absent.
    let requester_account = requester_snapshot(&state, request.requester).await;

    json_response(
        StatusCode::OK,
        &RequestDetail {
            request: RequestView::from_doc(&request),
            requester_account,
        },
    )
}

/// PUT /verify/requests/{id}/decision - apply an admin decision
async fn handle_decide(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    if let Err(resp) = authorize(&req, &state, &GuardChain::admin()).await {
        return resp;
    }

    let oid = match parse_object_id(id) {
        Ok(oid) => oid,
        Err(e) => return agora_error_response(&e),
    };

    let body: DecisionRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return agora_error_response(&e),
    };

    let decision: Decision = match body.status.parse() {
        Ok(d) => d,
        Err(e) => return agora_error_response(&e),
    };

    match state.engine.decide(oid, decision).await {
        Ok(request) => json_response(StatusCode::OK, &RequestView::from_doc(&request)),
        Err(e) => agora_error_response(&e),
    }
}

/// POST /verify/requests/{id}/decline - reject shorthand, same transition
/// as an explicit rejected decision
async fn handle_decline(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    if let Err(resp) = authorize(&req, &state, &GuardChain::admin()).await {
        return resp;
    }

    let oid = match parse_object_id(id) {
        Ok(oid) => oid,
        Err(e) => return agora_error_response(&e),
    };

    match state.engine.decline(oid).await {
        Ok(request) => json_response(StatusCode::OK, &RequestView::from_doc(&request)),
        Err(e) => agora_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filter_parses() {
        assert_eq!(
            status_filter(Some("status=pending")).unwrap(),
            Some(RequestStatus::Pending)
        );
        assert_eq!(
            status_filter(Some("status=APPROVED")).unwrap(),
            Some(RequestStatus::Approved)
        );
        assert_eq!(status_filter(None).unwrap(), None);
        assert_eq!(status_filter(Some("other=1")).unwrap(), None);
    }

    #[test]
    fn test_status_filter_rejects_unknown() {
        assert!(status_filter(Some("status=banana")).is_err());
    }
}
