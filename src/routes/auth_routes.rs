//! HTTP routes for authentication
//!
//! - POST /auth/register       - Create an account and get a JWT token
//! - POST /auth/login          - Authenticate and get a JWT token
//! - GET  /auth/me             - Current account info from token (fresh)
//! - GET  /auth/check/{preset} - Evaluate a named guard preset

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, GuardChain, Role, TokenInput};
use crate::db::schemas::AccountDoc;
use crate::routes::{
    agora_error_response, authorize, error_response, json_response, not_found_response,
    parse_json_body, FullBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub identifier: String,
    pub role: Role,
    pub verified: bool,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub identifier: String,
    pub role: Role,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetCheckResponse {
    pub allowed: bool,
    pub preset: String,
    pub role: Role,
    pub verified: bool,
}

fn account_response(account: &AccountDoc) -> AccountResponse {
    AccountResponse {
        id: account._id.map(|o| o.to_hex()).unwrap_or_default(),
        identifier: account.identifier.clone(),
        role: account.role,
        verified: account.verified,
    }
}

/// Route /auth/* requests
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/auth").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/register") => handle_register(req, state).await,
        (Method::POST, "/login") => handle_login(req, state).await,
        (Method::GET, "/me") => handle_me(req, state).await,
        (Method::GET, p) if p.starts_with("/check/") => {
            let preset = p.trim_start_matches("/check/").to_string();
            handle_check_preset(req, state, &preset).await
        }
        _ => not_found_response(path),
    }
}

/// POST /auth/register - create an account with the starting role
async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return agora_error_response(&e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            Some("INVALID_INPUT"),
        );
    }

    if body.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
            Some("WEAK_PASSWORD"),
        );
    }

    let accounts = state.engine.accounts();

    match accounts.find_by_identifier(&body.identifier).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "An account with this identifier already exists",
                Some("CONFLICT"),
            )
        }
        Ok(None) => {}
        Err(e) => return agora_error_response(&e),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => {
            warn!("Error hashing password: {}", e);
            return agora_error_response(&e);
        }
    };

    let account = AccountDoc::new(body.identifier.clone(), password_hash);
    let id = match accounts.insert(account).await {
        Ok(id) => id,
        Err(e) => return agora_error_response(&e),
    };

    info!("Account registered: {} ({})", body.identifier, id);

    let token = match state.jwt.generate_token(TokenInput {
        account_id: id.to_hex(),
        identifier: body.identifier.clone(),
        role: Role::General,
    }) {
        Ok(t) => t,
        Err(e) => return agora_error_response(&e),
    };

    json_response(
        StatusCode::CREATED,
        &AuthResponse {
            token,
            identifier: body.identifier,
            role: Role::General,
            verified: false,
            expires_in: state.jwt.expiry_seconds(),
        },
    )
}

/// POST /auth/login - verify credentials and issue a token
async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return agora_error_response(&e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            Some("INVALID_INPUT"),
        );
    }

    let account = match state.engine.accounts().find_by_identifier(&body.identifier).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            warn!("Login failed - account not found: {}", body.identifier);
            // Generic error to prevent account enumeration
            return error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid credentials",
                Some("INVALID_CREDENTIALS"),
            );
        }
        Err(e) => return agora_error_response(&e),
    };

    let password_valid = match verify_password(&body.password, &account.password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!("Password verification error: {}", e);
            return agora_error_response(&e);
        }
    };

    if !password_valid {
        warn!("Login failed - invalid password: {}", body.identifier);
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            Some("INVALID_CREDENTIALS"),
        );
    }

    let token = match state.jwt.generate_token(TokenInput {
        account_id: account._id.map(|o| o.to_hex()).unwrap_or_default(),
        identifier: account.identifier.clone(),
        role: account.role,
    }) {
        Ok(t) => t,
        Err(e) => return agora_error_response(&e),
    };

    info!("Login: {} ({})", account.identifier, account.role);

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            identifier: account.identifier,
            role: account.role,
            verified: account.verified,
            expires_in: state.jwt.expiry_seconds(),
        },
    )
}

/// GET /auth/me - current account info, read fresh from the store
async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let ctx = match authorize(&req, &state, &GuardChain::login()).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    match ctx.account {
        Some(account) => json_response(StatusCode::OK, &account_response(&account)),
        None => error_response(
            StatusCode::NOT_FOUND,
            "Account no longer exists",
            Some("NOT_FOUND"),
        ),
    }
}

/// GET /auth/check/{preset} - evaluate a named guard preset for the caller.
/// The guarded operation itself is elsewhere; this endpoint only reports
/// whether the caller would pass.
async fn handle_check_preset(
    req: Request<Incoming>,
    state: Arc<AppState>,
    preset: &str,
) -> Response<FullBody> {
    let chain = match GuardChain::preset(preset) {
        Some(c) => c,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown guard preset: {preset}"),
                Some("INVALID_INPUT"),
            )
        }
    };

    let ctx = match authorize(&req, &state, &chain).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    // Guards passed; account is present for every preset that got here
    // except bare login, where the fresh snapshot may still be gone.
    let (role, verified) = ctx
        .account
        .as_ref()
        .map(|a| (a.role, a.verified))
        .unwrap_or((Role::General, false));

    json_response(
        StatusCode::OK,
        &PresetCheckResponse {
            allowed: true,
            preset: preset.to_string(),
            role,
            verified,
        },
    )
}
