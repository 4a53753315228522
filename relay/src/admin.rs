//! Admin API.
//!
//! Bearer-authenticated management surface on the web listener:
//! server info, active tunnels, and the allowed-domains list. An empty
//! configured admin token rejects everything.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use burrow_shared::auth::{bearer_token, token_matches};

use crate::ServerState;

fn authorized(headers: &HeaderMap, admin_token: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(|token| token_matches(token, admin_token))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
}

pub async fn info(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    Json(json!({ "hostname": state.config.hostname })).into_response()
}

pub async fn tunnels(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    Json(state.registry.list()).into_response()
}

pub async fn list_domains(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    Json(state.domains.list().await).into_response()
}

#[derive(Debug, Deserialize)]
struct AddDomain {
    #[serde(default)]
    domain: String,
}

pub async fn add_domain(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    let Ok(req) = serde_json::from_slice::<AddDomain>(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid JSON").into_response();
    };
    let domain = req.domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return (StatusCode::BAD_REQUEST, "domain required").into_response();
    }
    if let Err(err) = state.domains.add(&domain).await {
        error!("persist domains: {:#}", err);
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    Json(json!({ "status": "ok", "domain": domain })).into_response()
}

/// Catch-all for unknown `/admin` paths so they never fall through to
/// the public proxy.
pub async fn not_found(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    StatusCode::NOT_FOUND.into_response()
}

pub async fn remove_domain(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(domain): Path<String>,
) -> Response {
    if !authorized(&headers, &state.config.admin_token) {
        return unauthorized();
    }
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return (StatusCode::BAD_REQUEST, "domain required").into_response();
    }
    if let Err(err) = state.domains.remove(&domain).await {
        error!("persist domains: {:#}", err);
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}
