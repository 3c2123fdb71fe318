//!
//! civiq HTTP server
//! -----------------
//! Axum API exposing the permission evaluator and the role gate to views.
//!
//! Responsibilities:
//! - Session management with a simple cookie (or bearer token) model.
//! - Login/logout backed by the user directory.
//! - `GET /me` for `is_authenticated`, `POST /permissions/check` for permission checks,
//!   `GET /gate` for page-level role gating.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{
    parse_role_list, CommuneId, GateOutcome, Permission, PermissionEvaluator, RequestContext, RoleGate,
    RolePermissionTable, SessionManager, SessionSource, SessionState, UserDirectory,
};

pub const SESSION_COOKIE: &str = "civiq_session";
const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: PermissionEvaluator,
    pub directory: Arc<UserDirectory>,
    pub sessions: SessionManager,
    /// Where denied gate checks send the browser
    pub gate_redirect: String,
}

impl AppState {
    /// Load the permission table and user directory named by `cfg`.
    pub fn from_config(cfg: &Config) -> AppResult<Self> {
        let table = match &cfg.permissions_file {
            Some(p) => RolePermissionTable::load(p)?,
            None => RolePermissionTable::builtin(),
        };
        let directory = match &cfg.users_file {
            Some(p) => UserDirectory::load(p)?,
            None => {
                warn!(target: "startup", "no users file configured; every login will fail");
                UserDirectory::default()
            }
        };
        Ok(Self {
            evaluator: PermissionEvaluator::new(table).with_policy(cfg.scope_policy),
            directory: Arc::new(directory),
            sessions: SessionManager::new(cfg.session_ttl),
            gate_redirect: cfg.gate_redirect.clone(),
        })
    }

    fn request_context(&self, headers: &HeaderMap) -> RequestContext {
        let user = match self.session_state(headers) {
            SessionState::Resolved(user) => user,
            _ => None,
        };
        RequestContext::for_user(user)
    }

    fn session_state(&self, headers: &HeaderMap) -> SessionState {
        match session_token(headers) {
            Some(token) => self.sessions.lookup(&token),
            None => SessionState::Resolved(None),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "civiq ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/permissions/check", post(check_permission))
        .route("/gate", get(gate))
        .with_state(state)
}

/// Serve on an already bound listener. Used by `run` and by tests binding port 0.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await.context("http server failed")
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg).map_err(|e| anyhow::anyhow!(e))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!(
        target: "startup",
        "civiq listening on {}: users={}, session_ttl_secs={}, strict_zero_commune={}",
        addr,
        state.directory.len(),
        cfg.session_ttl.as_secs(),
        cfg.scope_policy.strict_zero
    );
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            sessions.prune_expired(Utc::now());
        }
    });
    serve(listener, state).await
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(json!({"status": "error", "code": self.code_str(), "message": self.message()}))).into_response()
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let s = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in s.split(';') {
        if let Some((k, v)) = part.trim().split_once('=') {
            if k == name { return Some(v.to_string()); }
        }
    }
    None
}

/// Auth scheme names are case-insensitive (RFC 9110 11.1).
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, tok) = value.trim().split_once(' ')?;
    let tok = tok.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !tok.is_empty()).then(|| tok.to_string())
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| parse_cookie(headers, SESSION_COOKIE))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rej| AppError::user("invalid_json".to_string(), rej.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(v)| v)
        .map_err(|rej| AppError::user("invalid_query".to_string(), rej.body_text()))
}

fn set_session_cookie(token: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, token))
        .map_err(|e| AppError::internal("cookie".to_string(), e.to_string()))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("civiq_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/")
}

#[derive(Debug, Deserialize)]
struct LoginPayload { user_id: String, password: String }

#[derive(Debug, Deserialize)]
struct CheckPayload {
    permission: String,
    #[serde(default)]
    commune_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GateQuery {
    #[serde(default)]
    roles: String,
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> AppResult<Response> {
    let payload = json_body(payload)?;
    let Some(user) = state.directory.authenticate(&payload.user_id, &payload.password)? else {
        warn!(target: "civiq::auth", user = %payload.user_id, "login rejected");
        return Err(AppError::auth("invalid_credentials", "invalid user id or password"));
    };
    let session = state.sessions.issue(user)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, set_session_cookie(&session.token)?);
    let body = json!({
        "status": "ok",
        "token": session.token,
        "role": session.user.role,
        "commune_id": session.user.commune_id,
        "expires_at": session.expires_at.to_rfc3339(),
    });
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.logout(&token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status": "ok"})))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ctx = state.request_context(&headers);
    match &ctx.user {
        Some(u) => Json(json!({
            "is_authenticated": true,
            "user_id": u.user_id,
            "role": u.role,
            "commune_id": u.commune_id,
        })),
        None => Json(json!({"is_authenticated": false})),
    }
}

async fn check_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CheckPayload>, JsonRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let payload = json_body(payload)?;
    let permission: Permission = payload.permission.parse()?;
    let ctx = state.request_context(&headers);
    let decision = state.evaluator.decide(ctx.user.as_ref(), permission, payload.commune_id.map(CommuneId));
    info!(
        target: "civiq::authz",
        request_id = %ctx.request_id,
        permission = %permission,
        allowed = decision.allowed,
        reason = decision.reason.as_str(),
        "permission check"
    );
    Ok(Json(json!({
        "allowed": decision.allowed,
        "reason": decision.reason,
        "is_authenticated": ctx.is_authenticated(),
    })))
}

async fn gate(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<GateQuery>, QueryRejection>,
) -> AppResult<Response> {
    let q = query_params(query)?;
    let roles = parse_role_list(&q.roles)?;
    let gate = RoleGate::new(roles).redirect_to(state.gate_redirect.clone());
    let resp = match gate.evaluate(&state.session_state(&headers)) {
        GateOutcome::Granted => (StatusCode::OK, Json(json!({"outcome": "granted"}))).into_response(),
        // Session lookups here are synchronous; only an async SessionSource yields Pending.
        GateOutcome::Pending => (StatusCode::ACCEPTED, Json(json!({"outcome": "pending"}))).into_response(),
        GateOutcome::Denied { redirect_to } => Redirect::to(&redirect_to).into_response(),
    };
    Ok(resp)
}
