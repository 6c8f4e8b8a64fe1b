//!
//! curio HTTP server
//! -----------------
//! This module defines the Axum-based JSON API for the catalog.
//!
//! Responsibilities:
//! - Session management with a cookie + per-session anti-forgery token.
//! - Third-party login (connect/disconnect) delegating to the OAuth provider.
//! - Read endpoints for categories and items; mutating endpoints wrapped in
//!   the authentication and ownership gates.
//! - First-run demo catalog seeding.
//!
//! Rendering is plain JSON records; anything fancier is a client concern.

use std::{net::SocketAddr, sync::Arc};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::catalog::{
    seed_demo_catalog, CatalogStore, ItemDraft, ItemFilter, ItemPatch, SharedCatalog,
};
use crate::config::OAuthConfig;
use crate::error::AppError;
use crate::identity::{
    self, with_authentication, with_ownership, ConnectOutcome, GoogleProvider, OAuthProvider,
    SessionManager, LOGIN_PATH,
};

const SESSION_COOKIE: &str = "curio_session";
const LATEST_ITEMS_SHOWN: usize = 10;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: SharedCatalog,
    pub sessions: SessionManager,
    pub provider: Arc<dyn OAuthProvider>,
    /// Our registered client id, checked against token audiences.
    pub client_id: String,
}

/// Start the curio HTTP server bound to the given port.
pub async fn run_with_port(http_port: u16, db_root: &str, oauth: OAuthConfig) -> anyhow::Result<()> {
    let catalog = SharedCatalog::open(db_root)?;
    if let Err(e) = seed_demo_catalog(&catalog) {
        warn!("failed to seed demo catalog: {e}");
    }
    let state = AppState {
        catalog,
        sessions: SessionManager::new(),
        provider: Arc::new(GoogleProvider::new(oauth.clone())),
        client_id: oauth.client_id,
    };
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router; separated from `run_with_port` so tests can
/// drive handlers without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(latest_items))
        .route("/catalog", get(latest_items))
        .route("/catalog.json", get(catalog_json))
        .route("/categories", get(categories))
        .route("/catalog/{category}/items", get(category_items))
        .route("/catalog/{category}/items/{item}", get(item_detail))
        .route(LOGIN_PATH, get(login))
        .route("/oauth/connect", post(oauth_connect))
        .route("/oauth/disconnect", post(oauth_disconnect))
        .route("/catalog/items", post(create_item))
        .route("/catalog/items/{id}", put(update_item).delete(delete_item))
        .with_state(state)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, sid
    ))
    .unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Foreign-owned and absent mutation targets answer identically, so the
/// status code is not an existence oracle for other people's items.
fn conceal_foreign_items(err: AppError) -> AppError {
    match err {
        AppError::Forbidden { .. } => AppError::not_found("item_missing", "no such item"),
        other => other,
    }
}

/// Uniform error body; authentication failures also point at the login
/// entry point.
fn error_response(err: AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = json!({"status": "error", "code": err.code_str(), "message": err.message()});
    if matches!(err, AppError::Auth { .. }) {
        body["login"] = json!(LOGIN_PATH);
    }
    (status, Json(body))
}

async fn latest_items(State(state): State<AppState>) -> impl IntoResponse {
    let guard = state.catalog.0.lock();
    let out = guard.list_categories().and_then(|categories| {
        let items = guard.list_items(ItemFilter::Latest(LATEST_ITEMS_SHOWN))?;
        Ok(json!({"status": "ok", "categories": categories, "items": items}))
    });
    match out {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(e) => error_response(e),
    }
}

async fn catalog_json(State(state): State<AppState>) -> impl IntoResponse {
    let guard = state.catalog.0.lock();
    let out = guard.list_categories().and_then(|categories| {
        let mut nested = Vec::with_capacity(categories.len());
        for c in categories {
            let items = guard.list_items(ItemFilter::InCategory(c.id))?;
            nested.push(json!({"id": c.id, "name": c.name, "items": items}));
        }
        Ok(json!({"status": "ok", "categories": nested}))
    });
    match out {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(e) => error_response(e),
    }
}

async fn categories(State(state): State<AppState>) -> impl IntoResponse {
    let guard = state.catalog.0.lock();
    match guard.list_categories() {
        Ok(categories) => (StatusCode::OK, Json(json!({"status": "ok", "categories": categories}))),
        Err(e) => error_response(e),
    }
}

async fn category_items(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let guard = state.catalog.0.lock();
    let out = guard.category_by_name(&category).and_then(|cat| match cat {
        Some(cat) => guard.list_items(ItemFilter::InCategory(cat.id)),
        // Unknown category is an empty result, not an error
        None => Ok(Vec::new()),
    });
    match out {
        Ok(items) => (StatusCode::OK, Json(json!({"status": "ok", "items": items}))),
        Err(e) => error_response(e),
    }
}

async fn item_detail(
    State(state): State<AppState>,
    Path((category, item)): Path<(String, String)>,
) -> impl IntoResponse {
    let guard = state.catalog.0.lock();
    let out = guard.category_by_name(&category).and_then(|cat| {
        let Some(cat) = cat else { return Ok(None) };
        let found = guard.item_by_name(&item)?;
        Ok(found.filter(|i| i.category_id == cat.id))
    });
    match out {
        Ok(found) => (StatusCode::OK, Json(json!({"status": "ok", "item": found}))),
        Err(e) => error_response(e),
    }
}

/// Login entry point: establish (or refresh) the browser session and hand
/// back the anti-forgery state token for the provider handshake.
async fn login(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    // Reuse an existing session but rotate its state token, matching a
    // fresh visit to the login page.
    if let Some(sid) = parse_cookie(&headers, SESSION_COOKIE) {
        if let Some(token) = state.sessions.rotate_state(&sid) {
            return (StatusCode::OK, HeaderMap::new(), Json(json!({"status": "ok", "state": token})));
        }
    }
    let sess = state.sessions.create();
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", set_session_cookie(&sess.id));
    (StatusCode::OK, h, Json(json!({"status": "ok", "state": sess.state_token})))
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    state: String,
}

#[derive(Debug, Deserialize)]
struct ConnectPayload {
    code: String,
}

async fn oauth_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
    Json(payload): Json<ConnectPayload>,
) -> impl IntoResponse {
    let Some(sid) = parse_cookie(&headers, SESSION_COOKIE) else {
        return error_response(AppError::auth("no_session", "request the login page first"));
    };
    let outcome = identity::connect(
        &state.sessions,
        &state.catalog,
        state.provider.as_ref(),
        &state.client_id,
        &sid,
        &query.state,
        &payload.code,
    )
    .await;
    match outcome {
        Ok(ConnectOutcome::SignedIn(p)) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": format!("you are now logged in as {}", p.name),
                "user": p
            })),
        ),
        Ok(ConnectOutcome::AlreadyConnected(p)) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "current user is already connected",
                "user": p
            })),
        ),
        Err(e) => error_response(e),
    }
}

async fn oauth_disconnect(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(sid) = parse_cookie(&headers, SESSION_COOKIE) else {
        return error_response(AppError::auth("no_session", "current user not connected"));
    };
    match identity::disconnect(&state.sessions, state.provider.as_ref(), &sid).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok", "message": "successfully disconnected"}))),
        Err(e) => error_response(e),
    }
}

async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<ItemDraft>,
) -> impl IntoResponse {
    let ctx = state.sessions.context(parse_cookie(&headers, SESSION_COOKIE).as_deref());
    let out = with_authentication(&ctx, |user_id| {
        let mut guard = state.catalog.0.lock();
        guard.create_item(user_id, &draft)
    });
    match out {
        Ok(item) => (StatusCode::OK, Json(json!({"status": "ok", "item": item}))),
        Err(e) => error_response(e),
    }
}

async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ItemPatch>,
) -> impl IntoResponse {
    let ctx = state.sessions.context(parse_cookie(&headers, SESSION_COOKIE).as_deref());
    let out = with_authentication(&ctx, |_| {
        let mut guard = state.catalog.0.lock();
        let item = guard
            .get_item(id)?
            .ok_or_else(|| AppError::not_found("item_missing", "no such item"))?;
        with_ownership(&ctx, item.owner_id, |_| guard.update_item(id, &patch))
    });
    match out.map_err(conceal_foreign_items) {
        Ok(item) => (StatusCode::OK, Json(json!({"status": "ok", "item": item}))),
        Err(e) => error_response(e),
    }
}

async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let ctx = state.sessions.context(parse_cookie(&headers, SESSION_COOKIE).as_deref());
    let out = with_authentication(&ctx, |_| {
        let mut guard = state.catalog.0.lock();
        let item = guard
            .get_item(id)?
            .ok_or_else(|| AppError::not_found("item_missing", "no such item"))?;
        with_ownership(&ctx, item.owner_id, |_| guard.delete_item(id))
    });
    match out.map_err(conceal_foreign_items) {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok", "deleted": id}))),
        Err(e) => error_response(e),
    }
}
