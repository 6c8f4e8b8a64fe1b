//! HTTP surface tests: the router is driven in-process with oneshot
//! requests, so cookie handling, status codes and JSON bodies are checked
//! exactly as a client would see them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use curio::catalog::{seed_demo_catalog, CatalogStore, SharedCatalog};
use curio::error::{AppError, AppResult};
use curio::identity::{
    resolve, Credentials, OAuthProvider, Principal, Profile, SessionManager, TokenInfo,
    STATE_TOKEN_LEN,
};
use curio::server::{router, AppState};

/// Provider stub for routes that never reach the provider.
struct NoProvider;

#[async_trait]
impl OAuthProvider for NoProvider {
    async fn exchange_code(&self, _code: &str) -> AppResult<Credentials> {
        Err(AppError::auth("code_exchange_failed", "no provider behind this server"))
    }

    async fn validate_token(&self, _access_token: &str) -> AppResult<TokenInfo> {
        Err(AppError::auth("invalid_token", "no provider behind this server"))
    }

    async fn fetch_profile(&self, _access_token: &str) -> AppResult<Profile> {
        Err(AppError::auth("invalid_token", "no provider behind this server"))
    }

    async fn revoke_token(&self, _access_token: &str) -> AppResult<bool> {
        Ok(false)
    }
}

fn fixture() -> (TempDir, AppState, Router) {
    let tmp = tempdir().unwrap();
    let catalog = SharedCatalog::open(tmp.path()).unwrap();
    seed_demo_catalog(&catalog).unwrap();
    let state = AppState {
        catalog,
        sessions: SessionManager::new(),
        provider: Arc::new(NoProvider),
        client_id: "curio-client-id.apps.example".into(),
    };
    let app = router(state.clone());
    (tmp, state, app)
}

/// Register a user and hand back the cookie value of a session signed in
/// as that user.
fn signed_in(state: &AppState, name: &str, email: &str) -> (String, i64) {
    let user_id = {
        let mut guard = state.catalog.0.lock();
        let profile = Profile { name: name.into(), email: email.into(), picture: None };
        resolve(&mut *guard, &profile).unwrap()
    };
    let sess = state.sessions.create();
    let principal =
        Principal { user_id, name: name.into(), email: email.into(), picture: None };
    assert!(state.sessions.attach_identity(&sess.id, principal, "tok", email));
    (sess.id, user_id)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, sid: Option<&str>, body: Value) -> Request<Body> {
    let mut builder =
        Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(sid) = sid {
        builder = builder.header("cookie", format!("curio_session={sid}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn delete_request(uri: &str, sid: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(sid) = sid {
        builder = builder.header("cookie", format!("curio_session={sid}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn latest_view_serves_the_seeded_catalog() {
    let (_tmp, _state, app) = fixture();
    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["categories"].as_array().unwrap().is_empty());
    assert!(body["items"].as_array().unwrap().len() <= 10);
}

#[tokio::test]
async fn unknown_category_lists_no_items() {
    let (_tmp, _state, app) = fixture();
    let (status, body) = send(&app, get("/catalog/Nowhere/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
}

#[tokio::test]
async fn item_detail_resolves_by_name_and_is_empty_when_unknown() {
    let (_tmp, _state, app) = fixture();

    let (status, body) = send(&app, get("/catalog/Trees/items/Pear")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["name"], "Pear");

    let (status, body) = send(&app, get("/catalog/Trees/items/Nothing")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["item"].is_null());
}

#[tokio::test]
async fn unauthenticated_mutation_points_at_login() {
    let (_tmp, state, app) = fixture();
    let trees = state.catalog.0.lock().category_by_name("Trees").unwrap().unwrap();

    let req = json_request(
        "POST",
        "/catalog/items",
        None,
        json!({"name": "Plum", "category_id": trees.id}),
    );
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "login_required");
    assert_eq!(body["login"], "/login");
}

#[tokio::test]
async fn login_issues_a_cookie_and_a_state_token() {
    let (_tmp, _state, app) = fixture();
    let res = app.clone().oneshot(get("/login")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("curio_session="));
    assert!(cookie.contains("HttpOnly"));

    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["state"].as_str().unwrap().chars().count(), STATE_TOKEN_LEN);
}

#[tokio::test]
async fn a_signed_in_session_can_create_and_read_back_an_item() {
    let (_tmp, state, app) = fixture();
    let (sid, user_id) = signed_in(&state, "Alice", "a@b.com");
    let trees = state.catalog.0.lock().category_by_name("Trees").unwrap().unwrap();

    let req = json_request(
        "POST",
        "/catalog/items",
        Some(&sid),
        json!({"name": "Plum", "description": "stone fruit", "category_id": trees.id}),
    );
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["name"], "Plum");
    assert_eq!(body["item"]["owner_id"], json!(user_id));

    let (status, body) = send(&app, get("/catalog/Trees/items/Plum")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["name"], "Plum");
}

#[tokio::test]
async fn foreign_and_absent_items_answer_alike_on_mutation() {
    let (_tmp, state, app) = fixture();
    // "Pear" belongs to the seed user, not to this session
    let (sid, _) = signed_in(&state, "Alice", "a@b.com");
    let pear = state.catalog.0.lock().item_by_name("Pear").unwrap().unwrap();

    let (foreign_status, foreign_body) =
        send(&app, delete_request(&format!("/catalog/items/{}", pear.id), Some(&sid))).await;
    let (absent_status, absent_body) =
        send(&app, delete_request("/catalog/items/999999", Some(&sid))).await;
    assert_eq!(foreign_status, StatusCode::NOT_FOUND);
    assert_eq!(foreign_status, absent_status);
    assert_eq!(foreign_body["code"], absent_body["code"]);
    assert_eq!(foreign_body["message"], absent_body["message"]);

    let req = json_request(
        "PUT",
        &format!("/catalog/items/{}", pear.id),
        Some(&sid),
        json!({"name": "Mine Now"}),
    );
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The probed item survives untouched
    let kept = state.catalog.0.lock().get_item(pear.id).unwrap().unwrap();
    assert_eq!(kept.name, "Pear");
}
