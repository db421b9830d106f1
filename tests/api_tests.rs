// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP API tests.
//!
//! These tests verify that:
//! 1. Social routes reject callers without a valid token
//! 2. A required provider login becomes a 303 with a sealed continuation
//! 3. The callback completes authentication and replays the operation
//! 4. Error variants map to the documented status codes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use social_connect::db::CredentialStore;
use social_connect::middleware::auth::{create_jwt, SESSION_COOKIE};
use social_connect::models::{Credential, PendingOperation};
use tower::ServiceExt;

mod common;
use common::{create_test_app, fb_user, session_tokens};

fn token_for(state: &social_connect::AppState, user_id: &str) -> String {
    create_jwt(user_id, &state.config.jwt_signing_key).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_state_from_config_memory_backend() {
    let (_, _, harness) = create_test_app();
    let state = social_connect::AppState::from_config(
        social_connect::config::Config::test_default(),
        harness.connector.clone(),
    )
    .await
    .unwrap();
    let app = social_connect::routes::create_router(std::sync::Arc::new(state));

    let (status, _, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, _) = send(&app, get("/api/platforms", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = create_test_app();
    let (status, _, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requires_token() {
    let (app, _, _) = create_test_app();
    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri("/api/accounts")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, get("/api/accounts", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_in_cookie() {
    let (app, state, _) = create_test_app();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(
        &app,
        Request::builder()
            .uri("/api/accounts")
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_redirect_response() {
    let (app, state, h) = create_test_app();
    let token = token_for(&state, "alice");

    let (status, headers, body) = send(&app, get("/api/social/fb/profile", &token)).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = headers.get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(
        location,
        "https://www.facebook.test/login.php?api_key=fb-key&v=1.0\
         &next=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fsocial%2Ffb%2Fcallback"
    );
    assert_eq!(body["error"], "redirect_required");
    assert_eq!(body["resume_operation"], "getProfile");
    assert_eq!(body["login_url"], location);

    let continuation = state
        .signer
        .open(body["continuation"].as_str().unwrap())
        .unwrap();
    assert_eq!(continuation.user_id, "alice");
    assert_eq!(continuation.operation, PendingOperation::GetProfile);
    assert_eq!(h.platform().call_count(), 0);
}

#[tokio::test]
async fn test_callback_completes_and_resumes() {
    let (app, state, h) = create_test_app();
    let token = token_for(&state, "alice");
    h.platform().set_friends(vec![fb_user("200", "Bob Jones")]);

    let (status, _, body) = send(
        &app,
        get("/api/social/fb/friends?view=profiles", &token),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let continuation = body["continuation"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        post(
            "/api/social/fb/callback",
            &token,
            json!({
                "tokens": { "type": "session", "token": "sess-100", "expires_at": 0 },
                "remote_id": "100",
                "continuation": continuation,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["account"]["remote_id"], "100");
    assert_eq!(body["resumed"]["result"], "friends");
    assert_eq!(body["resumed"]["data"]["view"], "profiles");
    assert_eq!(body["resumed"]["data"]["friends"][0]["familyName"], "Jones");

    let stored = h.db.find("alice", "fb").await.unwrap().unwrap();
    assert_eq!(stored.tokens.unwrap().token(), "sess-100");

    // The live context is kept for the next request.
    let (status, _, body) = send(&app, get("/api/social/fb/friends?view=ids", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["friends"], json!(["200"]));
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_callback_rejects_foreign_continuation() {
    let (app, state, _) = create_test_app();
    let alice = token_for(&state, "alice");
    let mallory = token_for(&state, "mallory");

    let (_, _, body) = send(&app, get("/api/social/fb/groups", &alice)).await;
    let continuation = body["continuation"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        post(
            "/api/social/fb/callback",
            &mallory,
            json!({
                "tokens": { "type": "session", "token": "s", "expires_at": 0 },
                "remote_id": "666",
                "continuation": continuation,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_callback_token_session_requires_remote_id() {
    let (app, state, _) = create_test_app();
    let token = token_for(&state, "alice");

    let (status, _, _) = send(
        &app,
        post(
            "/api/social/fb/callback",
            &token,
            json!({ "tokens": { "type": "session", "token": "s", "expires_at": 0 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_account_already_linked() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("bob", "fb", "100", session_tokens("b", 0)))
        .await
        .unwrap();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(
        &app,
        post(
            "/api/social/fb/callback",
            &token,
            json!({
                "tokens": { "type": "session", "token": "s", "expires_at": 0 },
                "remote_id": "100",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "account_already_linked");
}

#[tokio::test]
async fn test_identity_mismatch_status() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    *h.connector.session_uid.lock().unwrap() = Some("999".to_string());
    let token = token_for(&state, "alice");

    let (status, _, body) = send(&app, get("/api/social/fb/profile", &token)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "identity_mismatch");
}

#[tokio::test]
async fn test_unsupported_operation_status() {
    let (app, state, _) = create_test_app();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(&app, get("/api/social/os/groups", &token)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_operation");
}

#[tokio::test]
async fn test_unknown_provider() {
    let (app, state, _) = create_test_app();
    let token = token_for(&state, "alice");

    let (status, _, _) = send(&app, get("/api/social/myspace/profile", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_publish_suppressed() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    h.platform().fail_next(340, "Feed story publishing limit");
    let token = token_for(&state, "alice");

    let (status, _, body) = send(
        &app,
        post(
            "/api/social/fb/publish",
            &token,
            json!({ "template_id": "tpl", "template_data": { "a": 1 } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "suppressed");
    assert_eq!(body["code"], 340);
}

#[tokio::test]
async fn test_notifications() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(
        &app,
        post(
            "/api/social/fb/notifications",
            &token,
            json!({ "ids": ["200"], "text": "hi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "user_to_user");

    let (status, _, _) = send(
        &app,
        post(
            "/api/social/fb/notifications",
            &token,
            json!({ "ids": [], "text": "hi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_platforms_and_accounts() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(&app, get("/api/platforms?task=people", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let platforms = body.as_array().unwrap();
    assert_eq!(platforms.len(), 2);
    let fb = platforms.iter().find(|p| p["id"] == "fb").unwrap();
    let os = platforms.iter().find(|p| p["id"] == "os").unwrap();
    assert_eq!(fb["linked"], true);
    assert_eq!(os["linked"], false);

    let (_, _, body) = send(&app, get("/api/platforms?task=groups", &token)).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _, _) = send(&app, get("/api/platforms?task=telepathy", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = send(&app, get("/api/accounts", &token)).await;
    assert_eq!(body[0]["provider_id"], "fb");
    assert!(body[0].get("tokens").is_none());
}

#[tokio::test]
async fn test_unlink() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    let token = token_for(&state, "alice");

    let delete = |token: &str| {
        Request::builder()
            .method("DELETE")
            .uri("/api/social/fb")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, body) = send(&app, delete(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(h.db.find("alice", "fb").await.unwrap().is_none());

    let (status, _, _) = send(&app, delete(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_account_after_link() {
    let (app, state, h) = create_test_app();
    h.db.save(&Credential::new("alice", "fb", "100", session_tokens("a", 0)))
        .await
        .unwrap();
    let token = token_for(&state, "alice");

    let (status, _, body) = send(&app, post("/api/social/fb/sync", &token, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remote_id"], "100");
    assert_eq!(body["provider_id"], "fb");
}
