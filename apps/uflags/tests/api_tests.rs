//! Integration tests for the HTTP management endpoint.
//!
//! Uses axum-test to drive the router in-process.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;
use uflags::api::{AppState, CommandsResponse, HealthResponse, create_router};
use uflags_core::mi::MiReply;
use uflags_core::{ModuleParams, RegistryCell};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Build a server over a registry initialized to `initial`.
fn create_server(initial: u32) -> (TestServer, Arc<RegistryCell>) {
    let cell = Arc::new(RegistryCell::new());
    cell.init(&ModuleParams::with_initial(initial)).unwrap();
    let server = TestServer::new(create_router(AppState::new(Arc::clone(&cell)))).unwrap();
    (server, cell)
}

/// Build a server that requires `key` on `/mi`.
fn create_secured_server(key: &str) -> TestServer {
    let cell = Arc::new(RegistryCell::new());
    cell.init(&ModuleParams::default()).unwrap();
    let state = AppState::new(cell).with_api_key(Some(key.to_string()));
    TestServer::new(create_router(state)).unwrap()
}

fn values(reply: &MiReply) -> Vec<&str> {
    reply.values().collect()
}

// =============================================================================
// HEALTH / LISTING
// =============================================================================

#[tokio::test]
async fn test_health_reports_initialized() {
    let (server, cell) = create_server(0);

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let health = response.json::<HealthResponse>();
    assert_eq!(health.status, "ok");
    assert!(health.initialized);

    cell.destroy();
    let health = server.get("/health").await.json::<HealthResponse>();
    assert!(!health.initialized);
}

#[tokio::test]
async fn test_list_commands() {
    let (server, _cell) = create_server(0);

    let response = server.get("/mi").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let listing = response.json::<CommandsResponse>();
    assert_eq!(
        listing.commands,
        vec!["set_uflag", "reset_uflag", "is_uflag", "get_uflags"]
    );
}

// =============================================================================
// COMMANDS
// =============================================================================

#[tokio::test]
async fn test_set_then_get_uflags() {
    let (server, _cell) = create_server(0);

    let response = server
        .post("/mi/set_uflag")
        .json(&json!({"args": ["8"]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let reply = response.json::<MiReply>();
    assert_eq!(reply.reason, "OK");
    assert!(reply.children.is_empty());

    let reply = server.post("/mi/get_uflags").await.json::<MiReply>();
    assert_eq!(reply.code, 200);
    assert_eq!(values(&reply), vec!["0x8", "8"]);
}

#[tokio::test]
async fn test_reset_uflag_accepts_hex() {
    let (server, cell) = create_server(0xFF);

    let response = server
        .post("/mi/reset_uflag")
        .json(&json!({"args": ["0x0F"]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(cell.get().unwrap().get_all(), 0xF0);
}

#[tokio::test]
async fn test_is_uflag_requires_all_bits() {
    let (server, _cell) = create_server(0x8);

    let reply = server
        .post("/mi/is_uflag")
        .json(&json!({"args": ["12"]}))
        .await
        .json::<MiReply>();
    assert_eq!(reply.code, 200);
    assert_eq!(values(&reply), vec!["FALSE"]);

    let reply = server
        .post("/mi/is_uflag")
        .json(&json!({"args": ["8"]}))
        .await
        .json::<MiReply>();
    assert_eq!(values(&reply), vec!["TRUE"]);
}

#[tokio::test]
async fn test_zero_mask_is_bad_parameter() {
    let (server, cell) = create_server(0x8);

    let response = server
        .post("/mi/set_uflag")
        .json(&json!({"args": ["0"]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<MiReply>().reason, "Bad parameter");
    assert_eq!(cell.get().unwrap().get_all(), 0x8);
}

#[tokio::test]
async fn test_missing_argument() {
    let (server, _cell) = create_server(0);

    let response = server.post("/mi/is_uflag").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<MiReply>().reason,
        "Too few or too many arguments"
    );
}

#[tokio::test]
async fn test_unknown_command() {
    let (server, _cell) = create_server(0);

    let response = server.post("/mi/get_gflags").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<MiReply>().reason, "Command not found");
}

#[tokio::test]
async fn test_destroyed_registry_is_unavailable() {
    let (server, cell) = create_server(0);
    assert!(cell.destroy());

    let response = server.post("/mi/get_uflags").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// AUTH
// =============================================================================

#[tokio::test]
async fn test_auth_required_when_key_configured() {
    let server = create_secured_server("secret");

    let response = server.post("/mi/get_uflags").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/mi/get_uflags")
        .authorization_bearer("wrong")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/mi/get_uflags")
        .authorization_bearer("secret")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(values(&response.json::<MiReply>()), vec!["0x0", "0"]);
}

#[tokio::test]
async fn test_empty_key_does_not_enable_auth() {
    let server = create_secured_server("");

    let response = server.post("/mi/get_uflags").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server.post("/mi/get_uflags").authorization_bearer("").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_open_when_key_configured() {
    let server = create_secured_server("secret");

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
