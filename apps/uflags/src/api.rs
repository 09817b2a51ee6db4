//! # HTTP Management Endpoint
//!
//! Carries management commands over HTTP as JSON.
//!
//! - `GET /health`: liveness and whether the registry is initialized
//! - `GET /mi`: names of the exported commands
//! - `POST /mi/{command}`: run a command; body `{"args": ["8"]}` is optional
//!
//! The HTTP status mirrors the reply code. When an API key is configured,
//! `/mi` routes require `Authorization: Bearer <key>`.

use crate::config::non_empty;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uflags_core::RegistryCell;
use uflags_core::mi::{MiCommand, MiReply};

// =============================================================================
// STATE
// =============================================================================

/// Shared state of the management endpoint.
#[derive(Debug, Clone)]
pub struct AppState {
    cell: Arc<RegistryCell>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    #[must_use]
    pub fn new(cell: Arc<RegistryCell>) -> Self {
        Self {
            cell,
            api_key: None,
        }
    }

    /// Require `api_key` on `/mi`. `None` or an empty key leaves it open.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = non_empty(api_key).map(Arc::from);
        self
    }

    #[must_use]
    pub fn cell(&self) -> &Arc<RegistryCell> {
        &self.cell
    }
}

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

/// Body of `POST /mi/{command}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiRequest {
    #[serde(default)]
    pub args: Vec<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub initialized: bool,
}

/// Command listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsResponse {
    pub commands: Vec<String>,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the management router.
pub fn create_router(state: AppState) -> Router {
    let mi_routes = Router::new()
        .route("/mi", get(commands_handler))
        .route("/mi/{command}", post(mi_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(mi_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        initialized: state.cell.is_live(),
    })
}

async fn commands_handler() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: MiCommand::ALL
            .iter()
            .map(|command| command.name().to_string())
            .collect(),
    })
}

async fn mi_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    reply_response(run_command(&state, &name, &body))
}

/// Resolve, parse and execute one management command.
fn run_command(state: &AppState, name: &str, body: &[u8]) -> MiReply {
    let Some(command) = MiCommand::from_name(name) else {
        warn!(command = %name, "unknown management command");
        return MiReply::not_found();
    };

    let request = if !command.takes_input() || body.iter().all(u8::is_ascii_whitespace) {
        MiRequest::default()
    } else {
        match serde_json::from_slice::<MiRequest>(body) {
            Ok(request) => request,
            Err(err) => {
                warn!(command = %command, error = %err, "malformed management request");
                return MiReply::new(400, "Malformed request body");
            }
        }
    };

    let registry = match state.cell.get() {
        Ok(registry) => registry,
        Err(err) => {
            warn!(command = %command, error = %err, "registry unavailable");
            return MiReply::new(503, err.to_string());
        }
    };

    match command.try_execute(registry.as_ref(), &request.args) {
        Ok(reply) => {
            debug!(
                command = %command,
                args = ?request.args,
                flags = registry.get_all(),
                "management command executed"
            );
            reply
        }
        Err(err) => {
            warn!(command = %command, args = ?request.args, error = ?err, "management command rejected");
            MiReply::from(err)
        }
    }
}

fn reply_response(reply: MiReply) -> Response {
    let status = StatusCode::from_u16(reply.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply)).into_response()
}

// =============================================================================
// AUTH
// =============================================================================

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let authorized =
        provided.is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));

    if authorized {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "unauthorized management request");
        reply_response(MiReply::new(401, "Unauthorized"))
    }
}

// =============================================================================
// TESTS
// =============================================================================
