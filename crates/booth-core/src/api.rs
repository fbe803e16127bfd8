//! HTTP surface of the booth.
//!
//! The registration form is served over HTTP so it can run on the kiosk
//! screen or on a tablet next to it. Handlers never touch the session state:
//! they read the latest published [`SessionSnapshot`] and forward
//! submissions and signals into the session loop's inbox.
//!
//! # Endpoints
//!
//! - `GET /` - Registration form page
//! - `POST /api/register` - Submit a participant name
//! - `GET /api/status` - Current session snapshot
//! - `POST /api/signal` - Forward a begin/restart/click signal
//! - `GET /ws` - Event stream (see [`crate::events`])
//!
//! # Example
//!
//! ```no_run
//! use booth_core::{create_router, AppState, EventBroadcaster, SessionSnapshot};
//! use tokio::sync::watch;
//!
//! # async fn example() {
//! let (_snapshots, snapshot) = watch::channel(SessionSnapshot::default());
//! let (inbox, _messages) = booth_core::inbox();
//! let state = AppState {
//!     snapshot,
//!     inbox,
//!     broadcaster: EventBroadcaster::default(),
//! };
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::controller::Signal;
use crate::events::{ws_handler, EventBroadcaster};
use crate::runner::BoothMessage;
use crate::session::SessionSnapshot;

/// Message shown when an empty name is submitted.
pub const EMPTY_NAME_MESSAGE: &str = "Please enter a name!";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>SMILE Booth</title>
<style>
body { font-family: sans-serif; text-align: center; margin-top: 4em; }
input { font-size: 1.5em; padding: 0.3em; }
button { font-size: 1.5em; padding: 0.3em 1em; }
#message { color: #c00; margin-top: 1em; }
</style>
</head>
<body>
<h1>Enter your name</h1>
<form id="register">
<input id="name" name="name" autocomplete="off" autofocus>
<button type="submit">Save</button>
</form>
<div id="message"></div>
<script>
document.getElementById("register").addEventListener("submit", async (e) => {
  e.preventDefault();
  const name = document.getElementById("name").value;
  const res = await fetch("/api/register", {
    method: "POST",
    headers: { "content-type": "application/json" },
    body: JSON.stringify({ name }),
  });
  const message = document.getElementById("message");
  if (res.status === 202) {
    message.textContent = "";
    document.getElementById("name").value = "";
  } else {
    const body = await res.json();
    message.textContent = body.error;
  }
});
</script>
</body>
</html>
"#;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Name typed into the form.
    pub name: String,
}

/// Response body for accepted requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    /// Always `true`; the session loop applies the request on its next tick.
    pub accepted: bool,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Latest snapshot published by the session loop.
    pub snapshot: watch::Receiver<SessionSnapshot>,
    /// Inbox of the session loop.
    pub inbox: mpsc::Sender<BoothMessage>,
    /// Event broadcaster feeding `/ws` clients.
    pub broadcaster: EventBroadcaster,
}

// ============================================================================
// API Error Type
// ============================================================================

#[derive(Debug)]
enum ApiError {
    /// No registration form is open.
    FormNotOpen,
    /// The request was understood but its content is not acceptable.
    Unprocessable(String),
    /// The session loop is not taking messages.
    LoopUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::FormNotOpen => (
                StatusCode::CONFLICT,
                "No registration form is open".to_string(),
            ),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::LoopUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The booth is not accepting input right now".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with the form page, API routes and event stream.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/register", post(handle_register))
        .route("/status", get(handle_status))
        .route("/signal", post(handle_signal));

    Router::new()
        .route("/", get(handle_index))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Handler for `POST /api/register`.
async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let form_open = state.snapshot.borrow().form_open;
    if !form_open {
        warn!("Registration submitted while no form is open");
        return Err(ApiError::FormNotOpen);
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::Unprocessable(EMPTY_NAME_MESSAGE.to_string()));
    }

    forward(&state, BoothMessage::SubmitName(name.to_string()))?;
    info!(name = %name, "Registration forwarded");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { accepted: true }),
    ))
}

/// Handler for `GET /api/status`.
async fn handle_status(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.snapshot.borrow().clone())
}

/// Handler for `POST /api/signal`.
async fn handle_signal(
    State(state): State<Arc<AppState>>,
    Json(signal): Json<Signal>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    if signal == Signal::Quit {
        return Err(ApiError::Unprocessable(
            "quit is only accepted from the booth console".to_string(),
        ));
    }

    forward(&state, BoothMessage::Signal(signal))?;
    info!(?signal, "Signal forwarded");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { accepted: true }),
    ))
}

fn forward(state: &AppState, message: BoothMessage) -> Result<(), ApiError> {
    state.inbox.try_send(message).map_err(|e| {
        warn!(error = %e, "Session loop inbox unavailable");
        ApiError::LoopUnavailable
    })
}

// ============================================================================
// Tests
// ============================================================================
