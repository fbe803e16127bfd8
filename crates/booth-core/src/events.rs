//! Booth events and their WebSocket stream.
//!
//! The phase controller emits a [`BoothEvent`] for everything an observer
//! might care about. The session loop hands them to an [`EventBroadcaster`],
//! and every client connected to `/ws` receives them as JSON.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the current snapshot
//! - `phase_changed` - The session moved to another phase
//! - `form_opened` - The registration form is ready for a name
//! - `voice_prompt` - A voice prompt was spoken
//! - `registered` - A participant completed registration
//! - `restart_available` - The restart button became visible
//! - `session_reset` - The booth was reset for the next participant
//! - `error` - A collaborator failed; the session continued
//!
//! # Example
//!
//! ```no_run
//! use booth_core::{BoothEvent, EventBroadcaster, Phase};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(BoothEvent::phase_changed(Phase::Idle, Phase::AwaitingSmile));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::{Phase, SessionSnapshot};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Session state at connect time.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `phase_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChangedPayload {
    /// Phase that was left.
    pub from: Phase,
    /// Phase that was entered.
    pub to: Phase,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `voice_prompt` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicePromptPayload {
    /// Spoken text.
    pub text: String,
}

/// Payload for the `registered` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPayload {
    /// Participant display name.
    pub name: String,
    /// Issued token.
    pub token: String,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events emitted while the booth runs.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum BoothEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent on every phase transition.
    PhaseChanged(PhaseChangedPayload),
    /// Sent when the registration form opens.
    FormOpened,
    /// Sent after each voice prompt.
    VoicePrompt(VoicePromptPayload),
    /// Sent when registration completes.
    Registered(RegisteredPayload),
    /// Sent when the restart button appears.
    RestartAvailable,
    /// Sent when the session is reset to idle.
    SessionReset,
    /// Sent when a collaborator fails.
    Error(ErrorPayload),
}

impl BoothEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `PhaseChanged` event stamped with the current time.
    #[must_use]
    pub fn phase_changed(from: Phase, to: Phase) -> Self {
        Self::PhaseChanged(PhaseChangedPayload {
            from,
            to,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `VoicePrompt` event.
    #[must_use]
    pub fn voice_prompt(text: impl Into<String>) -> Self {
        Self::VoicePrompt(VoicePromptPayload { text: text.into() })
    }

    /// Creates a `Registered` event.
    #[must_use]
    pub fn registered(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Registered(RegisteredPayload {
            name: name.into(),
            token: token.into(),
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::PhaseChanged(_) => "phase_changed",
            Self::FormOpened => "form_opened",
            Self::VoicePrompt(_) => "voice_prompt",
            Self::Registered(_) => "registered",
            Self::RestartAvailable => "restart_available",
            Self::SessionReset => "session_reset",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts booth events to all connected WebSocket clients.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<BoothEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns how many subscribers will see it.
    pub fn send(&self, event: BoothEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Streams events to one client.
///
/// Sends `connected` with the current snapshot, then forwards every
/// broadcast event. Pings every 30 seconds and drops the client after
/// three unanswered pings.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so nothing falls in between
    let mut event_receiver = state.broadcaster.subscribe();
    let snapshot = state.snapshot.borrow().clone();

    let connected_json = match serde_json::to_string(&BoothEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize connected event");
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent current snapshot");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(booth_event) => {
                        let json = match serde_json::to_string(&booth_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize event");
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Client lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!(missed = MAX_MISSED_PONGS, "Client stopped answering pings, closing");
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
