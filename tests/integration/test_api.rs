//! Integration tests for the registration form server.
//!
//! A real session loop runs on a blocking thread behind a real listener;
//! the tests talk to it over HTTP and watch the WebSocket event stream.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use booth_core::{
    create_router, inbox, AppState, BoothEvent, BoothMessage, Camera, Collaborators, Config,
    ControllerSettings, DetectionResult, Detector, DiscardCaptures, EventBroadcaster,
    LogPromptSink, NoExternalLog, NullPresenter, Phase, PhaseController, RestartButton, Result,
    RunStats, SessionRunner, SessionSnapshot, Signal,
};
use futures::{SinkExt, StreamExt};
use image::RgbImage;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct StillCamera;

impl Camera for StillCamera {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(Some(RgbImage::new(32, 24)))
    }
}

/// Every frame holds a smiling face.
struct AlwaysSmiling;

impl Detector for AlwaysSmiling {
    fn detect(&mut self, _frame: &RgbImage) -> DetectionResult {
        DetectionResult {
            face_found: true,
            smiling: true,
            decorated_crop: Some(RgbImage::new(8, 8)),
            ..DetectionResult::default()
        }
    }
}

/// A running booth: HTTP server plus session loop.
struct Booth {
    addr: SocketAddr,
    inbox: mpsc::Sender<BoothMessage>,
    session: JoinHandle<RunStats>,
    http: reqwest::Client,
}

impl Booth {
    async fn start() -> Self {
        let mut config = Config::default();
        config.restart_delay_ms = 100;

        let now = Instant::now();
        let controller = PhaseController::new(
            ControllerSettings::from_config(&config),
            Collaborators {
                camera: Box::new(StillCamera),
                detector: Box::new(AlwaysSmiling),
                prompt: Box::new(LogPromptSink),
                captures: Box::new(DiscardCaptures),
                log: Box::new(NoExternalLog),
            },
            RestartButton::from_config(&config),
            now,
        );

        let (inbox_tx, inbox_rx) = inbox();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot(now));
        let broadcaster = EventBroadcaster::default();

        let router = create_router(AppState {
            snapshot: snapshot_rx,
            inbox: inbox_tx.clone(),
            broadcaster: broadcaster.clone(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        let runner = SessionRunner::new(
            controller,
            inbox_rx,
            snapshot_tx,
            broadcaster,
            Box::new(NullPresenter),
            Duration::from_millis(10),
        );
        let session = tokio::task::spawn_blocking(move || runner.run());

        Self {
            addr,
            inbox: inbox_tx,
            session,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn connect(&self) -> WsClient {
        let (ws_stream, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("Failed to connect to WebSocket");
        ws_stream
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    async fn status(&self) -> SessionSnapshot {
        self.http
            .get(self.url("/api/status"))
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("Failed to parse snapshot")
    }

    /// Polls the status endpoint until `check` passes.
    async fn wait_for_status(&self, check: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = self.status().await;
                if check(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Timeout waiting for status")
    }

    async fn stop(self) -> RunStats {
        self.inbox
            .send(BoothMessage::Signal(Signal::Quit))
            .await
            .expect("Session loop gone");
        timeout(Duration::from_secs(5), self.session)
            .await
            .expect("Timeout waiting for session loop")
            .expect("Session loop panicked")
    }
}

/// Receives the next event, answering pings on the way.
async fn receive_event(client: &mut WsClient) -> BoothEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Skips events until one matches.
async fn wait_for_event(client: &mut WsClient, check: impl Fn(&BoothEvent) -> bool) -> BoothEvent {
    loop {
        let event = receive_event(client).await;
        if check(&event) {
            return event;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

/// A participant registers through the form and the booth is restarted
/// from the touch screen.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_through_http() {
    let booth = Booth::start().await;
    let mut client = booth.connect().await;

    let connected = receive_event(&mut client).await;
    let BoothEvent::Connected(payload) = connected else {
        panic!("Expected Connected event, got: {connected:?}");
    };
    assert_eq!(payload.snapshot.phase, Phase::Idle);

    // No form yet
    let response = booth.post("/api/register", json!({ "name": "Ada" })).await;
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    let response = booth.post("/api/signal", json!({ "signal": "begin" })).await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let event = wait_for_event(&mut client, |e| matches!(e, BoothEvent::PhaseChanged(_))).await;
    let BoothEvent::PhaseChanged(change) = event else {
        unreachable!()
    };
    assert_eq!((change.from, change.to), (Phase::Idle, Phase::AwaitingSmile));

    wait_for_event(&mut client, |e| matches!(e, BoothEvent::FormOpened)).await;
    let snapshot = booth.wait_for_status(|s| s.form_open).await;
    assert_eq!(snapshot.phase, Phase::Registering);
    assert!(snapshot.has_capture);

    // Blank names keep the form open
    let response = booth.post("/api/register", json!({ "name": "   " })).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.expect("error body");
    assert_eq!(body["error"], "Please enter a name!");

    let response = booth.post("/api/register", json!({ "name": "Ada" })).await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let event = wait_for_event(&mut client, |e| matches!(e, BoothEvent::Registered(_))).await;
    let BoothEvent::Registered(registered) = event else {
        unreachable!()
    };
    assert_eq!(registered.name, "Ada");
    assert_eq!(registered.token.len(), 3);

    let snapshot = booth
        .wait_for_status(|s| s.phase == Phase::Finished)
        .await;
    assert_eq!(snapshot.participant_name, "Ada");
    assert_eq!(snapshot.token, registered.token);
    assert!(!snapshot.form_open);

    wait_for_event(&mut client, |e| matches!(e, BoothEvent::RestartAvailable)).await;
    let response = booth.post("/api/signal", json!({ "signal": "restart" })).await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    wait_for_event(&mut client, |e| matches!(e, BoothEvent::SessionReset)).await;

    let snapshot = booth.wait_for_status(|s| s.phase == Phase::Idle).await;
    assert_eq!(snapshot, SessionSnapshot {
        phase_elapsed_ms: snapshot.phase_elapsed_ms,
        ..SessionSnapshot::default()
    });

    let stats = booth.stop().await;
    assert_eq!(stats.registrations, 1);
    assert_eq!(stats.resets, 1);
}

/// Quit cannot come from the network.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quit_rejected_over_http() {
    let booth = Booth::start().await;

    let response = booth.post("/api/signal", json!({ "signal": "quit" })).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let snapshot = booth.status().await;
    assert_eq!(snapshot.phase, Phase::Idle);

    // The loop is still running and stops on a local quit
    booth.stop().await;
}

/// Clicks on the idle screen change nothing.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_click_on_idle_screen_is_ignored() {
    let booth = Booth::start().await;
    let config = Config::default();
    let rect = RestartButton::from_config(&config).rect;

    let response = booth
        .post(
            "/api/signal",
            json!({ "signal": "click", "x": rect.left, "y": rect.top }),
        )
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(booth.status().await.phase, Phase::Idle);

    let stats = booth.stop().await;
    assert_eq!(stats.resets, 0);
}

/// The form page is served at the root.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_form_page_served() {
    let booth = Booth::start().await;

    let page = booth
        .http
        .get(booth.url("/"))
        .send()
        .await
        .expect("Request failed")
        .text()
        .await
        .expect("page body");
    assert!(page.contains("/api/register"));

    booth.stop().await;
}
