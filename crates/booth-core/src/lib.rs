//! SMILE Booth core
//!
//! Session state machine, detector contract, restart hit-test and the HTTP
//! and WebSocket surface of the booth kiosk.

pub mod api;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod events;
pub mod ports;
pub mod restart;
pub mod runner;
pub mod session;
pub mod token;

pub use api::{create_router, AcceptedResponse, AppState, ErrorResponse, RegisterRequest};
pub use config::{
    BackgroundConfig, CameraConfig, CaptureConfig, Config, DetectorConfig, DisplayConfig,
    LogConfig, RestartButtonConfig, ScreenConfig, SpeechConfig, SpeechMode,
};
pub use controller::{
    Collaborators, ControllerSettings, PhaseController, RejectReason, Signal, SignalOutcome,
    Submission, TickReport,
};
pub use detector::{
    DetectionResult, Detector, FaceLocator, FaceRegion, Marker, MarkerDetector, MarkerShape,
};
pub use error::{BoothError, Result};
pub use events::{BoothEvent, EventBroadcaster};
pub use ports::{
    Camera, CaptureStore, Delivery, DiscardCaptures, ExternalLog, LogPromptSink, NoExternalLog,
    NullPresenter, PresentView, Presenter, PromptSink, Registration,
};
pub use restart::{HersheyMetrics, Rect, RestartButton, TextMetrics};
pub use runner::{inbox, BoothMessage, Flow, RunStats, SessionRunner, INBOX_CAPACITY};
pub use session::{Phase, SessionSnapshot, SessionState};
pub use token::TokenGenerator;
