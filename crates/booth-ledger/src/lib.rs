//! SMILE Booth Ledger
//!
//! Best-effort persistence for completed registrations: the decorated face
//! capture and the participant logs. None of these may hold up a session, so
//! every collaborator here reports failures as transient booth errors and
//! the phase controller logs them and moves on.
//!
//! # Collaborators
//!
//! - [`DirectoryCaptureStore`] - Writes `<dir>/<token>.png`
//! - [`JsonLinesLog`] - Appends one JSON object per registration to a file
//! - [`WebhookLog`] - POSTs each registration to an HTTP endpoint
//! - [`CompositeLog`] - Fans a registration out to several logs
//!
//! # Example
//!
//! ```rust,no_run
//! use booth_core::{ExternalLog, Registration};
//! use booth_ledger::{CompositeLog, JsonLinesLog};
//!
//! let mut log = CompositeLog::new();
//! log.push(JsonLinesLog::new("participants.jsonl"));
//! log.append(&Registration::new("Ada", "042")).unwrap();
//! ```

mod capture;
mod jsonl;
mod webhook;

pub use capture::DirectoryCaptureStore;
pub use jsonl::JsonLinesLog;
pub use webhook::WebhookLog;

use booth_core::{
    BoothError, CaptureConfig, CaptureStore, DiscardCaptures, ExternalLog, LogConfig, Registration,
};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by ledger collaborators.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Failed to serialize a record.
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode an image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP request failed or returned an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook URL is not usable.
    #[error("invalid webhook URL '{0}': expected an http:// or https:// URL")]
    InvalidUrl(String),

    /// No tokio runtime is available to run background requests.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<LedgerError> for BoothError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Serialization(e) => Self::Json(e),
            LedgerError::Io(e) => Self::Io(e),
            LedgerError::Image(e) => Self::Image(e),
            LedgerError::Http(e) => Self::log_append("webhook", e.to_string()),
            LedgerError::InvalidUrl(url) => Self::config_validation(
                format!("log.webhookUrl '{url}' is not an http:// or https:// URL"),
                "Fix log.webhookUrl in booth.json",
            ),
            LedgerError::NoRuntime(message) => Self::log_append("webhook", message),
        }
    }
}

// ============================================================================
// CompositeLog
// ============================================================================

/// Appends every registration to each of its logs.
///
/// An empty composite is the "logging disabled" configuration. A failing log
/// does not stop the others from being written.
#[derive(Default)]
pub struct CompositeLog {
    logs: Vec<Box<dyn ExternalLog>>,
}

impl CompositeLog {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a log.
    pub fn push(&mut self, log: impl ExternalLog + 'static) {
        self.logs.push(Box::new(log));
    }

    /// Number of logs written to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether no log is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Builds the logs enabled in the `log` section of the configuration.
    ///
    /// The webhook log needs a tokio runtime handle to run its requests on.
    pub fn from_config(config: &LogConfig, handle: Option<Handle>) -> Result<Self> {
        let mut composite = Self::new();

        if let Some(path) = &config.jsonl_path {
            info!(path = %path, "Participant log: JSON lines");
            composite.push(JsonLinesLog::new(path));
        }

        if let Some(url) = &config.webhook_url {
            let handle = match handle {
                Some(handle) => handle,
                None => Handle::try_current().map_err(|e| LedgerError::NoRuntime(e.to_string()))?,
            };
            info!(url = %url, "Participant log: webhook");
            composite.push(WebhookLog::new(url, handle)?);
        }

        Ok(composite)
    }
}

impl ExternalLog for CompositeLog {
    fn append(&mut self, registration: &Registration) -> booth_core::Result<()> {
        let mut first_error = None;
        for log in &mut self.logs {
            if let Err(e) = log.append(registration) {
                warn!(error = %e, "Participant log append failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&mut self) -> booth_core::Result<()> {
        let mut first_error = None;
        for log in &mut self.logs {
            if let Err(e) = log.flush() {
                warn!(error = %e, "Participant log flush failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Builds the capture store for the `captures` section of the configuration.
#[must_use]
pub fn capture_store(config: &CaptureConfig) -> Box<dyn CaptureStore> {
    if config.enabled {
        Box::new(DirectoryCaptureStore::new(&config.dir))
    } else {
        Box::new(DiscardCaptures)
    }
}

// ============================================================================
// Tests
// ============================================================================
