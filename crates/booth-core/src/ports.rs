//! Collaborator interfaces used by the phase controller and the session loop.
//!
//! Everything the booth talks to outside its own state sits behind one of
//! these traits: the camera, the voice prompt sink, capture storage, the
//! participant log and the presenter. Concrete implementations live in the
//! ledger crate and the binary; the no-op ones here are used when a
//! collaborator is switched off.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::restart::RestartButton;
use crate::session::SessionState;

// ============================================================================
// Registration record
// ============================================================================

/// A completed registration, as handed to the participant log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Display name entered by the participant.
    pub name: String,
    /// Token issued to the participant.
    pub token: String,
    /// When registration completed.
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    /// Creates a registration stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            registered_at: Utc::now(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Pull-based frame source.
pub trait Camera: Send {
    /// Reads one frame.
    ///
    /// `Ok(None)` and `Err(_)` both mean "no frame this tick"; the caller
    /// never stops the session because of a read.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// What became of a voice prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The prompt was spoken, or handed to a speaker that will speak it.
    Delivered,
    /// The prompt was skipped because another one was still playing.
    Dropped,
}

/// Speaks voice prompts.
///
/// Implementations must never let two prompts overlap, whether they speak
/// synchronously or hand the text to a worker.
pub trait PromptSink: Send {
    /// Speaks `text`.
    fn speak(&mut self, text: &str) -> Result<Delivery>;
}

/// Stores the decorated face capture of a registered participant.
pub trait CaptureStore: Send {
    /// Writes `image` keyed by `token` and returns where it went, or `None`
    /// when storage is disabled.
    fn store(&mut self, token: &str, image: &RgbImage) -> Result<Option<PathBuf>>;
}

/// Best-effort participant log.
pub trait ExternalLog: Send {
    /// Appends one registration.
    fn append(&mut self, registration: &Registration) -> Result<()>;

    /// Waits for appends still in flight. Called once at shutdown.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What the presenter needs to draw one tick.
#[derive(Debug, Clone, Copy)]
pub struct PresentView<'a> {
    /// Current session state.
    pub state: &'a SessionState,
    /// Camera overlay for this tick, already mirrored and decorated.
    pub overlay: Option<&'a RgbImage>,
    /// Restart button layout.
    pub restart_button: &'a RestartButton,
}

/// Renders the current phase.
pub trait Presenter: Send {
    /// Draws `view`. Nothing is returned to the session loop.
    fn present(&mut self, view: &PresentView<'_>);
}

// ============================================================================
// Disabled collaborators
// ============================================================================

/// Prompt sink that only logs the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPromptSink;

impl PromptSink for LogPromptSink {
    fn speak(&mut self, text: &str) -> Result<Delivery> {
        info!(prompt = %text, "Voice prompt");
        Ok(Delivery::Delivered)
    }
}

/// Capture store used when captures are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardCaptures;

impl CaptureStore for DiscardCaptures {
    fn store(&mut self, _token: &str, _image: &RgbImage) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Participant log that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalLog;

impl ExternalLog for NoExternalLog {
    fn append(&mut self, _registration: &Registration) -> Result<()> {
        Ok(())
    }
}

/// Presenter that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _view: &PresentView<'_>) {}
}
