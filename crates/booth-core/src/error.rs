//! Error types for the SMILE Booth core.
//!
//! Errors are grouped by how the booth reacts to them: configuration and
//! startup resource failures are fatal, sensor and collaborator failures are
//! logged and absorbed so the session loop keeps running.

use std::path::PathBuf;

/// A specialized `Result` type for booth operations.
pub type Result<T> = std::result::Result<T, BoothError>;

/// Errors that can occur while configuring or running the booth.
#[derive(Debug, thiserror::Error)]
pub enum BoothError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your booth.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the operator.
        suggestion: String,
    },

    // ========================================================================
    // Startup Resource Errors
    // ========================================================================
    /// A background image or other startup asset could not be found.
    #[error("Asset not found: '{path}'\n\nSuggestion: Check the 'backgrounds' section of booth.json")]
    AssetNotFound {
        /// Path where the asset was expected.
        path: PathBuf,
    },

    /// An asset exists but could not be decoded.
    #[error("Could not decode asset '{path}': {message}\n\nSuggestion: Re-export the image as PNG or JPEG")]
    AssetDecodeError {
        /// Path to the undecodable asset.
        path: PathBuf,
        /// Description of the decode failure.
        message: String,
    },

    /// No camera source is available.
    #[error("Camera unavailable: {message}\n\nSuggestion: Check the camera.framesDir setting or pass --frames-dir")]
    CameraUnavailable {
        /// Why the camera could not be opened.
        message: String,
    },

    /// The face/smile detector could not be started.
    #[error("Detector unavailable: {message}\n\nSuggestion: Make sure the detector.command in booth.json is installed and on PATH")]
    DetectorUnavailable {
        /// Why the detector could not be started.
        message: String,
    },

    // ========================================================================
    // Transient Sensor Errors
    // ========================================================================
    /// A single camera read failed.
    #[error("Camera read failed: {message}")]
    CameraRead {
        /// Description of the read failure.
        message: String,
    },

    /// The detector failed on a single frame.
    #[error("Detector failed: {message}")]
    DetectorFailure {
        /// Description of the detector failure.
        message: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The speech engine could not speak a prompt.
    #[error("Speech failed: {message}")]
    Speech {
        /// Description of the speech failure.
        message: String,
    },

    /// The capture artifact could not be written.
    #[error("Failed to write capture to '{path}': {message}")]
    CaptureWrite {
        /// Path where the capture was to be written.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },

    /// A participant log could not be appended to.
    #[error("Failed to append to {sink} log: {message}")]
    LogAppend {
        /// Name of the log sink ("jsonl", "webhook", ...).
        sink: String,
        /// Description of the append failure.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session state violates one of its invariants.
    #[error("Invalid session state: {message}")]
    InvalidSessionState {
        /// The violated invariant.
        message: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding/decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl BoothError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `AssetNotFound` error.
    #[must_use]
    pub fn asset_not_found(path: impl Into<PathBuf>) -> Self {
        Self::AssetNotFound { path: path.into() }
    }

    /// Creates a new `AssetDecodeError`.
    #[must_use]
    pub fn asset_decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AssetDecodeError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `CameraUnavailable` error.
    #[must_use]
    pub fn camera_unavailable(message: impl Into<String>) -> Self {
        Self::CameraUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `DetectorUnavailable` error.
    #[must_use]
    pub fn detector_unavailable(message: impl Into<String>) -> Self {
        Self::DetectorUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `CameraRead` error.
    #[must_use]
    pub fn camera_read(message: impl Into<String>) -> Self {
        Self::CameraRead {
            message: message.into(),
        }
    }

    /// Creates a new `DetectorFailure` error.
    #[must_use]
    pub fn detector_failure(message: impl Into<String>) -> Self {
        Self::DetectorFailure {
            message: message.into(),
        }
    }

    /// Creates a new `Speech` error.
    #[must_use]
    pub fn speech(message: impl Into<String>) -> Self {
        Self::Speech {
            message: message.into(),
        }
    }

    /// Creates a new `CaptureWrite` error.
    #[must_use]
    pub fn capture_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CaptureWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `LogAppend` error.
    #[must_use]
    pub fn log_append(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LogAppend {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidSessionState` error.
    #[must_use]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSessionState {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is transient: the loop skips the work
    /// for this tick and keeps going.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CameraRead { .. }
                | Self::DetectorFailure { .. }
                | Self::Speech { .. }
                | Self::CaptureWrite { .. }
                | Self::LogAppend { .. }
        )
    }

    /// Returns `true` if this error is fatal and the booth must exit
    /// before entering the session loop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::AssetNotFound { .. }
                | Self::AssetDecodeError { .. }
                | Self::CameraUnavailable { .. }
                | Self::DetectorUnavailable { .. }
        )
    }
}
