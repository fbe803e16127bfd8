//! Session state types for the SMILE Booth.
//!
//! A session is one participant's pass through the booth, from the start
//! screen to the restart that prepares the booth for the next person.
//!
//! [`SessionState`] is owned by the [`PhaseController`](crate::PhaseController);
//! everything else reads it through accessors or through a serializable
//! [`SessionSnapshot`].

use std::fmt;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{BoothError, Result};

// ============================================================================
// Phase
// ============================================================================

/// Current phase of a booth session.
///
/// The phase transitions through these states:
/// - `Idle` -> `AwaitingSmile` (begin signal)
/// - `AwaitingSmile` -> `Registering` (smiling face detected)
/// - `Registering` -> `Finished` (registration form completed)
/// - `Finished` -> `Idle` (restart signal once the restart button is visible)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Start screen, waiting for the begin signal.
    #[default]
    Idle,
    /// Prompting the participant to smile at the camera.
    AwaitingSmile,
    /// Registration form is open, waiting for a name.
    Registering,
    /// Showing the finished card with photo, name and token.
    Finished,
}

impl Phase {
    /// Returns `true` if this phase pulls camera frames each tick.
    ///
    /// # Examples
    ///
    /// ```
    /// use booth_core::Phase;
    ///
    /// assert!(Phase::AwaitingSmile.uses_camera());
    /// assert!(Phase::Registering.uses_camera());
    /// assert!(!Phase::Finished.uses_camera());
    /// ```
    #[must_use]
    pub const fn uses_camera(&self) -> bool {
        matches!(self, Self::AwaitingSmile | Self::Registering)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingSmile => write!(f, "awaiting_smile"),
            Self::Registering => write!(f, "registering"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Complete state of the current participant's session.
///
/// Fields are written only by the phase controller; the presenter and the
/// HTTP surface observe them through the accessors below.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub(crate) phase: Phase,
    pub(crate) participant_name: String,
    pub(crate) token: String,
    pub(crate) captured_image: Option<RgbImage>,
    pub(crate) smile_detected: bool,
    pub(crate) form_open: bool,
    pub(crate) phase_entered_at: Instant,
    pub(crate) last_voice_prompt_at: Instant,
    pub(crate) restart_button_visible: bool,
}

impl SessionState {
    /// Creates a fresh session in the `Idle` phase.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Instant;
    /// use booth_core::{Phase, SessionState};
    ///
    /// let state = SessionState::new(Instant::now());
    /// assert_eq!(state.phase(), Phase::Idle);
    /// assert!(state.participant_name().is_empty());
    /// assert!(state.token().is_empty());
    /// assert!(state.captured_image().is_none());
    /// ```
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            phase: Phase::Idle,
            participant_name: String::new(),
            token: String::new(),
            captured_image: None,
            smile_detected: false,
            form_open: false,
            phase_entered_at: now,
            last_voice_prompt_at: now,
            restart_button_visible: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Registered display name, empty until registration completes.
    #[must_use]
    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }

    /// Generated token, empty until registration completes.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decorated face crop from the most recent detection.
    #[must_use]
    pub const fn captured_image(&self) -> Option<&RgbImage> {
        self.captured_image.as_ref()
    }

    /// Whether the last processed frame contained a smile.
    #[must_use]
    pub const fn smile_detected(&self) -> bool {
        self.smile_detected
    }

    /// Whether a registration form is currently open.
    #[must_use]
    pub const fn form_open(&self) -> bool {
        self.form_open
    }

    /// When the current phase was entered.
    #[must_use]
    pub const fn phase_entered_at(&self) -> Instant {
        self.phase_entered_at
    }

    /// When the last voice prompt was spoken.
    #[must_use]
    pub const fn last_voice_prompt_at(&self) -> Instant {
        self.last_voice_prompt_at
    }

    /// Whether the restart button is shown.
    #[must_use]
    pub const fn restart_button_visible(&self) -> bool {
        self.restart_button_visible
    }

    /// Moves to `phase` and restarts the phase timer.
    pub(crate) fn enter(&mut self, phase: Phase, now: Instant) {
        self.phase = phase;
        self.phase_entered_at = now;
    }

    /// Checks the session invariants.
    ///
    /// # Errors
    ///
    /// Returns `BoothError::InvalidSessionState` naming the first violated
    /// invariant.
    pub fn check_invariants(&self) -> Result<()> {
        if self.token.is_empty() != self.participant_name.is_empty() {
            return Err(BoothError::invalid_session(format!(
                "token and participant name must be set together (name: {:?}, token: {:?})",
                self.participant_name, self.token
            )));
        }

        if matches!(self.phase, Phase::Registering | Phase::Finished)
            && self.captured_image.is_none()
        {
            return Err(BoothError::invalid_session(format!(
                "phase {} requires a captured image",
                self.phase
            )));
        }

        if self.restart_button_visible && self.phase != Phase::Finished {
            return Err(BoothError::invalid_session(format!(
                "restart button visible in phase {}",
                self.phase
            )));
        }

        if self.form_open && self.phase != Phase::Registering {
            return Err(BoothError::invalid_session(format!(
                "registration form open in phase {}",
                self.phase
            )));
        }

        Ok(())
    }

    /// Creates a serializable view of this state.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            participant_name: self.participant_name.clone(),
            token: self.token.clone(),
            has_capture: self.captured_image.is_some(),
            smile_detected: self.smile_detected,
            form_open: self.form_open,
            restart_button_visible: self.restart_button_visible,
            phase_elapsed_ms: now
                .saturating_duration_since(self.phase_entered_at)
                .as_millis() as u64,
        }
    }
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Serializable view of a [`SessionState`], used by the status API and the
/// event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Registered display name (empty until registration completes).
    pub participant_name: String,
    /// Generated token (empty until registration completes).
    pub token: String,
    /// Whether a decorated face capture is held.
    pub has_capture: bool,
    /// Whether the last processed frame contained a smile.
    pub smile_detected: bool,
    /// Whether the registration form is open.
    pub form_open: bool,
    /// Whether the restart button is shown.
    pub restart_button_visible: bool,
    /// Milliseconds spent in the current phase.
    pub phase_elapsed_ms: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn crop() -> RgbImage {
        RgbImage::new(4, 4)
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(Phase::default(), Phase::Idle);
    }

    #[test]
    fn test_phase_uses_camera() {
        assert!(!Phase::Idle.uses_camera());
        assert!(Phase::AwaitingSmile.uses_camera());
        assert!(Phase::Registering.uses_camera());
        assert!(!Phase::Finished.uses_camera());
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_string(&Phase::Idle).unwrap(), r#""idle""#);
        assert_eq!(
            serde_json::to_string(&Phase::AwaitingSmile).unwrap(),
            r#""awaiting_smile""#
        );
        assert_eq!(
            serde_json::to_string(&Phase::Registering).unwrap(),
            r#""registering""#
        );
        assert_eq!(
            serde_json::to_string(&Phase::Finished).unwrap(),
            r#""finished""#
        );

        let phase: Phase = serde_json::from_str(r#""awaiting_smile""#).unwrap();
        assert_eq!(phase, Phase::AwaitingSmile);
    }

    #[test]
    fn test_phase_display_matches_serde() {
        for phase in [
            Phase::Idle,
            Phase::AwaitingSmile,
            Phase::Registering,
            Phase::Finished,
        ] {
            assert_eq!(
                format!("\"{phase}\""),
                serde_json::to_string(&phase).unwrap()
            );
        }
    }

    #[test]
    fn test_new_session_is_idle_and_valid() {
        let now = Instant::now();
        let state = SessionState::new(now);

        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.form_open());
        assert!(!state.smile_detected());
        assert!(!state.restart_button_visible());
        assert_eq!(state.phase_entered_at(), now);
        assert_eq!(state.last_voice_prompt_at(), now);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_enter_resets_phase_timer() {
        let start = Instant::now();
        let mut state = SessionState::new(start);
        let later = start + Duration::from_secs(2);

        state.enter(Phase::AwaitingSmile, later);

        assert_eq!(state.phase(), Phase::AwaitingSmile);
        assert_eq!(state.phase_entered_at(), later);
        assert_eq!(state.last_voice_prompt_at(), start);
    }

    #[test]
    fn test_invariant_name_without_token() {
        let mut state = SessionState::new(Instant::now());
        state.participant_name = "Ada".to_string();

        let err = state.check_invariants().unwrap_err();
        assert!(err.to_string().contains("set together"));
    }

    #[test]
    fn test_invariant_registering_requires_capture() {
        let mut state = SessionState::new(Instant::now());
        state.phase = Phase::Registering;
        state.form_open = true;
        assert!(state.check_invariants().is_err());

        state.captured_image = Some(crop());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_restart_button_only_when_finished() {
        let mut state = SessionState::new(Instant::now());
        state.restart_button_visible = true;
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn test_invariant_form_only_while_registering() {
        let mut state = SessionState::new(Instant::now());
        state.form_open = true;
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn test_snapshot() {
        let start = Instant::now();
        let mut state = SessionState::new(start);
        state.phase = Phase::Finished;
        state.participant_name = "Ada".to_string();
        state.token = "042".to_string();
        state.captured_image = Some(crop());

        let snapshot = state.snapshot(start + Duration::from_millis(1500));

        assert_eq!(snapshot.phase, Phase::Finished);
        assert_eq!(snapshot.participant_name, "Ada");
        assert_eq!(snapshot.token, "042");
        assert!(snapshot.has_capture);
        assert!(!snapshot.form_open);
        assert_eq!(snapshot.phase_elapsed_ms, 1500);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SessionState::new(Instant::now()).snapshot(Instant::now());
        let json = serde_json::to_string_pretty(&snapshot).unwrap();

        assert!(json.contains(r#""phase": "idle""#));
        assert!(json.contains(r#""participantName": """#));
        assert!(json.contains(r#""hasCapture": false"#));
        assert!(json.contains(r#""restartButtonVisible": false"#));
        assert!(json.contains("phaseElapsedMs"));
    }
}
