//! The phase controller: the booth's state machine.
//!
//! The controller is the only writer of [`SessionState`]. The session loop
//! calls [`PhaseController::tick`] once per frame and forwards user input
//! and registration form submissions through [`PhaseController::handle_signal`]
//! and [`PhaseController::submit_name`]. Every operation takes the current
//! time explicitly, so the timing rules can be driven by simulated clocks.
//!
//! | Phase | Per tick | Leaves when |
//! |---|---|---|
//! | `Idle` | nothing | begin signal |
//! | `AwaitingSmile` | read frame, detect, keep the face crop, prompt on cadence | a smiling face is seen |
//! | `Registering` | read frame, consume a submitted name | a name was accepted |
//! | `Finished` | reveal the restart button after the delay | restart hits the button |

use std::time::{Duration, Instant};

use image::{imageops, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::detector::Detector;
use crate::events::BoothEvent;
use crate::ports::{Camera, CaptureStore, Delivery, ExternalLog, PromptSink, Registration};
use crate::restart::RestartButton;
use crate::session::{Phase, SessionSnapshot, SessionState};
use crate::token::TokenGenerator;

// ============================================================================
// Inputs and outcomes
// ============================================================================

/// User input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Start a session from the idle screen.
    Begin,
    /// Restart key pressed.
    #[serde(rename = "restart")]
    RestartKey,
    /// Pointer click at screen coordinates.
    Click {
        /// Horizontal position.
        x: i32,
        /// Vertical position.
        y: i32,
    },
    /// Terminate the process.
    Quit,
}

/// What a signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal was not valid in the current state; nothing changed.
    Ignored,
    /// A session started.
    Began,
    /// The session was reset to idle.
    Restarted,
    /// The caller should stop the session loop.
    Quit,
}

/// Why a name submission was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The name was empty or whitespace.
    EmptyName,
    /// No registration form is open.
    FormNotOpen,
}

/// Result of submitting a name from the registration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The name is pending and will complete registration on the next tick
    /// that has a camera frame.
    Accepted,
    /// The name was rejected; the form stays as it was.
    Rejected(RejectReason),
}

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Camera overlay for the presenter: the decorated frame when a face was
    /// found, else the mirrored raw frame.
    pub overlay: Option<RgbImage>,
    /// The phase needed a frame and the camera had none.
    pub camera_miss: bool,
    /// A voice prompt was spoken this tick.
    pub prompted: bool,
    /// Phase transition taken this tick.
    pub transition: Option<(Phase, Phase)>,
}

// ============================================================================
// Settings and collaborators
// ============================================================================

/// Timing and behavior knobs of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Minimum time between voice prompts.
    pub prompt_interval: Duration,
    /// How long the finished card shows before the restart button appears.
    pub restart_delay: Duration,
    /// Text spoken by each prompt.
    pub prompt_text: String,
    /// Flip camera frames horizontally before detection.
    pub mirror: bool,
    /// Token generator.
    pub tokens: TokenGenerator,
}

impl ControllerSettings {
    /// Extracts controller settings from the booth configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            prompt_interval: config.prompt_interval(),
            restart_delay: config.restart_delay(),
            prompt_text: config.prompt_text.clone(),
            mirror: config.mirror,
            tokens: TokenGenerator::new(config.token_length),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators driven by the controller.
pub struct Collaborators {
    /// Frame source.
    pub camera: Box<dyn Camera>,
    /// Face and smile detector.
    pub detector: Box<dyn Detector>,
    /// Voice prompt sink.
    pub prompt: Box<dyn PromptSink>,
    /// Capture artifact storage.
    pub captures: Box<dyn CaptureStore>,
    /// Participant log.
    pub log: Box<dyn ExternalLog>,
}

// ============================================================================
// PhaseController
// ============================================================================

/// Owns the session state and advances it.
pub struct PhaseController {
    state: SessionState,
    settings: ControllerSettings,
    collaborators: Collaborators,
    restart_button: RestartButton,
    token_rng: StdRng,
    pending_name: Option<String>,
    outbox: Vec<BoothEvent>,
    prompts_spoken: u64,
}

impl PhaseController {
    /// Creates a controller with a fresh idle session.
    pub fn new(
        settings: ControllerSettings,
        collaborators: Collaborators,
        restart_button: RestartButton,
        now: Instant,
    ) -> Self {
        Self {
            state: SessionState::new(now),
            settings,
            collaborators,
            restart_button,
            token_rng: StdRng::from_entropy(),
            pending_name: None,
            outbox: Vec::new(),
            prompts_spoken: 0,
        }
    }

    /// Seeds token generation, for reproducible sessions.
    #[must_use]
    pub fn with_token_seed(mut self, seed: u64) -> Self {
        self.token_rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Current session state.
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Serializable view of the session state.
    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        self.state.snapshot(now)
    }

    /// Restart button layout used for click hit-testing.
    pub const fn restart_button(&self) -> &RestartButton {
        &self.restart_button
    }

    /// Controller settings.
    pub const fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Number of voice prompts spoken since start.
    pub const fn prompts_spoken(&self) -> u64 {
        self.prompts_spoken
    }

    /// Whether a submitted name is waiting for the next Registering tick.
    pub const fn has_pending_name(&self) -> bool {
        self.pending_name.is_some()
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<BoothEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Lets the participant log finish appends still in flight.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.collaborators.log.flush() {
            warn!(error = %e, "Participant log did not flush");
        }
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// Applies a user input signal.
    pub fn handle_signal(&mut self, signal: Signal, now: Instant) -> SignalOutcome {
        let outcome = match signal {
            Signal::Begin if self.state.phase == Phase::Idle => {
                self.transition(Phase::AwaitingSmile, now);
                self.state.last_voice_prompt_at = now;
                SignalOutcome::Began
            }
            Signal::RestartKey if self.restart_armed() => {
                self.reset(now);
                SignalOutcome::Restarted
            }
            Signal::Click { x, y } if self.restart_armed() && self.restart_button.hit(x, y) => {
                self.reset(now);
                SignalOutcome::Restarted
            }
            Signal::Quit => {
                info!(phase = %self.state.phase, "Quit requested");
                SignalOutcome::Quit
            }
            _ => {
                debug!(?signal, phase = %self.state.phase, "Signal ignored");
                SignalOutcome::Ignored
            }
        };

        self.debug_check();
        outcome
    }

    /// Submits a name from the registration form.
    ///
    /// An accepted name completes registration on the next Registering tick
    /// with a camera frame. A later submission replaces one not yet consumed.
    pub fn submit_name(&mut self, name: &str) -> Submission {
        if !self.state.form_open {
            debug!(phase = %self.state.phase, "Name submitted with no open form");
            return Submission::Rejected(RejectReason::FormNotOpen);
        }

        let name = name.trim();
        if name.is_empty() {
            debug!("Empty name rejected, form stays open");
            return Submission::Rejected(RejectReason::EmptyName);
        }

        self.pending_name = Some(name.to_string());
        Submission::Accepted
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advances the session by one frame.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let report = match self.state.phase {
            Phase::Idle => TickReport::default(),
            Phase::AwaitingSmile => self.tick_awaiting_smile(now),
            Phase::Registering => self.tick_registering(now),
            Phase::Finished => self.tick_finished(now),
        };

        self.debug_check();
        report
    }

    fn tick_awaiting_smile(&mut self, now: Instant) -> TickReport {
        let Some(frame) = self.read_frame() else {
            return TickReport {
                camera_miss: true,
                ..TickReport::default()
            };
        };

        let detection = self.collaborators.detector.detect(&frame);
        self.state.smile_detected = detection.smiling;
        if detection.face_found {
            if let Some(crop) = detection.decorated_crop {
                self.state.captured_image = Some(crop);
            }
        }

        let mut report = TickReport {
            overlay: Some(detection.decorated_frame.unwrap_or(frame)),
            ..TickReport::default()
        };

        if self.state.smile_detected && self.state.captured_image.is_some() {
            info!("Smile detected");
            self.state.smile_detected = false;
            self.transition(Phase::Registering, now);
            self.open_form();
            report.transition = Some((Phase::AwaitingSmile, Phase::Registering));
            return report;
        }

        let interval = self.settings.prompt_interval;
        if now.saturating_duration_since(self.state.last_voice_prompt_at) >= interval {
            report.prompted = self.speak_prompt();
            // Keep the schedule on the interval grid unless a whole interval was skipped
            let due = self.state.last_voice_prompt_at + interval;
            self.state.last_voice_prompt_at = if now.saturating_duration_since(due) >= interval {
                now
            } else {
                due
            };
        }

        report
    }

    fn tick_registering(&mut self, now: Instant) -> TickReport {
        if !self.state.form_open {
            self.open_form();
        }

        let Some(frame) = self.read_frame() else {
            return TickReport {
                camera_miss: true,
                ..TickReport::default()
            };
        };

        let mut report = TickReport {
            overlay: Some(frame),
            ..TickReport::default()
        };

        if let Some(name) = self.pending_name.take() {
            self.complete_registration(name, now);
            report.transition = Some((Phase::Registering, Phase::Finished));
        }

        report
    }

    fn tick_finished(&mut self, now: Instant) -> TickReport {
        if !self.state.restart_button_visible
            && now.saturating_duration_since(self.state.phase_entered_at)
                >= self.settings.restart_delay
        {
            info!("Restart button revealed");
            self.state.restart_button_visible = true;
            self.outbox.push(BoothEvent::RestartAvailable);
        }
        TickReport::default()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn read_frame(&mut self) -> Option<RgbImage> {
        match self.collaborators.camera.read_frame() {
            Ok(Some(mut frame)) => {
                if self.settings.mirror {
                    imageops::flip_horizontal_in_place(&mut frame);
                }
                Some(frame)
            }
            Ok(None) => {
                debug!(phase = %self.state.phase, "No camera frame this tick");
                None
            }
            Err(e) => {
                debug!(phase = %self.state.phase, error = %e, "Camera read failed");
                None
            }
        }
    }

    /// Returns whether the prompt reached the speaker.
    fn speak_prompt(&mut self) -> bool {
        let text = self.settings.prompt_text.clone();
        debug!(prompt = %text, "Speaking voice prompt");
        match self.collaborators.prompt.speak(&text) {
            Ok(Delivery::Delivered) => {
                self.prompts_spoken += 1;
                self.outbox.push(BoothEvent::voice_prompt(text));
                true
            }
            Ok(Delivery::Dropped) => {
                debug!("Previous prompt still playing, prompt skipped");
                false
            }
            Err(e) => {
                warn!(error = %e, "Voice prompt failed");
                self.outbox.push(BoothEvent::error(e.to_string()));
                false
            }
        }
    }

    fn open_form(&mut self) {
        self.state.form_open = true;
        self.outbox.push(BoothEvent::FormOpened);
    }

    fn complete_registration(&mut self, name: String, now: Instant) {
        let token = self
            .settings
            .tokens
            .generate_with(&mut self.token_rng);
        info!(name = %name, token = %token, "Participant registered");

        if let Some(image) = &self.state.captured_image {
            match self.collaborators.captures.store(&token, image) {
                Ok(Some(path)) => debug!(path = %path.display(), "Capture stored"),
                Ok(None) => {}
                Err(e) => {
                    warn!(token = %token, error = %e, "Failed to store capture");
                    self.outbox.push(BoothEvent::error(e.to_string()));
                }
            }
        }

        let registration = Registration::new(name.clone(), token.clone());
        if let Err(e) = self.collaborators.log.append(&registration) {
            warn!(token = %token, error = %e, "Failed to log registration");
            self.outbox.push(BoothEvent::error(e.to_string()));
        }

        self.state.participant_name = name.clone();
        self.state.token = token.clone();
        self.state.form_open = false;
        self.outbox.push(BoothEvent::registered(name, token));
        self.transition(Phase::Finished, now);
    }

    const fn restart_armed(&self) -> bool {
        matches!(self.state.phase, Phase::Finished) && self.state.restart_button_visible
    }

    fn reset(&mut self, now: Instant) {
        let from = self.state.phase;
        self.state = SessionState::new(now);
        self.pending_name = None;
        info!(from = %from, "Session reset");
        self.outbox.push(BoothEvent::phase_changed(from, Phase::Idle));
        self.outbox.push(BoothEvent::SessionReset);
    }

    fn transition(&mut self, to: Phase, now: Instant) {
        let from = self.state.phase;
        self.state.enter(to, now);
        info!(from = %from, to = %to, "Phase changed");
        self.outbox.push(BoothEvent::phase_changed(from, to));
    }

    fn debug_check(&self) {
        let checked = self.state.check_invariants();
        if let Err(e) = &checked {
            error!(error = %e, "Session invariant violated");
        }
        debug_assert!(checked.is_ok(), "session invariant violated");
    }
}

// ============================================================================
// Tests
// ============================================================================
