//! End-to-end tests for the booth session.
//!
//! These drive a [`PhaseController`] with scripted collaborators and a
//! simulated clock, and check the session rules across whole participant
//! sessions rather than single transitions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use booth_core::{
    BoothError, Camera, CaptureStore, Collaborators, Config, ControllerSettings, Delivery,
    DiscardCaptures, ExternalLog, FaceLocator, FaceRegion, MarkerDetector, NoExternalLog, Phase,
    PhaseController, PromptSink, RejectReason, RestartButton, Result, SessionState, Signal,
    SignalOutcome, Submission,
};
use booth_ledger::{DirectoryCaptureStore, JsonLinesLog};
use image::{GrayImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Camera returning a plain frame, or nothing while `blind` is set.
struct TestCamera {
    blind: Arc<AtomicBool>,
}

impl Camera for TestCamera {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.blind.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(RgbImage::from_pixel(64, 48, Rgb([120, 110, 100]))))
        }
    }
}

/// Locator that always sees one face and sees a smile while `smiling` is set.
struct TestLocator {
    smiling: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl FaceLocator for TestLocator {
    fn locate_faces(&mut self, _gray: &GrayImage) -> Result<Vec<FaceRegion>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(BoothError::detector_failure("classifier crashed"));
        }
        Ok(vec![FaceRegion::new(8, 8, 24, 24)])
    }

    fn find_smiles(&mut self, _face: &GrayImage) -> Result<Vec<FaceRegion>> {
        if self.smiling.load(Ordering::SeqCst) {
            Ok(vec![FaceRegion::new(4, 14, 12, 6)])
        } else {
            Ok(vec![])
        }
    }
}

/// Prompt sink counting what it was asked to say.
struct CountingPrompt(Arc<AtomicUsize>);

impl PromptSink for CountingPrompt {
    fn speak(&mut self, _text: &str) -> Result<Delivery> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Delivery::Delivered)
    }
}

/// Switches for the scripted collaborators.
#[derive(Clone, Default)]
struct Knobs {
    blind: Arc<AtomicBool>,
    smiling: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    prompts: Arc<AtomicUsize>,
}

fn booth(knobs: &Knobs, start: Instant) -> PhaseController {
    booth_with(knobs, start, Box::new(DiscardCaptures), Box::new(NoExternalLog))
}

fn booth_with(
    knobs: &Knobs,
    start: Instant,
    captures: Box<dyn CaptureStore>,
    log: Box<dyn ExternalLog>,
) -> PhaseController {
    let config = Config::default();
    PhaseController::new(
        ControllerSettings::from_config(&config),
        Collaborators {
            camera: Box::new(TestCamera {
                blind: knobs.blind.clone(),
            }),
            detector: Box::new(MarkerDetector::with_seed(
                TestLocator {
                    smiling: knobs.smiling.clone(),
                    broken: knobs.broken.clone(),
                },
                7,
            )),
            prompt: Box::new(CountingPrompt(knobs.prompts.clone())),
            captures,
            log,
        },
        RestartButton::from_config(&config),
        start,
    )
    .with_token_seed(42)
}

fn button_center(controller: &PhaseController) -> (i32, i32) {
    let rect = controller.restart_button().rect;
    ((rect.left + rect.right) / 2, (rect.top + rect.bottom) / 2)
}

// ============================================================================
// Tests
// ============================================================================

/// A whole participant session, from idle back to idle.
#[test]
fn test_full_session_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("participants.jsonl");
    let knobs = Knobs::default();
    let t0 = Instant::now();
    let mut booth = booth_with(
        &knobs,
        t0,
        Box::new(DirectoryCaptureStore::new(temp.path().join("captures"))),
        Box::new(JsonLinesLog::new(&log_path)),
    );

    assert_eq!(booth.handle_signal(Signal::Begin, t0), SignalOutcome::Began);
    assert_eq!(booth.state().phase(), Phase::AwaitingSmile);

    // A face without a smile keeps the booth waiting
    booth.tick(t0 + Duration::from_millis(100));
    assert_eq!(booth.state().phase(), Phase::AwaitingSmile);
    assert!(booth.state().captured_image().is_some());

    knobs.smiling.store(true, Ordering::SeqCst);
    booth.tick(t0 + Duration::from_millis(200));
    assert_eq!(booth.state().phase(), Phase::Registering);
    assert!(booth.state().form_open());

    assert_eq!(booth.submit_name("  Ada "), Submission::Accepted);
    let t_done = t0 + Duration::from_millis(300);
    booth.tick(t_done);

    let state = booth.state();
    assert_eq!(state.phase(), Phase::Finished);
    assert_eq!(state.participant_name(), "Ada");
    assert_eq!(state.token().len(), 3);
    assert!(state.token().chars().all(|c| c.is_ascii_digit()));
    assert!(state.captured_image().is_some());
    assert!(!state.form_open());
    let token = state.token().to_string();

    // Capture artifact and participant log
    assert!(temp.path().join("captures").join(format!("{token}.png")).exists());
    let log = std::fs::read_to_string(&log_path).expect("log written");
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains(r#""name":"Ada""#));
    assert!(log.contains(&format!(r#""token":"{token}""#)));

    // Restart button appears after the delay
    booth.tick(t_done + Duration::from_secs(4));
    assert!(!booth.state().restart_button_visible());
    booth.tick(t_done + Duration::from_secs(5));
    assert!(booth.state().restart_button_visible());

    let (x, y) = button_center(&booth);
    let t_reset = t_done + Duration::from_secs(6);
    assert_eq!(
        booth.handle_signal(Signal::Click { x, y }, t_reset),
        SignalOutcome::Restarted
    );
    assert_eq!(*booth.state(), SessionState::new(t_reset));
    assert_eq!(booth.state().participant_name(), "");
    assert_eq!(booth.state().token(), "");
    assert!(booth.state().captured_image().is_none());
    assert!(!booth.state().form_open());
}

/// Random operation sequences never break the session invariants.
#[test]
fn test_invariants_hold_under_random_operations() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let knobs = Knobs::default();
        let t0 = Instant::now();
        let mut booth = booth(&knobs, t0);
        let mut now = t0;

        for _ in 0..400 {
            now += Duration::from_millis(rng.gen_range(0..1_500));
            knobs.blind.store(rng.gen_bool(0.2), Ordering::SeqCst);
            knobs.smiling.store(rng.gen_bool(0.3), Ordering::SeqCst);
            knobs.broken.store(rng.gen_bool(0.1), Ordering::SeqCst);

            match rng.gen_range(0..7) {
                0 => {
                    booth.handle_signal(Signal::Begin, now);
                }
                1 => {
                    booth.handle_signal(Signal::RestartKey, now);
                }
                2 => {
                    let x = rng.gen_range(0..1920);
                    let y = rng.gen_range(0..1080);
                    booth.handle_signal(Signal::Click { x, y }, now);
                }
                3 => {
                    let name = if rng.gen_bool(0.5) { "Grace" } else { "   " };
                    booth.submit_name(name);
                }
                _ => {
                    booth.tick(now);
                }
            }

            let state = booth.state();
            assert!(
                state.check_invariants().is_ok(),
                "seed {seed}: {:?}",
                state.check_invariants()
            );
            if state.phase() == Phase::Idle {
                assert_eq!(state.token(), "");
                assert!(state.captured_image().is_none());
            }
            if state.phase() == Phase::Finished {
                assert!(!state.participant_name().trim().is_empty());
                assert!(state.captured_image().is_some());
            }
        }
    }
}

/// Ten seconds of waiting gives exactly three prompts, whether or not the
/// tick step divides the interval.
#[test]
fn test_three_prompts_in_ten_seconds() {
    for step_ms in [1_000u64, 500, 250, 100, 50, 700, 900, 1_300] {
        let knobs = Knobs::default();
        let t0 = Instant::now();
        let mut booth = booth(&knobs, t0);
        booth.handle_signal(Signal::Begin, t0);

        let mut elapsed = 0;
        while elapsed <= 10_000 {
            booth.tick(t0 + Duration::from_millis(elapsed));
            elapsed += step_ms;
        }

        assert_eq!(
            knobs.prompts.load(Ordering::SeqCst),
            3,
            "tick step {step_ms}ms"
        );
        assert_eq!(booth.prompts_spoken(), 3);
    }
}

/// A failing classifier leaves the booth waiting but still prompting.
#[test]
fn test_detector_failure_is_soft() {
    let knobs = Knobs::default();
    knobs.broken.store(true, Ordering::SeqCst);
    knobs.smiling.store(true, Ordering::SeqCst);
    let t0 = Instant::now();
    let mut booth = booth(&knobs, t0);
    booth.handle_signal(Signal::Begin, t0);

    for second in 1..=6 {
        let report = booth.tick(t0 + Duration::from_secs(second));
        assert!(report.overlay.is_some());
    }

    assert_eq!(booth.state().phase(), Phase::AwaitingSmile);
    assert!(booth.state().captured_image().is_none());
    assert_eq!(knobs.prompts.load(Ordering::SeqCst), 2);

    // Recovery
    knobs.broken.store(false, Ordering::SeqCst);
    booth.tick(t0 + Duration::from_secs(7));
    assert_eq!(booth.state().phase(), Phase::Registering);
}

/// With no camera frames nothing moves, including pending names.
#[test]
fn test_blind_camera_freezes_session() {
    let knobs = Knobs::default();
    knobs.smiling.store(true, Ordering::SeqCst);
    let t0 = Instant::now();
    let mut booth = booth(&knobs, t0);
    booth.handle_signal(Signal::Begin, t0);
    booth.tick(t0);
    assert_eq!(booth.state().phase(), Phase::Registering);

    knobs.blind.store(true, Ordering::SeqCst);
    booth.submit_name("Ada");
    for second in 1..=10 {
        let report = booth.tick(t0 + Duration::from_secs(second));
        assert!(report.camera_miss);
    }
    assert_eq!(booth.state().phase(), Phase::Registering);
    assert!(booth.has_pending_name());

    knobs.blind.store(false, Ordering::SeqCst);
    booth.tick(t0 + Duration::from_secs(11));
    assert_eq!(booth.state().phase(), Phase::Finished);
    assert_eq!(booth.state().participant_name(), "Ada");
}

/// A second restart after a reset does nothing.
#[test]
fn test_restart_is_idempotent() {
    let knobs = Knobs::default();
    knobs.smiling.store(true, Ordering::SeqCst);
    let t0 = Instant::now();
    let mut booth = booth(&knobs, t0);
    booth.handle_signal(Signal::Begin, t0);
    booth.tick(t0);
    booth.submit_name("Ada");
    booth.tick(t0);
    booth.tick(t0 + Duration::from_secs(5));

    let t_reset = t0 + Duration::from_secs(6);
    assert_eq!(
        booth.handle_signal(Signal::RestartKey, t_reset),
        SignalOutcome::Restarted
    );
    let after_first = booth.state().clone();

    assert_eq!(
        booth.handle_signal(Signal::RestartKey, t_reset + Duration::from_secs(1)),
        SignalOutcome::Ignored
    );
    let (x, y) = button_center(&booth);
    assert_eq!(
        booth.handle_signal(Signal::Click { x, y }, t_reset + Duration::from_secs(1)),
        SignalOutcome::Ignored
    );
    assert_eq!(*booth.state(), after_first);
}

/// Clicks on the button position do nothing outside a revealed Finished
/// screen.
#[test]
fn test_restart_click_rejected_until_revealed() {
    let knobs = Knobs::default();
    let t0 = Instant::now();
    let mut booth = booth(&knobs, t0);
    let (x, y) = button_center(&booth);
    let click = Signal::Click { x, y };

    assert_eq!(booth.handle_signal(click, t0), SignalOutcome::Ignored);
    assert_eq!(booth.state().phase(), Phase::Idle);

    booth.handle_signal(Signal::Begin, t0);
    assert_eq!(booth.handle_signal(click, t0), SignalOutcome::Ignored);
    assert_eq!(booth.state().phase(), Phase::AwaitingSmile);

    knobs.smiling.store(true, Ordering::SeqCst);
    booth.tick(t0);
    assert_eq!(booth.handle_signal(click, t0), SignalOutcome::Ignored);
    assert_eq!(booth.state().phase(), Phase::Registering);

    booth.submit_name("Ada");
    booth.tick(t0);
    assert_eq!(booth.handle_signal(click, t0), SignalOutcome::Ignored);
    assert_eq!(booth.state().phase(), Phase::Finished);
    assert_eq!(booth.state().participant_name(), "Ada");
}

/// The idle screen ignores everything but begin.
#[test]
fn test_idle_waits_for_begin() {
    let knobs = Knobs::default();
    knobs.smiling.store(true, Ordering::SeqCst);
    let t0 = Instant::now();
    let mut booth = booth(&knobs, t0);

    for second in 0..10 {
        booth.tick(t0 + Duration::from_secs(second));
    }
    assert_eq!(
        booth.submit_name("Ada"),
        Submission::Rejected(RejectReason::FormNotOpen)
    );
    assert_eq!(*booth.state(), SessionState::new(t0));
    assert_eq!(knobs.prompts.load(Ordering::SeqCst), 0);
}
