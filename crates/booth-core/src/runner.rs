//! The session loop.
//!
//! One thread owns the [`PhaseController`] and drives it at the display frame
//! rate. Each iteration drains the inbox without blocking, ticks the
//! controller, publishes events and the snapshot, and hands the result to the
//! presenter. Nothing else writes session state, so no locking is needed.

use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::controller::{PhaseController, Signal, SignalOutcome, Submission};
use crate::events::EventBroadcaster;
use crate::ports::{PresentView, Presenter};
use crate::session::{Phase, SessionSnapshot};

/// Capacity of the session loop inbox.
pub const INBOX_CAPACITY: usize = 64;

/// Message for the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoothMessage {
    /// User input signal.
    Signal(Signal),
    /// Name submitted through the registration form.
    SubmitName(String),
}

/// Creates the session loop inbox.
pub fn inbox() -> (mpsc::Sender<BoothMessage>, mpsc::Receiver<BoothMessage>) {
    mpsc::channel(INBOX_CAPACITY)
}

/// Whether the loop keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running.
    Continue,
    /// Quit was requested or every inbox sender is gone.
    Stop,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Loop iterations executed.
    pub ticks: u64,
    /// Registrations completed.
    pub registrations: u64,
    /// Sessions reset to idle.
    pub resets: u64,
    /// Voice prompts spoken.
    pub prompts: u64,
}

/// Drives a [`PhaseController`] from an inbox.
pub struct SessionRunner {
    controller: PhaseController,
    inbox: mpsc::Receiver<BoothMessage>,
    snapshots: watch::Sender<SessionSnapshot>,
    broadcaster: EventBroadcaster,
    presenter: Box<dyn Presenter>,
    frame_period: Duration,
    stats: RunStats,
}

impl SessionRunner {
    /// Creates a runner.
    pub fn new(
        controller: PhaseController,
        inbox: mpsc::Receiver<BoothMessage>,
        snapshots: watch::Sender<SessionSnapshot>,
        broadcaster: EventBroadcaster,
        presenter: Box<dyn Presenter>,
        frame_period: Duration,
    ) -> Self {
        Self {
            controller,
            inbox,
            snapshots,
            broadcaster,
            presenter,
            frame_period,
            stats: RunStats::default(),
        }
    }

    /// The controller being driven.
    pub const fn controller(&self) -> &PhaseController {
        &self.controller
    }

    /// Counters so far.
    pub const fn stats(&self) -> RunStats {
        self.stats
    }

    /// Runs until quit, pacing iterations to the frame period.
    ///
    /// Blocks the calling thread; run it on a dedicated thread or through
    /// `tokio::task::spawn_blocking`.
    pub fn run(mut self) -> RunStats {
        info!(
            frame_period_ms = self.frame_period.as_millis() as u64,
            "Session loop started"
        );

        loop {
            let started = Instant::now();
            if self.step(started) == Flow::Stop {
                break;
            }
            if let Some(rest) = self.frame_period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        self.controller.shutdown();
        info!(
            ticks = self.stats.ticks,
            registrations = self.stats.registrations,
            resets = self.stats.resets,
            "Session loop stopped"
        );
        self.stats
    }

    /// Runs one loop iteration at `now`.
    pub fn step(&mut self, now: Instant) -> Flow {
        if self.drain_inbox(now) == Flow::Stop {
            self.publish(now);
            return Flow::Stop;
        }

        let report = self.controller.tick(now);
        self.stats.ticks += 1;
        if let Some((_, Phase::Finished)) = report.transition {
            self.stats.registrations += 1;
        }
        self.stats.prompts = self.controller.prompts_spoken();

        self.publish(now);
        self.presenter.present(&PresentView {
            state: self.controller.state(),
            overlay: report.overlay.as_ref(),
            restart_button: self.controller.restart_button(),
        });

        Flow::Continue
    }

    fn drain_inbox(&mut self, now: Instant) -> Flow {
        loop {
            match self.inbox.try_recv() {
                Ok(BoothMessage::Signal(signal)) => {
                    match self.controller.handle_signal(signal, now) {
                        SignalOutcome::Quit => return Flow::Stop,
                        SignalOutcome::Restarted => self.stats.resets += 1,
                        SignalOutcome::Began | SignalOutcome::Ignored => {}
                    }
                }
                Ok(BoothMessage::SubmitName(name)) => {
                    if let Submission::Rejected(reason) = self.controller.submit_name(&name) {
                        debug!(?reason, "Name submission rejected");
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => {
                    info!("Inbox closed, stopping session loop");
                    return Flow::Stop;
                }
            }
        }
    }

    fn publish(&mut self, now: Instant) {
        for event in self.controller.drain_events() {
            self.broadcaster.send(event);
        }
        let snapshot = self.controller.snapshot(now);
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
