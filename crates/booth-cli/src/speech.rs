//! Voice prompt sinks backed by an external text-to-speech command.
//!
//! In blocking mode the session loop waits for the command to finish, so
//! prompts can never overlap. In queued mode a worker thread speaks and the
//! loop hands it text through a single-slot queue; requests arriving while
//! the slot is taken are dropped.

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use booth_core::{
    BoothError, Delivery, LogPromptSink, PromptSink, Result, SpeechConfig, SpeechMode,
};

/// Speaks by running `<program> <args...> <text>` and waiting for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    /// Creates a speaker running `program` with `args` before the text.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl PromptSink for CommandSpeaker {
    fn speak(&mut self, text: &str) -> Result<Delivery> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .status()
            .map_err(|e| BoothError::speech(format!("failed to run '{}': {e}", self.program)))?;

        if status.success() {
            Ok(Delivery::Delivered)
        } else {
            Err(BoothError::speech(format!(
                "'{}' exited with {status}",
                self.program
            )))
        }
    }
}

/// Speaks on a worker thread, dropping prompts while one is already queued.
pub struct QueuedSpeaker {
    sender: Option<SyncSender<String>>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl QueuedSpeaker {
    /// Starts a worker thread speaking through `inner`.
    pub fn spawn<S: PromptSink + 'static>(mut inner: S) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<String>(1);
        let worker = thread::Builder::new()
            .name("booth-speech".to_string())
            .spawn(move || {
                for text in receiver {
                    if let Err(e) = inner.speak(&text) {
                        tracing::warn!(error = %e, "Queued voice prompt failed");
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start speech thread, prompts disabled");
                None
            }
        };

        Self {
            sender: Some(sender),
            worker,
            dropped: Arc::default(),
        }
    }

    /// Number of prompts dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PromptSink for QueuedSpeaker {
    fn speak(&mut self, text: &str) -> Result<Delivery> {
        let Some(sender) = &self.sender else {
            return Err(BoothError::speech("speech worker stopped"));
        };

        match sender.try_send(text.to_string()) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Speech queue full, prompt dropped");
                Ok(Delivery::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(BoothError::speech("speech worker stopped"))
            }
        }
    }
}

impl Drop for QueuedSpeaker {
    fn drop(&mut self) {
        // Closing the queue ends the worker after its current prompt
        self.sender.take();
        if self.dropped() > 0 {
            tracing::debug!(dropped = self.dropped(), "Speech queue closed");
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Builds the prompt sink for the `speech` section of the configuration.
pub fn build_speaker(config: &SpeechConfig) -> Box<dyn PromptSink> {
    let Some(program) = &config.command else {
        tracing::info!("No speech command configured, prompts are logged only");
        return Box::new(LogPromptSink);
    };

    let speaker = CommandSpeaker::new(program, config.args.clone());
    tracing::info!(program = %program, mode = ?config.mode, "Speech enabled");
    match config.mode {
        SpeechMode::Blocking => Box::new(speaker),
        SpeechMode::Queued => Box::new(QueuedSpeaker::spawn(speaker)),
    }
}
