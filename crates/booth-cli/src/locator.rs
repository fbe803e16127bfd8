//! Face locator backed by an external detector process.
//!
//! The booth does not ship a classifier. It starts a long-lived detector
//! program and talks to it over stdin/stdout with a line protocol:
//!
//! ```text
//! -> face <width> <height>\n<width * height luma bytes>
//! <- [[x, y, w, h], ...]\n
//! -> smile <width> <height>\n<width * height luma bytes>
//! <- [[x, y, w, h], ...]\n
//! ```
//!
//! Any program that wraps a cascade classifier (or anything else) and speaks
//! this protocol can be used.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use booth_core::{BoothError, DetectorConfig, FaceLocator, FaceRegion, Result};
use image::GrayImage;

/// Longest wait for one reply unless configured otherwise.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// First restart delay unless configured otherwise.
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for the restart delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One detector exchange handed to the I/O thread.
struct Request {
    kind: &'static str,
    image: GrayImage,
}

/// A running detector and the thread that owns its pipes.
#[derive(Debug)]
struct Process {
    child: Child,
    requests: Sender<Request>,
    replies: Receiver<Result<Vec<FaceRegion>>>,
}

impl Process {
    fn start(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                BoothError::detector_unavailable(format!("failed to start '{program}': {e}"))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BoothError::detector_unavailable(format!(
                "'{program}' did not expose stdin/stdout pipes"
            )));
        };

        let (requests, inbox) = mpsc::channel::<Request>();
        let (outbox, replies) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("booth-detector".to_string())
            .spawn(move || serve(stdin, BufReader::new(stdout), &inbox, &outbox));
        if let Err(e) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BoothError::detector_unavailable(format!(
                "failed to start detector I/O thread: {e}"
            )));
        }

        tracing::info!(program = %program, pid = child.id(), "Detector process started");
        Ok(Self {
            child,
            requests,
            replies,
        })
    }

    fn ask(&self, request: Request, timeout: Duration) -> Result<Vec<FaceRegion>> {
        let kind = request.kind;
        self.requests
            .send(request)
            .map_err(|_| BoothError::detector_failure("detector I/O thread stopped"))?;

        match self.replies.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => Err(BoothError::detector_failure(format!(
                "no {kind} reply within {}ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BoothError::detector_failure("detector I/O thread stopped"))
            }
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "Detector process already gone");
        }
        let _ = self.child.wait();
    }
}

/// I/O thread body: one request in, one reply out, until the pipes break.
fn serve(
    mut stdin: ChildStdin,
    mut stdout: BufReader<ChildStdout>,
    inbox: &Receiver<Request>,
    outbox: &Sender<Result<Vec<FaceRegion>>>,
) {
    while let Ok(request) = inbox.recv() {
        let reply = exchange(&mut stdin, &mut stdout, &request);
        let broken = reply.is_err();
        if outbox.send(reply).is_err() || broken {
            break;
        }
    }
}

fn exchange(
    stdin: &mut ChildStdin,
    stdout: &mut BufReader<ChildStdout>,
    request: &Request,
) -> Result<Vec<FaceRegion>> {
    let Request { kind, image } = request;
    writeln!(stdin, "{kind} {} {}", image.width(), image.height())
        .and_then(|()| stdin.write_all(image.as_raw()))
        .and_then(|()| stdin.flush())
        .map_err(|e| BoothError::detector_failure(format!("failed to send {kind} request: {e}")))?;

    let mut line = String::new();
    let read = stdout
        .read_line(&mut line)
        .map_err(|e| BoothError::detector_failure(format!("failed to read {kind} reply: {e}")))?;
    if read == 0 {
        return Err(BoothError::detector_failure(
            "detector process closed its output",
        ));
    }

    let reply = line.trim();
    let boxes: Vec<[u32; 4]> = serde_json::from_str(reply).map_err(|e| {
        BoothError::detector_failure(format!("malformed {kind} reply {reply:?}: {e}"))
    })?;
    Ok(boxes.into_iter().map(FaceRegion::from).collect())
}

/// Detector process speaking the line protocol.
///
/// Each request waits at most `timeout` for its reply. A process that times
/// out, exits or answers garbage is killed and started again on a later
/// frame, after a delay that doubles per consecutive failure.
#[derive(Debug)]
pub struct CommandLocator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    backoff: Duration,
    next_backoff: Duration,
    retry_at: Option<Instant>,
    restarts: u64,
    process: Option<Process>,
}

impl CommandLocator {
    /// Starts the detector program. Failing to start it here is fatal.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let process = Process::start(program, args)?;
        Ok(Self {
            program: program.to_string(),
            args: args.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            backoff: DEFAULT_BACKOFF,
            next_backoff: DEFAULT_BACKOFF,
            retry_at: None,
            restarts: 0,
            process: Some(process),
        })
    }

    /// Starts the detector configured in the `detector` section.
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Ok(Self::spawn(&config.command, &config.args)?
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_restart_backoff(Duration::from_millis(config.restart_backoff_ms)))
    }

    /// Sets the per-request reply deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the first restart delay after a failure.
    #[must_use]
    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self.next_backoff = backoff;
        self
    }

    /// Number of times the detector process was started again.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    fn query(&mut self, kind: &'static str, image: &GrayImage) -> Result<Vec<FaceRegion>> {
        let process = match self.process.take() {
            Some(process) => process,
            None => self.restart()?,
        };

        let request = Request {
            kind,
            image: image.clone(),
        };
        match process.ask(request, self.timeout) {
            Ok(regions) => {
                self.next_backoff = self.backoff;
                self.process = Some(process);
                Ok(regions)
            }
            Err(e) => {
                drop(process);
                self.schedule_restart(&e);
                Err(e)
            }
        }
    }

    fn restart(&mut self) -> Result<Process> {
        if let Some(at) = self.retry_at {
            if Instant::now() < at {
                return Err(BoothError::detector_failure("detector is restarting"));
            }
        }

        match Process::start(&self.program, &self.args) {
            Ok(process) => {
                self.restarts += 1;
                self.retry_at = None;
                tracing::info!(restarts = self.restarts, "Detector process restarted");
                Ok(process)
            }
            Err(e) => {
                let e = BoothError::detector_failure(e.to_string());
                self.schedule_restart(&e);
                Err(e)
            }
        }
    }

    fn schedule_restart(&mut self, cause: &BoothError) {
        let delay = self.next_backoff;
        self.retry_at = Some(Instant::now() + delay);
        self.next_backoff = (delay * 2).min(MAX_BACKOFF);
        tracing::warn!(
            error = %cause,
            retry_in_ms = delay.as_millis() as u64,
            "Detector process failed, restarting"
        );
    }
}

impl Drop for CommandLocator {
    fn drop(&mut self) {
        if self.restarts() > 0 {
            tracing::info!(restarts = self.restarts(), "Detector stopped");
        }
    }
}

impl FaceLocator for CommandLocator {
    fn locate_faces(&mut self, gray: &GrayImage) -> Result<Vec<FaceRegion>> {
        self.query("face", gray)
    }

    fn find_smiles(&mut self, face: &GrayImage) -> Result<Vec<FaceRegion>> {
        self.query("smile", face)
    }
}
