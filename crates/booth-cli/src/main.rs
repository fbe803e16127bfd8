//! SMILE Booth CLI
//!
//! Runs the photo booth kiosk: the session loop, the registration form
//! server and the terminal input bridge.

mod camera;
mod display;
mod input;
mod locator;
mod speech;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use booth_core::{
    create_router, inbox, AppState, BoothMessage, Collaborators, Config, ControllerSettings,
    EventBroadcaster, MarkerDetector, PhaseController, RestartButton, RunStats, SessionRunner,
    Signal,
};
use booth_ledger::{capture_store, CompositeLog};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::camera::DirectoryCamera;
use crate::display::{Backgrounds, DisplayComposer, LabelFont};
use crate::locator::CommandLocator;
use crate::speech::build_speaker;

/// Default port for the registration form server.
const DEFAULT_PORT: u16 = 3000;

/// SMILE Booth - smile-triggered photo booth kiosk
///
/// Waits for a participant to smile at the camera, takes their name through
/// the registration form, and hands them a numeric token with their photo.
#[derive(Parser, Debug)]
#[command(name = "smile-booth")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: booth.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Directory of camera frames to replay
    #[arg(short, long, value_name = "DIR")]
    frames_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the registration form server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("SMILE Booth starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_booth(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs the booth until quit.
///
/// 1. Load and validate config
/// 2. Open camera, detector and backgrounds (fatal on failure)
/// 3. Start the HTTP server
/// 4. Run the session loop until quit or Ctrl+C
async fn run_booth(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref frames_dir) = args.frames_dir {
        config.camera.frames_dir.clone_from(frames_dir);
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    // Startup resources
    let camera = DirectoryCamera::open(Path::new(&config.camera.frames_dir))?;
    println!("Camera: {} frames", camera.len());
    let locator = CommandLocator::from_config(&config.detector)?;
    let backgrounds = Backgrounds::load(&config.backgrounds, config.screen)?;
    let font = LabelFont::load(&config.display)?;

    let collaborators = Collaborators {
        camera: Box::new(camera),
        detector: Box::new(MarkerDetector::new(locator)),
        prompt: build_speaker(&config.speech),
        captures: capture_store(&config.captures),
        log: Box::new(CompositeLog::from_config(
            &config.log,
            Some(Handle::current()),
        )?),
    };

    let now = Instant::now();
    let controller = PhaseController::new(
        ControllerSettings::from_config(&config),
        collaborators,
        RestartButton::from_config_with(&config, &font),
        now,
    );
    tracing::debug!(rect = ?controller.restart_button().rect, "Restart button layout");

    let (inbox_tx, inbox_rx) = inbox();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot(now));
    let broadcaster = EventBroadcaster::default();

    let router = create_router(AppState {
        snapshot: snapshot_rx,
        inbox: inbox_tx.clone(),
        broadcaster: broadcaster.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    println!("Registration form on http://{addr}");

    input::spawn_stdin_reader(inbox_tx.clone()).map_err(|e| {
        anyhow::anyhow!("Failed to start input reader: {e}")
    })?;

    let runner = SessionRunner::new(
        controller,
        inbox_rx,
        snapshot_tx,
        broadcaster,
        Box::new(DisplayComposer::new(&config, backgrounds, font)),
        config.frame_period(),
    );

    println!();
    println!("Booth ready. Enter 'b' to begin, 'q' to quit");
    println!("Press Ctrl+C to stop");
    println!();

    let mut session = tokio::task::spawn_blocking(move || runner.run());

    let stats = tokio::select! {
        joined = &mut session => joined?,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            if inbox_tx.send(BoothMessage::Signal(Signal::Quit)).await.is_err() {
                tracing::debug!("Session loop already stopped");
            }
            session.await?
        }
    };

    server_handle.abort();
    print_stats(&stats);

    Ok(())
}

/// Loads configuration from the given path or the default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the loaded configuration summary.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Frames directory: {}", config.camera.frames_dir);
    println!("  Detector: {}", config.detector.command);
    println!(
        "  Screen: {}x{}",
        config.screen.width, config.screen.height
    );
    println!("  Prompt: \"{}\" every {}ms", config.prompt_text, config.prompt_interval_ms);
    println!("  Restart delay: {}ms", config.restart_delay_ms);
    println!("  Display output: {}", config.display.output_path);
    println!(
        "  Label font: {}",
        config.display.font_path.as_deref().unwrap_or("(plates)")
    );
}

/// Prints the session loop counters.
fn print_stats(stats: &RunStats) {
    println!();
    println!("Booth stopped:");
    println!("  Frames: {}", stats.ticks);
    println!("  Registrations: {}", stats.registrations);
    println!("  Resets: {}", stats.resets);
    println!("  Voice prompts: {}", stats.prompts);
}
