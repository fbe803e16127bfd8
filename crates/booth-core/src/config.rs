//! Configuration types for the SMILE Booth.
//!
//! The booth is configured from a `booth.json` file. Every field has a
//! default, so a missing file or an empty object yields a working setup.
//! Optional collaborators (participant logs, capture storage, speech) are
//! switched on and off here rather than by running different programs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoothError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "booth.json";

/// Largest supported token length.
const MAX_TOKEN_LENGTH: usize = 12;

/// Highest supported loop rate.
const MAX_FRAME_RATE: u32 = 120;

const fn default_prompt_interval_ms() -> u64 {
    3000
}

const fn default_restart_delay_ms() -> u64 {
    5000
}

const fn default_frame_rate() -> u32 {
    30
}

fn default_prompt_text() -> String {
    "Please smile!".to_string()
}

const fn default_token_length() -> usize {
    3
}

const fn default_true() -> bool {
    true
}

const fn default_screen_width() -> u32 {
    1920
}

const fn default_screen_height() -> u32 {
    1080
}

fn default_button_label() -> String {
    "RESTART".to_string()
}

const fn default_font_scale() -> f32 {
    1.5
}

const fn default_padding() -> i32 {
    20
}

fn default_frames_dir() -> String {
    "frames".to_string()
}

fn default_detector_command() -> String {
    "smile-detector".to_string()
}

const fn default_detector_timeout_ms() -> u64 {
    2000
}

const fn default_detector_restart_backoff_ms() -> u64 {
    500
}

fn default_captures_dir() -> String {
    "captures".to_string()
}

fn default_display_output() -> String {
    "display.png".to_string()
}

const fn default_snapshot_interval_ms() -> u64 {
    1000
}

/// Main configuration for the booth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Interval between spoken "please smile" prompts, in milliseconds.
    #[serde(default = "default_prompt_interval_ms")]
    pub prompt_interval_ms: u64,

    /// How long the finished card is shown before the restart button appears.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Session loop rate in ticks per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Text spoken while waiting for a smile.
    #[serde(default = "default_prompt_text")]
    pub prompt_text: String,

    /// Number of digits in a participant token.
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// Mirror camera frames horizontally before detection.
    #[serde(default = "default_true")]
    pub mirror: bool,

    /// Display dimensions.
    #[serde(default)]
    pub screen: ScreenConfig,

    /// Restart button appearance.
    #[serde(default)]
    pub restart_button: RestartButtonConfig,

    /// Camera source settings.
    #[serde(default)]
    pub camera: CameraConfig,

    /// External face/smile detector settings.
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Voice prompt settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Capture artifact storage.
    #[serde(default)]
    pub captures: CaptureConfig,

    /// Participant logs.
    #[serde(default)]
    pub log: LogConfig,

    /// Per-phase background images.
    #[serde(default)]
    pub backgrounds: BackgroundConfig,

    /// Composed display output.
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt_interval_ms: default_prompt_interval_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            frame_rate: default_frame_rate(),
            prompt_text: default_prompt_text(),
            token_length: default_token_length(),
            mirror: default_true(),
            screen: ScreenConfig::default(),
            restart_button: RestartButtonConfig::default(),
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            speech: SpeechConfig::default(),
            captures: CaptureConfig::default(),
            log: LogConfig::default(),
            backgrounds: BackgroundConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `booth.json`; falls back to defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON or values.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            BoothError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `booth.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `BoothError::ConfigParseError` for unreadable files or invalid
    /// JSON, and `BoothError::ConfigValidationError` for invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(BoothError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| BoothError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    #[allow(clippy::too_many_lines)]
    pub fn validate(&self) -> Result<()> {
        if self.prompt_interval_ms == 0 {
            return Err(BoothError::config_validation(
                "promptIntervalMs must be greater than 0",
                "Set promptIntervalMs to at least 1 (3000 is a good start) in your booth.json",
            ));
        }

        if self.frame_rate == 0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(BoothError::config_validation(
                format!("frameRate must be between 1 and {MAX_FRAME_RATE}"),
                "Set frameRate to the display refresh rate, e.g. 30, in your booth.json",
            ));
        }

        if self.prompt_text.trim().is_empty() {
            return Err(BoothError::config_validation(
                "promptText must not be empty",
                "Provide the sentence to speak, e.g. \"Please smile!\", in your booth.json",
            ));
        }

        if self.token_length == 0 || self.token_length > MAX_TOKEN_LENGTH {
            return Err(BoothError::config_validation(
                format!("tokenLength must be between 1 and {MAX_TOKEN_LENGTH}"),
                "Set tokenLength to 3 in your booth.json",
            ));
        }

        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(BoothError::config_validation(
                "screen.width and screen.height must be greater than 0",
                "Set screen to the display resolution, e.g. 1920x1080, in your booth.json",
            ));
        }

        if self.restart_button.label.trim().is_empty() {
            return Err(BoothError::config_validation(
                "restartButton.label must not be empty",
                "Provide a label such as \"RESTART\" in your booth.json",
            ));
        }

        if self.restart_button.font_scale.is_nan() || self.restart_button.font_scale <= 0.0 {
            return Err(BoothError::config_validation(
                "restartButton.fontScale must be greater than 0",
                "Set restartButton.fontScale to 1.5 in your booth.json",
            ));
        }

        if self.restart_button.padding < 0 {
            return Err(BoothError::config_validation(
                "restartButton.padding must not be negative",
                "Set restartButton.padding to 20 in your booth.json",
            ));
        }

        if self.camera.frames_dir.trim().is_empty() {
            return Err(BoothError::config_validation(
                "camera.framesDir must not be empty",
                "Point camera.framesDir at a directory of frames in your booth.json",
            ));
        }

        if self.detector.command.trim().is_empty() {
            return Err(BoothError::config_validation(
                "detector.command must not be empty",
                "Provide the detector executable in detector.command in your booth.json",
            ));
        }

        if self.detector.timeout_ms == 0 {
            return Err(BoothError::config_validation(
                "detector.timeoutMs must be greater than 0",
                "Set detector.timeoutMs to 2000 in your booth.json",
            ));
        }

        if self.captures.enabled && self.captures.dir.trim().is_empty() {
            return Err(BoothError::config_validation(
                "captures.dir must not be empty when captures are enabled",
                "Set captures.dir (e.g. \"captures\") or set captures.enabled to false",
            ));
        }

        if let Some(url) = &self.log.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(BoothError::config_validation(
                    format!("log.webhookUrl '{url}' is not an http(s) URL"),
                    "Use a full URL such as https://example.com/hook, or remove log.webhookUrl",
                ));
            }
        }

        if self.display.output_path.trim().is_empty() {
            return Err(BoothError::config_validation(
                "display.outputPath must not be empty",
                "Set display.outputPath (e.g. \"display.png\") in your booth.json",
            ));
        }

        Ok(())
    }

    /// Prompt interval as a `Duration`.
    #[must_use]
    pub const fn prompt_interval(&self) -> Duration {
        Duration::from_millis(self.prompt_interval_ms)
    }

    /// Restart button reveal delay as a `Duration`.
    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Time budget for one loop iteration.
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

/// Display dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenConfig {
    /// Display width.
    #[serde(default = "default_screen_width")]
    pub width: u32,
    /// Display height.
    #[serde(default = "default_screen_height")]
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: default_screen_width(),
            height: default_screen_height(),
        }
    }
}

/// Restart button appearance, used for both drawing and hit-testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartButtonConfig {
    /// Button label.
    #[serde(default = "default_button_label")]
    pub label: String,
    /// Label font scale.
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
    /// Padding around the label, in pixels.
    #[serde(default = "default_padding")]
    pub padding: i32,
}

impl Default for RestartButtonConfig {
    fn default() -> Self {
        Self {
            label: default_button_label(),
            font_scale: default_font_scale(),
            padding: default_padding(),
        }
    }
}

/// Camera source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    /// Directory of frames replayed by the camera source.
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frames_dir: default_frames_dir(),
        }
    }
}

/// External detector process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Detector executable.
    #[serde(default = "default_detector_command")]
    pub command: String,
    /// Extra arguments passed to the detector.
    #[serde(default)]
    pub args: Vec<String>,
    /// Longest wait for one detector reply before the process is restarted.
    #[serde(default = "default_detector_timeout_ms")]
    pub timeout_ms: u64,
    /// First delay before restarting a failed detector; doubles per failure.
    #[serde(default = "default_detector_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            command: default_detector_command(),
            args: Vec::new(),
            timeout_ms: default_detector_timeout_ms(),
            restart_backoff_ms: default_detector_restart_backoff_ms(),
        }
    }
}

/// How voice prompts are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechMode {
    /// Speak inside the tick that triggers the prompt (default).
    #[default]
    Blocking,
    /// Speak on a dedicated thread; overlapping requests are dropped.
    Queued,
}

impl SpeechMode {
    /// Parses a string into a `SpeechMode`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blocking" => Some(Self::Blocking),
            "queued" => Some(Self::Queued),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for SpeechMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid speech mode '{s}': expected one of 'blocking', 'queued'"
            ))
        })
    }
}

impl Serialize for SpeechMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Blocking => "blocking",
            Self::Queued => "queued",
        };
        serializer.serialize_str(s)
    }
}

/// Voice prompt settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Text-to-speech executable; prompts are only logged when absent.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments placed before the prompt text.
    #[serde(default)]
    pub args: Vec<String>,
    /// Delivery mode.
    #[serde(default)]
    pub mode: SpeechMode,
}

/// Capture artifact storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Whether decorated face captures are written to disk.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory that receives `<token>.png` files.
    #[serde(default = "default_captures_dir")]
    pub dir: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_captures_dir(),
        }
    }
}

/// Participant log settings. Every log is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Append registrations to this JSON-lines file.
    #[serde(default)]
    pub jsonl_path: Option<String>,
    /// POST registrations to this URL.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Per-phase background images. A missing entry renders a plain canvas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    /// Start screen.
    #[serde(default)]
    pub idle: Option<String>,
    /// Smile prompt screen.
    #[serde(default)]
    pub smile: Option<String>,
    /// Registration screen with the camera overlay.
    #[serde(default)]
    pub registering: Option<String>,
    /// Finished card background.
    #[serde(default)]
    pub finished: Option<String>,
}

/// Composed display output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Where the composed frame is written.
    #[serde(default = "default_display_output")]
    pub output_path: String,
    /// Minimum time between two writes within the same phase.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// TrueType/OpenType font for the on-screen labels.
    #[serde(default)]
    pub font_path: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            output_path: default_display_output(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            font_path: None,
        }
    }
}
