//! Display composition.
//!
//! Builds the full-screen image for the current phase: the phase background,
//! the live camera overlay while the booth is watching for a smile or waiting
//! for a name, the photo card once the participant is registered, and the
//! restart button. The composed frame is written to a PNG file that the
//! kiosk screen shows.
//!
//! Labels (participant name, token, button caption) are rendered with the
//! font from `display.fontPath`, measured with the same metrics the restart
//! hit-test was laid out with. Without a font they are drawn as plates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ab_glyph::{FontArc, PxScale};
use booth_core::{
    BackgroundConfig, BoothError, Config, DisplayConfig, HersheyMetrics, Phase, PresentView,
    Presenter, Result, ScreenConfig, TextMetrics,
};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;

/// Camera overlay region: left, top, width, height.
pub const CAMERA_ROI: (i64, i64, u32, u32) = (645, 130, 630, 530);

/// Photo card size on the finished screen.
pub const CARD_SIZE: (u32, u32) = (666, 887);

/// Gap between the photo card and the right screen edge.
pub const CARD_RIGHT_MARGIN: i64 = 150;

/// Top of the photo card.
pub const CARD_TOP: i64 = 100;

/// Scale of the name and token labels.
const LABEL_SCALE: f32 = 1.5;

/// Font pixel height at scale 1.0.
const FONT_PX_PER_SCALE: f32 = 30.0;

const RESTART_GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_COLOR: Rgb<u8> = Rgb([0, 90, 0]);

const fn canvas_color(phase: Phase) -> Rgb<u8> {
    match phase {
        Phase::Idle => Rgb([24, 24, 48]),
        Phase::AwaitingSmile => Rgb([250, 200, 40]),
        Phase::Registering => Rgb([40, 140, 220]),
        Phase::Finished => Rgb([30, 30, 30]),
    }
}

// ============================================================================
// Backgrounds
// ============================================================================

/// Per-phase background images, scaled to the screen.
#[derive(Debug, Clone, Default)]
pub struct Backgrounds {
    idle: Option<RgbImage>,
    smile: Option<RgbImage>,
    registering: Option<RgbImage>,
    finished: Option<RgbImage>,
}

impl Backgrounds {
    /// Loads every configured background.
    ///
    /// A configured image that is missing or cannot be decoded is a startup
    /// failure.
    pub fn load(config: &BackgroundConfig, screen: ScreenConfig) -> Result<Self> {
        let load = |path: &Option<String>| {
            path.as_deref()
                .map(|p| load_background(Path::new(p), screen))
                .transpose()
        };

        Ok(Self {
            idle: load(&config.idle)?,
            smile: load(&config.smile)?,
            registering: load(&config.registering)?,
            finished: load(&config.finished)?,
        })
    }

    /// Background for `phase`, if one was configured.
    pub const fn for_phase(&self, phase: Phase) -> Option<&RgbImage> {
        match phase {
            Phase::Idle => self.idle.as_ref(),
            Phase::AwaitingSmile => self.smile.as_ref(),
            Phase::Registering => self.registering.as_ref(),
            Phase::Finished => self.finished.as_ref(),
        }
    }
}

fn load_background(path: &Path, screen: ScreenConfig) -> Result<RgbImage> {
    if !path.exists() {
        return Err(BoothError::asset_not_found(path));
    }

    let image = image::open(path)
        .map_err(|e| BoothError::asset_decode(path, e.to_string()))?
        .to_rgb8();

    if image.dimensions() == (screen.width, screen.height) {
        Ok(image)
    } else {
        tracing::debug!(
            path = %path.display(),
            from = ?image.dimensions(),
            "Scaling background to screen size"
        );
        Ok(imageops::resize(
            &image,
            screen.width,
            screen.height,
            FilterType::Triangle,
        ))
    }
}

// ============================================================================
// LabelFont
// ============================================================================

/// Font the labels are drawn with.
#[derive(Clone, Default)]
pub enum LabelFont {
    /// No font configured: each label is a solid plate of its measured size.
    #[default]
    Plates,
    /// Glyphs rasterized from a TrueType/OpenType font.
    Font(FontArc),
}

impl fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plates => f.write_str("Plates"),
            Self::Font(_) => f.write_str("Font"),
        }
    }
}

impl LabelFont {
    /// Loads the font named by `display.fontPath`.
    ///
    /// A configured font that is missing or unreadable is a startup failure.
    pub fn load(config: &DisplayConfig) -> Result<Self> {
        let Some(path) = config.font_path.as_deref() else {
            tracing::warn!("No display.fontPath configured, labels are drawn as plates");
            return Ok(Self::Plates);
        };

        let path = Path::new(path);
        if !path.exists() {
            return Err(BoothError::asset_not_found(path));
        }
        let bytes =
            std::fs::read(path).map_err(|e| BoothError::asset_decode(path, e.to_string()))?;
        let font =
            FontArc::try_from_vec(bytes).map_err(|e| BoothError::asset_decode(path, e.to_string()))?;

        tracing::info!(path = %path.display(), "Label font loaded");
        Ok(Self::Font(font))
    }

    fn px(scale: f32) -> PxScale {
        PxScale::from(FONT_PX_PER_SCALE * scale)
    }

    /// Draws `text` with its bottom-left corner at `(x, baseline)`.
    pub fn draw(
        &self,
        canvas: &mut RgbImage,
        text: &str,
        (x, baseline): (i32, i32),
        scale: f32,
        color: Rgb<u8>,
    ) {
        let (w, h) = self.measure(text, scale);
        if w <= 0 || h <= 0 {
            return;
        }
        match self {
            Self::Plates => draw_filled_rect_mut(
                canvas,
                PixelRect::at(x, baseline - h).of_size(w as u32, h as u32),
                color,
            ),
            Self::Font(font) => {
                draw_text_mut(canvas, color, x, baseline - h, Self::px(scale), font, text);
            }
        }
    }
}

impl TextMetrics for LabelFont {
    fn measure(&self, text: &str, scale: f32) -> (i32, i32) {
        match self {
            Self::Plates => HersheyMetrics.measure(text, scale),
            Self::Font(font) => {
                let (w, h) = text_size(Self::px(scale), font, text);
                (w as i32, h as i32)
            }
        }
    }
}

/// Name and token lines of the finished card.
fn card_labels(name: &str, token: &str) -> (String, String) {
    (
        format!("NAME: {}", name.to_uppercase()),
        format!("TOKEN: {token}"),
    )
}

// ============================================================================
// DisplayComposer
// ============================================================================

/// Presenter writing the composed screen to a PNG file.
///
/// The file is rewritten on every phase change and otherwise at most once
/// per snapshot interval.
#[derive(Debug)]
pub struct DisplayComposer {
    screen: ScreenConfig,
    backgrounds: Backgrounds,
    font: LabelFont,
    output: PathBuf,
    interval: Duration,
    last_phase: Option<Phase>,
    last_write: Option<Instant>,
    writes: u64,
}

impl DisplayComposer {
    /// Creates a composer for the `screen` and `display` settings.
    ///
    /// `font` must be the one the restart button was laid out with.
    pub fn new(config: &Config, backgrounds: Backgrounds, font: LabelFont) -> Self {
        Self {
            screen: config.screen,
            backgrounds,
            font,
            output: PathBuf::from(&config.display.output_path),
            interval: Duration::from_millis(config.display.snapshot_interval_ms),
            last_phase: None,
            last_write: None,
            writes: 0,
        }
    }

    /// Number of frames written so far.
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Composes the screen for `view`.
    pub fn compose(&self, view: &PresentView<'_>) -> RgbImage {
        let state = view.state;
        let phase = state.phase();
        let mut canvas = self.backgrounds.for_phase(phase).cloned().unwrap_or_else(|| {
            RgbImage::from_pixel(self.screen.width, self.screen.height, canvas_color(phase))
        });

        match phase {
            Phase::Idle => {}
            Phase::AwaitingSmile | Phase::Registering => {
                if let Some(overlay) = view.overlay {
                    let (x, y, w, h) = CAMERA_ROI;
                    let scaled = imageops::resize(overlay, w, h, FilterType::Triangle);
                    imageops::overlay(&mut canvas, &scaled, x, y);
                }
                let name = state.participant_name();
                if !name.is_empty() {
                    let baseline = CAMERA_ROI.1 as i32 + CAMERA_ROI.3 as i32 + 80;
                    let x = self.centered(self.screen.width as i32, name);
                    self.font
                        .draw(&mut canvas, name, (x, baseline), LABEL_SCALE, LABEL_COLOR);
                }
            }
            Phase::Finished => {
                let (card_w, card_h) = CARD_SIZE;
                let card_x = i64::from(self.screen.width) - i64::from(card_w) - CARD_RIGHT_MARGIN;
                if let Some(photo) = state.captured_image() {
                    let card = imageops::resize(photo, card_w, card_h, FilterType::Triangle);
                    imageops::overlay(&mut canvas, &card, card_x, CARD_TOP);
                }

                let text_area = card_x.max(0) as i32;
                let (name, token) = card_labels(state.participant_name(), state.token());
                for (line, baseline) in [(name, 420), (token, 540)] {
                    let x = self.centered(text_area, &line);
                    self.font
                        .draw(&mut canvas, &line, (x, baseline), LABEL_SCALE, LABEL_COLOR);
                }

                if state.restart_button_visible() {
                    let button = view.restart_button;
                    let r = button.rect;
                    draw_filled_rect_mut(
                        &mut canvas,
                        PixelRect::at(r.left, r.top).of_size(r.width() as u32, r.height() as u32),
                        RESTART_GREEN,
                    );
                    self.font.draw(
                        &mut canvas,
                        &button.label,
                        button.baseline,
                        button.scale,
                        CAPTION_COLOR,
                    );
                }
            }
        }

        canvas
    }

    /// Left edge of a label centred in a span of `width` pixels.
    fn centered(&self, width: i32, text: &str) -> i32 {
        let (w, _) = self.font.measure(text, LABEL_SCALE);
        (width - w) / 2
    }

    fn due(&self, phase: Phase, now: Instant) -> bool {
        self.last_phase != Some(phase)
            || self
                .last_write
                .map_or(true, |at| now.saturating_duration_since(at) >= self.interval)
    }
}

impl Presenter for DisplayComposer {
    fn present(&mut self, view: &PresentView<'_>) {
        let now = Instant::now();
        let phase = view.state.phase();
        if !self.due(phase, now) {
            return;
        }

        let frame = self.compose(view);
        match frame.save_with_format(&self.output, image::ImageFormat::Png) {
            Ok(()) => {
                self.writes += 1;
                tracing::trace!(
                    path = %self.output.display(),
                    phase = %phase,
                    writes = self.writes,
                    "Display written"
                );
            }
            Err(e) => {
                tracing::warn!(path = %self.output.display(), error = %e, "Failed to write display");
            }
        }
        self.last_phase = Some(phase);
        self.last_write = Some(now);
    }
}
