//! Face and smile detection contract.
//!
//! The booth does not care how faces are found. A [`FaceLocator`] is the
//! black box that reports face and smile regions in grayscale images; the
//! [`MarkerDetector`] wraps it with the booth's behavior: track the first
//! face only, decorate it with a random marker, crop the decorated copy and
//! report whether the face is smiling.
//!
//! Detection never fails from the caller's point of view. A locator error is
//! logged and reported as "no face" so one bad frame cannot stop a session.

use image::imageops;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Stroke width of the decorative marker, in pixels.
pub const MARKER_STROKE: u32 = 3;

// ============================================================================
// Regions and markers
// ============================================================================

/// Axis-aligned region reported by a locator, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl FaceRegion {
    /// Creates a region from its top-left corner and size.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clips the region to an image of the given size.
    ///
    /// Returns `None` when nothing of the region is left inside the image.
    #[must_use]
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<Self> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let width = self.width.min(image_width - self.x);
        let height = self.height.min(image_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self::new(self.x, self.y, width, height))
    }
}

impl From<[u32; 4]> for FaceRegion {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

/// Shape drawn over a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    /// Outline of the face box.
    Square,
    /// Triangle with its apex at the top centre of the face box.
    Triangle,
    /// Circle inscribed in the face box.
    Circle,
}

impl MarkerShape {
    /// All marker shapes, in draw order.
    pub const ALL: [Self; 3] = [Self::Square, Self::Triangle, Self::Circle];
}

/// A marker shape with its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// The shape.
    pub shape: MarkerShape,
    /// Stroke color.
    pub color: Rgb<u8>,
}

impl Marker {
    /// Picks a shape uniformly at random with a random color.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let shape = MarkerShape::ALL[rng.gen_range(0..MarkerShape::ALL.len())];
        let color = Rgb([rng.gen(), rng.gen(), rng.gen()]);
        Self { shape, color }
    }

    /// Draws the marker over `region` of `image`.
    pub fn draw(&self, image: &mut RgbImage, region: FaceRegion) {
        let FaceRegion {
            x,
            y,
            width,
            height,
        } = region;

        match self.shape {
            MarkerShape::Square => {
                for inset in 0..MARKER_STROKE {
                    if width <= 2 * inset || height <= 2 * inset {
                        break;
                    }
                    let rect = Rect::at((x + inset) as i32, (y + inset) as i32)
                        .of_size(width - 2 * inset, height - 2 * inset);
                    draw_hollow_rect_mut(image, rect, self.color);
                }
            }
            MarkerShape::Triangle => {
                let left = x as f32;
                let right = (x + width - 1) as f32;
                let top = y as f32;
                let bottom = (y + height - 1) as f32;
                let apex = (x + width / 2) as f32;
                let edges = [
                    ((apex, top), (left, bottom)),
                    ((left, bottom), (right, bottom)),
                    ((right, bottom), (apex, top)),
                ];
                for (start, end) in edges {
                    for offset in 0..MARKER_STROKE {
                        let d = offset as f32 - 1.0;
                        draw_line_segment_mut(
                            image,
                            (start.0 + d, start.1),
                            (end.0 + d, end.1),
                            self.color,
                        );
                        draw_line_segment_mut(
                            image,
                            (start.0, start.1 + d),
                            (end.0, end.1 + d),
                            self.color,
                        );
                    }
                }
            }
            MarkerShape::Circle => {
                let center = ((x + width / 2) as i32, (y + height / 2) as i32);
                let radius = (width.min(height) / 2) as i32;
                for inset in 0..MARKER_STROKE as i32 {
                    if radius - inset <= 0 {
                        break;
                    }
                    draw_hollow_circle_mut(image, center, radius - inset, self.color);
                }
            }
        }
    }
}

// ============================================================================
// Detection result
// ============================================================================

/// Outcome of running detection on one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// Whether a face was found.
    pub face_found: bool,
    /// Whether the tracked face is smiling. Always `false` without a face.
    pub smiling: bool,
    /// The tracked face region, clipped to the frame.
    pub face: Option<FaceRegion>,
    /// Marker drawn over the face.
    pub marker: Option<Marker>,
    /// Decorated copy of the frame cropped to the face region.
    pub decorated_crop: Option<RgbImage>,
    /// Decorated copy of the whole frame, for the live overlay.
    pub decorated_frame: Option<RgbImage>,
}

impl DetectionResult {
    /// A result with no face.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Turns a mirrored camera frame into a [`DetectionResult`].
///
/// Implementations must not fail: errors are absorbed and reported as
/// [`DetectionResult::none`].
pub trait Detector: Send {
    /// Runs detection on `frame` without modifying it.
    fn detect(&mut self, frame: &RgbImage) -> DetectionResult;
}

/// Black-box face and smile classifier.
pub trait FaceLocator: Send {
    /// Returns face regions in `gray`, in the classifier's own order.
    fn locate_faces(&mut self, gray: &GrayImage) -> Result<Vec<FaceRegion>>;

    /// Returns smile regions inside a grayscale face crop.
    fn find_smiles(&mut self, face: &GrayImage) -> Result<Vec<FaceRegion>>;
}

// ============================================================================
// MarkerDetector
// ============================================================================

/// [`Detector`] that decorates the first located face with a random marker.
///
/// When several faces are present the first one reported by the locator is
/// tracked; there is no tie-break beyond that order.
pub struct MarkerDetector<L> {
    locator: L,
    rng: StdRng,
}

impl<L: FaceLocator> MarkerDetector<L> {
    /// Wraps `locator`, seeding marker randomness from the OS.
    pub fn new(locator: L) -> Self {
        Self {
            locator,
            rng: StdRng::from_entropy(),
        }
    }

    /// Wraps `locator` with deterministic marker randomness.
    pub fn with_seed(locator: L, seed: u64) -> Self {
        Self {
            locator,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns the wrapped locator.
    pub const fn locator(&self) -> &L {
        &self.locator
    }

    fn try_detect(&mut self, frame: &RgbImage) -> Result<DetectionResult> {
        let gray = imageops::grayscale(frame);
        let faces = self.locator.locate_faces(&gray)?;

        let Some(face) = faces
            .first()
            .and_then(|f| f.clamp_to(frame.width(), frame.height()))
        else {
            return Ok(DetectionResult::none());
        };
        if faces.len() > 1 {
            debug!(faces = faces.len(), "Several faces found, tracking the first");
        }

        let marker = Marker::random(&mut self.rng);
        let mut decorated = frame.clone();
        marker.draw(&mut decorated, face);
        let crop =
            imageops::crop_imm(&decorated, face.x, face.y, face.width, face.height).to_image();

        let face_gray =
            imageops::crop_imm(&gray, face.x, face.y, face.width, face.height).to_image();
        let smiling = !self.locator.find_smiles(&face_gray)?.is_empty();

        Ok(DetectionResult {
            face_found: true,
            smiling,
            face: Some(face),
            marker: Some(marker),
            decorated_crop: Some(crop),
            decorated_frame: Some(decorated),
        })
    }
}

impl<L: FaceLocator> Detector for MarkerDetector<L> {
    fn detect(&mut self, frame: &RgbImage) -> DetectionResult {
        match self.try_detect(frame) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Detector failed, treating frame as empty");
                DetectionResult::none()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
