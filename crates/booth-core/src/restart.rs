//! Restart button layout and hit-testing.
//!
//! The button rectangle is derived from its label, the font metrics and the
//! screen size, so the presenter and the click handler agree on it without
//! sharing any drawing state. The label is centred horizontally and its
//! baseline sits on the vertical middle of the screen.

use serde::{Deserialize, Serialize};

use crate::config::{Config, ScreenConfig};

/// Measures rendered text.
pub trait TextMetrics {
    /// Returns `(width, height)` in pixels of `text` drawn at `scale`.
    fn measure(&self, text: &str, scale: f32) -> (i32, i32);
}

/// Fixed-advance metrics approximating a Hershey simplex font.
///
/// Every glyph advances 20 px and stands 22 px tall at scale 1.0; sizes are
/// rounded up to whole pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HersheyMetrics;

impl HersheyMetrics {
    /// Horizontal advance per glyph at scale 1.0.
    pub const ADVANCE: f32 = 20.0;
    /// Cap height at scale 1.0.
    pub const HEIGHT: f32 = 22.0;
}

impl TextMetrics for HersheyMetrics {
    fn measure(&self, text: &str, scale: f32) -> (i32, i32) {
        let glyphs = text.chars().count() as f32;
        let width = (glyphs * Self::ADVANCE * scale).ceil() as i32;
        let height = (Self::HEIGHT * scale).ceil() as i32;
        (width, height)
    }
}

/// Rectangle with inclusive bounds on all four sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Leftmost column.
    pub left: i32,
    /// Topmost row.
    pub top: i32,
    /// Rightmost column.
    pub right: i32,
    /// Bottom row.
    pub bottom: i32,
}

impl Rect {
    /// Returns `true` if `(x, y)` lies inside or on the border.
    ///
    /// # Examples
    ///
    /// ```
    /// use booth_core::Rect;
    ///
    /// let rect = Rect { left: 10, top: 10, right: 20, bottom: 20 };
    /// assert!(rect.contains(10, 20));
    /// assert!(!rect.contains(21, 15));
    /// ```
    #[must_use]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Width in pixels, counting both borders.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    /// Height in pixels, counting both borders.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }
}

/// Laid-out restart button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartButton {
    /// Label text.
    pub label: String,
    /// Font scale the label is drawn at.
    pub scale: f32,
    /// Bottom-left corner of the label (text origin).
    pub baseline: (i32, i32),
    /// Measured label size.
    pub text_size: (i32, i32),
    /// Padded clickable rectangle.
    pub rect: Rect,
}

impl RestartButton {
    /// Lays out the button for a screen of the given size.
    #[must_use]
    pub fn layout(
        label: &str,
        scale: f32,
        padding: i32,
        screen: ScreenConfig,
        metrics: &impl TextMetrics,
    ) -> Self {
        let (w, h) = metrics.measure(label, scale);
        let x = (screen.width as i32 - w) / 2;
        let y = (screen.height as i32 - h) / 2;

        Self {
            label: label.to_string(),
            scale,
            baseline: (x, y),
            text_size: (w, h),
            rect: Rect {
                left: x - padding,
                top: y - padding - h,
                right: x + w + padding,
                bottom: y + padding,
            },
        }
    }

    /// Lays out the button from the `restartButton` and `screen` settings
    /// with the built-in metrics.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with(config, &HersheyMetrics)
    }

    /// Lays out the button from the settings, measuring the label with the
    /// font the presenter draws it in.
    #[must_use]
    pub fn from_config_with(config: &Config, metrics: &impl TextMetrics) -> Self {
        Self::layout(
            &config.restart_button.label,
            config.restart_button.font_scale,
            config.restart_button.padding,
            config.screen,
            metrics,
        )
    }

    /// Returns `true` if a click at `(x, y)` hits the button.
    #[must_use]
    pub const fn hit(&self, x: i32, y: i32) -> bool {
        self.rect.contains(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_hd() -> ScreenConfig {
        ScreenConfig {
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn test_hershey_metrics() {
        assert_eq!(HersheyMetrics.measure("RESTART", 1.0), (140, 22));
        assert_eq!(HersheyMetrics.measure("RESTART", 1.5), (210, 33));
        assert_eq!(HersheyMetrics.measure("", 2.0), (0, 44));
    }

    #[test]
    fn test_default_layout() {
        let button = RestartButton::layout("RESTART", 1.5, 20, full_hd(), &HersheyMetrics);

        assert_eq!(button.baseline, (855, 523));
        assert_eq!(
            button.rect,
            Rect {
                left: 835,
                top: 470,
                right: 1085,
                bottom: 543,
            }
        );
    }

    #[test]
    fn test_from_config_matches_layout() {
        let config = Config::default();
        let button = RestartButton::from_config(&config);
        assert_eq!(
            button,
            RestartButton::layout("RESTART", 1.5, 20, full_hd(), &HersheyMetrics)
        );
    }

    #[test]
    fn test_hit_is_inclusive() {
        let button = RestartButton::layout("RESTART", 1.5, 20, full_hd(), &HersheyMetrics);
        let r = button.rect;

        assert!(button.hit(r.left, r.top));
        assert!(button.hit(r.right, r.bottom));
        assert!(button.hit(960, 510));

        assert!(!button.hit(r.left - 1, r.top));
        assert!(!button.hit(r.right + 1, r.bottom));
        assert!(!button.hit(r.left, r.top - 1));
        assert!(!button.hit(r.right, r.bottom + 1));
    }

    #[test]
    fn test_zero_padding_wraps_text() {
        let button = RestartButton::layout("GO", 1.0, 0, full_hd(), &HersheyMetrics);
        assert_eq!(button.rect.width(), 41);
        assert_eq!(button.rect.height(), 23);
    }

    struct Square;

    impl TextMetrics for Square {
        fn measure(&self, _text: &str, _scale: f32) -> (i32, i32) {
            (100, 100)
        }
    }

    #[test]
    fn test_from_config_with_uses_given_metrics() {
        let config = Config::default();
        let button = RestartButton::from_config_with(&config, &Square);

        assert_eq!(button.text_size, (100, 100));
        assert_eq!(
            button,
            RestartButton::layout("RESTART", 1.5, 20, full_hd(), &Square)
        );
    }

    #[test]
    fn test_custom_metrics() {
        let button = RestartButton::layout(
            "anything",
            1.0,
            10,
            ScreenConfig {
                width: 400,
                height: 300,
            },
            &Square,
        );
        assert_eq!(button.baseline, (150, 100));
        assert_eq!(button.rect.top, -10);
        assert_eq!(button.rect.bottom, 110);
    }
}
