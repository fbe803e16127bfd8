//! Capture artifact storage.

use std::fs;
use std::path::{Path, PathBuf};

use booth_core::{BoothError, CaptureStore};
use image::RgbImage;
use tracing::debug;

use crate::Result;

/// Writes decorated face captures as `<dir>/<token>.png`.
///
/// The directory is created on first use. Two participants with the same
/// token overwrite each other's capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryCaptureStore {
    dir: PathBuf,
}

impl DirectoryCaptureStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory receiving the captures.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the capture for `token` is written to.
    #[must_use]
    pub fn path_for(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.png"))
    }

    /// Writes `image` for `token` and returns its path.
    pub fn write(&self, token: &str, image: &RgbImage) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(token);
        image.save_with_format(&path, image::ImageFormat::Png)?;
        debug!(path = %path.display(), "Capture written");
        Ok(path)
    }
}

impl CaptureStore for DirectoryCaptureStore {
    fn store(&mut self, token: &str, image: &RgbImage) -> booth_core::Result<Option<PathBuf>> {
        self.write(token, image)
            .map(Some)
            .map_err(|e| BoothError::capture_write(self.path_for(token), e.to_string()))
    }
}
