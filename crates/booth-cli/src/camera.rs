//! Directory replay camera.
//!
//! Frames are read from image files in a directory, in file name order, and
//! replayed in a loop. A capture device that dumps JPEG frames into a
//! directory, or a recorded session, can drive the booth this way.

use std::fs;
use std::path::{Path, PathBuf};

use booth_core::{BoothError, Camera, Result};
use image::RgbImage;

/// File extensions recognised as frames.
const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Camera replaying the image files of a directory.
#[derive(Debug)]
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    /// Opens `dir` and indexes its frames.
    ///
    /// A missing directory or one without frames is a startup failure.
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            BoothError::camera_unavailable(format!(
                "cannot read frames directory '{}': {e}",
                dir.display()
            ))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(BoothError::camera_unavailable(format!(
                "no PNG or JPEG frames in '{}'",
                dir.display()
            )));
        }

        tracing::info!(dir = %dir.display(), frames = frames.len(), "Camera opened");
        Ok(Self { frames, next: 0 })
    }

    /// Number of frames in the replay loop.
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

impl Camera for DirectoryCamera {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let path = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();

        let frame = image::open(path).map_err(|e| {
            BoothError::camera_read(format!("failed to decode '{}': {e}", path.display()))
        })?;
        Ok(Some(frame.to_rgb8()))
    }
}
