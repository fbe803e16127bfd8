//! JSON-lines participant log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use booth_core::{BoothError, ExternalLog, Registration};

use crate::Result;

/// Appends one compact JSON object per registration to a file.
///
/// The file and its parent directory are created on first append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLinesLog {
    path: PathBuf,
}

impl JsonLinesLog {
    /// Creates a log writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the log appends to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders the line written for `registration`, without the newline.
    pub fn line(registration: &Registration) -> Result<String> {
        Ok(serde_json::to_string(registration)?)
    }

    /// Appends `registration` to the file.
    pub fn write(&self, registration: &Registration) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut line = Self::line(registration)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl ExternalLog for JsonLinesLog {
    fn append(&mut self, registration: &Registration) -> booth_core::Result<()> {
        self.write(registration)
            .map_err(|e| BoothError::log_append("jsonl", e.to_string()))
    }
}
