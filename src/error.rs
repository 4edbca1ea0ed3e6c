//! Error types for visual regression checks

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for check operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a visual regression check
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or attach to the rendering surface
    #[error("Surface initialization failed: {0}")]
    InitializationError(String),

    /// A document failed to load
    #[error("Failed to load document: {0}")]
    LoadError(String),

    /// The target selector matched no element, so there is nothing to clip
    #[error("Target element not found for selector `{0}`")]
    TargetNotFound(String),

    /// Script evaluation in the page failed or returned an unexpected value
    #[error("Script evaluation failed: {0}")]
    ScriptError(String),

    /// Screenshot capture failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Captured images differ beyond the configured threshold
    #[error(
        "Case `{case}`: images differ by {diff_pixels} pixels ({ratio:.4} ratio), threshold {threshold}{}",
        .diff_path.as_ref().map(|p| format!(", diff written to {}", p.display())).unwrap_or_default()
    )]
    ImageMismatch {
        case: String,
        diff_pixels: u64,
        ratio: f64,
        threshold: f64,
        diff_path: Option<PathBuf>,
    },

    /// Captured images differ in size and mismatches are not allowed
    #[error("Expected image to be {expected:?} (w, h) but was {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Snapshot directory or file I/O failed
    #[error("Environment error at {path}: {reason}")]
    EnvironmentError { path: PathBuf, reason: String },

    /// Failed to decode or encode an image
    #[error("Image error: {0}")]
    ImageError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn env(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::EnvironmentError {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
