//! Error types for the conversion pipeline
//!
//! Resolution errors (`Io`, `Glob`) abort a batch before any image is touched.
//! Everything else is raised while working on a single image and is caught at
//! the image boundary by the pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

/// Which size constraint an image broke under the `none` resize mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionViolation {
    /// Width or height below 64 pixels
    TooSmall,
    /// Width not divisible by 4
    WidthNotMultipleOf4,
    /// Height not divisible by 4
    HeightNotMultipleOf4,
}

impl fmt::Display for DimensionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DimensionViolation::TooSmall => "width and height must be at least 64 pixels",
            DimensionViolation::WidthNotMultipleOf4 => "width must be a multiple of 4",
            DimensionViolation::HeightNotMultipleOf4 => "height must be a multiple of 4",
        };
        f.write_str(msg)
    }
}

/// Conversion errors
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Glob expansion failed for '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("Failed to decode PNG {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid dimensions for {} ({width}x{height}): {violation}", .path.display())]
    InvalidDimensions {
        path: PathBuf,
        width: u32,
        height: u32,
        violation: DimensionViolation,
    },

    #[error("Compression failed for {}: {message}", .path.display())]
    Compression { path: PathBuf, message: String },

    #[error("Failed to parse spritesheet {}: {message}", .path.display())]
    MetadataParse { path: PathBuf, message: String },
}

impl ConvertError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Errors that stop the whole batch when raised during target resolution
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, ConvertError::Io { .. } | ConvertError::Glob { .. })
    }
}
