//! Conversion request and per-image descriptors
//!
//! Defines the global options for a batch and how they combine with
//! per-target overrides into the settings used for each image.

use crate::overrides::{OverrideStore, ResizeMode};
use crate::paths;

use std::path::{Path, PathBuf};

/// Default encoder quality when nothing else is given
pub const DEFAULT_QUALITY: f64 = 0.5;

/// Compressed texture container written by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Crunch `.crn`
    #[default]
    Crn,
    /// DirectDraw Surface `.dds`
    Dds,
}

impl OutputFormat {
    /// Value passed to the encoder's `-fileformat` flag
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Crn => "crn",
            OutputFormat::Dds => "dds",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.name()
    }
}

/// What to convert: a single glob, several globs, or a manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Pattern(String),
    Patterns(Vec<String>),
    Manifest(PathBuf),
}

impl TargetSpec {
    /// Build from raw CLI values. A lone value ending in `.txt` is a manifest.
    pub fn from_args(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            let value = values.remove(0);
            if Path::new(&value).extension().is_some_and(|e| e == "txt") {
                TargetSpec::Manifest(PathBuf::from(value))
            } else {
                TargetSpec::Pattern(value)
            }
        } else {
            TargetSpec::Patterns(values)
        }
    }
}

/// Global options for a batch
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Encoder quality, 0-1
    pub quality: f64,

    /// Convert to premultiplied alpha before compressing
    pub premultiply: bool,

    /// Output container
    pub format: OutputFormat,

    /// Delete the source PNG after a successful conversion
    pub delete_source: bool,

    /// Resize policy for targets without their own
    pub resize: ResizeMode,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            premultiply: true,
            format: OutputFormat::Crn,
            delete_source: false,
            resize: ResizeMode::None,
        }
    }
}

impl ConvertOptions {
    /// Validate the options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(ConfigError::QualityOutOfRange(self.quality));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Quality must be between 0 and 1, got {0}")]
    QualityOutOfRange(f64),

    #[error("No targets given")]
    NoTargets,
}

/// One batch: targets plus global options. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub targets: TargetSpec,
    pub options: ConvertOptions,
}

impl ConversionRequest {
    pub fn new(targets: TargetSpec, options: ConvertOptions) -> Result<Self, ConfigError> {
        let empty = match &targets {
            TargetSpec::Pattern(p) => p.trim().is_empty(),
            TargetSpec::Patterns(list) => list.is_empty(),
            TargetSpec::Manifest(_) => false,
        };
        if empty {
            return Err(ConfigError::NoTargets);
        }
        options.validate()?;
        Ok(Self { targets, options })
    }
}

/// Fully resolved settings for one image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    pub source: PathBuf,
    pub quality: f64,
    pub premultiply: bool,
    pub format: OutputFormat,
    pub resize: ResizeMode,
    pub delete_source: bool,
}

impl ImageDescriptor {
    /// Combine the override registered for `source` (if any) with the
    /// global options. Override beats global option.
    pub fn resolve(source: &Path, store: &OverrideStore, options: &ConvertOptions) -> Self {
        let source = paths::to_absolute(source);
        let key = source.to_string_lossy();
        let target_override = store.get(&key).copied().unwrap_or_default();

        Self {
            quality: target_override.quality.unwrap_or(options.quality),
            premultiply: options.premultiply,
            format: options.format,
            resize: target_override.resize.unwrap_or(options.resize),
            delete_source: options.delete_source,
            source,
        }
    }

    /// `<dir>/<name>.crn` or `<dir>/<name>.dds` next to the source
    pub fn output_path(&self) -> PathBuf {
        self.source.with_extension(self.format.extension())
    }
}
