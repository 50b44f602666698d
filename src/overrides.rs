//! Per-target quality/resize overrides and manifest parsing
//!
//! A manifest is a text file with one target per line:
//!
//! ```text
//! sprites/ui.png 0.8 border
//! sprites/characters 1
//! backgrounds/*.png scale
//! ```
//!
//! Trailing quality numbers and resize keywords are stripped from the target
//! and recorded in an [`OverrideStore`] keyed by the remaining target string.

use crate::error::ConvertError;

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// How to deal with images whose dimensions the encoder can't take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResizeMode {
    /// Reject images that are too small or not a multiple of 4
    #[default]
    #[value(skip)]
    None,
    /// Pad right/bottom with transparent pixels
    Border,
    /// Let the encoder rescale to a valid size
    Scale,
}

impl ResizeMode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "border" => Some(ResizeMode::Border),
            "scale" => Some(ResizeMode::Scale),
            _ => None,
        }
    }
}

/// Optional per-target settings. A field left as `None` falls back to the
/// global option.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetOverride {
    pub quality: Option<f64>,
    pub resize: Option<ResizeMode>,
}

impl TargetOverride {
    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.resize.is_none()
    }
}

/// Overrides keyed by the literal target string (pattern or path).
///
/// Created per batch, filled during resolution, read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct OverrideStore {
    entries: HashMap<String, TargetOverride>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the override for a target. `None` means the target has none.
    pub fn get(&self, target: &str) -> Option<&TargetOverride> {
        self.entries.get(target)
    }

    /// Record an override for a target. Empty overrides are not stored.
    pub fn record(&mut self, target: impl Into<String>, value: TargetOverride) {
        let target = target.into();
        if value.is_empty() {
            self.entries.remove(&target);
        } else {
            self.entries.insert(target, value);
        }
    }

    /// Replace whatever `target` carries with `value`, including clearing it
    /// when `value` is absent.
    pub fn assign(&mut self, target: impl Into<String>, value: Option<TargetOverride>) {
        let target = target.into();
        match value {
            Some(v) => self.record(target, v),
            None => {
                self.entries.remove(&target);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<target>.+?)(?:\s+(?P<quality>\d*\.?\d+))?(?:\s+(?P<resize>scale|border))?$",
        )
        .expect("manifest line pattern is valid")
    })
}

/// Split one trimmed manifest line into its target and trailing override
fn parse_line(line: &str) -> (String, TargetOverride) {
    let Some(caps) = line_pattern().captures(line) else {
        return (line.to_string(), TargetOverride::default());
    };

    let target = caps
        .name("target")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let quality = caps
        .name("quality")
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let resize = caps
        .name("resize")
        .and_then(|m| ResizeMode::from_keyword(m.as_str()));

    (target, TargetOverride { quality, resize })
}

/// Parse manifest text into its ordered targets, recording overrides found
/// at the end of each line into `store`.
pub fn parse_manifest(text: &str, store: &mut OverrideStore) -> Vec<String> {
    let mut targets = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (target, value) = parse_line(line);
        if !value.is_empty() {
            debug!(
                "Manifest override for {}: quality={:?} resize={:?}",
                target, value.quality, value.resize
            );
            store.record(target.clone(), value);
        }
        targets.push(target);
    }

    targets
}

/// Read and parse a manifest file
pub fn read_manifest(path: &Path, store: &mut OverrideStore) -> Result<Vec<String>, ConvertError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
    Ok(parse_manifest(&text, store))
}
