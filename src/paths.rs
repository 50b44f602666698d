//! Path helpers for sibling files written next to a source image
//!
//! Every file the pipeline touches lives in the source image's directory:
//! - `<name>.crn` / `<name>.dds` encoder output
//! - `<name>_pma.png` premultiplied temp input
//! - `<name>.json` spritesheet metadata

use std::path::{Path, PathBuf};

/// Make a path absolute against the current working directory.
/// Falls back to the path unchanged if the working directory is unavailable.
pub fn to_absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `dir/name.png` + `_pma` -> `dir/name_pma.png`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Spritesheet metadata path for an image: `dir/name.png` -> `dir/name.json`
pub fn spritesheet_path(image: &Path) -> PathBuf {
    image.with_extension("json")
}

/// File name only, as a string (for metadata references)
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Path relative to the working directory when it's inside it, for logging
pub fn display_relative(path: &Path) -> String {
    if let Ok(cwd) = std::env::current_dir() {
        if let Ok(rel) = path.strip_prefix(&cwd) {
            return rel.display().to_string();
        }
    }
    path.display().to_string()
}
