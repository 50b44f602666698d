//! Target resolution
//!
//! Turns a glob, a list of globs, or a manifest into a flat list of absolute
//! PNG paths. Each path inherits the override of the pattern that produced it.

use crate::error::ConvertError;
use crate::overrides::{read_manifest, OverrideStore, TargetOverride};
use crate::paths;
use crate::request::TargetSpec;

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turn a target into the glob that actually gets expanded. Targets that
/// don't mention `.png` are directories and get searched recursively.
pub fn target_to_glob(target: &str) -> String {
    if target.contains(".png") {
        target.to_string()
    } else {
        Path::new(target)
            .join("**")
            .join("*.png")
            .to_string_lossy()
            .into_owned()
    }
}

/// Expand one target into absolute paths, in filesystem enumeration order
pub fn expand_target(target: &str) -> Result<Vec<PathBuf>, ConvertError> {
    let pattern = target_to_glob(target);

    let entries = glob::glob(&pattern).map_err(|e| ConvertError::Glob {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    entries
        .map(|entry| {
            entry
                .map(|p| paths::to_absolute(&p))
                .map_err(|e| ConvertError::Glob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
        })
        .collect()
}

/// List the raw targets named by a spec, reading the manifest if needed
pub fn list_targets(
    spec: &TargetSpec,
    store: &mut OverrideStore,
) -> Result<Vec<String>, ConvertError> {
    match spec {
        TargetSpec::Pattern(p) => Ok(vec![p.clone()]),
        TargetSpec::Patterns(list) => Ok(list.clone()),
        TargetSpec::Manifest(path) => {
            let path = paths::to_absolute(path);
            info!("Reading target list {}", paths::display_relative(&path));
            read_manifest(&path, store)
        }
    }
}

/// Resolve a target spec into the ordered list of images to convert.
///
/// Every returned path is registered in `store` under its own absolute path
/// with the override of the pattern that produced it (replacing anything it
/// had before). A path matched by several patterns is listed once, at its
/// first position, and keeps the override of the last pattern that matched it.
pub fn resolve_targets(
    spec: &TargetSpec,
    store: &mut OverrideStore,
) -> Result<Vec<PathBuf>, ConvertError> {
    let targets = list_targets(spec, store)?;

    let expanded: Vec<Vec<PathBuf>> = targets
        .par_iter()
        .map(|t| expand_target(t))
        .collect::<Result<_, _>>()?;

    // Read every pattern's override before any path is written back, since a
    // pattern string can equal a path matched by an earlier pattern.
    let pattern_overrides: Vec<Option<TargetOverride>> =
        targets.iter().map(|t| store.get(t).copied()).collect();

    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for ((target, matches), target_override) in
        targets.iter().zip(expanded).zip(pattern_overrides)
    {
        debug!("{} matched {} images", target, matches.len());

        for path in matches {
            store.assign(path.to_string_lossy(), target_override);
            if seen.insert(path.clone()) {
                images.push(path);
            }
        }
    }

    info!("Resolved {} images from {} targets", images.len(), targets.len());
    Ok(images)
}
