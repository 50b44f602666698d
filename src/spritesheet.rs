//! Spritesheet metadata patching
//!
//! Texture atlases ship with a JSON sidecar (`name.json` next to
//! `name.png`) whose `meta.image` names the atlas image. After conversion it
//! has to point at the compressed file instead.

use crate::error::ConvertError;
use crate::paths;

use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Point `meta.image` in the JSON document at `image_name`
pub fn set_image_reference(doc: &mut Value, image_name: &str) -> Result<(), String> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| "top-level value is not an object".to_string())?;

    let meta = root
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    let meta = meta
        .as_object_mut()
        .ok_or_else(|| "`meta` is not an object".to_string())?;

    meta.insert("image".to_string(), Value::String(image_name.to_string()));
    Ok(())
}

/// Rewrite the spritesheet next to `source` (if there is one) so it
/// references `output`. Returns whether a spritesheet was patched.
pub fn patch_spritesheet(source: &Path, output: &Path) -> Result<bool, ConvertError> {
    let json_path = paths::spritesheet_path(source);
    if !json_path.exists() {
        return Ok(false);
    }

    info!(
        "modifying {} to point to {}",
        paths::display_relative(&json_path),
        paths::file_name(output)
    );

    let text = std::fs::read_to_string(&json_path).map_err(|e| ConvertError::io(&json_path, e))?;

    let mut doc: Value = serde_json::from_str(&text).map_err(|e| ConvertError::MetadataParse {
        path: json_path.clone(),
        message: e.to_string(),
    })?;

    set_image_reference(&mut doc, &paths::file_name(output)).map_err(|message| {
        ConvertError::MetadataParse {
            path: json_path.clone(),
            message,
        }
    })?;

    let updated = serde_json::to_string(&doc).map_err(|e| ConvertError::MetadataParse {
        path: json_path.clone(),
        message: e.to_string(),
    })?;
    std::fs::write(&json_path, updated).map_err(|e| ConvertError::io(&json_path, e))?;

    Ok(true)
}
