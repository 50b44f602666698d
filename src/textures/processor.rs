//! Image preparation ahead of block compression
//!
//! Decodes the source PNG, makes sure its size is something the encoder can
//! take (4x4 blocks, at least 64 pixels per side), and optionally converts
//! it to premultiplied alpha. Whatever file the encoder should read ends up
//! in [`PreparedImage::input`].

use crate::error::{ConvertError, DimensionViolation};
use crate::overrides::ResizeMode;
use crate::paths;
use crate::request::ImageDescriptor;

use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Smallest width/height the encoder accepts
pub const MIN_DIMENSION: u32 = 64;

/// Block size dimensions must be a multiple of
pub const BLOCK_SIZE: u32 = 4;

/// Suffix for the temporary premultiplied copy
pub const PREMULTIPLIED_SUFFIX: &str = "_pma";

/// Suffix for the temporary padded copy when premultiplication is off
pub const BORDER_SUFFIX: &str = "_border";

/// Encoder input produced for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// File the encoder should read
    pub input: PathBuf,
    /// Set when `input` is a temp file that must be removed after compression
    pub temp_file: Option<PathBuf>,
    /// Target size the encoder should rescale to (scale mode only)
    pub rescale: Option<(u32, u32)>,
}

/// Read and decode a PNG into RGBA8
pub fn decode_png(path: &Path) -> Result<RgbaImage, ConvertError> {
    let data = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    image::load_from_memory_with_format(&data, ImageFormat::Png)
        .map(|img| img.into_rgba8())
        .map_err(|source| ConvertError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Write an RGBA8 buffer as PNG
pub fn write_png(img: &RgbaImage, path: &Path) -> Result<(), ConvertError> {
    img.save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => ConvertError::io(path, io),
            other => ConvertError::io(path, std::io::Error::other(other)),
        })
}

/// Round one dimension up to the next multiple of 4, but no lower than 64
fn valid_dimension(value: u32) -> u32 {
    value.div_ceil(BLOCK_SIZE).saturating_mul(BLOCK_SIZE).max(MIN_DIMENSION)
}

/// Smallest size >= the given one that the encoder accepts
pub fn valid_size(width: u32, height: u32) -> (u32, u32) {
    (valid_dimension(width), valid_dimension(height))
}

/// Reject sizes the encoder can't take, naming the first broken constraint
pub fn check_dimensions(width: u32, height: u32) -> Result<(), DimensionViolation> {
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(DimensionViolation::TooSmall);
    }
    if width % BLOCK_SIZE != 0 {
        return Err(DimensionViolation::WidthNotMultipleOf4);
    }
    if height % BLOCK_SIZE != 0 {
        return Err(DimensionViolation::HeightNotMultipleOf4);
    }
    Ok(())
}

/// Pad to a valid size with transparent black on the right and bottom.
/// The original pixels stay at the top-left.
pub fn add_border(img: &RgbaImage) -> RgbaImage {
    let (width, height) = valid_size(img.width(), img.height());
    let mut padded = RgbaImage::new(width, height);
    image::imageops::replace(&mut padded, img, 0, 0);
    padded
}

/// Scale color channels by alpha in place. Alpha is left as is.
pub fn premultiply_alpha(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let alpha = pixel[3] as u16;
        for channel in &mut pixel.0[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
}

/// Run the decode -> size -> premultiply steps for one image.
///
/// Writes a temp PNG beside the source when the pixels had to change, and
/// reports it in [`PreparedImage::temp_file`] so the caller can remove it.
pub fn prepare_image(desc: &ImageDescriptor) -> Result<PreparedImage, ConvertError> {
    let source = &desc.source;
    let mut img = decode_png(source)?;
    let (width, height) = img.dimensions();

    let mut padded = false;
    let mut rescale = None;

    match desc.resize {
        ResizeMode::None => {
            check_dimensions(width, height).map_err(|violation| ConvertError::InvalidDimensions {
                path: source.clone(),
                width,
                height,
                violation,
            })?;
        }
        ResizeMode::Border => {
            let target = valid_size(width, height);
            if target != (width, height) {
                debug!("Padding {}x{} -> {}x{}", width, height, target.0, target.1);
                img = add_border(&img);
                padded = true;
            }
        }
        ResizeMode::Scale => {
            let target = valid_size(width, height);
            debug!("Encoder will rescale {}x{} -> {}x{}", width, height, target.0, target.1);
            rescale = Some(target);
        }
    }

    let temp_file = if desc.premultiply {
        info!(
            "converting {} to premultiplied alpha",
            paths::display_relative(source)
        );
        premultiply_alpha(&mut img);
        let out = paths::with_suffix(source, PREMULTIPLIED_SUFFIX);
        write_png(&img, &out)?;
        Some(out)
    } else if padded {
        let out = paths::with_suffix(source, BORDER_SUFFIX);
        write_png(&img, &out)?;
        Some(out)
    } else {
        None
    };

    Ok(PreparedImage {
        input: temp_file.clone().unwrap_or_else(|| source.clone()),
        temp_file,
        rescale,
    })
}
