//! Texture preparation
//!
//! Pixel-level work done before the external encoder runs: size repair and
//! premultiplied alpha.

mod processor;

pub use processor::{
    add_border, check_dimensions, decode_png, premultiply_alpha, prepare_image, valid_size,
    write_png, PreparedImage, BLOCK_SIZE, BORDER_SUFFIX, MIN_DIMENSION, PREMULTIPLIED_SUFFIX,
};
