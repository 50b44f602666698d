//! crnbatch - batch PNG to CRN/DDS texture conversion
//!
//! Prepares PNGs (size repair, premultiplied alpha), hands them to the
//! bundled crunch encoder one at a time, and keeps spritesheet metadata
//! pointing at the compressed output.

pub mod crunch;
pub mod error;
pub mod overrides;
pub mod paths;
pub mod pipeline;
pub mod request;
pub mod resolver;
pub mod spritesheet;
pub mod textures;
