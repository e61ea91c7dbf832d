//! The negative: one raw capture moving through parse, stage 1, stage 2
//! and stage 3, with the digests that identify it.

pub mod digest;
pub mod legacy_digest;
pub mod model;
pub mod parse;
pub mod stage1;
pub mod stages;

#[cfg(test)]
mod tests;

pub use digest::{DIGEST_TILE_ROWS, image_digest, legacy_image_digest};
pub use model::{Negative, NegativeState, NoiseFunction, NoiseProfile, RawImageStage};
pub use parse::{COLORIMETRIC_REFERENCE_ICC_PCS, D50_XY};
pub use stage1::read_raw_image;
