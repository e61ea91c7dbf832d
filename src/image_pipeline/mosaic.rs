//! Colour filter array description and demosaicing.

pub mod info;
pub mod interpolate;
pub mod resample;

pub use info::{MosaicInfo, MosaicKind};
