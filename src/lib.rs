//! Raw capture processing built around the DNG `Negative` model.
//!
//! The crate parses DNG/TIFF tag directories, rebuilds a linear demosaiced
//! image through three stages, manages camera colour profiles, fingerprints
//! image content with MD5 and writes the result back out as DNG or TIFF.

pub mod image_pipeline;
pub mod logger;
