//! Raw file readers producing a negative with its stage 1 image.
//!
//! DNG files go through the tag parser; other camera raws are imported
//! through `rawloader`.

mod dng_reader;
mod rawloader_reader;
mod reader;

pub use dng_reader::DngReader;
pub use rawloader_reader::RawLoaderReader;
pub use reader::{AutoReader, RawImageReader};
