//! Output side: DNG containers and plain TIFF exports.

pub mod directory_builder;
mod dng_writer;
mod image_writer;
mod metadata_tags;
mod standard_tiff_writer;
pub mod types;

pub use directory_builder::{DirectoryBlock, DirectoryBuilder, MAX_TAG_ENTRIES};
pub use dng_writer::DngWriter;
pub use image_writer::ImageWriter;
pub use standard_tiff_writer::StandardTiffWriter;
pub use types::{DngCompression, TiffCompression, WriterConfig, WriterConfigBuilder};
