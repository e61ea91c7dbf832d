//! TIFF/DNG tag directory parsing.

pub mod directory;
pub mod exif;
pub mod image_dir;
pub mod parser;
pub mod profile_info;
pub mod shared;
pub mod stream;
pub mod types;


pub use directory::{Ifd, TagDirectory, TagEntry, TagValue, TiffHeader};
pub use exif::{ExifInfo, GpsInfo};
pub use image_dir::ImageDirectory;
pub use parser::{TagHandler, TagParser, TiffInfo, parse_tiff};
pub use profile_info::ProfileInfo;
pub use shared::{MakerNote, SharedInfo};
pub use stream::TiffStream;
pub use types::{FieldType, TagContext, tag};
