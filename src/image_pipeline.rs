//! Image processing pipeline module
//!
//! Raw files are parsed into a `Negative`, rebuilt through three image
//! stages and written back as DNG or TIFF. The modules below follow that
//! flow: tag parsing and raw readers, the negative and its stage
//! operations, then the writers and conversion orchestration.

pub mod common;
pub mod conversions;
pub mod fingerprint;
pub mod linearization;
pub mod ljpeg;
pub mod mosaic;
pub mod negative;
pub mod opcodes;
pub mod profile;
pub mod raw;
pub mod tags;
pub mod writer;

pub use common::{DngError, Host, HostConfig, HostConfigBuilder, Result, Severity};

pub use conversions::{DngPipeline, InMemoryMetadataStore, MetadataStore};

pub use fingerprint::{Fingerprint, Md5Printer};

pub use negative::{Negative, NegativeState};

pub use profile::CameraProfile;

pub use raw::{AutoReader, DngReader, RawImageReader, RawLoaderReader};

pub use writer::{
    DngCompression, DngWriter, ImageWriter, StandardTiffWriter, TiffCompression, WriterConfig,
    WriterConfigBuilder,
};
