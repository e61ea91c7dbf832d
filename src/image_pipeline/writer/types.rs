//! Writer configuration types

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::host::DngVersion;
use crate::image_pipeline::ljpeg::Predictor;

/// Compression of the raw image data in a written DNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DngCompression {
    /// 16-bit (or 8-bit) samples as stored
    None,
    /// Lossless JPEG tiles
    LosslessJpeg,
}

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

/// Configuration for writing DNG and TIFF files
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Compression of DNG raw data
    pub compression: DngCompression,
    /// Tile width and length; `None` writes one strip
    pub tile_size: Option<(u32, u32)>,
    /// Lossless JPEG predictor
    pub predictor: Predictor,
    /// Rows per lossless JPEG restart interval, 0 for none
    pub restart_rows: u32,
    /// DNG version to emit; `None` follows the host's save version
    pub dng_version: Option<DngVersion>,
    /// Byte order of the written file
    pub endian: Endian,
    /// Compression of standard TIFF output
    pub tiff_compression: TiffCompression,
    /// Predictor value for TIFF compression (2 for horizontal differencing)
    pub tiff_predictor: Option<u16>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: DngCompression::LosslessJpeg,
            tile_size: Some((256, 256)),
            predictor: Predictor::Left,
            restart_rows: 0,
            dng_version: None,
            endian: Endian::Little,
            tiff_compression: TiffCompression::None,
            tiff_predictor: None,
        }
    }
}

impl WriterConfig {
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }
}

/// Builder for WriterConfig
#[derive(Default)]
pub struct WriterConfigBuilder {
    compression: Option<DngCompression>,
    tile_size: Option<Option<(u32, u32)>>,
    predictor: Option<Predictor>,
    restart_rows: Option<u32>,
    dng_version: Option<Option<DngVersion>>,
    endian: Option<Endian>,
    tiff_compression: Option<TiffCompression>,
    tiff_predictor: Option<Option<u16>>,
}

impl WriterConfigBuilder {
    pub fn compression(mut self, compression: DngCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn tile_size(mut self, tile_size: Option<(u32, u32)>) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn restart_rows(mut self, rows: u32) -> Self {
        self.restart_rows = Some(rows);
        self
    }

    pub fn dng_version(mut self, version: Option<DngVersion>) -> Self {
        self.dng_version = Some(version);
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn tiff_compression(mut self, compression: TiffCompression) -> Self {
        self.tiff_compression = Some(compression);
        self
    }

    pub fn tiff_predictor(mut self, predictor: Option<u16>) -> Self {
        self.tiff_predictor = Some(predictor);
        self
    }

    pub fn build(self) -> WriterConfig {
        let default = WriterConfig::default();
        WriterConfig {
            compression: self.compression.unwrap_or(default.compression),
            tile_size: self.tile_size.unwrap_or(default.tile_size),
            predictor: self.predictor.unwrap_or(default.predictor),
            restart_rows: self.restart_rows.unwrap_or(default.restart_rows),
            dng_version: self.dng_version.unwrap_or(default.dng_version),
            endian: self.endian.unwrap_or(default.endian),
            tiff_compression: self.tiff_compression.unwrap_or(default.tiff_compression),
            tiff_predictor: self.tiff_predictor.unwrap_or(default.tiff_predictor),
        }
    }
}
