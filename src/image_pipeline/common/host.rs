//! Host context threaded through every pipeline call.
//!
//! The host owns the processing preferences (output size constraints, save
//! target) and the cooperative abort flag. Nothing in the pipeline reads
//! process-wide state; everything goes through a `&Host`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::image_pipeline::common::error::{DngError, Result};

/// DNG version packed as four bytes, most significant first (1.4.0.0 = 0x01040000).
pub type DngVersion = u32;

pub const DNG_VERSION_NONE: DngVersion = 0;
pub const DNG_VERSION_1_0: DngVersion = 0x0100_0000;
pub const DNG_VERSION_1_1: DngVersion = 0x0101_0000;
pub const DNG_VERSION_1_2: DngVersion = 0x0102_0000;
pub const DNG_VERSION_1_3: DngVersion = 0x0103_0000;
pub const DNG_VERSION_1_4: DngVersion = 0x0104_0000;
pub const DNG_VERSION_1_5: DngVersion = 0x0105_0000;
pub const DNG_VERSION_1_6: DngVersion = 0x0106_0000;

pub const DNG_VERSION_CURRENT: DngVersion = DNG_VERSION_1_4;

pub fn version_bytes(version: DngVersion) -> [u8; 4] {
    version.to_be_bytes()
}

pub fn version_from_bytes(bytes: [u8; 4]) -> DngVersion {
    DngVersion::from_be_bytes(bytes)
}

/// Processing preferences supplied by whoever drives the pipeline.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Smallest acceptable stage 3 size (longest side), 0 = no constraint.
    pub minimum_size: u32,
    /// Preferred stage 3 size (longest side), 0 = full resolution.
    pub preferred_size: u32,
    /// Largest acceptable stage 3 size (longest side), 0 = unbounded.
    pub maximum_size: u32,
    /// Ratio applied to the size preferences before choosing a downscale.
    pub crop_factor: f64,
    /// DNG version the caller intends to save, `DNG_VERSION_NONE` if not saving.
    pub save_dng_version: DngVersion,
    /// Whether a saved DNG will hold demosaiced linear data.
    pub save_linear_dng: bool,
    /// Convert 3-colour Bayer data into a 4-plane mosaic before demosaic.
    pub four_color_bayer: bool,
    /// Interpolate only this stage 2 plane; `None` merges all planes.
    pub source_plane: Option<u32>,
    /// Treat malformed optional tags as fatal instead of warning.
    pub strict_parsing: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            minimum_size: 0,
            preferred_size: 0,
            maximum_size: 0,
            crop_factor: 1.0,
            save_dng_version: DNG_VERSION_NONE,
            save_linear_dng: false,
            four_color_bayer: false,
            source_plane: None,
            strict_parsing: false,
        }
    }
}

impl HostConfig {
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::default()
    }
}

/// Builder for HostConfig
#[derive(Default)]
pub struct HostConfigBuilder {
    minimum_size: Option<u32>,
    preferred_size: Option<u32>,
    maximum_size: Option<u32>,
    crop_factor: Option<f64>,
    save_dng_version: Option<DngVersion>,
    save_linear_dng: Option<bool>,
    four_color_bayer: Option<bool>,
    source_plane: Option<Option<u32>>,
    strict_parsing: Option<bool>,
}

impl HostConfigBuilder {
    pub fn minimum_size(mut self, size: u32) -> Self {
        self.minimum_size = Some(size);
        self
    }

    pub fn preferred_size(mut self, size: u32) -> Self {
        self.preferred_size = Some(size);
        self
    }

    pub fn maximum_size(mut self, size: u32) -> Self {
        self.maximum_size = Some(size);
        self
    }

    pub fn crop_factor(mut self, factor: f64) -> Self {
        self.crop_factor = Some(factor);
        self
    }

    pub fn save_dng_version(mut self, version: DngVersion) -> Self {
        self.save_dng_version = Some(version);
        self
    }

    pub fn save_linear_dng(mut self, linear: bool) -> Self {
        self.save_linear_dng = Some(linear);
        self
    }

    pub fn four_color_bayer(mut self, enable: bool) -> Self {
        self.four_color_bayer = Some(enable);
        self
    }

    pub fn source_plane(mut self, plane: Option<u32>) -> Self {
        self.source_plane = Some(plane);
        self
    }

    pub fn strict_parsing(mut self, strict: bool) -> Self {
        self.strict_parsing = Some(strict);
        self
    }

    pub fn build(self) -> HostConfig {
        let default = HostConfig::default();
        HostConfig {
            minimum_size: self.minimum_size.unwrap_or(default.minimum_size),
            preferred_size: self.preferred_size.unwrap_or(default.preferred_size),
            maximum_size: self.maximum_size.unwrap_or(default.maximum_size),
            crop_factor: self.crop_factor.unwrap_or(default.crop_factor),
            save_dng_version: self.save_dng_version.unwrap_or(default.save_dng_version),
            save_linear_dng: self.save_linear_dng.unwrap_or(default.save_linear_dng),
            four_color_bayer: self.four_color_bayer.unwrap_or(default.four_color_bayer),
            source_plane: self.source_plane.unwrap_or(default.source_plane),
            strict_parsing: self.strict_parsing.unwrap_or(default.strict_parsing),
        }
    }
}

/// Per-pipeline host context.
///
/// One `Host` serves one pipeline instance. The abort flag may be shared with
/// another thread (a UI or a batch supervisor) which sets it to request
/// cancellation.
#[derive(Debug, Clone)]
pub struct Host {
    config: HostConfig,
    abort: Arc<AtomicBool>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_abort_flag(config: HostConfig, abort: Arc<AtomicBool>) -> Self {
        Self { config, abort }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: HostConfig) {
        self.config = config;
    }

    /// Handle the caller keeps to cancel the pipeline.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Checkpoint: fails with `UserCanceled` once an abort was requested.
    pub fn sniff_for_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(DngError::UserCanceled);
        }
        Ok(())
    }

    /// Allocate a zeroed sample buffer, reporting failure as `MemoryFull`.
    pub fn allocate<T: Default + Clone>(&self, count: usize, what: &str) -> Result<Vec<T>> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(count)
            .map_err(|_| DngError::MemoryFull(format!("{} ({} samples)", what, count)))?;
        buffer.resize(count, T::default());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_falls_back_to_defaults() {
        let config = HostConfig::builder()
            .preferred_size(1024)
            .save_dng_version(DNG_VERSION_1_3)
            .build();

        assert_eq!(config.preferred_size, 1024);
        assert_eq!(config.minimum_size, 0);
        assert_eq!(config.save_dng_version, DNG_VERSION_1_3);
        assert_eq!(config.crop_factor, 1.0);
        assert!(config.source_plane.is_none());
    }

    #[test]
    fn abort_flag_is_shared() {
        let host = Host::default();
        assert!(host.sniff_for_abort().is_ok());

        let handle = host.abort_handle();
        handle.store(true, Ordering::Relaxed);
        assert!(matches!(host.sniff_for_abort(), Err(DngError::UserCanceled)));
    }

    #[test]
    fn version_bytes_are_big_endian() {
        assert_eq!(version_bytes(DNG_VERSION_1_4), [1, 4, 0, 0]);
        assert_eq!(version_from_bytes([1, 3, 0, 0]), DNG_VERSION_1_3);
    }
}
