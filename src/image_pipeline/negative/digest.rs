use tracing::{debug, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::common::rational::URational;
use crate::image_pipeline::fingerprint::{Fingerprint, Md5Printer};
use crate::image_pipeline::negative::legacy_digest;
use crate::image_pipeline::negative::model::Negative;

/// Rows hashed per band of the tiled raw digest.
pub const DIGEST_TILE_ROWS: usize = 256;

/// Tiled raw image digest (`NewRawImageDigest`).
///
/// Each band of rows is hashed on its own with 8-bit samples widened to
/// 16 bits, all little-endian; the band digests are then hashed in order.
pub fn image_digest(image: &StageImage, host: &Host) -> Result<Fingerprint> {
    let row_samples = image.width * image.planes;
    let mut outer = Md5Printer::new();
    let mut bytes = Vec::with_capacity(row_samples * 2 * DIGEST_TILE_ROWS.min(image.height));

    for top in (0..image.height).step_by(DIGEST_TILE_ROWS) {
        host.sniff_for_abort()?;
        let bottom = (top + DIGEST_TILE_ROWS).min(image.height);
        bytes.clear();
        for &v in &image.data[top * row_samples..bottom * row_samples] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let band = Md5Printer::digest(&bytes);
        outer.process(band.as_bytes())?;
    }
    Ok(outer.result())
}

/// Whole-image digest (`RawImageDigest`) of the samples at their stored
/// width.
pub fn legacy_image_digest(image: &StageImage, host: &Host) -> Result<Fingerprint> {
    let mut printer = Md5Printer::new();
    let row_samples = image.width * image.planes;
    let mut bytes = Vec::with_capacity(row_samples * 2);
    for row in 0..image.height {
        if row % DIGEST_TILE_ROWS == 0 {
            host.sniff_for_abort()?;
        }
        bytes.clear();
        match image.pixel_type {
            PixelType::U8 => bytes.extend(image.row(row).iter().map(|&v| v as u8)),
            PixelType::U16 => {
                for &v in image.row(row) {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        printer.process(&bytes)?;
    }
    Ok(printer.result())
}

impl Negative {
    /// Image the raw digests describe: stage 1 while it exists, else the
    /// retained pre-opcode copy.
    fn digest_source(&self) -> Result<&StageImage> {
        self.stage1
            .as_ref()
            .or(self.raw_image.as_ref())
            .ok_or_else(|| DngError::program("raw digest needs the stage 1 image"))
    }

    /// Computes the tiled digest of the raw image without caching it.
    pub fn compute_raw_image_digest(&self, host: &Host) -> Result<Fingerprint> {
        image_digest(self.digest_source()?, host)
    }

    /// Stored `NewRawImageDigest`, computing and caching it if missing.
    pub fn find_new_raw_image_digest(&mut self, host: &Host) -> Result<Fingerprint> {
        if self.new_raw_image_digest.is_null() {
            self.new_raw_image_digest = self.compute_raw_image_digest(host)?;
            debug!("Computed raw image digest {}", self.new_raw_image_digest);
        }
        Ok(self.new_raw_image_digest)
    }

    /// Forgets computed digests and the unique id, for callers that
    /// changed pixels or identity metadata.
    pub fn invalidate_digests(&mut self) {
        self.new_raw_image_digest = Fingerprint::NULL;
        self.raw_data_unique_id = Fingerprint::NULL;
    }

    /// Recomputes the raw digest and compares it with the stored one.
    ///
    /// A mismatch marks the negative damaged and returns `false`. Known
    /// legacy corruptions of the whole-image digest are accepted.
    pub fn validate_raw_image_digest(&mut self, host: &Host) -> Result<bool> {
        let matches = if self.new_raw_image_digest.is_valid() {
            let computed = self.compute_raw_image_digest(host)?;
            computed == self.new_raw_image_digest
        } else if self.raw_image_digest.is_valid() {
            let computed = legacy_image_digest(self.digest_source()?, host)?;
            if computed == self.raw_image_digest {
                true
            } else if legacy_digest::is_known_corruption(&self.raw_image_digest, &computed) {
                debug!("Accepting legacy RawImageDigest {}", self.raw_image_digest);
                true
            } else {
                false
            }
        } else {
            return Ok(true);
        };

        if !matches {
            warn!("Raw image digest mismatch, marking negative as damaged");
            self.is_damaged = true;
        }
        Ok(matches)
    }

    /// Digest of the raw data plus everything that changes how it renders:
    /// model name, default crop and the three opcode lists.
    pub fn compute_raw_data_unique_id(&mut self, host: &Host) -> Result<Fingerprint> {
        let raw_digest = self.find_new_raw_image_digest(host)?;
        let mut printer = Md5Printer::new();
        printer.process(raw_digest.as_bytes())?;
        printer.process(self.model_name.as_bytes())?;
        for r in self.crop_rationals() {
            printer.process(&r.n.to_be_bytes())?;
            printer.process(&r.d.to_be_bytes())?;
        }
        for list in [&self.opcode_list_1, &self.opcode_list_2, &self.opcode_list_3] {
            printer.process(list.fingerprint().as_bytes())?;
        }
        Ok(printer.result())
    }

    /// Stored `RawDataUniqueID`, computing and caching it if missing.
    pub fn find_raw_data_unique_id(&mut self, host: &Host) -> Result<Fingerprint> {
        if self.raw_data_unique_id.is_null() {
            self.raw_data_unique_id = self.compute_raw_data_unique_id(host)?;
            debug!("Computed raw data unique id {}", self.raw_data_unique_id);
        }
        Ok(self.raw_data_unique_id)
    }

    fn crop_rationals(&self) -> [URational; 4] {
        [
            self.default_crop_origin_h,
            self.default_crop_origin_v,
            self.default_crop_size_h,
            self.default_crop_size_v,
        ]
    }
}
