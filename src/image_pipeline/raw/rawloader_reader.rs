//! Import of non-DNG camera raws through the rawloader library.
//!
//! rawloader decodes the sensor data of most camera formats (ARW, CR2, NEF,
//! RAF, ...). Its metadata is mapped onto the same negative a DNG would
//! produce: mosaic, black and white levels, crop, white balance and an
//! embedded profile built from the camera matrix.

use std::io::Cursor;

use rawloader::RawImageData as RawloaderImageData;
use tracing::{debug, info, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::geometry::Rect;
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::common::matrix::{Matrix, Vector};
use crate::image_pipeline::common::rational::URational;
use crate::image_pipeline::linearization::LinearizationInfo;
use crate::image_pipeline::mosaic::MosaicInfo;
use crate::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::profile::CameraProfile;
use crate::image_pipeline::profile::illuminant;
use crate::image_pipeline::raw::reader::RawImageReader;

/// RAW reader backed by rawloader.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLoaderReader;

/// Default bit depth when no white level information is available.
const DEFAULT_BITS_PER_SAMPLE: u32 = 16;

/// The bit width of the u16 data type, used for calculating actual bits per sample.
const U16_BITS: u32 = 16;

impl RawImageReader for RawLoaderReader {
    /// Decodes a camera raw file into a negative holding stage 1.
    ///
    /// This method:
    /// 1. Decodes the sensor data with rawloader
    /// 2. Converts float data (normalized 0.0-1.0) to 16-bit samples
    /// 3. Derives black and white levels, the active area and the mosaic
    /// 4. Builds an embedded profile and camera neutral from the camera's
    ///    colour matrix and white balance coefficients
    ///
    /// # Arguments
    ///
    /// * `data` - Raw bytes of the camera raw file
    /// * `host` - Host configuration and abort flag
    ///
    /// # Returns
    ///
    /// * `Ok(Negative)` - Negative in the `Stage1Read` state
    /// * `Err(DngError::Decode)` - rawloader could not decode the file
    /// * `Err(DngError::BadFormat)` - The camera metadata is unusable
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dng_negative::image_pipeline::{Host, RawImageReader, RawLoaderReader};
    ///
    /// let raw_bytes = std::fs::read("image.arw").unwrap();
    /// let negative = RawLoaderReader.read_negative(&raw_bytes, &Host::default()).unwrap();
    /// ```
    fn read_negative(&self, data: &[u8], host: &Host) -> Result<Negative> {
        let _span = tracing::info_span!("rawloader_import", bytes = data.len()).entered();

        let decoded = rawloader::decode(&mut Cursor::new(data))
            .map_err(|e| DngError::Decode(e.to_string()))?;
        host.sniff_for_abort()?;

        let (width, height, cpp) = (decoded.width, decoded.height, decoded.cpp);
        debug!("Decoded {} {}: {}x{}x{}", decoded.make, decoded.model, width, height, cpp);

        // Float data is normalized to 0.0-1.0.
        let (samples, float_data): (Vec<u16>, bool) = match &decoded.data {
            RawloaderImageData::Integer(values) => (values.clone(), false),
            RawloaderImageData::Float(values) => (
                values
                    .iter()
                    .map(|&v| (v.clamp(0.0, 1.0) * u16::MAX as f32) as u16)
                    .collect(),
                true,
            ),
        };

        let max_white_level = if float_data {
            u16::MAX
        } else {
            decoded.whitelevels.iter().max().copied().unwrap_or(u16::MAX)
        };
        let bits_per_sample = if max_white_level == 0 {
            DEFAULT_BITS_PER_SAMPLE
        } else {
            U16_BITS - max_white_level.leading_zeros()
        };

        let mut negative = Negative::new();
        negative.model_name = format!("{} {}", decoded.clean_make, decoded.clean_model);
        negative.localized_model_name = negative.model_name.clone();
        negative.orientation = decoded.orientation.to_u16() as u32;
        negative.raw_bits = bits_per_sample;

        let [top, right, bottom, left] = decoded.crops;
        let active = Rect::new(
            top as i32,
            left as i32,
            height.saturating_sub(bottom) as i32,
            width.saturating_sub(right) as i32,
        );
        let active = if active.is_empty() {
            Rect::from_size(height as u32, width as u32)
        } else {
            active
        };
        negative.default_crop_size_h = URational::new(active.width(), 1);
        negative.default_crop_size_v = URational::new(active.height(), 1);

        let planes = cpp.max(1);
        let black = if float_data {
            0.0
        } else {
            let levels = &decoded.blacklevels;
            levels.iter().map(|&b| b as f64).sum::<f64>() / levels.len() as f64
        };
        negative.linearization = Some(LinearizationInfo::uniform(
            active,
            planes,
            black,
            max_white_level as f64,
        ));

        let colors = if cpp == 1 {
            let mosaic = mosaic_from_cfa(&decoded.cfa)?;
            let colors = mosaic.color_planes();
            negative.mosaic = Some(mosaic);
            colors
        } else {
            cpp
        };
        negative.set_color_channels(colors as u32);

        if colors > 1 {
            let rows: Vec<f64> = decoded
                .xyz_to_cam
                .iter()
                .take(colors)
                .flat_map(|row| row.iter().map(|&v| v as f64))
                .collect();
            let mut profile = CameraProfile::default();
            profile.calibration_illuminant_1 = illuminant::D65;
            profile.color_matrix_1 = Matrix::from_slice(colors, 3, &rows)?;
            negative.add_profile(profile);

            let wb = &decoded.wb_coeffs[..colors];
            if wb.iter().all(|w| w.is_finite() && *w > 0.0) {
                let green = wb[1] as f64;
                let neutral: Vec<f64> = wb.iter().map(|&w| green / w as f64).collect();
                negative.camera_neutral = Vector::from_slice(&neutral);
            } else {
                warn!("No usable white balance coefficients: {:?}", wb);
            }
        } else {
            negative.add_profile(CameraProfile::default());
        }

        negative.finish_parse(host)?;
        let stage1 = StageImage::from_data(width, height, planes, PixelType::U16, samples)?;
        negative.set_stage1(stage1)?;
        info!(
            "Imported \"{}\": {}x{}, {} colours, {} bits",
            negative.model_name, width, height, colors, bits_per_sample
        );
        Ok(negative)
    }
}

/// Mosaic of a rawloader CFA. Colour 3 shares a plane colour with green.
///
/// Two-column patterns of up to eight rows go through the packed filter
/// code, the same path as hosts that hand over a 32-bit code.
fn mosaic_from_cfa(cfa: &rawloader::CFA) -> Result<MosaicInfo> {
    if cfa.width == 0 || cfa.height == 0 {
        return Err(DngError::bad_format(format!(
            "camera CFA \"{}\" is not usable",
            cfa.name
        )));
    }
    let pattern: Vec<u8> = (0..cfa.height)
        .flat_map(|r| (0..cfa.width).map(move |c| cfa.color_at(r, c) as u8))
        .collect();
    let colors = pattern.iter().max().map_or(0, |&m| m as usize + 1);
    debug!("CFA {} ({}x{}), {} colours", cfa.name, cfa.height, cfa.width, colors);

    if colors >= 3 {
        if let Some(code) = filter_code(cfa) {
            debug!("CFA {} as filter code {:#010x}", cfa.name, code);
            return MosaicInfo::from_filter_code(code, colors);
        }
    }

    let plane_colors: Vec<u8> = [CFA_RED, CFA_GREEN, CFA_BLUE, CFA_GREEN]
        .into_iter()
        .take(colors)
        .collect();
    MosaicInfo::new(cfa.height, cfa.width, pattern, plane_colors)
}

/// Packs an 8x2 view of `cfa`, two bits per cell, row-major.
fn filter_code(cfa: &rawloader::CFA) -> Option<u32> {
    if cfa.width != 2 || 8 % cfa.height != 0 {
        return None;
    }
    let mut code = 0u32;
    for row in 0..8 {
        for col in 0..2 {
            let color = cfa.color_at(row, col) as u32;
            if color > 3 {
                return None;
            }
            code |= color << ((row * 2 + col) * 2);
        }
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bayer_cfa_decodes_through_filter_code() {
        let cfa = rawloader::CFA::new("RGGB");
        assert_eq!(filter_code(&cfa), Some(0x9494_9494));
        let mosaic = mosaic_from_cfa(&cfa).unwrap();
        assert_eq!((mosaic.pattern_rows, mosaic.pattern_cols), (2, 2));
        assert_eq!(mosaic.pattern, vec![0, 1, 1, 2]);
        assert!(mosaic.is_bayer());
    }

    #[test]
    fn emerald_cfa_keeps_a_fourth_plane() {
        let cfa = rawloader::CFA::new("RGEB");
        let mosaic = mosaic_from_cfa(&cfa).unwrap();
        assert_eq!(mosaic.pattern, vec![0, 1, 3, 2]);
        assert_eq!(mosaic.color_planes(), 4);
        assert_eq!(mosaic.plane_colors, vec![CFA_RED, CFA_GREEN, CFA_BLUE, CFA_GREEN]);
    }

    #[test]
    fn eight_row_pattern_keeps_its_period() {
        let cfa = rawloader::CFA::new("RGGBRGGBGRBGGRBG");
        let mosaic = mosaic_from_cfa(&cfa).unwrap();
        assert_eq!((mosaic.pattern_rows, mosaic.pattern_cols), (8, 2));
        assert_eq!(&mosaic.pattern[8..12], &[1, 0, 2, 1]);
    }

    #[test]
    fn wide_patterns_are_copied_directly() {
        let cfa = rawloader::CFA::new("GGRGGBGGBGGRBRGRBGGGBGGRGGRGGBRBGBRG");
        assert_eq!(filter_code(&cfa), None);
        let mosaic = mosaic_from_cfa(&cfa).unwrap();
        assert_eq!((mosaic.pattern_rows, mosaic.pattern_cols), (6, 6));
        assert_eq!(mosaic.color_planes(), 3);
    }
}
