use tracing::{debug, info, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::matrix::Vector;
use crate::image_pipeline::common::rational::URational;
use crate::image_pipeline::linearization::LinearizationInfo;
use crate::image_pipeline::mosaic::MosaicInfo;
use crate::image_pipeline::negative::model::{Negative, NegativeState, NoiseProfile};
use crate::image_pipeline::profile::CameraProfile;
use crate::image_pipeline::tags::parser::TiffInfo;

/// `ColorimetricReference` value for output-referred (ICC PCS) data.
pub const COLORIMETRIC_REFERENCE_ICC_PCS: u32 = 1;

/// D50 white in xy chromaticity.
pub const D50_XY: (f64, f64) = (0.3457, 0.3585);

impl Negative {
    /// Builds a negative from parsed tags.
    ///
    /// A missing or invalid main raw directory and, for colour cameras, an
    /// unusable `ColorMatrix1` are fatal. Broken extra profiles and
    /// optional vectors are dropped with a warning.
    pub fn parse(info: &TiffInfo, host: &Host) -> Result<Negative> {
        let _span = tracing::info_span!("negative_parse").entered();
        let ifd = info
            .main_ifd()
            .filter(|ifd| ifd.is_raw())
            .ok_or_else(|| DngError::bad_format("no raw image directory"))?;
        ifd.validate_raw()?;

        let shared = &info.shared;
        let mut negative = Negative::new();

        negative.model_name = shared.unique_camera_model.clone();
        negative.localized_model_name = shared.localized_camera_model.clone();
        negative.orientation = info.ifds.first().map_or(1, |ifd0| ifd0.orientation);
        negative.is_preview = ifd.new_subfile_type != 0;

        negative.default_scale_h = ifd.default_scale_h;
        negative.default_scale_v = ifd.default_scale_v;
        negative.best_quality_scale = ifd.best_quality_scale;
        negative.default_crop_origin_h = ifd.default_crop_origin_h;
        negative.default_crop_origin_v = ifd.default_crop_origin_v;
        let active = ifd.effective_active_area();
        negative.default_crop_size_h = if ifd.default_crop_size_h.is_valid() {
            ifd.default_crop_size_h
        } else {
            URational::new(active.width(), 1)
        };
        negative.default_crop_size_v = if ifd.default_crop_size_v.is_valid() {
            ifd.default_crop_size_v
        } else {
            URational::new(active.height(), 1)
        };
        negative.default_user_crop = ifd.default_user_crop;

        negative.baseline_exposure = shared.baseline_exposure;
        negative.baseline_noise = shared.baseline_noise;
        negative.baseline_sharpness = shared.baseline_sharpness;
        negative.linear_response_limit = shared.linear_response_limit;
        negative.shadow_scale = shared.shadow_scale;
        negative.colorimetric_reference = shared.colorimetric_reference;
        negative.as_shot_profile_name = shared.as_shot_profile_name.clone();

        negative.mosaic = MosaicInfo::from_directory(ifd)?;
        negative.linearization = Some(LinearizationInfo::from_directory(ifd)?);
        negative.raw_bits = ifd.bits();
        negative.color_channels = match &negative.mosaic {
            Some(mosaic) => mosaic.color_planes() as u32,
            None => ifd.samples_per_pixel,
        };

        negative.analog_balance = shared.analog_balance.clone();
        negative.camera_calibration_1 = shared.camera_calibration_1.clone();
        negative.camera_calibration_2 = shared.camera_calibration_2.clone();
        negative.camera_calibration_signature = shared.camera_calibration_signature.clone();
        negative.camera_neutral = shared.as_shot_neutral.clone();
        negative.camera_white_xy = shared.as_shot_white_xy;

        negative.noise_profile = NoiseProfile::from_flat(&ifd.noise_profile);

        let mut embedded = CameraProfile::from_info(&shared.camera_profile)?;
        embedded.was_read_from_dng = true;
        negative.add_profile(embedded);
        for (index, extra) in info.extra_profiles.iter().enumerate() {
            match CameraProfile::from_info(extra) {
                Ok(mut profile) => {
                    profile.was_read_from_dng = true;
                    negative.add_profile(profile);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping extra camera profile {}: {}", index, e);
                }
                Err(e) => return Err(e),
            }
        }

        negative.raw_image_digest = shared.raw_image_digest;
        negative.new_raw_image_digest = shared.new_raw_image_digest;
        negative.raw_data_unique_id = shared.raw_data_unique_id;
        negative.original_raw_file_name = shared.original_raw_file_name.clone();
        negative.original_raw_file_digest = shared.original_raw_file_digest;

        negative.exif = info.exif.clone();
        negative.xmp = shared.xmp.clone();
        negative.iptc = shared.iptc.clone();
        negative.maker_note = shared.maker_note.clone();
        negative.maker_note_safe = shared.maker_note_safety == 1;

        negative.finish_parse(host)?;
        info!(
            "Parsed negative \"{}\": {} channels, {}x{}, {} profiles",
            negative.model_name,
            negative.color_channels,
            ifd.width,
            ifd.length,
            negative.profiles.len()
        );
        Ok(negative)
    }

    /// Checks colour data against the channel count and settles the
    /// white balance; moves a hand-built negative to `Parsed`.
    pub fn finish_parse(&mut self, _host: &Host) -> Result<()> {
        self.require_state(NegativeState::Created, "finish_parse")?;
        let channels = self.color_channels;
        if channels == 0 {
            return Err(DngError::bad_format("negative without colour channels"));
        }

        if channels > 1 {
            let embedded_ok = self.profiles.get(0).is_some_and(|p| p.is_valid(channels));
            if !embedded_ok {
                return Err(DngError::bad_format(format!(
                    "ColorMatrix1 missing or invalid for {} channels",
                    channels
                )));
            }
        }
        let dropped = self.profiles.retain_valid(channels, &self.model_name);
        if dropped > 0 {
            warn!("Dropped {} camera profiles unusable for this camera", dropped);
        }

        let n = channels as usize;
        if !self.analog_balance.is_empty() && self.analog_balance.len() != n {
            warn!("Ignoring AnalogBalance with {} entries", self.analog_balance.len());
            self.analog_balance.clear();
        }
        let square = |rows: usize, cols: usize| rows == n && cols == n;
        for calibration in [&mut self.camera_calibration_1, &mut self.camera_calibration_2] {
            if !calibration.is_empty() && !square(calibration.rows(), calibration.cols()) {
                warn!("Ignoring camera calibration of {}x{}", calibration.rows(), calibration.cols());
                calibration.clear();
            }
        }
        if !self.noise_profile.is_empty() && !self.noise_profile.is_valid_for(channels) {
            warn!("Ignoring noise profile with {} functions", self.noise_profile.functions().len());
            self.noise_profile = NoiseProfile::default();
        }

        self.resolve_white_balance();
        self.state = NegativeState::Parsed;
        Ok(())
    }

    /// Output-referred data is always D50; otherwise a neutral wins over an
    /// xy white, and a neutral of the wrong length or with a non-positive
    /// entry is dropped.
    fn resolve_white_balance(&mut self) {
        if self.colorimetric_reference == COLORIMETRIC_REFERENCE_ICC_PCS {
            if self.has_camera_neutral() || self.camera_white_xy.is_some_and(|xy| xy != D50_XY) {
                debug!("Output-referred negative: white balance forced to D50");
            }
            self.camera_neutral = Vector::default();
            self.camera_white_xy = Some(D50_XY);
            return;
        }

        if self.has_camera_neutral() {
            let valid = self.camera_neutral.len() == self.color_channels as usize
                && self.camera_neutral.values().iter().all(|&v| v > 0.0);
            if !valid {
                warn!("Ignoring invalid AsShotNeutral {:?}", self.camera_neutral.values());
                self.camera_neutral = Vector::default();
            } else if self.camera_white_xy.is_some() {
                debug!("Both AsShotNeutral and AsShotWhiteXY given, using the neutral");
                self.camera_white_xy = None;
            }
        }
        if let Some((x, y)) = self.camera_white_xy {
            if !(x > 0.0 && y > 0.0 && x + y < 1.0) {
                warn!("Ignoring invalid AsShotWhiteXY ({}, {})", x, y);
                self.camera_white_xy = None;
            }
        }
    }
}
