use tracing::{debug, info, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::{DNG_VERSION_NONE, Host, HostConfig};
use crate::image_pipeline::common::image::StageImage;
use crate::image_pipeline::common::rational::URational;
use crate::image_pipeline::mosaic::resample;
use crate::image_pipeline::negative::model::{Negative, NegativeState, RawImageStage};
use crate::image_pipeline::opcodes::OpcodeList;

impl Negative {
    /// Where a verbatim raw copy has to be kept so a saved DNG can carry it.
    ///
    /// Opcodes the target version cannot express (or flagged always-apply)
    /// are baked in first. A linear DNG needs no raw copy.
    pub fn raw_image_stage_for(&self, config: &HostConfig) -> RawImageStage {
        if config.save_dng_version == DNG_VERSION_NONE || config.save_linear_dng {
            RawImageStage::None
        } else if self.opcode_list_1.min_version(false) > config.save_dng_version
            || self.opcode_list_1.always_apply()
        {
            RawImageStage::PostOpcode1
        } else {
            RawImageStage::PreOpcode1
        }
    }

    /// Stage 1 -> stage 2: opcode list 1, linearization, opcode list 2.
    /// Stage 1 is released afterwards.
    pub fn build_stage2(&mut self, host: &Host) -> Result<()> {
        let _span = tracing::info_span!("build_stage2").entered();
        self.require_state(NegativeState::Stage1Read, "build_stage2")?;
        self.find_raw_data_unique_id(host)?;

        let mut stage1 = self
            .stage1
            .take()
            .ok_or_else(|| DngError::program("stage 1 image missing"))?;

        self.raw_image_stage = self.raw_image_stage_for(host.config());
        debug!("Raw image retained at {:?}", self.raw_image_stage);
        if self.raw_image_stage == RawImageStage::PreOpcode1 {
            self.raw_image = Some(stage1.clone());
            self.raw_opcode_list_1 = self.opcode_list_1.clone();
        }

        self.opcode_list_1.apply(&mut stage1, host, self.is_preview)?;
        if self.raw_image_stage == RawImageStage::PostOpcode1 {
            self.raw_image = Some(stage1.clone());
            self.raw_opcode_list_1 = OpcodeList::new(1);
        }

        let linearization = self
            .linearization
            .as_ref()
            .ok_or_else(|| DngError::bad_format("negative without linearization info"))?;
        let mut stage2 = linearization.linearize(&stage1, host)?;
        drop(stage1);

        self.opcode_list_2.apply(&mut stage2, host, self.is_preview)?;
        info!("Built stage 2: {}x{}x{}", stage2.width, stage2.height, stage2.planes);
        self.stage2 = Some(stage2);
        self.state = NegativeState::Stage2Built;
        Ok(())
    }

    /// Stage 2 -> stage 3: demosaic, host size limits, opcode list 3.
    /// Stage 2 is released afterwards.
    ///
    /// Without a mosaic stage 3 is stage 2 unchanged. A single-plane mosaic
    /// is interpolated; a stage 2 that already holds every colour is merged,
    /// and only that merge applies the `BaselineExposure` gain when no
    /// source plane is selected.
    pub fn build_stage3(&mut self, host: &Host) -> Result<()> {
        let _span = tracing::info_span!("build_stage3").entered();
        self.require_state(NegativeState::Stage2Built, "build_stage3")?;
        let stage2 = self
            .stage2
            .take()
            .ok_or_else(|| DngError::program("stage 2 image missing"))?;
        let config = host.config().clone();

        let mut stage3 = if self.mosaic.is_none() {
            stage2.clone()
        } else {
            if config.four_color_bayer && self.mosaic.as_ref().is_some_and(|m| m.is_bayer()) {
                self.set_four_color_bayer()?;
            }
            let source_plane = config.source_plane.map(|p| p as usize);
            let mosaic = self
                .mosaic
                .as_ref()
                .ok_or_else(|| DngError::program("mosaic info missing"))?;
            let mut full = if stage2.planes > 1 {
                let mut merged = mosaic.merge_planes(&stage2, source_plane, host)?;
                if source_plane.is_none() {
                    self.stage3_gain = 2f64.powf(self.baseline_exposure.as_f64());
                    resample::apply_gain(&mut merged, self.stage3_gain);
                }
                merged
            } else {
                mosaic.interpolate(&stage2, source_plane, host)?
            };

            if let Some((width, height)) = target_size(&full, &config) {
                debug!(
                    "Resampling stage 3 from {}x{} to {}x{}",
                    full.width, full.height, width, height
                );
                full = resample::downsample(&full, width, height, host)?;
            }
            full
        };

        self.raw_to_full_scale_h = stage3.width as f64 / stage2.width as f64;
        self.raw_to_full_scale_v = stage3.height as f64 / stage2.height as f64;
        if self.raw_to_full_scale_h > 1.0 || self.raw_to_full_scale_v > 1.0 {
            self.rescale_crop(self.raw_to_full_scale_h, self.raw_to_full_scale_v);
        }
        drop(stage2);

        self.opcode_list_3.apply(&mut stage3, host, self.is_preview)?;
        info!(
            "Built stage 3: {}x{}x{}, raw to full scale {:.3}x{:.3}",
            stage3.width,
            stage3.height,
            stage3.planes,
            self.raw_to_full_scale_h,
            self.raw_to_full_scale_v
        );
        self.stage3 = Some(stage3);
        self.state = NegativeState::Stage3Built;
        Ok(())
    }

    /// Splits the second green of a Bayer mosaic into its own colour
    /// channel, duplicating the per-channel colour data of the first green.
    pub fn set_four_color_bayer(&mut self) -> Result<()> {
        let mosaic = self
            .mosaic
            .as_mut()
            .ok_or_else(|| DngError::program("four-colour conversion without a mosaic"))?;
        if self.color_channels != 3 {
            return Err(DngError::program(format!(
                "four-colour conversion of {} channels",
                self.color_channels
            )));
        }
        mosaic.set_four_color_bayer()?;

        if self.camera_neutral.len() == 3 {
            let green = self.camera_neutral.values()[1];
            self.camera_neutral.push(green);
        }
        if self.analog_balance.len() == 3 {
            let green = self.analog_balance.values()[1];
            self.analog_balance.push(green);
        }
        self.noise_profile.duplicate_channel(1);
        if !self.camera_calibration_1.is_empty() || !self.camera_calibration_2.is_empty() {
            warn!("Dropping camera calibration for four-colour conversion");
        }
        self.camera_calibration_1.clear();
        self.camera_calibration_2.clear();
        self.camera_calibration_signature.clear();
        for profile in self.profiles.iter_mut() {
            profile.set_four_color_bayer()?;
        }
        self.color_channels = 4;
        Ok(())
    }

    fn rescale_crop(&mut self, scale_h: f64, scale_v: f64) {
        let scale = |r: URational, s: f64| URational::from_f64_auto(r.as_f64() * s);
        self.default_crop_origin_h = scale(self.default_crop_origin_h, scale_h);
        self.default_crop_size_h = scale(self.default_crop_size_h, scale_h);
        self.default_crop_origin_v = scale(self.default_crop_origin_v, scale_v);
        self.default_crop_size_v = scale(self.default_crop_size_v, scale_v);
        debug!("Crop rescaled by {}x{}", scale_h, scale_v);
    }
}

/// Stage 3 size honouring the host preferences, or `None` to keep it.
///
/// Sizes refer to the longest side. The preferred size is divided by the
/// crop factor, then clamped between the minimum and maximum.
fn target_size(image: &StageImage, config: &HostConfig) -> Option<(usize, usize)> {
    let longest = image.width.max(image.height);
    let mut target = if config.preferred_size > 0 {
        let factor = if config.crop_factor > 0.0 { config.crop_factor } else { 1.0 };
        (config.preferred_size as f64 / factor).round() as usize
    } else {
        longest
    };
    if config.minimum_size > 0 {
        target = target.max(config.minimum_size as usize);
    }
    if config.maximum_size > 0 {
        target = target.min(config.maximum_size as usize);
    }
    if target == 0 || target >= longest {
        return None;
    }
    let scale = |side: usize| ((side * target + longest / 2) / longest).max(1);
    Some((scale(image.width), scale(image.height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::image::PixelType;

    #[test]
    fn target_size_respects_limits() {
        let image = StageImage::new(400, 200, 3, PixelType::U16);
        let config = HostConfig::builder().maximum_size(100).build();
        assert_eq!(target_size(&image, &config), Some((100, 50)));

        let config = HostConfig::builder().preferred_size(300).crop_factor(1.5).build();
        assert_eq!(target_size(&image, &config), Some((200, 100)));

        let config = HostConfig::builder()
            .preferred_size(50)
            .minimum_size(800)
            .build();
        assert_eq!(target_size(&image, &config), None);
        assert_eq!(target_size(&image, &HostConfig::default()), None);
    }
}
