use tracing::{debug, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::image::StageImage;
use crate::image_pipeline::common::matrix::{Matrix, Vector};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::fingerprint::Fingerprint;
use crate::image_pipeline::linearization::LinearizationInfo;
use crate::image_pipeline::mosaic::MosaicInfo;
use crate::image_pipeline::opcodes::OpcodeList;
use crate::image_pipeline::profile::{CameraProfile, ProfileId, ProfileSet};
use crate::image_pipeline::tags::exif::ExifInfo;
use crate::image_pipeline::tags::shared::MakerNote;

/// Where a negative is in the parse -> stage 1 -> stage 2 -> stage 3 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegativeState {
    Created,
    Parsed,
    Stage1Read,
    Stage2Built,
    Stage3Built,
    Finalized,
}

/// Point at which a verbatim copy of the raw image is kept for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawImageStage {
    /// Stage 1 as read, before opcode list 1.
    PreOpcode1,
    /// Stage 1 with opcode list 1 applied.
    PostOpcode1,
    #[default]
    None,
}

/// Per-channel `(scale, offset)` noise model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFunction {
    pub scale: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseProfile {
    functions: Vec<NoiseFunction>,
}

impl NoiseProfile {
    pub fn from_flat(values: &[f64]) -> Self {
        Self {
            functions: values
                .chunks_exact(2)
                .map(|p| NoiseFunction {
                    scale: p[0],
                    offset: p[1],
                })
                .collect(),
        }
    }

    pub fn to_flat(&self) -> Vec<f64> {
        self.functions.iter().flat_map(|f| [f.scale, f.offset]).collect()
    }

    pub fn functions(&self) -> &[NoiseFunction] {
        &self.functions
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// One function for all channels, or one per channel.
    pub fn is_valid_for(&self, channels: u32) -> bool {
        let n = self.functions.len();
        (n == 1 || n == channels as usize)
            && self.functions.iter().all(|f| f.scale > 0.0 && f.offset >= 0.0)
    }

    /// Appends a copy of the function for `channel`, if there is one per
    /// channel.
    pub(super) fn duplicate_channel(&mut self, channel: usize) {
        if self.functions.len() > 1 {
            if let Some(&f) = self.functions.get(channel) {
                self.functions.push(f);
            }
        }
    }
}

/// One raw capture and everything needed to render or re-save it.
#[derive(Debug, Clone)]
pub struct Negative {
    pub(super) state: NegativeState,

    pub model_name: String,
    pub localized_model_name: String,
    pub orientation: u32,
    pub is_preview: bool,

    pub default_crop_origin_h: URational,
    pub default_crop_origin_v: URational,
    pub default_crop_size_h: URational,
    pub default_crop_size_v: URational,
    pub default_user_crop: Option<[URational; 4]>,
    pub default_scale_h: URational,
    pub default_scale_v: URational,
    pub best_quality_scale: URational,
    pub(super) raw_to_full_scale_h: f64,
    pub(super) raw_to_full_scale_v: f64,

    pub baseline_exposure: SRational,
    pub baseline_noise: URational,
    pub baseline_sharpness: URational,
    pub linear_response_limit: URational,
    pub shadow_scale: URational,
    pub colorimetric_reference: u32,
    pub noise_profile: NoiseProfile,

    pub(super) color_channels: u32,
    pub analog_balance: Vector,
    pub camera_neutral: Vector,
    pub camera_white_xy: Option<(f64, f64)>,
    pub camera_calibration_1: Matrix,
    pub camera_calibration_2: Matrix,
    pub camera_calibration_signature: String,
    pub as_shot_profile_name: String,
    pub(super) profiles: ProfileSet,

    pub opcode_list_1: OpcodeList,
    pub opcode_list_2: OpcodeList,
    pub opcode_list_3: OpcodeList,

    pub(super) raw_image_digest: Fingerprint,
    pub(super) new_raw_image_digest: Fingerprint,
    pub(super) raw_data_unique_id: Fingerprint,
    pub original_raw_file_name: String,
    pub original_raw_file_digest: Fingerprint,
    pub(super) is_damaged: bool,

    pub exif: ExifInfo,
    pub xmp: Vec<u8>,
    pub iptc: Vec<u8>,
    pub maker_note: Option<MakerNote>,
    pub maker_note_safe: bool,

    pub linearization: Option<LinearizationInfo>,
    pub mosaic: Option<MosaicInfo>,
    /// Bits per sample of the raw data as stored.
    pub raw_bits: u32,

    pub(super) stage1: Option<StageImage>,
    pub(super) stage2: Option<StageImage>,
    pub(super) stage3: Option<StageImage>,
    pub(super) stage3_gain: f64,
    pub(super) raw_image: Option<StageImage>,
    pub(super) raw_image_stage: RawImageStage,
    /// Opcode list 1 as it applies to `raw_image`.
    pub(super) raw_opcode_list_1: OpcodeList,
}

impl Default for Negative {
    fn default() -> Self {
        Self {
            state: NegativeState::Created,
            model_name: String::new(),
            localized_model_name: String::new(),
            orientation: 1,
            is_preview: false,
            default_crop_origin_h: URational::new(0, 1),
            default_crop_origin_v: URational::new(0, 1),
            default_crop_size_h: URational::new(0, 0),
            default_crop_size_v: URational::new(0, 0),
            default_user_crop: None,
            default_scale_h: URational::new(1, 1),
            default_scale_v: URational::new(1, 1),
            best_quality_scale: URational::new(1, 1),
            raw_to_full_scale_h: 1.0,
            raw_to_full_scale_v: 1.0,
            baseline_exposure: SRational::new(0, 1),
            baseline_noise: URational::new(1, 1),
            baseline_sharpness: URational::new(1, 1),
            linear_response_limit: URational::new(1, 1),
            shadow_scale: URational::new(1, 1),
            colorimetric_reference: 0,
            noise_profile: NoiseProfile::default(),
            color_channels: 0,
            analog_balance: Vector::default(),
            camera_neutral: Vector::default(),
            camera_white_xy: None,
            camera_calibration_1: Matrix::empty(),
            camera_calibration_2: Matrix::empty(),
            camera_calibration_signature: String::new(),
            as_shot_profile_name: String::new(),
            profiles: ProfileSet::new(),
            opcode_list_1: OpcodeList::new(1),
            opcode_list_2: OpcodeList::new(2),
            opcode_list_3: OpcodeList::new(3),
            raw_image_digest: Fingerprint::NULL,
            new_raw_image_digest: Fingerprint::NULL,
            raw_data_unique_id: Fingerprint::NULL,
            original_raw_file_name: String::new(),
            original_raw_file_digest: Fingerprint::NULL,
            is_damaged: false,
            exif: ExifInfo::default(),
            xmp: Vec::new(),
            iptc: Vec::new(),
            maker_note: None,
            maker_note_safe: false,
            linearization: None,
            mosaic: None,
            raw_bits: 16,
            stage1: None,
            stage2: None,
            stage3: None,
            stage3_gain: 1.0,
            raw_image: None,
            raw_image_stage: RawImageStage::None,
            raw_opcode_list_1: OpcodeList::new(1),
        }
    }
}

impl Negative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NegativeState {
        self.state
    }

    /// Fails unless the negative is exactly in `expected`.
    pub(super) fn require_state(&self, expected: NegativeState, step: &str) -> Result<()> {
        if self.state != expected {
            return Err(DngError::program(format!(
                "{} needs state {:?}, negative is {:?}",
                step, expected, self.state
            )));
        }
        Ok(())
    }

    pub fn color_channels(&self) -> u32 {
        self.color_channels
    }

    pub fn set_color_channels(&mut self, channels: u32) {
        self.color_channels = channels;
    }

    pub fn is_monochrome(&self) -> bool {
        self.color_channels == 1
    }

    pub fn is_damaged(&self) -> bool {
        self.is_damaged
    }

    pub fn raw_to_full_scale(&self) -> (f64, f64) {
        (self.raw_to_full_scale_h, self.raw_to_full_scale_v)
    }

    pub fn stage3_gain(&self) -> f64 {
        self.stage3_gain
    }

    pub fn stage1_image(&self) -> Option<&StageImage> {
        self.stage1.as_ref()
    }

    /// Mutable access to stage 1, for importers and tests that patch samples.
    pub fn stage1_image_mut(&mut self) -> Option<&mut StageImage> {
        self.stage1.as_mut()
    }

    pub fn stage2_image(&self) -> Option<&StageImage> {
        self.stage2.as_ref()
    }

    pub fn stage3_image(&self) -> Option<&StageImage> {
        self.stage3.as_ref()
    }

    pub fn take_stage3_image(&mut self) -> Option<StageImage> {
        self.stage3.take()
    }

    /// Raw image retained for re-saving, if any.
    pub fn raw_image(&self) -> Option<&StageImage> {
        self.raw_image.as_ref()
    }

    pub fn raw_image_stage(&self) -> RawImageStage {
        self.raw_image_stage
    }

    /// Opcode list 1 that still has to be written next to `raw_image()`.
    pub fn raw_opcode_list_1(&self) -> &OpcodeList {
        &self.raw_opcode_list_1
    }

    /// Installs stage 1 produced by an importer rather than `read_stage1`.
    pub fn set_stage1(&mut self, image: StageImage) -> Result<()> {
        self.require_state(NegativeState::Parsed, "set_stage1")?;
        self.stage1 = Some(image);
        self.state = NegativeState::Stage1Read;
        Ok(())
    }

    pub fn raw_image_digest(&self) -> Fingerprint {
        self.raw_image_digest
    }

    pub fn new_raw_image_digest(&self) -> Fingerprint {
        self.new_raw_image_digest
    }

    pub fn set_new_raw_image_digest(&mut self, digest: Fingerprint) {
        self.new_raw_image_digest = digest;
    }

    pub fn set_raw_image_digest(&mut self, digest: Fingerprint) {
        self.raw_image_digest = digest;
    }

    /// Stored or computed unique id; null until one of them happened.
    pub fn raw_data_unique_id(&self) -> Fingerprint {
        self.raw_data_unique_id
    }

    pub fn set_raw_data_unique_id(&mut self, id: Fingerprint) {
        self.raw_data_unique_id = id;
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut ProfileSet {
        &mut self.profiles
    }

    pub fn add_profile(&mut self, profile: CameraProfile) {
        self.profiles.add(profile);
    }

    /// Profile best matching `id`; see [`ProfileSet::select_index`].
    pub fn profile_by_id(&mut self, id: &ProfileId, use_default: bool) -> Result<Option<&CameraProfile>> {
        self.profiles.select(id, use_default)
    }

    /// Profile for the as-shot profile name, or the first one.
    pub fn default_profile(&mut self) -> Result<Option<&CameraProfile>> {
        let id = ProfileId::by_name(self.as_shot_profile_name.clone());
        self.profiles.select(&id, true)
    }

    /// Whether white balance is given as a camera neutral.
    pub fn has_camera_neutral(&self) -> bool {
        !self.camera_neutral.is_empty()
    }

    /// Crop origin and size in stage 3 pixels, (v, h).
    pub fn default_crop_area(&self) -> ((f64, f64), (f64, f64)) {
        let origin = (
            self.default_crop_origin_v.as_f64(),
            self.default_crop_origin_h.as_f64(),
        );
        let size = (
            self.default_crop_size_v.as_f64(),
            self.default_crop_size_h.as_f64(),
        );
        (origin, size)
    }

    /// Drops stage buffers and retained raw data.
    pub fn release_images(&mut self) {
        debug!("Releasing image buffers");
        self.stage1 = None;
        self.stage2 = None;
        self.stage3 = None;
        self.raw_image = None;
    }

    /// Marks the negative as processed; later steps are refused.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state < NegativeState::Stage1Read {
            return Err(DngError::program(format!(
                "finalize before stage 1 ({:?})",
                self.state
            )));
        }
        if self.raw_data_unique_id.is_null() {
            warn!("Finalizing without a raw data unique id");
        }
        self.state = NegativeState::Finalized;
        Ok(())
    }
}
