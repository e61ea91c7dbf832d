//! Camera profile tags, as found in IFD0 or in an extra profile stream.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::matrix::Matrix;
use crate::image_pipeline::common::rational::SRational;
use crate::image_pipeline::tags::directory::TagEntry;
use crate::image_pipeline::tags::parser::{TagHandler, TiffInfo};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    FieldType, TagContext, check_tag_count, check_tag_type, check_tag_type_integer,
    check_tag_type_real, tag,
};

/// Most colour channels a camera may have.
pub const MAX_COLOR_PLANES: u32 = 4;

/// Table dimensions `(hues, sats, vals)`.
pub type TableDims = (u32, u32, u32);

/// Profile fields exactly as stored; validated and converted by
/// `profile::CameraProfile::from_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileInfo {
    pub big_endian: bool,
    pub color_planes: u32,

    pub calibration_illuminant_1: u32,
    pub calibration_illuminant_2: u32,
    pub color_matrix_1: Matrix,
    pub color_matrix_2: Matrix,
    pub forward_matrix_1: Matrix,
    pub forward_matrix_2: Matrix,
    pub reduction_matrix_1: Matrix,
    pub reduction_matrix_2: Matrix,

    pub calibration_signature: String,
    pub name: String,
    pub copyright: String,
    pub embed_policy: u32,
    /// Restricts an extra profile to one camera model; empty for any.
    pub unique_camera_model: String,

    pub hue_sat_dims: TableDims,
    pub hue_sat_data_1: Vec<f32>,
    pub hue_sat_data_2: Vec<f32>,
    pub hue_sat_encoding: u32,

    pub look_table_dims: TableDims,
    pub look_table_data: Vec<f32>,
    pub look_table_encoding: u32,

    /// Flattened `(x, y)` pairs.
    pub tone_curve: Vec<f32>,
    pub baseline_exposure_offset: SRational,
    pub default_black_render: u32,
}

impl Default for ProfileInfo {
    fn default() -> Self {
        Self {
            big_endian: false,
            color_planes: 1,
            calibration_illuminant_1: 0,
            calibration_illuminant_2: 0,
            color_matrix_1: Matrix::empty(),
            color_matrix_2: Matrix::empty(),
            forward_matrix_1: Matrix::empty(),
            forward_matrix_2: Matrix::empty(),
            reduction_matrix_1: Matrix::empty(),
            reduction_matrix_2: Matrix::empty(),
            calibration_signature: String::new(),
            name: String::new(),
            copyright: String::new(),
            embed_policy: 0,
            unique_camera_model: String::new(),
            hue_sat_dims: (0, 0, 0),
            hue_sat_data_1: Vec::new(),
            hue_sat_data_2: Vec::new(),
            hue_sat_encoding: 0,
            look_table_dims: (0, 0, 0),
            look_table_data: Vec::new(),
            look_table_encoding: 0,
            tone_curve: Vec::new(),
            baseline_exposure_offset: SRational::new(0, 1),
            default_black_render: 0,
        }
    }
}

impl ProfileInfo {
    pub fn has_color_matrix(&self) -> bool {
        !self.color_matrix_1.is_empty()
    }
}

/// Reads a `rows x cols` matrix stored row-major.
pub fn read_matrix(
    stream: &mut TiffStream<'_>,
    field_type: FieldType,
    rows: usize,
    cols: usize,
) -> Result<Matrix> {
    let values = stream.tag_values_f64(field_type, (rows * cols) as u32)?;
    Matrix::from_slice(rows, cols, &values)
}

/// Table entry counts accepted for `dims`: full, or with the sat = 0 column omitted.
pub fn table_counts(dims: TableDims) -> (u32, u32) {
    let (hues, sats, vals) = dims;
    let full = hues * sats * vals * 3;
    let skipped = hues * sats.saturating_sub(1) * vals * 3;
    (full, skipped)
}

fn read_dims(stream: &mut TiffStream<'_>, entry: &TagEntry) -> Result<TableDims> {
    check_tag_type_integer(entry.code, entry.field_type)?;
    check_tag_count(entry.code, entry.count, 2, 3)?;
    let hues = stream.tag_value_u32(entry.field_type)?;
    let sats = stream.tag_value_u32(entry.field_type)?;
    let vals = if entry.count == 3 {
        stream.tag_value_u32(entry.field_type)?
    } else {
        1
    };
    if sats < 2 || vals < 1 || hues > 360 || sats > 256 || vals > 256 {
        return Err(DngError::bad_format(format!(
            "table dimensions {}x{}x{}",
            hues, sats, vals
        )));
    }
    Ok((hues, sats, vals))
}

fn read_table(stream: &mut TiffStream<'_>, entry: &TagEntry, dims: TableDims) -> Result<Vec<f32>> {
    check_tag_type(entry.code, entry.field_type, &[FieldType::Float])?;
    let (full, skipped) = table_counts(dims);
    if entry.count != full && entry.count != skipped {
        return Err(DngError::bad_format(format!(
            "tag {} has {} entries for dimensions {:?}",
            entry.code, entry.count, dims
        )));
    }
    (0..entry.count).map(|_| stream.get_f32()).collect()
}

/// Text tags that may be stored as ASCII or as UTF-8 bytes.
fn read_text(stream: &mut TiffStream<'_>, entry: &TagEntry) -> Result<String> {
    check_tag_type(
        entry.code,
        entry.field_type,
        &[FieldType::Ascii, FieldType::Byte],
    )?;
    stream.tag_value_ascii(entry.count)
}

/// Colour profile tags in IFD0 (the embedded profile) and in extra profile streams.
pub struct ProfileHandler;

impl ProfileHandler {
    fn parse_profile_tag(
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        profile: &mut ProfileInfo,
    ) -> Result<bool> {
        let code = entry.code;
        let ft = entry.field_type;
        let count = entry.count;

        match code {
            tag::CALIBRATION_ILLUMINANT_1 | tag::CALIBRATION_ILLUMINANT_2 => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                let value = stream.tag_value_u32(ft)?;
                if code == tag::CALIBRATION_ILLUMINANT_1 {
                    profile.calibration_illuminant_1 = value;
                } else {
                    profile.calibration_illuminant_2 = value;
                }
            }
            tag::COLOR_MATRIX_1 | tag::COLOR_MATRIX_2 => {
                check_tag_type_real(code, ft)?;
                if profile.color_planes == 1 {
                    profile.color_planes = (count / 3).clamp(1, MAX_COLOR_PLANES);
                }
                let planes = profile.color_planes;
                check_tag_count(code, count, planes * 3, planes * 3)?;
                let matrix = read_matrix(stream, ft, planes as usize, 3)?;
                if code == tag::COLOR_MATRIX_1 {
                    profile.color_matrix_1 = matrix;
                } else {
                    profile.color_matrix_2 = matrix;
                }
            }
            tag::FORWARD_MATRIX_1
            | tag::FORWARD_MATRIX_2
            | tag::REDUCTION_MATRIX_1
            | tag::REDUCTION_MATRIX_2 => {
                check_tag_type_real(code, ft)?;
                let planes = profile.color_planes;
                check_tag_count(code, count, planes * 3, planes * 3)?;
                let matrix = read_matrix(stream, ft, 3, planes as usize)?;
                match code {
                    tag::FORWARD_MATRIX_1 => profile.forward_matrix_1 = matrix,
                    tag::FORWARD_MATRIX_2 => profile.forward_matrix_2 = matrix,
                    tag::REDUCTION_MATRIX_1 => profile.reduction_matrix_1 = matrix,
                    _ => profile.reduction_matrix_2 = matrix,
                }
            }
            tag::PROFILE_CALIBRATION_SIGNATURE => {
                profile.calibration_signature = read_text(stream, entry)?;
            }
            tag::PROFILE_NAME => {
                profile.name = read_text(stream, entry)?;
            }
            tag::PROFILE_COPYRIGHT => {
                profile.copyright = read_text(stream, entry)?;
            }
            tag::PROFILE_EMBED_POLICY => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                profile.embed_policy = stream.tag_value_u32(ft)?;
            }
            tag::PROFILE_HUE_SAT_MAP_DIMS => {
                profile.hue_sat_dims = read_dims(stream, entry)?;
            }
            tag::PROFILE_HUE_SAT_MAP_DATA_1 => {
                profile.hue_sat_data_1 = read_table(stream, entry, profile.hue_sat_dims)?;
            }
            tag::PROFILE_HUE_SAT_MAP_DATA_2 => {
                profile.hue_sat_data_2 = read_table(stream, entry, profile.hue_sat_dims)?;
            }
            tag::PROFILE_HUE_SAT_MAP_ENCODING => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                profile.hue_sat_encoding = stream.tag_value_u32(ft)?;
            }
            tag::PROFILE_LOOK_TABLE_DIMS => {
                profile.look_table_dims = read_dims(stream, entry)?;
            }
            tag::PROFILE_LOOK_TABLE_DATA => {
                profile.look_table_data = read_table(stream, entry, profile.look_table_dims)?;
            }
            tag::PROFILE_LOOK_TABLE_ENCODING => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                profile.look_table_encoding = stream.tag_value_u32(ft)?;
            }
            tag::PROFILE_TONE_CURVE => {
                check_tag_type(code, ft, &[FieldType::Float])?;
                if count < 4 || count % 2 != 0 {
                    return Err(DngError::bad_format(format!(
                        "tone curve with {} values",
                        count
                    )));
                }
                profile.tone_curve = (0..count)
                    .map(|_| stream.get_f32())
                    .collect::<Result<_>>()?;
            }
            tag::BASELINE_EXPOSURE_OFFSET => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                profile.baseline_exposure_offset = stream.tag_value_srational(ft)?;
            }
            tag::DEFAULT_BLACK_RENDER => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                profile.default_black_render = stream.tag_value_u32(ft)?;
            }
            tag::UNIQUE_CAMERA_MODEL if context == TagContext::Profile => {
                profile.unique_camera_model = read_text(stream, entry)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl TagHandler for ProfileHandler {
    fn name(&self) -> &'static str {
        "camera profile"
    }

    fn parse_tag(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool> {
        let profile = match context {
            TagContext::Ifd(0) => &mut info.shared.camera_profile,
            TagContext::Profile => match info.extra_profiles.last_mut() {
                Some(profile) => profile,
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
        Self::parse_profile_tag(stream, context, entry, profile)
    }
}
