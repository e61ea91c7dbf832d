//! Serializing profiles as tags, either into IFD0 or as a standalone
//! profile stream (magic `0x4352`, offsets relative to the stream start).

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::matrix::Matrix;
use crate::image_pipeline::common::rational::SRational;
use crate::image_pipeline::profile::camera_profile::CameraProfile;
use crate::image_pipeline::tags::directory::{TagValue, TiffHeader};
use crate::image_pipeline::tags::types::{PROFILE_MAGIC, TIFF_HEADER_LEN, tag};
use crate::image_pipeline::writer::directory_builder::DirectoryBuilder;

const MATRIX_DENOMINATOR: i32 = 10_000;

pub fn matrix_tag(m: &Matrix) -> TagValue {
    TagValue::SRational(
        m.values()
            .iter()
            .map(|&v| SRational::from_f64(v, MATRIX_DENOMINATOR))
            .collect(),
    )
}

fn dims_tag((hues, sats, vals): (u32, u32, u32)) -> TagValue {
    TagValue::Long(vec![hues, sats, vals])
}

/// Adds the tags describing `profile`.
///
/// `standalone` adds the camera model restriction, which only has meaning
/// inside a profile stream.
pub fn add_profile_tags(
    builder: &mut DirectoryBuilder,
    profile: &CameraProfile,
    standalone: bool,
) -> Result<()> {
    let info = profile.to_info();

    if info.calibration_illuminant_1 != 0 {
        builder.add(
            tag::CALIBRATION_ILLUMINANT_1,
            TagValue::Short(vec![info.calibration_illuminant_1 as u16]),
        )?;
    }
    if info.calibration_illuminant_2 != 0 && !info.color_matrix_2.is_empty() {
        builder.add(
            tag::CALIBRATION_ILLUMINANT_2,
            TagValue::Short(vec![info.calibration_illuminant_2 as u16]),
        )?;
    }

    let matrices = [
        (tag::COLOR_MATRIX_1, &info.color_matrix_1),
        (tag::COLOR_MATRIX_2, &info.color_matrix_2),
        (tag::FORWARD_MATRIX_1, &info.forward_matrix_1),
        (tag::FORWARD_MATRIX_2, &info.forward_matrix_2),
        (tag::REDUCTION_MATRIX_1, &info.reduction_matrix_1),
        (tag::REDUCTION_MATRIX_2, &info.reduction_matrix_2),
    ];
    for (code, matrix) in matrices {
        if !matrix.is_empty() {
            builder.add(code, matrix_tag(matrix))?;
        }
    }

    let texts = [
        (tag::PROFILE_CALIBRATION_SIGNATURE, &info.calibration_signature),
        (tag::PROFILE_NAME, &info.name),
        (tag::PROFILE_COPYRIGHT, &info.copyright),
    ];
    for (code, text) in texts {
        if !text.is_empty() {
            builder.add(code, TagValue::Ascii(text.clone()))?;
        }
    }
    builder.add(tag::PROFILE_EMBED_POLICY, TagValue::Long(vec![info.embed_policy]))?;

    if !info.hue_sat_data_1.is_empty() {
        builder.add(tag::PROFILE_HUE_SAT_MAP_DIMS, dims_tag(info.hue_sat_dims))?;
        builder.add(
            tag::PROFILE_HUE_SAT_MAP_DATA_1,
            TagValue::Float(info.hue_sat_data_1.clone()),
        )?;
        if !info.hue_sat_data_2.is_empty() {
            builder.add(
                tag::PROFILE_HUE_SAT_MAP_DATA_2,
                TagValue::Float(info.hue_sat_data_2.clone()),
            )?;
        }
        if info.hue_sat_encoding != 0 {
            builder.add(
                tag::PROFILE_HUE_SAT_MAP_ENCODING,
                TagValue::Long(vec![info.hue_sat_encoding]),
            )?;
        }
    }
    if !info.look_table_data.is_empty() {
        builder.add(tag::PROFILE_LOOK_TABLE_DIMS, dims_tag(info.look_table_dims))?;
        builder.add(
            tag::PROFILE_LOOK_TABLE_DATA,
            TagValue::Float(info.look_table_data.clone()),
        )?;
        if info.look_table_encoding != 0 {
            builder.add(
                tag::PROFILE_LOOK_TABLE_ENCODING,
                TagValue::Long(vec![info.look_table_encoding]),
            )?;
        }
    }
    if !info.tone_curve.is_empty() {
        builder.add(tag::PROFILE_TONE_CURVE, TagValue::Float(info.tone_curve.clone()))?;
    }
    if info.baseline_exposure_offset.n != 0 {
        builder.add(
            tag::BASELINE_EXPOSURE_OFFSET,
            TagValue::SRational(vec![info.baseline_exposure_offset]),
        )?;
    }
    if info.default_black_render != 0 {
        builder.add(
            tag::DEFAULT_BLACK_RENDER,
            TagValue::Long(vec![info.default_black_render]),
        )?;
    }
    if standalone && !info.unique_camera_model.is_empty() {
        builder.add(
            tag::UNIQUE_CAMERA_MODEL,
            TagValue::Ascii(info.unique_camera_model.clone()),
        )?;
    }
    Ok(())
}

/// Serializes `profile` as a self-contained profile stream.
pub fn write_profile_stream(profile: &CameraProfile, endian: Endian) -> Result<Vec<u8>> {
    let mut builder = DirectoryBuilder::new();
    add_profile_tags(&mut builder, profile, true)?;

    let mut out = Vec::with_capacity(TIFF_HEADER_LEN + builder.size() as usize);
    TiffHeader {
        endian,
        magic: PROFILE_MAGIC,
        first_ifd: TIFF_HEADER_LEN as u64,
    }
    .write(&mut out);
    let block = builder.build(endian, TIFF_HEADER_LEN as u64)?;
    out.extend_from_slice(&block.bytes);
    Ok(out)
}
