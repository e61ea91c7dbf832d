//! Tags describing the capture: IFD0 strings, DNG colour and identity tags,
//! EXIF and GPS directories.

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::matrix::Vector;
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::fingerprint::Fingerprint;
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::profile::stream::matrix_tag;
use crate::image_pipeline::tags::directory::TagValue;
use crate::image_pipeline::tags::exif::{ExifInfo, GpsInfo, encode_user_comment};
use crate::image_pipeline::tags::shared::build_private_data;
use crate::image_pipeline::tags::types::tag;
use crate::image_pipeline::writer::directory_builder::DirectoryBuilder;

const EXIF_VERSION_2_3: &[u8; 4] = b"0230";

fn add_text(builder: &mut DirectoryBuilder, code: u16, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    builder.add(code, TagValue::Ascii(text.to_string()))
}

fn add_rational(builder: &mut DirectoryBuilder, code: u16, value: URational) -> Result<()> {
    if !value.is_valid() {
        return Ok(());
    }
    builder.add(code, TagValue::Rational(vec![value]))
}

fn add_short(builder: &mut DirectoryBuilder, code: u16, value: u32) -> Result<()> {
    if value == 0 {
        return Ok(());
    }
    builder.add(code, TagValue::Short(vec![value.min(u16::MAX as u32) as u16]))
}

fn add_digest(builder: &mut DirectoryBuilder, code: u16, digest: Fingerprint) -> Result<()> {
    if digest.is_null() {
        return Ok(());
    }
    builder.add(code, TagValue::Byte(digest.as_bytes().to_vec()))
}

fn vector_tag(vector: &Vector) -> TagValue {
    TagValue::Rational(
        vector
            .values()
            .iter()
            .map(|&v| URational::from_f64_auto(v))
            .collect(),
    )
}

/// Descriptive strings EXIF keeps in IFD0.
pub fn add_ifd0_strings(builder: &mut DirectoryBuilder, exif: &ExifInfo) -> Result<()> {
    add_text(builder, tag::MAKE, &exif.make)?;
    add_text(builder, tag::MODEL, &exif.model)?;
    let software = if exif.software.is_empty() {
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
    } else {
        exif.software.as_str()
    };
    add_text(builder, tag::SOFTWARE, software)?;
    add_text(builder, tag::ARTIST, &exif.artist)?;
    add_text(builder, tag::COPYRIGHT, &exif.copyright)?;
    add_text(builder, tag::IMAGE_DESCRIPTION, &exif.image_description)?;
    add_text(builder, tag::DATE_TIME, &exif.date_time)
}

/// Capture-wide DNG tags of `negative`, except image structure and
/// profile tags.
///
/// `baseline_exposure` replaces the negative's own value, so a linear save
/// can account for gain already applied to its pixels.
pub fn add_shared_tags(
    builder: &mut DirectoryBuilder,
    negative: &Negative,
    baseline_exposure: SRational,
    unique_id: Option<Fingerprint>,
) -> Result<()> {
    add_text(builder, tag::UNIQUE_CAMERA_MODEL, &negative.model_name)?;
    if negative.localized_model_name != negative.model_name {
        add_text(builder, tag::LOCALIZED_CAMERA_MODEL, &negative.localized_model_name)?;
    }

    for (code, matrix) in [
        (tag::CAMERA_CALIBRATION_1, &negative.camera_calibration_1),
        (tag::CAMERA_CALIBRATION_2, &negative.camera_calibration_2),
    ] {
        if !matrix.is_empty() {
            builder.add(code, matrix_tag(matrix))?;
        }
    }
    add_text(
        builder,
        tag::CAMERA_CALIBRATION_SIGNATURE,
        &negative.camera_calibration_signature,
    )?;

    if !negative.analog_balance.is_empty() {
        builder.add(tag::ANALOG_BALANCE, vector_tag(&negative.analog_balance))?;
    }
    if negative.has_camera_neutral() {
        builder.add(tag::AS_SHOT_NEUTRAL, vector_tag(&negative.camera_neutral))?;
    } else if let Some((x, y)) = negative.camera_white_xy {
        builder.add(
            tag::AS_SHOT_WHITE_XY,
            TagValue::Rational(vec![URational::from_f64_auto(x), URational::from_f64_auto(y)]),
        )?;
    }

    builder.add(tag::BASELINE_EXPOSURE, TagValue::SRational(vec![baseline_exposure]))?;
    add_rational(builder, tag::BASELINE_NOISE, negative.baseline_noise)?;
    add_rational(builder, tag::BASELINE_SHARPNESS, negative.baseline_sharpness)?;
    add_rational(builder, tag::LINEAR_RESPONSE_LIMIT, negative.linear_response_limit)?;
    add_rational(builder, tag::SHADOW_SCALE, negative.shadow_scale)?;
    add_short(builder, tag::COLORIMETRIC_REFERENCE, negative.colorimetric_reference)?;
    add_text(builder, tag::AS_SHOT_PROFILE_NAME, &negative.as_shot_profile_name)?;

    add_text(builder, tag::CAMERA_SERIAL_NUMBER, &negative.exif.body_serial_number)?;
    if negative.exif.lens_specification.len() == 4 {
        builder.add(
            tag::LENS_INFO,
            TagValue::Rational(negative.exif.lens_specification.clone()),
        )?;
    }

    if negative.maker_note_safe {
        if let Some(note) = &negative.maker_note {
            builder.add(tag::DNG_PRIVATE_DATA, TagValue::Byte(build_private_data(note)))?;
            builder.add(tag::MAKER_NOTE_SAFETY, TagValue::Short(vec![1]))?;
        }
    }

    if let Some(id) = unique_id {
        add_digest(builder, tag::RAW_DATA_UNIQUE_ID, id)?;
    }
    add_text(builder, tag::ORIGINAL_RAW_FILE_NAME, &negative.original_raw_file_name)?;
    add_digest(builder, tag::ORIGINAL_RAW_FILE_DIGEST, negative.original_raw_file_digest)?;

    if !negative.xmp.is_empty() {
        builder.add(tag::XMP, TagValue::Byte(negative.xmp.clone()))?;
    }
    if !negative.iptc.is_empty() {
        builder.add(tag::IPTC, TagValue::Undefined(negative.iptc.clone()))?;
    }
    if !negative.noise_profile.is_empty() {
        builder.add(tag::NOISE_PROFILE, TagValue::Double(negative.noise_profile.to_flat()))?;
    }
    Ok(())
}

/// EXIF sub-directory, `None` if there is nothing to write.
pub fn exif_directory(exif: &ExifInfo) -> Result<Option<DirectoryBuilder>> {
    let mut builder = DirectoryBuilder::new();
    add_rational(&mut builder, tag::EXPOSURE_TIME, exif.exposure_time)?;
    add_rational(&mut builder, tag::F_NUMBER, exif.f_number)?;
    add_short(&mut builder, tag::EXPOSURE_PROGRAM, exif.exposure_program)?;
    if !exif.iso_speed.is_empty() {
        builder.add(
            tag::ISO_SPEED_RATINGS,
            TagValue::Short(
                exif.iso_speed
                    .iter()
                    .take(3)
                    .map(|&v| v.min(u16::MAX as u32) as u16)
                    .collect(),
            ),
        )?;
    }
    add_text(&mut builder, tag::DATE_TIME_ORIGINAL, &exif.date_time_original)?;
    add_text(&mut builder, tag::DATE_TIME_DIGITIZED, &exif.date_time_digitized)?;
    if exif.exposure_bias.is_valid() {
        builder.add(tag::EXPOSURE_BIAS_VALUE, TagValue::SRational(vec![exif.exposure_bias]))?;
    }
    add_rational(&mut builder, tag::MAX_APERTURE_VALUE, exif.max_aperture)?;
    add_short(&mut builder, tag::METERING_MODE, exif.metering_mode)?;
    add_short(&mut builder, tag::LIGHT_SOURCE, exif.light_source)?;
    add_short(&mut builder, tag::FLASH, exif.flash)?;
    add_rational(&mut builder, tag::FOCAL_LENGTH, exif.focal_length)?;
    add_short(&mut builder, tag::FOCAL_LENGTH_IN_35MM_FILM, exif.focal_length_35mm)?;
    add_short(&mut builder, tag::WHITE_BALANCE, exif.white_balance)?;
    if !exif.user_comment.is_empty() {
        builder.add(
            tag::USER_COMMENT,
            TagValue::Undefined(encode_user_comment(&exif.user_comment)),
        )?;
    }
    add_text(&mut builder, tag::CAMERA_OWNER_NAME, &exif.owner_name)?;
    add_text(&mut builder, tag::BODY_SERIAL_NUMBER, &exif.body_serial_number)?;
    if exif.lens_specification.len() == 4 {
        builder.add(
            tag::LENS_SPECIFICATION,
            TagValue::Rational(exif.lens_specification.clone()),
        )?;
    }
    add_text(&mut builder, tag::LENS_MAKE, &exif.lens_make)?;
    add_text(&mut builder, tag::LENS_MODEL, &exif.lens_model)?;

    if builder.is_empty() {
        return Ok(None);
    }
    let version = match exif.exif_version.as_slice() {
        v if v.len() == 4 => v.to_vec(),
        _ => EXIF_VERSION_2_3.to_vec(),
    };
    builder.add(tag::EXIF_VERSION, TagValue::Undefined(version))?;
    Ok(Some(builder))
}

/// GPS sub-directory, `None` without a position.
pub fn gps_directory(gps: &GpsInfo) -> Result<Option<DirectoryBuilder>> {
    if !gps.is_present() {
        return Ok(None);
    }
    let mut builder = DirectoryBuilder::new();
    let version = if gps.version_id.len() == 4 {
        gps.version_id.clone()
    } else {
        vec![2, 2, 0, 0]
    };
    builder.add(tag::GPS_VERSION_ID, TagValue::Byte(version))?;
    for (code, reference, dms) in [
        (tag::GPS_LATITUDE, &gps.latitude_ref, &gps.latitude),
        (tag::GPS_LONGITUDE, &gps.longitude_ref, &gps.longitude),
    ] {
        if dms.len() == 3 {
            // The reference tag code directly precedes its value tag.
            add_text(&mut builder, code - 1, reference)?;
            builder.add(code, TagValue::Rational(dms.clone()))?;
        }
    }
    if gps.altitude.is_valid() {
        builder.add(tag::GPS_ALTITUDE_REF, TagValue::Byte(vec![gps.altitude_ref as u8]))?;
        builder.add(tag::GPS_ALTITUDE, TagValue::Rational(vec![gps.altitude]))?;
    }
    if gps.time_stamp.len() == 3 {
        builder.add(tag::GPS_TIME_STAMP, TagValue::Rational(gps.time_stamp.clone()))?;
    }
    add_text(&mut builder, tag::GPS_MAP_DATUM, &gps.map_datum)?;
    add_text(&mut builder, tag::GPS_DATE_STAMP, &gps.date_stamp)?;
    Ok(Some(builder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_exif_writes_no_directory() {
        assert!(exif_directory(&ExifInfo::default()).unwrap().is_none());
        assert!(gps_directory(&GpsInfo::default()).unwrap().is_none());
    }

    #[test]
    fn exif_directory_gets_a_version() {
        let exif = ExifInfo {
            exposure_time: URational::new(1, 250),
            iso_speed: vec![400],
            ..ExifInfo::default()
        };
        let builder = exif_directory(&exif).unwrap().unwrap();
        assert!(builder.contains(tag::EXIF_VERSION));
        assert!(builder.contains(tag::EXPOSURE_TIME));
        assert!(!builder.contains(tag::F_NUMBER));
    }

    #[test]
    fn gps_position_writes_reference_tags() {
        let mut gps = GpsInfo::default();
        gps.set_position(48.85, -2.35, None);
        let builder = gps_directory(&gps).unwrap().unwrap();
        assert!(builder.contains(tag::GPS_LATITUDE_REF));
        assert!(builder.contains(tag::GPS_LONGITUDE_REF));
        assert!(!builder.contains(tag::GPS_ALTITUDE));
    }
}
