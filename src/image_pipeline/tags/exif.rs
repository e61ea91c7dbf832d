//! Capture metadata: IFD0 descriptive strings, EXIF and GPS sub-directories.

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::tags::directory::TagEntry;
use crate::image_pipeline::tags::parser::{TagHandler, TiffInfo};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    FieldType, TagContext, check_tag_count, check_tag_type, check_tag_type_integer,
    check_tag_type_real, tag,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsInfo {
    pub version_id: Vec<u8>,
    pub latitude_ref: String,
    pub latitude: Vec<URational>,
    pub longitude_ref: String,
    pub longitude: Vec<URational>,
    pub altitude_ref: u32,
    pub altitude: URational,
    pub time_stamp: Vec<URational>,
    pub map_datum: String,
    pub date_stamp: String,
}

impl GpsInfo {
    pub fn is_present(&self) -> bool {
        !self.version_id.is_empty() || self.latitude.len() == 3 || self.longitude.len() == 3
    }

    /// Signed decimal degrees, south negative.
    pub fn latitude_degrees(&self) -> Option<f64> {
        degrees(&self.latitude).map(|d| if self.latitude_ref == "S" { -d } else { d })
    }

    /// Signed decimal degrees, west negative.
    pub fn longitude_degrees(&self) -> Option<f64> {
        degrees(&self.longitude).map(|d| if self.longitude_ref == "W" { -d } else { d })
    }

    /// Metres, below sea level negative.
    pub fn altitude_metres(&self) -> Option<f64> {
        if !self.altitude.is_valid() {
            return None;
        }
        let metres = self.altitude.as_f64();
        Some(if self.altitude_ref == 1 { -metres } else { metres })
    }

    /// Fills the position tags from decimal degrees.
    pub fn set_position(&mut self, latitude: f64, longitude: f64, altitude: Option<f64>) {
        self.version_id = vec![2, 2, 0, 0];
        self.latitude_ref = if latitude < 0.0 { "S" } else { "N" }.to_string();
        self.latitude = to_dms(latitude.abs());
        self.longitude_ref = if longitude < 0.0 { "W" } else { "E" }.to_string();
        self.longitude = to_dms(longitude.abs());
        if let Some(alt) = altitude {
            self.altitude_ref = u32::from(alt < 0.0);
            self.altitude = URational::from_f64(alt.abs(), 100);
        }
    }
}

fn degrees(dms: &[URational]) -> Option<f64> {
    if dms.len() != 3 || !dms.iter().all(|r| r.is_valid()) {
        return None;
    }
    Some(dms[0].as_f64() + dms[1].as_f64() / 60.0 + dms[2].as_f64() / 3600.0)
}

fn to_dms(value: f64) -> Vec<URational> {
    let deg = value.trunc();
    let min = ((value - deg) * 60.0).trunc();
    let sec = (value - deg - min / 60.0) * 3600.0;
    vec![
        URational::new(deg as u32, 1),
        URational::new(min as u32, 1),
        URational::from_f64(sec.max(0.0), 10_000),
    ]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifInfo {
    pub make: String,
    pub model: String,
    pub software: String,
    pub artist: String,
    pub copyright: String,
    pub image_description: String,
    pub date_time: String,
    pub date_time_original: String,
    pub date_time_digitized: String,

    pub exposure_time: URational,
    pub f_number: URational,
    pub exposure_program: u32,
    pub iso_speed: Vec<u32>,
    pub exposure_bias: SRational,
    pub max_aperture: URational,
    pub metering_mode: u32,
    pub light_source: u32,
    pub flash: u32,
    pub focal_length: URational,
    pub focal_length_35mm: u32,
    pub white_balance: u32,
    pub exif_version: Vec<u8>,
    pub user_comment: String,
    pub owner_name: String,
    pub body_serial_number: String,
    pub lens_specification: Vec<URational>,
    pub lens_make: String,
    pub lens_model: String,

    /// Raw EXIF maker note and its absolute offset in the source stream.
    pub maker_note: Vec<u8>,
    pub maker_note_offset: u64,

    pub gps: GpsInfo,
}

/// IFD0 descriptive strings, EXIF and GPS tags.
pub struct ExifHandler;

impl ExifHandler {
    fn parse_ifd0(
        stream: &mut TiffStream<'_>,
        entry: &TagEntry,
        exif: &mut ExifInfo,
    ) -> Result<bool> {
        let target = match entry.code {
            tag::MAKE => &mut exif.make,
            tag::MODEL => &mut exif.model,
            tag::SOFTWARE => &mut exif.software,
            tag::ARTIST => &mut exif.artist,
            tag::COPYRIGHT => &mut exif.copyright,
            tag::IMAGE_DESCRIPTION => &mut exif.image_description,
            tag::DATE_TIME => &mut exif.date_time,
            _ => return Ok(false),
        };
        check_tag_type(entry.code, entry.field_type, &[FieldType::Ascii])?;
        *target = stream.tag_value_ascii(entry.count)?;
        Ok(true)
    }

    fn parse_exif(
        stream: &mut TiffStream<'_>,
        entry: &TagEntry,
        exif: &mut ExifInfo,
    ) -> Result<bool> {
        let code = entry.code;
        let ft = entry.field_type;
        let count = entry.count;
        match code {
            tag::EXPOSURE_TIME => {
                check_tag_type_real(code, ft)?;
                exif.exposure_time = stream.tag_value_urational(ft)?;
            }
            tag::F_NUMBER => {
                check_tag_type_real(code, ft)?;
                exif.f_number = stream.tag_value_urational(ft)?;
            }
            tag::EXPOSURE_PROGRAM => {
                check_tag_type_integer(code, ft)?;
                exif.exposure_program = stream.tag_value_u32(ft)?;
            }
            tag::ISO_SPEED_RATINGS => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 3)?;
                exif.iso_speed = stream.tag_values_u32(ft, count)?;
            }
            tag::EXIF_VERSION => {
                check_tag_type(code, ft, &[FieldType::Undefined])?;
                check_tag_count(code, count, 4, 4)?;
                exif.exif_version = stream.get_bytes(4)?.to_vec();
            }
            tag::DATE_TIME_ORIGINAL | tag::DATE_TIME_DIGITIZED => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                let value = stream.tag_value_ascii(count)?;
                if code == tag::DATE_TIME_ORIGINAL {
                    exif.date_time_original = value;
                } else {
                    exif.date_time_digitized = value;
                }
            }
            tag::EXPOSURE_BIAS_VALUE => {
                check_tag_type_real(code, ft)?;
                exif.exposure_bias = stream.tag_value_srational(ft)?;
            }
            tag::MAX_APERTURE_VALUE => {
                check_tag_type_real(code, ft)?;
                exif.max_aperture = stream.tag_value_urational(ft)?;
            }
            tag::METERING_MODE => {
                check_tag_type_integer(code, ft)?;
                exif.metering_mode = stream.tag_value_u32(ft)?;
            }
            tag::LIGHT_SOURCE => {
                check_tag_type_integer(code, ft)?;
                exif.light_source = stream.tag_value_u32(ft)?;
            }
            tag::FLASH => {
                check_tag_type_integer(code, ft)?;
                exif.flash = stream.tag_value_u32(ft)?;
            }
            tag::FOCAL_LENGTH => {
                check_tag_type_real(code, ft)?;
                exif.focal_length = stream.tag_value_urational(ft)?;
            }
            tag::FOCAL_LENGTH_IN_35MM_FILM => {
                check_tag_type_integer(code, ft)?;
                exif.focal_length_35mm = stream.tag_value_u32(ft)?;
            }
            tag::WHITE_BALANCE => {
                check_tag_type_integer(code, ft)?;
                exif.white_balance = stream.tag_value_u32(ft)?;
            }
            tag::MAKER_NOTE => {
                check_tag_type(code, ft, &[FieldType::Undefined, FieldType::Byte])?;
                exif.maker_note_offset = entry.value_offset;
                exif.maker_note = stream.get_bytes(count as usize)?.to_vec();
            }
            tag::USER_COMMENT => {
                check_tag_type(code, ft, &[FieldType::Undefined, FieldType::Ascii])?;
                exif.user_comment = parse_user_comment(stream.get_bytes(count as usize)?);
            }
            tag::CAMERA_OWNER_NAME => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                exif.owner_name = stream.tag_value_ascii(count)?;
            }
            tag::BODY_SERIAL_NUMBER => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                exif.body_serial_number = stream.tag_value_ascii(count)?;
            }
            tag::LENS_SPECIFICATION => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 4, 4)?;
                exif.lens_specification = (0..4)
                    .map(|_| stream.tag_value_urational(ft))
                    .collect::<Result<_>>()?;
            }
            tag::LENS_MAKE => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                exif.lens_make = stream.tag_value_ascii(count)?;
            }
            tag::LENS_MODEL => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                exif.lens_model = stream.tag_value_ascii(count)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn parse_gps(stream: &mut TiffStream<'_>, entry: &TagEntry, gps: &mut GpsInfo) -> Result<bool> {
        let code = entry.code;
        let ft = entry.field_type;
        let count = entry.count;
        match code {
            tag::GPS_VERSION_ID => {
                check_tag_type(code, ft, &[FieldType::Byte])?;
                check_tag_count(code, count, 4, 4)?;
                gps.version_id = stream.get_bytes(4)?.to_vec();
            }
            tag::GPS_LATITUDE_REF | tag::GPS_LONGITUDE_REF => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                let value = stream.tag_value_ascii(count)?;
                if code == tag::GPS_LATITUDE_REF {
                    gps.latitude_ref = value;
                } else {
                    gps.longitude_ref = value;
                }
            }
            tag::GPS_LATITUDE | tag::GPS_LONGITUDE | tag::GPS_TIME_STAMP => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 3, 3)?;
                let values = (0..3)
                    .map(|_| stream.tag_value_urational(ft))
                    .collect::<Result<Vec<_>>>()?;
                match code {
                    tag::GPS_LATITUDE => gps.latitude = values,
                    tag::GPS_LONGITUDE => gps.longitude = values,
                    _ => gps.time_stamp = values,
                }
            }
            tag::GPS_ALTITUDE_REF => {
                check_tag_type_integer(code, ft)?;
                gps.altitude_ref = stream.tag_value_u32(ft)?;
            }
            tag::GPS_ALTITUDE => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                gps.altitude = stream.tag_value_urational(ft)?;
            }
            tag::GPS_MAP_DATUM => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                gps.map_datum = stream.tag_value_ascii(count)?;
            }
            tag::GPS_DATE_STAMP => {
                check_tag_type(code, ft, &[FieldType::Ascii])?;
                gps.date_stamp = stream.tag_value_ascii(count)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl TagHandler for ExifHandler {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn parse_tag(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool> {
        match context {
            TagContext::Ifd(0) => Self::parse_ifd0(stream, entry, &mut info.exif),
            TagContext::Exif => Self::parse_exif(stream, entry, &mut info.exif),
            TagContext::Gps => Self::parse_gps(stream, entry, &mut info.exif.gps),
            _ => Ok(false),
        }
    }
}

/// Decodes an EXIF user comment; the first 8 bytes name the character code.
fn parse_user_comment(bytes: &[u8]) -> String {
    let (code, text) = if bytes.len() >= 8 {
        bytes.split_at(8)
    } else {
        (&[][..], bytes)
    };
    let decoded = if code.starts_with(b"UNICODE") && text.len() >= 2 {
        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if code.starts_with(b"ASCII") || code.iter().all(|&b| b == 0) {
        String::from_utf8_lossy(text).into_owned()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    decoded.trim_end_matches(['\0', ' ']).to_string()
}

/// Encodes a user comment with the ASCII or UNICODE character code.
pub fn encode_user_comment(comment: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + comment.len() * 2);
    if comment.is_ascii() {
        out.extend_from_slice(b"ASCII\0\0\0");
        out.extend_from_slice(comment.as_bytes());
    } else {
        out.extend_from_slice(b"UNICODE\0");
        for unit in comment.encode_utf16() {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_position_converts_both_ways() {
        let mut gps = GpsInfo::default();
        gps.set_position(-33.8675, 151.2070, Some(-12.5));
        assert!(gps.is_present());
        assert_eq!(gps.latitude_ref, "S");
        assert!((gps.latitude_degrees().unwrap() + 33.8675).abs() < 1e-6);
        assert!((gps.longitude_degrees().unwrap() - 151.2070).abs() < 1e-6);
        assert_eq!(gps.altitude_metres(), Some(-12.5));
    }

    #[test]
    fn user_comment_character_codes() {
        assert_eq!(parse_user_comment(&encode_user_comment("hello")), "hello");
        assert_eq!(
            parse_user_comment(&encode_user_comment("caf\u{e9}")),
            "caf\u{e9}"
        );
        assert_eq!(parse_user_comment(b"\0\0\0\0\0\0\0\0note  "), "note");
    }
}
