//! DNG tags describing the capture as a whole (IFD0 only).

use tracing::warn;

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::matrix::{Matrix, Vector};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::fingerprint::Fingerprint;
use crate::image_pipeline::tags::directory::TagEntry;
use crate::image_pipeline::tags::parser::{TagHandler, TiffInfo};
use crate::image_pipeline::tags::profile_info::{ProfileInfo, read_matrix};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    FieldType, TagContext, check_tag_count, check_tag_type, check_tag_type_integer,
    check_tag_type_real, tag,
};

/// Maker note carried in `DNGPrivateData`.
#[derive(Debug, Clone, PartialEq)]
pub struct MakerNote {
    pub data: Vec<u8>,
    /// Byte order of the original file the note came from.
    pub endian: Endian,
    /// Offset of the note in the original file.
    pub original_offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedInfo {
    pub exif_ifd: Option<u64>,
    pub gps_ifd: Option<u64>,

    pub dng_version: u32,
    pub dng_backward_version: u32,
    pub unique_camera_model: String,
    pub localized_camera_model: String,

    pub camera_profile: ProfileInfo,
    pub extra_camera_profiles: Vec<u64>,

    pub camera_calibration_1: Matrix,
    pub camera_calibration_2: Matrix,
    pub camera_calibration_signature: String,
    pub analog_balance: Vector,
    pub as_shot_neutral: Vector,
    pub as_shot_white_xy: Option<(f64, f64)>,

    pub baseline_exposure: SRational,
    pub baseline_noise: URational,
    pub baseline_sharpness: URational,
    pub linear_response_limit: URational,
    pub shadow_scale: URational,
    pub noise_reduction_applied: URational,
    pub colorimetric_reference: u32,
    pub as_shot_profile_name: String,

    pub camera_serial_number: String,
    pub lens_info: Vec<URational>,

    pub dng_private_data: Vec<u8>,
    pub maker_note: Option<MakerNote>,
    pub maker_note_safety: u32,

    pub raw_data_unique_id: Fingerprint,
    pub original_raw_file_name: String,
    pub original_raw_file_digest: Fingerprint,
    pub raw_image_digest: Fingerprint,
    pub new_raw_image_digest: Fingerprint,

    pub xmp: Vec<u8>,
    pub iptc: Vec<u8>,
}

impl Default for SharedInfo {
    fn default() -> Self {
        Self {
            exif_ifd: None,
            gps_ifd: None,
            dng_version: 0,
            dng_backward_version: 0,
            unique_camera_model: String::new(),
            localized_camera_model: String::new(),
            camera_profile: ProfileInfo::default(),
            extra_camera_profiles: Vec::new(),
            camera_calibration_1: Matrix::empty(),
            camera_calibration_2: Matrix::empty(),
            camera_calibration_signature: String::new(),
            analog_balance: Vector::default(),
            as_shot_neutral: Vector::default(),
            as_shot_white_xy: None,
            baseline_exposure: SRational::new(0, 1),
            baseline_noise: URational::new(1, 1),
            baseline_sharpness: URational::new(1, 1),
            linear_response_limit: URational::new(1, 1),
            shadow_scale: URational::new(1, 1),
            noise_reduction_applied: URational::new(0, 0),
            colorimetric_reference: 0,
            as_shot_profile_name: String::new(),
            camera_serial_number: String::new(),
            lens_info: Vec::new(),
            dng_private_data: Vec::new(),
            maker_note: None,
            maker_note_safety: 0,
            raw_data_unique_id: Fingerprint::NULL,
            original_raw_file_name: String::new(),
            original_raw_file_digest: Fingerprint::NULL,
            raw_image_digest: Fingerprint::NULL,
            new_raw_image_digest: Fingerprint::NULL,
            xmp: Vec::new(),
            iptc: Vec::new(),
        }
    }
}

impl SharedInfo {
    pub fn is_dng(&self) -> bool {
        self.dng_version != 0
    }
}

/// Extracts the `MakN` block from `DNGPrivateData`.
///
/// Layout: `"Adobe\0"`, then blocks of a 4-byte tag and a big-endian length.
/// A `MakN` block holds a byte order mark, the original offset (big-endian)
/// and the note itself. Returns `Ok(None)` for private data of other writers.
pub fn parse_maker_note(private_data: &[u8]) -> Result<Option<MakerNote>> {
    const ADOBE: &[u8] = b"Adobe\0";
    if !private_data.starts_with(ADOBE) {
        return Ok(None);
    }
    let mut pos = ADOBE.len();
    while pos + 8 <= private_data.len() {
        let block_tag = &private_data[pos..pos + 4];
        let len = Endian::Big
            .read_u32(private_data, pos + 4)
            .ok_or(DngError::EndOfFile(pos as u64 + 4))? as usize;
        pos += 8;
        let end = pos
            .checked_add(len)
            .filter(|&end| end <= private_data.len())
            .ok_or_else(|| DngError::bad_format(format!("private data block overruns by {}", len)))?;
        if block_tag == b"MakN" {
            if len < 6 {
                return Err(DngError::bad_format("maker note block too short"));
            }
            let endian = Endian::from_marker([private_data[pos], private_data[pos + 1]])
                .ok_or_else(|| DngError::bad_format("maker note byte order"))?;
            let original_offset = Endian::Big
                .read_u32(private_data, pos + 2)
                .ok_or(DngError::EndOfFile(pos as u64 + 2))? as u64;
            return Ok(Some(MakerNote {
                data: private_data[pos + 6..end].to_vec(),
                endian,
                original_offset,
            }));
        }
        pos = end;
    }
    Ok(None)
}

/// Builds `DNGPrivateData` holding one maker note.
pub fn build_private_data(note: &MakerNote) -> Vec<u8> {
    let mut out = Vec::with_capacity(note.data.len() + 20);
    out.extend_from_slice(b"Adobe\0MakN");
    out.extend_from_slice(&((note.data.len() + 6) as u32).to_be_bytes());
    out.extend_from_slice(&note.endian.marker());
    out.extend_from_slice(&(note.original_offset as u32).to_be_bytes());
    out.extend_from_slice(&note.data);
    out
}

fn read_fingerprint(stream: &mut TiffStream<'_>, entry: &TagEntry) -> Result<Fingerprint> {
    check_tag_type(
        entry.code,
        entry.field_type,
        &[FieldType::Byte, FieldType::Undefined],
    )?;
    check_tag_count(entry.code, entry.count, 16, 16)?;
    Fingerprint::from_slice(stream.get_bytes(16)?)
        .ok_or_else(|| DngError::bad_format(format!("tag {} is not a digest", entry.code)))
}

fn read_text(stream: &mut TiffStream<'_>, entry: &TagEntry) -> Result<String> {
    check_tag_type(
        entry.code,
        entry.field_type,
        &[FieldType::Ascii, FieldType::Byte],
    )?;
    stream.tag_value_ascii(entry.count)
}

/// Capture-wide DNG tags in IFD0, plus the EXIF and GPS pointers.
pub struct SharedHandler;

impl SharedHandler {
    fn parse_ifd0(
        stream: &mut TiffStream<'_>,
        entry: &TagEntry,
        shared: &mut SharedInfo,
    ) -> Result<bool> {
        let code = entry.code;
        let ft = entry.field_type;
        let count = entry.count;
        let planes = shared.camera_profile.color_planes;

        match code {
            tag::EXIF_IFD => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                shared.exif_ifd = Some(stream.tag_value_u64(ft)?);
            }
            tag::GPS_IFD => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                shared.gps_ifd = Some(stream.tag_value_u64(ft)?);
            }
            tag::DNG_VERSION | tag::DNG_BACKWARD_VERSION => {
                check_tag_type(code, ft, &[FieldType::Byte])?;
                check_tag_count(code, count, 4, 4)?;
                let bytes = stream.get_bytes(4)?;
                let version = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if code == tag::DNG_VERSION {
                    shared.dng_version = version;
                } else {
                    shared.dng_backward_version = version;
                }
            }
            tag::UNIQUE_CAMERA_MODEL => {
                shared.unique_camera_model = read_text(stream, entry)?;
            }
            tag::LOCALIZED_CAMERA_MODEL => {
                shared.localized_camera_model = read_text(stream, entry)?;
            }
            tag::CAMERA_CALIBRATION_1 | tag::CAMERA_CALIBRATION_2 => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, planes * planes, planes * planes)?;
                let matrix = read_matrix(stream, ft, planes as usize, planes as usize)?;
                if code == tag::CAMERA_CALIBRATION_1 {
                    shared.camera_calibration_1 = matrix;
                } else {
                    shared.camera_calibration_2 = matrix;
                }
            }
            tag::CAMERA_CALIBRATION_SIGNATURE => {
                shared.camera_calibration_signature = read_text(stream, entry)?;
            }
            tag::ANALOG_BALANCE | tag::AS_SHOT_NEUTRAL => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, planes, planes)?;
                let vector = Vector::from_slice(&stream.tag_values_f64(ft, count)?);
                if code == tag::ANALOG_BALANCE {
                    shared.analog_balance = vector;
                } else {
                    shared.as_shot_neutral = vector;
                }
            }
            tag::AS_SHOT_WHITE_XY => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 2, 2)?;
                let x = stream.tag_value_f64(ft)?;
                let y = stream.tag_value_f64(ft)?;
                shared.as_shot_white_xy = Some((x, y));
            }
            tag::BASELINE_EXPOSURE => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                shared.baseline_exposure = stream.tag_value_srational(ft)?;
            }
            tag::BASELINE_NOISE
            | tag::BASELINE_SHARPNESS
            | tag::LINEAR_RESPONSE_LIMIT
            | tag::SHADOW_SCALE
            | tag::NOISE_REDUCTION_APPLIED => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                let value = stream.tag_value_urational(ft)?;
                match code {
                    tag::BASELINE_NOISE => shared.baseline_noise = value,
                    tag::BASELINE_SHARPNESS => shared.baseline_sharpness = value,
                    tag::LINEAR_RESPONSE_LIMIT => shared.linear_response_limit = value,
                    tag::SHADOW_SCALE => shared.shadow_scale = value,
                    _ => shared.noise_reduction_applied = value,
                }
            }
            tag::COLORIMETRIC_REFERENCE => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                shared.colorimetric_reference = stream.tag_value_u32(ft)?;
            }
            tag::AS_SHOT_PROFILE_NAME => {
                shared.as_shot_profile_name = read_text(stream, entry)?;
            }
            tag::CAMERA_SERIAL_NUMBER => {
                shared.camera_serial_number = read_text(stream, entry)?;
            }
            tag::LENS_INFO => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 4, 4)?;
                shared.lens_info = (0..4)
                    .map(|_| stream.tag_value_urational(ft))
                    .collect::<Result<_>>()?;
            }
            tag::DNG_PRIVATE_DATA => {
                check_tag_type(code, ft, &[FieldType::Byte, FieldType::Undefined])?;
                shared.dng_private_data = stream.get_bytes(count as usize)?.to_vec();
                match parse_maker_note(&shared.dng_private_data) {
                    Ok(note) => shared.maker_note = note,
                    Err(e) if e.is_recoverable() => {
                        warn!("Ignoring malformed maker note: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            tag::MAKER_NOTE_SAFETY => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                shared.maker_note_safety = stream.tag_value_u32(ft)?;
            }
            tag::RAW_DATA_UNIQUE_ID => {
                shared.raw_data_unique_id = read_fingerprint(stream, entry)?;
            }
            tag::ORIGINAL_RAW_FILE_NAME => {
                shared.original_raw_file_name = read_text(stream, entry)?;
            }
            tag::ORIGINAL_RAW_FILE_DIGEST => {
                shared.original_raw_file_digest = read_fingerprint(stream, entry)?;
            }
            tag::RAW_IMAGE_DIGEST => {
                shared.raw_image_digest = read_fingerprint(stream, entry)?;
            }
            tag::NEW_RAW_IMAGE_DIGEST => {
                shared.new_raw_image_digest = read_fingerprint(stream, entry)?;
            }
            tag::EXTRA_CAMERA_PROFILES => {
                check_tag_type_integer(code, ft)?;
                shared.extra_camera_profiles = stream.tag_values_u64(ft, count)?;
            }
            tag::XMP => {
                check_tag_type(code, ft, &[FieldType::Byte, FieldType::Undefined])?;
                shared.xmp = stream.get_bytes(count as usize)?.to_vec();
            }
            tag::IPTC => {
                check_tag_type(
                    code,
                    ft,
                    &[FieldType::Undefined, FieldType::Byte, FieldType::Long],
                )?;
                shared.iptc = stream.get_bytes(entry.byte_len() as usize)?.to_vec();
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl TagHandler for SharedHandler {
    fn name(&self) -> &'static str {
        "shared"
    }

    fn parse_tag(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool> {
        match context {
            TagContext::Ifd(0) => Self::parse_ifd0(stream, entry, &mut info.shared),
            TagContext::Exif if entry.code == tag::GPS_IFD => {
                Self::parse_ifd0(stream, entry, &mut info.shared)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maker_note_survives_private_data() {
        let note = MakerNote {
            data: vec![1, 2, 3, 4, 5],
            endian: Endian::Big,
            original_offset: 0x1234,
        };
        let bytes = build_private_data(&note);
        assert_eq!(parse_maker_note(&bytes).unwrap(), Some(note));
    }

    #[test]
    fn foreign_private_data_has_no_note() {
        assert_eq!(parse_maker_note(b"Nikon\0abc").unwrap(), None);
    }

    #[test]
    fn truncated_maker_note_is_recoverable() {
        let mut bytes = b"Adobe\0MakN".to_vec();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"MM");
        let err = parse_maker_note(&bytes).unwrap_err();
        assert!(err.is_recoverable());
    }
}
