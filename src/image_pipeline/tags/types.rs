//! TIFF field types, tag codes and well-known tag values.

use crate::image_pipeline::common::error::{DngError, Result};

/// TIFF magic number.
pub const TIFF_MAGIC: u16 = 0x002A;
/// Magic of some camera raw files that are otherwise plain TIFF.
pub const RAW_MAGIC_OR: u16 = 0x4F52;
pub const RAW_MAGIC_SR: u16 = 0x5352;
/// Magic of a self-contained extra camera profile stream.
pub const PROFILE_MAGIC: u16 = 0x4352;

/// Size of TIFF header in bytes.
pub const TIFF_HEADER_LEN: usize = 8;
/// Size of one IFD entry in bytes.
pub const IFD_ENTRY_LEN: usize = 12;

/// TIFF field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
    Ifd,
    Long8,
}

impl FieldType {
    pub fn from_code(code: u16) -> Option<FieldType> {
        Some(match code {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            13 => FieldType::Ifd,
            16 => FieldType::Long8,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        match self {
            FieldType::Byte => 1,
            FieldType::Ascii => 2,
            FieldType::Short => 3,
            FieldType::Long => 4,
            FieldType::Rational => 5,
            FieldType::SByte => 6,
            FieldType::Undefined => 7,
            FieldType::SShort => 8,
            FieldType::SLong => 9,
            FieldType::SRational => 10,
            FieldType::Float => 11,
            FieldType::Double => 12,
            FieldType::Ifd => 13,
            FieldType::Long8 => 16,
        }
    }

    /// Return the size in bytes of one value.
    pub fn size(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double | FieldType::Long8 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Byte
                | FieldType::Short
                | FieldType::Long
                | FieldType::SByte
                | FieldType::SShort
                | FieldType::SLong
                | FieldType::Ifd
                | FieldType::Long8
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Ifd | FieldType::Long8
        )
    }

    pub fn is_real(self) -> bool {
        self.is_integer()
            || matches!(
                self,
                FieldType::Rational | FieldType::SRational | FieldType::Float | FieldType::Double
            )
    }
}

/// Where a tag was found; decides which handlers look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagContext {
    /// Image directory, by parse index (0 = IFD0).
    Ifd(usize),
    Exif,
    Gps,
    /// Extra camera profile stream.
    Profile,
}

impl TagContext {
    pub fn is_main_ifd(self) -> bool {
        self == TagContext::Ifd(0)
    }
}

/// Tag codes.
pub mod tag {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    pub const IMAGE_DESCRIPTION: u16 = 270;
    pub const MAKE: u16 = 271;
    pub const MODEL: u16 = 272;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const ORIENTATION: u16 = 274;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIGURATION: u16 = 284;
    pub const SOFTWARE: u16 = 305;
    pub const DATE_TIME: u16 = 306;
    pub const ARTIST: u16 = 315;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SUB_IFDS: u16 = 330;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const XMP: u16 = 700;
    pub const CFA_REPEAT_PATTERN_DIM: u16 = 33421;
    pub const CFA_PATTERN: u16 = 33422;
    pub const COPYRIGHT: u16 = 33432;
    pub const IPTC: u16 = 33723;
    pub const EXIF_IFD: u16 = 34665;
    pub const GPS_IFD: u16 = 34853;

    pub const EXPOSURE_TIME: u16 = 33434;
    pub const F_NUMBER: u16 = 33437;
    pub const EXPOSURE_PROGRAM: u16 = 34850;
    pub const ISO_SPEED_RATINGS: u16 = 34855;
    pub const EXIF_VERSION: u16 = 36864;
    pub const DATE_TIME_ORIGINAL: u16 = 36867;
    pub const DATE_TIME_DIGITIZED: u16 = 36868;
    pub const EXPOSURE_BIAS_VALUE: u16 = 37380;
    pub const MAX_APERTURE_VALUE: u16 = 37381;
    pub const METERING_MODE: u16 = 37383;
    pub const LIGHT_SOURCE: u16 = 37384;
    pub const FLASH: u16 = 37385;
    pub const FOCAL_LENGTH: u16 = 37386;
    pub const MAKER_NOTE: u16 = 37500;
    pub const USER_COMMENT: u16 = 37510;
    pub const WHITE_BALANCE: u16 = 41987;
    pub const FOCAL_LENGTH_IN_35MM_FILM: u16 = 41989;
    pub const CAMERA_OWNER_NAME: u16 = 42032;
    pub const BODY_SERIAL_NUMBER: u16 = 42033;
    pub const LENS_SPECIFICATION: u16 = 42034;
    pub const LENS_MAKE: u16 = 42035;
    pub const LENS_MODEL: u16 = 42036;

    pub const GPS_VERSION_ID: u16 = 0;
    pub const GPS_LATITUDE_REF: u16 = 1;
    pub const GPS_LATITUDE: u16 = 2;
    pub const GPS_LONGITUDE_REF: u16 = 3;
    pub const GPS_LONGITUDE: u16 = 4;
    pub const GPS_ALTITUDE_REF: u16 = 5;
    pub const GPS_ALTITUDE: u16 = 6;
    pub const GPS_TIME_STAMP: u16 = 7;
    pub const GPS_MAP_DATUM: u16 = 18;
    pub const GPS_DATE_STAMP: u16 = 29;

    pub const DNG_VERSION: u16 = 50706;
    pub const DNG_BACKWARD_VERSION: u16 = 50707;
    pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
    pub const LOCALIZED_CAMERA_MODEL: u16 = 50709;
    pub const CFA_PLANE_COLOR: u16 = 50710;
    pub const CFA_LAYOUT: u16 = 50711;
    pub const LINEARIZATION_TABLE: u16 = 50712;
    pub const BLACK_LEVEL_REPEAT_DIM: u16 = 50713;
    pub const BLACK_LEVEL: u16 = 50714;
    pub const BLACK_LEVEL_DELTA_H: u16 = 50715;
    pub const BLACK_LEVEL_DELTA_V: u16 = 50716;
    pub const WHITE_LEVEL: u16 = 50717;
    pub const DEFAULT_SCALE: u16 = 50718;
    pub const DEFAULT_CROP_ORIGIN: u16 = 50719;
    pub const DEFAULT_CROP_SIZE: u16 = 50720;
    pub const COLOR_MATRIX_1: u16 = 50721;
    pub const COLOR_MATRIX_2: u16 = 50722;
    pub const CAMERA_CALIBRATION_1: u16 = 50723;
    pub const CAMERA_CALIBRATION_2: u16 = 50724;
    pub const REDUCTION_MATRIX_1: u16 = 50725;
    pub const REDUCTION_MATRIX_2: u16 = 50726;
    pub const ANALOG_BALANCE: u16 = 50727;
    pub const AS_SHOT_NEUTRAL: u16 = 50728;
    pub const AS_SHOT_WHITE_XY: u16 = 50729;
    pub const BASELINE_EXPOSURE: u16 = 50730;
    pub const BASELINE_NOISE: u16 = 50731;
    pub const BASELINE_SHARPNESS: u16 = 50732;
    pub const BAYER_GREEN_SPLIT: u16 = 50733;
    pub const LINEAR_RESPONSE_LIMIT: u16 = 50734;
    pub const CAMERA_SERIAL_NUMBER: u16 = 50735;
    pub const LENS_INFO: u16 = 50736;
    pub const CHROMA_BLUR_RADIUS: u16 = 50737;
    pub const ANTI_ALIAS_STRENGTH: u16 = 50738;
    pub const SHADOW_SCALE: u16 = 50739;
    pub const DNG_PRIVATE_DATA: u16 = 50740;
    pub const MAKER_NOTE_SAFETY: u16 = 50741;
    pub const CALIBRATION_ILLUMINANT_1: u16 = 50778;
    pub const CALIBRATION_ILLUMINANT_2: u16 = 50779;
    pub const BEST_QUALITY_SCALE: u16 = 50780;
    pub const RAW_DATA_UNIQUE_ID: u16 = 50781;
    pub const ORIGINAL_RAW_FILE_NAME: u16 = 50827;
    pub const ACTIVE_AREA: u16 = 50829;
    pub const MASKED_AREAS: u16 = 50830;
    pub const COLORIMETRIC_REFERENCE: u16 = 50879;
    pub const CAMERA_CALIBRATION_SIGNATURE: u16 = 50931;
    pub const PROFILE_CALIBRATION_SIGNATURE: u16 = 50932;
    pub const EXTRA_CAMERA_PROFILES: u16 = 50933;
    pub const AS_SHOT_PROFILE_NAME: u16 = 50934;
    pub const NOISE_REDUCTION_APPLIED: u16 = 50935;
    pub const PROFILE_NAME: u16 = 50936;
    pub const PROFILE_HUE_SAT_MAP_DIMS: u16 = 50937;
    pub const PROFILE_HUE_SAT_MAP_DATA_1: u16 = 50938;
    pub const PROFILE_HUE_SAT_MAP_DATA_2: u16 = 50939;
    pub const PROFILE_TONE_CURVE: u16 = 50940;
    pub const PROFILE_EMBED_POLICY: u16 = 50941;
    pub const PROFILE_COPYRIGHT: u16 = 50942;
    pub const FORWARD_MATRIX_1: u16 = 50964;
    pub const FORWARD_MATRIX_2: u16 = 50965;
    pub const RAW_IMAGE_DIGEST: u16 = 50972;
    pub const ORIGINAL_RAW_FILE_DIGEST: u16 = 50973;
    pub const PROFILE_LOOK_TABLE_DIMS: u16 = 50981;
    pub const PROFILE_LOOK_TABLE_DATA: u16 = 50982;
    pub const OPCODE_LIST_1: u16 = 51008;
    pub const OPCODE_LIST_2: u16 = 51009;
    pub const OPCODE_LIST_3: u16 = 51022;
    pub const NOISE_PROFILE: u16 = 51041;
    pub const PROFILE_HUE_SAT_MAP_ENCODING: u16 = 51107;
    pub const PROFILE_LOOK_TABLE_ENCODING: u16 = 51108;
    pub const BASELINE_EXPOSURE_OFFSET: u16 = 51109;
    pub const DEFAULT_BLACK_RENDER: u16 = 51110;
    pub const NEW_RAW_IMAGE_DIGEST: u16 = 51111;
    pub const DEFAULT_USER_CROP: u16 = 51125;
}

/// Compression codes.
pub const COMPRESSION_NONE: u32 = 1;
pub const COMPRESSION_JPEG: u32 = 7;

/// PhotometricInterpretation codes.
pub const PHOTOMETRIC_BLACK_IS_ZERO: u32 = 1;
pub const PHOTOMETRIC_RGB: u32 = 2;
pub const PHOTOMETRIC_CFA: u32 = 32803;
pub const PHOTOMETRIC_LINEAR_RAW: u32 = 34892;

/// NewSubFileType value of the main (full-resolution) image.
pub const SUBFILE_MAIN_IMAGE: u32 = 0;
pub const SUBFILE_PREVIEW_IMAGE: u32 = 1;

/// Header in front of the maker note inside DNGPrivateData.
pub const MAKER_NOTE_SIGNATURE: &[u8] = b"Adobe\0MakN";

/// Largest entry count accepted in one directory.
pub const MAX_DIRECTORY_ENTRIES: usize = 4096;
/// Largest number of image directories followed in one file.
pub const MAX_IMAGE_DIRECTORIES: usize = 64;

/// Rejects a tag whose field type is not one of `allowed`.
pub fn check_tag_type(code: u16, field_type: FieldType, allowed: &[FieldType]) -> Result<()> {
    if allowed.contains(&field_type) {
        Ok(())
    } else {
        Err(DngError::bad_format(format!(
            "tag {} has unexpected type {:?}",
            code, field_type
        )))
    }
}

/// Rejects a tag whose count is outside `min..=max`.
pub fn check_tag_count(code: u16, count: u32, min: u32, max: u32) -> Result<()> {
    if count < min || count > max {
        Err(DngError::bad_format(format!(
            "tag {} has count {}, expected {}..={}",
            code, count, min, max
        )))
    } else {
        Ok(())
    }
}

pub fn check_tag_type_integer(code: u16, field_type: FieldType) -> Result<()> {
    if field_type.is_unsigned_integer() {
        Ok(())
    } else {
        Err(DngError::bad_format(format!(
            "tag {} expected an unsigned integer type, got {:?}",
            code, field_type
        )))
    }
}

pub fn check_tag_type_real(code: u16, field_type: FieldType) -> Result<()> {
    if field_type.is_real() {
        Ok(())
    } else {
        Err(DngError::bad_format(format!(
            "tag {} expected a numeric type, got {:?}",
            code, field_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_codes_round_trip() {
        for code in (1..=13).chain([16]) {
            let field_type = FieldType::from_code(code).unwrap();
            assert_eq!(field_type.code(), code);
        }
        assert!(FieldType::from_code(14).is_none());
        assert_eq!(FieldType::SRational.size(), 8);
    }

    #[test]
    fn schema_checks_are_recoverable() {
        let err = check_tag_type(tag::COLOR_MATRIX_1, FieldType::Ascii, &[FieldType::SRational])
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(check_tag_count(tag::AS_SHOT_WHITE_XY, 2, 2, 2).is_ok());
        assert!(check_tag_count(tag::AS_SHOT_WHITE_XY, 3, 2, 2).is_err());
    }
}
