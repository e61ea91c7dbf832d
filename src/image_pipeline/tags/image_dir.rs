//! Per-directory image structure tags (size, layout, CFA, black/white levels).

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::geometry::Rect;
use crate::image_pipeline::common::rational::URational;
use crate::image_pipeline::tags::directory::TagEntry;
use crate::image_pipeline::tags::parser::{TagHandler, TiffInfo};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    COMPRESSION_JPEG, COMPRESSION_NONE, FieldType, PHOTOMETRIC_CFA, PHOTOMETRIC_LINEAR_RAW,
    TagContext, check_tag_count, check_tag_type, check_tag_type_integer, check_tag_type_real, tag,
};

/// Largest black-level repeat pattern side.
pub const MAX_BLACK_PATTERN: u32 = 8;
/// Largest CFA repeat pattern side.
pub const MAX_CFA_PATTERN: u32 = 8;
/// Most masked-area rectangles kept.
pub const MAX_MASKED_AREAS: usize = 4;
/// Most samples per pixel in a raw directory.
pub const MAX_SAMPLES_PER_PIXEL: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDirectory {
    pub offset: u64,
    pub new_subfile_type: u32,
    pub width: u32,
    pub length: u32,
    pub bits_per_sample: Vec<u32>,
    pub compression: u32,
    pub predictor: u32,
    pub photometric: u32,
    pub orientation: u32,
    pub samples_per_pixel: u32,
    pub planar_configuration: u32,
    pub sample_format: u32,
    pub rows_per_strip: u32,
    pub strip_offsets: Vec<u64>,
    pub strip_byte_counts: Vec<u64>,
    pub tile_width: u32,
    pub tile_length: u32,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub sub_ifds: Vec<u64>,

    pub cfa_repeat_rows: u32,
    pub cfa_repeat_cols: u32,
    pub cfa_pattern: Vec<u8>,
    pub cfa_plane_color: Vec<u8>,
    pub cfa_layout: u32,
    pub bayer_green_split: u32,

    pub linearization_table: Vec<u16>,
    pub black_level_repeat_rows: u32,
    pub black_level_repeat_cols: u32,
    /// `rows * cols * samples_per_pixel` values, plane fastest.
    pub black_level: Vec<f64>,
    pub black_level_delta_h: Vec<f64>,
    pub black_level_delta_v: Vec<f64>,
    pub white_level: Vec<f64>,

    pub default_scale_h: URational,
    pub default_scale_v: URational,
    pub best_quality_scale: URational,
    pub default_crop_origin_h: URational,
    pub default_crop_origin_v: URational,
    pub default_crop_size_h: URational,
    pub default_crop_size_v: URational,
    pub default_user_crop: Option<[URational; 4]>,
    pub chroma_blur_radius: URational,
    pub anti_alias_strength: URational,

    /// Empty means the whole image.
    pub active_area: Rect,
    pub masked_areas: Vec<Rect>,

    pub opcode_list_1: Vec<u8>,
    pub opcode_list_2: Vec<u8>,
    pub opcode_list_3: Vec<u8>,
    pub noise_profile: Vec<f64>,
}

impl ImageDirectory {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            new_subfile_type: 0,
            width: 0,
            length: 0,
            bits_per_sample: vec![1],
            compression: COMPRESSION_NONE,
            predictor: 1,
            photometric: u32::MAX,
            orientation: 1,
            samples_per_pixel: 1,
            planar_configuration: 1,
            sample_format: 1,
            rows_per_strip: u32::MAX,
            strip_offsets: Vec::new(),
            strip_byte_counts: Vec::new(),
            tile_width: 0,
            tile_length: 0,
            tile_offsets: Vec::new(),
            tile_byte_counts: Vec::new(),
            sub_ifds: Vec::new(),
            cfa_repeat_rows: 0,
            cfa_repeat_cols: 0,
            cfa_pattern: Vec::new(),
            cfa_plane_color: vec![0, 1, 2],
            cfa_layout: 1,
            bayer_green_split: 0,
            linearization_table: Vec::new(),
            black_level_repeat_rows: 1,
            black_level_repeat_cols: 1,
            black_level: Vec::new(),
            black_level_delta_h: Vec::new(),
            black_level_delta_v: Vec::new(),
            white_level: Vec::new(),
            default_scale_h: URational::new(1, 1),
            default_scale_v: URational::new(1, 1),
            best_quality_scale: URational::new(1, 1),
            default_crop_origin_h: URational::new(0, 1),
            default_crop_origin_v: URational::new(0, 1),
            default_crop_size_h: URational::new(0, 0),
            default_crop_size_v: URational::new(0, 0),
            default_user_crop: None,
            chroma_blur_radius: URational::new(0, 0),
            anti_alias_strength: URational::new(1, 1),
            active_area: Rect::default(),
            masked_areas: Vec::new(),
            opcode_list_1: Vec::new(),
            opcode_list_2: Vec::new(),
            opcode_list_3: Vec::new(),
            noise_profile: Vec::new(),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits_per_sample.first().copied().unwrap_or(1)
    }

    pub fn is_raw(&self) -> bool {
        self.photometric == PHOTOMETRIC_CFA || self.photometric == PHOTOMETRIC_LINEAR_RAW
    }

    pub fn is_cfa(&self) -> bool {
        self.photometric == PHOTOMETRIC_CFA
    }

    pub fn uses_tiles(&self) -> bool {
        self.tile_width > 0 && self.tile_length > 0
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.length, self.width)
    }

    /// Active area, or the whole image if none was given.
    pub fn effective_active_area(&self) -> Rect {
        if self.active_area.is_empty() {
            self.bounds()
        } else {
            self.active_area
        }
    }

    pub fn tiles_across(&self) -> u32 {
        if self.uses_tiles() {
            self.width.div_ceil(self.tile_width)
        } else {
            1
        }
    }

    pub fn tiles_down(&self) -> u32 {
        if self.uses_tiles() {
            self.length.div_ceil(self.tile_length)
        } else {
            self.length.div_ceil(self.rows_per_strip.clamp(1, self.length.max(1)))
        }
    }

    /// Checks the structural tags of a raw image directory.
    pub fn validate_raw(&self) -> Result<()> {
        if self.width == 0 || self.length == 0 {
            return Err(DngError::InvalidDimensions(
                self.width as usize,
                self.length as usize,
            ));
        }
        if self.samples_per_pixel == 0 || self.samples_per_pixel > MAX_SAMPLES_PER_PIXEL {
            return Err(DngError::bad_format(format!(
                "{} samples per pixel",
                self.samples_per_pixel
            )));
        }
        if self.bits() < 8 || self.bits() > 16 {
            return Err(DngError::bad_format(format!(
                "{} bits per sample",
                self.bits()
            )));
        }
        if self.compression != COMPRESSION_NONE && self.compression != COMPRESSION_JPEG {
            return Err(DngError::bad_format(format!(
                "compression {} not supported for raw data",
                self.compression
            )));
        }
        if self.planar_configuration != 1 {
            return Err(DngError::bad_format("planar raw data not supported"));
        }

        let (offsets, counts) = if self.uses_tiles() {
            (&self.tile_offsets, &self.tile_byte_counts)
        } else {
            (&self.strip_offsets, &self.strip_byte_counts)
        };
        let expected = (self.tiles_across() * self.tiles_down()) as usize;
        if offsets.len() != expected || counts.len() != expected {
            return Err(DngError::bad_format(format!(
                "{} tiles expected, {} offsets and {} byte counts given",
                expected,
                offsets.len(),
                counts.len()
            )));
        }

        if self.is_cfa() {
            if self.samples_per_pixel != 1 {
                return Err(DngError::bad_format("CFA image with multiple samples"));
            }
            let cells = (self.cfa_repeat_rows * self.cfa_repeat_cols) as usize;
            if cells == 0 || self.cfa_pattern.len() != cells {
                return Err(DngError::bad_format("missing or inconsistent CFA pattern"));
            }
            let planes = self.cfa_plane_color.len() as u8;
            if self.cfa_pattern.iter().any(|&c| c >= planes) {
                return Err(DngError::bad_format(
                    "CFA pattern references a missing color plane",
                ));
            }
        }

        if !self.active_area.is_empty() && !self.bounds().contains(&self.active_area) {
            return Err(DngError::bad_format("active area outside image"));
        }
        Ok(())
    }
}

/// Tags describing the image stored in a directory.
pub struct ImageDirectoryHandler;

impl TagHandler for ImageDirectoryHandler {
    fn name(&self) -> &'static str {
        "image directory"
    }

    fn parse_tag(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool> {
        let TagContext::Ifd(index) = context else {
            return Ok(false);
        };
        let Some(ifd) = info.ifds.get_mut(index) else {
            return Ok(false);
        };
        let code = entry.code;
        let ft = entry.field_type;
        let count = entry.count;

        match code {
            tag::NEW_SUBFILE_TYPE => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.new_subfile_type = stream.tag_value_u32(ft)?;
            }
            tag::IMAGE_WIDTH => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.width = stream.tag_value_u32(ft)?;
            }
            tag::IMAGE_LENGTH => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.length = stream.tag_value_u32(ft)?;
            }
            tag::BITS_PER_SAMPLE => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 0x10000)?;
                ifd.bits_per_sample = stream.tag_values_u32(ft, count)?;
            }
            tag::COMPRESSION => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.compression = stream.tag_value_u32(ft)?;
            }
            tag::PREDICTOR => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.predictor = stream.tag_value_u32(ft)?;
            }
            tag::PHOTOMETRIC_INTERPRETATION => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.photometric = stream.tag_value_u32(ft)?;
            }
            tag::ORIENTATION => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.orientation = stream.tag_value_u32(ft)?;
            }
            tag::SAMPLES_PER_PIXEL => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.samples_per_pixel = stream.tag_value_u32(ft)?;
            }
            tag::PLANAR_CONFIGURATION => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.planar_configuration = stream.tag_value_u32(ft)?;
            }
            tag::SAMPLE_FORMAT => {
                check_tag_type_integer(code, ft)?;
                ifd.sample_format = stream.tag_value_u32(ft)?;
            }
            tag::ROWS_PER_STRIP => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.rows_per_strip = stream.tag_value_u32(ft)?;
            }
            tag::STRIP_OFFSETS => {
                check_tag_type_integer(code, ft)?;
                ifd.strip_offsets = stream.tag_values_u64(ft, count)?;
            }
            tag::STRIP_BYTE_COUNTS => {
                check_tag_type_integer(code, ft)?;
                ifd.strip_byte_counts = stream.tag_values_u64(ft, count)?;
            }
            tag::TILE_WIDTH => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.tile_width = stream.tag_value_u32(ft)?;
            }
            tag::TILE_LENGTH => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.tile_length = stream.tag_value_u32(ft)?;
            }
            tag::TILE_OFFSETS => {
                check_tag_type_integer(code, ft)?;
                ifd.tile_offsets = stream.tag_values_u64(ft, count)?;
            }
            tag::TILE_BYTE_COUNTS => {
                check_tag_type_integer(code, ft)?;
                ifd.tile_byte_counts = stream.tag_values_u64(ft, count)?;
            }
            tag::SUB_IFDS => {
                check_tag_type_integer(code, ft)?;
                ifd.sub_ifds = stream.tag_values_u64(ft, count)?;
            }
            tag::CFA_REPEAT_PATTERN_DIM => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 2, 2)?;
                let rows = stream.tag_value_u32(ft)?;
                let cols = stream.tag_value_u32(ft)?;
                if rows == 0 || cols == 0 || rows > MAX_CFA_PATTERN || cols > MAX_CFA_PATTERN {
                    return Err(DngError::bad_format(format!(
                        "CFA repeat pattern {}x{}",
                        rows, cols
                    )));
                }
                ifd.cfa_repeat_rows = rows;
                ifd.cfa_repeat_cols = cols;
            }
            tag::CFA_PATTERN => {
                check_tag_type(code, ft, &[FieldType::Byte, FieldType::Undefined])?;
                check_tag_count(code, count, 1, MAX_CFA_PATTERN * MAX_CFA_PATTERN)?;
                ifd.cfa_pattern = stream.get_bytes(count as usize)?.to_vec();
            }
            tag::CFA_PLANE_COLOR => {
                check_tag_type(code, ft, &[FieldType::Byte])?;
                check_tag_count(code, count, 3, 4)?;
                ifd.cfa_plane_color = stream.get_bytes(count as usize)?.to_vec();
            }
            tag::CFA_LAYOUT => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                let layout = stream.tag_value_u32(ft)?;
                if !(1..=9).contains(&layout) {
                    return Err(DngError::bad_format(format!("CFA layout {}", layout)));
                }
                ifd.cfa_layout = layout;
            }
            tag::BAYER_GREEN_SPLIT => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 1, 1)?;
                ifd.bayer_green_split = stream.tag_value_u32(ft)?;
            }
            tag::LINEARIZATION_TABLE => {
                check_tag_type(code, ft, &[FieldType::Short])?;
                check_tag_count(code, count, 1, 65536)?;
                ifd.linearization_table = stream
                    .tag_values_u32(ft, count)?
                    .into_iter()
                    .map(|v| v as u16)
                    .collect();
            }
            tag::BLACK_LEVEL_REPEAT_DIM => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 2, 2)?;
                let rows = stream.tag_value_u32(ft)?;
                let cols = stream.tag_value_u32(ft)?;
                if rows == 0 || cols == 0 || rows > MAX_BLACK_PATTERN || cols > MAX_BLACK_PATTERN
                {
                    return Err(DngError::bad_format(format!(
                        "black level repeat {}x{}",
                        rows, cols
                    )));
                }
                ifd.black_level_repeat_rows = rows;
                ifd.black_level_repeat_cols = cols;
            }
            tag::BLACK_LEVEL => {
                check_tag_type(
                    code,
                    ft,
                    &[FieldType::Short, FieldType::Long, FieldType::Rational],
                )?;
                let expected = ifd.black_level_repeat_rows
                    * ifd.black_level_repeat_cols
                    * ifd.samples_per_pixel;
                check_tag_count(code, count, expected, expected)?;
                ifd.black_level = stream.tag_values_f64(ft, count)?;
            }
            tag::BLACK_LEVEL_DELTA_H => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 1, ifd.width)?;
                ifd.black_level_delta_h = stream.tag_values_f64(ft, count)?;
            }
            tag::BLACK_LEVEL_DELTA_V => {
                check_tag_type_real(code, ft)?;
                check_tag_count(code, count, 1, ifd.length)?;
                ifd.black_level_delta_v = stream.tag_values_f64(ft, count)?;
            }
            tag::WHITE_LEVEL => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, ifd.samples_per_pixel, ifd.samples_per_pixel)?;
                ifd.white_level = stream.tag_values_f64(ft, count)?;
            }
            tag::DEFAULT_SCALE => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 2, 2)?;
                ifd.default_scale_h = stream.tag_value_urational(ft)?;
                ifd.default_scale_v = stream.tag_value_urational(ft)?;
            }
            tag::BEST_QUALITY_SCALE => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 1, 1)?;
                ifd.best_quality_scale = stream.tag_value_urational(ft)?;
            }
            tag::DEFAULT_CROP_ORIGIN => {
                check_tag_type(
                    code,
                    ft,
                    &[FieldType::Short, FieldType::Long, FieldType::Rational],
                )?;
                check_tag_count(code, count, 2, 2)?;
                ifd.default_crop_origin_h = stream.tag_value_urational(ft)?;
                ifd.default_crop_origin_v = stream.tag_value_urational(ft)?;
            }
            tag::DEFAULT_CROP_SIZE => {
                check_tag_type(
                    code,
                    ft,
                    &[FieldType::Short, FieldType::Long, FieldType::Rational],
                )?;
                check_tag_count(code, count, 2, 2)?;
                ifd.default_crop_size_h = stream.tag_value_urational(ft)?;
                ifd.default_crop_size_v = stream.tag_value_urational(ft)?;
            }
            tag::DEFAULT_USER_CROP => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 4, 4)?;
                ifd.default_user_crop = Some([
                    stream.tag_value_urational(ft)?,
                    stream.tag_value_urational(ft)?,
                    stream.tag_value_urational(ft)?,
                    stream.tag_value_urational(ft)?,
                ]);
            }
            tag::CHROMA_BLUR_RADIUS => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 1, 1)?;
                ifd.chroma_blur_radius = stream.tag_value_urational(ft)?;
            }
            tag::ANTI_ALIAS_STRENGTH => {
                check_tag_type(code, ft, &[FieldType::Rational])?;
                check_tag_count(code, count, 1, 1)?;
                ifd.anti_alias_strength = stream.tag_value_urational(ft)?;
            }
            tag::ACTIVE_AREA => {
                check_tag_type_integer(code, ft)?;
                check_tag_count(code, count, 4, 4)?;
                ifd.active_area = read_rect(stream, ft)?;
            }
            tag::MASKED_AREAS => {
                check_tag_type_integer(code, ft)?;
                if count % 4 != 0 {
                    return Err(DngError::bad_format(format!(
                        "masked areas count {} not a multiple of 4",
                        count
                    )));
                }
                let rects = (count / 4) as usize;
                ifd.masked_areas = (0..rects)
                    .map(|_| read_rect(stream, ft))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .take(MAX_MASKED_AREAS)
                    .collect();
            }
            tag::OPCODE_LIST_1 | tag::OPCODE_LIST_2 | tag::OPCODE_LIST_3 => {
                check_tag_type(code, ft, &[FieldType::Undefined])?;
                let bytes = stream.get_bytes(count as usize)?.to_vec();
                match code {
                    tag::OPCODE_LIST_1 => ifd.opcode_list_1 = bytes,
                    tag::OPCODE_LIST_2 => ifd.opcode_list_2 = bytes,
                    _ => ifd.opcode_list_3 = bytes,
                }
            }
            tag::NOISE_PROFILE => {
                check_tag_type(code, ft, &[FieldType::Double])?;
                if count < 2 || count % 2 != 0 {
                    return Err(DngError::bad_format(format!(
                        "noise profile count {}",
                        count
                    )));
                }
                ifd.noise_profile = stream.tag_values_f64(ft, count)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn read_rect(stream: &mut TiffStream<'_>, ft: FieldType) -> Result<Rect> {
    let top = stream.tag_value_u32(ft)? as i32;
    let left = stream.tag_value_u32(ft)? as i32;
    let bottom = stream.tag_value_u32(ft)? as i32;
    let right = stream.tag_value_u32(ft)? as i32;
    if bottom < top || right < left {
        return Err(DngError::bad_format(format!(
            "inverted rectangle {},{},{},{}",
            top, left, bottom, right
        )));
    }
    Ok(Rect::new(top, left, bottom, right))
}
