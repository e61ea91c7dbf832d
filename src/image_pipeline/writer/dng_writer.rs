//! DNG container writer.
//!
//! Layout: header, IFD0 at offset 8, the EXIF and GPS directories, extra
//! camera profile streams, then the image data. Every block starts on a
//! word boundary. Tile offsets and byte counts are patched into IFD0 once
//! the data has been spooled.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::{
    DNG_VERSION_1_1, DNG_VERSION_CURRENT, DNG_VERSION_NONE, DngVersion, Host, version_bytes,
};
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::linearization::{LINEAR_WHITE, LinearizationInfo};
use crate::image_pipeline::ljpeg::{self, EncoderOptions};
use crate::image_pipeline::mosaic::MosaicInfo;
use crate::image_pipeline::negative::{Negative, image_digest};
use crate::image_pipeline::opcodes::OpcodeList;
use crate::image_pipeline::profile::camera_profile::{
    EMBED_POLICY_ALLOW_COPYING, EMBED_POLICY_NO_RESTRICTIONS,
};
use crate::image_pipeline::profile::{add_profile_tags, write_profile_stream};
use crate::image_pipeline::tags::directory::{TagValue, TiffHeader};
use crate::image_pipeline::tags::types::{
    COMPRESSION_JPEG, COMPRESSION_NONE, PHOTOMETRIC_CFA, PHOTOMETRIC_LINEAR_RAW,
    SUBFILE_MAIN_IMAGE, TIFF_HEADER_LEN, TIFF_MAGIC, tag,
};
use crate::image_pipeline::writer::directory_builder::{DirectoryBlock, DirectoryBuilder};
use crate::image_pipeline::writer::image_writer::ImageWriter;
use crate::image_pipeline::writer::metadata_tags;
use crate::image_pipeline::writer::types::{DngCompression, WriterConfig};

const DELTA_DENOMINATOR: i32 = 10_000;

/// Writes a negative as a DNG file, either as raw mosaic data or, when the
/// host asks for it, as linear stage 3 data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DngWriter;

/// What the image data section holds.
struct ImageSource<'a> {
    image: &'a StageImage,
    linear: bool,
}

/// Tiling of the written image.
#[derive(Debug, Clone, Copy)]
struct TileLayout {
    tile_width: usize,
    tile_length: usize,
    across: usize,
    down: usize,
    tiled: bool,
}

impl TileLayout {
    fn new(image: &StageImage, tile_size: Option<(u32, u32)>) -> Result<Self> {
        match tile_size {
            Some((w, h)) => {
                if w == 0 || h == 0 {
                    return Err(DngError::program(format!("tile size {}x{}", w, h)));
                }
                let (w, h) = (w as usize, h as usize);
                Ok(Self {
                    tile_width: w,
                    tile_length: h,
                    across: image.width.div_ceil(w),
                    down: image.height.div_ceil(h),
                    tiled: true,
                })
            }
            None => Ok(Self {
                tile_width: image.width,
                tile_length: image.height,
                across: 1,
                down: 1,
                tiled: false,
            }),
        }
    }

    fn count(&self) -> usize {
        self.across * self.down
    }

    fn offsets_tag(&self) -> u16 {
        if self.tiled { tag::TILE_OFFSETS } else { tag::STRIP_OFFSETS }
    }

    fn byte_counts_tag(&self) -> u16 {
        if self.tiled { tag::TILE_BYTE_COUNTS } else { tag::STRIP_BYTE_COUNTS }
    }

    /// Samples of tile `index`, padded by replicating the last row and column.
    fn extract(&self, image: &StageImage, index: usize) -> Vec<u16> {
        let top = (index / self.across) * self.tile_length;
        let left = (index % self.across) * self.tile_width;
        let planes = image.planes;
        let mut samples = Vec::with_capacity(self.tile_width * self.tile_length * planes);
        for r in 0..self.tile_length {
            let row = image.row((top + r).min(image.height - 1));
            for c in 0..self.tile_width {
                let col = (left + c).min(image.width - 1);
                samples.extend_from_slice(&row[col * planes..(col + 1) * planes]);
            }
        }
        samples
    }
}

/// How each tile is encoded.
#[derive(Debug, Clone, Copy)]
enum TileEncoding {
    Uncompressed { bits: u32, endian: Endian },
    LosslessJpeg { precision: u8, options: EncoderOptions },
}

impl TileEncoding {
    fn choose(source: &ImageSource<'_>, raw_bits: u32, config: &WriterConfig, tile_width: usize) -> Self {
        let image = source.image;
        match config.compression {
            DngCompression::None => TileEncoding::Uncompressed {
                bits: if image.pixel_type == PixelType::U8 { 8 } else { 16 },
                endian: config.endian,
            },
            DngCompression::LosslessJpeg => {
                let precision = if source.linear {
                    16
                } else {
                    let max = image.data.iter().copied().max().unwrap_or(0) as u32;
                    let needed = 32 - max.leading_zeros();
                    needed.max(raw_bits.clamp(8, 16))
                };
                let row_limit = (u16::MAX as usize / tile_width.max(1)) as u32;
                TileEncoding::LosslessJpeg {
                    precision: precision as u8,
                    options: EncoderOptions {
                        predictor: config.predictor,
                        restart_rows: config.restart_rows.min(row_limit),
                    },
                }
            }
        }
    }

    fn bits(&self) -> u32 {
        match *self {
            TileEncoding::Uncompressed { bits, .. } => bits,
            TileEncoding::LosslessJpeg { precision, .. } => precision as u32,
        }
    }

    fn compression(&self) -> u32 {
        match self {
            TileEncoding::Uncompressed { .. } => COMPRESSION_NONE,
            TileEncoding::LosslessJpeg { .. } => COMPRESSION_JPEG,
        }
    }

    fn encode(&self, samples: &[u16], layout: &TileLayout, planes: usize) -> Result<Vec<u8>> {
        match *self {
            TileEncoding::Uncompressed { bits: 8, .. } => {
                Ok(samples.iter().map(|&v| v as u8).collect())
            }
            TileEncoding::Uncompressed { endian, .. } => {
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for &v in samples {
                    bytes.extend_from_slice(&endian.u16_bytes(v));
                }
                Ok(bytes)
            }
            TileEncoding::LosslessJpeg { precision, options } => ljpeg::encode(
                samples,
                layout.tile_width,
                layout.tile_length,
                planes,
                precision,
                &options,
            ),
        }
    }
}

/// Version to stamp on the file and the oldest reader version it needs.
fn versions(config: &WriterConfig, host: &Host, lists: &[&OpcodeList]) -> (DngVersion, DngVersion) {
    let requested = config.dng_version.unwrap_or_else(|| {
        match host.config().save_dng_version {
            DNG_VERSION_NONE => DNG_VERSION_CURRENT,
            v => v,
        }
    });
    let backward = lists
        .iter()
        .map(|list| list.min_version(false))
        .fold(DNG_VERSION_1_1, DngVersion::max);
    (requested.max(backward), backward)
}

fn add_cfa_tags(builder: &mut DirectoryBuilder, mosaic: &MosaicInfo) -> Result<()> {
    builder.add(
        tag::CFA_REPEAT_PATTERN_DIM,
        TagValue::Short(vec![mosaic.pattern_rows as u16, mosaic.pattern_cols as u16]),
    )?;
    builder.add(tag::CFA_PATTERN, TagValue::Byte(mosaic.pattern_colors()))?;
    builder.add(tag::CFA_PLANE_COLOR, TagValue::Byte(mosaic.plane_colors.clone()))?;
    builder.add(tag::CFA_LAYOUT, TagValue::Short(vec![mosaic.layout as u16]))?;
    if mosaic.green_split > 0 {
        builder.add(tag::BAYER_GREEN_SPLIT, TagValue::Long(vec![mosaic.green_split]))?;
    }
    Ok(())
}

fn add_linearization_tags(
    builder: &mut DirectoryBuilder,
    info: &LinearizationInfo,
    image: &StageImage,
) -> Result<()> {
    if !info.linearization_table.is_empty() {
        builder.add(
            tag::LINEARIZATION_TABLE,
            TagValue::Short(info.linearization_table.clone()),
        )?;
    }
    builder.add(
        tag::BLACK_LEVEL_REPEAT_DIM,
        TagValue::Short(vec![
            info.black_level_repeat_rows as u16,
            info.black_level_repeat_cols as u16,
        ]),
    )?;
    let integral = info.black_level.iter().all(|&b| b >= 0.0 && b.fract() == 0.0);
    let black = if integral {
        TagValue::Long(info.black_level.iter().map(|&b| b as u32).collect())
    } else {
        TagValue::Rational(
            info.black_level
                .iter()
                .map(|&b| URational::from_f64_auto(b.max(0.0)))
                .collect(),
        )
    };
    builder.add(tag::BLACK_LEVEL, black)?;

    let deltas = |values: &[f64]| {
        TagValue::SRational(
            values
                .iter()
                .map(|&d| SRational::from_f64(d, DELTA_DENOMINATOR))
                .collect(),
        )
    };
    if !info.black_delta_h.is_empty() {
        builder.add(tag::BLACK_LEVEL_DELTA_H, deltas(&info.black_delta_h))?;
    }
    if !info.black_delta_v.is_empty() {
        builder.add(tag::BLACK_LEVEL_DELTA_V, deltas(&info.black_delta_v))?;
    }
    builder.add(
        tag::WHITE_LEVEL,
        TagValue::Long(info.white_level.iter().map(|&w| w.round() as u32).collect()),
    )?;

    if info.active_area != image.bounds() {
        let a = info.active_area;
        builder.add(
            tag::ACTIVE_AREA,
            TagValue::Long(vec![a.top as u32, a.left as u32, a.bottom as u32, a.right as u32]),
        )?;
    }
    if !info.masked_areas.is_empty() {
        builder.add(
            tag::MASKED_AREAS,
            TagValue::Long(
                info.masked_areas
                    .iter()
                    .flat_map(|a| [a.top as u32, a.left as u32, a.bottom as u32, a.right as u32])
                    .collect(),
            ),
        )?;
    }
    Ok(())
}

/// Crop tags, in stage 3 pixels for linear saves.
fn add_crop_tags(builder: &mut DirectoryBuilder, negative: &Negative, source: &ImageSource<'_>) -> Result<()> {
    let scale = [negative.default_scale_h, negative.default_scale_v];
    if scale.iter().all(URational::is_valid) {
        builder.add(tag::DEFAULT_SCALE, TagValue::Rational(scale.to_vec()))?;
    }
    if negative.best_quality_scale.is_valid() {
        builder.add(
            tag::BEST_QUALITY_SCALE,
            TagValue::Rational(vec![negative.best_quality_scale]),
        )?;
    }

    let size_h = negative.default_crop_size_h;
    let size_v = negative.default_crop_size_v;
    if size_h.is_valid() && size_v.is_valid() && size_h.n > 0 && size_v.n > 0 {
        let mut origin = [negative.default_crop_origin_h, negative.default_crop_origin_v];
        let mut size = [size_h, size_v];
        if source.linear {
            let (scale_h, scale_v) = negative.raw_to_full_scale();
            let image = source.image;
            for (i, (scale, extent)) in [(scale_h, image.width), (scale_v, image.height)]
                .into_iter()
                .enumerate()
            {
                let s = scale.min(1.0);
                let o = (origin[i].as_f64() * s).clamp(0.0, extent as f64 - 1.0);
                let len = (size[i].as_f64() * s).clamp(1.0, extent as f64 - o);
                origin[i] = URational::from_f64_auto(o);
                size[i] = URational::from_f64_auto(len);
            }
        }
        builder.add(tag::DEFAULT_CROP_ORIGIN, TagValue::Rational(origin.to_vec()))?;
        builder.add(tag::DEFAULT_CROP_SIZE, TagValue::Rational(size.to_vec()))?;
    }
    if let Some(crop) = negative.default_user_crop {
        builder.add(tag::DEFAULT_USER_CROP, TagValue::Rational(crop.to_vec()))?;
    }
    Ok(())
}

fn add_opcode_tags(builder: &mut DirectoryBuilder, lists: [(u16, &OpcodeList); 3]) -> Result<()> {
    for (code, list) in lists {
        if !list.is_empty() {
            builder.add(code, TagValue::Undefined(list.serialize()))?;
        }
    }
    Ok(())
}

fn pad_to_even(out: &mut Vec<u8>) {
    if out.len() & 1 != 0 {
        out.push(0);
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| DngError::WriteFile(format!("{} beyond 4 GB", what)))
}

fn patch_longs(
    out: &mut [u8],
    block: &DirectoryBlock,
    code: u16,
    values: &[u32],
    endian: Endian,
) -> Result<()> {
    let start = *block
        .value_data
        .get(&code)
        .ok_or_else(|| DngError::program(format!("tag {} missing from IFD0", code)))?
        as usize;
    for (i, &v) in values.iter().enumerate() {
        let at = start + 4 * i;
        out.get_mut(at..at + 4)
            .ok_or_else(|| DngError::program(format!("tag {} patch out of range", code)))?
            .copy_from_slice(&endian.u32_bytes(v));
    }
    Ok(())
}

/// Extra profiles whose embed policy allows copying them into new files.
fn extra_profile_streams(negative: &Negative, endian: Endian) -> Result<Vec<Vec<u8>>> {
    let mut streams = Vec::new();
    for profile in negative.profiles().iter().skip(1) {
        if profile.embed_policy != EMBED_POLICY_ALLOW_COPYING
            && profile.embed_policy != EMBED_POLICY_NO_RESTRICTIONS
        {
            debug!("Not embedding profile \"{}\" (policy {})", profile.name, profile.embed_policy);
            continue;
        }
        match write_profile_stream(profile, endian) {
            Ok(mut stream) => {
                pad_to_even(&mut stream);
                streams.push(stream);
            }
            Err(e) if e.is_recoverable() => {
                warn!("Skipping extra profile \"{}\": {}", profile.name, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(streams)
}

impl DngWriter {
    /// Serializes `negative` into a complete DNG byte stream.
    pub fn encode(&self, negative: &mut Negative, host: &Host, config: &WriterConfig) -> Result<Vec<u8>> {
        let has_raw = negative.stage1_image().is_some() || negative.raw_image().is_some();
        let linear = if host.config().save_linear_dng {
            true
        } else if !has_raw {
            warn!("No raw data retained, saving linear DNG");
            true
        } else {
            false
        };
        if !linear && negative.mosaic.as_ref().is_some_and(MosaicInfo::is_four_color_bayer) {
            return Err(DngError::HostInsufficient(
                "four-colour negatives are saved as linear DNG".into(),
            ));
        }

        let unique_id = if negative.raw_data_unique_id().is_valid() || has_raw {
            Some(negative.find_raw_data_unique_id(host)?)
        } else {
            None
        };

        let negative = &*negative;
        let source = if linear {
            ImageSource {
                image: negative
                    .stage3_image()
                    .ok_or_else(|| DngError::program("linear DNG needs a stage 3 image"))?,
                linear: true,
            }
        } else {
            ImageSource {
                image: negative
                    .stage1_image()
                    .or(negative.raw_image())
                    .ok_or_else(|| DngError::program("raw DNG needs raw image data"))?,
                linear: false,
            }
        };
        let image = source.image;
        if image.width == 0 || image.height == 0 {
            return Err(DngError::InvalidDimensions(image.width, image.height));
        }

        let empty_list = OpcodeList::new(1);
        let list_1 = if linear {
            &empty_list
        } else if negative.stage1_image().is_some() {
            &negative.opcode_list_1
        } else {
            negative.raw_opcode_list_1()
        };
        let (list_2, list_3) = if linear {
            (&empty_list, &empty_list)
        } else {
            (&negative.opcode_list_2, &negative.opcode_list_3)
        };
        let (version, backward) = versions(config, host, &[list_1, list_2, list_3]);

        let layout = TileLayout::new(image, config.tile_size)?;
        let encoding = TileEncoding::choose(&source, negative.raw_bits, config, layout.tile_width);
        let endian = config.endian;
        let spp = image.planes;
        debug!(
            "Writing {} DNG {}x{}x{}, {} tiles of {}x{}, {} bits, compression {}",
            if linear { "linear" } else { "raw" },
            image.width,
            image.height,
            spp,
            layout.count(),
            layout.tile_width,
            layout.tile_length,
            encoding.bits(),
            encoding.compression()
        );

        let mut ifd0 = DirectoryBuilder::new();
        ifd0.add(tag::NEW_SUBFILE_TYPE, TagValue::Long(vec![SUBFILE_MAIN_IMAGE]))?;
        ifd0.add(tag::IMAGE_WIDTH, TagValue::Long(vec![image.width as u32]))?;
        ifd0.add(tag::IMAGE_LENGTH, TagValue::Long(vec![image.height as u32]))?;
        ifd0.add(tag::BITS_PER_SAMPLE, TagValue::Short(vec![encoding.bits() as u16; spp]))?;
        ifd0.add(tag::COMPRESSION, TagValue::Short(vec![encoding.compression() as u16]))?;
        let photometric = if !linear && negative.mosaic.is_some() {
            PHOTOMETRIC_CFA
        } else {
            PHOTOMETRIC_LINEAR_RAW
        };
        ifd0.add(tag::PHOTOMETRIC_INTERPRETATION, TagValue::Short(vec![photometric as u16]))?;
        ifd0.add(tag::ORIENTATION, TagValue::Short(vec![negative.orientation.max(1) as u16]))?;
        ifd0.add(tag::SAMPLES_PER_PIXEL, TagValue::Short(vec![spp as u16]))?;
        ifd0.add(tag::PLANAR_CONFIGURATION, TagValue::Short(vec![1]))?;
        if layout.tiled {
            ifd0.add(tag::TILE_WIDTH, TagValue::Long(vec![layout.tile_width as u32]))?;
            ifd0.add(tag::TILE_LENGTH, TagValue::Long(vec![layout.tile_length as u32]))?;
        } else {
            ifd0.add(tag::ROWS_PER_STRIP, TagValue::Long(vec![image.height as u32]))?;
        }
        ifd0.add(layout.offsets_tag(), TagValue::Long(vec![0; layout.count()]))?;
        ifd0.add(layout.byte_counts_tag(), TagValue::Long(vec![0; layout.count()]))?;

        metadata_tags::add_ifd0_strings(&mut ifd0, &negative.exif)?;

        if linear {
            ifd0.add(tag::WHITE_LEVEL, TagValue::Long(vec![LINEAR_WHITE as u32; spp]))?;
        } else {
            if let Some(mosaic) = &negative.mosaic {
                add_cfa_tags(&mut ifd0, mosaic)?;
            }
            if let Some(info) = &negative.linearization {
                add_linearization_tags(&mut ifd0, info, image)?;
            }
        }
        add_crop_tags(&mut ifd0, negative, &source)?;

        if let Some(profile) = negative.profiles().get(0) {
            add_profile_tags(&mut ifd0, profile, false)?;
        }
        ifd0.add(tag::DNG_VERSION, TagValue::Byte(version_bytes(version).to_vec()))?;
        ifd0.add(tag::DNG_BACKWARD_VERSION, TagValue::Byte(version_bytes(backward).to_vec()))?;

        let baseline_exposure = if linear && negative.stage3_gain() != 1.0 {
            SRational::from_f64(
                negative.baseline_exposure.as_f64() - negative.stage3_gain().log2(),
                100,
            )
        } else {
            negative.baseline_exposure
        };
        metadata_tags::add_shared_tags(&mut ifd0, negative, baseline_exposure, unique_id)?;
        let digest = image_digest(image, host)?;
        ifd0.add(tag::NEW_RAW_IMAGE_DIGEST, TagValue::Byte(digest.as_bytes().to_vec()))?;
        add_opcode_tags(
            &mut ifd0,
            [
                (tag::OPCODE_LIST_1, list_1),
                (tag::OPCODE_LIST_2, list_2),
                (tag::OPCODE_LIST_3, list_3),
            ],
        )?;

        let exif = metadata_tags::exif_directory(&negative.exif)?;
        let gps = metadata_tags::gps_directory(&negative.exif.gps)?;
        let profiles = extra_profile_streams(negative, endian)?;
        if exif.is_some() {
            ifd0.add(tag::EXIF_IFD, TagValue::Long(vec![0]))?;
        }
        if gps.is_some() {
            ifd0.add(tag::GPS_IFD, TagValue::Long(vec![0]))?;
        }
        if !profiles.is_empty() {
            ifd0.add(tag::EXTRA_CAMERA_PROFILES, TagValue::Long(vec![0; profiles.len()]))?;
        }

        // Placeholders are final size, so positions can be fixed now.
        let ifd0_pos = TIFF_HEADER_LEN as u64;
        let mut pos = ifd0_pos + ifd0.size();
        let exif_pos = pos;
        pos += exif.as_ref().map_or(0, DirectoryBuilder::size);
        let gps_pos = pos;
        pos += gps.as_ref().map_or(0, DirectoryBuilder::size);
        let mut profile_offsets = Vec::with_capacity(profiles.len());
        for stream in &profiles {
            profile_offsets.push(to_u32(pos, "camera profile")?);
            pos += stream.len() as u64;
        }
        let data_pos = pos;

        if exif.is_some() {
            ifd0.add(tag::EXIF_IFD, TagValue::Long(vec![to_u32(exif_pos, "EXIF directory")?]))?;
        }
        if gps.is_some() {
            ifd0.add(tag::GPS_IFD, TagValue::Long(vec![to_u32(gps_pos, "GPS directory")?]))?;
        }
        if !profiles.is_empty() {
            ifd0.add(tag::EXTRA_CAMERA_PROFILES, TagValue::Long(profile_offsets))?;
        }

        let ifd0_block = ifd0.build(endian, ifd0_pos)?;
        let mut out = Vec::with_capacity(data_pos as usize + image.data.len() * 2);
        TiffHeader {
            endian,
            magic: TIFF_MAGIC,
            first_ifd: ifd0_pos,
        }
        .write(&mut out);
        out.extend_from_slice(&ifd0_block.bytes);
        if let Some(exif) = &exif {
            out.extend_from_slice(&exif.build(endian, exif_pos)?.bytes);
        }
        if let Some(gps) = &gps {
            out.extend_from_slice(&gps.build(endian, gps_pos)?.bytes);
        }
        for stream in &profiles {
            out.extend_from_slice(stream);
        }
        if out.len() as u64 != data_pos {
            return Err(DngError::program(format!(
                "DNG header section is {} bytes, {} planned",
                out.len(),
                data_pos
            )));
        }

        let mut offsets = Vec::with_capacity(layout.count());
        let mut counts = Vec::with_capacity(layout.count());
        for index in 0..layout.count() {
            host.sniff_for_abort()?;
            let samples = layout.extract(image, index);
            let bytes = encoding.encode(&samples, &layout, spp)?;
            offsets.push(to_u32(out.len() as u64, "image data")?);
            counts.push(to_u32(bytes.len() as u64, "tile")?);
            out.extend_from_slice(&bytes);
            pad_to_even(&mut out);
        }
        to_u32(out.len() as u64, "DNG file")?;

        patch_longs(&mut out, &ifd0_block, layout.offsets_tag(), &offsets, endian)?;
        patch_longs(&mut out, &ifd0_block, layout.byte_counts_tag(), &counts, endian)?;
        Ok(out)
    }
}

impl ImageWriter for DngWriter {
    fn needs_stage3(&self, host: &Host) -> bool {
        host.config().save_linear_dng
    }

    /// Writes a raw DNG, or a linear DNG when the host asks for one or no
    /// raw image is left.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dng_negative::image_pipeline::{
    ///     AutoReader, DngWriter, Host, ImageWriter, RawImageReader, WriterConfig,
    /// };
    ///
    /// let host = Host::default();
    /// let bytes = std::fs::read("capture.dng").unwrap();
    /// let mut negative = AutoReader.read_negative(&bytes, &host).unwrap();
    /// let mut output = Vec::new();
    /// DngWriter
    ///     .write_negative(&mut negative, &host, &mut output, &WriterConfig::default())
    ///     .unwrap();
    /// ```
    fn write_negative(
        &self,
        negative: &mut Negative,
        host: &Host,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()> {
        let _span = tracing::info_span!("write_dng").entered();
        let bytes = self.encode(negative, host, config)?;
        output.write_all(&bytes)?;
        info!("Wrote DNG: {} bytes", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::geometry::Rect;
    use crate::image_pipeline::common::host::{DNG_VERSION_1_4, HostConfig};
    use crate::image_pipeline::common::matrix::{Matrix, Vector};
    use crate::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
    use crate::image_pipeline::profile::CameraProfile;
    use crate::image_pipeline::profile::camera_profile::EMBED_POLICY_EMBED_NEVER;
    use crate::image_pipeline::profile::illuminant::D65;
    use crate::image_pipeline::tags::parser::parse_tiff;
    use crate::image_pipeline::tags::shared::MakerNote;

    const WIDTH: usize = 20;
    const HEIGHT: usize = 12;

    fn rgb_profile(name: &str) -> CameraProfile {
        let mut profile = CameraProfile::default();
        profile.name = name.to_string();
        profile.calibration_illuminant_1 = D65;
        profile.color_matrix_1 = Matrix::identity(3);
        profile
    }

    fn mosaic_image() -> StageImage {
        let mut image = StageImage::new(WIDTH, HEIGHT, 1, PixelType::U16);
        for (i, v) in image.data.iter_mut().enumerate() {
            *v = (256 + (i * 37) % 3800) as u16;
        }
        image
    }

    fn bayer_negative(host: &Host) -> Negative {
        let mut negative = Negative::new();
        negative.model_name = "Synthetic Bayer".to_string();
        negative.mosaic = Some(
            MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap(),
        );
        let mut linearization =
            LinearizationInfo::uniform(Rect::from_size(HEIGHT as u32, WIDTH as u32), 1, 128.0, 4095.0);
        linearization.black_delta_v = vec![0.5; HEIGHT];
        negative.linearization = Some(linearization);
        negative.raw_bits = 12;
        negative.default_crop_size_h = URational::new(WIDTH as u32, 1);
        negative.default_crop_size_v = URational::new(HEIGHT as u32, 1);
        negative.set_color_channels(3);
        negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.75]);
        negative.exif.make = "Synthetic".to_string();
        negative.exif.exposure_time = URational::new(1, 125);
        negative.exif.iso_speed = vec![200];
        negative.add_profile(rgb_profile("Embedded"));
        negative.finish_parse(host).unwrap();
        negative.set_stage1(mosaic_image()).unwrap();
        negative
    }

    fn read_back(bytes: &[u8], host: &Host) -> Negative {
        let info = parse_tiff(bytes, host).unwrap();
        let mut negative = Negative::parse(&info, host).unwrap();
        negative.read_stage1(bytes, &info, host).unwrap();
        negative
    }

    #[test]
    fn raw_mosaic_round_trips() {
        let host = Host::default();
        for endian in [Endian::Little, Endian::Big] {
            for compression in [DngCompression::None, DngCompression::LosslessJpeg] {
                for tile_size in [Some((16, 16)), None] {
                    let config = WriterConfig::builder()
                        .endian(endian)
                        .compression(compression)
                        .tile_size(tile_size)
                        .build();
                    let mut negative = bayer_negative(&host);
                    let bytes = DngWriter.encode(&mut negative, &host, &config).unwrap();

                    let back = read_back(&bytes, &host);
                    assert_eq!(back.stage1_image().unwrap().data, mosaic_image().data);
                    assert!(!back.is_damaged());
                    assert_eq!(back.model_name, "Synthetic Bayer");
                    assert_eq!(back.exif.iso_speed, vec![200]);
                    assert_eq!(back.raw_data_unique_id(), negative.raw_data_unique_id());
                    let info = back.linearization.as_ref().unwrap();
                    assert_eq!(info.white_level, vec![4095.0]);
                    assert_eq!(info.black_delta_v.len(), HEIGHT);
                    assert!(back.mosaic.as_ref().unwrap().is_bayer());
                }
            }
        }
    }

    #[test]
    fn restart_intervals_survive_round_trip() {
        let host = Host::default();
        let config = WriterConfig::builder().restart_rows(3).tile_size(None).build();
        let mut negative = bayer_negative(&host);
        let bytes = DngWriter.encode(&mut negative, &host, &config).unwrap();
        assert_eq!(read_back(&bytes, &host).stage1_image().unwrap().data, mosaic_image().data);
    }

    #[test]
    fn version_follows_host_and_opcodes() {
        let host = Host::new(HostConfig::builder().save_dng_version(DNG_VERSION_1_4).build());
        let mut negative = bayer_negative(&host);
        let bytes = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();
        let info = parse_tiff(&bytes, &host).unwrap();
        assert_eq!(info.shared.dng_version, DNG_VERSION_1_4);
        assert_eq!(info.shared.dng_backward_version, DNG_VERSION_1_1);
    }

    #[test]
    fn linear_save_writes_stage3() {
        let host = Host::new(
            HostConfig::builder()
                .save_dng_version(DNG_VERSION_1_4)
                .save_linear_dng(true)
                .build(),
        );
        let mut negative = bayer_negative(&host);
        negative.build_stage2(&host).unwrap();
        negative.build_stage3(&host).unwrap();
        let expected = negative.stage3_image().unwrap().data.clone();
        assert!(DngWriter.needs_stage3(&host));

        let bytes = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();
        let back = read_back(&bytes, &host);
        assert!(back.mosaic.is_none());
        assert_eq!(back.color_channels(), 3);
        assert_eq!(back.stage1_image().unwrap().data, expected);
        assert_eq!(back.raw_data_unique_id(), negative.raw_data_unique_id());
        assert!(!back.is_damaged());
    }

    #[test]
    fn four_color_raw_save_is_refused() {
        let host = Host::default();
        let mut negative = bayer_negative(&host);
        negative.set_four_color_bayer().unwrap();
        let err = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap_err();
        assert!(matches!(err, DngError::HostInsufficient(_)));
    }

    #[test]
    fn maker_note_is_kept_only_when_safe() {
        let host = Host::default();
        for safe in [true, false] {
            let mut negative = bayer_negative(&host);
            negative.maker_note = Some(MakerNote {
                data: vec![1, 2, 3, 4, 5, 6],
                endian: Endian::Big,
                original_offset: 4096,
            });
            negative.maker_note_safe = safe;
            let bytes = DngWriter
                .encode(&mut negative, &host, &WriterConfig::default())
                .unwrap();
            let back = read_back(&bytes, &host);
            match back.maker_note {
                Some(note) => {
                    assert!(safe);
                    assert_eq!(note.data, vec![1, 2, 3, 4, 5, 6]);
                    assert_eq!(note.original_offset, 4096);
                }
                None => assert!(!safe),
            }
        }
    }

    #[test]
    fn extra_profiles_honour_embed_policy() {
        let host = Host::default();
        let mut negative = bayer_negative(&host);
        let mut portrait = rgb_profile("Portrait");
        portrait.color_matrix_1 = Matrix::from_rows(&[
            &[0.9, 0.05, 0.05],
            &[0.0, 1.0, 0.0],
            &[0.05, 0.05, 0.9],
        ]);
        negative.add_profile(portrait);
        let mut private = rgb_profile("Private");
        private.color_matrix_1 = Matrix::from_rows(&[
            &[1.1, 0.0, -0.1],
            &[0.0, 1.0, 0.0],
            &[-0.1, 0.0, 1.1],
        ]);
        private.embed_policy = EMBED_POLICY_EMBED_NEVER;
        negative.add_profile(private);

        let bytes = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();
        let back = read_back(&bytes, &host);
        let names: Vec<&str> = back.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Embedded", "Portrait"]);
    }

    #[test]
    fn gps_position_round_trips() {
        let host = Host::default();
        let mut negative = bayer_negative(&host);
        negative.exif.gps.set_position(45.5, -73.25, Some(120.0));
        let bytes = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();
        let back = read_back(&bytes, &host);
        let latitude = back.exif.gps.latitude_degrees().unwrap();
        let longitude = back.exif.gps.longitude_degrees().unwrap();
        assert!((latitude - 45.5).abs() < 1e-4);
        assert!((longitude + 73.25).abs() < 1e-4);
    }

    #[test]
    fn tiles_start_on_word_boundaries() {
        let host = Host::default();
        let config = WriterConfig::builder().tile_size(Some((16, 16))).build();
        let mut negative = bayer_negative(&host);
        let bytes = DngWriter.encode(&mut negative, &host, &config).unwrap();
        let info = parse_tiff(&bytes, &host).unwrap();
        let ifd = info.main_ifd().unwrap();
        assert_eq!(ifd.tile_offsets.len(), 2);
        assert!(ifd.tile_offsets.iter().all(|&o| o % 2 == 0));
        let end = ifd.tile_offsets[1] + ifd.tile_byte_counts[1];
        assert!(end <= bytes.len() as u64);
    }
}
