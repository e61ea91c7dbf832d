use tracing::{debug, info, warn};

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::ljpeg;
use crate::image_pipeline::negative::model::{Negative, NegativeState};
use crate::image_pipeline::opcodes::OpcodeList;
use crate::image_pipeline::tags::image_dir::ImageDirectory;
use crate::image_pipeline::tags::parser::TiffInfo;
use crate::image_pipeline::tags::types::COMPRESSION_JPEG;

/// Placement of one strip or tile within the image.
#[derive(Debug, Clone, Copy)]
struct TileArea {
    top: usize,
    left: usize,
    /// Rows and columns coded in the tile, padding included.
    rows: usize,
    cols: usize,
}

impl Negative {
    /// Reads the main raw image of `data` into stage 1 and parses the
    /// three opcode lists.
    pub fn read_stage1(&mut self, data: &[u8], info: &TiffInfo, host: &Host) -> Result<()> {
        let _span = tracing::info_span!("read_stage1").entered();
        self.require_state(NegativeState::Parsed, "read_stage1")?;
        let ifd = info
            .main_ifd()
            .ok_or_else(|| DngError::bad_format("no raw image directory"))?;

        self.opcode_list_1 = OpcodeList::parse(1, &ifd.opcode_list_1)?;
        self.opcode_list_2 = OpcodeList::parse(2, &ifd.opcode_list_2)?;
        self.opcode_list_3 = OpcodeList::parse(3, &ifd.opcode_list_3)?;

        let image = read_raw_image(data, ifd, info.header.endian, host)?;
        info!(
            "Read stage 1: {}x{}x{} at {} bits",
            image.width,
            image.height,
            image.planes,
            ifd.bits()
        );
        self.stage1 = Some(image);
        self.state = NegativeState::Stage1Read;

        if !self.validate_raw_image_digest(host)? {
            warn!("Raw image digest does not match, negative is damaged");
        }
        Ok(())
    }
}

/// Decodes every strip or tile of `ifd` from `data`.
pub fn read_raw_image(
    data: &[u8],
    ifd: &ImageDirectory,
    endian: Endian,
    host: &Host,
) -> Result<StageImage> {
    ifd.validate_raw()?;
    let width = ifd.width as usize;
    let height = ifd.length as usize;
    let planes = ifd.samples_per_pixel as usize;
    let bits = ifd.bits();
    let pixel_type = if bits == 8 && ifd.compression != COMPRESSION_JPEG {
        PixelType::U8
    } else {
        PixelType::U16
    };

    let mut image = StageImage {
        width,
        height,
        planes,
        pixel_type,
        data: host.allocate(width * height * planes, "stage 1 image")?,
    };

    let (offsets, counts) = if ifd.uses_tiles() {
        (&ifd.tile_offsets, &ifd.tile_byte_counts)
    } else {
        (&ifd.strip_offsets, &ifd.strip_byte_counts)
    };
    let across = ifd.tiles_across() as usize;
    for (index, (&offset, &count)) in offsets.iter().zip(counts).enumerate() {
        host.sniff_for_abort()?;
        let area = tile_area(ifd, index, across);
        let start = offset as usize;
        let bytes = data
            .get(start..start.saturating_add(count as usize))
            .ok_or(DngError::EndOfFile(offset + count))?;
        let samples = if ifd.compression == COMPRESSION_JPEG {
            decode_jpeg_tile(bytes, &area, planes, bits)?
        } else {
            unpack_tile(bytes, &area, planes, bits, endian)?
        };
        place_tile(&mut image, &area, &samples);
    }
    debug!("Read {} raw tiles", offsets.len());
    Ok(image)
}

fn tile_area(ifd: &ImageDirectory, index: usize, across: usize) -> TileArea {
    if ifd.uses_tiles() {
        TileArea {
            top: (index / across) * ifd.tile_length as usize,
            left: (index % across) * ifd.tile_width as usize,
            rows: ifd.tile_length as usize,
            cols: ifd.tile_width as usize,
        }
    } else {
        let rows_per_strip = (ifd.rows_per_strip as usize).clamp(1, ifd.length as usize);
        let top = index * rows_per_strip;
        TileArea {
            top,
            left: 0,
            rows: rows_per_strip.min(ifd.length as usize - top),
            cols: ifd.width as usize,
        }
    }
}

fn unpack_tile(
    bytes: &[u8],
    area: &TileArea,
    planes: usize,
    bits: u32,
    endian: Endian,
) -> Result<Vec<u16>> {
    let row_samples = area.cols * planes;
    let total = row_samples * area.rows;
    let short = || DngError::bad_format(format!("raw tile holds {} bytes, too short", bytes.len()));

    match bits {
        8 => bytes
            .get(..total)
            .map(|b| b.iter().map(|&v| v as u16).collect())
            .ok_or_else(short),
        16 => {
            let raw = bytes.get(..total * 2).ok_or_else(short)?;
            Ok(raw
                .chunks_exact(2)
                .map(|b| match endian {
                    Endian::Little => u16::from_le_bytes([b[0], b[1]]),
                    Endian::Big => u16::from_be_bytes([b[0], b[1]]),
                })
                .collect())
        }
        _ => {
            // Packed MSB first, each row starting on a byte boundary.
            let row_bytes = (row_samples * bits as usize).div_ceil(8);
            if bytes.len() < row_bytes * area.rows {
                return Err(short());
            }
            let mut out = Vec::with_capacity(total);
            for row in bytes.chunks_exact(row_bytes).take(area.rows) {
                let mut acc = 0u32;
                let mut held = 0u32;
                let mut iter = row.iter();
                for _ in 0..row_samples {
                    while held < bits {
                        acc = (acc << 8) | *iter.next().ok_or_else(short)? as u32;
                        held += 8;
                    }
                    held -= bits;
                    out.push(((acc >> held) & ((1 << bits) - 1)) as u16);
                }
            }
            Ok(out)
        }
    }
}

fn decode_jpeg_tile(bytes: &[u8], area: &TileArea, planes: usize, bits: u32) -> Result<Vec<u16>> {
    let decoded = ljpeg::decode(bytes)?;
    let expected = area.rows * area.cols * planes;
    if decoded.samples.len() != expected {
        return Err(DngError::bad_format(format!(
            "lossless JPEG tile decodes to {} samples, {} expected",
            decoded.samples.len(),
            expected
        )));
    }
    if decoded.precision as u32 != bits {
        debug!(
            "Lossless JPEG precision {} differs from {} bits per sample",
            decoded.precision, bits
        );
    }
    Ok(decoded.samples)
}

/// Copies the in-bounds part of a tile into the image.
fn place_tile(image: &mut StageImage, area: &TileArea, samples: &[u16]) {
    let planes = image.planes;
    let rows = area.rows.min(image.height.saturating_sub(area.top));
    let cols = area.cols.min(image.width.saturating_sub(area.left));
    for r in 0..rows {
        let src = &samples[r * area.cols * planes..][..cols * planes];
        let dst_row = image.row_mut(area.top + r);
        dst_row[area.left * planes..(area.left + cols) * planes].copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(rows: usize, cols: usize) -> TileArea {
        TileArea {
            top: 0,
            left: 0,
            rows,
            cols,
        }
    }

    #[test]
    fn unpacks_12_bit_rows() {
        // 0xABC, 0x123 packed MSB first.
        let bytes = [0xAB, 0xC1, 0x23];
        let out = unpack_tile(&bytes, &area(1, 2), 1, 12, Endian::Little).unwrap();
        assert_eq!(out, vec![0xABC, 0x123]);
    }

    #[test]
    fn unpacks_16_bit_in_file_order() {
        let bytes = [0x01, 0x02];
        assert_eq!(
            unpack_tile(&bytes, &area(1, 1), 1, 16, Endian::Big).unwrap(),
            vec![0x0102]
        );
        assert_eq!(
            unpack_tile(&bytes, &area(1, 1), 1, 16, Endian::Little).unwrap(),
            vec![0x0201]
        );
    }

    #[test]
    fn short_tile_is_bad_format() {
        assert!(unpack_tile(&[1, 2, 3], &area(2, 2), 1, 8, Endian::Little).is_err());
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let mut image = StageImage::new(3, 3, 1, PixelType::U16);
        let tile = TileArea {
            top: 2,
            left: 2,
            rows: 2,
            cols: 2,
        };
        place_tile(&mut image, &tile, &[7, 8, 9, 10]);
        assert_eq!(image.get(2, 2, 0), 7);
        assert_eq!(image.data.iter().filter(|&&v| v != 0).count(), 1);
    }
}
