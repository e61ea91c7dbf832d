use tracing::{debug, trace};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::ljpeg::bit_io::BitReader;
use crate::image_pipeline::ljpeg::huffman::{HuffmanDecoder, HuffmanTable};
use crate::image_pipeline::ljpeg::markers::{FrameHeader, Marker, ScanHeader, SegmentReader};
use crate::image_pipeline::ljpeg::predictor::{Predictor, ScanGeometry, predict};

/// Samples decoded from one lossless JPEG stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub components: usize,
    pub precision: u8,
    /// Row-major, components interleaved.
    pub samples: Vec<u16>,
}

/// Decodes a complete SOI..EOI lossless JPEG stream.
pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    let mut reader = SegmentReader::new(data);
    if data.len() < 2 || data[0] != 0xFF || data[1] != Marker::Soi.code() {
        return Err(DngError::bad_format("lossless JPEG missing SOI"));
    }
    reader.skip_to(2);

    let mut tables: [Option<HuffmanTable>; 4] = Default::default();
    let mut restart_interval = 0usize;
    let mut frame: Option<FrameHeader> = None;
    let mut image: Option<DecodedImage> = None;

    loop {
        let marker = match reader.next_marker() {
            Ok(marker) => marker,
            Err(DngError::EndOfFile(_)) if image.is_some() => {
                debug!("Lossless JPEG stream ends without EOI");
                break;
            }
            Err(e) => return Err(e),
        };

        match marker {
            Marker::Eoi => break,
            Marker::Dht => {
                for (index, table) in HuffmanTable::parse_segment(reader.read_segment()?)? {
                    tables[index as usize] = Some(table);
                }
            }
            Marker::Dri => {
                let body = reader.read_segment()?;
                let mut segment = SegmentReader::new(body);
                restart_interval = segment.read_u16()? as usize;
            }
            Marker::Sof3 => {
                frame = Some(FrameHeader::parse(reader.read_segment()?)?);
            }
            Marker::OtherSof(code) => {
                return Err(DngError::bad_format(format!(
                    "unsupported JPEG frame type {:#04x}",
                    code
                )));
            }
            Marker::Sos => {
                let header = ScanHeader::parse(reader.read_segment()?)?;
                let frame = frame
                    .as_ref()
                    .ok_or_else(|| DngError::bad_format("SOS before SOF3"))?;
                if image.is_some() {
                    return Err(DngError::bad_format("multiple scans in lossless JPEG"));
                }
                let start = reader.position();
                let (decoded, consumed) =
                    decode_scan(&data[start..], frame, &header, &tables, restart_interval)?;
                reader.skip_to(start + consumed);
                image = Some(decoded);
            }
            Marker::App(_) | Marker::Com | Marker::Other(_) => {
                let body = reader.read_segment()?;
                trace!("Skipping JPEG segment {:?} ({} bytes)", marker, body.len());
            }
            Marker::Soi | Marker::Rst(_) => {
                return Err(DngError::bad_format(format!(
                    "unexpected {:?} marker in lossless JPEG",
                    marker
                )));
            }
        }
    }

    image.ok_or_else(|| DngError::bad_format("lossless JPEG without scan"))
}

fn decode_scan(
    data: &[u8],
    frame: &FrameHeader,
    header: &ScanHeader,
    tables: &[Option<HuffmanTable>; 4],
    restart_interval: usize,
) -> Result<(DecodedImage, usize)> {
    if header.point_transform != 0 {
        return Err(DngError::bad_format(format!(
            "point transform {} not supported",
            header.point_transform
        )));
    }
    if header.components.len() != frame.components.len() {
        return Err(DngError::bad_format(format!(
            "scan codes {} of {} components",
            header.components.len(),
            frame.components.len()
        )));
    }
    let predictor = Predictor::from_selector(header.predictor)?;

    // Decoders in frame component order.
    let mut decoders: Vec<HuffmanDecoder> = Vec::with_capacity(frame.components.len());
    for component in &frame.components {
        let table_index = header
            .components
            .iter()
            .find(|(id, _)| *id == component.id)
            .map(|&(_, table)| table)
            .ok_or_else(|| {
                DngError::bad_format(format!("component {} missing from scan", component.id))
            })?;
        let table = tables
            .get(table_index as usize)
            .and_then(|t| t.as_ref())
            .ok_or_else(|| {
                DngError::bad_format(format!("Huffman table {} not defined", table_index))
            })?;
        decoders.push(table.decoder()?);
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let geometry = ScanGeometry {
        width,
        components: frame.components.len(),
        precision: frame.precision,
    };
    let row_len = geometry.row_len();

    let restart_rows = if restart_interval > 0 {
        if restart_interval % width != 0 {
            return Err(DngError::bad_format(format!(
                "restart interval {} is not a whole number of {}-pixel rows",
                restart_interval, width
            )));
        }
        restart_interval / width
    } else {
        0
    };

    let mut samples = Vec::new();
    samples
        .try_reserve_exact(row_len * height)
        .map_err(|_| DngError::MemoryFull(format!("{}x{} lossless JPEG", width, height)))?;
    samples.resize(row_len * height, 0u16);

    let mut bits = BitReader::new(data);
    let mut next_restart = 0u8;

    for row in 0..height {
        let interval_start = row == 0 || (restart_rows > 0 && row % restart_rows == 0);
        if row > 0 && interval_start {
            bits.process_restart(next_restart)?;
            next_restart = (next_restart + 1) & 7;
        }

        let row_start = row * row_len;
        for col in 0..width {
            for (k, decoder) in decoders.iter().enumerate() {
                let index = row_start + col * geometry.components + k;
                let category = decoder.decode(&mut bits)?;
                let diff = receive_difference(&mut bits, category)?;
                let prediction = predict(predictor, &geometry, &samples, index, col, interval_start);
                samples[index] = (prediction as i32 + diff) as u16;
            }
        }

        if bits.is_overrun() {
            return Err(DngError::Decode(format!(
                "entropy-coded data ends before row {}",
                row
            )));
        }
    }

    let consumed = bits.finish();
    Ok((
        DecodedImage {
            width,
            height,
            components: geometry.components,
            precision: frame.precision,
            samples,
        },
        consumed,
    ))
}

/// Reads the extra bits of a difference in `category` and sign-extends them.
#[inline]
fn receive_difference(bits: &mut BitReader<'_>, category: u8) -> Result<i32> {
    match category {
        0 => Ok(0),
        16 => Ok(32768),
        1..=15 => {
            let s = category as u32;
            let value = bits.get_bits(s) as i32;
            if value < (1 << (s - 1)) {
                Ok(value - (1 << s) + 1)
            } else {
                Ok(value)
            }
        }
        _ => Err(DngError::Decode(format!("difference category {}", category))),
    }
}
