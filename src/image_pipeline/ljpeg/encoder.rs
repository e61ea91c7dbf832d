use tracing::debug;

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::ljpeg::bit_io::BitWriter;
use crate::image_pipeline::ljpeg::huffman::{HuffmanEncoder, HuffmanTable, SYMBOL_COUNT};
use crate::image_pipeline::ljpeg::markers::{FrameComponent, FrameHeader, Marker, ScanHeader};
use crate::image_pipeline::ljpeg::predictor::{Predictor, ScanGeometry, predict};

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderOptions {
    pub predictor: Predictor,
    /// Rows per restart interval, 0 for none.
    pub restart_rows: u32,
}

/// Encodes `samples` (row-major, `components` interleaved) as one SOF3 stream.
pub fn encode(
    samples: &[u16],
    width: usize,
    height: usize,
    components: usize,
    precision: u8,
    options: &EncoderOptions,
) -> Result<Vec<u8>> {
    validate(samples, width, height, components, precision)?;

    let geometry = ScanGeometry {
        width,
        components,
        precision,
    };
    let restart_rows = options.restart_rows as usize;
    let restart_interval = restart_rows * width;
    if restart_interval > u16::MAX as usize {
        return Err(DngError::Encode(format!(
            "restart interval of {} rows x {} pixels does not fit DRI",
            restart_rows, width
        )));
    }

    // First pass: category histogram per component.
    let mut histograms = vec![[0u32; SYMBOL_COUNT]; components];
    for_each_difference(&geometry, height, restart_rows, options.predictor, samples, |k, diff| {
        histograms[k][category(diff) as usize] += 1;
    });

    let tables: Vec<HuffmanTable> = histograms
        .iter()
        .map(HuffmanTable::optimal_or_default)
        .collect();
    let encoders = tables
        .iter()
        .map(HuffmanTable::encoder)
        .collect::<Result<Vec<HuffmanEncoder>>>()?;

    let mut out = Vec::with_capacity(samples.len() * 2 + 256);
    out.extend_from_slice(&[0xFF, Marker::Soi.code()]);

    let indexed: Vec<(u8, &HuffmanTable)> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (i as u8, t))
        .collect();
    HuffmanTable::write_segment(&indexed, &mut out);

    FrameHeader {
        precision,
        height: height as u16,
        width: width as u16,
        components: (0..components)
            .map(|k| FrameComponent {
                id: k as u8,
                sampling: 0x11,
            })
            .collect(),
    }
    .write(&mut out);

    if restart_rows > 0 {
        out.extend_from_slice(&[0xFF, Marker::Dri.code(), 0x00, 0x04]);
        out.extend_from_slice(&(restart_interval as u16).to_be_bytes());
    }

    ScanHeader {
        components: (0..components).map(|k| (k as u8, k as u8)).collect(),
        predictor: options.predictor.selector(),
        point_transform: 0,
    }
    .write(&mut out);

    // Second pass: entropy-coded data.
    let mut writer = BitWriter::new(out);
    let mut next_restart = 0u8;
    let row_len = geometry.row_len();
    for row in 0..height {
        if row > 0 && restart_rows > 0 && row % restart_rows == 0 {
            writer.put_marker(Marker::Rst(next_restart).code());
            next_restart = (next_restart + 1) & 7;
        }
        let interval_start = row == 0 || (restart_rows > 0 && row % restart_rows == 0);
        for col in 0..width {
            for (k, encoder) in encoders.iter().enumerate() {
                let index = row * row_len + col * components + k;
                let prediction =
                    predict(options.predictor, &geometry, samples, index, col, interval_start);
                let diff = samples[index].wrapping_sub(prediction) as i16 as i32;
                emit_difference(&mut writer, encoder, diff)?;
            }
        }
    }

    let mut out = writer.into_inner();
    out.extend_from_slice(&[0xFF, Marker::Eoi.code()]);

    debug!(
        "Encoded {}x{}x{} lossless JPEG ({} -> {} bytes, predictor {})",
        width,
        height,
        components,
        samples.len() * 2,
        out.len(),
        options.predictor.selector()
    );
    Ok(out)
}

fn validate(
    samples: &[u16],
    width: usize,
    height: usize,
    components: usize,
    precision: u8,
) -> Result<()> {
    if width == 0 || height == 0 || width > u16::MAX as usize || height > u16::MAX as usize {
        return Err(DngError::InvalidDimensions(width, height));
    }
    if !(1..=4).contains(&components) {
        return Err(DngError::Encode(format!("{} components", components)));
    }
    if !(2..=16).contains(&precision) {
        return Err(DngError::Encode(format!("precision {}", precision)));
    }
    if samples.len() != width * height * components {
        return Err(DngError::Encode(format!(
            "expected {} samples, got {}",
            width * height * components,
            samples.len()
        )));
    }
    let limit = (1u32 << precision) - 1;
    if let Some(&bad) = samples.iter().find(|&&s| s as u32 > limit) {
        return Err(DngError::Encode(format!(
            "sample {} exceeds {}-bit precision",
            bad, precision
        )));
    }
    Ok(())
}

fn for_each_difference(
    geometry: &ScanGeometry,
    height: usize,
    restart_rows: usize,
    predictor: Predictor,
    samples: &[u16],
    mut visit: impl FnMut(usize, i32),
) {
    let row_len = geometry.row_len();
    for row in 0..height {
        let interval_start = row == 0 || (restart_rows > 0 && row % restart_rows == 0);
        for col in 0..geometry.width {
            for k in 0..geometry.components {
                let index = row * row_len + col * geometry.components + k;
                let prediction = predict(predictor, geometry, samples, index, col, interval_start);
                visit(k, samples[index].wrapping_sub(prediction) as i16 as i32);
            }
        }
    }
}

/// Difference category: bit length of `|diff|`, 16 for -32768.
#[inline]
fn category(diff: i32) -> u32 {
    if diff == -32768 {
        16
    } else {
        32 - diff.unsigned_abs().leading_zeros()
    }
}

#[inline]
fn emit_difference(writer: &mut BitWriter, encoder: &HuffmanEncoder, diff: i32) -> Result<()> {
    let s = category(diff);
    let (code, len) = encoder.code(s as usize);
    if len == 0 {
        return Err(DngError::Encode(format!("no Huffman code for category {}", s)));
    }
    writer.put_bits(code, len);
    if s > 0 && s < 16 {
        let bits = if diff < 0 { diff - 1 } else { diff };
        writer.put_bits(bits as u32 & ((1 << s) - 1), s);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(category(0), 0);
        assert_eq!(category(1), 1);
        assert_eq!(category(-1), 1);
        assert_eq!(category(255), 8);
        assert_eq!(category(-256), 9);
        assert_eq!(category(32767), 15);
        assert_eq!(category(-32768), 16);
    }

    #[test]
    fn rejects_samples_above_precision() {
        let samples = [0u16, 4096];
        let result = encode(&samples, 2, 1, 1, 12, &EncoderOptions::default());
        assert!(matches!(result, Err(DngError::Encode(_))));
    }

    #[test]
    fn restart_interval_must_fit_dri() {
        let samples = vec![0u16; 40_000 * 2];
        let options = EncoderOptions {
            restart_rows: 2,
            ..Default::default()
        };
        assert!(encode(&samples, 40_000, 2, 1, 8, &options).is_err());
    }
}
