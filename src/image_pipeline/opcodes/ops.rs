//! Parameter parsing and pixel application for each supported opcode.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::geometry::Rect;
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::StageImage;

pub const WARP_RECTILINEAR: u32 = 1;
pub const WARP_FISHEYE: u32 = 2;
pub const FIX_VIGNETTE_RADIAL: u32 = 3;
pub const FIX_BAD_PIXELS_CONSTANT: u32 = 4;
pub const FIX_BAD_PIXELS_LIST: u32 = 5;
pub const TRIM_BOUNDS: u32 = 6;
pub const MAP_TABLE: u32 = 7;
pub const MAP_POLYNOMIAL: u32 = 8;
pub const GAIN_MAP: u32 = 9;
pub const DELTA_PER_ROW: u32 = 10;
pub const DELTA_PER_COLUMN: u32 = 11;
pub const SCALE_PER_ROW: u32 = 12;
pub const SCALE_PER_COLUMN: u32 = 13;

/// Largest polynomial degree `MapPolynomial` accepts.
pub const MAX_POLYNOMIAL_DEGREE: usize = 8;

/// Big-endian cursor over opcode parameters.
pub(crate) struct ParamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| DngError::bad_format("opcode parameters too short"))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take::<4>()?))
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take::<2>()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take::<4>()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take::<8>()?))
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| DngError::bad_format("opcode parameters too short"))?;
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Reads a count and checks that `count * item_size` bytes follow.
    fn count(&mut self, item_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        if count.saturating_mul(item_size) > self.remaining() {
            return Err(DngError::bad_format(format!(
                "opcode declares {} entries, only {} bytes left",
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }
}

/// Region, plane range and sampling pitch an opcode touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeArea {
    pub area: Rect,
    pub plane: u32,
    pub planes: u32,
    pub row_pitch: u32,
    pub col_pitch: u32,
}

impl OpcodeArea {
    pub(crate) fn parse(reader: &mut ParamReader<'_>) -> Result<Self> {
        let top = reader.u32()? as i32;
        let left = reader.u32()? as i32;
        let bottom = reader.u32()? as i32;
        let right = reader.u32()? as i32;
        let spec = Self {
            area: Rect::new(top, left, bottom, right),
            plane: reader.u32()?,
            planes: reader.u32()?,
            row_pitch: reader.u32()?,
            col_pitch: reader.u32()?,
        };
        if spec.planes == 0 || spec.row_pitch == 0 || spec.col_pitch == 0 || bottom < top || right < left
        {
            return Err(DngError::bad_format(format!("bad opcode area {:?}", spec)));
        }
        Ok(spec)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        for v in [
            self.area.top as u32,
            self.area.left as u32,
            self.area.bottom as u32,
            self.area.right as u32,
            self.plane,
            self.planes,
            self.row_pitch,
            self.col_pitch,
        ] {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    /// Rows sampled by the pitch, within the area.
    pub fn row_count(&self) -> usize {
        self.area.height().div_ceil(self.row_pitch) as usize
    }

    pub fn col_count(&self) -> usize {
        self.area.width().div_ceil(self.col_pitch) as usize
    }

    /// Calls `f(row_index, col_index, sample)` for every sample in range.
    fn for_each(
        &self,
        image: &mut StageImage,
        host: &Host,
        mut f: impl FnMut(usize, usize, u16) -> u16,
    ) -> Result<()> {
        let clipped = self.area.intersect(&image.bounds());
        if clipped.is_empty() {
            return Ok(());
        }
        let first_plane = self.plane as usize;
        let last_plane = (first_plane + self.planes as usize).min(image.planes);

        let mut row = self.area.top;
        let mut row_index = 0;
        while row < self.area.bottom {
            if row >= clipped.top && row < clipped.bottom {
                host.sniff_for_abort()?;
                let mut col = self.area.left;
                let mut col_index = 0;
                while col < self.area.right {
                    if col >= clipped.left && col < clipped.right {
                        for plane in first_plane..last_plane {
                            let (r, c) = (row as usize, col as usize);
                            let value = image.get(r, c, plane);
                            image.set(r, c, plane, f(row_index, col_index, value));
                        }
                    }
                    col += self.col_pitch as i32;
                    col_index += 1;
                }
            }
            row += self.row_pitch as i32;
            row_index += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
}

/// Decoded parameters of a supported opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum OpcodeKind {
    FixBadPixelsConstant { constant: u32, bayer_phase: u32 },
    TrimBounds { bounds: Rect },
    MapTable { area: OpcodeArea, table: Vec<u16> },
    MapPolynomial { area: OpcodeArea, coefficients: Vec<f64> },
    DeltaPerRow { area: OpcodeArea, deltas: Vec<f32> },
    DeltaPerColumn { area: OpcodeArea, deltas: Vec<f32> },
    ScalePerRow { area: OpcodeArea, scales: Vec<f32> },
    ScalePerColumn { area: OpcodeArea, scales: Vec<f32> },
    /// Kept verbatim; can only be skipped.
    Unsupported,
}

impl OpcodeKind {
    pub fn parse(id: u32, params: &[u8]) -> Result<OpcodeKind> {
        let mut reader = ParamReader::new(params);
        let kind = match id {
            FIX_BAD_PIXELS_CONSTANT => OpcodeKind::FixBadPixelsConstant {
                constant: reader.u32()?,
                bayer_phase: reader.u32()? & 3,
            },
            TRIM_BOUNDS => {
                let top = reader.u32()? as i32;
                let left = reader.u32()? as i32;
                let bottom = reader.u32()? as i32;
                let right = reader.u32()? as i32;
                let bounds = Rect::new(top, left, bottom, right);
                if bounds.is_empty() {
                    return Err(DngError::bad_format("empty TrimBounds rectangle"));
                }
                OpcodeKind::TrimBounds { bounds }
            }
            MAP_TABLE => {
                let area = OpcodeArea::parse(&mut reader)?;
                let count = reader.count(2)?;
                if count == 0 || count > 65536 {
                    return Err(DngError::bad_format(format!("MapTable with {} entries", count)));
                }
                let table = (0..count).map(|_| reader.u16()).collect::<Result<_>>()?;
                OpcodeKind::MapTable { area, table }
            }
            MAP_POLYNOMIAL => {
                let area = OpcodeArea::parse(&mut reader)?;
                let degree = reader.u32()? as usize;
                if degree > MAX_POLYNOMIAL_DEGREE {
                    return Err(DngError::bad_format(format!("polynomial degree {}", degree)));
                }
                let coefficients = (0..=degree).map(|_| reader.f64()).collect::<Result<_>>()?;
                OpcodeKind::MapPolynomial { area, coefficients }
            }
            DELTA_PER_ROW | DELTA_PER_COLUMN | SCALE_PER_ROW | SCALE_PER_COLUMN => {
                let area = OpcodeArea::parse(&mut reader)?;
                let count = reader.count(4)?;
                let expected = if matches!(id, DELTA_PER_ROW | SCALE_PER_ROW) {
                    area.row_count()
                } else {
                    area.col_count()
                };
                if count != expected {
                    return Err(DngError::bad_format(format!(
                        "opcode {} has {} entries for {} lines",
                        id, count, expected
                    )));
                }
                let values: Vec<f32> = (0..count).map(|_| reader.f32()).collect::<Result<_>>()?;
                match id {
                    DELTA_PER_ROW => OpcodeKind::DeltaPerRow { area, deltas: values },
                    DELTA_PER_COLUMN => OpcodeKind::DeltaPerColumn { area, deltas: values },
                    SCALE_PER_ROW => OpcodeKind::ScalePerRow { area, scales: values },
                    _ => OpcodeKind::ScalePerColumn { area, scales: values },
                }
            }
            _ => return Ok(OpcodeKind::Unsupported),
        };
        if reader.remaining() != 0 {
            return Err(DngError::bad_format(format!(
                "opcode {} has {} trailing parameter bytes",
                id,
                reader.remaining()
            )));
        }
        Ok(kind)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, OpcodeKind::Unsupported)
    }

    /// Serialized parameters; `None` for unsupported opcodes.
    pub fn params(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            OpcodeKind::FixBadPixelsConstant {
                constant,
                bayer_phase,
            } => {
                out.extend_from_slice(&constant.to_be_bytes());
                out.extend_from_slice(&bayer_phase.to_be_bytes());
            }
            OpcodeKind::TrimBounds { bounds } => {
                for v in [bounds.top, bounds.left, bounds.bottom, bounds.right] {
                    out.extend_from_slice(&(v as u32).to_be_bytes());
                }
            }
            OpcodeKind::MapTable { area, table } => {
                area.write(&mut out);
                out.extend_from_slice(&(table.len() as u32).to_be_bytes());
                for v in table {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            OpcodeKind::MapPolynomial { area, coefficients } => {
                area.write(&mut out);
                out.extend_from_slice(&((coefficients.len() - 1) as u32).to_be_bytes());
                for c in coefficients {
                    out.extend_from_slice(&c.to_be_bytes());
                }
            }
            OpcodeKind::DeltaPerRow { area, deltas: values }
            | OpcodeKind::DeltaPerColumn { area, deltas: values }
            | OpcodeKind::ScalePerRow { area, scales: values }
            | OpcodeKind::ScalePerColumn { area, scales: values } => {
                area.write(&mut out);
                out.extend_from_slice(&(values.len() as u32).to_be_bytes());
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            OpcodeKind::Unsupported => return None,
        }
        Some(out)
    }

    pub fn apply(&self, image: &mut StageImage, host: &Host) -> Result<()> {
        let max = image.pixel_type.max_value() as f64;
        let clamp = move |v: f64| v.round().clamp(0.0, max) as u16;

        match self {
            OpcodeKind::FixBadPixelsConstant {
                constant,
                bayer_phase,
            } => fix_bad_pixels_constant(image, *constant, *bayer_phase, host),
            OpcodeKind::TrimBounds { bounds } => {
                if !image.bounds().contains(bounds) {
                    return Err(DngError::bad_format(format!(
                        "TrimBounds {:?} outside {}x{} image",
                        bounds, image.width, image.height
                    )));
                }
                *image = image.crop(bounds)?;
                Ok(())
            }
            OpcodeKind::MapTable { area, table } => {
                let last = table.len() - 1;
                area.for_each(image, host, |_, _, v| table[(v as usize).min(last)])
            }
            OpcodeKind::MapPolynomial { area, coefficients } => {
                area.for_each(image, host, |_, _, v| {
                    let x = v as f64 / max;
                    let y = coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c);
                    clamp(y * max)
                })
            }
            OpcodeKind::DeltaPerRow { area, deltas } => {
                apply_per_line(image, host, area, deltas, Axis::Row, |v, d| v + d * max, clamp)
            }
            OpcodeKind::DeltaPerColumn { area, deltas } => {
                apply_per_line(image, host, area, deltas, Axis::Column, |v, d| v + d * max, clamp)
            }
            OpcodeKind::ScalePerRow { area, scales } => {
                apply_per_line(image, host, area, scales, Axis::Row, |v, s| v * s, clamp)
            }
            OpcodeKind::ScalePerColumn { area, scales } => {
                apply_per_line(image, host, area, scales, Axis::Column, |v, s| v * s, clamp)
            }
            OpcodeKind::Unsupported => Err(DngError::program("applying an unsupported opcode")),
        }
    }
}

fn apply_per_line(
    image: &mut StageImage,
    host: &Host,
    area: &OpcodeArea,
    values: &[f32],
    axis: Axis,
    combine: impl Fn(f64, f64) -> f64,
    clamp: impl Fn(f64) -> u16,
) -> Result<()> {
    area.for_each(image, host, |row_index, col_index, v| {
        let index = match axis {
            Axis::Row => row_index,
            Axis::Column => col_index,
        };
        match values.get(index) {
            Some(&x) => clamp(combine(v as f64, x as f64)),
            None => v,
        }
    })
}

/// Replaces samples equal to `constant` in a Bayer mosaic with the mean of
/// same-colour neighbours.
fn fix_bad_pixels_constant(
    image: &mut StageImage,
    constant: u32,
    bayer_phase: u32,
    host: &Host,
) -> Result<()> {
    if image.planes != 1 {
        return Err(DngError::bad_format("FixBadPixelsConstant needs a single-plane mosaic"));
    }
    let Ok(constant) = u16::try_from(constant) else {
        return Ok(());
    };
    let phase_row = (bayer_phase >> 1) as usize;
    let phase_col = (bayer_phase & 1) as usize;
    let (height, width) = (image.height as isize, image.width as isize);
    let source = image.clone();

    for row in 0..image.height {
        host.sniff_for_abort()?;
        for col in 0..image.width {
            if source.get(row, col, 0) != constant {
                continue;
            }
            let is_green = (row + phase_row + col + phase_col) % 2 == 1;
            let mut offsets = vec![(-2, 0), (2, 0), (0, -2), (0, 2)];
            if is_green {
                offsets.extend_from_slice(&[(-1, -1), (-1, 1), (1, -1), (1, 1)]);
            }
            let (mut sum, mut count) = (0u32, 0u32);
            for (dr, dc) in offsets {
                let (r, c) = (row as isize + dr, col as isize + dc);
                if r < 0 || c < 0 || r >= height || c >= width {
                    continue;
                }
                let v = source.get(r as usize, c as usize, 0);
                if v != constant {
                    sum += v as u32;
                    count += 1;
                }
            }
            if count > 0 {
                image.set(row, col, 0, ((sum + count / 2) / count) as u16);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::image::PixelType;

    fn area(rect: Rect) -> OpcodeArea {
        OpcodeArea {
            area: rect,
            plane: 0,
            planes: 1,
            row_pitch: 1,
            col_pitch: 1,
        }
    }

    fn flat(width: usize, height: usize, value: u16) -> StageImage {
        StageImage::from_data(width, height, 1, PixelType::U16, vec![value; width * height])
            .unwrap()
    }

    #[test]
    fn params_round_trip_through_parse() {
        let kind = OpcodeKind::MapTable {
            area: area(Rect::new(0, 0, 4, 4)),
            table: vec![0, 10, 20],
        };
        let params = kind.params().unwrap();
        assert_eq!(OpcodeKind::parse(MAP_TABLE, &params).unwrap(), kind);
    }

    #[test]
    fn delta_count_must_match_area() {
        let kind = OpcodeKind::DeltaPerRow {
            area: area(Rect::new(0, 0, 4, 4)),
            deltas: vec![0.0; 3],
        };
        assert!(OpcodeKind::parse(DELTA_PER_ROW, &kind.params().unwrap()).is_err());
    }

    #[test]
    fn map_table_clamps_index() {
        let mut image = StageImage::from_data(2, 1, 1, PixelType::U16, vec![1, 9]).unwrap();
        let kind = OpcodeKind::MapTable {
            area: area(Rect::new(0, 0, 1, 2)),
            table: vec![100, 200, 300],
        };
        kind.apply(&mut image, &Host::default()).unwrap();
        assert_eq!(image.data, vec![200, 300]);
    }

    #[test]
    fn scale_per_column_respects_pitch() {
        let mut image = flat(4, 2, 1000);
        let kind = OpcodeKind::ScalePerColumn {
            area: OpcodeArea {
                col_pitch: 2,
                ..area(Rect::new(0, 0, 2, 4))
            },
            scales: vec![2.0, 0.5],
        };
        kind.apply(&mut image, &Host::default()).unwrap();
        assert_eq!(image.row(0), &[2000, 1000, 500, 1000]);
    }

    #[test]
    fn polynomial_identity_leaves_pixels() {
        let mut image = flat(3, 3, 4242);
        let kind = OpcodeKind::MapPolynomial {
            area: area(Rect::new(0, 0, 3, 3)),
            coefficients: vec![0.0, 1.0],
        };
        kind.apply(&mut image, &Host::default()).unwrap();
        assert!(image.data.iter().all(|&v| v == 4242));
    }

    #[test]
    fn bad_pixel_takes_neighbour_mean() {
        let mut image = flat(6, 6, 500);
        image.set(2, 2, 0, 0);
        image.set(0, 2, 0, 300);
        let kind = OpcodeKind::FixBadPixelsConstant {
            constant: 0,
            bayer_phase: 0,
        };
        kind.apply(&mut image, &Host::default()).unwrap();
        // (2,2) is red at phase 0: neighbours 300, 500, 500, 500.
        assert_eq!(image.get(2, 2, 0), 450);
    }

    #[test]
    fn trim_bounds_crops() {
        let mut image = flat(8, 8, 1);
        OpcodeKind::TrimBounds {
            bounds: Rect::new(2, 2, 6, 8),
        }
        .apply(&mut image, &Host::default())
        .unwrap();
        assert_eq!((image.width, image.height), (6, 4));
    }
}
