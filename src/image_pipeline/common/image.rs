//! Stage image buffers.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::geometry::Rect;

/// Storage width of the samples an image was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
}

impl PixelType {
    pub fn bits(&self) -> u32 {
        match self {
            PixelType::U8 => 8,
            PixelType::U16 => 16,
        }
    }

    pub fn max_value(&self) -> u32 {
        (1u32 << self.bits()) - 1
    }
}

/// Interleaved multi-plane image.
///
/// Samples are held as `u16` whatever the pixel type; `pixel_type` records
/// the depth they were read with. Sample `(row, col, plane)` lives at
/// `(row * width + col) * planes + plane`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageImage {
    pub width: usize,
    pub height: usize,
    pub planes: usize,
    pub pixel_type: PixelType,
    pub data: Vec<u16>,
}

impl StageImage {
    pub fn new(width: usize, height: usize, planes: usize, pixel_type: PixelType) -> Self {
        Self {
            width,
            height,
            planes,
            pixel_type,
            data: vec![0; width * height * planes],
        }
    }

    pub fn from_data(
        width: usize,
        height: usize,
        planes: usize,
        pixel_type: PixelType,
        data: Vec<u16>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || planes == 0 {
            return Err(DngError::InvalidDimensions(width, height));
        }
        if data.len() != width * height * planes {
            return Err(DngError::bad_format(format!(
                "{}x{}x{} image needs {} samples, got {}",
                width,
                height,
                planes,
                width * height * planes,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            planes,
            pixel_type,
            data,
        })
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.height as u32, self.width as u32)
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize, plane: usize) -> usize {
        (row * self.width + col) * self.planes + plane
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize, plane: usize) -> u16 {
        self.data[self.index(row, col, plane)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, plane: usize, value: u16) {
        let i = self.index(row, col, plane);
        self.data[i] = value;
    }

    pub fn row(&self, row: usize) -> &[u16] {
        let stride = self.width * self.planes;
        &self.data[row * stride..(row + 1) * stride]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [u16] {
        let stride = self.width * self.planes;
        &mut self.data[row * stride..(row + 1) * stride]
    }

    /// Copies the rectangle `area` into a new image.
    pub fn crop(&self, area: &Rect) -> Result<StageImage> {
        if area.is_empty() || !self.bounds().contains(area) {
            return Err(DngError::bad_format(format!(
                "crop {:?} outside image {}x{}",
                area, self.width, self.height
            )));
        }
        let width = area.width() as usize;
        let height = area.height() as usize;
        let mut out = StageImage::new(width, height, self.planes, self.pixel_type);
        for r in 0..height {
            let src_row = self.row(r + area.top as usize);
            let start = area.left as usize * self.planes;
            out.row_mut(r)
                .copy_from_slice(&src_row[start..start + width * self.planes]);
        }
        Ok(out)
    }

    /// Extracts one plane as a single-plane image.
    pub fn plane(&self, plane: usize) -> Result<StageImage> {
        if plane >= self.planes {
            return Err(DngError::bad_format(format!(
                "plane {} out of range ({} planes)",
                plane, self.planes
            )));
        }
        let data = self
            .data
            .iter()
            .skip(plane)
            .step_by(self.planes)
            .copied()
            .collect();
        StageImage::from_data(self.width, self.height, 1, self.pixel_type, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_copies_interior() {
        let data: Vec<u16> = (0..16).collect();
        let img = StageImage::from_data(4, 4, 1, PixelType::U16, data).unwrap();
        let c = img.crop(&Rect::new(1, 1, 3, 3)).unwrap();
        assert_eq!(c.data, vec![5, 6, 9, 10]);
    }

    #[test]
    fn sample_count_must_match() {
        let r = StageImage::from_data(2, 2, 3, PixelType::U16, vec![0; 4]);
        assert!(matches!(r, Err(DngError::BadFormat(_))));
    }

    #[test]
    fn plane_extraction() {
        let img = StageImage::from_data(2, 1, 2, PixelType::U8, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(img.plane(1).unwrap().data, vec![2, 4]);
    }
}
