use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::geometry::Rect;
use crate::image_pipeline::tags::image_dir::{ImageDirectory, MAX_MASKED_AREAS};

/// Black and white level description of a raw image.
///
/// Row and column arguments are relative to the active area.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizationInfo {
    pub active_area: Rect,
    pub masked_areas: Vec<Rect>,
    pub linearization_table: Vec<u16>,
    pub black_level_repeat_rows: usize,
    pub black_level_repeat_cols: usize,
    /// `rows * cols * planes`, plane fastest.
    pub black_level: Vec<f64>,
    /// One entry per active-area column; empty if absent.
    pub black_delta_h: Vec<f64>,
    /// One entry per active-area row; empty if absent.
    pub black_delta_v: Vec<f64>,
    pub white_level: Vec<f64>,
    planes: usize,
}

impl LinearizationInfo {
    /// Uniform black level `black`, white level `white` on every plane.
    pub fn uniform(active_area: Rect, planes: usize, black: f64, white: f64) -> Self {
        Self {
            active_area,
            masked_areas: Vec::new(),
            linearization_table: Vec::new(),
            black_level_repeat_rows: 1,
            black_level_repeat_cols: 1,
            black_level: vec![black; planes],
            black_delta_h: Vec::new(),
            black_delta_v: Vec::new(),
            white_level: vec![white; planes],
            planes,
        }
    }

    pub fn from_directory(ifd: &ImageDirectory) -> Result<Self> {
        let planes = ifd.samples_per_pixel as usize;
        let active_area = ifd.effective_active_area();
        let rows = ifd.black_level_repeat_rows as usize;
        let cols = ifd.black_level_repeat_cols as usize;

        let black_level = if ifd.black_level.is_empty() {
            vec![0.0; rows * cols * planes]
        } else if ifd.black_level.len() == rows * cols * planes {
            ifd.black_level.clone()
        } else {
            return Err(DngError::bad_format(format!(
                "{} black levels for a {}x{}x{} pattern",
                ifd.black_level.len(),
                rows,
                cols,
                planes
            )));
        };

        if !ifd.black_level_delta_h.is_empty()
            && ifd.black_level_delta_h.len() != active_area.width() as usize
        {
            return Err(DngError::bad_format("BlackLevelDeltaH does not span the active area"));
        }
        if !ifd.black_level_delta_v.is_empty()
            && ifd.black_level_delta_v.len() != active_area.height() as usize
        {
            return Err(DngError::bad_format("BlackLevelDeltaV does not span the active area"));
        }

        let default_white = match ifd.linearization_table.iter().max() {
            Some(&max) => max as f64,
            None => ((1u32 << ifd.bits()) - 1) as f64,
        };
        let white_level = match ifd.white_level.len() {
            0 => vec![default_white; planes],
            n if n == planes => ifd.white_level.clone(),
            n => {
                return Err(DngError::bad_format(format!(
                    "{} white levels for {} planes",
                    n, planes
                )));
            }
        };

        let info = Self {
            active_area,
            masked_areas: ifd.masked_areas.iter().take(MAX_MASKED_AREAS).copied().collect(),
            linearization_table: ifd.linearization_table.clone(),
            black_level_repeat_rows: rows,
            black_level_repeat_cols: cols,
            black_level,
            black_delta_h: ifd.black_level_delta_h.clone(),
            black_delta_v: ifd.black_level_delta_v.clone(),
            white_level,
            planes,
        };
        for plane in 0..planes {
            if info.white_level[plane] <= info.max_black_level(plane) {
                return Err(DngError::bad_format(format!(
                    "white level {} not above black level on plane {}",
                    info.white_level[plane], plane
                )));
            }
        }
        Ok(info)
    }

    pub fn planes(&self) -> usize {
        self.planes
    }

    fn grid_value(&self, row: usize, col: usize, plane: usize) -> f64 {
        let r = row % self.black_level_repeat_rows;
        let c = col % self.black_level_repeat_cols;
        self.black_level[(r * self.black_level_repeat_cols + c) * self.planes + plane]
    }

    /// Black level of one sample: grid value plus row and column deltas,
    /// rounded to an integer.
    pub fn black_level_at(&self, row: usize, col: usize, plane: usize) -> f64 {
        let mut black = self.grid_value(row, col, plane);
        if let Some(dv) = self.black_delta_v.get(row) {
            black += dv;
        }
        if let Some(dh) = self.black_delta_h.get(col) {
            black += dh;
        }
        black.round()
    }

    /// Largest black level any sample of `plane` can see.
    pub fn max_black_level(&self, plane: usize) -> f64 {
        let mut grid_max = f64::MIN;
        for r in 0..self.black_level_repeat_rows {
            for c in 0..self.black_level_repeat_cols {
                grid_max = grid_max.max(self.grid_value(r, c, plane));
            }
        }
        let max_of = |v: &[f64]| v.iter().copied().fold(0.0, f64::max);
        (grid_max + max_of(&self.black_delta_v) + max_of(&self.black_delta_h)).round()
    }

    /// Whether the black level is the same constant everywhere on every plane.
    pub fn is_uniform_black(&self) -> bool {
        let first = self.black_level.first().copied().unwrap_or(0.0);
        self.black_level.iter().all(|&b| b == first)
            && self.black_delta_h.iter().all(|&d| d == 0.0)
            && self.black_delta_v.iter().all(|&d| d == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ImageDirectory {
        let mut ifd = ImageDirectory::new(8);
        ifd.width = 6;
        ifd.length = 4;
        ifd.bits_per_sample = vec![12];
        ifd
    }

    #[test]
    fn uniform_grid_gives_exact_black_everywhere() {
        let mut ifd = directory();
        ifd.black_level_repeat_rows = 2;
        ifd.black_level_repeat_cols = 2;
        ifd.black_level = vec![128.0; 4];
        let info = LinearizationInfo::from_directory(&ifd).unwrap();
        for row in 0..4 {
            for col in 0..6 {
                assert_eq!(info.black_level_at(row, col, 0), 128.0);
            }
        }
        assert!(info.is_uniform_black());
        assert_eq!(info.white_level, vec![4095.0]);
    }

    #[test]
    fn deltas_are_added_and_rounded() {
        let mut ifd = directory();
        ifd.black_level_repeat_rows = 1;
        ifd.black_level_repeat_cols = 2;
        ifd.black_level = vec![100.0, 110.0];
        ifd.black_level_delta_h = vec![0.4, 0.6, 0.0, 0.0, 0.0, 0.0];
        ifd.black_level_delta_v = vec![0.0, 0.0, 2.0, 0.0];
        let info = LinearizationInfo::from_directory(&ifd).unwrap();
        assert_eq!(info.black_level_at(0, 0, 0), 100.0);
        assert_eq!(info.black_level_at(0, 1, 0), 111.0);
        assert_eq!(info.black_level_at(2, 0, 0), 102.0);
        assert_eq!(info.max_black_level(0), 113.0);
        assert!(!info.is_uniform_black());
    }

    #[test]
    fn delta_length_must_match_active_area() {
        let mut ifd = directory();
        ifd.active_area = Rect::new(0, 2, 4, 6);
        ifd.black_level_delta_h = vec![1.0; 6];
        assert!(LinearizationInfo::from_directory(&ifd).is_err());
        ifd.black_level_delta_h = vec![1.0; 4];
        assert!(LinearizationInfo::from_directory(&ifd).is_ok());
    }

    #[test]
    fn table_sets_default_white() {
        let mut ifd = directory();
        ifd.linearization_table = vec![0, 1000, 3000];
        let info = LinearizationInfo::from_directory(&ifd).unwrap();
        assert_eq!(info.white_level, vec![3000.0]);
    }

    #[test]
    fn white_below_black_is_rejected() {
        let mut ifd = directory();
        ifd.black_level = vec![500.0];
        ifd.white_level = vec![400.0];
        assert!(LinearizationInfo::from_directory(&ifd).is_err());
    }
}
