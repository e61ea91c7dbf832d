use tracing::debug;

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::tags::image_dir::{ImageDirectory, MAX_CFA_PATTERN};
use crate::image_pipeline::tags::profile_info::MAX_COLOR_PLANES;

pub const CFA_RED: u8 = 0;
pub const CFA_GREEN: u8 = 1;
pub const CFA_BLUE: u8 = 2;

/// Rectangular CFA layout; others are staggered.
pub const CFA_LAYOUT_RECTANGULAR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicKind {
    /// 2x2 red/green/blue with diagonal greens.
    Bayer,
    /// 2x4 diagonal pattern on a staggered grid.
    Diagonal,
    Generic,
}

/// Colour filter array description.
///
/// `pattern` holds plane indices, not colour codes; `plane_colors` maps a
/// plane to its CFA colour code, so two planes may share a colour after a
/// four-colour conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicInfo {
    pub pattern_rows: usize,
    pub pattern_cols: usize,
    pub pattern: Vec<u8>,
    pub plane_colors: Vec<u8>,
    pub layout: u32,
    pub green_split: u32,
}

impl MosaicInfo {
    pub fn new(
        pattern_rows: usize,
        pattern_cols: usize,
        pattern: Vec<u8>,
        plane_colors: Vec<u8>,
    ) -> Result<Self> {
        let info = Self {
            pattern_rows,
            pattern_cols,
            pattern,
            plane_colors,
            layout: CFA_LAYOUT_RECTANGULAR,
            green_split: 0,
        };
        info.validate()?;
        Ok(info)
    }

    /// Mosaic of a CFA directory, `None` for anything else.
    pub fn from_directory(ifd: &ImageDirectory) -> Result<Option<Self>> {
        if !ifd.is_cfa() {
            return Ok(None);
        }
        let plane_colors = ifd.cfa_plane_color.clone();
        let pattern = ifd
            .cfa_pattern
            .iter()
            .map(|&color| {
                plane_colors
                    .iter()
                    .position(|&c| c == color)
                    .map(|p| p as u8)
                    .ok_or_else(|| {
                        DngError::bad_format(format!("CFA colour {} has no plane", color))
                    })
            })
            .collect::<Result<Vec<u8>>>()?;
        let info = Self {
            pattern_rows: ifd.cfa_repeat_rows as usize,
            pattern_cols: ifd.cfa_repeat_cols as usize,
            pattern,
            plane_colors,
            layout: ifd.cfa_layout,
            green_split: ifd.bayer_green_split,
        };
        info.validate()?;
        debug!(
            "Mosaic {}x{} {:?}, {} planes, layout {}",
            info.pattern_rows,
            info.pattern_cols,
            info.kind(),
            info.color_planes(),
            info.layout
        );
        Ok(Some(info))
    }

    /// Decodes a packed filter code: 2 bits per cell of an 8x2 pattern,
    /// row-major, cell 0 in the low bits.
    ///
    /// Index 3 is the second green of a four-colour Bayer sensor and folds
    /// into green when `color_planes` is 3.
    pub fn from_filter_code(code: u32, color_planes: usize) -> Result<Self> {
        if !(3..=4).contains(&color_planes) {
            return Err(DngError::bad_format(format!(
                "filter code with {} planes",
                color_planes
            )));
        }
        let cell = |row: usize, col: usize| -> u8 {
            let index = (row % 8) * 2 + (col % 2);
            let value = ((code >> (index * 2)) & 3) as u8;
            if value == 3 && color_planes == 3 { 1 } else { value }
        };

        let full: Vec<u8> = (0..16).map(|i| cell(i / 2, i % 2)).collect();
        let rows = [2usize, 4, 8]
            .into_iter()
            .find(|&period| (0..16).all(|i| full[i] == full[i % (period * 2)]))
            .unwrap_or(8);

        let mut plane_colors = vec![CFA_RED, CFA_GREEN, CFA_BLUE];
        if color_planes == 4 {
            plane_colors.push(CFA_GREEN);
        }
        Self::new(rows, 2, full[..rows * 2].to_vec(), plane_colors)
    }

    pub fn validate(&self) -> Result<()> {
        let cells = self.pattern_rows * self.pattern_cols;
        if cells == 0
            || self.pattern_rows > MAX_CFA_PATTERN as usize
            || self.pattern_cols > MAX_CFA_PATTERN as usize
            || self.pattern.len() != cells
        {
            return Err(DngError::bad_format(format!(
                "CFA pattern {}x{} with {} cells",
                self.pattern_rows,
                self.pattern_cols,
                self.pattern.len()
            )));
        }
        let planes = self.color_planes();
        if !(1..=MAX_COLOR_PLANES as usize).contains(&planes) {
            return Err(DngError::bad_format(format!("{} CFA colour planes", planes)));
        }
        for plane in 0..planes {
            if !self.pattern.contains(&(plane as u8)) {
                return Err(DngError::bad_format(format!(
                    "CFA plane {} never appears in the pattern",
                    plane
                )));
            }
        }
        if self.pattern.iter().any(|&p| p as usize >= planes) {
            return Err(DngError::bad_format("CFA pattern references a missing plane"));
        }
        Ok(())
    }

    pub fn color_planes(&self) -> usize {
        self.plane_colors.len()
    }

    #[inline]
    pub fn plane_at(&self, row: usize, col: usize) -> usize {
        self.pattern[(row % self.pattern_rows) * self.pattern_cols + col % self.pattern_cols] as usize
    }

    /// CFA colour codes per cell, as stored in `CFAPattern`.
    pub fn pattern_colors(&self) -> Vec<u8> {
        self.pattern
            .iter()
            .map(|&p| self.plane_colors[p as usize])
            .collect()
    }

    fn color_at(&self, row: usize, col: usize) -> u8 {
        self.plane_colors[self.plane_at(row, col)]
    }

    fn has_bayer_cells(&self) -> bool {
        if self.pattern_rows != 2 || self.pattern_cols != 2 || self.layout != CFA_LAYOUT_RECTANGULAR
        {
            return false;
        }
        let (a, b, c, d) = (
            self.color_at(0, 0),
            self.color_at(0, 1),
            self.color_at(1, 0),
            self.color_at(1, 1),
        );
        let diagonal_greens = |g1: u8, g2: u8, x: u8, y: u8| {
            g1 == CFA_GREEN
                && g2 == CFA_GREEN
                && ((x == CFA_RED && y == CFA_BLUE) || (x == CFA_BLUE && y == CFA_RED))
        };
        diagonal_greens(b, c, a, d) || diagonal_greens(a, d, b, c)
    }

    /// Three-plane 2x2 Bayer pattern.
    pub fn is_bayer(&self) -> bool {
        self.color_planes() == 3 && self.has_bayer_cells()
    }

    /// Bayer pattern whose second green has its own plane.
    pub fn is_four_color_bayer(&self) -> bool {
        self.color_planes() == 4 && self.has_bayer_cells()
    }

    pub fn kind(&self) -> MosaicKind {
        if self.has_bayer_cells() {
            MosaicKind::Bayer
        } else if self.pattern_rows == 2 && self.pattern_cols == 4 && self.layout != CFA_LAYOUT_RECTANGULAR
        {
            MosaicKind::Diagonal
        } else {
            MosaicKind::Generic
        }
    }

    /// Position of the top-left cell within RGGB: 0 red, 1 green on a red
    /// row, 2 green on a blue row, 3 blue.
    pub fn bayer_phase(&self) -> Option<u32> {
        if !self.has_bayer_cells() {
            return None;
        }
        let red_row = (0..2).find(|&r| (0..2).any(|c| self.color_at(r, c) == CFA_RED))?;
        let red_col = (0..2).find(|&c| self.color_at(red_row, c) == CFA_RED)?;
        Some(((red_row as u32) << 1) | red_col as u32)
    }

    /// Stage 3 to stage 2 size ratio (vertical, horizontal) implied by the
    /// layout.
    pub fn full_scale(&self) -> (usize, usize) {
        match self.layout {
            2 | 3 => (2, 1),
            4 | 5 => (1, 2),
            _ => (1, 1),
        }
    }

    /// Gives the green sharing a row with blue its own plane.
    pub fn set_four_color_bayer(&mut self) -> Result<()> {
        if !self.is_bayer() {
            return Err(DngError::program("four-colour conversion of a non-Bayer mosaic"));
        }
        let blue_row = (0..2)
            .find(|&r| (0..2).any(|c| self.color_at(r, c) == CFA_BLUE))
            .ok_or_else(|| DngError::program("Bayer pattern without blue"))?;
        let green_col = (0..2)
            .find(|&c| self.color_at(blue_row, c) == CFA_GREEN)
            .ok_or_else(|| DngError::program("Bayer blue row without green"))?;
        self.pattern[blue_row * 2 + green_col] = 3;
        self.plane_colors.push(CFA_GREEN);
        debug!("Mosaic converted to four-colour Bayer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rggb() -> MosaicInfo {
        MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap()
    }

    #[test]
    fn detects_bayer_phase() {
        assert_eq!(rggb().bayer_phase(), Some(0));
        let gbrg = MosaicInfo::new(2, 2, vec![1, 2, 0, 1], vec![0, 1, 2]).unwrap();
        assert_eq!(gbrg.bayer_phase(), Some(2));
        assert!(gbrg.is_bayer());
        assert_eq!(gbrg.kind(), MosaicKind::Bayer);
    }

    #[test]
    fn packed_code_decodes_row_major() {
        // RGGB repeating: cells 0..3 = R G G B, 2 bits each.
        let code = 0x9494_9494;
        let info = MosaicInfo::from_filter_code(code, 3).unwrap();
        assert_eq!((info.pattern_rows, info.pattern_cols), (2, 2));
        assert_eq!(info.pattern, vec![0, 1, 1, 2]);
        assert!(info.is_bayer());
    }

    #[test]
    fn packed_code_keeps_second_green_for_four_planes() {
        let code = 0xb4b4_b4b4;
        let info = MosaicInfo::from_filter_code(code, 4).unwrap();
        assert_eq!(info.pattern, vec![0, 1, 3, 2]);
        assert!(info.is_four_color_bayer());
        let folded = MosaicInfo::from_filter_code(code, 3).unwrap();
        assert_eq!(folded.pattern, vec![0, 1, 1, 2]);
    }

    #[test]
    fn four_color_conversion_splits_blue_row_green() {
        let mut info = rggb();
        info.set_four_color_bayer().unwrap();
        assert_eq!(info.pattern, vec![0, 1, 3, 2]);
        assert_eq!(info.plane_colors, vec![0, 1, 2, 1]);
        assert_eq!(info.pattern_colors(), vec![0, 1, 1, 2]);
        assert!(info.set_four_color_bayer().is_err());
    }

    #[test]
    fn rejects_unused_plane() {
        assert!(MosaicInfo::new(2, 2, vec![0, 1, 1, 0], vec![0, 1, 2]).is_err());
    }

    #[test]
    fn staggered_layout_scales_rows() {
        let mut info = MosaicInfo::new(2, 4, vec![0, 1, 2, 1, 2, 1, 0, 1], vec![0, 1, 2]).unwrap();
        info.layout = 2;
        assert_eq!(info.kind(), MosaicKind::Diagonal);
        assert_eq!(info.full_scale(), (2, 1));
    }
}
