//! Sample predictors for lossless JPEG.
//!
//! `Ra` is the sample to the left, `Rb` the one above and `Rc` the one above
//! and to the left, all in the same component. The first row of the image
//! and of every restart interval predicts from the left neighbour, starting
//! from half the sample range; the first column of other rows predicts
//! from above.

use crate::image_pipeline::common::error::{DngError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Predictor {
    /// No prediction; the difference is the sample itself.
    None,
    /// Ra
    #[default]
    Left,
    /// Rb
    Above,
    /// Rc
    UpperLeft,
    /// Ra + Rb - Rc
    Gradient,
    /// Ra + ((Rb - Rc) >> 1)
    LeftHalfGradient,
    /// Rb + ((Ra - Rc) >> 1)
    AboveHalfGradient,
    /// (Ra + Rb) >> 1
    Average,
}

impl Predictor {
    pub const ALL: [Predictor; 8] = [
        Predictor::None,
        Predictor::Left,
        Predictor::Above,
        Predictor::UpperLeft,
        Predictor::Gradient,
        Predictor::LeftHalfGradient,
        Predictor::AboveHalfGradient,
        Predictor::Average,
    ];

    pub fn from_selector(selector: u8) -> Result<Predictor> {
        Self::ALL
            .get(selector as usize)
            .copied()
            .ok_or_else(|| DngError::bad_format(format!("predictor selector {}", selector)))
    }

    pub fn selector(self) -> u8 {
        match self {
            Predictor::None => 0,
            Predictor::Left => 1,
            Predictor::Above => 2,
            Predictor::UpperLeft => 3,
            Predictor::Gradient => 4,
            Predictor::LeftHalfGradient => 5,
            Predictor::AboveHalfGradient => 6,
            Predictor::Average => 7,
        }
    }
}

/// Layout of the interleaved sample buffer being coded.
#[derive(Debug, Clone, Copy)]
pub struct ScanGeometry {
    pub width: usize,
    pub components: usize,
    pub precision: u8,
}

impl ScanGeometry {
    #[inline]
    pub fn row_len(&self) -> usize {
        self.width * self.components
    }

    #[inline]
    fn base(&self) -> i32 {
        1 << (self.precision - 1)
    }
}

/// Prediction for the sample at `index` (row `row`, column `col`).
///
/// `samples` must hold every sample before `index` already reconstructed.
/// `interval_start` is set on the first row of the image and of each restart
/// interval. Arithmetic is modulo 2^16.
#[inline]
pub fn predict(
    predictor: Predictor,
    geometry: &ScanGeometry,
    samples: &[u16],
    index: usize,
    col: usize,
    interval_start: bool,
) -> u16 {
    if predictor == Predictor::None {
        return 0;
    }
    let comps = geometry.components;
    let row_len = geometry.row_len();

    if interval_start {
        return if col == 0 {
            geometry.base() as u16
        } else {
            samples[index - comps]
        };
    }
    if col == 0 {
        return samples[index - row_len];
    }

    let ra = samples[index - comps] as i32;
    let rb = samples[index - row_len] as i32;
    let rc = samples[index - row_len - comps] as i32;

    let value = match predictor {
        Predictor::None => 0,
        Predictor::Left => ra,
        Predictor::Above => rb,
        Predictor::UpperLeft => rc,
        Predictor::Gradient => ra + rb - rc,
        Predictor::LeftHalfGradient => ra + ((rb - rc) >> 1),
        Predictor::AboveHalfGradient => rb + ((ra - rc) >> 1),
        Predictor::Average => (ra + rb) >> 1,
    };
    value as u16
}
