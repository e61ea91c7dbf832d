use tracing::debug;

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::linearization::info::LinearizationInfo;

/// Full scale of a linearized sample.
pub const LINEAR_WHITE: f64 = 65535.0;

impl LinearizationInfo {
    /// Builds the stage 2 image from stage 1.
    ///
    /// Crops to the active area, maps through the linearization table,
    /// subtracts the per-sample black level and scales each plane so the
    /// white level lands on 65535. Results are clipped to `[0, 65535]`.
    pub fn linearize(&self, stage1: &StageImage, host: &Host) -> Result<StageImage> {
        if stage1.planes != self.planes() {
            return Err(DngError::bad_format(format!(
                "stage 1 has {} planes, linearization expects {}",
                stage1.planes,
                self.planes()
            )));
        }
        let active = stage1.crop(&self.active_area)?;
        let (width, height, planes) = (active.width, active.height, active.planes);

        let scales: Vec<f64> = (0..planes)
            .map(|p| LINEAR_WHITE / (self.white_level[p] - self.max_black_level(p)))
            .collect();
        debug!(
            "Linearizing {}x{}x{}, scales {:?}, table {} entries",
            width,
            height,
            planes,
            scales,
            self.linearization_table.len()
        );

        let last_entry = self.linearization_table.len().saturating_sub(1);
        let mut out = StageImage {
            width,
            height,
            planes,
            pixel_type: PixelType::U16,
            data: host.allocate(width * height * planes, "stage 2 image")?,
        };

        for row in 0..height {
            host.sniff_for_abort()?;
            for col in 0..width {
                for plane in 0..planes {
                    let mut value = active.get(row, col, plane);
                    if !self.linearization_table.is_empty() {
                        value = self.linearization_table[(value as usize).min(last_entry)];
                    }
                    let black = self.black_level_at(row, col, plane);
                    let linear = (value as f64 - black) * scales[plane];
                    out.set(row, col, plane, linear.round().clamp(0.0, LINEAR_WHITE) as u16);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::geometry::Rect;

    #[test]
    fn maps_black_to_zero_and_white_to_full() {
        let info = LinearizationInfo::uniform(Rect::from_size(1, 4), 1, 100.0, 1100.0);
        let stage1 = StageImage::from_data(4, 1, 1, PixelType::U16, vec![50, 100, 600, 2000]).unwrap();
        let out = info.linearize(&stage1, &Host::default()).unwrap();
        assert_eq!(out.data, vec![0, 0, 32768, 65535]);
    }

    #[test]
    fn crops_to_active_area() {
        let info = LinearizationInfo::uniform(Rect::new(1, 1, 3, 3), 1, 0.0, 65535.0);
        let data: Vec<u16> = (0..16).collect();
        let stage1 = StageImage::from_data(4, 4, 1, PixelType::U16, data).unwrap();
        let out = info.linearize(&stage1, &Host::default()).unwrap();
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.data, vec![5, 6, 9, 10]);
    }

    #[test]
    fn applies_table_before_black() {
        let mut info = LinearizationInfo::uniform(Rect::from_size(1, 2), 1, 0.0, 255.0);
        info.linearization_table = (0..256u32).map(|v| (255 - v) as u16).collect();
        let stage1 = StageImage::from_data(2, 1, 1, PixelType::U8, vec![0, 255]).unwrap();
        let out = info.linearize(&stage1, &Host::default()).unwrap();
        assert_eq!(out.data, vec![65535, 0]);
    }

    #[test]
    fn abort_flag_cancels() {
        let host = Host::default();
        host.request_abort();
        let info = LinearizationInfo::uniform(Rect::from_size(2, 2), 1, 0.0, 255.0);
        let stage1 = StageImage::new(2, 2, 1, PixelType::U8);
        assert!(matches!(
            info.linearize(&stage1, &host),
            Err(DngError::UserCanceled)
        ));
    }
}
