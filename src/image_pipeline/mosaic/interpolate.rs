use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use std::io::Cursor;
use tracing::{debug, info};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::mosaic::info::MosaicInfo;
use crate::image_pipeline::mosaic::resample;

impl MosaicInfo {
    /// Demosaics a single-plane stage 2 image into one plane per colour.
    ///
    /// `source_plane` keeps only that plane of the result. Staggered layouts
    /// are then stretched by `full_scale()`.
    pub fn interpolate(
        &self,
        stage2: &StageImage,
        source_plane: Option<usize>,
        host: &Host,
    ) -> Result<StageImage> {
        if stage2.planes != 1 {
            return Err(DngError::bad_format(format!(
                "mosaic data with {} planes",
                stage2.planes
            )));
        }
        if let Some(plane) = source_plane {
            if plane >= self.color_planes() {
                return Err(DngError::bad_format(format!(
                    "source plane {} out of {}",
                    plane,
                    self.color_planes()
                )));
            }
        }
        info!(
            "Interpolating {}x{} mosaic into {} planes",
            stage2.width,
            stage2.height,
            self.color_planes()
        );

        let mut full = match self.bayer_cfa() {
            Some(cfa) if stage2.width >= 2 && stage2.height >= 2 => {
                demosaic_bayer(stage2, cfa, host)?
            }
            _ => self.interpolate_generic(stage2, host)?,
        };

        if let Some(plane) = source_plane {
            full = full.plane(plane)?;
        }
        self.stretch_to_full(full, host)
    }

    /// Combines a stage 2 image that already holds one plane per colour.
    ///
    /// Nothing is interpolated; `source_plane` keeps only that plane.
    /// Staggered layouts are stretched as in `interpolate`.
    pub fn merge_planes(
        &self,
        stage2: &StageImage,
        source_plane: Option<usize>,
        host: &Host,
    ) -> Result<StageImage> {
        if stage2.planes != self.color_planes() {
            return Err(DngError::bad_format(format!(
                "{} stage 2 planes for a {}-colour mosaic",
                stage2.planes,
                self.color_planes()
            )));
        }
        host.sniff_for_abort()?;
        info!(
            "Merging {}x{} image of {} planes",
            stage2.width, stage2.height, stage2.planes
        );
        let merged = match source_plane {
            Some(plane) => stage2.plane(plane)?,
            None => stage2.clone(),
        };
        self.stretch_to_full(merged, host)
    }

    fn stretch_to_full(&self, mut image: StageImage, host: &Host) -> Result<StageImage> {
        let (scale_v, scale_h) = self.full_scale();
        if scale_v > 1 {
            image = resample::stretch_rows(&image, scale_v, host)?;
        }
        if scale_h > 1 {
            image = resample::stretch_cols(&image, scale_h, host)?;
        }
        Ok(image)
    }

    fn bayer_cfa(&self) -> Option<CFA> {
        if !self.is_bayer() {
            return None;
        }
        Some(match self.bayer_phase()? {
            0 => CFA::RGGB,
            1 => CFA::GRBG,
            2 => CFA::GBRG,
            _ => CFA::BGGR,
        })
    }

    /// Averages, for each missing plane, the nearest same-plane samples.
    ///
    /// The search window grows until it holds at least one sample of the
    /// plane, so any valid pattern is covered.
    fn interpolate_generic(&self, stage2: &StageImage, host: &Host) -> Result<StageImage> {
        let (width, height) = (stage2.width, stage2.height);
        let planes = self.color_planes();
        let max_radius = self.pattern_rows.max(self.pattern_cols) as isize;
        let mut out = StageImage {
            width,
            height,
            planes,
            pixel_type: PixelType::U16,
            data: host.allocate(width * height * planes, "interpolated image")?,
        };

        let mut sums = vec![0u64; planes];
        let mut counts = vec![0u32; planes];
        for row in 0..height {
            host.sniff_for_abort()?;
            for col in 0..width {
                let own = self.plane_at(row, col);
                out.set(row, col, own, stage2.get(row, col, 0));

                for plane in (0..planes).filter(|&p| p != own) {
                    let mut value = 0u16;
                    for radius in 1..=max_radius {
                        sums[plane] = 0;
                        counts[plane] = 0;
                        for dr in -radius..=radius {
                            for dc in -radius..=radius {
                                let (r, c) = (row as isize + dr, col as isize + dc);
                                if r < 0 || c < 0 || r >= height as isize || c >= width as isize {
                                    continue;
                                }
                                let (r, c) = (r as usize, c as usize);
                                if self.plane_at(r, c) == plane {
                                    sums[plane] += stage2.get(r, c, 0) as u64;
                                    counts[plane] += 1;
                                }
                            }
                        }
                        if counts[plane] > 0 {
                            let n = counts[plane] as u64;
                            value = ((sums[plane] + n / 2) / n) as u16;
                            break;
                        }
                    }
                    out.set(row, col, plane, value);
                }
            }
        }
        Ok(out)
    }
}

/// Three-plane Bayer demosaic through the `bayer` crate.
fn demosaic_bayer(stage2: &StageImage, cfa: CFA, host: &Host) -> Result<StageImage> {
    let (width, height) = (stage2.width, stage2.height);
    debug!("Running bilinear demosaic, CFA {:?}", cfa);

    let bayer_bytes: Vec<u8> = stage2.data.iter().flat_map(|&v| v.to_le_bytes()).collect();
    let mut output_buf = host.allocate::<u8>(width * height * 3 * 2, "demosaic raster")?;
    let mut output_raster = RasterMut::new(width, height, RasterDepth::Depth16, &mut output_buf);

    bayer::run_demosaic(
        &mut Cursor::new(&bayer_bytes[..]),
        BayerDepth::Depth16LE,
        cfa,
        Demosaic::Linear,
        &mut output_raster,
    )
    .map_err(|e| DngError::Decode(format!("demosaic failed: {:?}", e)))?;
    host.sniff_for_abort()?;

    let data = output_buf
        .chunks_exact(2)
        .map(|b| u16::from_ne_bytes([b[0], b[1]]))
        .collect();
    StageImage::from_data(width, height, 3, PixelType::U16, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};

    fn rggb() -> MosaicInfo {
        MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap()
    }

    fn flat_mosaic(mosaic: &MosaicInfo, size: usize, levels: &[u16]) -> StageImage {
        let mut img = StageImage::new(size, size, 1, PixelType::U16);
        for r in 0..size {
            for c in 0..size {
                img.set(r, c, 0, levels[mosaic.plane_at(r, c)]);
            }
        }
        img
    }

    #[test]
    fn bayer_flat_field_stays_flat() {
        let mosaic = rggb();
        let stage2 = flat_mosaic(&mosaic, 8, &[1000, 2000, 3000]);
        let out = mosaic.interpolate(&stage2, None, &Host::default()).unwrap();
        assert_eq!((out.width, out.height, out.planes), (8, 8, 3));
        for r in 0..8 {
            for c in 0..8 {
                assert_eq!(out.get(r, c, 1), 2000, "green at {},{}", r, c);
            }
        }
        // Sites keep their own measured value.
        assert_eq!(out.get(0, 0, 0), 1000);
        assert_eq!(out.get(1, 1, 2), 3000);
    }

    #[test]
    fn four_color_uses_generic_path() {
        let mut mosaic = rggb();
        mosaic.set_four_color_bayer().unwrap();
        let stage2 = flat_mosaic(&mosaic, 8, &[100, 200, 300, 400]);
        let out = mosaic.interpolate(&stage2, None, &Host::default()).unwrap();
        assert_eq!(out.planes, 4);
        assert!((0..64).all(|i| out.data[i * 4..i * 4 + 4] == [100, 200, 300, 400]));
    }

    #[test]
    fn source_plane_keeps_one_plane() {
        let mosaic = rggb();
        let stage2 = flat_mosaic(&mosaic, 4, &[10, 20, 30]);
        let out = mosaic.interpolate(&stage2, Some(2), &Host::default()).unwrap();
        assert_eq!(out.planes, 1);
        assert!(mosaic.interpolate(&stage2, Some(3), &Host::default()).is_err());
    }

    #[test]
    fn staggered_layout_doubles_rows() {
        let mut mosaic =
            MosaicInfo::new(2, 4, vec![0, 1, 2, 1, 2, 1, 0, 1], vec![0, 1, 2]).unwrap();
        mosaic.layout = 2;
        let stage2 = flat_mosaic(&mosaic, 8, &[5, 6, 7]);
        let out = mosaic.interpolate(&stage2, None, &Host::default()).unwrap();
        assert_eq!((out.width, out.height), (8, 16));
        assert!(out.data.chunks(3).all(|px| px == [5, 6, 7]));
    }

    #[test]
    fn merge_keeps_planes_without_interpolating() {
        let mosaic = rggb();
        let mut stage2 = StageImage::new(4, 4, 3, PixelType::U16);
        for (i, v) in stage2.data.iter_mut().enumerate() {
            *v = i as u16;
        }
        let merged = mosaic.merge_planes(&stage2, None, &Host::default()).unwrap();
        assert_eq!(merged.data, stage2.data);

        let blue = mosaic.merge_planes(&stage2, Some(2), &Host::default()).unwrap();
        assert_eq!(blue.planes, 1);
        assert_eq!(blue.get(1, 1, 0), stage2.get(1, 1, 2));
    }

    #[test]
    fn merge_needs_one_plane_per_colour() {
        let mosaic = rggb();
        let stage2 = StageImage::new(4, 4, 2, PixelType::U16);
        assert!(mosaic.merge_planes(&stage2, None, &Host::default()).is_err());
    }
}
