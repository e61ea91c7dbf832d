//! Size changes of interpolated images.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::StageImage;

/// Stretches vertically by an integer factor, interpolating new rows
/// linearly between the source rows around them.
pub fn stretch_rows(image: &StageImage, factor: usize, host: &Host) -> Result<StageImage> {
    let height = image.height * factor;
    let mut out = StageImage {
        width: image.width,
        height,
        planes: image.planes,
        pixel_type: image.pixel_type,
        data: host.allocate(image.width * height * image.planes, "stretched image")?,
    };
    for row in 0..height {
        host.sniff_for_abort()?;
        let src = row / factor;
        let next = (src + 1).min(image.height - 1);
        let t = (row % factor) as f64 / factor as f64;
        let (a, b) = (image.row(src), image.row(next));
        for (i, out_v) in out.row_mut(row).iter_mut().enumerate() {
            *out_v = (a[i] as f64 * (1.0 - t) + b[i] as f64 * t).round() as u16;
        }
    }
    Ok(out)
}

/// Horizontal counterpart of [`stretch_rows`].
pub fn stretch_cols(image: &StageImage, factor: usize, host: &Host) -> Result<StageImage> {
    let width = image.width * factor;
    let planes = image.planes;
    let mut out = StageImage {
        width,
        height: image.height,
        planes,
        pixel_type: image.pixel_type,
        data: host.allocate(width * image.height * planes, "stretched image")?,
    };
    for row in 0..image.height {
        host.sniff_for_abort()?;
        for col in 0..width {
            let src = col / factor;
            let next = (src + 1).min(image.width - 1);
            let t = (col % factor) as f64 / factor as f64;
            for p in 0..planes {
                let v = image.get(row, src, p) as f64 * (1.0 - t) + image.get(row, next, p) as f64 * t;
                out.set(row, col, p, v.round() as u16);
            }
        }
    }
    Ok(out)
}

/// Box-filter downsample to `width` x `height`.
pub fn downsample(image: &StageImage, width: usize, height: usize, host: &Host) -> Result<StageImage> {
    if width == 0 || height == 0 || width > image.width || height > image.height {
        return Err(DngError::program(format!(
            "downsample {}x{} to {}x{}",
            image.width, image.height, width, height
        )));
    }
    if width == image.width && height == image.height {
        return Ok(image.clone());
    }
    let planes = image.planes;
    let mut out = StageImage {
        width,
        height,
        planes,
        pixel_type: image.pixel_type,
        data: host.allocate(width * height * planes, "downsampled image")?,
    };
    let mut sums = vec![0u64; planes];
    for row in 0..height {
        host.sniff_for_abort()?;
        let r0 = row * image.height / height;
        let r1 = ((row + 1) * image.height / height).max(r0 + 1);
        for col in 0..width {
            let c0 = col * image.width / width;
            let c1 = ((col + 1) * image.width / width).max(c0 + 1);
            sums.iter_mut().for_each(|s| *s = 0);
            for r in r0..r1 {
                for c in c0..c1 {
                    for (p, sum) in sums.iter_mut().enumerate() {
                        *sum += image.get(r, c, p) as u64;
                    }
                }
            }
            let n = ((r1 - r0) * (c1 - c0)) as u64;
            for (p, sum) in sums.iter().enumerate() {
                out.set(row, col, p, ((sum + n / 2) / n) as u16);
            }
        }
    }
    Ok(out)
}

/// Multiplies every sample by `gain`, clipping at the pixel type's maximum.
pub fn apply_gain(image: &mut StageImage, gain: f64) {
    if gain == 1.0 {
        return;
    }
    let max = image.pixel_type.max_value() as f64;
    for v in image.data.iter_mut() {
        *v = (*v as f64 * gain).round().clamp(0.0, max) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::image::PixelType;

    #[test]
    fn downsample_averages_blocks() {
        let img = StageImage::from_data(4, 2, 1, PixelType::U16, vec![0, 2, 4, 6, 2, 4, 6, 8]).unwrap();
        let out = downsample(&img, 2, 1, &Host::default()).unwrap();
        assert_eq!(out.data, vec![2, 6]);
    }

    #[test]
    fn stretch_interpolates_between_rows() {
        let img = StageImage::from_data(1, 2, 1, PixelType::U16, vec![0, 100]).unwrap();
        let out = stretch_rows(&img, 2, &Host::default()).unwrap();
        assert_eq!(out.data, vec![0, 50, 100, 100]);
    }

    #[test]
    fn gain_clips() {
        let mut img = StageImage::from_data(2, 1, 1, PixelType::U16, vec![1000, 40000]).unwrap();
        apply_gain(&mut img, 2.0);
        assert_eq!(img.data, vec![2000, 65535]);
    }
}
