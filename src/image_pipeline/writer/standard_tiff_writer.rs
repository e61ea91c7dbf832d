use std::io::Write;

use tracing::debug;

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::common::image::StageImage;
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::writer::image_writer::ImageWriter;
use crate::image_pipeline::writer::types::{TiffCompression, WriterConfig};

/// Writes the rendered stage 3 image as a plain 16-bit TIFF.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardTiffWriter;

impl StandardTiffWriter {
    pub fn write_image(
        &self,
        image: &StageImage,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()> {
        debug!(
            "Encoding TIFF image: {}x{}x{}",
            image.width, image.height, image.planes
        );

        let mut buffer = Vec::new();

        let compression = match config.tiff_compression {
            TiffCompression::None => tiff::encoder::Compression::Uncompressed,
            TiffCompression::Lzw => tiff::encoder::Compression::Lzw,
            TiffCompression::DeflateFast => tiff::encoder::Compression::Deflate(
                tiff::encoder::compression::DeflateLevel::Fast,
            ),
            TiffCompression::DeflateBalanced => tiff::encoder::Compression::Deflate(
                tiff::encoder::compression::DeflateLevel::Balanced,
            ),
            TiffCompression::DeflateBest => tiff::encoder::Compression::Deflate(
                tiff::encoder::compression::DeflateLevel::Best,
            ),
        };

        let mut encoder = tiff::encoder::TiffEncoder::new(std::io::Cursor::new(&mut buffer))
            .map_err(|e| DngError::Encode(e.to_string()))?
            .with_compression(compression);

        if let Some(predictor_val) = config.tiff_predictor {
            let predictor = match predictor_val {
                2 => tiff::tags::Predictor::Horizontal,
                _ => tiff::tags::Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        let (width, height) = (image.width as u32, image.height as u32);
        match image.planes {
            1 => encoder.write_image::<tiff::encoder::colortype::Gray16>(width, height, &image.data),
            3 => encoder.write_image::<tiff::encoder::colortype::RGB16>(width, height, &image.data),
            planes => {
                return Err(DngError::Encode(format!(
                    "{}-plane image has no TIFF colour type",
                    planes
                )));
            }
        }
        .map_err(|e| DngError::Encode(e.to_string()))?;

        output.write_all(&buffer)?;

        debug!("TIFF encoding complete: {} bytes", buffer.len());
        Ok(())
    }
}

impl ImageWriter for StandardTiffWriter {
    fn needs_stage3(&self, _host: &Host) -> bool {
        true
    }

    /// Exports stage 3 as a 16-bit RGB or grayscale TIFF.
    fn write_negative(
        &self,
        negative: &mut Negative,
        _host: &Host,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()> {
        let _span = tracing::info_span!("write_tiff").entered();
        let image = negative
            .stage3_image()
            .ok_or_else(|| DngError::program("TIFF export needs a stage 3 image"))?;
        self.write_image(image, output, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::image::PixelType;
    use std::io::Cursor;

    fn gradient(planes: usize) -> StageImage {
        let mut image = StageImage::new(6, 4, planes, PixelType::U16);
        for (i, v) in image.data.iter_mut().enumerate() {
            *v = (i * 997 % 65536) as u16;
        }
        image
    }

    fn decode(bytes: Vec<u8>) -> (u32, u32, Vec<u16>) {
        let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes)).unwrap();
        let (w, h) = decoder.dimensions().unwrap();
        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::U16(data) => (w, h, data),
            _ => panic!("expected 16-bit samples"),
        }
    }

    #[test]
    fn rgb_image_is_readable_tiff() {
        let image = gradient(3);
        for compression in [
            TiffCompression::None,
            TiffCompression::Lzw,
            TiffCompression::DeflateBalanced,
        ] {
            let config = WriterConfig::builder().tiff_compression(compression).build();
            let mut out = Vec::new();
            StandardTiffWriter.write_image(&image, &mut out, &config).unwrap();
            let (w, h, data) = decode(out);
            assert_eq!((w, h), (6, 4));
            assert_eq!(data, image.data);
        }
    }

    #[test]
    fn gray_image_is_readable_tiff() {
        let image = gradient(1);
        let mut out = Vec::new();
        StandardTiffWriter
            .write_image(&image, &mut out, &WriterConfig::default())
            .unwrap();
        assert_eq!(decode(out).2, image.data);
    }

    #[test]
    fn four_plane_image_is_rejected() {
        let mut out = Vec::new();
        let result = StandardTiffWriter.write_image(&gradient(4), &mut out, &WriterConfig::default());
        assert!(matches!(result, Err(DngError::Encode(_))));
        assert!(out.is_empty());
    }
}
