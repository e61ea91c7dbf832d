use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dng_negative::image_pipeline::common::geometry::Rect;
use dng_negative::image_pipeline::common::image::{PixelType, StageImage};
use dng_negative::image_pipeline::common::matrix::{Matrix, Vector};
use dng_negative::image_pipeline::common::rational::URational;
use dng_negative::image_pipeline::linearization::LinearizationInfo;
use dng_negative::image_pipeline::ljpeg::{self, EncoderOptions, Predictor};
use dng_negative::image_pipeline::mosaic::MosaicInfo;
use dng_negative::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
use dng_negative::image_pipeline::profile::illuminant::D65;
use dng_negative::image_pipeline::{
    CameraProfile, DngCompression, DngPipeline, DngWriter, Host, HostConfig, Negative,
    WriterConfig,
};
use std::io::Cursor;

fn generate_mosaic(width: usize, height: usize) -> StageImage {
    let mut image = StageImage::new(width, height, 1, PixelType::U16);
    for y in 0..height {
        for x in 0..width {
            let value = 256 + ((x * 7 + y * 13) % 3500);
            image.set(y, x, 0, value as u16);
        }
    }
    image
}

fn generate_dng(width: usize, height: usize, compression: DngCompression) -> Vec<u8> {
    let host = Host::default();
    let mut negative = Negative::new();
    negative.model_name = "Bench Cam".to_string();
    negative.mosaic = Some(
        MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE])
            .expect("bayer pattern"),
    );
    negative.linearization = Some(LinearizationInfo::uniform(
        Rect::from_size(height as u32, width as u32),
        1,
        128.0,
        4095.0,
    ));
    negative.raw_bits = 12;
    negative.default_crop_size_h = URational::new(width as u32, 1);
    negative.default_crop_size_v = URational::new(height as u32, 1);
    negative.set_color_channels(3);
    negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.7]);
    let mut profile = CameraProfile::default();
    profile.calibration_illuminant_1 = D65;
    profile.color_matrix_1 = Matrix::identity(3);
    negative.add_profile(profile);
    negative.finish_parse(&host).expect("valid negative");
    negative
        .set_stage1(generate_mosaic(width, height))
        .expect("stage 1");

    let config = WriterConfig::builder().compression(compression).build();
    DngWriter
        .encode(&mut negative, &host, &config)
        .expect("DNG encode")
}

fn benchmark_codec_predictors(c: &mut Criterion) {
    let mut group = c.benchmark_group("ljpeg_predictors");
    let tile = generate_mosaic(256, 256);

    for predictor in [Predictor::Left, Predictor::Gradient, Predictor::Average] {
        let options = EncoderOptions {
            predictor,
            restart_rows: 0,
        };
        group.bench_with_input(
            BenchmarkId::new("encode", format!("{:?}", predictor)),
            &tile,
            |b, tile| {
                b.iter(|| ljpeg::encode(black_box(&tile.data), 256, 256, 1, 12, &options));
            },
        );

        let encoded = ljpeg::encode(&tile.data, 256, 256, 1, 12, &options).expect("encode");
        group.bench_with_input(
            BenchmarkId::new("decode", format!("{:?}", predictor)),
            &encoded,
            |b, encoded| {
                b.iter(|| ljpeg::decode(black_box(encoded)));
            },
        );
    }

    group.finish();
}

fn benchmark_conversion_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("dng_to_dng_by_size");

    for (width, height, label) in [(128, 128, "128x128"), (512, 512, "512x512")] {
        let dng = generate_dng(width, height, DngCompression::LosslessJpeg);
        group.bench_with_input(BenchmarkId::from_parameter(label), &dng, |b, data| {
            let pipeline = DngPipeline::new(HostConfig::default(), WriterConfig::default());
            b.iter(|| {
                let mut output = Cursor::new(Vec::new());
                let _ = pipeline.convert(black_box(data), &mut output);
            });
        });
    }

    group.finish();
}

fn benchmark_linear_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_dng");
    let dng = generate_dng(256, 256, DngCompression::None);

    for (compression, label) in [
        (DngCompression::None, "uncompressed"),
        (DngCompression::LosslessJpeg, "lossless_jpeg"),
    ] {
        group.bench_function(label, |b| {
            let pipeline = DngPipeline::new(
                HostConfig::builder().save_linear_dng(true).build(),
                WriterConfig::builder().compression(compression).build(),
            );
            b.iter(|| {
                let mut output = Cursor::new(Vec::new());
                let _ = pipeline.convert(black_box(&dng), &mut output);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_codec_predictors,
    benchmark_conversion_sizes,
    benchmark_linear_rendering
);
criterion_main!(benches);
