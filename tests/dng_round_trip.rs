use std::io::Cursor;

use dng_negative::image_pipeline::common::geometry::Rect;
use dng_negative::image_pipeline::common::image::{PixelType, StageImage};
use dng_negative::image_pipeline::common::matrix::{Matrix, Vector};
use dng_negative::image_pipeline::common::rational::{SRational, URational};
use dng_negative::image_pipeline::conversions::GpsPosition;
use dng_negative::image_pipeline::linearization::LinearizationInfo;
use dng_negative::image_pipeline::mosaic::MosaicInfo;
use dng_negative::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
use dng_negative::image_pipeline::profile::illuminant::D65;
use dng_negative::image_pipeline::{
    AutoReader, CameraProfile, DngCompression, DngError, DngPipeline, DngReader, DngWriter, Host,
    HostConfig, ImageWriter, InMemoryMetadataStore, MetadataStore, Negative, RawImageReader,
    StandardTiffWriter, WriterConfig,
};

const WIDTH: usize = 32;
const HEIGHT: usize = 24;

fn mosaic() -> StageImage {
    let mut image = StageImage::new(WIDTH, HEIGHT, 1, PixelType::U16);
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            let base = match (row % 2, col % 2) {
                (0, 0) => 900,
                (1, 1) => 600,
                _ => 1500,
            };
            image.set(row, col, 0, (base + row * 7 + col * 3) as u16);
        }
    }
    image
}

fn camera_negative(host: &Host) -> Negative {
    let mut negative = Negative::new();
    negative.model_name = "Integration Cam".to_string();
    negative.mosaic = Some(
        MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap(),
    );
    negative.linearization = Some(LinearizationInfo::uniform(
        Rect::from_size(HEIGHT as u32, WIDTH as u32),
        1,
        64.0,
        4095.0,
    ));
    negative.raw_bits = 12;
    negative.default_crop_origin_h = URational::new(2, 1);
    negative.default_crop_origin_v = URational::new(2, 1);
    negative.default_crop_size_h = URational::new(WIDTH as u32 - 4, 1);
    negative.default_crop_size_v = URational::new(HEIGHT as u32 - 4, 1);
    negative.set_color_channels(3);
    negative.camera_neutral = Vector::from_slice(&[0.45, 1.0, 0.6]);
    negative.exif.make = "Integration".to_string();
    negative.exif.model = "Cam".to_string();
    negative.exif.f_number = URational::new(28, 10);
    negative.baseline_exposure = SRational::new(1, 2);

    let mut profile = CameraProfile::default();
    profile.name = "Embedded".to_string();
    profile.calibration_illuminant_1 = D65;
    profile.color_matrix_1 = Matrix::from_rows(&[
        &[0.9, -0.2, -0.1],
        &[-0.3, 1.2, 0.1],
        &[-0.05, 0.15, 0.7],
    ]);
    negative.add_profile(profile);
    negative.finish_parse(host).unwrap();
    negative.set_stage1(mosaic()).unwrap();
    negative
}

/// A stage 1 sample after black subtraction and scaling to 16 bits.
fn linearized(row: usize, col: usize) -> u16 {
    let raw = mosaic().get(row, col, 0) as f64;
    ((raw - 64.0) * 65535.0 / (4095.0 - 64.0)).round() as u16
}

fn write_dng(config: &WriterConfig) -> Vec<u8> {
    let host = Host::default();
    let mut negative = camera_negative(&host);
    let mut out = Vec::new();
    DngWriter
        .write_negative(&mut negative, &host, &mut out, config)
        .unwrap();
    out
}

#[test]
fn written_dng_reads_back_bit_exact() {
    for compression in [DngCompression::None, DngCompression::LosslessJpeg] {
        let config = WriterConfig::builder().compression(compression).build();
        let dng = write_dng(&config);

        let host = Host::default();
        let negative = DngReader.read_negative(&dng, &host).unwrap();
        assert_eq!(negative.stage1_image().unwrap().data, mosaic().data);
        assert_eq!(negative.model_name, "Integration Cam");
        assert_eq!(negative.exif.make, "Integration");
        assert_eq!(negative.default_crop_origin_h.as_f64(), 2.0);
        assert_eq!(negative.default_crop_size_v.as_f64(), (HEIGHT - 4) as f64);
        assert!(!negative.is_damaged());
    }
}

#[test]
fn corrupted_pixel_marks_negative_damaged() {
    let config = WriterConfig::builder()
        .compression(DngCompression::None)
        .tile_size(None)
        .build();
    let mut dng = write_dng(&config);
    let last = dng.len() - 1;
    dng[last] ^= 0x01;

    let negative = AutoReader.read_negative(&dng, &Host::default()).unwrap();
    assert!(negative.is_damaged());
}

#[test]
fn file_conversion_to_linear_dng() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.dng");
    let output = dir.path().join("linear.dng");
    std::fs::write(&input, write_dng(&WriterConfig::default())).unwrap();

    let pipeline = DngPipeline::new(
        HostConfig::builder().save_linear_dng(true).build(),
        WriterConfig::default(),
    );
    let timings = pipeline.convert_file_with_timings(&input, &output).unwrap();
    assert!(timings.get_step("build_stage3").is_some());
    assert!(timings.get_step("write_output_file").is_some());

    let linear = std::fs::read(&output).unwrap();
    let negative = AutoReader.read_negative(&linear, &Host::default()).unwrap();
    assert!(negative.mosaic.is_none());
    let stage1 = negative.stage1_image().unwrap();
    assert_eq!((stage1.width, stage1.height, stage1.planes), (WIDTH, HEIGHT, 3));
    assert_eq!(negative.model_name, "Integration Cam");

    // Each site keeps its own measured colour, with no exposure gain.
    assert_eq!(stage1.get(2, 2, 0), linearized(2, 2));
    assert_eq!(stage1.get(2, 3, 1), linearized(2, 3));
    assert_eq!(stage1.get(3, 3, 2), linearized(3, 3));
    assert!(stage1.data.iter().all(|&v| v < u16::MAX));
    assert_eq!(negative.baseline_exposure.as_f64(), 0.5);
}

#[test]
fn tiff_export_of_a_dng() {
    let dng = write_dng(&WriterConfig::default());
    let pipeline = DngPipeline::with_custom(
        AutoReader,
        StandardTiffWriter,
        Host::default(),
        WriterConfig::default(),
    );
    let mut out = Vec::new();
    pipeline.convert(&dng, &mut out).unwrap();

    let mut decoder = tiff::decoder::Decoder::new(Cursor::new(out)).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (WIDTH as u32, HEIGHT as u32));
    match decoder.read_image().unwrap() {
        tiff::decoder::DecodingResult::U16(data) => assert_eq!(data.len(), WIDTH * HEIGHT * 3),
        _ => panic!("expected 16-bit RGB"),
    }
}

#[test]
fn catalogue_metadata_is_embedded() {
    let dng = write_dng(&WriterConfig::default());
    let mut store = InMemoryMetadataStore::new();
    store.set_comment(5, "Picked").unwrap();
    store.set_copyright(5, "(c) Archive").unwrap();
    store
        .set_gps_position(
            5,
            GpsPosition {
                latitude: 51.5,
                longitude: -0.125,
                altitude: Some(11.0),
            },
        )
        .unwrap();

    let pipeline = DngPipeline::new(HostConfig::default(), WriterConfig::default());
    let mut out = Vec::new();
    pipeline
        .convert_with_metadata(&dng, &mut out, &mut store, 5)
        .unwrap();

    let negative = AutoReader.read_negative(&out, &Host::default()).unwrap();
    assert_eq!(negative.exif.user_comment, "Picked");
    assert_eq!(negative.exif.copyright, "(c) Archive");
    let longitude = negative.exif.gps.longitude_degrees().unwrap();
    assert!((longitude + 0.125).abs() < 1e-4);
}

#[test]
fn truncated_file_is_an_error() {
    let dng = write_dng(&WriterConfig::default());
    let pipeline = DngPipeline::new(HostConfig::default(), WriterConfig::default());
    let mut out = Vec::new();
    let err = pipeline.convert(&dng[..dng.len() / 2], &mut out).unwrap_err();
    assert!(!matches!(err, DngError::UserCanceled));
    assert!(out.is_empty());
}
