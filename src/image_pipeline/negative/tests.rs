use super::*;
use crate::image_pipeline::common::error::DngError;
use crate::image_pipeline::common::geometry::Rect;
use crate::image_pipeline::common::host::{DNG_VERSION_1_4, Host, HostConfig};
use crate::image_pipeline::common::image::{PixelType, StageImage};
use crate::image_pipeline::common::matrix::{Matrix, Vector};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::fingerprint::Fingerprint;
use crate::image_pipeline::linearization::LinearizationInfo;
use crate::image_pipeline::mosaic::MosaicInfo;
use crate::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
use crate::image_pipeline::profile::CameraProfile;

const LEVELS: [u16; 3] = [1000, 2000, 3000];

fn rgb_profile() -> CameraProfile {
    let mut profile = CameraProfile::default();
    profile.calibration_illuminant_1 = crate::image_pipeline::profile::illuminant::D65;
    profile.color_matrix_1 = Matrix::identity(3);
    profile
}

fn bayer_negative(host: &Host) -> Negative {
    let mut negative = Negative::new();
    negative.model_name = "Synthetic Bayer".to_string();
    negative.mosaic = Some(
        MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap(),
    );
    negative.linearization = Some(LinearizationInfo::uniform(
        Rect::from_size(8, 8),
        1,
        0.0,
        65535.0,
    ));
    negative.default_crop_size_h = URational::new(8, 1);
    negative.default_crop_size_v = URational::new(8, 1);
    negative.set_color_channels(3);
    negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.7]);
    negative.add_profile(rgb_profile());
    negative.finish_parse(host).unwrap();
    negative
}

fn flat_mosaic() -> StageImage {
    let mut image = StageImage::new(8, 8, 1, PixelType::U16);
    for r in 0..8 {
        for c in 0..8 {
            let plane = match (r % 2, c % 2) {
                (0, 0) => 0,
                (1, 1) => 2,
                _ => 1,
            };
            image.set(r, c, 0, LEVELS[plane]);
        }
    }
    image
}

/// Stage 1 holding every colour at every site, flat at `LEVELS`.
fn full_color_stage1() -> StageImage {
    let mut image = StageImage::new(8, 8, 3, PixelType::U16);
    for pixel in image.data.chunks_mut(3) {
        pixel.copy_from_slice(&LEVELS);
    }
    image
}

fn full_color_negative(host: &Host, mosaic: bool, baseline_exposure: SRational) -> Negative {
    let mut negative = Negative::new();
    negative.model_name = "Synthetic Full Colour".to_string();
    if mosaic {
        negative.mosaic = Some(
            MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE])
                .unwrap(),
        );
    }
    negative.linearization = Some(LinearizationInfo::uniform(
        Rect::from_size(8, 8),
        3,
        0.0,
        65535.0,
    ));
    negative.default_crop_size_h = URational::new(8, 1);
    negative.default_crop_size_v = URational::new(8, 1);
    negative.baseline_exposure = baseline_exposure;
    negative.set_color_channels(3);
    negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.7]);
    negative.add_profile(rgb_profile());
    negative.finish_parse(host).unwrap();
    negative.set_stage1(full_color_stage1()).unwrap();
    negative
}

fn with_stage1(host: &Host) -> Negative {
    let mut negative = bayer_negative(host);
    negative.set_stage1(flat_mosaic()).unwrap();
    negative
}

#[test]
fn bayer_mosaic_builds_three_plane_stage3() {
    let host = Host::default();
    let mut negative = with_stage1(&host);

    negative.build_stage2(&host).unwrap();
    assert!(negative.stage1_image().is_none());
    assert_eq!(negative.state(), NegativeState::Stage2Built);

    negative.build_stage3(&host).unwrap();
    assert!(negative.stage2_image().is_none());
    let stage3 = negative.stage3_image().unwrap();
    assert_eq!((stage3.width, stage3.height, stage3.planes), (8, 8, 3));
    assert_eq!(stage3.get(4, 4, 1), LEVELS[1]);
    assert_eq!(negative.raw_to_full_scale(), (1.0, 1.0));
    assert_eq!(negative.stage3_gain(), 1.0);
}

#[test]
fn bayer_interpolation_ignores_baseline_exposure() {
    let host = Host::default();
    let mut negative = bayer_negative(&host);
    negative.baseline_exposure = SRational::new(1, 1);
    negative.set_stage1(flat_mosaic()).unwrap();

    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();

    let stage3 = negative.stage3_image().unwrap();
    for (plane, &level) in LEVELS.iter().enumerate() {
        assert_eq!(stage3.get(4, 4, plane), level, "plane {}", plane);
    }
    assert_eq!(negative.stage3_gain(), 1.0);
}

#[test]
fn merged_planes_take_baseline_exposure_gain() {
    let host = Host::default();
    let mut negative = full_color_negative(&host, true, SRational::new(1, 1));
    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();

    let stage3 = negative.stage3_image().unwrap();
    assert_eq!(stage3.planes, 3);
    assert_eq!(negative.stage3_gain(), 2.0);
    for (plane, &level) in LEVELS.iter().enumerate() {
        assert_eq!(stage3.get(3, 5, plane), level * 2);
    }
}

#[test]
fn selected_plane_of_merge_has_no_gain() {
    let host = Host::new(HostConfig::builder().source_plane(Some(1)).build());
    let mut negative = full_color_negative(&host, true, SRational::new(1, 1));
    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();

    let stage3 = negative.stage3_image().unwrap();
    assert_eq!(stage3.planes, 1);
    assert!(stage3.data.iter().all(|&v| v == LEVELS[1]));
    assert_eq!(negative.stage3_gain(), 1.0);
}

#[test]
fn stage3_without_mosaic_is_stage2_unchanged() {
    let host = Host::new(HostConfig::builder().maximum_size(4).build());
    let mut negative = full_color_negative(&host, false, SRational::new(1, 1));
    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();

    let stage3 = negative.stage3_image().unwrap();
    assert_eq!(stage3.data, full_color_stage1().data);
    assert_eq!(negative.raw_to_full_scale(), (1.0, 1.0));
    assert_eq!(negative.stage3_gain(), 1.0);
}

#[test]
fn four_color_request_duplicates_green_channel() {
    let host = Host::new(HostConfig::builder().four_color_bayer(true).build());
    let mut negative = with_stage1(&host);

    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();

    let stage3 = negative.stage3_image().unwrap();
    assert_eq!((stage3.width, stage3.height, stage3.planes), (8, 8, 4));
    assert_eq!(negative.color_channels(), 4);
    assert_eq!(negative.camera_neutral.values(), &[0.5, 1.0, 0.7, 1.0]);
    assert!(negative.mosaic.as_ref().unwrap().is_four_color_bayer());
    let profile = negative.profiles().get(0).unwrap();
    assert_eq!(profile.color_matrix_1.rows(), 4);
    assert_eq!(profile.color_matrix_1.row(3), profile.color_matrix_1.row(1));
}

#[test]
fn invalid_color_matrix_is_fatal() {
    let host = Host::default();
    let mut negative = Negative::new();
    negative.set_color_channels(3);
    let mut profile = CameraProfile::default();
    profile.color_matrix_1 = Matrix::new(2, 3);
    negative.add_profile(profile);
    let err = negative.finish_parse(&host).unwrap_err();
    assert!(matches!(err, DngError::BadFormat(_)));
    assert_eq!(negative.state(), NegativeState::Created);
}

#[test]
fn monochrome_needs_no_color_matrix() {
    let host = Host::default();
    let mut negative = Negative::new();
    negative.set_color_channels(1);
    negative.add_profile(CameraProfile::default());
    negative.finish_parse(&host).unwrap();
    assert!(negative.is_monochrome());
}

#[test]
fn output_referred_white_is_d50() {
    let host = Host::default();
    let mut negative = Negative::new();
    negative.set_color_channels(3);
    negative.colorimetric_reference = COLORIMETRIC_REFERENCE_ICC_PCS;
    negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.7]);
    negative.add_profile(rgb_profile());
    negative.finish_parse(&host).unwrap();
    assert!(!negative.has_camera_neutral());
    assert_eq!(negative.camera_white_xy, Some(D50_XY));
}

#[test]
fn wrong_length_neutral_is_dropped() {
    let host = Host::default();
    let mut negative = Negative::new();
    negative.set_color_channels(3);
    negative.camera_neutral = Vector::from_slice(&[0.5, 1.0]);
    negative.camera_white_xy = Some((0.31, 0.33));
    negative.add_profile(rgb_profile());
    negative.finish_parse(&host).unwrap();
    assert!(!negative.has_camera_neutral());
    assert_eq!(negative.camera_white_xy, Some((0.31, 0.33)));
}

#[test]
fn stages_must_run_in_order() {
    let host = Host::default();
    let mut negative = bayer_negative(&host);
    assert!(negative.build_stage3(&host).is_err());
    assert!(negative.build_stage2(&host).is_err());
    assert!(negative.finalize().is_err());
}

#[test]
fn flipped_pixel_marks_negative_damaged() {
    let host = Host::default();
    let mut negative = with_stage1(&host);
    let digest = negative.compute_raw_image_digest(&host).unwrap();
    negative.set_new_raw_image_digest(digest);
    assert!(negative.validate_raw_image_digest(&host).unwrap());
    assert!(!negative.is_damaged());

    negative.stage1_image_mut().unwrap().data[10] ^= 0x0100;
    assert!(!negative.validate_raw_image_digest(&host).unwrap());
    assert!(negative.is_damaged());
}

#[test]
fn legacy_digest_corruptions_are_tolerated() {
    let host = Host::default();
    let mut negative = with_stage1(&host);
    let computed = legacy_image_digest(negative.stage1_image().unwrap(), &host).unwrap();

    let mut damaged_word = *computed.as_bytes();
    damaged_word[0] ^= 0xFF;
    negative.set_raw_image_digest(Fingerprint::from_bytes(damaged_word));
    assert!(negative.validate_raw_image_digest(&host).unwrap());

    let mut sentinel = [0x42; 16];
    sentinel[..4].copy_from_slice(&[0x08, 0x00, 0x00, 0x00]);
    negative.set_raw_image_digest(Fingerprint::from_bytes(sentinel));
    assert!(negative.validate_raw_image_digest(&host).unwrap());
    assert!(!negative.is_damaged());

    let mut tail = *computed.as_bytes();
    tail[12] ^= 0x01;
    negative.set_raw_image_digest(Fingerprint::from_bytes(tail));
    assert!(!negative.validate_raw_image_digest(&host).unwrap());
    assert!(negative.is_damaged());
}

#[test]
fn eight_bit_samples_digest_like_sixteen_bit() {
    let host = Host::default();
    let narrow = StageImage::from_data(2, 1, 1, PixelType::U8, vec![7, 200]).unwrap();
    let wide = StageImage::from_data(2, 1, 1, PixelType::U16, vec![7, 200]).unwrap();
    assert_eq!(
        image_digest(&narrow, &host).unwrap(),
        image_digest(&wide, &host).unwrap()
    );
    assert_ne!(
        legacy_image_digest(&narrow, &host).unwrap(),
        legacy_image_digest(&wide, &host).unwrap()
    );
}

#[test]
fn unique_id_tracks_crop_but_not_raw_digest() {
    let host = Host::default();
    let mut negative = with_stage1(&host);
    let id = negative.find_raw_data_unique_id(&host).unwrap();
    let raw = negative.new_raw_image_digest();
    assert!(id.is_valid());
    assert_eq!(negative.find_raw_data_unique_id(&host).unwrap(), id);

    negative.default_crop_origin_h = URational::new(2, 1);
    let recomputed = negative.compute_raw_data_unique_id(&host).unwrap();
    assert_ne!(recomputed, id);
    assert_eq!(negative.new_raw_image_digest(), raw);
}

#[test]
fn uniform_black_grid_is_exact() {
    let mut info = LinearizationInfo::uniform(Rect::from_size(4, 4), 1, 0.0, 4095.0);
    info.black_level_repeat_rows = 2;
    info.black_level_repeat_cols = 2;
    info.black_level = vec![64.0; 4];
    for r in 0..4 {
        for c in 0..4 {
            assert_eq!(info.black_level_at(r, c, 0), 64.0);
        }
    }
}

#[test]
fn raw_copy_is_kept_before_opcodes_for_raw_saves() {
    let host = Host::new(HostConfig::builder().save_dng_version(DNG_VERSION_1_4).build());
    let mut negative = with_stage1(&host);
    negative.build_stage2(&host).unwrap();
    assert_eq!(negative.raw_image_stage(), RawImageStage::PreOpcode1);
    assert_eq!(negative.raw_image().unwrap().data, flat_mosaic().data);
}

#[test]
fn always_apply_opcodes_force_post_opcode_copy() {
    let host = Host::new(HostConfig::builder().save_dng_version(DNG_VERSION_1_4).build());
    let mut negative = with_stage1(&host);
    negative.opcode_list_1.set_always_apply();
    negative.build_stage2(&host).unwrap();
    assert_eq!(negative.raw_image_stage(), RawImageStage::PostOpcode1);
    assert!(negative.raw_opcode_list_1().is_empty());
    assert!(negative.raw_image().is_some());
}

#[test]
fn linear_saves_and_renders_keep_no_raw_copy() {
    let linear = HostConfig::builder()
        .save_dng_version(DNG_VERSION_1_4)
        .save_linear_dng(true)
        .build();
    for host in [Host::default(), Host::new(linear)] {
        for always_apply in [false, true] {
            let mut negative = with_stage1(&host);
            if always_apply {
                negative.opcode_list_1.set_always_apply();
            }
            negative.build_stage2(&host).unwrap();
            assert_eq!(negative.raw_image_stage(), RawImageStage::None);
            assert!(negative.raw_image().is_none());
        }
    }
}

#[test]
fn abort_unwinds_stage_building() {
    let host = Host::default();
    let mut negative = with_stage1(&host);
    host.request_abort();
    let err = negative.build_stage2(&host).unwrap_err();
    assert!(matches!(err, DngError::UserCanceled));
}

#[test]
fn maximum_size_downsamples_stage3() {
    let host = Host::new(HostConfig::builder().maximum_size(4).build());
    let mut negative = with_stage1(&host);
    negative.build_stage2(&host).unwrap();
    negative.build_stage3(&host).unwrap();
    let stage3 = negative.stage3_image().unwrap();
    assert_eq!((stage3.width, stage3.height), (4, 4));
    assert_eq!(negative.raw_to_full_scale(), (0.5, 0.5));
}
