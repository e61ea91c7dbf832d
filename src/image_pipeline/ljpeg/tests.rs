use super::*;
use crate::image_pipeline::common::error::DngError;

/// Deterministic pseudo-random samples below `1 << precision`, with smooth
/// structure so most differences are small.
fn synthetic_samples(width: usize, height: usize, components: usize, precision: u8) -> Vec<u16> {
    let mask = (1u32 << precision) - 1;
    let mut state = 0x1234_5678u32;
    let mut samples = Vec::with_capacity(width * height * components);
    for row in 0..height {
        for col in 0..width {
            for k in 0..components {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let ramp = (row * 37 + col * 11 + k * 500) as u32;
                let noise = (state >> 24) & 0x3F;
                samples.push(((ramp * 13 + noise) & mask) as u16);
            }
        }
    }
    samples
}

fn find_marker(data: &[u8], code: u8) -> usize {
    data.windows(2)
        .position(|w| w[0] == 0xFF && w[1] == code)
        .expect("marker present")
}

#[test]
fn round_trip_every_predictor_and_restart_interval() {
    let (width, height) = (13, 11);
    for components in [1, 2, 4] {
        let samples = synthetic_samples(width, height, components, 12);
        for predictor in Predictor::ALL {
            for restart_rows in [0, 1, 3, 11] {
                let options = EncoderOptions {
                    predictor,
                    restart_rows,
                };
                let encoded = encode(&samples, width, height, components, 12, &options).unwrap();
                let decoded = decode(&encoded).unwrap();
                assert_eq!(
                    decoded.samples, samples,
                    "predictor {:?}, restart rows {}, {} components",
                    predictor, restart_rows, components
                );
                assert_eq!(decoded.width, width);
                assert_eq!(decoded.height, height);
                assert_eq!(decoded.components, components);
                assert_eq!(decoded.precision, 12);
            }
        }
    }
}

#[test]
fn round_trip_full_range_sixteen_bit_data() {
    // Alternating extremes force category 16 and 15-bit differences.
    let width = 8;
    let height = 6;
    let samples: Vec<u16> = (0..width * height)
        .map(|i| match i % 4 {
            0 => 0,
            1 => 32768,
            2 => 65535,
            _ => 1,
        })
        .collect();
    for predictor in Predictor::ALL {
        let options = EncoderOptions {
            predictor,
            restart_rows: 2,
        };
        let encoded = encode(&samples, width, height, 1, 16, &options).unwrap();
        assert_eq!(decode(&encoded).unwrap().samples, samples, "{:?}", predictor);
    }
}

#[test]
fn round_trip_low_precision_and_single_pixel() {
    let samples = vec![3u16];
    let encoded = encode(&samples, 1, 1, 1, 2, &EncoderOptions::default()).unwrap();
    assert_eq!(decode(&encoded).unwrap().samples, samples);

    let samples = synthetic_samples(64, 3, 1, 8);
    let encoded = encode(&samples, 64, 3, 1, 8, &EncoderOptions::default()).unwrap();
    assert_eq!(decode(&encoded).unwrap().samples, samples);
}

#[test]
fn flat_image_compresses() {
    let samples = vec![1000u16; 64 * 64];
    let encoded = encode(&samples, 64, 64, 1, 14, &EncoderOptions::default()).unwrap();
    assert!(encoded.len() < samples.len() / 4);
    assert_eq!(decode(&encoded).unwrap().samples, samples);
}

#[test]
fn restart_interval_must_cover_whole_rows() {
    let samples = synthetic_samples(6, 4, 1, 10);
    let options = EncoderOptions {
        predictor: Predictor::Left,
        restart_rows: 2,
    };
    let mut encoded = encode(&samples, 6, 4, 1, 10, &options).unwrap();
    let dri = find_marker(&encoded, 0xDD);
    // Interval 12 -> 7 pixels.
    encoded[dri + 5] = 7;
    assert!(matches!(decode(&encoded), Err(DngError::BadFormat(_))));
}

#[test]
fn point_transform_is_rejected() {
    let samples = synthetic_samples(4, 4, 1, 12);
    let mut encoded = encode(&samples, 4, 4, 1, 12, &EncoderOptions::default()).unwrap();
    let sos = find_marker(&encoded, 0xDA);
    // FF DA len(2) Ns (Cs,Td) Ss Se AhAl
    encoded[sos + 9] = 0x01;
    assert!(matches!(decode(&encoded), Err(DngError::BadFormat(_))));
}

#[test]
fn missing_soi_is_rejected() {
    assert!(matches!(decode(&[0x00, 0x01, 0x02]), Err(DngError::BadFormat(_))));
}

#[test]
fn truncated_entropy_data_fails() {
    let samples = synthetic_samples(32, 32, 1, 12);
    let encoded = encode(&samples, 32, 32, 1, 12, &EncoderOptions::default()).unwrap();
    let sos = find_marker(&encoded, 0xDA);
    let truncated = &encoded[..sos + 10 + 20];
    assert!(decode(truncated).is_err());
}

#[test]
fn app_segments_are_skipped() {
    let samples = synthetic_samples(5, 5, 1, 12);
    let encoded = encode(&samples, 5, 5, 1, 12, &EncoderOptions::default()).unwrap();
    let mut with_app = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x05, b'a', b'b', b'c'];
    with_app.extend_from_slice(&encoded[2..]);
    assert_eq!(decode(&with_app).unwrap().samples, samples);
}
