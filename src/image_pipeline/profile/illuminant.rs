//! EXIF light-source codes and the colour temperatures DNG assigns to them.

pub const UNKNOWN: u32 = 0;
pub const DAYLIGHT: u32 = 1;
pub const FLUORESCENT: u32 = 2;
pub const TUNGSTEN: u32 = 3;
pub const FLASH: u32 = 4;
pub const FINE_WEATHER: u32 = 9;
pub const CLOUDY_WEATHER: u32 = 10;
pub const SHADE: u32 = 11;
pub const DAYLIGHT_FLUORESCENT: u32 = 12;
pub const DAY_WHITE_FLUORESCENT: u32 = 13;
pub const COOL_WHITE_FLUORESCENT: u32 = 14;
pub const WHITE_FLUORESCENT: u32 = 15;
pub const WARM_WHITE_FLUORESCENT: u32 = 16;
pub const STANDARD_LIGHT_A: u32 = 17;
pub const STANDARD_LIGHT_B: u32 = 18;
pub const STANDARD_LIGHT_C: u32 = 19;
pub const D55: u32 = 20;
pub const D65: u32 = 21;
pub const D75: u32 = 22;
pub const D50: u32 = 23;
pub const ISO_STUDIO_TUNGSTEN: u32 = 24;
pub const OTHER: u32 = 255;

/// Correlated colour temperature in kelvin, or 0 for unknown codes.
pub fn temperature(illuminant: u32) -> f64 {
    match illuminant {
        STANDARD_LIGHT_A | TUNGSTEN => 2850.0,
        ISO_STUDIO_TUNGSTEN => 3200.0,
        D50 => 5000.0,
        D55 | DAYLIGHT | FINE_WEATHER | FLASH | STANDARD_LIGHT_B => 5500.0,
        D65 | STANDARD_LIGHT_C | CLOUDY_WEATHER => 6500.0,
        D75 | SHADE => 7500.0,
        DAYLIGHT_FLUORESCENT => (5700.0 + 7100.0) * 0.5,
        DAY_WHITE_FLUORESCENT => (4600.0 + 5500.0) * 0.5,
        COOL_WHITE_FLUORESCENT | FLUORESCENT => (3800.0 + 4500.0) * 0.5,
        WHITE_FLUORESCENT => (3250.0 + 3800.0) * 0.5,
        WARM_WHITE_FLUORESCENT => (2600.0 + 3250.0) * 0.5,
        _ => 0.0,
    }
}

/// Weight of the first calibration set at colour temperature `temp`.
///
/// Interpolates linearly in inverse temperature between the two
/// illuminants and clamps outside them. Returns 1 when only one set is
/// usable.
pub fn interpolation_weight(temp: f64, illuminant_1: u32, illuminant_2: u32) -> f64 {
    let t1 = temperature(illuminant_1);
    let t2 = temperature(illuminant_2);
    if t1 <= 0.0 || t2 <= 0.0 || t1 == t2 || temp <= 0.0 {
        return 1.0;
    }
    let (low, high, swapped) = if t1 < t2 { (t1, t2, false) } else { (t2, t1, true) };
    let g = if temp <= low {
        1.0
    } else if temp >= high {
        0.0
    } else {
        (1.0 / temp - 1.0 / high) / (1.0 / low - 1.0 / high)
    };
    if swapped { 1.0 - g } else { g }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_follows_inverse_temperature() {
        assert_eq!(interpolation_weight(2000.0, STANDARD_LIGHT_A, D65), 1.0);
        assert_eq!(interpolation_weight(9000.0, STANDARD_LIGHT_A, D65), 0.0);
        let mid = interpolation_weight(4000.0, STANDARD_LIGHT_A, D65);
        assert!(mid > 0.0 && mid < 1.0);
        // Order of the illuminants does not change the meaning of the weight.
        let flipped = interpolation_weight(4000.0, D65, STANDARD_LIGHT_A);
        assert!((mid + flipped - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_illuminant_uses_first_set() {
        assert_eq!(interpolation_weight(5000.0, D65, UNKNOWN), 1.0);
        assert_eq!(interpolation_weight(5000.0, D65, D65), 1.0);
    }
}
