//! TIFF RATIONAL / SRATIONAL values.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct URational {
    pub n: u32,
    pub d: u32,
}

impl URational {
    pub const fn new(n: u32, d: u32) -> Self {
        Self { n, d }
    }

    pub fn is_valid(&self) -> bool {
        self.d != 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.d == 0 {
            0.0
        } else {
            self.n as f64 / self.d as f64
        }
    }

    /// Closest rational with the given denominator.
    pub fn from_f64(value: f64, denominator: u32) -> Self {
        let n = (value.max(0.0) * denominator as f64).round();
        Self::new(n.min(u32::MAX as f64) as u32, denominator)
    }

    /// Picks a denominator that keeps the numerator in range.
    pub fn from_f64_auto(value: f64) -> Self {
        let value = value.max(0.0);
        let mut d: u32 = 1;
        while d < 1_000_000 && value * (d as f64 * 10.0) < u32::MAX as f64 {
            if ((value * d as f64).round() - value * d as f64).abs() < 1e-9 {
                break;
            }
            d *= 10;
        }
        Self::from_f64(value, d)
    }
}

impl fmt::Display for URational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.n, self.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SRational {
    pub n: i32,
    pub d: i32,
}

impl SRational {
    pub const fn new(n: i32, d: i32) -> Self {
        Self { n, d }
    }

    pub fn is_valid(&self) -> bool {
        self.d != 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.d == 0 {
            0.0
        } else {
            self.n as f64 / self.d as f64
        }
    }

    pub fn from_f64(value: f64, denominator: i32) -> Self {
        let n = (value * denominator as f64)
            .round()
            .clamp(i32::MIN as f64, i32::MAX as f64);
        Self::new(n as i32, denominator)
    }
}

impl fmt::Display for SRational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.n, self.d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_reads_as_zero() {
        assert_eq!(URational::new(5, 0).as_f64(), 0.0);
        assert!(!URational::new(5, 0).is_valid());
    }

    #[test]
    fn auto_denominator_is_exact_for_short_decimals() {
        let r = URational::from_f64_auto(0.25);
        assert_eq!(r.as_f64(), 0.25);
        let s = SRational::from_f64(-0.5, 10000);
        assert_eq!(s, SRational::new(-5000, 10000));
    }
}
