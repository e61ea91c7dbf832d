//! Profile tone curve: a monotone list of `(x, y)` points on `[0, 1]`.

#[derive(Debug, Clone, PartialEq)]
pub struct ToneCurve {
    points: Vec<(f64, f64)>,
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::null()
    }
}

impl ToneCurve {
    /// The identity curve.
    pub fn null() -> Self {
        Self {
            points: vec![(0.0, 0.0), (1.0, 1.0)],
        }
    }

    pub fn from_points(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Builds a curve from flattened `x, y` pairs as stored in the tag.
    pub fn from_flat(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::null();
        }
        Self {
            points: values
                .chunks_exact(2)
                .map(|p| (p[0] as f64, p[1] as f64))
                .collect(),
        }
    }

    pub fn to_flat(&self) -> Vec<f32> {
        self.points
            .iter()
            .flat_map(|&(x, y)| [x as f32, y as f32])
            .collect()
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn is_null(&self) -> bool {
        self.points == [(0.0, 0.0), (1.0, 1.0)]
    }

    /// Starts at (0, 0), ends at (1, 1), x strictly increasing, y within range.
    pub fn is_valid(&self) -> bool {
        if self.points.len() < 2 {
            return false;
        }
        if self.points.first() != Some(&(0.0, 0.0)) || self.points.last() != Some(&(1.0, 1.0)) {
            return false;
        }
        self.points.windows(2).all(|w| w[1].0 > w[0].0)
            && self.points.iter().all(|&(_, y)| (0.0..=1.0).contains(&y))
    }

    /// Piecewise linear evaluation, clamped to the curve ends.
    pub fn evaluate(&self, x: f64) -> f64 {
        let Some(&(first_x, first_y)) = self.points.first() else {
            return x;
        };
        if x <= first_x {
            return first_y;
        }
        for w in self.points.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x <= x1 {
                let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
                return y0 + t * (y1 - y0);
            }
        }
        self.points.last().map(|&(_, y)| y).unwrap_or(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_curve_is_identity() {
        let curve = ToneCurve::from_flat(&[]);
        assert!(curve.is_null());
        assert!(curve.is_valid());
        assert_eq!(curve.evaluate(0.3), 0.3);
    }

    #[test]
    fn evaluates_between_points() {
        let curve = ToneCurve::from_flat(&[0.0, 0.0, 0.5, 0.25, 1.0, 1.0]);
        assert!(curve.is_valid());
        assert_eq!(curve.evaluate(0.25), 0.125);
        assert_eq!(curve.evaluate(0.75), 0.625);
    }

    #[test]
    fn non_monotone_curve_is_invalid() {
        let curve = ToneCurve::from_flat(&[0.0, 0.0, 0.6, 0.5, 0.4, 0.6, 1.0, 1.0]);
        assert!(!curve.is_valid());
    }
}
