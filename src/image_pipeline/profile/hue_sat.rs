//! Hue/saturation/value delta tables (`ProfileHueSatMap*`, `ProfileLookTable*`).

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::tags::profile_info::{TableDims, table_counts};

pub const ENCODING_LINEAR: u32 = 0;
pub const ENCODING_SRGB: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueSatDelta {
    /// Degrees.
    pub hue_shift: f32,
    pub sat_scale: f32,
    pub val_scale: f32,
}

impl HueSatDelta {
    pub const IDENTITY: HueSatDelta = HueSatDelta {
        hue_shift: 0.0,
        sat_scale: 1.0,
        val_scale: 1.0,
    };
}

/// Deltas indexed by `(hue, sat, val)`; sat varies fastest, then hue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HueSatMap {
    hues: u32,
    sats: u32,
    vals: u32,
    deltas: Vec<HueSatDelta>,
}

impl HueSatMap {
    /// Identity map with the given divisions.
    pub fn new(hues: u32, sats: u32, vals: u32) -> Self {
        let vals = vals.max(1);
        Self {
            hues,
            sats,
            vals,
            deltas: vec![HueSatDelta::IDENTITY; (hues * sats * vals) as usize],
        }
    }

    /// Builds a map from stored float triples.
    ///
    /// When the entry count matches the dimensions with the sat = 0 column
    /// left out, those entries stay at identity.
    pub fn from_table(dims: TableDims, data: &[f32]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        let (hues, sats, vals) = dims;
        let (full, skipped) = table_counts(dims);
        let skip_sat0 = data.len() as u32 != full;
        if skip_sat0 && data.len() as u32 != skipped {
            return Err(DngError::bad_format(format!(
                "{} table entries for {}x{}x{} map",
                data.len(),
                hues,
                sats,
                vals
            )));
        }

        let mut map = Self::new(hues, sats, vals);
        let first_sat = u32::from(skip_sat0);
        let mut triples = data.chunks_exact(3);
        for val in 0..vals {
            for hue in 0..hues {
                for sat in first_sat..sats {
                    let t = triples
                        .next()
                        .ok_or_else(|| DngError::bad_format("short hue/sat table"))?;
                    map.set_delta(
                        hue,
                        sat,
                        val,
                        HueSatDelta {
                            hue_shift: t[0],
                            sat_scale: t[1],
                            val_scale: t[2],
                        },
                    );
                }
            }
        }
        Ok(map)
    }

    /// Float triples covering every division, sat = 0 included.
    pub fn to_table(&self) -> Vec<f32> {
        self.deltas
            .iter()
            .flat_map(|d| [d.hue_shift, d.sat_scale, d.val_scale])
            .collect()
    }

    pub fn dims(&self) -> TableDims {
        (self.hues, self.sats, self.vals)
    }

    pub fn is_valid(&self) -> bool {
        self.hues > 0
            && self.sats > 1
            && self.vals > 0
            && self.deltas.len() == (self.hues * self.sats * self.vals) as usize
    }

    pub fn is_identity(&self) -> bool {
        self.deltas.iter().all(|d| *d == HueSatDelta::IDENTITY)
    }

    fn index(&self, hue: u32, sat: u32, val: u32) -> usize {
        ((val * self.hues + hue) * self.sats + sat) as usize
    }

    pub fn delta(&self, hue: u32, sat: u32, val: u32) -> HueSatDelta {
        self.deltas[self.index(hue, sat, val)]
    }

    pub fn set_delta(&mut self, hue: u32, sat: u32, val: u32, delta: HueSatDelta) {
        let i = self.index(hue, sat, val);
        self.deltas[i] = delta;
    }

    /// Blends two maps: `weight1 * map1 + (1 - weight1) * map2`.
    pub fn interpolate(map1: &HueSatMap, map2: &HueSatMap, weight1: f64) -> Result<HueSatMap> {
        if weight1 >= 1.0 || !map2.is_valid() {
            return Ok(map1.clone());
        }
        if weight1 <= 0.0 || !map1.is_valid() {
            return Ok(map2.clone());
        }
        if map1.dims() != map2.dims() {
            return Err(DngError::program(format!(
                "cannot interpolate {:?} and {:?} maps",
                map1.dims(),
                map2.dims()
            )));
        }
        let w1 = weight1 as f32;
        let w2 = 1.0 - w1;
        let deltas = map1
            .deltas
            .iter()
            .zip(&map2.deltas)
            .map(|(a, b)| HueSatDelta {
                hue_shift: w1 * a.hue_shift + w2 * b.hue_shift,
                sat_scale: w1 * a.sat_scale + w2 * b.sat_scale,
                val_scale: w1 * a.val_scale + w2 * b.val_scale,
            })
            .collect();
        Ok(HueSatMap {
            deltas,
            ..map1.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(dims: TableDims, skip_sat0: bool, value: f32) -> Vec<f32> {
        let (h, s, v) = dims;
        let sats = if skip_sat0 { s - 1 } else { s };
        (0..h * sats * v).flat_map(|_| [value, 1.0, 1.0]).collect()
    }

    #[test]
    fn missing_sat_zero_column_stays_identity() {
        let dims = (4, 3, 1);
        let map = HueSatMap::from_table(dims, &table(dims, true, 5.0)).unwrap();
        assert!(map.is_valid());
        for hue in 0..4 {
            assert_eq!(map.delta(hue, 0, 0), HueSatDelta::IDENTITY);
            assert_eq!(map.delta(hue, 1, 0).hue_shift, 5.0);
            assert_eq!(map.delta(hue, 2, 0).hue_shift, 5.0);
        }
    }

    #[test]
    fn full_table_round_trips() {
        let dims = (3, 2, 2);
        let data = table(dims, false, 2.5);
        let map = HueSatMap::from_table(dims, &data).unwrap();
        assert_eq!(map.to_table(), data);
        assert!(!map.is_identity());
    }

    #[test]
    fn wrong_count_is_rejected() {
        assert!(HueSatMap::from_table((3, 3, 1), &[0.0; 6]).is_err());
    }

    #[test]
    fn interpolation_blends_linearly() {
        let dims = (2, 2, 1);
        let a = HueSatMap::from_table(dims, &table(dims, false, 10.0)).unwrap();
        let b = HueSatMap::from_table(dims, &table(dims, false, 0.0)).unwrap();
        let mid = HueSatMap::interpolate(&a, &b, 0.25).unwrap();
        assert_eq!(mid.delta(1, 1, 0).hue_shift, 2.5);
        assert_eq!(HueSatMap::interpolate(&a, &b, 1.0).unwrap(), a);
        assert!(HueSatMap::interpolate(&a, &HueSatMap::new(3, 2, 1), 0.5).is_err());
    }
}
