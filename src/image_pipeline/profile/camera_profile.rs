//! Camera colour profiles.

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::matrix::Matrix;
use crate::image_pipeline::common::rational::SRational;
use crate::image_pipeline::fingerprint::{Fingerprint, Md5Stream};
use crate::image_pipeline::profile::hue_sat::HueSatMap;
use crate::image_pipeline::profile::tone_curve::ToneCurve;
use crate::image_pipeline::tags::profile_info::ProfileInfo;

/// Name given to a profile embedded without one.
pub const EMBEDDED_PROFILE_NAME: &str = "Embedded";

pub const EMBED_POLICY_ALLOW_COPYING: u32 = 0;
pub const EMBED_POLICY_EMBED_IF_USED: u32 = 1;
pub const EMBED_POLICY_EMBED_NEVER: u32 = 2;
pub const EMBED_POLICY_NO_RESTRICTIONS: u32 = 3;

/// Identity of a profile: its name plus a digest of its colour data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileId {
    pub name: String,
    pub fingerprint: Fingerprint,
}

impl ProfileId {
    pub fn new(name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            name: name.into(),
            fingerprint,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self::new(name, Fingerprint::NULL)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraProfile {
    pub name: String,
    pub calibration_illuminant_1: u32,
    pub calibration_illuminant_2: u32,
    pub color_matrix_1: Matrix,
    pub color_matrix_2: Matrix,
    pub forward_matrix_1: Matrix,
    pub forward_matrix_2: Matrix,
    pub reduction_matrix_1: Matrix,
    pub reduction_matrix_2: Matrix,
    pub calibration_signature: String,
    pub embed_policy: u32,
    pub copyright: String,
    /// Only valid for this camera model when not empty.
    pub unique_camera_model_restriction: String,
    pub hue_sat_deltas_1: HueSatMap,
    pub hue_sat_deltas_2: HueSatMap,
    pub hue_sat_encoding: u32,
    pub look_table: HueSatMap,
    pub look_table_encoding: u32,
    pub tone_curve: ToneCurve,
    pub baseline_exposure_offset: SRational,
    pub default_black_render: u32,

    pub was_read_from_dng: bool,
    pub was_read_from_disk: bool,

    pub(crate) fingerprint: Option<Fingerprint>,
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            calibration_illuminant_1: 0,
            calibration_illuminant_2: 0,
            color_matrix_1: Matrix::empty(),
            color_matrix_2: Matrix::empty(),
            forward_matrix_1: Matrix::empty(),
            forward_matrix_2: Matrix::empty(),
            reduction_matrix_1: Matrix::empty(),
            reduction_matrix_2: Matrix::empty(),
            calibration_signature: String::new(),
            embed_policy: EMBED_POLICY_ALLOW_COPYING,
            copyright: String::new(),
            unique_camera_model_restriction: String::new(),
            hue_sat_deltas_1: HueSatMap::default(),
            hue_sat_deltas_2: HueSatMap::default(),
            hue_sat_encoding: 0,
            look_table: HueSatMap::default(),
            look_table_encoding: 0,
            tone_curve: ToneCurve::null(),
            baseline_exposure_offset: SRational::new(0, 1),
            default_black_render: 0,
            was_read_from_dng: false,
            was_read_from_disk: false,
            fingerprint: None,
        }
    }
}

impl CameraProfile {
    pub fn from_info(info: &ProfileInfo) -> Result<Self> {
        let mut profile = Self {
            name: info.name.clone(),
            calibration_illuminant_1: info.calibration_illuminant_1,
            calibration_illuminant_2: info.calibration_illuminant_2,
            color_matrix_1: info.color_matrix_1.clone(),
            color_matrix_2: info.color_matrix_2.clone(),
            forward_matrix_1: info.forward_matrix_1.clone(),
            forward_matrix_2: info.forward_matrix_2.clone(),
            reduction_matrix_1: info.reduction_matrix_1.clone(),
            reduction_matrix_2: info.reduction_matrix_2.clone(),
            calibration_signature: info.calibration_signature.clone(),
            embed_policy: info.embed_policy,
            copyright: info.copyright.clone(),
            unique_camera_model_restriction: info.unique_camera_model.clone(),
            hue_sat_deltas_1: HueSatMap::from_table(info.hue_sat_dims, &info.hue_sat_data_1)?,
            hue_sat_deltas_2: HueSatMap::from_table(info.hue_sat_dims, &info.hue_sat_data_2)?,
            hue_sat_encoding: info.hue_sat_encoding,
            look_table: HueSatMap::from_table(info.look_table_dims, &info.look_table_data)?,
            look_table_encoding: info.look_table_encoding,
            tone_curve: ToneCurve::from_flat(&info.tone_curve),
            baseline_exposure_offset: info.baseline_exposure_offset,
            default_black_render: info.default_black_render,
            ..Self::default()
        };
        profile.normalize_illuminants();
        Ok(profile)
    }

    /// Fields in storage form, for writing.
    pub fn to_info(&self) -> ProfileInfo {
        let hue_sat_dims = if self.hue_sat_deltas_1.is_valid() {
            self.hue_sat_deltas_1.dims()
        } else {
            (0, 0, 0)
        };
        ProfileInfo {
            big_endian: false,
            color_planes: self.color_matrix_1.rows().max(1) as u32,
            calibration_illuminant_1: self.calibration_illuminant_1,
            calibration_illuminant_2: self.calibration_illuminant_2,
            color_matrix_1: self.color_matrix_1.clone(),
            color_matrix_2: self.color_matrix_2.clone(),
            forward_matrix_1: self.forward_matrix_1.clone(),
            forward_matrix_2: self.forward_matrix_2.clone(),
            reduction_matrix_1: self.reduction_matrix_1.clone(),
            reduction_matrix_2: self.reduction_matrix_2.clone(),
            calibration_signature: self.calibration_signature.clone(),
            name: self.name.clone(),
            copyright: self.copyright.clone(),
            embed_policy: self.embed_policy,
            unique_camera_model: self.unique_camera_model_restriction.clone(),
            hue_sat_dims,
            hue_sat_data_1: valid_table(&self.hue_sat_deltas_1),
            hue_sat_data_2: valid_table(&self.hue_sat_deltas_2),
            hue_sat_encoding: self.hue_sat_encoding,
            look_table_dims: if self.look_table.is_valid() {
                self.look_table.dims()
            } else {
                (0, 0, 0)
            },
            look_table_data: valid_table(&self.look_table),
            look_table_encoding: self.look_table_encoding,
            tone_curve: if self.tone_curve.is_null() {
                Vec::new()
            } else {
                self.tone_curve.to_flat()
            },
            baseline_exposure_offset: self.baseline_exposure_offset,
            default_black_render: self.default_black_render,
        }
    }

    pub fn id(&mut self) -> Result<ProfileId> {
        Ok(ProfileId::new(self.name.clone(), self.fingerprint()?))
    }

    pub fn has_second_illuminant(&self) -> bool {
        !self.color_matrix_2.is_empty()
    }

    /// Keeps only the first calibration set unless both illuminants are
    /// known and distinct.
    pub fn normalize_illuminants(&mut self) {
        let ill1 = self.calibration_illuminant_1;
        let ill2 = self.calibration_illuminant_2;
        if self.has_second_illuminant() && (ill1 == 0 || ill2 == 0 || ill1 == ill2) {
            self.color_matrix_2.clear();
            self.forward_matrix_2.clear();
            self.reduction_matrix_2.clear();
            self.hue_sat_deltas_2 = HueSatMap::default();
            self.calibration_illuminant_2 = 0;
            self.invalidate_fingerprint();
        }
    }

    /// Whether the profile can drive a camera with `channels` colour planes.
    pub fn is_valid(&self, channels: u32) -> bool {
        let channels = channels as usize;
        if channels == 0 || channels > 4 {
            return false;
        }

        if channels == 1 {
            if !self.color_matrix_1.is_empty()
                && (self.color_matrix_1.rows() != 1 || self.color_matrix_1.cols() != 3)
            {
                return false;
            }
        } else {
            if !valid_color_matrix(&self.color_matrix_1, channels) {
                return false;
            }
            if self.has_second_illuminant() && !valid_color_matrix(&self.color_matrix_2, channels)
            {
                return false;
            }
        }

        let camera_to_xyz_ok = |m: &Matrix| m.is_empty() || (m.rows() == 3 && m.cols() == channels);
        if !camera_to_xyz_ok(&self.forward_matrix_1) || !camera_to_xyz_ok(&self.forward_matrix_2) {
            return false;
        }
        let reduction_ok = |m: &Matrix| m.is_empty() || (channels > 3 && camera_to_xyz_ok(m));
        if !reduction_ok(&self.reduction_matrix_1) || !reduction_ok(&self.reduction_matrix_2) {
            return false;
        }

        let deltas_1 = &self.hue_sat_deltas_1;
        let deltas_2 = &self.hue_sat_deltas_2;
        if deltas_2.is_valid() && (!deltas_1.is_valid() || deltas_1.dims() != deltas_2.dims()) {
            return false;
        }
        if deltas_1.dims() != (0, 0, 0) && !deltas_1.is_valid() {
            return false;
        }
        if self.look_table.dims() != (0, 0, 0) && !self.look_table.is_valid() {
            return false;
        }

        self.tone_curve.is_valid()
    }

    pub fn is_legal_for_camera(&self, unique_camera_model: &str) -> bool {
        self.unique_camera_model_restriction.is_empty()
            || self.unique_camera_model_restriction == unique_camera_model
    }

    /// Same colour behaviour, whatever the name and provenance.
    pub fn equal_data(&self, other: &CameraProfile) -> bool {
        self.calibration_illuminant_1 == other.calibration_illuminant_1
            && self.calibration_illuminant_2 == other.calibration_illuminant_2
            && self.color_matrix_1 == other.color_matrix_1
            && self.color_matrix_2 == other.color_matrix_2
            && self.forward_matrix_1 == other.forward_matrix_1
            && self.forward_matrix_2 == other.forward_matrix_2
            && self.reduction_matrix_1 == other.reduction_matrix_1
            && self.reduction_matrix_2 == other.reduction_matrix_2
            && self.calibration_signature == other.calibration_signature
            && self.hue_sat_deltas_1 == other.hue_sat_deltas_1
            && self.hue_sat_deltas_2 == other.hue_sat_deltas_2
            && self.hue_sat_encoding == other.hue_sat_encoding
            && self.look_table == other.look_table
            && self.look_table_encoding == other.look_table_encoding
            && self.tone_curve == other.tone_curve
            && self.baseline_exposure_offset == other.baseline_exposure_offset
            && self.default_black_render == other.default_black_render
    }

    /// Cached fingerprint, if one was computed since the last change.
    pub fn cached_fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Returns the cached fingerprint, computing it first if needed.
    pub fn fingerprint(&mut self) -> Result<Fingerprint> {
        if let Some(fp) = self.fingerprint {
            return Ok(fp);
        }
        let fp = self.calculate_fingerprint()?;
        self.fingerprint = Some(fp);
        Ok(fp)
    }

    /// Must be called after editing any colour field.
    pub fn invalidate_fingerprint(&mut self) {
        self.fingerprint = None;
    }

    /// MD5 over the colour data in little-endian form. The name is not part of it.
    pub fn calculate_fingerprint(&self) -> Result<Fingerprint> {
        let mut printer = Md5Stream::new(Endian::Little);

        if !self.color_matrix_1.is_empty() {
            printer.put_u32(self.calibration_illuminant_1)?;
            put_matrix(&mut printer, &self.color_matrix_1)?;
            put_matrix(&mut printer, &self.forward_matrix_1)?;
            put_matrix(&mut printer, &self.reduction_matrix_1)?;
        }
        if self.has_second_illuminant() {
            printer.put_u32(self.calibration_illuminant_2)?;
            put_matrix(&mut printer, &self.color_matrix_2)?;
            put_matrix(&mut printer, &self.forward_matrix_2)?;
            put_matrix(&mut printer, &self.reduction_matrix_2)?;
        }
        printer.put(self.calibration_signature.as_bytes())?;

        for map in [&self.hue_sat_deltas_1, &self.hue_sat_deltas_2] {
            if map.is_valid() {
                put_map(&mut printer, map)?;
            }
        }
        if self.hue_sat_deltas_1.is_valid() && self.hue_sat_encoding != 0 {
            printer.put_u32(self.hue_sat_encoding)?;
        }
        if self.look_table.is_valid() {
            put_map(&mut printer, &self.look_table)?;
            if self.look_table_encoding != 0 {
                printer.put_u32(self.look_table_encoding)?;
            }
        }
        if !self.tone_curve.is_null() {
            for &(x, y) in self.tone_curve.points() {
                printer.put_f32(x as f32)?;
                printer.put_f32(y as f32)?;
            }
        }
        if self.baseline_exposure_offset.n != 0 {
            printer.put_f64(self.baseline_exposure_offset.as_f64())?;
        }
        if self.default_black_render != 0 {
            printer.put_u32(self.default_black_render)?;
        }
        Ok(printer.result())
    }

    /// Adapts a 3-colour profile to a 4-plane Bayer mosaic.
    ///
    /// The second green plane reuses the first green row of each colour
    /// matrix; forward and reduction matrices no longer apply.
    pub fn set_four_color_bayer(&mut self) -> Result<()> {
        if !self.is_valid(3) {
            return Err(DngError::program(format!(
                "profile \"{}\" is not a valid 3-colour profile",
                self.name
            )));
        }
        for matrix in [&mut self.color_matrix_1, &mut self.color_matrix_2] {
            if !matrix.is_empty() {
                *matrix = matrix.with_row_appended(&matrix.row(1).to_vec());
            }
        }
        self.forward_matrix_1.clear();
        self.forward_matrix_2.clear();
        self.reduction_matrix_1.clear();
        self.reduction_matrix_2.clear();
        self.invalidate_fingerprint();
        Ok(())
    }
}

fn valid_table(map: &HueSatMap) -> Vec<f32> {
    if map.is_valid() { map.to_table() } else { Vec::new() }
}

fn valid_color_matrix(m: &Matrix, channels: usize) -> bool {
    m.rows() == channels && m.cols() == 3 && m.max_entry() > 0.0 && m.invert().is_ok()
}

fn put_matrix(printer: &mut Md5Stream, m: &Matrix) -> Result<()> {
    printer.put_u32(m.rows() as u32)?;
    printer.put_u32(m.cols() as u32)?;
    for &v in m.values() {
        printer.put_f64(v)?;
    }
    Ok(())
}

fn put_map(printer: &mut Md5Stream, map: &HueSatMap) -> Result<()> {
    let (h, s, v) = map.dims();
    printer.put_u32(h)?;
    printer.put_u32(s)?;
    printer.put_u32(v)?;
    for value in map.to_table() {
        printer.put_f32(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::profile::illuminant;

    fn sample_profile(name: &str) -> CameraProfile {
        CameraProfile {
            name: name.to_string(),
            calibration_illuminant_1: illuminant::D65,
            color_matrix_1: Matrix::from_rows(&[
                &[0.8, -0.2, 0.0],
                &[-0.3, 1.2, 0.1],
                &[0.0, 0.1, 0.7],
            ]),
            ..CameraProfile::default()
        }
    }

    #[test]
    fn fingerprint_is_cached_until_invalidated() {
        let mut profile = sample_profile("A");
        assert!(profile.cached_fingerprint().is_none());
        let fp = profile.fingerprint().unwrap();
        assert!(!fp.is_null());
        assert_eq!(profile.cached_fingerprint(), Some(fp));

        profile.color_matrix_1[0][0] = 0.9;
        assert_eq!(profile.fingerprint().unwrap(), fp);
        profile.invalidate_fingerprint();
        assert_ne!(profile.fingerprint().unwrap(), fp);
    }

    #[test]
    fn name_is_not_part_of_fingerprint() {
        let a = sample_profile("A").calculate_fingerprint().unwrap();
        let b = sample_profile("B").calculate_fingerprint().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn validity_depends_on_channels() {
        let profile = sample_profile("A");
        assert!(profile.is_valid(3));
        assert!(!profile.is_valid(4));

        let mut singular = sample_profile("S");
        singular.color_matrix_1 = Matrix::from_rows(&[&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]]);
        assert!(!singular.is_valid(3));
    }

    #[test]
    fn equal_illuminants_drop_second_set() {
        let mut info = ProfileInfo {
            color_planes: 3,
            calibration_illuminant_1: illuminant::D65,
            calibration_illuminant_2: illuminant::D65,
            color_matrix_1: Matrix::identity(3),
            color_matrix_2: Matrix::identity(3),
            ..ProfileInfo::default()
        };
        let profile = CameraProfile::from_info(&info).unwrap();
        assert!(!profile.has_second_illuminant());

        info.calibration_illuminant_2 = illuminant::STANDARD_LIGHT_A;
        let profile = CameraProfile::from_info(&info).unwrap();
        assert!(profile.has_second_illuminant());
    }

    #[test]
    fn four_color_bayer_duplicates_green_row() {
        let mut profile = sample_profile("A");
        profile.forward_matrix_1 = Matrix::identity(3);
        profile.set_four_color_bayer().unwrap();
        assert_eq!(profile.color_matrix_1.rows(), 4);
        assert_eq!(profile.color_matrix_1.row(3), profile.color_matrix_1.row(1));
        assert!(profile.forward_matrix_1.is_empty());
        assert!(profile.is_valid(4));
    }

    #[test]
    fn info_round_trip_keeps_data() {
        let profile = sample_profile("Portrait");
        let back = CameraProfile::from_info(&profile.to_info()).unwrap();
        assert!(profile.equal_data(&back));
        assert_eq!(back.name, "Portrait");
    }
}
