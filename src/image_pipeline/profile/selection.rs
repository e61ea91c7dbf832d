//! The ordered profile list owned by a negative: lookup and de-duplication.

use tracing::debug;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::profile::camera_profile::{
    CameraProfile, EMBEDDED_PROFILE_NAME, ProfileId,
};

/// Splits `"Name v2 beta 3"` into `("Name", 193)`.
///
/// `" vN"` adds `N * 100`; `" beta"` subtracts 10 and `" beta N"` adds
/// `N - 10`, so a beta sorts below its release.
pub fn split_camera_profile_name(name: &str) -> (String, i32) {
    let mut base = name;
    let mut version = 0i32;

    if let Some(stripped) = base.strip_suffix(" beta") {
        base = stripped;
        version -= 10;
    } else if let Some((head, n)) = split_numeric_suffix(base, " beta ") {
        base = head;
        version += n - 10;
    }

    if let Some((head, n)) = split_numeric_suffix(base, " v") {
        base = head;
        version += n * 100;
    }

    (base.to_string(), version)
}

/// `"<head><marker><digits>"` -> `(head, digits)`.
fn split_numeric_suffix<'a>(name: &'a str, marker: &str) -> Option<(&'a str, i32)> {
    let digits_start = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits_start == name.len() {
        return None;
    }
    let head = name[..digits_start].strip_suffix(marker)?;
    if head.is_empty() {
        return None;
    }
    let n = name[digits_start..].parse::<i32>().ok()?;
    Some((head, n))
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<CameraProfile>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CameraProfile> {
        self.profiles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CameraProfile> {
        self.profiles.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraProfile> {
        self.profiles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CameraProfile> {
        self.profiles.iter_mut()
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }

    /// Adds a profile, replacing an equivalent one already present.
    ///
    /// An unnamed profile becomes "Embedded". If the first profile is the
    /// default-named one with the same colour data it is replaced in place;
    /// otherwise the first profile with the same data and name is removed
    /// and the new one appended.
    pub fn add(&mut self, mut profile: CameraProfile) {
        if profile.name.is_empty() {
            profile.name = EMBEDDED_PROFILE_NAME.to_string();
        }

        if let Some(first) = self.profiles.first_mut() {
            if first.name == EMBEDDED_PROFILE_NAME && first.equal_data(&profile) {
                profile.was_read_from_dng |= first.was_read_from_dng;
                if !first.was_read_from_disk {
                    profile.was_read_from_disk = false;
                }
                debug!("Replacing embedded profile with \"{}\"", profile.name);
                *first = profile;
                return;
            }
        }

        if let Some(index) = self
            .profiles
            .iter()
            .position(|p| p.name == profile.name && p.equal_data(&profile))
        {
            debug!("Dropping duplicate profile \"{}\"", profile.name);
            self.profiles.remove(index);
        }
        self.profiles.push(profile);
    }

    /// Drops profiles unusable for this camera. Returns how many were dropped.
    pub fn retain_valid(&mut self, channels: u32, unique_camera_model: &str) -> usize {
        let before = self.profiles.len();
        self.profiles
            .retain(|p| p.is_valid(channels) && p.is_legal_for_camera(unique_camera_model));
        before - self.profiles.len()
    }

    /// Index of the profile best matching `id`.
    ///
    /// Tries, in order: exact name and fingerprint; the highest version of
    /// an exactly named profile; fingerprint alone; the highest version of
    /// any profile whose name starts with the requested base name; and,
    /// if `use_default`, the first profile.
    pub fn select_index(&mut self, id: &ProfileId, use_default: bool) -> Result<Option<usize>> {
        let mut fingerprints = Vec::with_capacity(self.profiles.len());
        for profile in &mut self.profiles {
            fingerprints.push(profile.fingerprint()?);
        }
        let has_fingerprint = !id.fingerprint.is_null();

        if has_fingerprint {
            if let Some(i) = self
                .profiles
                .iter()
                .zip(&fingerprints)
                .position(|(p, fp)| p.name == id.name && *fp == id.fingerprint)
            {
                return Ok(Some(i));
            }
        }

        if !id.name.is_empty() {
            if self.profiles.iter().any(|p| p.name == id.name) {
                let (base, _) = split_camera_profile_name(&id.name);
                return Ok(self.highest_version(|name| name == base));
            }
        }

        if has_fingerprint {
            if let Some(i) = fingerprints.iter().position(|fp| *fp == id.fingerprint) {
                return Ok(Some(i));
            }
        }

        if !id.name.is_empty() {
            let (base, _) = split_camera_profile_name(&id.name);
            let prefix_match = |name: &str| name.starts_with(base.as_str());
            if let Some(i) = self.highest_version(prefix_match) {
                return Ok(Some(i));
            }
        }

        Ok((use_default && !self.profiles.is_empty()).then_some(0))
    }

    pub fn select(&mut self, id: &ProfileId, use_default: bool) -> Result<Option<&CameraProfile>> {
        Ok(self
            .select_index(id, use_default)?
            .and_then(|i| self.profiles.get(i)))
    }

    /// First profile with the highest version among those whose base name
    /// satisfies `matches`.
    fn highest_version(&self, matches: impl Fn(&str) -> bool) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (i, profile) in self.profiles.iter().enumerate() {
            let (base, version) = split_camera_profile_name(&profile.name);
            if !matches(&base) {
                continue;
            }
            if best.is_none_or(|(_, v)| version > v) {
                best = Some((i, version));
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn into_vec(self) -> Vec<CameraProfile> {
        self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::matrix::Matrix;
    use crate::image_pipeline::fingerprint::Fingerprint;

    fn profile(name: &str, scale: f64) -> CameraProfile {
        let mut m = Matrix::identity(3);
        m.scale(scale);
        CameraProfile {
            name: name.to_string(),
            calibration_illuminant_1: 21,
            color_matrix_1: m,
            ..CameraProfile::default()
        }
    }

    #[test]
    fn splits_version_suffixes() {
        assert_eq!(split_camera_profile_name("Embedded"), ("Embedded".into(), 0));
        assert_eq!(split_camera_profile_name("Embedded v2"), ("Embedded".into(), 200));
        assert_eq!(split_camera_profile_name("Camera Standard beta"), ("Camera Standard".into(), -10));
        assert_eq!(split_camera_profile_name("Neutral v3 beta 2"), ("Neutral".into(), 292));
        assert_eq!(split_camera_profile_name("v2"), ("v2".into(), 0));
    }

    #[test]
    fn name_lookup_prefers_the_newest_version() {
        let mut set = ProfileSet::new();
        set.add(profile("Embedded", 1.0));
        set.add(profile("Embedded v2", 2.0));
        set.add(profile("Embedded v3", 3.0));
        set.add(profile("Other", 4.0));

        let found = set.select(&ProfileId::by_name("Embedded"), false).unwrap().unwrap();
        assert_eq!(found.name, "Embedded v3");
    }

    #[test]
    fn exact_id_wins_over_name() {
        let mut set = ProfileSet::new();
        set.add(profile("Standard", 1.0));
        set.add(profile("Standard v2", 2.0));
        let fp = set.get_mut(0).unwrap().fingerprint().unwrap();

        let id = ProfileId::new("Standard", fp);
        assert_eq!(set.select_index(&id, false).unwrap(), Some(0));
    }

    #[test]
    fn fingerprint_then_prefix_then_default() {
        let mut set = ProfileSet::new();
        set.add(profile("Vivid", 1.0));
        set.add(profile("Portrait v2", 2.0));
        let fp = set.get_mut(0).unwrap().fingerprint().unwrap();

        assert_eq!(
            set.select_index(&ProfileId::new("Renamed", fp), false).unwrap(),
            Some(0)
        );
        assert_eq!(
            set.select_index(&ProfileId::by_name("Portrait beta"), false).unwrap(),
            Some(1)
        );
        assert_eq!(set.select_index(&ProfileId::by_name("Missing"), false).unwrap(), None);
        assert_eq!(set.select_index(&ProfileId::by_name("Missing"), true).unwrap(), Some(0));
        assert_eq!(
            set.select_index(&ProfileId::new("", Fingerprint::NULL), false).unwrap(),
            None
        );
    }

    #[test]
    fn add_names_and_replaces_embedded_profile() {
        let mut set = ProfileSet::new();
        let mut embedded = profile("", 1.0);
        embedded.was_read_from_dng = true;
        set.add(embedded);
        assert_eq!(set.get(0).unwrap().name, EMBEDDED_PROFILE_NAME);

        let mut named = profile("Adobe Standard", 1.0);
        named.was_read_from_disk = true;
        set.add(named);
        assert_eq!(set.len(), 1);
        let first = set.get(0).unwrap();
        assert_eq!(first.name, "Adobe Standard");
        assert!(first.was_read_from_dng);
        assert!(!first.was_read_from_disk);
    }

    #[test]
    fn add_replaces_duplicates_and_keeps_order() {
        let mut set = ProfileSet::new();
        set.add(profile("A", 1.0));
        set.add(profile("B", 2.0));
        set.add(profile("C", 3.0));
        set.add(profile("B", 2.0));
        let names: Vec<_> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "C", "B"]);

        // Same name, different data: both kept.
        set.add(profile("A", 5.0));
        assert_eq!(set.len(), 4);
    }
}
