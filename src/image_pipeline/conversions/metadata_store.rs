//! Boundary to the catalogue that holds user metadata for an image.
//!
//! The store is keyed by a numeric item id. Values it holds override what
//! the camera recorded before a negative is written, and what the negative
//! carries is recorded back once a conversion finishes.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::negative::Negative;

pub type ItemId = u64;

/// Position in decimal degrees, altitude in metres above sea level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

pub trait MetadataStore {
    fn comment(&self, item: ItemId) -> Option<String>;
    fn set_comment(&mut self, item: ItemId, comment: &str) -> Result<()>;

    fn gps_position(&self, item: ItemId) -> Option<GpsPosition>;
    fn set_gps_position(&mut self, item: ItemId, position: GpsPosition) -> Result<()>;

    fn copyright(&self, item: ItemId) -> Option<String>;
    fn set_copyright(&mut self, item: ItemId, copyright: &str) -> Result<()>;

    fn tags(&self, item: ItemId) -> Vec<String>;
    fn set_tags(&mut self, item: ItemId, tags: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct ItemRecord {
    comment: Option<String>,
    gps: Option<GpsPosition>,
    copyright: Option<String>,
    tags: Vec<String>,
}

/// Store kept in a hash map, for tests and one-shot command line runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    items: HashMap<ItemId, ItemRecord>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains_key(&item)
    }

    fn record(&mut self, item: ItemId) -> &mut ItemRecord {
        self.items.entry(item).or_default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn comment(&self, item: ItemId) -> Option<String> {
        self.items.get(&item).and_then(|r| r.comment.clone())
    }

    fn set_comment(&mut self, item: ItemId, comment: &str) -> Result<()> {
        self.record(item).comment = Some(comment.to_string());
        Ok(())
    }

    fn gps_position(&self, item: ItemId) -> Option<GpsPosition> {
        self.items.get(&item).and_then(|r| r.gps)
    }

    fn set_gps_position(&mut self, item: ItemId, position: GpsPosition) -> Result<()> {
        self.record(item).gps = Some(position);
        Ok(())
    }

    fn copyright(&self, item: ItemId) -> Option<String> {
        self.items.get(&item).and_then(|r| r.copyright.clone())
    }

    fn set_copyright(&mut self, item: ItemId, copyright: &str) -> Result<()> {
        self.record(item).copyright = Some(copyright.to_string());
        Ok(())
    }

    fn tags(&self, item: ItemId) -> Vec<String> {
        self.items.get(&item).map(|r| r.tags.clone()).unwrap_or_default()
    }

    fn set_tags(&mut self, item: ItemId, tags: &[String]) -> Result<()> {
        self.record(item).tags = tags.to_vec();
        Ok(())
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Minimal XMP packet listing `tags` as `dc:subject` keywords.
pub fn keywords_xmp(tags: &[String]) -> Vec<u8> {
    let items: String = tags
        .iter()
        .map(|t| format!("<rdf:li>{}</rdf:li>", xml_escape(t)))
        .collect();
    format!(
        "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
         <rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
         <dc:subject><rdf:Bag>{}</rdf:Bag></dc:subject>\
         </rdf:Description></rdf:RDF></x:xmpmeta>",
        items
    )
    .into_bytes()
}

/// Copies what the store knows about `item` onto the negative.
///
/// Keywords only go into a fresh XMP packet; an XMP block read from the
/// source file is left alone.
pub fn apply_to_negative(store: &dyn MetadataStore, item: ItemId, negative: &mut Negative) {
    if let Some(comment) = store.comment(item) {
        negative.exif.user_comment = comment;
    }
    if let Some(position) = store.gps_position(item) {
        negative
            .exif
            .gps
            .set_position(position.latitude, position.longitude, position.altitude);
    }
    if let Some(copyright) = store.copyright(item) {
        negative.exif.copyright = copyright;
    }
    let tags = store.tags(item);
    if !tags.is_empty() {
        if negative.xmp.is_empty() {
            negative.xmp = keywords_xmp(&tags);
        } else {
            warn!("Keeping source XMP, {} catalogue tags not embedded", tags.len());
        }
    }
    debug!("Applied catalogue metadata of item {}", item);
}

/// Records the negative's comment, position and copyright for `item`.
pub fn record_from_negative(
    store: &mut dyn MetadataStore,
    item: ItemId,
    negative: &Negative,
) -> Result<()> {
    let exif = &negative.exif;
    if !exif.user_comment.is_empty() {
        store.set_comment(item, &exif.user_comment)?;
    }
    if let (Some(latitude), Some(longitude)) =
        (exif.gps.latitude_degrees(), exif.gps.longitude_degrees())
    {
        store.set_gps_position(
            item,
            GpsPosition {
                latitude,
                longitude,
                altitude: exif.gps.altitude_metres(),
            },
        )?;
    }
    if !exif.copyright.is_empty() {
        store.set_copyright(item, &exif.copyright)?;
    }
    Ok(())
}
