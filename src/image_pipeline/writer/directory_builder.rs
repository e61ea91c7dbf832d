//! Builds the bytes of one image file directory.
//!
//! Entries are kept sorted by tag code. Values of up to four bytes are stored
//! inline; larger ones go to a word-aligned payload area directly after the
//! next-directory pointer.

use std::collections::BTreeMap;

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::tags::directory::TagValue;
use crate::image_pipeline::tags::types::IFD_ENTRY_LEN;

/// Upper bound on entries in one written directory.
pub const MAX_TAG_ENTRIES: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct DirectoryBuilder {
    entries: BTreeMap<u16, TagValue>,
    next_ifd: u64,
}

/// Serialized directory plus where each entry's value field ended up.
#[derive(Debug, Clone)]
pub struct DirectoryBlock {
    pub bytes: Vec<u8>,
    /// Absolute offset of each entry's 4-byte value/offset field.
    pub value_field: BTreeMap<u16, u64>,
    /// Absolute offset of each entry's value bytes.
    pub value_data: BTreeMap<u16, u64>,
}

impl DirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn add(&mut self, code: u16, value: TagValue) -> Result<()> {
        if !self.entries.contains_key(&code) && self.entries.len() >= MAX_TAG_ENTRIES {
            return Err(DngError::program(format!(
                "directory full ({} entries) adding tag {}",
                MAX_TAG_ENTRIES, code
            )));
        }
        if value.count() == 0 {
            return Err(DngError::program(format!("tag {} has no values", code)));
        }
        self.entries.insert(code, value);
        Ok(())
    }

    pub fn remove(&mut self, code: u16) -> Option<TagValue> {
        self.entries.remove(&code)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_next_ifd(&mut self, offset: u64) {
        self.next_ifd = offset;
    }

    /// Size in bytes the directory will occupy, payloads included.
    pub fn size(&self) -> u64 {
        let table = 2 + self.entries.len() * IFD_ENTRY_LEN + 4;
        let payload: usize = self
            .entries
            .values()
            .map(|v| v.byte_len())
            .filter(|&len| len > 4)
            .map(|len| len + (len & 1))
            .sum();
        (table + payload) as u64
    }

    /// Serializes the directory for placement at absolute offset `start`.
    pub fn build(&self, endian: Endian, start: u64) -> Result<DirectoryBlock> {
        if start & 1 != 0 {
            return Err(DngError::program(format!(
                "directory placed at odd offset {}",
                start
            )));
        }
        if start + self.size() > u32::MAX as u64 {
            return Err(DngError::WriteFile("directory beyond 4 GB".into()));
        }

        let table_len = 2 + self.entries.len() * IFD_ENTRY_LEN + 4;
        let mut bytes = Vec::with_capacity(self.size() as usize);
        let mut payload = Vec::new();
        let mut value_field = BTreeMap::new();
        let mut value_data = BTreeMap::new();

        bytes.extend_from_slice(&endian.u16_bytes(self.entries.len() as u16));
        for (&code, value) in &self.entries {
            let encoded = value.encode(endian);
            bytes.extend_from_slice(&endian.u16_bytes(code));
            bytes.extend_from_slice(&endian.u16_bytes(value.field_type().code()));
            bytes.extend_from_slice(&endian.u32_bytes(value.count()));

            let field_pos = start + bytes.len() as u64;
            value_field.insert(code, field_pos);
            if encoded.len() <= 4 {
                value_data.insert(code, field_pos);
                let mut inline = [0u8; 4];
                inline[..encoded.len()].copy_from_slice(&encoded);
                bytes.extend_from_slice(&inline);
            } else {
                let data_pos = start + (table_len + payload.len()) as u64;
                value_data.insert(code, data_pos);
                bytes.extend_from_slice(&endian.u32_bytes(data_pos as u32));
                payload.extend_from_slice(&encoded);
                if payload.len() & 1 != 0 {
                    payload.push(0);
                }
            }
        }
        bytes.extend_from_slice(&endian.u32_bytes(self.next_ifd as u32));
        bytes.extend_from_slice(&payload);

        Ok(DirectoryBlock {
            bytes,
            value_field,
            value_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::tags::types::tag;

    #[test]
    fn inline_and_out_of_line_values() {
        let mut builder = DirectoryBuilder::new();
        builder.add(tag::MAKE, TagValue::Ascii("Leica".into())).unwrap();
        builder.add(tag::IMAGE_WIDTH, TagValue::Short(vec![640])).unwrap();

        let block = builder.build(Endian::Little, 8).unwrap();
        assert_eq!(block.bytes.len() as u64, builder.size());
        // Width is inline, Make ("Leica\0", 6 bytes) goes to the payload.
        assert_eq!(block.value_data[&tag::IMAGE_WIDTH], block.value_field[&tag::IMAGE_WIDTH]);
        let make_at = block.value_data[&tag::MAKE] as usize - 8;
        assert_eq!(&block.bytes[make_at..make_at + 6], b"Leica\0");
        // First entry is the lower tag code.
        assert_eq!(u16::from_le_bytes([block.bytes[2], block.bytes[3]]), tag::IMAGE_WIDTH);
    }

    #[test]
    fn entry_limit_is_enforced() {
        let mut builder = DirectoryBuilder::new();
        for code in 0..MAX_TAG_ENTRIES as u16 {
            builder.add(1000 + code, TagValue::Short(vec![1])).unwrap();
        }
        assert!(builder.add(5000, TagValue::Short(vec![1])).is_err());
        // Replacing an existing entry is still allowed.
        assert!(builder.add(1000, TagValue::Long(vec![2])).is_ok());
    }

    #[test]
    fn payloads_stay_word_aligned() {
        let mut builder = DirectoryBuilder::new();
        builder.add(tag::SOFTWARE, TagValue::Ascii("abcd".into())).unwrap();
        builder.add(tag::ARTIST, TagValue::Ascii("xy".into())).unwrap();
        let block = builder.build(Endian::Big, 100).unwrap();
        for pos in block.value_data.values() {
            assert_eq!(pos & 1, 0);
        }
    }
}
