//! TIFF headers, image file directories and generic typed tag values.

use std::collections::BTreeMap;

use tracing::trace;

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    FieldType, IFD_ENTRY_LEN, MAX_DIRECTORY_ENTRIES, PROFILE_MAGIC, RAW_MAGIC_OR, RAW_MAGIC_SR,
    TIFF_HEADER_LEN, TIFF_MAGIC,
};
use crate::image_pipeline::writer::directory_builder::DirectoryBuilder;

/// Byte order, magic and first directory offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub endian: Endian,
    pub magic: u16,
    pub first_ifd: u64,
}

impl TiffHeader {
    /// Check TIFF header. Accepts the TIFF, raw and profile magic words.
    pub fn read(data: &[u8]) -> Result<TiffHeader> {
        if data.len() < TIFF_HEADER_LEN {
            return Err(DngError::bad_format("stream too short for a TIFF header"));
        }
        let endian = Endian::from_marker([data[0], data[1]])
            .ok_or_else(|| DngError::bad_format("unknown TIFF byte order"))?;
        let magic = endian
            .read_u16(data, 2)
            .ok_or(DngError::EndOfFile(2))?;
        if !matches!(magic, TIFF_MAGIC | RAW_MAGIC_OR | RAW_MAGIC_SR | PROFILE_MAGIC) {
            return Err(DngError::bad_format(format!("unknown TIFF magic {:#06x}", magic)));
        }
        let first_ifd = endian.read_u32(data, 4).ok_or(DngError::EndOfFile(4))? as u64;
        Ok(TiffHeader {
            endian,
            magic,
            first_ifd,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.endian.marker());
        out.extend_from_slice(&self.endian.u16_bytes(self.magic));
        out.extend_from_slice(&self.endian.u32_bytes(self.first_ifd as u32));
    }
}

/// Single IFD entry (tag, type, count) with the absolute position of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub code: u16,
    pub field_type: FieldType,
    pub count: u32,
    /// Where the value bytes start: inside the entry if they fit in four
    /// bytes, otherwise at the stored offset.
    pub value_offset: u64,
}

impl TagEntry {
    pub fn byte_len(&self) -> u64 {
        self.count as u64 * self.field_type.size() as u64
    }
}

/// One parsed image file directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    pub offset: u64,
    pub entries: Vec<TagEntry>,
    pub next_offset: u64,
}

impl Ifd {
    /// Reads the directory at `offset`. Entries of unknown field type, or
    /// whose value lies outside the stream, are dropped.
    pub fn read(stream: &mut TiffStream<'_>, offset: u64) -> Result<Ifd> {
        stream.set_position(offset).map_err(|_| {
            DngError::bad_format(format!("directory offset {} outside stream", offset))
        })?;
        let count = stream.get_u16()? as usize;
        if count == 0 || count > MAX_DIRECTORY_ENTRIES {
            return Err(DngError::bad_format(format!(
                "directory at {} has {} entries",
                offset, count
            )));
        }
        if offset + 2 + (count * IFD_ENTRY_LEN) as u64 > stream.len() as u64 {
            return Err(DngError::bad_format(format!(
                "directory at {} runs past end of stream",
                offset
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let entry_pos = offset + 2 + (i * IFD_ENTRY_LEN) as u64;
            stream.set_position(entry_pos)?;
            let code = stream.get_u16()?;
            let type_code = stream.get_u16()?;
            let value_count = stream.get_u32()?;

            let Some(field_type) = FieldType::from_code(type_code) else {
                trace!("Skipping tag {} with unknown type {}", code, type_code);
                continue;
            };
            let entry = TagEntry {
                code,
                field_type,
                count: value_count,
                value_offset: 0,
            };
            let value_offset = if entry.byte_len() <= 4 {
                entry_pos + 8
            } else {
                stream.get_u32()? as u64
            };
            if value_offset + entry.byte_len() > stream.len() as u64 {
                trace!("Skipping tag {} with value outside stream", code);
                continue;
            }
            entries.push(TagEntry {
                value_offset,
                ..entry
            });
        }

        stream.set_position(offset + 2 + (count * IFD_ENTRY_LEN) as u64)?;
        let next_offset = stream.get_u32().unwrap_or(0) as u64;

        Ok(Ifd {
            offset,
            entries,
            next_offset,
        })
    }

    pub fn find(&self, code: u16) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.code == code)
    }
}

/// Typed tag value, one variant per TIFF field type.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<URational>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<SRational>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl TagValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            TagValue::Byte(_) => FieldType::Byte,
            TagValue::Ascii(_) => FieldType::Ascii,
            TagValue::Short(_) => FieldType::Short,
            TagValue::Long(_) => FieldType::Long,
            TagValue::Rational(_) => FieldType::Rational,
            TagValue::SByte(_) => FieldType::SByte,
            TagValue::Undefined(_) => FieldType::Undefined,
            TagValue::SShort(_) => FieldType::SShort,
            TagValue::SLong(_) => FieldType::SLong,
            TagValue::SRational(_) => FieldType::SRational,
            TagValue::Float(_) => FieldType::Float,
            TagValue::Double(_) => FieldType::Double,
        }
    }

    /// Value count as stored in the entry (ASCII includes the NUL).
    pub fn count(&self) -> u32 {
        (match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => v.len(),
            TagValue::Ascii(s) => s.len() + 1,
            TagValue::Short(v) => v.len(),
            TagValue::Long(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SByte(v) => v.len(),
            TagValue::SShort(v) => v.len(),
            TagValue::SLong(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Double(v) => v.len(),
        }) as u32
    }

    pub fn byte_len(&self) -> usize {
        self.count() as usize * self.field_type().size()
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => out.extend_from_slice(v),
            TagValue::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TagValue::Short(v) => v.iter().for_each(|&x| out.extend(endian.u16_bytes(x))),
            TagValue::Long(v) => v.iter().for_each(|&x| out.extend(endian.u32_bytes(x))),
            TagValue::Rational(v) => v.iter().for_each(|r| {
                out.extend(endian.u32_bytes(r.n));
                out.extend(endian.u32_bytes(r.d));
            }),
            TagValue::SByte(v) => out.extend(v.iter().map(|&x| x as u8)),
            TagValue::SShort(v) => v
                .iter()
                .for_each(|&x| out.extend(endian.u16_bytes(x as u16))),
            TagValue::SLong(v) => v
                .iter()
                .for_each(|&x| out.extend(endian.u32_bytes(x as u32))),
            TagValue::SRational(v) => v.iter().for_each(|r| {
                out.extend(endian.u32_bytes(r.n as u32));
                out.extend(endian.u32_bytes(r.d as u32));
            }),
            TagValue::Float(v) => v
                .iter()
                .for_each(|&x| out.extend(endian.u32_bytes(x.to_bits()))),
            TagValue::Double(v) => v
                .iter()
                .for_each(|&x| out.extend(endian.u64_bytes(x.to_bits()))),
        }
        out
    }

    /// Reads the value of `entry` from `stream`.
    pub fn read(stream: &mut TiffStream<'_>, entry: &TagEntry) -> Result<TagValue> {
        stream.set_position(entry.value_offset)?;
        let n = entry.count as usize;
        Ok(match entry.field_type {
            FieldType::Byte => TagValue::Byte(stream.get_bytes(n)?.to_vec()),
            FieldType::Undefined => TagValue::Undefined(stream.get_bytes(n)?.to_vec()),
            FieldType::Ascii => {
                let bytes = stream.get_bytes(n)?;
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                TagValue::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldType::SByte => {
                TagValue::SByte(stream.get_bytes(n)?.iter().map(|&b| b as i8).collect())
            }
            FieldType::Short => TagValue::Short(
                (0..n).map(|_| stream.get_u16()).collect::<Result<_>>()?,
            ),
            FieldType::SShort => TagValue::SShort(
                (0..n)
                    .map(|_| stream.get_u16().map(|v| v as i16))
                    .collect::<Result<_>>()?,
            ),
            FieldType::Long | FieldType::Ifd => TagValue::Long(
                (0..n).map(|_| stream.get_u32()).collect::<Result<_>>()?,
            ),
            FieldType::SLong => TagValue::SLong(
                (0..n).map(|_| stream.get_i32()).collect::<Result<_>>()?,
            ),
            FieldType::Rational => TagValue::Rational(
                (0..n)
                    .map(|_| stream.tag_value_urational(FieldType::Rational))
                    .collect::<Result<_>>()?,
            ),
            FieldType::SRational => TagValue::SRational(
                (0..n)
                    .map(|_| stream.tag_value_srational(FieldType::SRational))
                    .collect::<Result<_>>()?,
            ),
            FieldType::Float => TagValue::Float(
                (0..n).map(|_| stream.get_f32()).collect::<Result<_>>()?,
            ),
            FieldType::Double => TagValue::Double(
                (0..n).map(|_| stream.get_f64()).collect::<Result<_>>()?,
            ),
            FieldType::Long8 => TagValue::Long(
                (0..n)
                    .map(|_| stream.get_u64().map(|v| v as u32))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

/// Order-independent view of one directory: tag code to typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDirectory {
    entries: BTreeMap<u16, TagValue>,
}

impl TagDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: u16, value: TagValue) -> Option<TagValue> {
        self.entries.insert(code, value)
    }

    pub fn get(&self, code: u16) -> Option<&TagValue> {
        self.entries.get(&code)
    }

    pub fn remove(&mut self, code: u16) -> Option<TagValue> {
        self.entries.remove(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u16, &TagValue)> {
        self.entries.iter()
    }

    /// Parses the first directory of a TIFF stream.
    pub fn parse(data: &[u8]) -> Result<(Endian, TagDirectory)> {
        let header = TiffHeader::read(data)?;
        let mut stream = TiffStream::new(data, header.endian);
        let ifd = Ifd::read(&mut stream, header.first_ifd)?;
        let mut directory = TagDirectory::new();
        for entry in &ifd.entries {
            directory.insert(entry.code, TagValue::read(&mut stream, entry)?);
        }
        Ok((header.endian, directory))
    }

    /// Serializes as a standalone TIFF stream holding one directory.
    pub fn serialize(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut builder = DirectoryBuilder::new();
        for (&code, value) in &self.entries {
            builder.add(code, value.clone())?;
        }
        let mut out = Vec::new();
        TiffHeader {
            endian,
            magic: TIFF_MAGIC,
            first_ifd: TIFF_HEADER_LEN as u64,
        }
        .write(&mut out);
        let block = builder.build(endian, TIFF_HEADER_LEN as u64)?;
        out.extend_from_slice(&block.bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::tags::types::tag;

    fn sample_directory() -> TagDirectory {
        let mut dir = TagDirectory::new();
        dir.insert(tag::IMAGE_WIDTH, TagValue::Long(vec![4000]));
        dir.insert(tag::BITS_PER_SAMPLE, TagValue::Short(vec![16]));
        dir.insert(tag::MAKE, TagValue::Ascii("Phase One".into()));
        dir.insert(tag::DNG_VERSION, TagValue::Byte(vec![1, 4, 0, 0]));
        dir.insert(
            tag::COLOR_MATRIX_1,
            TagValue::SRational(
                (0..9).map(|i| SRational::new(i * 1000 - 4000, 10000)).collect(),
            ),
        );
        dir.insert(
            tag::AS_SHOT_NEUTRAL,
            TagValue::Rational(vec![
                URational::new(1, 2),
                URational::new(1, 1),
                URational::new(2, 3),
            ]),
        );
        dir.insert(tag::PROFILE_TONE_CURVE, TagValue::Float(vec![0.0, 0.0, 0.5, 0.6, 1.0, 1.0]));
        dir.insert(tag::BASELINE_EXPOSURE, TagValue::SRational(vec![SRational::new(-1, 2)]));
        dir.insert(tag::NOISE_PROFILE, TagValue::Double(vec![1.5e-5, 2.0e-7]));
        dir.insert(tag::MAKER_NOTE, TagValue::Undefined(vec![0xFF; 7]));
        dir.insert(tag::BLACK_LEVEL_DELTA_H, TagValue::SShort(vec![-3, 4]));
        dir.insert(tag::EXPOSURE_BIAS_VALUE, TagValue::SLong(vec![-7]));
        dir.insert(tag::GPS_VERSION_ID, TagValue::SByte(vec![2, 2, 0, -1]));
        dir
    }

    #[test]
    fn parse_inverts_serialize_for_both_byte_orders() {
        let dir = sample_directory();
        for endian in [Endian::Little, Endian::Big] {
            let bytes = dir.serialize(endian).unwrap();
            let (parsed_endian, parsed) = TagDirectory::parse(&bytes).unwrap();
            assert_eq!(parsed_endian, endian);
            assert_eq!(parsed, dir);
        }
    }

    #[test]
    fn entries_are_written_in_tag_order() {
        let bytes = sample_directory().serialize(Endian::Little).unwrap();
        let mut stream = TiffStream::new(&bytes, Endian::Little);
        let ifd = Ifd::read(&mut stream, 8).unwrap();
        let codes: Vec<u16> = ifd.entries.iter().map(|e| e.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
        assert_eq!(ifd.next_offset, 0);
    }

    #[test]
    fn header_rejects_unknown_byte_order_and_magic() {
        assert!(TiffHeader::read(b"XX*\0\x08\0\0\0").is_err());
        assert!(TiffHeader::read(b"II\x2B\0\x08\0\0\0").is_err());
        let header = TiffHeader::read(b"MM\0\x2A\0\0\0\x08").unwrap();
        assert_eq!(header.endian, Endian::Big);
        assert_eq!(header.first_ifd, 8);
        assert_eq!(TiffHeader::read(b"IIRC\x08\0\0\0").unwrap().magic, PROFILE_MAGIC);
    }

    #[test]
    fn directory_offset_outside_stream_is_bad_format() {
        let data = b"II*\0\xFF\0\0\0";
        let mut stream = TiffStream::new(data, Endian::Little);
        assert!(matches!(
            Ifd::read(&mut stream, 255),
            Err(DngError::BadFormat(_))
        ));
    }
}
