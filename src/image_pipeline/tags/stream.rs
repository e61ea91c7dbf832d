//! Positioned, byte-order aware reader over an in-memory TIFF stream.
//!
//! The `tag_value_*` readers accept any compatible field type and convert,
//! so handlers only check the type class, not the exact type.

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::rational::{SRational, URational};
use crate::image_pipeline::tags::types::FieldType;

#[derive(Debug, Clone)]
pub struct TiffStream<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> TiffStream<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn set_position(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(DngError::EndOfFile(pos));
        }
        self.pos = pos as usize;
        Ok(())
    }

    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.set_position(self.position() + count)
    }

    /// Sub-stream over `[offset, offset + len)`, positioned at its start.
    pub fn sub_stream(&self, offset: u64, len: u64) -> Result<TiffStream<'a>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len() as u64)
            .ok_or(DngError::EndOfFile(offset.saturating_add(len)))?;
        Ok(TiffStream::new(
            &self.data[offset as usize..end as usize],
            self.endian,
        ))
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(DngError::EndOfFile(self.data.len() as u64))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let value = self
            .endian
            .read_u16(self.data, self.pos)
            .ok_or(DngError::EndOfFile(self.pos as u64))?;
        self.pos += 2;
        Ok(value)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let value = self
            .endian
            .read_u32(self.data, self.pos)
            .ok_or(DngError::EndOfFile(self.pos as u64))?;
        self.pos += 4;
        Ok(value)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let value = self
            .endian
            .read_u64(self.data, self.pos)
            .ok_or(DngError::EndOfFile(self.pos as u64))?;
        self.pos += 8;
        Ok(value)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64()?))
    }

    /// Reads one integer of `field_type` as `u32`.
    pub fn tag_value_u32(&mut self, field_type: FieldType) -> Result<u32> {
        Ok(match field_type {
            FieldType::Byte | FieldType::Undefined | FieldType::Ascii => self.get_u8()? as u32,
            FieldType::SByte => self.get_u8()? as i8 as u32,
            FieldType::Short => self.get_u16()? as u32,
            FieldType::SShort => self.get_u16()? as i16 as u32,
            FieldType::Long | FieldType::SLong | FieldType::Ifd => self.get_u32()?,
            FieldType::Long8 => self.get_u64()? as u32,
            other => self.tag_value_f64(other)? as u32,
        })
    }

    pub fn tag_value_u64(&mut self, field_type: FieldType) -> Result<u64> {
        match field_type {
            FieldType::Long8 => self.get_u64(),
            other => Ok(self.tag_value_u32(other)? as u64),
        }
    }

    pub fn tag_value_i32(&mut self, field_type: FieldType) -> Result<i32> {
        Ok(match field_type {
            FieldType::SByte => self.get_u8()? as i8 as i32,
            FieldType::SShort => self.get_u16()? as i16 as i32,
            FieldType::SLong => self.get_i32()?,
            FieldType::SRational | FieldType::Rational | FieldType::Float | FieldType::Double => {
                self.tag_value_f64(field_type)?.round() as i32
            }
            other => self.tag_value_u32(other)? as i32,
        })
    }

    /// Reads one numeric value of any type as `f64`.
    pub fn tag_value_f64(&mut self, field_type: FieldType) -> Result<f64> {
        Ok(match field_type {
            FieldType::Byte | FieldType::Undefined | FieldType::Ascii => self.get_u8()? as f64,
            FieldType::SByte => self.get_u8()? as i8 as f64,
            FieldType::Short => self.get_u16()? as f64,
            FieldType::SShort => self.get_u16()? as i16 as f64,
            FieldType::Long | FieldType::Ifd => self.get_u32()? as f64,
            FieldType::SLong => self.get_i32()? as f64,
            FieldType::Long8 => self.get_u64()? as f64,
            FieldType::Rational => {
                let n = self.get_u32()?;
                let d = self.get_u32()?;
                URational::new(n, d).as_f64()
            }
            FieldType::SRational => {
                let n = self.get_i32()?;
                let d = self.get_i32()?;
                SRational::new(n, d).as_f64()
            }
            FieldType::Float => self.get_f32()? as f64,
            FieldType::Double => self.get_f64()?,
        })
    }

    pub fn tag_value_urational(&mut self, field_type: FieldType) -> Result<URational> {
        match field_type {
            FieldType::Rational => {
                let n = self.get_u32()?;
                let d = self.get_u32()?;
                Ok(URational::new(n, d))
            }
            FieldType::SRational => {
                let n = self.get_i32()?;
                let d = self.get_i32()?;
                if (n < 0 && d > 0) || (n > 0 && d < 0) {
                    return Ok(URational::new(0, 1));
                }
                Ok(URational::new(n.unsigned_abs(), d.unsigned_abs()))
            }
            FieldType::Float | FieldType::Double => {
                Ok(URational::from_f64_auto(self.tag_value_f64(field_type)?.max(0.0)))
            }
            other => Ok(URational::new(self.tag_value_u32(other)?, 1)),
        }
    }

    pub fn tag_value_srational(&mut self, field_type: FieldType) -> Result<SRational> {
        match field_type {
            FieldType::SRational => {
                let n = self.get_i32()?;
                let d = self.get_i32()?;
                Ok(SRational::new(n, d))
            }
            FieldType::Rational => {
                let n = self.get_u32()?;
                let d = self.get_u32()?;
                Ok(SRational::new(n.min(i32::MAX as u32) as i32, d.min(i32::MAX as u32) as i32))
            }
            FieldType::Float | FieldType::Double => {
                Ok(SRational::from_f64(self.tag_value_f64(field_type)?, 10_000))
            }
            other => Ok(SRational::new(self.tag_value_i32(other)?, 1)),
        }
    }

    /// Reads `count` bytes as text, stopping at the first NUL.
    pub fn tag_value_ascii(&mut self, count: u32) -> Result<String> {
        let bytes = self.get_bytes(count as usize)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).trim_end().to_string())
    }

    pub fn tag_values_f64(&mut self, field_type: FieldType, count: u32) -> Result<Vec<f64>> {
        self.check_count_fits(field_type, count)?;
        (0..count).map(|_| self.tag_value_f64(field_type)).collect()
    }

    pub fn tag_values_u32(&mut self, field_type: FieldType, count: u32) -> Result<Vec<u32>> {
        self.check_count_fits(field_type, count)?;
        (0..count).map(|_| self.tag_value_u32(field_type)).collect()
    }

    pub fn tag_values_u64(&mut self, field_type: FieldType, count: u32) -> Result<Vec<u64>> {
        self.check_count_fits(field_type, count)?;
        (0..count).map(|_| self.tag_value_u64(field_type)).collect()
    }

    fn check_count_fits(&self, field_type: FieldType, count: u32) -> Result<()> {
        let needed = count as u64 * field_type.size() as u64;
        if self.position() + needed > self.data.len() as u64 {
            return Err(DngError::EndOfFile(self.position() + needed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_type_conversions() {
        let data = [0x00, 0x05, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x02];
        let mut stream = TiffStream::new(&data, Endian::Big);
        assert_eq!(stream.tag_value_u32(FieldType::Short).unwrap(), 5);
        assert_eq!(stream.tag_value_i32(FieldType::SShort).unwrap(), -2);
        assert_eq!(stream.tag_value_f64(FieldType::Rational).unwrap(), 1.5);
        assert!(stream.get_u8().is_err());
    }

    #[test]
    fn ascii_stops_at_nul() {
        let data = b"Canon\0junk";
        let mut stream = TiffStream::new(data, Endian::Little);
        assert_eq!(stream.tag_value_ascii(10).unwrap(), "Canon");
        assert_eq!(stream.position(), 10);
    }

    #[test]
    fn count_beyond_stream_is_end_of_file() {
        let data = [0u8; 8];
        let mut stream = TiffStream::new(&data, Endian::Little);
        assert!(matches!(
            stream.tag_values_f64(FieldType::Double, 2),
            Err(DngError::EndOfFile(_))
        ));
    }
}
