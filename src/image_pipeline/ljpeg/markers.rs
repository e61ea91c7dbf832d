//! Marker segments of a lossless (SOF3) JPEG stream.

use crate::image_pipeline::common::error::{DngError, Result};

/// JPEG marker codes used by the lossless codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Start of Image
    Soi,
    /// End of Image
    Eoi,
    /// Start of Frame (lossless, Huffman)
    Sof3,
    /// Any other start-of-frame variant; not decodable here
    OtherSof(u8),
    /// Define Huffman Table
    Dht,
    /// Define Restart Interval
    Dri,
    /// Start of Scan
    Sos,
    /// Restart marker 0..=7
    Rst(u8),
    /// Application data 0..=15
    App(u8),
    /// Comment
    Com,
    /// Anything else carrying a length field
    Other(u8),
}

impl Marker {
    pub fn from_code(code: u8) -> Marker {
        match code {
            0xD8 => Marker::Soi,
            0xD9 => Marker::Eoi,
            0xC3 => Marker::Sof3,
            0xC4 => Marker::Dht,
            0xDD => Marker::Dri,
            0xDA => Marker::Sos,
            0xFE => Marker::Com,
            0xD0..=0xD7 => Marker::Rst(code - 0xD0),
            0xE0..=0xEF => Marker::App(code - 0xE0),
            0xC0..=0xCF if code != 0xC8 && code != 0xCC => Marker::OtherSof(code),
            _ => Marker::Other(code),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Marker::Soi => 0xD8,
            Marker::Eoi => 0xD9,
            Marker::Sof3 => 0xC3,
            Marker::Dht => 0xC4,
            Marker::Dri => 0xDD,
            Marker::Sos => 0xDA,
            Marker::Com => 0xFE,
            Marker::Rst(n) => 0xD0 + (n & 7),
            Marker::App(n) => 0xE0 + (n & 15),
            Marker::OtherSof(code) | Marker::Other(code) => code,
        }
    }

    /// Check if this marker type has a length field.
    pub fn has_length(&self) -> bool {
        !matches!(self, Marker::Soi | Marker::Eoi | Marker::Rst(_))
    }
}

/// Big-endian reader over marker segment payloads.
#[derive(Debug)]
pub struct SegmentReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = *self
            .data
            .get(self.pos)
            .ok_or(DngError::EndOfFile(self.pos as u64))?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(DngError::EndOfFile(self.data.len() as u64))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Finds the next `0xFF xx` marker, skipping fill bytes, and returns it.
    pub fn next_marker(&mut self) -> Result<Marker> {
        while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
            self.pos += 1;
        }
        while self.pos + 1 < self.data.len() && self.data[self.pos + 1] == 0xFF {
            self.pos += 1;
        }
        if self.pos + 1 >= self.data.len() {
            return Err(DngError::EndOfFile(self.data.len() as u64));
        }
        let code = self.data[self.pos + 1];
        self.pos += 2;
        Ok(Marker::from_code(code))
    }

    /// Reads a length-prefixed segment body (length includes its own two bytes).
    pub fn read_segment(&mut self) -> Result<&'a [u8]> {
        let length = self.read_u16()? as usize;
        if length < 2 {
            return Err(DngError::bad_format(format!(
                "JPEG segment length {} too short",
                length
            )));
        }
        self.read_bytes(length - 2)
    }

    pub fn skip_to(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }
}

/// One component of a lossless frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameComponent {
    pub id: u8,
    pub sampling: u8,
}

/// Parsed SOF3 segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<FrameComponent>,
}

impl FrameHeader {
    pub fn parse(body: &[u8]) -> Result<FrameHeader> {
        let mut reader = SegmentReader::new(body);
        let precision = reader.read_u8()?;
        let height = reader.read_u16()?;
        let width = reader.read_u16()?;
        let count = reader.read_u8()?;

        if !(2..=16).contains(&precision) {
            return Err(DngError::bad_format(format!(
                "lossless JPEG precision {} out of range",
                precision
            )));
        }
        if height == 0 || width == 0 {
            return Err(DngError::InvalidDimensions(width as usize, height as usize));
        }
        if !(1..=4).contains(&count) {
            return Err(DngError::bad_format(format!(
                "lossless JPEG with {} components",
                count
            )));
        }

        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = reader.read_u8()?;
            let sampling = reader.read_u8()?;
            let _quant_table = reader.read_u8()?;
            if sampling != 0x11 {
                return Err(DngError::bad_format(format!(
                    "component {} subsampled ({:#04x})",
                    id, sampling
                )));
            }
            components.push(FrameComponent { id, sampling });
        }

        Ok(FrameHeader {
            precision,
            height,
            width,
            components,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0xFF, Marker::Sof3.code()]);
        let length = 8 + 3 * self.components.len() as u16;
        out.extend_from_slice(&length.to_be_bytes());
        out.push(self.precision);
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.push(self.components.len() as u8);
        for component in &self.components {
            out.extend_from_slice(&[component.id, component.sampling, 0]);
        }
    }
}

/// Parsed SOS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    /// (component id, Huffman table index) per scan component.
    pub components: Vec<(u8, u8)>,
    pub predictor: u8,
    pub point_transform: u8,
}

impl ScanHeader {
    pub fn parse(body: &[u8]) -> Result<ScanHeader> {
        let mut reader = SegmentReader::new(body);
        let count = reader.read_u8()?;
        if !(1..=4).contains(&count) {
            return Err(DngError::bad_format(format!(
                "scan with {} components",
                count
            )));
        }
        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = reader.read_u8()?;
            let tables = reader.read_u8()?;
            components.push((id, tables >> 4));
        }
        let predictor = reader.read_u8()?;
        let _spectral_end = reader.read_u8()?;
        let approximation = reader.read_u8()?;

        Ok(ScanHeader {
            components,
            predictor,
            point_transform: approximation & 0x0F,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0xFF, Marker::Sos.code()]);
        let length = 6 + 2 * self.components.len() as u16;
        out.extend_from_slice(&length.to_be_bytes());
        out.push(self.components.len() as u8);
        for &(id, table) in &self.components {
            out.extend_from_slice(&[id, table << 4]);
        }
        out.extend_from_slice(&[self.predictor, 0, self.point_transform & 0x0F]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_codes_round_trip() {
        for code in [0xD8, 0xD9, 0xC3, 0xC4, 0xDD, 0xDA, 0xD3, 0xE1, 0xFE, 0xC0] {
            assert_eq!(Marker::from_code(code).code(), code);
        }
        assert_eq!(Marker::from_code(0xD5), Marker::Rst(5));
        assert_eq!(Marker::from_code(0xC1), Marker::OtherSof(0xC1));
        assert!(!Marker::Rst(0).has_length());
    }

    #[test]
    fn next_marker_skips_fill_bytes() {
        let data = [0x12, 0xFF, 0xFF, 0xFF, 0xC4, 0x00];
        let mut reader = SegmentReader::new(&data);
        assert_eq!(reader.next_marker().unwrap(), Marker::Dht);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn frame_header_rejects_subsampling() {
        let body = [12, 0, 4, 0, 4, 1, 0, 0x21, 0];
        assert!(matches!(
            FrameHeader::parse(&body),
            Err(DngError::BadFormat(_))
        ));
    }
}
