//! Entropy-coded segment bit reader and writer.
//!
//! Both sides handle `0xFF 0x00` byte stuffing. The reader stops at the first
//! real marker and feeds zero bits after it; consuming any of those zero
//! bits marks the reader as overrun.

use crate::image_pipeline::common::error::{DngError, Result};

#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    bits: u32,
    /// Trailing zero bits in `acc` that did not come from the stream.
    padding: u32,
    marker: Option<u8>,
    overrun: bool,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            bits: 0,
            padding: 0,
            marker: None,
            overrun: false,
        }
    }

    fn fill(&mut self) {
        while self.bits <= 56 {
            let byte = if self.marker.is_some() {
                None
            } else {
                self.next_byte()
            };
            match byte {
                Some(b) => {
                    self.acc = (self.acc << 8) | b as u64;
                }
                None => {
                    self.acc <<= 8;
                    self.padding += 8;
                }
            }
            self.bits += 8;
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        loop {
            let byte = *self.data.get(self.pos)?;
            if byte != 0xFF {
                self.pos += 1;
                return Some(byte);
            }
            match self.data.get(self.pos + 1) {
                Some(0x00) => {
                    self.pos += 2;
                    return Some(0xFF);
                }
                Some(0xFF) => self.pos += 1,
                Some(&code) => {
                    self.marker = Some(code);
                    self.pos += 2;
                    return None;
                }
                None => {
                    self.pos += 1;
                    return None;
                }
            }
        }
    }

    /// Next `count` bits (at most 16) without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, count: u32) -> u32 {
        if self.bits < count {
            self.fill();
        }
        ((self.acc >> (self.bits - count)) & ((1u64 << count) - 1)) as u32
    }

    #[inline]
    pub fn consume(&mut self, count: u32) {
        if self.bits < count {
            self.fill();
        }
        self.bits -= count;
        if self.bits < self.padding {
            self.overrun = true;
        }
    }

    #[inline]
    pub fn get_bits(&mut self, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }
        let value = self.peek_bits(count);
        self.consume(count);
        value
    }

    /// True once bits past the end of the entropy-coded data were consumed.
    pub fn is_overrun(&self) -> bool {
        self.overrun
    }

    /// Drops buffered bits and consumes `RST<expected>`.
    pub fn process_restart(&mut self, expected: u8) -> Result<()> {
        let marker = match self.marker.take() {
            Some(code) => code,
            None => self.scan_to_marker()?,
        };
        if marker != 0xD0 + (expected & 7) {
            return Err(DngError::bad_format(format!(
                "expected RST{} marker, found {:#04x}",
                expected & 7,
                marker
            )));
        }
        self.acc = 0;
        self.bits = 0;
        self.padding = 0;
        self.overrun = false;
        Ok(())
    }

    fn scan_to_marker(&mut self) -> Result<u8> {
        while self.pos + 1 < self.data.len() {
            if self.data[self.pos] == 0xFF {
                let code = self.data[self.pos + 1];
                if code != 0x00 && code != 0xFF {
                    self.pos += 2;
                    return Ok(code);
                }
            }
            self.pos += 1;
        }
        Err(DngError::EndOfFile(self.data.len() as u64))
    }

    /// Offset of the marker that ended the segment, or the data length.
    pub fn finish(mut self) -> usize {
        if self.marker.is_some() {
            return self.pos - 2;
        }
        match self.scan_to_marker() {
            Ok(_) => self.pos - 2,
            Err(_) => self.data.len(),
        }
    }
}

/// MSB-first bit writer with byte stuffing.
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    pub fn new(out: Vec<u8>) -> Self {
        Self {
            out,
            acc: 0,
            bits: 0,
        }
    }

    /// Appends the low `count` bits of `value` (`count` at most 16).
    #[inline]
    pub fn put_bits(&mut self, value: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.acc = (self.acc << count) | (value & ((1 << count) - 1));
        self.bits += count;
        while self.bits >= 8 {
            let byte = (self.acc >> (self.bits - 8)) as u8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
            self.bits -= 8;
        }
        self.acc &= (1 << self.bits) - 1;
    }

    /// Pads the final partial byte with one bits.
    pub fn flush(&mut self) {
        if self.bits > 0 {
            let pad = 8 - self.bits;
            self.put_bits((1 << pad) - 1, pad);
        }
    }

    /// Flushes and writes a bare marker.
    pub fn put_marker(&mut self, code: u8) {
        self.flush();
        self.out.extend_from_slice(&[0xFF, code]);
    }

    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.out
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.flush();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_stuffs_ff_bytes() {
        let mut writer = BitWriter::default();
        writer.put_bits(0xFF, 8);
        writer.put_bits(0b101, 3);
        assert_eq!(writer.into_inner(), vec![0xFF, 0x00, 0b1011_1111]);
    }

    #[test]
    fn reader_unstuffs_and_stops_at_marker() {
        let data = [0xFF, 0x00, 0xA5, 0xFF, 0xD9];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.get_bits(8), 0xFF);
        assert_eq!(reader.get_bits(4), 0xA);
        assert_eq!(reader.get_bits(4), 0x5);
        assert!(!reader.is_overrun());
        assert_eq!(reader.get_bits(8), 0);
        assert!(reader.is_overrun());
        assert_eq!(reader.finish(), 3);
    }

    #[test]
    fn restart_realigns_to_byte_boundary() {
        let data = [0b1100_0000, 0xFF, 0xD0, 0b1010_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.get_bits(2), 0b11);
        reader.process_restart(0).unwrap();
        assert_eq!(reader.get_bits(3), 0b101);
        assert!(matches!(reader.process_restart(1), Err(DngError::EndOfFile(_))));
    }
}
