//! Write-side stream adapter that hashes everything written to it.
//!
//! Only strictly sequential appends starting at offset 0 are legal: a
//! positional write anywhere but the current end, or a resize to anything but
//! the current length, is a programming fault.

use std::io;

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::fingerprint::md5::Md5Printer;
use crate::image_pipeline::fingerprint::types::Fingerprint;

#[derive(Debug, Clone)]
pub struct Md5Stream {
    printer: Md5Printer,
    next_offset: u64,
    endian: Endian,
}

impl Default for Md5Stream {
    fn default() -> Self {
        Self::new(Endian::Big)
    }
}

impl Md5Stream {
    pub fn new(endian: Endian) -> Self {
        Self {
            printer: Md5Printer::new(),
            next_offset: 0,
            endian,
        }
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> u64 {
        self.next_offset
    }

    /// Positional write; `offset` must equal the current end of stream.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset != self.next_offset {
            return Err(DngError::program(format!(
                "out-of-order fingerprint write at {} (expected {})",
                offset, self.next_offset
            )));
        }
        self.put(data)
    }

    /// Length change; only the current length is accepted.
    pub fn set_length(&mut self, length: u64) -> Result<()> {
        if length != self.next_offset {
            return Err(DngError::program(format!(
                "fingerprint stream resized to {} (length is {})",
                length, self.next_offset
            )));
        }
        Ok(())
    }

    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        self.printer.process(data)?;
        self.next_offset += data.len() as u64;
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put(&[v])
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        let bytes = self.endian.u16_bytes(v);
        self.put(&bytes)
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        let bytes = self.endian.u32_bytes(v);
        self.put(&bytes)
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.put_u32(v as u32)
    }

    pub fn put_f32(&mut self, v: f32) -> Result<()> {
        self.put_u32(v.to_bits())
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        let bytes = self.endian.u64_bytes(v.to_bits());
        self.put(&bytes)
    }

    pub fn result(&mut self) -> Fingerprint {
        self.printer.result()
    }
}

impl io::Write for Md5Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put(buf).map_err(|e| io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
