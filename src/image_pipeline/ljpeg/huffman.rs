//! Huffman tables for difference categories 0..=16.
//!
//! Tables are held in DHT form (code counts per length plus symbol list) and
//! expanded into canonical codes for encoding, or into an 8-bit lookup with a
//! length-by-length fallback for decoding.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::ljpeg::bit_io::BitReader;
use tracing::warn;

/// Difference categories 0..=16.
pub const SYMBOL_COUNT: usize = 17;

pub const MAX_CODE_LENGTH: usize = 16;

const LOOKUP_BITS: u32 = 8;

/// DHT payload for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    /// `counts[l]` = number of codes of length `l + 1`.
    pub counts: [u8; MAX_CODE_LENGTH],
    pub symbols: Vec<u8>,
}

impl HuffmanTable {
    pub fn new(counts: [u8; MAX_CODE_LENGTH], symbols: Vec<u8>) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total != symbols.len() || total > 256 {
            return Err(DngError::bad_format(format!(
                "Huffman table lists {} codes for {} symbols",
                total,
                symbols.len()
            )));
        }
        if let Some(&bad) = symbols.iter().find(|&&s| s as usize >= SYMBOL_COUNT) {
            return Err(DngError::bad_format(format!(
                "Huffman symbol {} out of range for lossless data",
                bad
            )));
        }
        let table = Self { counts, symbols };
        table.canonical_codes()?;
        Ok(table)
    }

    /// Fixed table covering every category, used when an optimal table
    /// would need codes longer than 16 bits.
    pub fn default_table() -> Self {
        let mut counts = [0u8; MAX_CODE_LENGTH];
        counts[2] = 7;
        counts[3..13].fill(1);
        Self {
            counts,
            symbols: (0..SYMBOL_COUNT as u8).collect(),
        }
    }

    /// Optimal code for the given category frequencies, or `None` when some
    /// code would exceed 16 bits.
    ///
    /// A reserved pseudo-symbol with frequency 1 keeps every real symbol off
    /// the all-ones code.
    pub fn optimal(frequencies: &[u32; SYMBOL_COUNT]) -> Option<Self> {
        let n = SYMBOL_COUNT + 1;
        let mut freq: Vec<u64> = frequencies.iter().map(|&f| f as u64).collect();
        freq.push(1);
        let mut code_size = vec![0usize; n];
        let mut others: Vec<Option<usize>> = vec![None; n];

        loop {
            let Some(c1) = smallest(&freq, None) else {
                break;
            };
            let Some(c2) = smallest(&freq, Some(c1)) else {
                break;
            };

            freq[c1] += freq[c2];
            freq[c2] = 0;

            let mut node = c1;
            code_size[node] += 1;
            while let Some(next) = others[node] {
                node = next;
                code_size[node] += 1;
            }
            others[node] = Some(c2);

            let mut node = c2;
            code_size[node] += 1;
            while let Some(next) = others[node] {
                node = next;
                code_size[node] += 1;
            }
        }

        if code_size.iter().any(|&size| size > MAX_CODE_LENGTH) {
            return None;
        }

        let mut counts = [0u8; MAX_CODE_LENGTH];
        for &size in code_size.iter().filter(|&&size| size > 0) {
            counts[size - 1] += 1;
        }
        // Drop the pseudo-symbol: it holds one of the longest codes.
        if let Some(longest) = counts.iter().rposition(|&c| c > 0) {
            counts[longest] -= 1;
        }

        let mut symbols = Vec::new();
        for len in 1..=MAX_CODE_LENGTH {
            for (symbol, &size) in code_size.iter().enumerate().take(SYMBOL_COUNT) {
                if size == len {
                    symbols.push(symbol as u8);
                }
            }
        }

        Some(Self { counts, symbols })
    }

    /// Optimal table, falling back to the default one with a warning.
    pub fn optimal_or_default(frequencies: &[u32; SYMBOL_COUNT]) -> Self {
        match Self::optimal(frequencies) {
            Some(table) => table,
            None => {
                warn!("Optimal Huffman code exceeds 16 bits, using default table");
                Self::default_table()
            }
        }
    }

    /// `(code, length)` for each entry of `symbols`, in order.
    fn canonical_codes(&self) -> Result<Vec<(u32, u32)>> {
        let mut codes = Vec::with_capacity(self.symbols.len());
        let mut code = 0u32;
        for (i, &count) in self.counts.iter().enumerate() {
            let len = i as u32 + 1;
            for _ in 0..count {
                if code >= (1 << len) {
                    return Err(DngError::bad_format("Huffman code lengths overflow"));
                }
                codes.push((code, len));
                code += 1;
            }
            code <<= 1;
        }
        Ok(codes)
    }

    pub fn encoder(&self) -> Result<HuffmanEncoder> {
        let mut codes = [(0u32, 0u32); SYMBOL_COUNT];
        for (&symbol, code) in self.symbols.iter().zip(self.canonical_codes()?) {
            codes[symbol as usize] = code;
        }
        Ok(HuffmanEncoder { codes })
    }

    pub fn decoder(&self) -> Result<HuffmanDecoder> {
        HuffmanDecoder::new(self)
    }

    /// Parses every table in a DHT segment body as `(index, table)`.
    pub fn parse_segment(body: &[u8]) -> Result<Vec<(u8, HuffmanTable)>> {
        let mut tables = Vec::new();
        let mut pos = 0;
        while pos < body.len() {
            let class_index = body[pos];
            let counts_end = pos + 1 + MAX_CODE_LENGTH;
            if counts_end > body.len() {
                return Err(DngError::bad_format("truncated DHT segment"));
            }
            let mut counts = [0u8; MAX_CODE_LENGTH];
            counts.copy_from_slice(&body[pos + 1..counts_end]);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            if counts_end + total > body.len() {
                return Err(DngError::bad_format("truncated DHT symbol list"));
            }
            let symbols = body[counts_end..counts_end + total].to_vec();
            let index = class_index & 0x0F;
            if index > 3 {
                return Err(DngError::bad_format(format!(
                    "Huffman table index {} out of range",
                    index
                )));
            }
            tables.push((index, HuffmanTable::new(counts, symbols)?));
            pos = counts_end + total;
        }
        Ok(tables)
    }

    /// Writes one DHT segment holding `tables` (lossless data uses class 0).
    pub fn write_segment(tables: &[(u8, &HuffmanTable)], out: &mut Vec<u8>) {
        let length: usize = 2 + tables
            .iter()
            .map(|(_, t)| 1 + MAX_CODE_LENGTH + t.symbols.len())
            .sum::<usize>();
        out.extend_from_slice(&[0xFF, 0xC4]);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        for (index, table) in tables {
            out.push(*index & 0x0F);
            out.extend_from_slice(&table.counts);
            out.extend_from_slice(&table.symbols);
        }
    }
}

fn smallest(freq: &[u64], exclude: Option<usize>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &f) in freq.iter().enumerate() {
        if f == 0 || Some(i) == exclude {
            continue;
        }
        // Ties go to the higher index so the pseudo-symbol merges first.
        if best.is_none_or(|b| f <= freq[b]) {
            best = Some(i);
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct HuffmanEncoder {
    codes: [(u32, u32); SYMBOL_COUNT],
}

impl HuffmanEncoder {
    /// `(code, length)` for a category; length 0 means the table has no code.
    #[inline]
    pub fn code(&self, symbol: usize) -> (u32, u32) {
        self.codes[symbol]
    }
}

#[derive(Debug, Clone)]
pub struct HuffmanDecoder {
    /// `(length, symbol)` keyed by the next 8 bits; length 0 = slow path.
    lookup: [(u8, u8); 1 << LOOKUP_BITS],
    max_code: [i32; MAX_CODE_LENGTH + 2],
    min_code: [i32; MAX_CODE_LENGTH + 1],
    val_ptr: [usize; MAX_CODE_LENGTH + 1],
    symbols: Vec<u8>,
}

impl HuffmanDecoder {
    fn new(table: &HuffmanTable) -> Result<Self> {
        let codes = table.canonical_codes()?;
        let mut lookup = [(0u8, 0u8); 1 << LOOKUP_BITS];
        let mut max_code = [-1i32; MAX_CODE_LENGTH + 2];
        let mut min_code = [0i32; MAX_CODE_LENGTH + 1];
        let mut val_ptr = [0usize; MAX_CODE_LENGTH + 1];

        let mut p = 0usize;
        for len in 1..=MAX_CODE_LENGTH {
            let count = table.counts[len - 1] as usize;
            if count > 0 {
                val_ptr[len] = p;
                min_code[len] = codes[p].0 as i32;
                p += count;
                max_code[len] = codes[p - 1].0 as i32;
            }
        }
        max_code[MAX_CODE_LENGTH + 1] = i32::MAX;

        for (&(code, len), &symbol) in codes.iter().zip(table.symbols.iter()) {
            if len > LOOKUP_BITS {
                continue;
            }
            let shift = LOOKUP_BITS - len;
            let base = (code << shift) as usize;
            for entry in &mut lookup[base..base + (1 << shift)] {
                *entry = (len as u8, symbol);
            }
        }

        Ok(Self {
            lookup,
            max_code,
            min_code,
            val_ptr,
            symbols: table.symbols.clone(),
        })
    }

    /// Decodes one category symbol.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let (len, symbol) = self.lookup[reader.peek_bits(LOOKUP_BITS) as usize];
        if len > 0 {
            reader.consume(len as u32);
            return Ok(symbol);
        }
        self.decode_slow(reader)
    }

    fn decode_slow(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let mut code = reader.get_bits(1) as i32;
        let mut len = 1usize;
        while code > self.max_code[len] {
            len += 1;
            if len > MAX_CODE_LENGTH {
                return Err(DngError::Decode("corrupt Huffman code".into()));
            }
            code = (code << 1) | reader.get_bits(1) as i32;
        }
        let index = self.val_ptr[len] + (code - self.min_code[len]) as usize;
        self.symbols
            .get(index)
            .copied()
            .ok_or_else(|| DngError::Decode("Huffman code outside table".into()))
    }
}
