//! Streaming MD5 (RFC 1321).
//!
//! Input is buffered into 64-byte blocks. `result` pads and finalizes exactly
//! once; later calls hand back the cached digest without touching the state.

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::fingerprint::types::Fingerprint;

const BLOCK_LEN: usize = 64;

const INIT_STATE: [u32; 4] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];

const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, //
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, //
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, //
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee, 0xf57c_0faf, 0x4787_c62a, 0xa830_4613,
    0xfd46_9501, 0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be, 0x6b90_1122, 0xfd98_7193,
    0xa679_438e, 0x49b4_0821, 0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa, 0xd62f_105d,
    0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8, 0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed,
    0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a, 0xfffa_3942, 0x8771_f681, 0x6d9d_6122,
    0xfde5_380c, 0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70, 0x289b_7ec6, 0xeaa1_27fa,
    0xd4ef_3085, 0x0488_1d05, 0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665, 0xf429_2244,
    0x432a_ff97, 0xab94_23a7, 0xfc93_a039, 0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1, 0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb,
    0xeb86_d391,
];

#[derive(Debug, Clone)]
pub struct Md5Printer {
    state: [u32; 4],
    /// Message length in bits, low word first.
    count: [u32; 2],
    buffer: [u8; BLOCK_LEN],
    digest: Option<Fingerprint>,
    blocks_processed: u64,
}

impl Default for Md5Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Md5Printer {
    pub fn new() -> Self {
        Self {
            state: INIT_STATE,
            count: [0, 0],
            buffer: [0; BLOCK_LEN],
            digest: None,
            blocks_processed: 0,
        }
    }

    /// Discards all input and any cached digest.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_finalized(&self) -> bool {
        self.digest.is_some()
    }

    /// Number of 64-byte blocks run through the compression function.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Feeds more input. Fails once the digest has been produced.
    pub fn process(&mut self, data: &[u8]) -> Result<()> {
        if self.is_finalized() {
            return Err(DngError::program("MD5 input after finalization"));
        }
        self.update(data);
        Ok(())
    }

    /// Finalizes on first call; afterwards returns the cached digest.
    pub fn result(&mut self) -> Fingerprint {
        if let Some(digest) = self.digest {
            return digest;
        }

        let bits = [self.count[0].to_le_bytes(), self.count[1].to_le_bytes()].concat();

        let index = ((self.count[0] >> 3) & 0x3f) as usize;
        let pad_len = if index < 56 { 56 - index } else { 120 - index };
        let mut padding = [0u8; BLOCK_LEN];
        padding[0] = 0x80;
        self.update(&padding[..pad_len]);
        self.update(&bits);

        let mut data = [0u8; 16];
        for (chunk, word) in data.chunks_exact_mut(4).zip(self.state.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let digest = Fingerprint::from_bytes(data);
        self.digest = Some(digest);
        digest
    }

    /// One-shot digest of a byte slice.
    pub fn digest(data: &[u8]) -> Fingerprint {
        let mut printer = Md5Printer::new();
        printer.update(data);
        printer.result()
    }

    fn update(&mut self, mut input: &[u8]) {
        let index = ((self.count[0] >> 3) & 0x3f) as usize;

        let added_bits = (input.len() as u64) << 3;
        let low = self.count[0].wrapping_add(added_bits as u32);
        if low < self.count[0] {
            self.count[1] = self.count[1].wrapping_add(1);
        }
        self.count[0] = low;
        self.count[1] = self.count[1].wrapping_add((added_bits >> 32) as u32);

        let part_len = BLOCK_LEN - index;
        if input.len() >= part_len {
            self.buffer[index..].copy_from_slice(&input[..part_len]);
            let block = self.buffer;
            self.transform(&block);
            input = &input[part_len..];

            while input.len() >= BLOCK_LEN {
                let mut block = [0u8; BLOCK_LEN];
                block.copy_from_slice(&input[..BLOCK_LEN]);
                self.transform(&block);
                input = &input[BLOCK_LEN..];
            }
            self.buffer[..input.len()].copy_from_slice(input);
        } else {
            self.buffer[index..index + input.len()].copy_from_slice(input);
        }
    }

    fn transform(&mut self, block: &[u8; BLOCK_LEN]) {
        let mut x = [0u32; 16];
        for (i, w) in x.iter_mut().enumerate() {
            *w = u32::from_le_bytes([
                block[i * 4],
                block[i * 4 + 1],
                block[i * 4 + 2],
                block[i * 4 + 3],
            ]);
        }

        let [mut a, mut b, mut c, mut d] = self.state;
        for i in 0..64 {
            let (f, g) = match i / 16 {
                0 => ((b & c) | (!b & d), i),
                1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                2 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let rotated = a
                .wrapping_add(f)
                .wrapping_add(K[i])
                .wrapping_add(x[g])
                .rotate_left(S[i]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(rotated);
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
        self.blocks_processed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(data: &[u8]) -> String {
        Md5Printer::digest(data).to_string()
    }

    #[test]
    fn rfc1321_test_suite() {
        assert_eq!(hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex(b"a"), "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hex(b"message digest"), "f96b697d7cb7938d525a2f31aaf161d0");
        assert_eq!(
            hex(b"abcdefghijklmnopqrstuvwxyz"),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
        assert_eq!(
            hex(b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"),
            "d174ab98d277d9f5a5611c2c9f419d9f"
        );
        assert_eq!(
            hex(b"12345678901234567890123456789012345678901234567890123456789012345678901234567890"),
            "57edf4a22be3c955ac49da2e2107b67a"
        );
    }

    #[test]
    fn chunked_input_matches_one_shot() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut printer = Md5Printer::new();
        for chunk in data.chunks(37) {
            printer.process(chunk).unwrap();
        }
        assert_eq!(printer.result(), Md5Printer::digest(&data));
    }

    #[test]
    fn result_is_idempotent_without_reprocessing() {
        let mut printer = Md5Printer::new();
        printer.process(&[0x5a; 200]).unwrap();

        let first = printer.result();
        let blocks = printer.blocks_processed();
        for _ in 0..5 {
            assert_eq!(printer.result(), first);
        }
        assert_eq!(printer.blocks_processed(), blocks);
    }

    #[test]
    fn process_after_result_is_rejected() {
        let mut printer = Md5Printer::new();
        printer.result();
        assert!(matches!(printer.process(b"late"), Err(DngError::Unknown(_))));
    }

    #[test]
    fn padding_boundary_lengths() {
        // 55, 56 and 64 bytes straddle the length-field boundary.
        assert_eq!(hex(&[b'a'; 55]), "ef1772b6dff9a122358552954ad0df65");
        assert_eq!(hex(&[b'a'; 56]), "3b0c8ac703f828b04c6c197006d17218");
        assert_eq!(hex(&[b'a'; 64]), "014842d480b571495a4a0363793f7367");
    }
}
