use std::fmt;

/// 128-bit content digest. All zero means "not computed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fingerprint {
    pub data: [u8; 16],
}

impl Fingerprint {
    pub const NULL: Fingerprint = Fingerprint { data: [0; 16] };

    pub const fn from_bytes(data: [u8; 16]) -> Self {
        Self { data }
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let data: [u8; 16] = bytes.try_into().ok()?;
        Some(Self { data })
    }

    pub fn is_null(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_null()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.data
    }

    /// First 32 bits, handy for logging.
    pub fn collapse32(&self) -> u32 {
        self.data
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .fold(0, |acc, w| acc ^ w)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.data {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
