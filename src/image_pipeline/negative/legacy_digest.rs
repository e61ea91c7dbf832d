//! Known corruptions of stored `RawImageDigest` values.
//!
//! Some third-party writers stored the digest with a damaged leading word.
//! A stored digest that differs from the computed one only in one of these
//! ways is accepted. Nothing else is repaired here.

use crate::image_pipeline::fingerprint::Fingerprint;

/// Leading word written in place of the first four digest bytes.
const SENTINEL_PREFIX: [u8; 4] = [0x08, 0x00, 0x00, 0x00];

/// Whether `stored` is a known corruption of `computed`.
pub fn is_known_corruption(stored: &Fingerprint, computed: &Fingerprint) -> bool {
    let stored = stored.as_bytes();
    let computed = computed.as_bytes();
    stored[..4] == SENTINEL_PREFIX || stored[4..] == computed[4..]
}
