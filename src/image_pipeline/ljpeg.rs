//! Lossless (process 14, SOF3) JPEG codec used for compressed DNG tiles.
//!
//! Samples are predicted from already-coded neighbours, and the differences
//! are Huffman coded by magnitude category. Streams hold a single
//! interleaved scan of 1 to 4 components at 2 to 16 bits of precision.

pub mod bit_io;
pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod markers;
pub mod predictor;

#[cfg(test)]
mod tests;

pub use decoder::{DecodedImage, decode};
pub use encoder::{EncoderOptions, encode};
pub use predictor::Predictor;
