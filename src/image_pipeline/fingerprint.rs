//! Content fingerprints: streaming MD5 and its stream adapter.

pub mod md5;
pub mod stream;
pub mod types;

pub use md5::Md5Printer;
pub use stream::Md5Stream;
pub use types::Fingerprint;
