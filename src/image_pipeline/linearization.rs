//! Black/white level correction turning stage 1 samples into linear values.

pub mod info;
pub mod linearize;

pub use info::LinearizationInfo;
pub use linearize::LINEAR_WHITE;
