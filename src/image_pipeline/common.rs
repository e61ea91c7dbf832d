//! Common utilities module
//!
//! Shared building blocks used across the pipeline: errors, the host
//! context, geometry, rationals, colour matrices, image buffers and timing.

pub mod endian;
pub mod error;
pub mod geometry;
pub mod host;
pub mod image;
pub mod matrix;
pub mod rational;
pub mod timing;

pub use endian::Endian;
pub use error::{DngError, Result, Severity};
pub use geometry::{Point, Rect};
pub use host::{DngVersion, Host, HostConfig, HostConfigBuilder};
pub use image::{PixelType, StageImage};
pub use matrix::{Matrix, Vector};
pub use rational::{SRational, URational};
pub use timing::{PipelineTimings, StepTiming, Timer};
