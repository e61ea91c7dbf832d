//! Pipeline conversions module
//!
//! Orchestrates reading a raw file into a negative, building the stages the
//! writer needs and writing the result.

mod dng_pipeline;
pub mod metadata_store;

pub use dng_pipeline::DngPipeline;
pub use metadata_store::{GpsPosition, InMemoryMetadataStore, ItemId, MetadataStore};
