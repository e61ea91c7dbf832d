use std::io::Write;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::writer::types::WriterConfig;

/// Serializes a negative into an output format.
pub trait ImageWriter {
    /// Whether `write_negative` needs stage 3 to have been built.
    fn needs_stage3(&self, host: &Host) -> bool;

    /// Writes `negative` to `output`.
    ///
    /// # Arguments
    ///
    /// * `negative` - Negative to write; digests and the unique id may be
    ///   computed and cached on it
    /// * `host` - Host configuration and abort flag
    /// * `output` - Destination of the encoded file
    /// * `config` - Compression, tiling and version settings
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The whole file was written
    /// * `Err(DngError)` - The negative lacks the image this writer needs, or
    ///   encoding or writing failed
    fn write_negative(
        &self,
        negative: &mut Negative,
        host: &Host,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()>;
}
