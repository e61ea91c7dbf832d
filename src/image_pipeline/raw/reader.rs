use tracing::debug;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::raw::dng_reader::DngReader;
use crate::image_pipeline::raw::rawloader_reader::RawLoaderReader;
use crate::image_pipeline::tags::parser::parse_tiff;

/// Turns the bytes of a raw file into a negative holding stage 1.
pub trait RawImageReader {
    /// Parses `data` and reads its raw image.
    ///
    /// # Arguments
    ///
    /// * `data` - Complete contents of the raw or DNG file
    /// * `host` - Host configuration and abort flag
    ///
    /// # Returns
    ///
    /// * `Ok(Negative)` - Negative in the `Stage1Read` state
    /// * `Err(DngError)` - The file could not be parsed or its image read
    fn read_negative(&self, data: &[u8], host: &Host) -> Result<Negative>;
}

/// Reads DNG files natively and hands anything else to `rawloader`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReader;

impl RawImageReader for AutoReader {
    /// Reads a DNG natively when the stream carries `DNGVersion`, and hands
    /// any other file to rawloader.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dng_negative::image_pipeline::{AutoReader, Host, RawImageReader};
    ///
    /// let bytes = std::fs::read("capture.nef").unwrap();
    /// let negative = AutoReader.read_negative(&bytes, &Host::default()).unwrap();
    /// println!("{}", negative.model_name);
    /// ```
    fn read_negative(&self, data: &[u8], host: &Host) -> Result<Negative> {
        match parse_tiff(data, host) {
            Ok(info) if info.is_dng() => DngReader::negative_from_info(data, &info, host),
            Ok(_) => {
                debug!("TIFF container without DNGVersion, using rawloader");
                RawLoaderReader.read_negative(data, host)
            }
            Err(e) => {
                debug!("Not a TIFF stream ({}), using rawloader", e);
                RawLoaderReader.read_negative(data, host)
            }
        }
    }
}
