use tracing::info;

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::{DNG_VERSION_CURRENT, Host};
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::raw::reader::RawImageReader;
use crate::image_pipeline::tags::parser::{TiffInfo, parse_tiff};

/// Reads DNG files through the tag parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct DngReader;

impl DngReader {
    /// Parses the negative described by `info` and reads its stage 1 image.
    pub fn negative_from_info(data: &[u8], info: &TiffInfo, host: &Host) -> Result<Negative> {
        if info.shared.dng_backward_version > DNG_VERSION_CURRENT {
            return Err(DngError::bad_format(format!(
                "DNGBackwardVersion {:#010x} is newer than supported",
                info.shared.dng_backward_version
            )));
        }
        let mut negative = Negative::parse(info, host)?;
        negative.read_stage1(data, info, host)?;
        if negative.is_damaged() {
            info!("Continuing with damaged negative \"{}\"", negative.model_name);
        }
        Ok(negative)
    }
}

impl RawImageReader for DngReader {
    /// Reads a DNG file, refusing plain TIFF streams and DNGs newer than
    /// this reader supports.
    ///
    /// A raw image whose stored digest does not match is still returned,
    /// flagged through `Negative::is_damaged`.
    fn read_negative(&self, data: &[u8], host: &Host) -> Result<Negative> {
        let info = parse_tiff(data, host)?;
        if !info.is_dng() {
            return Err(DngError::bad_format("TIFF stream without DNGVersion"));
        }
        Self::negative_from_info(data, &info, host)
    }
}
