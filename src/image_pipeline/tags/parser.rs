//! Walks the directories of a TIFF/DNG stream and dispatches each tag.
//!
//! Every entry is offered to the handlers in a fixed order: image
//! directory, EXIF, shared, camera profile. The first handler that returns
//! `Ok(true)` owns the tag; later handlers never see it. Tags no handler
//! claims are skipped.
//!
//! A handler fails with a recoverable `BadFormat` when a tag does not match
//! its type/count schema. Outside strict mode the parser logs a warning and
//! moves on; in strict mode the error ends the parse.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::image_pipeline::common::endian::Endian;
use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::Host;
use crate::image_pipeline::tags::directory::{Ifd, TagEntry, TiffHeader};
use crate::image_pipeline::tags::exif::{ExifHandler, ExifInfo};
use crate::image_pipeline::tags::image_dir::{ImageDirectory, ImageDirectoryHandler};
use crate::image_pipeline::tags::profile_info::{ProfileHandler, ProfileInfo};
use crate::image_pipeline::tags::shared::{SharedHandler, SharedInfo};
use crate::image_pipeline::tags::stream::TiffStream;
use crate::image_pipeline::tags::types::{
    MAX_IMAGE_DIRECTORIES, PROFILE_MAGIC, SUBFILE_MAIN_IMAGE, TIFF_MAGIC, TagContext,
};

/// One cooperating group of tag parsers.
pub trait TagHandler {
    fn name(&self) -> &'static str;

    /// Parses `entry` if this handler owns it in `context`.
    ///
    /// The stream is positioned at the entry's value. Returns `Ok(false)`
    /// without reading anything when the tag is not handled here.
    fn parse_tag(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool>;
}

/// Everything read from one stream.
#[derive(Debug, Clone)]
pub struct TiffInfo {
    pub header: TiffHeader,
    pub ifds: Vec<ImageDirectory>,
    pub exif: ExifInfo,
    pub shared: SharedInfo,
    pub extra_profiles: Vec<ProfileInfo>,
    /// Index into `ifds` of the main (full resolution) image.
    pub main_index: Option<usize>,
    /// Malformed optional structures that were skipped.
    pub warnings: usize,
}

impl TiffInfo {
    pub fn new(header: TiffHeader) -> Self {
        let mut shared = SharedInfo::default();
        shared.camera_profile.big_endian = header.endian == Endian::Big;
        Self {
            header,
            ifds: Vec::new(),
            exif: ExifInfo::default(),
            shared,
            extra_profiles: Vec::new(),
            main_index: None,
            warnings: 0,
        }
    }

    pub fn main_ifd(&self) -> Option<&ImageDirectory> {
        self.main_index.and_then(|i| self.ifds.get(i))
    }

    pub fn is_dng(&self) -> bool {
        self.shared.is_dng()
    }

    /// Picks the first full-resolution raw directory, falling back to the
    /// first full-resolution directory of any kind.
    fn choose_main_index(&self) -> Option<usize> {
        let mains = || {
            self.ifds
                .iter()
                .enumerate()
                .filter(|(_, ifd)| ifd.new_subfile_type == SUBFILE_MAIN_IMAGE)
        };
        mains()
            .find(|(_, ifd)| ifd.is_raw())
            .or_else(|| mains().next())
            .map(|(i, _)| i)
    }
}

pub struct TagParser {
    handlers: Vec<Box<dyn TagHandler>>,
    strict: bool,
}

impl TagParser {
    pub fn new(strict: bool) -> Self {
        Self::with_handlers(
            vec![
                Box::new(ImageDirectoryHandler),
                Box::new(ExifHandler),
                Box::new(SharedHandler),
                Box::new(ProfileHandler),
            ],
            strict,
        )
    }

    pub fn from_host(host: &Host) -> Self {
        Self::new(host.config().strict_parsing)
    }

    /// Parser with a custom handler order.
    pub fn with_handlers(handlers: Vec<Box<dyn TagHandler>>, strict: bool) -> Self {
        Self { handlers, strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Offers `entry` to each handler in order; first match wins.
    pub fn dispatch(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        entry: &TagEntry,
        info: &mut TiffInfo,
    ) -> Result<bool> {
        for handler in &self.handlers {
            stream.set_position(entry.value_offset)?;
            if handler.parse_tag(stream, context, entry, info)? {
                trace!("Tag {} in {:?} handled by {}", entry.code, context, handler.name());
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Parses every entry of a directory, downgrading recoverable failures.
    pub fn parse_directory(
        &self,
        stream: &mut TiffStream<'_>,
        context: TagContext,
        ifd: &Ifd,
        info: &mut TiffInfo,
    ) -> Result<()> {
        for entry in &ifd.entries {
            match self.dispatch(stream, context, entry, info) {
                Ok(true) => {}
                Ok(false) => trace!("Skipping unknown tag {} in {:?}", entry.code, context),
                Err(e) => self.downgrade(e, info, || format!("tag {}", entry.code))?,
            }
        }
        Ok(())
    }

    /// Parses a whole TIFF/DNG stream.
    pub fn parse(&self, data: &[u8], host: &Host) -> Result<TiffInfo> {
        let _span = tracing::debug_span!("parse_tiff", bytes = data.len()).entered();

        let header = TiffHeader::read(data)?;
        if header.magic == PROFILE_MAGIC {
            return Err(DngError::bad_format("stream holds a camera profile, not an image"));
        }
        let mut stream = TiffStream::new(data, header.endian);
        let mut info = TiffInfo::new(header);
        let mut visited = HashSet::new();

        let mut next = header.first_ifd;
        let mut chain_index = 0usize;
        while next != 0 {
            host.sniff_for_abort()?;
            match self.parse_image_directory(&mut stream, next, &mut visited, &mut info, host) {
                Ok(following) => next = following,
                Err(e) if chain_index == 0 => return Err(e),
                Err(e) => {
                    self.downgrade(e, &mut info, || format!("directory at {}", next))?;
                    break;
                }
            }
            chain_index += 1;
        }

        if let Some(offset) = info.shared.exif_ifd {
            self.parse_sub_directory(&mut stream, offset, TagContext::Exif, &mut visited, &mut info)?;
        }
        if let Some(offset) = info.shared.gps_ifd {
            self.parse_sub_directory(&mut stream, offset, TagContext::Gps, &mut visited, &mut info)?;
        }

        let profile_offsets = info.shared.extra_camera_profiles.clone();
        for offset in profile_offsets {
            host.sniff_for_abort()?;
            if let Err(e) = self.parse_extra_profile(data, offset, &mut info) {
                self.downgrade(e, &mut info, || format!("extra profile at {}", offset))?;
            }
        }

        info.main_index = info.choose_main_index();
        debug!(
            "Parsed {} directories, {} extra profiles, main index {:?}, {} warnings",
            info.ifds.len(),
            info.extra_profiles.len(),
            info.main_index,
            info.warnings
        );
        Ok(info)
    }

    /// Parses a standalone camera profile stream (magic `0x4352`).
    pub fn parse_profile(&self, data: &[u8]) -> Result<ProfileInfo> {
        let header = TiffHeader::read(data)?;
        let mut info = TiffInfo::new(header);
        self.parse_extra_profile(data, 0, &mut info)?;
        info.extra_profiles
            .pop()
            .ok_or_else(|| DngError::bad_format("empty camera profile stream"))
    }

    fn parse_image_directory(
        &self,
        stream: &mut TiffStream<'_>,
        offset: u64,
        visited: &mut HashSet<u64>,
        info: &mut TiffInfo,
        host: &Host,
    ) -> Result<u64> {
        if !visited.insert(offset) {
            return Err(DngError::bad_format(format!("directory loop at {}", offset)));
        }
        if info.ifds.len() >= MAX_IMAGE_DIRECTORIES {
            return Err(DngError::bad_format("too many image directories"));
        }

        let ifd = Ifd::read(stream, offset)?;
        let index = info.ifds.len();
        info.ifds.push(ImageDirectory::new(offset));
        self.parse_directory(stream, TagContext::Ifd(index), &ifd, info)?;

        let sub_ifds = info.ifds[index].sub_ifds.clone();
        for sub in sub_ifds {
            host.sniff_for_abort()?;
            if let Err(e) = self.parse_image_directory(stream, sub, visited, info, host) {
                self.downgrade(e, info, || format!("sub-directory at {}", sub))?;
            }
        }
        Ok(ifd.next_offset)
    }

    fn parse_sub_directory(
        &self,
        stream: &mut TiffStream<'_>,
        offset: u64,
        context: TagContext,
        visited: &mut HashSet<u64>,
        info: &mut TiffInfo,
    ) -> Result<()> {
        if !visited.insert(offset) {
            return self.downgrade(
                DngError::bad_format(format!("{:?} directory shares offset {}", context, offset)),
                info,
                || format!("{:?} directory", context),
            );
        }
        let result = Ifd::read(stream, offset)
            .and_then(|ifd| self.parse_directory(stream, context, &ifd, info));
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.downgrade(e, info, || format!("{:?} directory", context)),
        }
    }

    /// Profile streams carry offsets relative to their own start.
    fn parse_extra_profile(&self, data: &[u8], offset: u64, info: &mut TiffInfo) -> Result<()> {
        let slice = usize::try_from(offset)
            .ok()
            .and_then(|start| data.get(start..))
            .ok_or(DngError::EndOfFile(offset))?;
        let header = TiffHeader::read(slice)?;
        if header.magic != PROFILE_MAGIC && header.magic != TIFF_MAGIC {
            return Err(DngError::bad_format(format!(
                "profile magic {:#06x}",
                header.magic
            )));
        }
        let mut stream = TiffStream::new(slice, header.endian);
        let ifd = Ifd::read(&mut stream, header.first_ifd)?;

        info.extra_profiles.push(ProfileInfo {
            big_endian: header.endian == Endian::Big,
            ..ProfileInfo::default()
        });
        if let Err(e) = self.parse_directory(&mut stream, TagContext::Profile, &ifd, info) {
            info.extra_profiles.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Logs and swallows `error` if it is recoverable and parsing is lenient.
    fn downgrade(
        &self,
        error: DngError,
        info: &mut TiffInfo,
        what: impl FnOnce() -> String,
    ) -> Result<()> {
        if self.strict || !error.is_recoverable() {
            return Err(error);
        }
        warn!("Ignoring malformed {}: {}", what(), error);
        info.warnings += 1;
        Ok(())
    }
}

/// Parses `data` with the host's strictness setting.
pub fn parse_tiff(data: &[u8], host: &Host) -> Result<TiffInfo> {
    TagParser::from_host(host).parse(data, host)
}
