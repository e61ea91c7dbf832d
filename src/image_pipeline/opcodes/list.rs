//! Opcode lists (`OpcodeList1/2/3`).
//!
//! Stored big-endian: an opcode count, then per opcode its id, the DNG
//! version that introduced it, flags, parameter byte count and parameters.

use tracing::{debug, warn};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::{DNG_VERSION_1_3, DNG_VERSION_CURRENT, DngVersion, Host};
use crate::image_pipeline::common::image::StageImage;
use crate::image_pipeline::fingerprint::{Fingerprint, Md5Printer};
use crate::image_pipeline::opcodes::ops::{OpcodeKind, ParamReader};

pub const FLAG_OPTIONAL: u32 = 1;
pub const FLAG_SKIP_IF_PREVIEW: u32 = 2;

/// Upper bound on opcodes per list.
const MAX_OPCODES: u32 = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
pub struct Opcode {
    pub id: u32,
    pub min_version: DngVersion,
    pub flags: u32,
    /// Parameters as stored, written back unchanged.
    pub params: Vec<u8>,
    pub kind: OpcodeKind,
}

impl Opcode {
    pub fn new(id: u32, min_version: DngVersion, flags: u32, kind: OpcodeKind) -> Result<Self> {
        let params = kind
            .params()
            .ok_or_else(|| DngError::program(format!("opcode {} has no parameter form", id)))?;
        Ok(Self {
            id,
            min_version,
            flags,
            params,
            kind,
        })
    }

    pub fn is_optional(&self) -> bool {
        self.flags & FLAG_OPTIONAL != 0
    }

    pub fn skip_if_preview(&self) -> bool {
        self.flags & FLAG_SKIP_IF_PREVIEW != 0
    }

    /// Whether this reader knows how to apply the opcode.
    pub fn is_supported(&self) -> bool {
        self.kind.is_supported() && self.min_version <= DNG_VERSION_CURRENT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpcodeList {
    /// 1, 2 or 3: which list this is.
    stage: u32,
    opcodes: Vec<Opcode>,
    always_apply: bool,
}

impl OpcodeList {
    pub fn new(stage: u32) -> Self {
        Self {
            stage,
            opcodes: Vec::new(),
            always_apply: false,
        }
    }

    pub fn parse(stage: u32, data: &[u8]) -> Result<Self> {
        let mut list = Self::new(stage);
        if data.is_empty() {
            return Ok(list);
        }
        let mut reader = ParamReader::new(data);
        let count = reader.u32()?;
        if count > MAX_OPCODES {
            return Err(DngError::bad_format(format!("opcode list with {} entries", count)));
        }
        for _ in 0..count {
            let id = reader.u32()?;
            let min_version = reader.u32()?;
            let flags = reader.u32()?;
            let len = reader.u32()? as usize;
            if len > reader.remaining() {
                return Err(DngError::bad_format(format!(
                    "opcode {} parameters overrun the list",
                    id
                )));
            }
            let params = reader.bytes(len)?.to_vec();

            let kind = match OpcodeKind::parse(id, &params) {
                Ok(kind) => kind,
                Err(e) if flags & FLAG_OPTIONAL != 0 && e.is_recoverable() => {
                    warn!("Keeping malformed optional opcode {} unparsed: {}", id, e);
                    OpcodeKind::Unsupported
                }
                Err(e) => return Err(e),
            };
            list.opcodes.push(Opcode {
                id,
                min_version,
                flags,
                params,
                kind,
            });
        }
        debug!("Parsed opcode list {} with {} opcodes", stage, list.opcodes.len());
        Ok(list)
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Opcode> {
        self.opcodes.iter()
    }

    pub fn push(&mut self, opcode: Opcode) {
        self.opcodes.push(opcode);
    }

    pub fn clear(&mut self) {
        self.opcodes.clear();
        self.always_apply = false;
    }

    /// Whether the list must be baked into the image rather than stored.
    pub fn always_apply(&self) -> bool {
        self.always_apply
    }

    pub fn set_always_apply(&mut self) {
        self.always_apply = true;
    }

    /// Lowest DNG version able to carry the list.
    pub fn min_version(&self, include_optional: bool) -> DngVersion {
        self.opcodes
            .iter()
            .filter(|op| include_optional || !op.is_optional())
            .map(|op| op.min_version.max(DNG_VERSION_1_3))
            .max()
            .unwrap_or(0)
    }

    pub fn serialize(&self) -> Vec<u8> {
        if self.opcodes.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        out.extend_from_slice(&(self.opcodes.len() as u32).to_be_bytes());
        for op in &self.opcodes {
            out.extend_from_slice(&op.id.to_be_bytes());
            out.extend_from_slice(&op.min_version.to_be_bytes());
            out.extend_from_slice(&op.flags.to_be_bytes());
            out.extend_from_slice(&(op.params.len() as u32).to_be_bytes());
            out.extend_from_slice(&op.params);
        }
        out
    }

    /// MD5 of the serialized list; null for an empty list.
    pub fn fingerprint(&self) -> Fingerprint {
        if self.opcodes.is_empty() {
            return Fingerprint::NULL;
        }
        Md5Printer::digest(&self.serialize())
    }

    /// Applies every opcode in order.
    ///
    /// Unsupported optional opcodes (and preview-skippable ones when
    /// rendering a preview) are skipped; an unsupported mandatory opcode is
    /// a `BadFormat` error.
    pub fn apply(&self, image: &mut StageImage, host: &Host, is_preview: bool) -> Result<()> {
        for op in &self.opcodes {
            host.sniff_for_abort()?;
            if is_preview && op.skip_if_preview() {
                debug!("Skipping opcode {} for preview", op.id);
                continue;
            }
            if !op.is_supported() {
                if op.is_optional() {
                    warn!("Skipping unsupported optional opcode {} in list {}", op.id, self.stage);
                    continue;
                }
                return Err(DngError::bad_format(format!(
                    "unsupported opcode {} in list {}",
                    op.id, self.stage
                )));
            }
            op.kind.apply(image, host)?;
        }
        Ok(())
    }
}
