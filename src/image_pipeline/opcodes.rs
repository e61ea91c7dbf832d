//! DNG opcode lists and the opcodes this crate can apply.

pub mod list;
pub mod ops;

pub use list::{FLAG_OPTIONAL, FLAG_SKIP_IF_PREVIEW, Opcode, OpcodeList};
pub use ops::{OpcodeArea, OpcodeKind};
