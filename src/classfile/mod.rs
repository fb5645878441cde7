//! Decoding and re-encoding of compiled Java class files.
//!
//! [`decode`] turns a class file into a [`ClassTree`] whose string-bearing
//! constants are exposed as mutable [`StringSite`]s. [`encode`] writes the
//! tree back. Only the string payloads of sites are ever re-encoded; every
//! other byte of the input, including attributes this module does not
//! understand, is carried over unchanged.

mod bytes;
mod code;
pub mod mutf8;
mod pool;
mod reader;
pub mod tree;
mod writer;

#[cfg(test)]
pub(crate) mod fixture;

use thiserror::Error;

pub use pool::MethodHandle;
pub use reader::decode;
pub use tree::{
    Annotation, ClassTree, Constant, ElementPair, ElementValue, FieldDecl, Instruction,
    MethodDecl, StringSite,
};
pub use writer::encode;

/// Errors raised while decoding or encoding a single class file.
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// The stream ended before a structure was complete.
    #[error("truncated class file: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic number 0x{0:08X}")]
    BadMagic(u32),

    /// Structurally invalid content (bad index, unknown tag or opcode, ...).
    #[error("malformed class file: {0}")]
    Malformed(String),

    /// An annotation `element_value` carried a tag outside the known set.
    #[error("unsupported annotation element value tag {:?}", tag_char(.tag))]
    UnsupportedAnnotationValue { tag: u8 },

    #[error("constant pool would exceed 65535 entries")]
    PoolOverflow,

    #[error("string constant is {len} bytes long once encoded (limit 65535)")]
    StringTooLong { len: usize },

    /// An `ldc` instruction would need a constant index that does not fit in one byte.
    #[error("ldc operand at offset {position} would need constant index {index}")]
    NarrowIndexOverflow { position: usize, index: u16 },

    /// Two sites backed by the same bootstrap argument slot hold different text.
    #[error("shared bootstrap argument at offset {position} has conflicting values")]
    ConflictingSharedSite { position: usize },
}

fn tag_char(tag: &u8) -> char {
    char::from(*tag)
}

impl ClassFileError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Short machine-readable category used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Truncated { .. } | Self::BadMagic(_) | Self::Malformed(_) => "malformed-class",
            Self::UnsupportedAnnotationValue { .. } => "unsupported-annotation-value",
            Self::PoolOverflow
            | Self::StringTooLong { .. }
            | Self::NarrowIndexOverflow { .. }
            | Self::ConflictingSharedSite { .. } => "encode-failed",
        }
    }
}
