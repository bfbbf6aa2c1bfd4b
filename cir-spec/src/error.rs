//! Error types shared by the data model and the bytecode codec

use thiserror::Error;

use crate::word::WordKind;

#[derive(Debug, Error)]
pub enum CirError {
    #[error("Expected {expected} word, found {found} ({context})")]
    TypeMismatch {
        expected: WordKind,
        found: WordKind,
        context: String,
    },

    #[error("Bytecode truncated: cannot read {0}")]
    Truncated(&'static str),

    #[error("Bad bytecode magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported bytecode version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid opcode byte: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Invalid word type byte: {0:#04x}")]
    InvalidWordKind(u8),

    #[error("Invalid string table index: {0}")]
    InvalidStringIndex(u32),

    #[error("Missing NUL terminator on string table entry {0}")]
    UnterminatedString(u32),
}

pub type Result<T> = std::result::Result<T, CirError>;
