//! # CIR Specification
//!
//! Data model for the CIR virtual machine: the tagged [`Word`] value,
//! the opcode table, [`Program`]/[`Function`] structures, and the
//! portable bytecode container.
//!
//! ## Key conventions
//! - 256 general-purpose registers; register 0 is the implicit
//!   destination of every arithmetic instruction.
//! - Every instruction is a fixed three-slot record; unused slots hold
//!   [`Word::Null`].
//! - Jump targets are stored as "intended index - 1" so that the
//!   dispatch loop's universal post-op increment lands on the target.

pub mod bytecode;
pub mod error;
pub mod opcode;
pub mod program;
pub mod word;

pub use bytecode::{decode_program, encode_program};
pub use error::CirError;
pub use opcode::Opcode;
pub use program::{CallFrame, ExecState, Function, FunctionAttrs, Op, Program};
pub use word::{Word, WordKind, FLAG_OWNS_MEMORY, FLAG_STRING};

/// Magic number for CIR bytecode files: "CIRB" (little-endian)
pub const MAGIC: u32 = 0x4252_4943;

/// Bytecode container format version
pub const FORMAT_VERSION: u8 = 1;

/// Size of the register file
pub const REGISTER_COUNT: usize = 256;

/// Fixed operand-slot count per instruction
pub const OP_ARG_COUNT: usize = 3;

/// Sentinel string-table index meaning "null string"
pub const NULL_STRING_INDEX: u32 = u32::MAX;
