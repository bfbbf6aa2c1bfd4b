//! # CIR Assembler
//!
//! Parses CIR text assembly into a [`cir_spec::Program`]: a single
//! top-down pass with per-function label backpatching, a typed operand
//! parser, a compile-time arithmetic sub-language for label expressions
//! (`comp(...)`), and attribute-driven inline expansion.

pub mod assembler;
pub mod error;
pub mod expr;
pub mod operand;

pub use assembler::Assembler;
pub use error::AssemblerError;
pub use expr::eval as eval_expr;
