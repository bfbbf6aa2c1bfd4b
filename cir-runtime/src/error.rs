//! Runtime error types

use thiserror::Error;

use cir_spec::{CirError, WordKind};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Modulo by zero")]
    ModuloByZero,

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("External function not found: {0}")]
    ExternNotFound(String),

    #[error("Invalid register index {0} (valid range: 0-255)")]
    InvalidRegister(i64),

    #[error("Invalid local id {0}")]
    InvalidLocalId(i64),

    #[error("'{op}' expects a string operand, found {found}")]
    ExpectedString { op: &'static str, found: WordKind },

    #[error("Invalid cast from {from} to {to}")]
    InvalidCast { from: WordKind, to: &'static str },

    #[error("Unknown cast target type '{0}' (expected int, float or ptr)")]
    UnknownCastTarget(String),

    #[error("Opcode '{0}' is reserved and not implemented")]
    Unimplemented(&'static str),

    /// Error raised by a host external; carries the host's message.
    #[error("{0}")]
    Host(String),

    #[error(transparent)]
    Spec(#[from] CirError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_by_zero_display() {
        assert_eq!(RuntimeError::DivisionByZero.to_string(), "Division by zero");
    }

    #[test]
    fn test_function_not_found_display() {
        let err = RuntimeError::FunctionNotFound("boot".to_string());
        assert_eq!(err.to_string(), "Function not found: boot");
    }

    #[test]
    fn test_invalid_register_display() {
        let err = RuntimeError::InvalidRegister(300);
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn test_host_error_keeps_message() {
        let err = RuntimeError::Host("socket refused".to_string());
        assert_eq!(err.to_string(), "socket refused");
    }

    #[test]
    fn test_spec_error_wraps() {
        let err: RuntimeError = CirError::Truncated("op count").into();
        assert!(err.to_string().contains("op count"));
    }
}
