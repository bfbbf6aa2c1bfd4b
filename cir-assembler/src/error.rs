//! Assembler diagnostics
//!
//! Every parse-time error carries the source line it came from; the
//! label and inline errors that only surface in the final passes name
//! the function instead.

use thiserror::Error;

use crate::expr::ExprError;

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("Line {line}: Unknown opcode: {opcode}")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("Line {line}: Instruction '{opcode}' expects {expected} operand(s), found {found}")]
    ArityMismatch {
        line: usize,
        opcode: String,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: Invalid register {register} (valid range: r0-r255)")]
    InvalidRegister { line: usize, register: String },

    #[error("Line {line}: Invalid {what} literal: {value}")]
    InvalidLiteral {
        line: usize,
        what: &'static str,
        value: String,
    },

    #[error("Line {line}: Numeric literal '{value}' must be prefixed with '$' (e.g., ${value})")]
    UnprefixedNumber { line: usize, value: String },

    #[error("Line {line}: Duplicate label: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("Line {line}: Empty label name")]
    EmptyLabel { line: usize },

    #[error("Undefined label '{label}' in function '{function}'")]
    UndefinedLabel { function: String, label: String },

    #[error("Line {line}: Duplicate function definition: {name}")]
    DuplicateFunction { line: usize, name: String },

    #[error("Line {line}: Unknown function attribute '{attr}' on '{name}'")]
    UnknownAttribute {
        line: usize,
        name: String,
        attr: String,
    },

    #[error("Line {line}: Function name cannot be empty")]
    EmptyFunctionName { line: usize },

    #[error("Line {line}: Malformed directive: {text}")]
    MalformedDirective { line: usize, text: String },

    #[error("Line {line}: .end without matching .fn")]
    EndWithoutFn { line: usize },

    #[error("Line {line}: Instruction outside function: {text}")]
    InstructionOutsideFunction { line: usize, text: String },

    #[error("Missing .end for function: {name}")]
    MissingEnd { name: String },

    #[error("No functions defined in program")]
    NoFunctions,

    #[error("No 'main' function defined")]
    NoMain,

    #[error("Line {line}: in comp(): {source}")]
    Expr {
        line: usize,
        #[source]
        source: ExprError,
    },

    #[error("Call to undefined function '{callee}' in '{caller}'")]
    UndefinedCallTarget { caller: String, callee: String },

    #[error("Inline function '{name}' contains label operands; inline bodies must be branch-free")]
    InlineHasBranches { name: String },

    #[error("Function 'main' cannot be marked inline")]
    InlineMain,

    #[error("Inline expansion exceeded depth {limit}; recursive inline functions are not supported")]
    InlineDepth { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AssemblerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_label_display() {
        let err = AssemblerError::UndefinedLabel {
            function: "main".to_string(),
            label: "nowhere".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Undefined label 'nowhere' in function 'main'"
        );
    }

    #[test]
    fn test_unprefixed_number_display() {
        let err = AssemblerError::UnprefixedNumber {
            line: 3,
            value: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Line 3: Numeric literal '42' must be prefixed with '$' (e.g., $42)"
        );
    }

    #[test]
    fn test_arity_mismatch_display() {
        let err = AssemblerError::ArityMismatch {
            line: 7,
            opcode: "mov".to_string(),
            expected: 2,
            found: 1,
        };
        assert!(err.to_string().contains("expects 2 operand(s), found 1"));
    }

    #[test]
    fn test_expr_error_chains() {
        let err = AssemblerError::Expr {
            line: 2,
            source: ExprError::UnknownIdentifier("lbl".to_string()),
        };
        assert!(err.to_string().contains("comp()"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
