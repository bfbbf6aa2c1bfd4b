//! Operand rendering
//!
//! Operands print in source syntax so a listing reads like the
//! assembly it came from. Slots that the opcode treats as register
//! references render as `rN`; everything else renders as a literal.

use cir_spec::{Opcode, Word};

/// Render a word as an assembly literal.
pub fn format_operand(word: &Word) -> String {
    match word {
        Word::Int(i) => format!("${}", i),
        Word::Float(f) => {
            // Keep a decimal point so the literal re-parses as a float.
            if f.fract() == 0.0 && f.is_finite() {
                format!("${:.1}", f)
            } else {
                format!("${}", f)
            }
        }
        Word::Ptr(p) => format!("${:#x}", p),
        Word::Bool(b) => b.to_string(),
        Word::Str(s) => format!("\"{}\"", escape(s)),
        Word::Null => "null".to_string(),
    }
}

/// Render one operand slot of an op, register-aware.
pub(crate) fn format_arg(opcode: Opcode, slot: usize, word: &Word) -> String {
    if is_register_slot(opcode, slot) {
        if let Word::Int(i) = word {
            return format!("r{}", i);
        }
    }
    format_operand(word)
}

fn is_register_slot(opcode: Opcode, slot: usize) -> bool {
    match opcode {
        // Both operands name registers
        Opcode::IAdd
        | Opcode::ISub
        | Opcode::IMul
        | Opcode::IDiv
        | Opcode::IMod
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::ICmp
        | Opcode::FCmp
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv => slot < 2,

        // Single register operand
        Opcode::Not
        | Opcode::Inc
        | Opcode::Dec
        | Opcode::Neg
        | Opcode::PushR
        | Opcode::Pop => slot == 0,

        // Register in the second slot
        Opcode::Mov | Opcode::Cast | Opcode::LocalSet => slot == 1,

        _ => false,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}
