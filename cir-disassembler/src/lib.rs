//! # CIR Disassembler
//!
//! Renders a [`Program`] as an assembly-flavoured listing: one indexed
//! line per op, operands in source syntax, locals tables appended when
//! present. Labels cannot be recovered (jump targets are plain
//! integers after assembly), so branch operands render as the stored
//! target values.

mod formatter;

use cir_spec::{Function, Program};

pub use formatter::format_operand;
use formatter::format_arg;

/// Render every function of the program, in definition order.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (name, func) in &program.functions {
        out.push_str(&disassemble_function(name, func));
        out.push('\n');
    }
    out
}

/// Render one function.
pub fn disassemble_function(name: &str, func: &Function) -> String {
    let mut out = format!("Function: {}\n", name);

    for (index, op) in func.ops.iter().enumerate() {
        out.push_str(&format!("  [{}] {}", index, op.opcode.mnemonic()));
        for (slot, arg) in op.args.iter().enumerate() {
            if slot >= op.opcode.arity() && arg.is_null() {
                continue;
            }
            if slot > 0 {
                out.push(',');
            }
            out.push(' ');
            out.push_str(&format_arg(op.opcode, slot, arg));
        }
        out.push('\n');
    }

    if !func.locals.is_empty() {
        out.push_str("  Locals:\n");
        for (id, value) in &func.locals {
            out.push_str(&format!("    [{}] = {}\n", id, format_operand(value)));
        }
    }

    out
}
