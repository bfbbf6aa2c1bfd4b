//! Error-path tests: every diagnostic the assembler promises

use cir_assembler::{Assembler, AssemblerError};

fn fail(source: &str) -> AssemblerError {
    let mut asm = Assembler::new();
    asm.assemble_string(source)
        .expect_err("assembly should have failed")
}

#[test]
fn test_unknown_opcode_names_the_token() {
    let err = fail(".fn main\n  launch r1\n.end\n");
    assert!(err.to_string().contains("launch"));
}

#[test]
fn test_arity_errors_both_directions() {
    assert!(matches!(
        fail(".fn main\n  iadd r0\n.end\n"),
        AssemblerError::ArityMismatch { expected: 2, found: 1, .. }
    ));
    assert!(matches!(
        fail(".fn main\n  halt $1\n.end\n"),
        AssemblerError::ArityMismatch { expected: 0, found: 1, .. }
    ));
    assert!(matches!(
        fail(".fn main\n  load r0, r1\n.end\n"),
        AssemblerError::ArityMismatch { expected: 3, found: 2, .. }
    ));
}

#[test]
fn test_register_out_of_range() {
    let err = fail(".fn main\n  pushr r256\n.end\n");
    assert!(matches!(err, AssemblerError::InvalidRegister { .. }));
    assert!(err.to_string().contains("r256"));
}

#[test]
fn test_unprefixed_numeric_operand() {
    let err = fail(".fn main\n  push 42\n.end\n");
    assert!(err
        .to_string()
        .contains("must be prefixed with '$' (e.g., $42)"));
}

#[test]
fn test_unprefixed_hex_and_float() {
    assert!(matches!(
        fail(".fn main\n  push 0xFF\n.end\n"),
        AssemblerError::UnprefixedNumber { .. }
    ));
    assert!(matches!(
        fail(".fn main\n  push 1.5\n.end\n"),
        AssemblerError::UnprefixedNumber { .. }
    ));
}

#[test]
fn test_invalid_numeric_literals() {
    assert!(matches!(
        fail(".fn main\n  push $\n.end\n"),
        AssemblerError::InvalidLiteral { .. }
    ));
    assert!(matches!(
        fail(".fn main\n  push $0xZZ\n.end\n"),
        AssemblerError::InvalidLiteral { what: "hexadecimal", .. }
    ));
    assert!(matches!(
        fail(".fn main\n  push $1.2.3\n.end\n"),
        AssemblerError::InvalidLiteral { what: "float", .. }
    ));
}

#[test]
fn test_duplicate_label_reports_line() {
    let err = fail(".fn main\nspot:\n  nop\nspot:\n  halt\n.end\n");
    assert!(matches!(err, AssemblerError::DuplicateLabel { line: 4, .. }));
}

#[test]
fn test_undefined_forward_label_message() {
    let err = fail(".fn main\n  jmp @nowhere\n.end\n");
    assert_eq!(
        err.to_string(),
        "Undefined label 'nowhere' in function 'main'"
    );
}

#[test]
fn test_labels_do_not_leak_between_functions() {
    // "there" is defined in main only; other's reference must fail.
    let err = fail(
        "\
.fn main
there:
  halt
.end
.fn other
  jmp @there
.end
",
    );
    assert!(matches!(
        err,
        AssemblerError::UndefinedLabel { function, label }
            if function == "other" && label == "there"
    ));
}

#[test]
fn test_structure_errors() {
    assert!(matches!(fail("nop\n"), AssemblerError::InstructionOutsideFunction { .. }));
    assert!(matches!(fail(".end\n"), AssemblerError::EndWithoutFn { .. }));
    assert!(matches!(
        fail(".fn main\n  nop\n"),
        AssemblerError::MissingEnd { .. }
    ));
    assert!(matches!(
        fail(".fn a\n.end\n.fn a\n.end\n"),
        AssemblerError::DuplicateFunction { .. }
    ));
    assert!(matches!(fail(""), AssemblerError::NoFunctions));
    assert!(matches!(
        fail(".fn helper\n  halt\n.end\n"),
        AssemblerError::NoMain
    ));
}

#[test]
fn test_unknown_attribute_is_fatal() {
    let err = fail(".fn main hot\n  halt\n.end\n");
    assert!(matches!(err, AssemblerError::UnknownAttribute { attr, .. } if attr == "hot"));
}

#[test]
fn test_extern_without_name() {
    let err = fail(".extern   \n.fn main\n  halt\n.end\n");
    assert!(matches!(err, AssemblerError::MalformedDirective { .. }));
}

#[test]
fn test_comp_with_undefined_identifier() {
    let err = fail(".fn main\n  push comp(missing + 1)\n  halt\n.end\n");
    let text = err.to_string();
    assert!(text.contains("comp()"));
    assert!(text.contains("missing"));
}

#[test]
fn test_comp_with_syntax_error() {
    assert!(matches!(
        fail(".fn main\n  push comp((1 + 2)\n  halt\n.end\n"),
        AssemblerError::Expr { .. }
    ));
}

#[test]
fn test_inline_diagnostics() {
    assert!(matches!(
        fail(".fn main\n  call #missing\n  halt\n.end\n"),
        AssemblerError::UndefinedCallTarget { .. }
    ));

    let source_with_branch = "\
.fn main
  call #h
  halt
.end
.fn h inline
x:
  je @x
.end
";
    assert!(matches!(
        fail(source_with_branch),
        AssemblerError::InlineHasBranches { .. }
    ));

    let mutual = "\
.fn main
  call #a
  halt
.end
.fn a inline
  call #b
.end
.fn b inline
  call #a
.end
";
    assert!(matches!(fail(mutual), AssemblerError::InlineDepth { .. }));
}
