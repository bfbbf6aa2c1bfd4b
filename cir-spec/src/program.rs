//! Program structure: ops, functions, call frames and execution state

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;
use crate::word::Word;
use crate::OP_ARG_COUNT;

/// One instruction: an opcode plus a fixed-width operand record.
/// Slots beyond the opcode's arity hold [`Word::Null`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub opcode: Opcode,
    pub args: [Word; OP_ARG_COUNT],
}

impl Op {
    pub fn new(opcode: Opcode) -> Self {
        Op {
            opcode,
            args: std::array::from_fn(|_| Word::Null),
        }
    }

    /// Build an op from a slice of operands; the remaining slots stay Null.
    pub fn with_args(opcode: Opcode, args: &[Word]) -> Self {
        let mut op = Op::new(opcode);
        for (slot, arg) in op.args.iter_mut().zip(args.iter()) {
            *slot = arg.clone();
        }
        op
    }

    /// Number of populated (non-Null) operand slots. Matches the
    /// opcode's arity for any op assembled from source that does not
    /// pass a literal `null` operand.
    pub fn argc(&self) -> usize {
        self.args.iter().filter(|w| !w.is_null()).count()
    }
}

/// Per-function attribute bag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAttrs {
    pub inline: bool,
}

/// A named op vector plus its locals store.
///
/// The program counter does NOT live here: each activation gets its own
/// counter in [`ExecState`], which is what makes recursion safe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub ops: Vec<Op>,
    pub locals: BTreeMap<u32, Word>,
    pub attrs: FunctionAttrs,
}

/// The pair pushed by `call` and consumed by `ret`: who to return to,
/// and at which op index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub caller: String,
    pub ret: i64,
}

/// Execution state carried by a program between steps.
///
/// `co` is signed because jump targets are stored as "intended index
/// minus one", which is -1 for a label on the first instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecState {
    /// Name of the currently executing function
    pub cf: String,
    /// Op index within the current function
    pub co: i64,
    pub running: bool,
    pub call_stack: Vec<CallFrame>,
}

impl Default for ExecState {
    fn default() -> Self {
        ExecState {
            cf: String::new(),
            co: 0,
            running: true,
            call_stack: Vec::new(),
        }
    }
}

/// A complete program: named functions in definition order, the
/// externals its source declared, and execution state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: IndexMap<String, Function>,
    /// Names declared with `.extern`. Advisory metadata: execution does
    /// not require them to be registered until a `callx` reaches them.
    pub externs: Vec<String>,
    pub state: ExecState,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// SHA-256 over the encoded bytecode form.
    pub fn hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(crate::bytecode::encode_program(self));
        hasher.finalize().into()
    }
}
