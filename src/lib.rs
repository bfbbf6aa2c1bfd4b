//! # CIR
//!
//! An embeddable register+stack virtual machine with a text-assembly
//! front end and a portable bytecode container.
//!
//! ```
//! use cir::{Assembler, Cir};
//!
//! let mut asm = Assembler::new();
//! asm.assemble_string(
//!     ".fn main\n  mov $15, r0\n  mov $5, r1\n  iadd r0, r1\n  pushr r0\n  halt\n.end\n",
//! )
//! .unwrap();
//!
//! let mut vm = Cir::new();
//! vm.load_program(asm.into_program());
//! vm.execute_program().unwrap();
//! assert_eq!(vm.pop().unwrap().as_int(), 20);
//! ```

pub use cir_assembler::{Assembler, AssemblerError};
pub use cir_disassembler::{disassemble, disassemble_function};
pub use cir_runtime::{stdlib, Cir, RuntimeError};
pub use cir_spec::{
    decode_program, encode_program, CirError, Function, Op, Opcode, Program, Word, WordKind,
};
