//! # CIR Runtime
//!
//! Executes CIR programs: a single dispatch loop over the current
//! function's op vector, a 256-word register file, an unbounded value
//! stack, an explicit call-frame stack and a registry of host-provided
//! external functions.

pub mod error;
pub mod execute;
pub mod stdlib;
pub mod vm;

pub use error::RuntimeError;
pub use vm::{Cir, ExternFn};

/// Run a prepared program's `main` and hand back the machine for
/// inspection.
pub fn run(program: cir_spec::Program) -> Result<Cir, RuntimeError> {
    let mut vm = Cir::new();
    vm.load_program(program);
    vm.execute_program()?;
    Ok(vm)
}
