//! # The CIR Virtual Machine
//!
//! [`Cir`] owns a program and everything needed to run it. Execution is
//! single-threaded and cooperative: the only way control leaves the
//! dispatch loop mid-program is a `callx` into a host external, which
//! runs synchronously on the same thread and sees a consistent machine
//! state. A host wanting parallelism runs one machine per thread.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use cir_spec::{decode_program, encode_program, CallFrame, ExecState, Program, Word, REGISTER_COUNT};

use crate::error::{Result, RuntimeError};
use crate::execute::Flow;

/// Host callback signature for `callx`. The callback gets the full
/// machine: registers, stack, program. Returning an error aborts the
/// enclosing `execute_*` call with that error.
pub type ExternFn = dyn Fn(&mut Cir) -> Result<()>;

pub struct Cir {
    pub(crate) registers: Vec<Word>,
    pub(crate) stack: Vec<Word>,
    pub(crate) cmp_flag: bool,
    pub(crate) externs: HashMap<String, Rc<ExternFn>>,
    pub(crate) program: Program,
}

impl std::fmt::Debug for Cir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cir")
            .field("registers", &self.registers)
            .field("stack", &self.stack)
            .field("cmp_flag", &self.cmp_flag)
            .field("externs", &self.externs.keys().collect::<Vec<_>>())
            .field("program", &self.program)
            .finish()
    }
}

impl Default for Cir {
    fn default() -> Self {
        Self::new()
    }
}

impl Cir {
    pub fn new() -> Self {
        Cir {
            registers: vec![Word::Null; REGISTER_COUNT],
            stack: Vec::new(),
            cmp_flag: false,
            externs: HashMap::new(),
            program: Program::new(),
        }
    }

    // ========================================================================
    // Program management
    // ========================================================================

    /// Take ownership of a program. Registers, stack and externs are
    /// left as they are; load a fresh machine for a fresh run.
    pub fn load_program(&mut self, program: Program) {
        self.program = program;
    }

    pub fn get_program(&self) -> &Program {
        &self.program
    }

    pub fn get_program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn to_bytecode(&self) -> Vec<u8> {
        encode_program(&self.program)
    }

    pub fn from_bytecode(&mut self, bytes: &[u8]) -> Result<()> {
        self.program = decode_program(bytes)?;
        Ok(())
    }

    // ========================================================================
    // Host access to machine state
    // ========================================================================

    /// Register access; the index type makes out-of-range impossible.
    pub fn getr(&self, i: u8) -> &Word {
        &self.registers[i as usize]
    }

    pub fn setr(&mut self, i: u8, value: Word) {
        self.registers[i as usize] = value;
    }

    pub fn get_stack(&self) -> &[Word] {
        &self.stack
    }

    pub fn push(&mut self, value: Word) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Word> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn cmp_flag(&self) -> bool {
        self.cmp_flag
    }

    /// Register a host external under `name`. May be called at any time
    /// before a `callx` to that name executes; re-registering replaces.
    pub fn set_extern_fn<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Cir) -> Result<()> + 'static,
    {
        self.externs.insert(name.to_string(), Rc::new(f));
    }

    /// Cooperative cancellation hook for host externals.
    pub fn request_halt(&mut self) {
        self.program.state.running = false;
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run the function named `main`.
    pub fn execute_program(&mut self) -> Result<()> {
        self.execute_function("main")
    }

    /// Run a named function to completion (or until something halts the
    /// machine). On error the machine is left in its partially advanced
    /// state; the caller may inspect or discard it.
    pub fn execute_function(&mut self, name: &str) -> Result<()> {
        if !self.program.functions.contains_key(name) {
            return Err(RuntimeError::FunctionNotFound(name.to_string()));
        }

        debug!(function = name, "executing");
        self.program.state = ExecState {
            cf: name.to_string(),
            co: 0,
            running: true,
            call_stack: Vec::new(),
        };
        self.run_loop()
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            if !self.program.state.running {
                return Ok(());
            }

            let func = self
                .program
                .functions
                .get(&self.program.state.cf)
                .ok_or_else(|| RuntimeError::FunctionNotFound(self.program.state.cf.clone()))?;

            let co = self.program.state.co;
            if co < 0 || co >= func.ops.len() as i64 {
                // Fell off the end: return to the caller, or stop.
                match self.program.state.call_stack.pop() {
                    Some(CallFrame { caller, ret }) => {
                        self.program.state.cf = caller;
                        self.program.state.co = ret;
                        continue;
                    }
                    None => {
                        self.program.state.running = false;
                        return Ok(());
                    }
                }
            }

            let op = func.ops[co as usize].clone();
            trace!(cf = %self.program.state.cf, co, opcode = ?op.opcode, "step");

            match self.execute_op(&op)? {
                Flow::Next => self.program.state.co += 1,
                Flow::Transfer => {}
            }
        }
    }
}
