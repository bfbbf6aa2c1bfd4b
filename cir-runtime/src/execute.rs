//! # Instruction Dispatch
//!
//! One handler per opcode, all operating on the machine in place.
//!
//! Control-flow convention: jump targets are stored as "intended index
//! minus one" and rely on the dispatch loop's post-op increment, so
//! `jmp`/`je`/`jne` return [`Flow::Next`] like everything else.
//! `call` and `ret` set the op index directly and return
//! [`Flow::Transfer`] to suppress the increment.
//!
//! Arithmetic convention: binary ops read the registers named by their
//! operands and write the result to register 0 (the implicit
//! destination); `inc`/`dec` and `cast` mutate the named register in
//! place.

use cir_spec::{CallFrame, Op, Opcode, Word, REGISTER_COUNT};

use crate::error::{Result, RuntimeError};
use crate::vm::Cir;

/// What the dispatch loop should do after a handler returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Advance the op index.
    Next,
    /// The handler placed the op index itself (`call`, `ret`).
    Transfer,
}

impl Cir {
    /// Execute a single op against the current machine state.
    ///
    /// Public so read-only tools (debuggers, tracers) can single-step a
    /// machine they drive themselves.
    pub fn execute_op(&mut self, op: &Op) -> Result<Flow> {
        match op.opcode {
            Opcode::Halt => {
                self.program.state.running = false;
                Ok(Flow::Next)
            }
            Opcode::Nop => Ok(Flow::Next),

            Opcode::Mov => {
                let target = self.reg(&op.args[1])?;
                self.registers[target] = op.args[0].clone();
                Ok(Flow::Next)
            }

            Opcode::Push => {
                self.stack.push(op.args[0].clone());
                Ok(Flow::Next)
            }
            Opcode::PushR => {
                let r = self.reg(&op.args[0])?;
                self.stack.push(self.registers[r].clone());
                Ok(Flow::Next)
            }
            Opcode::Pop => {
                let r = self.reg(&op.args[0])?;
                let value = self.stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                self.registers[r] = value;
                Ok(Flow::Next)
            }

            Opcode::IAdd => self.int_binary(op, |a, b| Ok(a.wrapping_add(b))),
            Opcode::ISub => self.int_binary(op, |a, b| Ok(a.wrapping_sub(b))),
            Opcode::IMul => self.int_binary(op, |a, b| Ok(a.wrapping_mul(b))),
            Opcode::IDiv => self.int_binary(op, |a, b| {
                if b == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            }),
            Opcode::IMod => self.int_binary(op, |a, b| {
                if b == 0 {
                    Err(RuntimeError::ModuloByZero)
                } else {
                    Ok(a.wrapping_rem(b))
                }
            }),

            Opcode::And => self.int_binary(op, |a, b| Ok(a & b)),
            Opcode::Or => self.int_binary(op, |a, b| Ok(a | b)),
            Opcode::Xor => self.int_binary(op, |a, b| Ok(a ^ b)),
            Opcode::Shl => self.int_binary(op, |a, b| Ok(a.wrapping_shl(b as u32))),
            Opcode::Shr => self.int_binary(op, |a, b| Ok(a.wrapping_shr(b as u32))),

            Opcode::Not => {
                let a = self.read_int(&op.args[0])?;
                self.registers[0] = Word::Int(!a);
                Ok(Flow::Next)
            }
            Opcode::Neg => {
                let a = self.read_int(&op.args[0])?;
                self.registers[0] = Word::Int(a.wrapping_neg());
                Ok(Flow::Next)
            }
            Opcode::Inc => self.step_register(op, 1),
            Opcode::Dec => self.step_register(op, -1),

            Opcode::ICmp => {
                let a = self.read_int(&op.args[0])?;
                let b = self.read_int(&op.args[1])?;
                self.cmp_flag = a == b;
                Ok(Flow::Next)
            }
            Opcode::FCmp => {
                let a = self.read_float(&op.args[0])?;
                let b = self.read_float(&op.args[1])?;
                self.cmp_flag = a == b;
                Ok(Flow::Next)
            }

            Opcode::FAdd => self.float_binary(op, |a, b| a + b),
            Opcode::FSub => self.float_binary(op, |a, b| a - b),
            Opcode::FMul => self.float_binary(op, |a, b| a * b),
            // IEEE-754: zero divisor yields inf/NaN, never an error.
            Opcode::FDiv => self.float_binary(op, |a, b| a / b),

            Opcode::Jmp => {
                self.program.state.co = op.args[0].as_int();
                Ok(Flow::Next)
            }
            Opcode::Je => {
                if self.cmp_flag {
                    self.program.state.co = op.args[0].as_int();
                }
                Ok(Flow::Next)
            }
            Opcode::Jne => {
                if !self.cmp_flag {
                    self.program.state.co = op.args[0].as_int();
                }
                Ok(Flow::Next)
            }

            Opcode::Call => {
                let callee = expect_string(&op.args[0], "call")?;
                if !self.program.functions.contains_key(callee) {
                    return Err(RuntimeError::FunctionNotFound(callee.to_string()));
                }
                let state = &mut self.program.state;
                state.call_stack.push(CallFrame {
                    caller: std::mem::replace(&mut state.cf, callee.to_string()),
                    ret: state.co + 1,
                });
                state.co = 0;
                Ok(Flow::Transfer)
            }
            Opcode::Ret => {
                let state = &mut self.program.state;
                match state.call_stack.pop() {
                    Some(CallFrame { caller, ret }) => {
                        state.cf = caller;
                        state.co = ret;
                    }
                    None => state.running = false,
                }
                Ok(Flow::Transfer)
            }
            Opcode::CallX => {
                let name = expect_string(&op.args[0], "callx")?;
                let callback = self
                    .externs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::ExternNotFound(name.to_string()))?;
                callback(self)?;
                Ok(Flow::Next)
            }

            Opcode::Cast => {
                let target = expect_string(&op.args[0], "cast")?.to_string();
                let r = self.reg(&op.args[1])?;
                self.registers[r] = cast(&self.registers[r], &target)?;
                Ok(Flow::Next)
            }

            Opcode::LocalGet => {
                let id = local_id(&op.args[0])?;
                let cf = self.program.state.cf.clone();
                let value = self
                    .program
                    .functions
                    .get(&cf)
                    .and_then(|f| f.locals.get(&id))
                    .cloned()
                    // A missing id reads as Null.
                    .unwrap_or(Word::Null);
                self.registers[0] = value;
                Ok(Flow::Next)
            }
            Opcode::LocalSet => {
                let id = local_id(&op.args[0])?;
                let r = self.reg(&op.args[1])?;
                let value = self.registers[r].clone();
                let cf = self.program.state.cf.clone();
                if let Some(func) = self.program.functions.get_mut(&cf) {
                    func.locals.insert(id, value);
                }
                Ok(Flow::Next)
            }

            Opcode::Load | Opcode::Store => {
                Err(RuntimeError::Unimplemented(op.opcode.mnemonic()))
            }
        }
    }

    /// Resolve an operand naming a register.
    fn reg(&self, operand: &Word) -> Result<usize> {
        let index = operand.as_int();
        if index < 0 || index >= REGISTER_COUNT as i64 {
            return Err(RuntimeError::InvalidRegister(index));
        }
        Ok(index as usize)
    }

    fn read_int(&self, operand: &Word) -> Result<i64> {
        Ok(self.registers[self.reg(operand)?].as_int())
    }

    fn read_float(&self, operand: &Word) -> Result<f64> {
        Ok(self.registers[self.reg(operand)?].as_float())
    }

    fn int_binary(&mut self, op: &Op, f: impl FnOnce(i64, i64) -> Result<i64>) -> Result<Flow> {
        let a = self.read_int(&op.args[0])?;
        let b = self.read_int(&op.args[1])?;
        self.registers[0] = Word::Int(f(a, b)?);
        Ok(Flow::Next)
    }

    fn float_binary(&mut self, op: &Op, f: impl FnOnce(f64, f64) -> f64) -> Result<Flow> {
        let a = self.read_float(&op.args[0])?;
        let b = self.read_float(&op.args[1])?;
        self.registers[0] = Word::Float(f(a, b));
        Ok(Flow::Next)
    }

    fn step_register(&mut self, op: &Op, delta: i64) -> Result<Flow> {
        let r = self.reg(&op.args[0])?;
        let value = self.registers[r].as_int();
        self.registers[r] = Word::Int(value.wrapping_add(delta));
        Ok(Flow::Next)
    }
}

fn local_id(operand: &Word) -> Result<u32> {
    let id = operand.as_int();
    u32::try_from(id).map_err(|_| RuntimeError::InvalidLocalId(id))
}

fn expect_string<'a>(operand: &'a Word, op: &'static str) -> Result<&'a str> {
    operand.as_str().ok_or(RuntimeError::ExpectedString {
        op,
        found: operand.kind(),
    })
}

/// Permitted transitions: int->float, int->ptr, float->int, ptr->int.
fn cast(value: &Word, target: &str) -> Result<Word> {
    match target {
        "int" => match value {
            Word::Float(f) => Ok(Word::Int(*f as i64)),
            Word::Ptr(p) => Ok(Word::Int(*p as i64)),
            other => Err(RuntimeError::InvalidCast {
                from: other.kind(),
                to: "int",
            }),
        },
        "float" => match value {
            Word::Int(i) => Ok(Word::Float(*i as f64)),
            other => Err(RuntimeError::InvalidCast {
                from: other.kind(),
                to: "float",
            }),
        },
        "ptr" => match value {
            Word::Int(i) => Ok(Word::Ptr(*i as u64)),
            other => Err(RuntimeError::InvalidCast {
                from: other.kind(),
                to: "ptr",
            }),
        },
        other => Err(RuntimeError::UnknownCastTarget(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cir_spec::{Function, Program, WordKind};

    fn machine() -> Cir {
        let mut vm = Cir::new();
        let mut program = Program::new();
        program
            .functions
            .insert("main".to_string(), Function::default());
        program.state.cf = "main".to_string();
        vm.load_program(program);
        vm
    }

    fn run_op(vm: &mut Cir, opcode: Opcode, args: &[Word]) -> Result<Flow> {
        vm.execute_op(&Op::with_args(opcode, args))
    }

    #[test]
    fn test_mov_and_arithmetic_write_r0() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(15), Word::Int(0)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(5), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::IAdd, &[Word::Int(0), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(20));
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(i64::MAX), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(1), Word::Int(2)]).unwrap();
        run_op(&mut vm, Opcode::IAdd, &[Word::Int(1), Word::Int(2)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(i64::MIN));
    }

    #[test]
    fn test_division_by_zero() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(1), Word::Int(0)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(0), Word::Int(1)]).unwrap();
        let err = run_op(&mut vm, Opcode::IDiv, &[Word::Int(0), Word::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Division by zero");
    }

    #[test]
    fn test_modulo_by_zero() {
        let mut vm = machine();
        let err = run_op(&mut vm, Opcode::IMod, &[Word::Int(0), Word::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Modulo by zero");
    }

    #[test]
    fn test_float_division_by_zero_is_infinite() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Float(1.0), Word::Int(0)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Float(0.0), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::FDiv, &[Word::Int(0), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Float(f64::INFINITY));
    }

    #[test]
    fn test_inc_dec_mutate_in_place() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(10), Word::Int(3)]).unwrap();
        run_op(&mut vm, Opcode::Inc, &[Word::Int(3)]).unwrap();
        run_op(&mut vm, Opcode::Inc, &[Word::Int(3)]).unwrap();
        run_op(&mut vm, Opcode::Dec, &[Word::Int(3)]).unwrap();
        assert_eq!(vm.getr(3), &Word::Int(11));
        // r0 untouched
        assert!(vm.getr(0).is_null());
    }

    #[test]
    fn test_neg_and_not_write_r0() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(5), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::Neg, &[Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(-5));
        run_op(&mut vm, Opcode::Not, &[Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(!5));
        assert_eq!(vm.getr(1), &Word::Int(5));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(0b1100), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(0b1010), Word::Int(2)]).unwrap();

        run_op(&mut vm, Opcode::And, &[Word::Int(1), Word::Int(2)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(0b1000));
        run_op(&mut vm, Opcode::Or, &[Word::Int(1), Word::Int(2)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(0b1110));
        run_op(&mut vm, Opcode::Xor, &[Word::Int(1), Word::Int(2)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(0b0110));

        run_op(&mut vm, Opcode::Mov, &[Word::Int(2), Word::Int(3)]).unwrap();
        run_op(&mut vm, Opcode::Shl, &[Word::Int(1), Word::Int(3)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(0b110000));
        run_op(&mut vm, Opcode::Shr, &[Word::Int(1), Word::Int(3)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Int(0b11));
    }

    #[test]
    fn test_icmp_sets_flag() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(3), Word::Int(0)]).unwrap();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(3), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::ICmp, &[Word::Int(0), Word::Int(1)]).unwrap();
        assert!(vm.cmp_flag());

        run_op(&mut vm, Opcode::Mov, &[Word::Int(4), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::ICmp, &[Word::Int(0), Word::Int(1)]).unwrap();
        assert!(!vm.cmp_flag());
    }

    #[test]
    fn test_out_of_range_register() {
        let mut vm = machine();
        let err = run_op(&mut vm, Opcode::PushR, &[Word::Int(256)]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRegister(256)));
        let err = run_op(&mut vm, Opcode::PushR, &[Word::Int(-1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRegister(-1)));
    }

    #[test]
    fn test_cast_transitions() {
        let mut vm = machine();

        run_op(&mut vm, Opcode::Mov, &[Word::Int(3), Word::Int(1)]).unwrap();
        run_op(&mut vm, Opcode::Cast, &[Word::Str("float".into()), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(1), &Word::Float(3.0));

        run_op(&mut vm, Opcode::Cast, &[Word::Str("int".into()), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(1), &Word::Int(3));

        run_op(&mut vm, Opcode::Cast, &[Word::Str("ptr".into()), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(1), &Word::Ptr(3));

        run_op(&mut vm, Opcode::Cast, &[Word::Str("int".into()), Word::Int(1)]).unwrap();
        assert_eq!(vm.getr(1), &Word::Int(3));
    }

    #[test]
    fn test_invalid_cast() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Float(1.5), Word::Int(1)]).unwrap();
        let err =
            run_op(&mut vm, Opcode::Cast, &[Word::Str("ptr".into()), Word::Int(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCast { .. }));

        let err =
            run_op(&mut vm, Opcode::Cast, &[Word::Str("bool".into()), Word::Int(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownCastTarget(_)));
    }

    #[test]
    fn test_locals_default_to_null() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Int(1), Word::Int(0)]).unwrap();
        run_op(&mut vm, Opcode::LocalGet, &[Word::Int(42)]).unwrap();
        assert!(vm.getr(0).is_null());
    }

    #[test]
    fn test_local_set_then_get() {
        let mut vm = machine();
        run_op(&mut vm, Opcode::Mov, &[Word::Str("kept".into()), Word::Int(5)]).unwrap();
        run_op(&mut vm, Opcode::LocalSet, &[Word::Int(2), Word::Int(5)]).unwrap();
        run_op(&mut vm, Opcode::LocalGet, &[Word::Int(2)]).unwrap();
        assert_eq!(vm.getr(0), &Word::Str("kept".into()));
    }

    #[test]
    fn test_reserved_memory_ops_fail() {
        let mut vm = machine();
        let args = [Word::Int(0), Word::Int(1), Word::Int(2)];
        assert!(matches!(
            run_op(&mut vm, Opcode::Load, &args),
            Err(RuntimeError::Unimplemented("load"))
        ));
        assert!(matches!(
            run_op(&mut vm, Opcode::Store, &args),
            Err(RuntimeError::Unimplemented("store"))
        ));
    }

    #[test]
    fn test_callx_missing_extern() {
        let mut vm = machine();
        let err = run_op(&mut vm, Opcode::CallX, &[Word::Str("ghost".into())]).unwrap_err();
        assert!(matches!(err, RuntimeError::ExternNotFound(name) if name == "ghost"));
    }

    #[test]
    fn test_call_requires_string_operand() {
        let mut vm = machine();
        let err = run_op(&mut vm, Opcode::Call, &[Word::Int(3)]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ExpectedString {
                op: "call",
                found: WordKind::Int
            }
        ));
    }
}
