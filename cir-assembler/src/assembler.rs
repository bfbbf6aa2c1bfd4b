//! # Main Assembler Logic
//!
//! One top-down pass over the source builds the program and records
//! every `@label` operand site; a resolution pass then backpatches the
//! sites to "target index - 1" (the machine's jump convention) and an
//! inline pass splices `inline`-marked callees into their call sites.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::warn;

use cir_spec::{encode_program, Function, FunctionAttrs, Op, Opcode, Program, Word};

use crate::error::{AssemblerError, Result};
use crate::expr;
use crate::operand::{self, OperandError, Parsed};

/// Iteration bound for nested inline expansion. Chains of inline
/// functions expand to a fixed point; a cycle trips the bound instead
/// of looping forever.
const INLINE_DEPTH_LIMIT: usize = 32;

/// A recorded `@label` operand awaiting resolution.
struct LabelRef {
    function: String,
    label: String,
    op_index: usize,
    slot: usize,
}

pub struct Assembler {
    /// Emit the advisory note when an operand falls through to the
    /// bare-word form. On by default; the note fires at most once.
    pub show_plain_string_note: bool,

    program: Program,
    labels: HashMap<String, HashMap<String, usize>>,
    label_refs: Vec<LabelRef>,
    current_function: Option<String>,
    line_number: usize,
    note_emitted: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            show_plain_string_note: true,
            program: Program::new(),
            labels: HashMap::new(),
            label_refs: Vec::new(),
            current_function: None,
            line_number: 0,
            note_emitted: false,
        }
    }

    pub fn assemble_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let source = std::fs::read_to_string(path)?;
        self.assemble_string(&source)
    }

    pub fn assemble_string(&mut self, source: &str) -> Result<()> {
        for line in source.lines() {
            self.line_number += 1;
            let cleaned = line.trim();

            // Full-line comments; '#' tolerates shebangs and file-level
            // directives of other tools.
            if cleaned.is_empty() || cleaned.starts_with(';') || cleaned.starts_with('#') {
                continue;
            }

            if cleaned == ".fn" {
                return Err(AssemblerError::EmptyFunctionName {
                    line: self.line_number,
                });
            }
            if let Some(rest) = cleaned.strip_prefix(".fn ") {
                self.begin_function(rest)?;
                continue;
            }

            if cleaned == ".end" {
                if self.current_function.is_none() {
                    return Err(AssemblerError::EndWithoutFn {
                        line: self.line_number,
                    });
                }
                self.current_function = None;
                continue;
            }

            if self.current_function.is_none() {
                if cleaned == ".extern" {
                    return Err(AssemblerError::MalformedDirective {
                        line: self.line_number,
                        text: cleaned.to_string(),
                    });
                }
                if let Some(rest) = cleaned.strip_prefix(".extern ") {
                    let name = rest.trim();
                    if !self.program.externs.iter().any(|e| e == name) {
                        self.program.externs.push(name.to_string());
                    }
                    continue;
                }
                return Err(AssemblerError::InstructionOutsideFunction {
                    line: self.line_number,
                    text: cleaned.to_string(),
                });
            }

            self.assemble_line(cleaned)?;
        }

        if let Some(name) = self.current_function.take() {
            return Err(AssemblerError::MissingEnd { name });
        }

        self.verify_functions()?;
        self.resolve_labels()?;
        self.expand_inline()?;
        Ok(())
    }

    pub fn get_program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn write_bytecode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = encode_program(&self.program);
        std::fs::write(path, bytes)?;
        Ok(())
    }

    // ========================================================================
    // Pass 1: parse
    // ========================================================================

    fn begin_function(&mut self, rest: &str) -> Result<()> {
        let mut parts = rest.split_whitespace();
        let name = parts
            .next()
            .ok_or(AssemblerError::EmptyFunctionName {
                line: self.line_number,
            })?
            .to_string();

        let mut attrs = FunctionAttrs::default();
        for attr in parts {
            match attr {
                "inline" => attrs.inline = true,
                other => {
                    return Err(AssemblerError::UnknownAttribute {
                        line: self.line_number,
                        name,
                        attr: other.to_string(),
                    })
                }
            }
        }

        if self.program.functions.contains_key(&name) {
            return Err(AssemblerError::DuplicateFunction {
                line: self.line_number,
                name,
            });
        }

        self.labels.insert(name.clone(), HashMap::new());
        self.program.functions.insert(
            name.clone(),
            Function {
                attrs,
                ..Function::default()
            },
        );
        self.current_function = Some(name);
        Ok(())
    }

    fn assemble_line(&mut self, line: &str) -> Result<()> {
        let cleaned = match line.find(';') {
            Some(at) => line[..at].trim(),
            None => line,
        };
        if cleaned.is_empty() {
            return Ok(());
        }

        if let Some(label) = cleaned.strip_suffix(':') {
            return self.define_label(label.trim());
        }

        let (mnemonic, rest) = match cleaned.find(char::is_whitespace) {
            Some(at) => (&cleaned[..at], cleaned[at..].trim()),
            None => (cleaned, ""),
        };

        let opcode = Opcode::from_mnemonic(&mnemonic.to_lowercase()).ok_or_else(|| {
            AssemblerError::UnknownOpcode {
                line: self.line_number,
                opcode: mnemonic.to_string(),
            }
        })?;

        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect()
        };

        if operands.len() != opcode.arity() {
            return Err(AssemblerError::ArityMismatch {
                line: self.line_number,
                opcode: opcode.mnemonic().to_string(),
                expected: opcode.arity(),
                found: operands.len(),
            });
        }

        let function = self.current_function.clone().unwrap_or_default();
        let op_index = self.program.functions[&function].ops.len();

        let mut op = Op::new(opcode);
        for (slot, &text) in operands.iter().enumerate() {
            op.args[slot] = self.parse_operand(text, &function, op_index, slot)?;
        }

        self.program
            .functions
            .get_mut(&function)
            .expect("current function exists")
            .ops
            .push(op);
        Ok(())
    }

    fn define_label(&mut self, raw: &str) -> Result<()> {
        let label = raw.strip_prefix('.').unwrap_or(raw);
        if label.is_empty() {
            return Err(AssemblerError::EmptyLabel {
                line: self.line_number,
            });
        }

        let function = self.current_function.clone().unwrap_or_default();
        let op_index = self.program.functions[&function].ops.len();
        let table = self.labels.entry(function).or_default();

        if table.contains_key(label) {
            return Err(AssemblerError::DuplicateLabel {
                line: self.line_number,
                label: label.to_string(),
            });
        }
        table.insert(label.to_string(), op_index);
        Ok(())
    }

    fn parse_operand(
        &mut self,
        text: &str,
        function: &str,
        op_index: usize,
        slot: usize,
    ) -> Result<Word> {
        // Compile-time arithmetic over the labels defined so far.
        if let Some(inner) = text
            .strip_prefix("comp(")
            .and_then(|t| t.strip_suffix(')'))
        {
            let ctx: HashMap<String, f64> = self.labels[function]
                .iter()
                .map(|(name, &index)| (name.clone(), index as f64))
                .collect();
            let value = expr::eval(inner, &ctx).map_err(|source| AssemblerError::Expr {
                line: self.line_number,
                source,
            })?;
            return Ok(Word::Float(value));
        }

        if let Some(label) = text.strip_prefix('@') {
            self.label_refs.push(LabelRef {
                function: function.to_string(),
                label: label.to_string(),
                op_index,
                slot,
            });
            // Placeholder; resolve_labels() patches the real target.
            return Ok(Word::Int(0));
        }

        match operand::parse(text) {
            Ok(Parsed::Word(w)) => Ok(w),
            Ok(Parsed::Bare(word)) => {
                if self.show_plain_string_note && !self.note_emitted {
                    self.note_emitted = true;
                    warn!(
                        line = self.line_number,
                        operand = %word,
                        "operand treated as a plain string; prefix numbers with $, \
                         labels with @, registers as rN, ids with # (shown once)"
                    );
                }
                Ok(Word::Str(word))
            }
            Err(OperandError::UnprefixedNumber(value)) => Err(AssemblerError::UnprefixedNumber {
                line: self.line_number,
                value,
            }),
            Err(OperandError::InvalidRegister { value }) => Err(AssemblerError::InvalidRegister {
                line: self.line_number,
                register: value,
            }),
            Err(OperandError::EmptyNumeric) => Err(AssemblerError::InvalidLiteral {
                line: self.line_number,
                what: "numeric",
                value: text.to_string(),
            }),
            Err(OperandError::InvalidLiteral { what, value }) => {
                Err(AssemblerError::InvalidLiteral {
                    line: self.line_number,
                    what,
                    value,
                })
            }
        }
    }

    // ========================================================================
    // Pass 2: verify functions
    // ========================================================================

    fn verify_functions(&self) -> Result<()> {
        if self.program.functions.is_empty() {
            return Err(AssemblerError::NoFunctions);
        }
        if !self.program.functions.contains_key("main") {
            return Err(AssemblerError::NoMain);
        }
        Ok(())
    }

    // ========================================================================
    // Pass 3: resolve labels
    // ========================================================================

    /// Backpatch every recorded `@label` site. Targets are stored as
    /// "index - 1" so the dispatch loop's post-op increment lands on
    /// the labelled instruction.
    fn resolve_labels(&mut self) -> Result<()> {
        for site in &self.label_refs {
            let index = self
                .labels
                .get(&site.function)
                .and_then(|table| table.get(&site.label))
                .copied()
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    function: site.function.clone(),
                    label: site.label.clone(),
                })?;

            self.program
                .functions
                .get_mut(&site.function)
                .expect("label site names a parsed function")
                .ops[site.op_index]
                .args[site.slot] = Word::Int(index as i64 - 1);
        }
        Ok(())
    }

    // ========================================================================
    // Pass 4: inline expansion
    // ========================================================================

    fn expand_inline(&mut self) -> Result<()> {
        let functions = &mut self.program.functions;

        if functions.get("main").is_some_and(|f| f.attrs.inline) {
            return Err(AssemblerError::InlineMain);
        }

        // Labels were resolved against pre-splice indices, so inline
        // bodies must be branch-free.
        let branching: HashSet<&String> = self.label_refs.iter().map(|r| &r.function).collect();
        for (name, func) in functions.iter() {
            if func.attrs.inline && branching.contains(name) {
                return Err(AssemblerError::InlineHasBranches { name: name.clone() });
            }
        }

        // `ret` has no meaning inside a splice; drop it up front.
        for (name, func) in functions.iter_mut() {
            if !func.attrs.inline {
                continue;
            }
            let before = func.ops.len();
            func.ops.retain(|op| op.opcode != Opcode::Ret);
            let dropped = before - func.ops.len();
            if dropped > 0 {
                warn!(function = %name, dropped, "inline expansion elided ret");
            }
        }

        let all_names: HashSet<String> = functions.keys().cloned().collect();

        let mut depth = 0;
        loop {
            let inline_bodies: HashMap<String, Vec<Op>> = functions
                .iter()
                .filter(|(_, f)| f.attrs.inline)
                .map(|(n, f)| (n.clone(), f.ops.clone()))
                .collect();

            let mut changed = false;
            let names: Vec<String> = functions.keys().cloned().collect();
            for name in names {
                let ops = std::mem::take(&mut functions.get_mut(&name).expect("known").ops);
                let mut new_ops = Vec::with_capacity(ops.len());

                for op in ops {
                    if op.opcode == Opcode::Call {
                        if let Some(target) = op.args[0].as_str() {
                            if !all_names.contains(target) {
                                return Err(AssemblerError::UndefinedCallTarget {
                                    caller: name.clone(),
                                    callee: target.to_string(),
                                });
                            }
                            if let Some(body) = inline_bodies.get(target) {
                                new_ops.extend(body.iter().cloned());
                                changed = true;
                                continue;
                            }
                        }
                    }
                    new_ops.push(op);
                }

                functions.get_mut(&name).expect("known").ops = new_ops;
            }

            if !changed {
                break;
            }
            depth += 1;
            if depth > INLINE_DEPTH_LIMIT {
                return Err(AssemblerError::InlineDepth {
                    limit: INLINE_DEPTH_LIMIT,
                });
            }
        }

        functions.retain(|_, f| !f.attrs.inline);
        Ok(())
    }
}
