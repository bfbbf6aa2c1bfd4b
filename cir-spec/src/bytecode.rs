//! # Bytecode Container
//!
//! A self-describing little-endian serialization of a [`Program`] with
//! a deduplicated string table.
//!
//! ## Layout
//!
//! ```text
//! u32 magic ("CIRB")          u8 format version
//! string table:   u32 count, then per entry: u32 length, bytes, NUL
//! function table: u32 count, then per function:
//!     u32 name_index
//!     u32 op_count,    then per op:    u8 opcode, 3 argument records
//!     u32 local_count, then per local: u32 local_id, argument record
//! ```
//!
//! An argument record is `u8 word_type, u8 flags`, then either a
//! `u32` string-table index (when the string flag is set on a pointer
//! word; `0xFFFF_FFFF` means null) or the raw 8-byte payload.
//!
//! Decoding rematerializes every string payload as a fresh owned copy,
//! so the round-trip restores ownership exactly.

use std::collections::HashMap;

use crate::error::{CirError, Result};
use crate::opcode::Opcode;
use crate::program::{Function, Op, Program};
use crate::word::{Word, WordKind, FLAG_STRING};
use crate::{FORMAT_VERSION, MAGIC, NULL_STRING_INDEX, OP_ARG_COUNT};

// ============================================================================
// Encoding
// ============================================================================

/// String interner: first-seen order, stable indices.
#[derive(Default)]
struct StringTable {
    entries: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.entries.len() as u32;
        self.entries.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_word(out: &mut Vec<u8>, word: &Word, strings: &mut StringTable) {
    out.push(word.kind() as u8);
    out.push(word.flags());

    match word {
        Word::Str(s) => put_u32(out, strings.intern(s)),
        Word::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
        Word::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
        Word::Ptr(p) => out.extend_from_slice(&p.to_le_bytes()),
        Word::Bool(b) => out.extend_from_slice(&(*b as u64).to_le_bytes()),
        Word::Null => out.extend_from_slice(&0u64.to_le_bytes()),
    }
}

/// Serialize a program. Functions are written in map order, locals in
/// ascending id order, so equal programs encode identically.
pub fn encode_program(program: &Program) -> Vec<u8> {
    let mut strings = StringTable::default();
    let mut body = Vec::new();

    // Function table is built first so the string table is complete
    // before it is written.
    put_u32(&mut body, program.functions.len() as u32);
    for (name, func) in &program.functions {
        put_u32(&mut body, strings.intern(name));

        put_u32(&mut body, func.ops.len() as u32);
        for op in &func.ops {
            body.push(op.opcode as u8);
            for arg in &op.args {
                put_word(&mut body, arg, &mut strings);
            }
        }

        put_u32(&mut body, func.locals.len() as u32);
        for (&id, value) in &func.locals {
            put_u32(&mut body, id);
            put_word(&mut body, value, &mut strings);
        }
    }

    let mut out = Vec::with_capacity(body.len() + 64);
    put_u32(&mut out, MAGIC);
    out.push(FORMAT_VERSION);

    put_u32(&mut out, strings.entries.len() as u32);
    for entry in &strings.entries {
        put_u32(&mut out, entry.len() as u32);
        out.extend_from_slice(entry.as_bytes());
        out.push(0);
    }

    out.extend_from_slice(&body);
    out
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, boundary: &'static str) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(CirError::Truncated(boundary));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, boundary: &'static str) -> Result<u8> {
        Ok(self.take(1, boundary)?[0])
    }

    fn u32(&mut self, boundary: &'static str) -> Result<u32> {
        let b = self.take(4, boundary)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, boundary: &'static str) -> Result<u64> {
        let b = self.take(8, boundary)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

fn read_word(r: &mut Reader<'_>, strings: &[String], boundary: &'static str) -> Result<Word> {
    let kind = WordKind::from_u8(r.u8(boundary)?)?;
    let flags = r.u8(boundary)?;

    if flags & FLAG_STRING != 0 && kind == WordKind::Ptr {
        let index = r.u32(boundary)?;
        if index == NULL_STRING_INDEX {
            return Ok(Word::Null);
        }
        let s = strings
            .get(index as usize)
            .ok_or(CirError::InvalidStringIndex(index))?;
        return Ok(Word::Str(s.clone()));
    }

    let raw = r.u64(boundary)?;
    let word = match kind {
        WordKind::Int => Word::Int(raw as i64),
        WordKind::Float => Word::Float(f64::from_bits(raw)),
        WordKind::Ptr => Word::Ptr(raw),
        WordKind::Bool => Word::Bool(raw != 0),
        WordKind::Null => Word::Null,
    };
    Ok(word)
}

/// Deserialize a program from its container form.
///
/// Truncation at any boundary fails with the name of that boundary;
/// string references are validated against the table.
pub fn decode_program(bytes: &[u8]) -> Result<Program> {
    let mut r = Reader::new(bytes);

    let magic = r.u32("magic")?;
    if magic != MAGIC {
        return Err(CirError::BadMagic(magic));
    }
    let version = r.u8("format version")?;
    if version != FORMAT_VERSION {
        return Err(CirError::UnsupportedVersion(version));
    }

    let string_count = r.u32("string count")?;
    let mut strings = Vec::with_capacity(string_count.min(1024) as usize);
    for i in 0..string_count {
        let len = r.u32("string length")? as usize;
        let data = r.take(len, "string data")?;
        let terminator = r.u8("string terminator")?;
        if terminator != 0 {
            return Err(CirError::UnterminatedString(i));
        }
        strings.push(String::from_utf8_lossy(data).into_owned());
    }

    let mut program = Program::new();

    let func_count = r.u32("function count")?;
    for _ in 0..func_count {
        let name_index = r.u32("function name index")?;
        let name = strings
            .get(name_index as usize)
            .ok_or(CirError::InvalidStringIndex(name_index))?
            .clone();

        let mut func = Function::default();

        let op_count = r.u32("op count")?;
        for _ in 0..op_count {
            let opcode = Opcode::from_u8(r.u8("op type")?)?;
            let mut op = Op::new(opcode);
            for slot in 0..OP_ARG_COUNT {
                op.args[slot] = read_word(&mut r, &strings, "op argument")?;
            }
            func.ops.push(op);
        }

        let local_count = r.u32("local count")?;
        for _ in 0..local_count {
            let id = r.u32("local id")?;
            let value = read_word(&mut r, &strings, "local value")?;
            func.locals.insert(id, value);
        }

        program.functions.insert(name, func);
    }

    Ok(program)
}
