//! # Typed Operand Parser
//!
//! The leading character of an operand decides its form:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `$N` | numeric literal (hex `0x`, binary `0b`, leading-0 octal, decimal; `.`/`e` makes a float) |
//! | `'c'` | character literal (integer) |
//! | `"…"` | owned string |
//! | `rN` / `dest` | register reference (`dest` aliases `r0`) |
//! | `#name` | identifier literal (owned string) |
//! | `true`/`false`, `null` | boolean / null |
//! | bare word | owned string, advisory diagnostic |
//!
//! An unprefixed numeric-looking token is a hard error: the fix is to
//! prefix it with `$`. Label (`@…`) and `comp(…)` operands need
//! assembler state and are handled by the caller.

use cir_spec::{Word, REGISTER_COUNT};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OperandError {
    #[error("empty numeric literal after '$'")]
    EmptyNumeric,

    #[error("invalid {what} literal: {value}")]
    InvalidLiteral { what: &'static str, value: String },

    #[error("invalid register {value} (valid range: r0-r255)")]
    InvalidRegister { value: String },

    #[error("numeric literal '{0}' must be prefixed with '$'")]
    UnprefixedNumber(String),
}

/// A successfully parsed operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Word(Word),
    /// Bare word, accepted as an owned string; the assembler emits a
    /// one-time advisory note for these.
    Bare(String),
}

pub fn parse(text: &str) -> Result<Parsed, OperandError> {
    if let Some(id) = text.strip_prefix('#') {
        return Ok(Parsed::Word(Word::Str(id.to_string())));
    }

    if text == "dest" {
        return Ok(Parsed::Word(Word::Int(0)));
    }

    if let Some(digits) = text.strip_prefix('r') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return parse_register(text, digits);
        }
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Ok(Parsed::Word(Word::Str(unescape_string(
            &text[1..text.len() - 1],
        ))));
    }

    match text {
        "true" | "TRUE" => return Ok(Parsed::Word(Word::Bool(true))),
        "false" | "FALSE" => return Ok(Parsed::Word(Word::Bool(false))),
        "null" | "NULL" => return Ok(Parsed::Word(Word::Null)),
        _ => {}
    }

    if let Some(num) = text.strip_prefix('$') {
        return parse_numeric(num).map(Parsed::Word);
    }

    if text.len() >= 3 && text.starts_with('\'') && text.ends_with('\'') {
        return parse_char(&text[1..text.len() - 1]).map(Parsed::Word);
    }

    if looks_like_number(text) {
        return Err(OperandError::UnprefixedNumber(text.to_string()));
    }

    Ok(Parsed::Bare(text.to_string()))
}

fn parse_register(full: &str, digits: &str) -> Result<Parsed, OperandError> {
    let invalid = || OperandError::InvalidRegister {
        value: full.to_string(),
    };
    let n: usize = digits.parse().map_err(|_| invalid())?;
    if n >= REGISTER_COUNT {
        return Err(invalid());
    }
    Ok(Parsed::Word(Word::Int(n as i64)))
}

fn parse_numeric(num: &str) -> Result<Word, OperandError> {
    if num.is_empty() {
        return Err(OperandError::EmptyNumeric);
    }

    let invalid = |what: &'static str| OperandError::InvalidLiteral {
        what,
        value: format!("${}", num),
    };

    let (negative, mag) = match num.as_bytes()[0] {
        b'-' => (true, &num[1..]),
        b'+' => (false, &num[1..]),
        _ => (false, num),
    };
    if mag.is_empty() {
        return Err(invalid("integer"));
    }

    let signed = |v: i64| Word::Int(if negative { v.wrapping_neg() } else { v });

    // Radix prefixes take precedence: hex digits may contain 'e'/'E',
    // which would otherwise read as a float exponent.
    if let Some(hex) = mag.strip_prefix("0x").or_else(|| mag.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(signed)
            .map_err(|_| invalid("hexadecimal"));
    }
    if let Some(bin) = mag.strip_prefix("0b").or_else(|| mag.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2)
            .map(signed)
            .map_err(|_| invalid("binary"));
    }

    if mag.contains(['.', 'e', 'E']) {
        return num.parse::<f64>().map(Word::Float).map_err(|_| invalid("float"));
    }

    if mag.len() > 1 && mag.starts_with('0') {
        return i64::from_str_radix(mag, 8)
            .map(signed)
            .map_err(|_| invalid("octal"));
    }

    mag.parse::<i64>().map(signed).map_err(|_| invalid("integer"))
}

fn parse_char(inner: &str) -> Result<Word, OperandError> {
    let mut chars = inner.chars();
    let first = chars.next().ok_or(OperandError::InvalidLiteral {
        what: "character",
        value: format!("'{}'", inner),
    })?;

    let c = if first == '\\' {
        match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some(other) => other,
            None => '\\',
        }
    } else {
        first
    };

    Ok(Word::Int(c as i64))
}

fn unescape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some('"') => {
                out.push('"');
                chars.next();
            }
            // Unknown escape: keep the backslash, let the next char
            // through untouched.
            _ => out.push('\\'),
        }
    }
    out
}

/// Does this token read as a number the user forgot to `$`-prefix?
fn looks_like_number(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    if body.is_empty() {
        return false;
    }

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        return !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }
    if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        return !bin.is_empty() && bin.bytes().all(|b| b == b'0' || b == b'1');
    }

    let mut has_dot = false;
    let mut has_exp = false;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                if has_dot || has_exp {
                    return false;
                }
                has_dot = true;
            }
            b'e' | b'E' => {
                if has_exp {
                    return false;
                }
                has_exp = true;
                if matches!(bytes.get(i + 1), Some(b'+') | Some(b'-')) {
                    i += 1;
                }
            }
            b if b.is_ascii_digit() => {}
            _ => return false,
        }
        i += 1;
    }
    true
}
