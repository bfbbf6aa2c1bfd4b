//! # Compile-Time Expression Evaluator
//!
//! Evaluates the arithmetic sub-language allowed inside `comp(...)`
//! operands:
//!
//! ```text
//! expr   := term (('+'|'-') term)*
//! term   := factor (('*'|'/') factor)*
//! factor := number | identifier | '(' expr ')' | '-' factor
//! ```
//!
//! Numbers are decimal, optionally fractional. Identifiers resolve
//! against the caller-supplied context (the current function's label
//! table); an unresolved identifier is an error. The evaluator is pure:
//! no state survives a call.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Missing ')'")]
    UnclosedParen,

    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Trailing input after expression: '{0}'")]
    Trailing(char),
}

/// Evaluate `input` against `ctx`, producing a 64-bit float.
pub fn eval(input: &str, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
        ctx,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(value),
        Some(c) => Err(ExprError::Trailing(c as char)),
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    ctx: &'a HashMap<String, f64>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'.') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| ExprError::InvalidNumber(text.to_string()))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        self.skip_ws();
        match self.peek() {
            None => Err(ExprError::UnexpectedEnd),
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let id = self.identifier();
                self.ctx
                    .get(&id)
                    .copied()
                    .ok_or(ExprError::UnknownIdentifier(id))
            }
            Some(b'(') => {
                self.bump();
                let value = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(ExprError::UnclosedParen);
                }
                self.bump();
                Ok(value)
            }
            Some(b'-') => {
                self.bump();
                Ok(-self.factor()?)
            }
            Some(c) => Err(ExprError::UnexpectedChar(c as char)),
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.bump();
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.bump();
                    value /= self.factor()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.bump();
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }
}
