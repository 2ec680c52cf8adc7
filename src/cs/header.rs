//! Parser for the Python literal stored in a `.npy` header.
//!
//! The header is a dict such as
//! `{'descr': [('uid', '<u8'), ('blob/path', '|S43')], 'fortran_order': False, 'shape': (12,), }`.
//! Only the literal forms NumPy emits are accepted: strings, integers,
//! booleans, `None`, lists, tuples and dicts with string keys.

use crate::error::{Error, Result};

/// Value of the header literal
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PyValue {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    List(Vec<PyValue>),
    Tuple(Vec<PyValue>),
    Dict(Vec<(String, PyValue)>),
}

impl PyValue {
    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            PyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple
    pub(crate) fn as_seq(&self) -> Option<&[PyValue]> {
        match self {
            PyValue::List(v) | PyValue::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&PyValue> {
        match self {
            PyValue::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Tuple of non-negative integers, e.g. a shape
    pub(crate) fn as_dims(&self) -> Option<Vec<usize>> {
        self.as_seq()?
            .iter()
            .map(|v| match v {
                PyValue::Int(n) if *n >= 0 => Some(*n as usize),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn parse_literal(text: &str) -> Result<PyValue> {
    let mut parser = LiteralParser {
        bytes: text.as_bytes(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn error(&self, what: &str) -> Error {
        Error::InvalidFormat(format!("npy header: {} at offset {}", what, self.pos))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn value(&mut self) -> Result<PyValue> {
        match self.peek() {
            Some(b'{') => self.dict(),
            Some(b'[') => Ok(PyValue::List(self.seq(b'[', b']')?)),
            Some(b'(') => Ok(PyValue::Tuple(self.seq(b'(', b')')?)),
            Some(b'\'') | Some(b'"') => Ok(PyValue::Str(self.string()?)),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.int(),
            Some(b) if b.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end")),
        }
    }

    /// Comma-separated values up to `close`; a trailing comma is allowed
    fn seq(&mut self, open: u8, close: u8) -> Result<Vec<PyValue>> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {}
                _ => return Err(self.error("expected ',' or closing bracket")),
            }
        }
    }

    fn dict(&mut self) -> Result<PyValue> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(PyValue::Dict(entries));
            }
            let key = self.string()?;
            self.expect(b':')?;
            let value = self.value()?;
            entries.push((key, value));
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected string")),
        };
        self.pos += 1;
        let mut out = Vec::new();
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            match b {
                b'\\' => {
                    let escaped = *self
                        .bytes
                        .get(self.pos)
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += 1;
                    out.push(escaped);
                }
                b if b == quote => {
                    return String::from_utf8(out).map_err(|_| self.error("invalid UTF-8"));
                }
                b => out.push(b),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn int(&mut self) -> Result<PyValue> {
        let start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let bytes = self.bytes;
        let digits = std::str::from_utf8(&bytes[start..self.pos])
            .map_err(|_| self.error("invalid integer"))?;
        // Python 2 era headers may carry a long suffix
        if self.bytes.get(self.pos) == Some(&b'L') {
            self.pos += 1;
        }
        digits
            .parse()
            .map(PyValue::Int)
            .map_err(|_| self.error("invalid integer"))
    }

    fn keyword(&mut self) -> Result<PyValue> {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let bytes = self.bytes;
        match &bytes[start..self.pos] {
            b"True" => Ok(PyValue::Bool(true)),
            b"False" => Ok(PyValue::Bool(false)),
            b"None" => Ok(PyValue::None),
            _ => {
                self.pos = start;
                Err(self.error("unknown keyword"))
            }
        }
    }
}
