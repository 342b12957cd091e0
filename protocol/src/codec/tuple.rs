//! # Tuple Format
//!
//! A self-describing, byte-level container. The grammar:
//!
//! ```text
//! tuple   := '(' element* ')'
//! element := 'n' | 'i' i32 | 'I' i64 | 'u' u32 | 'U' u64
//!          | 'f' f32 | 'F' f64 | 'b' u8
//!          | 's' <NUL-terminated UTF-8 bytes>
//!          | 'B' u32-length <bytes>
//!          | tuple
//! ```
//!
//! Tag bytes are the literal ASCII characters above. All multi-byte
//! integers are big-endian on the wire. Floats are written in host byte
//! order — a known non-portability that must be preserved for hash
//! compatibility on a homogeneous deployment; the consensus-layer shape
//! validators never accept float elements, so floats cannot reach
//! consensus data.
//!
//! Parsing is all-or-nothing: a malformed buffer yields an error and no
//! partial state. Trailing bytes after the closing parenthesis of the
//! outermost tuple are ignored, mirroring how framed payloads are sliced
//! out of a stream.

use std::fmt;

use thiserror::Error;

const TAG_START: u8 = b'(';
const TAG_END: u8 = b')';
const TAG_NULL: u8 = b'n';
const TAG_I32: u8 = b'i';
const TAG_I64: u8 = b'I';
const TAG_U32: u8 = b'u';
const TAG_U64: u8 = b'U';
const TAG_F32: u8 = b'f';
const TAG_F64: u8 = b'F';
const TAG_BOOL: u8 = b'b';
const TAG_STRING: u8 = b's';
const TAG_BINARY: u8 = b'B';

/// Reasons a byte buffer fails to parse as a tuple.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the tuple was complete.
    #[error("truncated tuple")]
    Truncated,

    /// The buffer does not begin with an opening parenthesis.
    #[error("tuple must begin with '('")]
    MissingStart,

    /// An element carried a tag byte outside the grammar.
    #[error("unknown element tag 0x{0:02x}")]
    UnknownTag(u8),

    /// A string element was not valid UTF-8.
    #[error("string element is not valid UTF-8")]
    InvalidUtf8,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One parsed element. Borrows from the buffer it was parsed out of.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(&'a str),
    Binary(&'a [u8]),
    Tuple(Tuple<'a>),
}

// ---------------------------------------------------------------------------
// Tuple
// ---------------------------------------------------------------------------

/// A parsed tuple: its elements plus the verbatim byte span it occupies.
///
/// The span (`raw`) runs from the opening to the closing parenthesis
/// inclusive. Consensus code hashes these spans directly, so they must
/// never be re-serialized forms — always the bytes that actually arrived.
#[derive(Clone, PartialEq)]
pub struct Tuple<'a> {
    raw: &'a [u8],
    elements: Vec<Value<'a>>,
}

impl<'a> Tuple<'a> {
    /// Parse one tuple from the front of `buf`. Bytes after the closing
    /// parenthesis are ignored.
    pub fn parse(buf: &'a [u8]) -> Result<Tuple<'a>, CodecError> {
        let (tuple, _consumed) = parse_at(buf)?;
        Ok(tuple)
    }

    /// The verbatim bytes this tuple was parsed from, parentheses included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if the tuple carries no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The ith element, if present.
    pub fn get(&self, i: usize) -> Option<&Value<'a>> {
        self.elements.get(i)
    }

    /// Iterate over the elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value<'a>> {
        self.elements.iter()
    }

    pub fn get_i32(&self, i: usize) -> Option<i32> {
        match self.get(i) {
            Some(Value::I32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, i: usize) -> Option<u32> {
        match self.get(i) {
            Some(Value::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, i: usize) -> Option<u64> {
        match self.get(i) {
            Some(Value::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, i: usize) -> Option<&'a str> {
        match self.get(i) {
            Some(Value::Str(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_binary(&self, i: usize) -> Option<&'a [u8]> {
        match self.get(i) {
            Some(Value::Binary(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_tuple(&self, i: usize) -> Option<&Tuple<'a>> {
        match self.get(i) {
            Some(Value::Tuple(t)) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Debug for Tuple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elements.iter()).finish()
    }
}

/// Parse a tuple starting at `buf[0]`, returning it with the number of
/// bytes consumed.
fn parse_at(buf: &[u8]) -> Result<(Tuple<'_>, usize), CodecError> {
    if buf.first() != Some(&TAG_START) {
        return Err(CodecError::MissingStart);
    }

    let mut elements = Vec::new();
    let mut pos = 1usize;

    loop {
        let tag = *buf.get(pos).ok_or(CodecError::Truncated)?;
        match tag {
            TAG_END => {
                pos += 1;
                let tuple = Tuple {
                    raw: &buf[..pos],
                    elements,
                };
                return Ok((tuple, pos));
            }
            TAG_NULL => {
                elements.push(Value::Null);
                pos += 1;
            }
            TAG_I32 => {
                let v = read_array::<4>(buf, pos + 1)?;
                elements.push(Value::I32(i32::from_be_bytes(v)));
                pos += 1 + 4;
            }
            TAG_I64 => {
                let v = read_array::<8>(buf, pos + 1)?;
                elements.push(Value::I64(i64::from_be_bytes(v)));
                pos += 1 + 8;
            }
            TAG_U32 => {
                let v = read_array::<4>(buf, pos + 1)?;
                elements.push(Value::U32(u32::from_be_bytes(v)));
                pos += 1 + 4;
            }
            TAG_U64 => {
                let v = read_array::<8>(buf, pos + 1)?;
                elements.push(Value::U64(u64::from_be_bytes(v)));
                pos += 1 + 8;
            }
            TAG_F32 => {
                let v = read_array::<4>(buf, pos + 1)?;
                elements.push(Value::F32(f32::from_ne_bytes(v)));
                pos += 1 + 4;
            }
            TAG_F64 => {
                let v = read_array::<8>(buf, pos + 1)?;
                elements.push(Value::F64(f64::from_ne_bytes(v)));
                pos += 1 + 8;
            }
            TAG_BOOL => {
                let v = *buf.get(pos + 1).ok_or(CodecError::Truncated)?;
                elements.push(Value::Bool(v != 0));
                pos += 1 + 1;
            }
            TAG_STRING => {
                let start = pos + 1;
                let rel = buf[start..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(CodecError::Truncated)?;
                let s = std::str::from_utf8(&buf[start..start + rel])
                    .map_err(|_| CodecError::InvalidUtf8)?;
                elements.push(Value::Str(s));
                pos = start + rel + 1;
            }
            TAG_BINARY => {
                let len_bytes = read_array::<4>(buf, pos + 1)?;
                let len = u32::from_be_bytes(len_bytes) as usize;
                let start = pos + 1 + 4;
                if buf.len() < start + len {
                    return Err(CodecError::Truncated);
                }
                elements.push(Value::Binary(&buf[start..start + len]));
                pos = start + len;
            }
            TAG_START => {
                let (sub, used) = parse_at(&buf[pos..])?;
                elements.push(Value::Tuple(sub));
                pos += used;
            }
            other => return Err(CodecError::UnknownTag(other)),
        }
    }
}

fn read_array<const N: usize>(buf: &[u8], at: usize) -> Result<[u8; N], CodecError> {
    let slice = buf.get(at..at + N).ok_or(CodecError::Truncated)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

// ---------------------------------------------------------------------------
// TupleWriter
// ---------------------------------------------------------------------------

/// Incremental tuple builder. `begin`/`end` calls nest; `finish` hands the
/// accumulated bytes back once every opened tuple has been closed.
#[derive(Debug, Default)]
pub struct TupleWriter {
    buf: Vec<u8>,
    depth: usize,
}

impl TupleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a (sub-)tuple.
    pub fn begin(&mut self) -> &mut Self {
        self.buf.push(TAG_START);
        self.depth += 1;
        self
    }

    /// Close the innermost open tuple.
    pub fn end(&mut self) -> &mut Self {
        debug_assert!(self.depth > 0, "end() without matching begin()");
        self.buf.push(TAG_END);
        self.depth -= 1;
        self
    }

    pub fn write_null(&mut self) -> &mut Self {
        self.buf.push(TAG_NULL);
        self
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.buf.push(TAG_I32);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.buf.push(TAG_I64);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.push(TAG_U32);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.buf.push(TAG_U64);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_f32(&mut self, v: f32) -> &mut Self {
        self.buf.push(TAG_F32);
        self.buf.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn write_f64(&mut self, v: f64) -> &mut Self {
        self.buf.push(TAG_F64);
        self.buf.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.buf.push(TAG_BOOL);
        self.buf.push(v as u8);
        self
    }

    /// Write a string element. The string must not contain interior NULs;
    /// the terminator is the element delimiter.
    pub fn write_str(&mut self, v: &str) -> &mut Self {
        debug_assert!(!v.as_bytes().contains(&0), "NUL inside string element");
        self.buf.push(TAG_STRING);
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn write_binary(&mut self, v: &[u8]) -> &mut Self {
        self.buf.push(TAG_BINARY);
        self.buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(v);
        self
    }

    /// Append pre-serialized tuple bytes verbatim (e.g. a transaction's
    /// original wire form). The caller guarantees the bytes are one
    /// complete tuple.
    pub fn write_raw_tuple(&mut self, bytes: &[u8]) -> &mut Self {
        debug_assert!(bytes.first() == Some(&TAG_START));
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Consume the writer and return the serialized bytes.
    pub fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.depth, 0, "unbalanced begin()/end()");
        self.buf
    }

    /// Peek at the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
