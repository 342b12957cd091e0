//! # Binary Tuple Codec
//!
//! The single serialization format of the protocol. Every payload on the
//! wire is one tuple, and every hash in the system is computed over tuple
//! bytes, so the codec doubles as the canonical pre-image format.
//!
//! The parser is zero-copy: parsed values borrow from the input buffer and
//! every sub-tuple remembers the exact byte span it was decoded from.
//! Hashing a sub-tuple therefore hashes its verbatim wire bytes, which is
//! what keeps transaction hashes stable across parse/re-serialize cycles.

pub mod tuple;

pub use tuple::{CodecError, Tuple, TupleWriter, Value};
