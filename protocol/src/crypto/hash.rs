//! # Generic Hash
//!
//! BLAKE2b with a 32-byte digest is the one hash function of the protocol.
//! Block hashes, transaction hashes, Merkle nodes, sortition seeds and
//! block priorities are all the same primitive over different pre-images,
//! and the pre-images are always canonical tuple bytes (or concatenations
//! of prior digests), never ad-hoc struct serializations.

use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute the BLAKE2b-256 digest of `data`.
pub fn generic_hash(data: &[u8]) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

/// Hash multiple byte slices as if they were concatenated, without the
/// temporary buffer. Used for Merkle pairs and priority candidates, where
/// the pre-image is `digest ‖ digest` or `digest ‖ index`.
pub fn generic_hash_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// A 32-byte digest. Doubles as the identity of blocks and transactions
/// and as the totally ordered priority value of fork choice — the derived
/// `Ord` is the lexicographic byte-wise comparison the protocol calls for.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub(crate) [u8; 32]);

impl Hash {
    /// The all-zero digest: the parent hash of a parentless block and the
    /// Merkle root of an empty transaction list.
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Parse from a byte slice, refusing anything but exactly 32 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Hash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }

    /// Hex-encoded representation, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}…)", &self.to_hex()[..16])
    }
}
