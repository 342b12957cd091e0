//! # Transactions
//!
//! A transaction is a signed transfer of value between two accounts
//! (public keys). The canonical form is the body tuple
//! `(sender[32], recipient[32], value u64, nonce u32)`; the transaction
//! hash is the generic hash of those bytes and the signature covers the
//! hash. The wire envelope wraps the body with its signature:
//! `((sender, recipient, value, nonce), signature[64])`.
//!
//! There is no replay defense inside the transaction itself. Identity is
//! the hash, the nonce is the only disambiguator between otherwise equal
//! transfers, and deduplication happens in the pool and the chain-wide
//! transaction index. Balance checking lives in block validation.

use serde_json::json;
use thiserror::Error;

use crate::codec::{Tuple, TupleWriter, Value};
use crate::config::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use crate::crypto::{generic_hash, Hash, Keypair, PublicKey, Signature};

/// Why a tuple failed to become a transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The tuple does not have the canonical transaction shape.
    #[error("malformed transaction tuple")]
    InvalidShape,

    /// The signature does not verify against the sender over the body hash.
    #[error("transaction signature verification failed")]
    BadSignature,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed value transfer. Immutable once constructed; identity = hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    sender: PublicKey,
    recipient: PublicKey,
    value: u64,
    nonce: u32,
    signature: Signature,
    hash: Hash,
}

impl Transaction {
    /// Build and sign a transfer from `sender` to `recipient`.
    pub fn create(
        sender: &Keypair,
        recipient: PublicKey,
        value: u64,
        nonce: u32,
    ) -> Transaction {
        let sender_pk = sender.public_key();
        let body = body_bytes(&sender_pk, &recipient, value, nonce);
        let hash = generic_hash(&body);
        let signature = sender.sign(hash.as_bytes());
        Transaction {
            sender: sender_pk,
            recipient,
            value,
            nonce,
            signature,
            hash,
        }
    }

    /// Shape-check a tuple without constructing anything: an envelope of
    /// exactly (body tuple, 64-byte binary), where the body is exactly
    /// (binary[32], binary[32], u64, u32).
    pub fn validate_tuple(tuple: &Tuple) -> bool {
        if tuple.len() != 2 {
            return false;
        }
        let Some(body) = tuple.get_tuple(0) else {
            return false;
        };
        match tuple.get_binary(1) {
            Some(sig) if sig.len() == SIGNATURE_LENGTH => {}
            _ => return false,
        }

        if body.len() != 4 {
            return false;
        }
        matches!(body.get(0), Some(Value::Binary(b)) if b.len() == PUBLIC_KEY_LENGTH)
            && matches!(body.get(1), Some(Value::Binary(b)) if b.len() == PUBLIC_KEY_LENGTH)
            && matches!(body.get(2), Some(Value::U64(_)))
            && matches!(body.get(3), Some(Value::U32(_)))
    }

    /// Construct from a parsed envelope tuple, verifying the signature.
    ///
    /// The hash is computed over the body sub-tuple's verbatim byte span,
    /// so a transaction's identity survives any parse/re-serialize cycle.
    pub fn from_tuple(tuple: &Tuple) -> Result<Transaction, TransactionError> {
        if !Self::validate_tuple(tuple) {
            return Err(TransactionError::InvalidShape);
        }

        let body = tuple.get_tuple(0).expect("shape checked");
        let hash = generic_hash(body.raw());

        let sender = PublicKey::from_bytes(
            body.get_binary(0)
                .and_then(|b| b.try_into().ok())
                .expect("shape checked"),
        );
        let recipient = PublicKey::from_bytes(
            body.get_binary(1)
                .and_then(|b| b.try_into().ok())
                .expect("shape checked"),
        );
        let value = body.get_u64(2).expect("shape checked");
        let nonce = body.get_u32(3).expect("shape checked");
        let signature = Signature::try_from_slice(tuple.get_binary(1).expect("shape checked"))
            .map_err(|_| TransactionError::InvalidShape)?;

        if !sender.verify(hash.as_bytes(), &signature) {
            return Err(TransactionError::BadSignature);
        }

        Ok(Transaction {
            sender,
            recipient,
            value,
            nonce,
            signature,
            hash,
        })
    }

    /// Serialize the envelope into an open writer.
    pub fn write_tuple(&self, w: &mut TupleWriter) {
        w.begin();
        w.begin()
            .write_binary(self.sender.as_bytes())
            .write_binary(self.recipient.as_bytes())
            .write_u64(self.value)
            .write_u32(self.nonce)
            .end();
        w.write_binary(self.signature.as_bytes());
        w.end();
    }

    /// Serialize the envelope to a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = TupleWriter::new();
        self.write_tuple(&mut w);
        w.finish()
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn sender(&self) -> &PublicKey {
        &self.sender
    }

    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// JSON view for the REST surface and the `pool` REPL command.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "hash": self.hash.to_hex(),
            "sender": self.sender.to_hex(),
            "recipient": self.recipient.to_hex(),
            "value": self.value,
            "nonce": self.nonce,
            "signature": self.signature.to_hex(),
        })
    }
}

/// Canonical body tuple bytes — the hash pre-image and signing subject.
fn body_bytes(sender: &PublicKey, recipient: &PublicKey, value: u64, nonce: u32) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin()
        .write_binary(sender.as_bytes())
        .write_binary(recipient.as_bytes())
        .write_u64(value)
        .write_u32(nonce)
        .end();
    w.finish()
}
