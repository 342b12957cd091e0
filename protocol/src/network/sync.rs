//! # Synchronization Payloads
//!
//! Pure builders and parsers for the tuple payloads of the handshake and
//! the peer/chain/pool synchronization messages. No transport, no state —
//! the orchestrator supplies both. Keeping these as standalone functions
//! makes every wire shape testable without a socket in sight.
//!
//! Payload shapes:
//!
//! ```text
//! HANDSHAKE       (port:i32, version:str)
//! PEERS_REQUEST   ()
//! PEERS_RESPONSE  ((addr:str, port:i32)*)
//! BLOCKS_REQUEST  (base_hash:bin32)
//! BLOCKS_RESPONSE (block*)            — newest first, from the principal
//! POOL_REQUEST    ()
//! POOL_RESPONSE   (txn*)
//! BLOCK           block
//! TRANSACTION     txn
//! ```

use std::sync::Arc;

use crate::codec::{Tuple, TupleWriter, Value};
use crate::crypto::Hash;
use crate::ledger::block::Block;
use crate::ledger::transaction::Transaction;

/// `(port, version)` — sent by the connecting side right after connect.
pub fn encode_handshake(port: i32, version: &str) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin().write_i32(port).write_str(version).end();
    w.finish()
}

/// Parse a handshake payload into (declared listen port, version string).
pub fn decode_handshake<'a>(tuple: &Tuple<'a>) -> Option<(i32, &'a str)> {
    if tuple.len() != 2 {
        return None;
    }
    Some((tuple.get_i32(0)?, tuple.get_str(1)?))
}

/// The empty tuple `()` used by both parameterless requests.
pub fn encode_empty() -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin().end();
    w.finish()
}

/// `((addr, port)*)` — every listening peer except the requester.
pub fn encode_peers(peers: impl Iterator<Item = (String, i32)>) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin();
    for (addr, port) in peers {
        w.begin().write_str(&addr).write_i32(port).end();
    }
    w.end();
    w.finish()
}

/// Parse a peers response into `(addr, port)` pairs. A malformed entry
/// poisons the whole payload — peers either speak the format or don't.
pub fn decode_peers(tuple: &Tuple) -> Option<Vec<(String, i32)>> {
    let mut peers = Vec::with_capacity(tuple.len());
    for el in tuple.iter() {
        let Value::Tuple(entry) = el else {
            return None;
        };
        if entry.len() != 2 {
            return None;
        }
        peers.push((entry.get_str(0)?.to_string(), entry.get_i32(1)?));
    }
    Some(peers)
}

/// `(base_hash)` — ask a peer for its principal chain above a base block.
pub fn encode_blocks_request(base: &Hash) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin().write_binary(base.as_bytes()).end();
    w.finish()
}

pub fn decode_blocks_request(tuple: &Tuple) -> Option<Hash> {
    if tuple.len() != 1 {
        return None;
    }
    Hash::try_from_slice(tuple.get_binary(0)?)
}

/// `(block*)` — the principal chain from `tip` down to (excluding) the
/// block with hash `base`, newest first. If `base` never appears the
/// entire chain down to the root is included, which is exactly what a
/// fresh peer asking from its own unknown root needs.
pub fn encode_blocks_response(tip: Option<&Arc<Block>>, base: &Hash) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin();
    let mut cursor = tip.cloned();
    while let Some(block) = cursor {
        if block.hash() == base {
            break;
        }
        block.write_tuple(&mut w);
        cursor = block.parent().cloned();
    }
    w.end();
    w.finish()
}

/// `(txn*)` — the whole pending pool, in insertion order.
pub fn encode_pool(transactions: &[Arc<Transaction>]) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin();
    for txn in transactions {
        txn.write_tuple(&mut w);
    }
    w.end();
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::transaction::Transaction;

    #[test]
    fn handshake_roundtrip() {
        let bytes = encode_handshake(1960, "1.0.0-alpha");
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_handshake(&tuple), Some((1960, "1.0.0-alpha")));
    }

    #[test]
    fn handshake_wrong_shape_rejected() {
        let bytes = encode_empty();
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_handshake(&tuple), None);
    }

    #[test]
    fn peers_roundtrip() {
        let peers = vec![
            ("127.0.0.1".to_string(), 1960),
            ("10.0.0.7".to_string(), 1961),
        ];
        let bytes = encode_peers(peers.clone().into_iter());
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_peers(&tuple), Some(peers));
    }

    #[test]
    fn empty_peers_roundtrip() {
        let bytes = encode_peers(std::iter::empty());
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_peers(&tuple), Some(vec![]));
    }

    #[test]
    fn malformed_peer_entry_poisons_payload() {
        let mut w = TupleWriter::new();
        w.begin();
        w.begin().write_str("127.0.0.1").end(); // missing port
        w.end();
        let bytes = w.finish();
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_peers(&tuple), None);
    }

    #[test]
    fn blocks_request_roundtrip() {
        let base = crate::crypto::generic_hash(b"base");
        let bytes = encode_blocks_request(&base);
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(decode_blocks_request(&tuple), Some(base));
    }

    #[test]
    fn blocks_response_walks_down_to_base() {
        let kp = Keypair::generate();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let b2 = Block::create(&kp, Some(b1.clone()), vec![]).unwrap();
        let b3 = Block::create(&kp, Some(b2.clone()), vec![]).unwrap();

        let bytes = encode_blocks_response(Some(&b3), b1.hash());
        let tuple = Tuple::parse(&bytes).unwrap();
        // b3 and b2, newest first; b1 excluded.
        assert_eq!(tuple.len(), 2);
        let first = tuple.get_tuple(0).unwrap();
        let parsed = Block::from_tuple(first, |h| (h == b2.hash()).then(|| b2.clone())).unwrap();
        assert_eq!(parsed.hash(), b3.hash());
    }

    #[test]
    fn blocks_response_unknown_base_ships_everything() {
        let kp = Keypair::generate();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let b2 = Block::create(&kp, Some(b1.clone()), vec![]).unwrap();

        let unknown = crate::crypto::generic_hash(b"elsewhere");
        let bytes = encode_blocks_response(Some(&b2), &unknown);
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(tuple.len(), 2);
    }

    #[test]
    fn pool_roundtrip() {
        let sender = Keypair::generate();
        let recipient = Keypair::generate().public_key();
        let txns: Vec<_> = (0..3)
            .map(|n| Arc::new(Transaction::create(&sender, recipient, 10 + n as u64, n)))
            .collect();

        let bytes = encode_pool(&txns);
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(tuple.len(), 3);
        for (i, txn) in txns.iter().enumerate() {
            let parsed = Transaction::from_tuple(tuple.get_tuple(i).unwrap()).unwrap();
            assert_eq!(parsed.hash(), txn.hash());
        }
    }
}
