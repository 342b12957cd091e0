//! # Transaction Pool
//!
//! Pending transactions awaiting confirmation, in arrival order. The pool
//! is a deduplicated sequence, not a priority queue: there are no fees, so
//! there is nothing to sort by. Membership is by transaction hash — a
//! duplicate `add` drops the candidate and keeps the original.
//!
//! The pool regains transactions two ways: gossip (`TRANSACTION`,
//! `POOL_RESPONSE`) and fork rollback, when blocks fall off the principal
//! chain and their transactions become unconfirmed again.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::crypto::Hash;
use crate::ledger::transaction::Transaction;

/// A thread-safe, insertion-ordered pending pool.
#[derive(Debug, Default)]
pub struct Mempool {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    order: Vec<Arc<Transaction>>,
    known: HashSet<Hash>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a transaction with the same hash is already pending.
    /// Returns whether the transaction was added.
    pub fn add(&self, txn: Arc<Transaction>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.known.insert(*txn.hash()) {
            return false;
        }
        inner.order.push(txn);
        true
    }

    /// The ith pending transaction, in insertion order.
    pub fn get(&self, i: usize) -> Option<Arc<Transaction>> {
        self.inner.lock().order.get(i).cloned()
    }

    /// Remove and return the ith pending transaction.
    pub fn remove(&self, i: usize) -> Option<Arc<Transaction>> {
        let mut inner = self.inner.lock();
        if i >= inner.order.len() {
            return None;
        }
        let txn = inner.order.remove(i);
        inner.known.remove(txn.hash());
        Some(txn)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().known.contains(hash)
    }

    /// A copy of the pending sequence, for block authoring and pool sync.
    pub fn snapshot(&self) -> Vec<Arc<Transaction>> {
        self.inner.lock().order.clone()
    }

    /// Drop exactly the given hashes (the ones a freshly authored block
    /// confirmed), keeping anything that arrived in the meantime.
    pub fn remove_hashes(&self, hashes: &[Hash]) {
        let mut inner = self.inner.lock();
        let drop: HashSet<&Hash> = hashes.iter().collect();
        inner.order.retain(|txn| !drop.contains(txn.hash()));
        for hash in hashes {
            inner.known.remove(hash);
        }
    }

    /// JSON array of the pending transactions, in order.
    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        serde_json::Value::Array(inner.order.iter().map(|t| t.to_json()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn txn(value: u64, nonce: u32) -> Arc<Transaction> {
        let sender = Keypair::generate();
        let recipient = Keypair::generate().public_key();
        Arc::new(Transaction::create(&sender, recipient, value, nonce))
    }

    #[test]
    fn add_preserves_insertion_order() {
        let pool = Mempool::new();
        let a = txn(1, 0);
        let b = txn(2, 0);
        let c = txn(3, 0);
        pool.add(a.clone());
        pool.add(b.clone());
        pool.add(c.clone());

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(0).unwrap().hash(), a.hash());
        assert_eq!(pool.get(1).unwrap().hash(), b.hash());
        assert_eq!(pool.get(2).unwrap().hash(), c.hash());
    }

    #[test]
    fn duplicate_add_is_refused() {
        let pool = Mempool::new();
        let a = txn(1, 0);
        assert!(pool.add(a.clone()));
        assert!(!pool.add(a.clone()));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn remove_by_index_updates_membership() {
        let pool = Mempool::new();
        let a = txn(1, 0);
        let b = txn(2, 0);
        pool.add(a.clone());
        pool.add(b.clone());

        let removed = pool.remove(0).unwrap();
        assert_eq!(removed.hash(), a.hash());
        assert!(!pool.contains(a.hash()));
        assert!(pool.contains(b.hash()));
        // A removed transaction may be re-added.
        assert!(pool.add(a));
        assert!(pool.remove(5).is_none());
    }

    #[test]
    fn remove_hashes_drops_only_the_named() {
        let pool = Mempool::new();
        let a = txn(1, 0);
        let b = txn(2, 0);
        let c = txn(3, 0);
        pool.add(a.clone());
        pool.add(b.clone());
        pool.add(c.clone());

        pool.remove_hashes(&[*a.hash(), *c.hash()]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(0).unwrap().hash(), b.hash());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let pool = Mempool::new();
        pool.add(txn(1, 0));
        let snap = pool.snapshot();
        pool.add(txn(2, 0));
        assert_eq!(snap.len(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn json_lists_pending_in_order() {
        let pool = Mempool::new();
        let a = txn(7, 0);
        pool.add(a.clone());
        let v = pool.to_json();
        let arr = v.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["hash"].as_str().unwrap(), a.hash().to_hex());
    }
}
