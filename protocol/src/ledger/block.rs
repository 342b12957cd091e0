//! # Blocks
//!
//! A block commits to an ordered transaction list, links to a parent, and
//! carries the proof that its creator won a sortition draw for that slot.
//!
//! ## Header Layout
//!
//! The canonical header tuple, which is both the wire form and the hash
//! pre-image:
//!
//! ```text
//! (timestamp u64, parent_hash[32], merkle_root[32],
//!  creator[32], vrf_proof[80], delegate u32, tx_count u32)
//! ```
//!
//! The wire envelope is `(header, signature[64], (txn...))` — the
//! signature is the creator's Ed25519 signature over the block hash, which
//! in turn is the generic hash of the header tuple bytes.
//!
//! ## Sortition
//!
//! Each block derives a seed from its parent (`H(parent.seed ‖
//! parent.creator)`; a parentless block seeds from `H(0^32)`). The creator
//! evaluates the VRF over the seed; each staked delegate slot then gets an
//! independent draw `H(vrf_output ‖ be32(i))` and the smallest draw wins.
//! That winning draw *is* the block's priority — lower is better, and fork
//! choice compares priorities byte-wise.
//!
//! ## Account Projection
//!
//! Every block carries a delta map from public key to account state,
//! chained through parents: looking up an account at a block walks toward
//! genesis and takes the first delta that mentions the key. Construction
//! seeds the map with the creator's coinbase credit and then applies
//! transactions in list order, failing on any sender underflow.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde_json::json;
use thiserror::Error;

use crate::codec::{Tuple, TupleWriter, Value};
use crate::config::{
    COINBASE_REWARD, DELEGATE_VALUE, HASH_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
    VRF_OUTPUT_LENGTH, VRF_PROOF_LENGTH, WAITING_PERIOD,
};
use crate::crypto::{generic_hash, generic_hash_multi, vrf, Hash, Keypair, PublicKey, Signature, VrfProof};
use crate::ledger::transaction::Transaction;

/// Why block construction or validation failed. Every failure path leaves
/// no trace: nothing is inserted anywhere until the whole block checks out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    /// The tuple does not have the canonical block shape.
    #[error("malformed block tuple")]
    InvalidShape,

    /// A transaction inside the block failed its own validation.
    #[error("invalid transaction in block: {0}")]
    BadTransaction(#[from] crate::ledger::transaction::TransactionError),

    /// The header references a parent this node has never seen.
    #[error("unknown parent block")]
    UnknownParent,

    /// The recomputed Merkle root differs from the header's.
    #[error("merkle root mismatch")]
    MerkleMismatch,

    /// The creator is not allowed to stake on this parent.
    #[error("staking not allowed for creator")]
    StakingNotAllowed,

    /// The VRF proof did not verify over the sortition seed.
    #[error("vrf: {0}")]
    BadProof(#[from] vrf::VrfError),

    /// The declared delegate index is not below the creator's slot count.
    #[error("delegate index out of range")]
    DelegateOutOfRange,

    /// A sender's running balance would go negative.
    #[error("insufficient sender balance")]
    InsufficientBalance,

    /// A recipient's balance would exceed u64::MAX.
    #[error("balance overflow")]
    BalanceOverflow,

    /// A transaction in this block already appears in an ancestor block.
    #[error("transaction already confirmed in an ancestor block")]
    ReplayedTransaction,

    /// The block-level signature does not verify against the creator.
    #[error("block signature verification failed")]
    BadSignature,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One node of an account's delta chain: the balance after this block, and
/// the height of the block that first touched the key. The origin height
/// is what the staking waiting period is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub value: u64,
    pub origin_height: u32,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// An immutable block. Parent links are owning (`Arc`, child→parent only);
/// the children list holds `Weak` back-references populated by the
/// blockchain on insertion, so the tree has no reference cycles.
pub struct Block {
    timestamp: u64,
    parent_hash: Hash,
    merkle_root: Hash,
    creator: PublicKey,
    /// The proof exactly as it appears in the header tuple. Kept as raw
    /// bytes so re-serving the block reproduces the received bytes.
    vrf_proof: [u8; VRF_PROOF_LENGTH],
    delegate: u32,
    signature: Signature,
    transactions: Vec<Arc<Transaction>>,

    hash: Hash,
    height: u32,
    seed: Hash,
    vrf_output: [u8; VRF_OUTPUT_LENGTH],
    priority: Hash,
    parent: Option<Arc<Block>>,
    children: RwLock<Vec<Weak<Block>>>,
    accounts: HashMap<PublicKey, Account>,
}

impl Block {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Author a block atop `parent` (or a new root when `parent` is None).
    ///
    /// Preconditions are checked in order: staking eligibility, sortition,
    /// account projection, then hashing and signing. Any failure returns
    /// the error without touching shared state.
    pub fn create(
        creator: &Keypair,
        parent: Option<Arc<Block>>,
        transactions: Vec<Arc<Transaction>>,
    ) -> Result<Arc<Block>, BlockError> {
        let creator_pk = creator.public_key();

        if !staking_allowed(parent.as_ref(), &creator_pk) {
            return Err(BlockError::StakingNotAllowed);
        }

        let height = parent.as_ref().map_or(0, |p| p.height) + 1;
        let seed = derive_seed(parent.as_ref());
        let proof = vrf::prove(creator, seed.as_bytes())?;
        let vrf_proof = proof.to_bytes();
        let vrf_output = proof.to_output();

        let delegates = delegate_count(parent.as_ref(), &creator_pk);
        let (delegate, priority) = sortition(&vrf_output, delegates);

        let accounts = project_accounts(parent.as_ref(), &creator_pk, height, &transactions)?;

        let tx_hashes: Vec<Hash> = transactions.iter().map(|t| *t.hash()).collect();
        let merkle_root = compute_merkle_root(&tx_hashes);

        let parent_hash = parent.as_ref().map_or(Hash::ZERO, |p| p.hash);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let header = header_bytes(
            timestamp,
            &parent_hash,
            &merkle_root,
            &creator_pk,
            &vrf_proof,
            delegate,
            transactions.len() as u32,
        );
        let hash = generic_hash(&header);
        let signature = creator.sign(hash.as_bytes());

        Ok(Arc::new(Block {
            timestamp,
            parent_hash,
            merkle_root,
            creator: creator_pk,
            vrf_proof,
            delegate,
            signature,
            transactions,
            hash,
            height,
            seed,
            vrf_output,
            priority,
            parent,
            children: RwLock::new(Vec::new()),
            accounts,
        }))
    }

    /// Shape-check a block envelope tuple without constructing anything.
    pub fn validate_tuple(tuple: &Tuple) -> bool {
        if tuple.len() != 3 {
            return false;
        }
        let Some(header) = tuple.get_tuple(0) else {
            return false;
        };
        match tuple.get_binary(1) {
            Some(sig) if sig.len() == SIGNATURE_LENGTH => {}
            _ => return false,
        }
        let Some(txns) = tuple.get_tuple(2) else {
            return false;
        };

        if !header_shape_valid(header) {
            return false;
        }
        if txns.len() as u32 != header.get_u32(6).expect("shape checked") {
            return false;
        }
        txns.iter().all(|el| match el {
            Value::Tuple(t) => Transaction::validate_tuple(t),
            _ => false,
        })
    }

    /// Reconstruct and fully re-validate a block from its wire tuple.
    ///
    /// `lookup` resolves the parent hash to a block already in the tree;
    /// it may return None only for the all-zero hash (a root block). Every
    /// derived quantity — Merkle root, eligibility, seed, VRF output,
    /// priority, account deltas, block hash, signature — is recomputed and
    /// checked against the received header.
    pub fn from_tuple(
        tuple: &Tuple,
        lookup: impl Fn(&Hash) -> Option<Arc<Block>>,
    ) -> Result<Arc<Block>, BlockError> {
        if !Self::validate_tuple(tuple) {
            return Err(BlockError::InvalidShape);
        }

        let header = tuple.get_tuple(0).expect("shape checked");
        let txns_tuple = tuple.get_tuple(2).expect("shape checked");

        let timestamp = header.get_u64(0).expect("shape checked");
        let parent_hash =
            Hash::try_from_slice(header.get_binary(1).expect("shape checked")).expect("len checked");
        let merkle_root =
            Hash::try_from_slice(header.get_binary(2).expect("shape checked")).expect("len checked");
        let creator = PublicKey::from_bytes(
            header
                .get_binary(3)
                .and_then(|b| b.try_into().ok())
                .expect("shape checked"),
        );
        let proof_bytes: [u8; VRF_PROOF_LENGTH] = header
            .get_binary(4)
            .and_then(|b| b.try_into().ok())
            .expect("shape checked");
        let proof = VrfProof::from_bytes(&proof_bytes)?;
        let delegate = header.get_u32(5).expect("shape checked");

        // 1. Resolve the parent. A zero parent hash denotes a root block;
        //    anything else must already be in the tree.
        let parent = if parent_hash.is_zero() {
            None
        } else {
            Some(lookup(&parent_hash).ok_or(BlockError::UnknownParent)?)
        };

        // 2. Parse transactions (each one verifies its own signature) and
        //    re-derive the Merkle commitment.
        let mut transactions = Vec::with_capacity(txns_tuple.len());
        for el in txns_tuple.iter() {
            let Value::Tuple(txn_tuple) = el else {
                return Err(BlockError::InvalidShape);
            };
            transactions.push(Arc::new(Transaction::from_tuple(txn_tuple)?));
        }
        let tx_hashes: Vec<Hash> = transactions.iter().map(|t| *t.hash()).collect();
        if compute_merkle_root(&tx_hashes) != merkle_root {
            return Err(BlockError::MerkleMismatch);
        }

        // 3. Staking eligibility against the resolved parent.
        if !staking_allowed(parent.as_ref(), &creator) {
            return Err(BlockError::StakingNotAllowed);
        }

        // 4. Sortition seed and VRF proof.
        let seed = derive_seed(parent.as_ref());
        let vrf_output = vrf::verify(&creator, &proof, seed.as_bytes())?;

        // 5. Priority from the declared delegate index, which must fall
        //    below the creator's slot count at the parent.
        if u64::from(delegate) >= delegate_count(parent.as_ref(), &creator) {
            return Err(BlockError::DelegateOutOfRange);
        }
        let priority = priority_for(&vrf_output, delegate);

        // 6. Replay the transactions into a fresh delta map.
        let height = parent.as_ref().map_or(0, |p| p.height) + 1;
        let accounts = project_accounts(parent.as_ref(), &creator, height, &transactions)?;

        // 7. Block hash over the verbatim header bytes, then the
        //    creator's signature over the hash.
        let hash = generic_hash(header.raw());
        let signature = Signature::try_from_slice(tuple.get_binary(1).expect("shape checked"))
            .map_err(|_| BlockError::InvalidShape)?;
        if !creator.verify(hash.as_bytes(), &signature) {
            return Err(BlockError::BadSignature);
        }

        Ok(Arc::new(Block {
            timestamp,
            parent_hash,
            merkle_root,
            creator,
            vrf_proof: proof_bytes,
            delegate,
            signature,
            transactions,
            hash,
            height,
            seed,
            vrf_output,
            priority,
            parent,
            children: RwLock::new(Vec::new()),
            accounts,
        }))
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize the envelope `(header, signature, (txn...))` into an open
    /// writer.
    pub fn write_tuple(&self, w: &mut TupleWriter) {
        w.begin();
        w.write_raw_tuple(&self.header_tuple_bytes());
        w.write_binary(self.signature.as_bytes());
        w.begin();
        for txn in &self.transactions {
            txn.write_tuple(w);
        }
        w.end();
        w.end();
    }

    /// Serialize the envelope to a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = TupleWriter::new();
        self.write_tuple(&mut w);
        w.finish()
    }

    fn header_tuple_bytes(&self) -> Vec<u8> {
        header_bytes(
            self.timestamp,
            &self.parent_hash,
            &self.merkle_root,
            &self.creator,
            &self.vrf_proof,
            self.delegate,
            self.transactions.len() as u32,
        )
    }

    /// JSON view for the REST surface: header fields plus the transaction
    /// list, hashes hex-encoded.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "hash": self.hash.to_hex(),
            "height": self.height,
            "priority": self.priority.to_hex(),
            "header": {
                "timestamp": self.timestamp,
                "parent": self.parent_hash.to_hex(),
                "merkle_root": self.merkle_root.to_hex(),
                "creator": self.creator.to_hex(),
                "delegate": self.delegate,
            },
            "transactions": self
                .transactions
                .iter()
                .map(|t| t.to_json())
                .collect::<Vec<_>>(),
        })
    }

    // -----------------------------------------------------------------------
    // Tree navigation
    // -----------------------------------------------------------------------

    /// True iff `ancestor` is this block or an ancestor of it. `None`
    /// stands for the implicit genesis every block descends from.
    pub fn has_ancestor(&self, ancestor: Option<&Arc<Block>>) -> bool {
        let Some(ancestor) = ancestor else {
            return true;
        };
        let mut cursor = Some(self);
        while let Some(block) = cursor {
            if block.hash == ancestor.hash {
                return true;
            }
            cursor = block.parent.as_deref();
        }
        false
    }

    /// The child of this block authored by `creator`, if one has been
    /// inserted. At most one should exist under honest behavior; the first
    /// match wins if a misbehaving creator forged several.
    pub fn child_with_creator(&self, creator: &PublicKey) -> Option<Arc<Block>> {
        self.children
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .find(|child| child.creator == *creator)
    }

    /// All live children of this block.
    pub fn children(&self) -> Vec<Arc<Block>> {
        self.children.read().iter().filter_map(Weak::upgrade).collect()
    }

    /// Record a back-reference to an inserted child. Called by the
    /// blockchain after the duplicate check, never during construction.
    pub(crate) fn add_child(&self, child: &Arc<Block>) {
        self.children.write().push(Arc::downgrade(child));
    }

    /// Whether a transaction hash appears in this block or any ancestor —
    /// i.e. the transfer has already settled on this chain.
    pub fn chain_contains_transaction(&self, hash: &Hash) -> bool {
        let mut cursor = Some(self);
        while let Some(block) = cursor {
            if block.transactions.iter().any(|t| t.hash() == hash) {
                return true;
            }
            cursor = block.parent.as_deref();
        }
        false
    }

    /// The effective account for `key` at this block: the first delta map
    /// on the path toward genesis that mentions the key.
    pub fn account(&self, key: &PublicKey) -> Option<Account> {
        let mut cursor = Some(self);
        while let Some(block) = cursor {
            if let Some(account) = block.accounts.get(key) {
                return Some(*account);
            }
            cursor = block.parent.as_deref();
        }
        None
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn parent(&self) -> Option<&Arc<Block>> {
        self.parent.as_ref()
    }

    pub fn parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    pub fn creator(&self) -> &PublicKey {
        &self.creator
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    /// The sortition seed this block's VRF was evaluated over.
    pub fn seed(&self) -> &Hash {
        &self.seed
    }

    pub fn vrf_output(&self) -> &[u8; VRF_OUTPUT_LENGTH] {
        &self.vrf_output
    }

    pub fn delegate(&self) -> u32 {
        self.delegate
    }

    /// The block's priority: lower wins fork choice.
    pub fn priority(&self) -> &Hash {
        &self.priority
    }

    pub fn transactions(&self) -> &[Arc<Transaction>] {
        &self.transactions
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Block {}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("hash", &self.hash)
            .field("height", &self.height)
            .field("creator", &self.creator)
            .field("txns", &self.transactions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Derivations
// ---------------------------------------------------------------------------

fn header_shape_valid(header: &Tuple) -> bool {
    header.len() == 7
        && matches!(header.get(0), Some(Value::U64(_)))
        && matches!(header.get(1), Some(Value::Binary(b)) if b.len() == HASH_LENGTH)
        && matches!(header.get(2), Some(Value::Binary(b)) if b.len() == HASH_LENGTH)
        && matches!(header.get(3), Some(Value::Binary(b)) if b.len() == PUBLIC_KEY_LENGTH)
        && matches!(header.get(4), Some(Value::Binary(b)) if b.len() == VRF_PROOF_LENGTH)
        && matches!(header.get(5), Some(Value::U32(_)))
        && matches!(header.get(6), Some(Value::U32(_)))
}

fn header_bytes(
    timestamp: u64,
    parent_hash: &Hash,
    merkle_root: &Hash,
    creator: &PublicKey,
    vrf_proof: &[u8; VRF_PROOF_LENGTH],
    delegate: u32,
    tx_count: u32,
) -> Vec<u8> {
    let mut w = TupleWriter::new();
    w.begin()
        .write_u64(timestamp)
        .write_binary(parent_hash.as_bytes())
        .write_binary(merkle_root.as_bytes())
        .write_binary(creator.as_bytes())
        .write_binary(vrf_proof)
        .write_u32(delegate)
        .write_u32(tx_count)
        .end();
    w.finish()
}

/// The sortition seed of a block built on `parent`: hash of the parent's
/// seed concatenated with the parent's creator key; a parentless block
/// seeds from the hash of 32 zero bytes.
pub fn derive_seed(parent: Option<&Arc<Block>>) -> Hash {
    match parent {
        Some(p) => generic_hash_multi(&[p.seed.as_bytes(), p.creator.as_bytes()]),
        None => generic_hash(&[0u8; HASH_LENGTH]),
    }
}

/// Effective account lookup starting at an optional block.
fn effective_account(start: Option<&Arc<Block>>, key: &PublicKey) -> Option<Account> {
    start.and_then(|block| block.account(key))
}

/// Staked slots for `key` at `parent`. A parentless block grants its
/// creator exactly one draw.
pub fn delegate_count(parent: Option<&Arc<Block>>, key: &PublicKey) -> u64 {
    match parent {
        None => 1,
        Some(_) => effective_account(parent, key)
            .map_or(0, |account| account.value / DELEGATE_VALUE),
    }
}

/// Whether `key` may author a block on top of `parent`.
///
/// Requires at least one staked slot, and the key's funding to have
/// matured: the block that first funded the key must be at least
/// `WAITING_PERIOD` below the candidate block's height. While the chain
/// itself is younger than the waiting period, any funded key may stake —
/// otherwise no chain could grow past its first block.
pub fn staking_allowed(parent: Option<&Arc<Block>>, key: &PublicKey) -> bool {
    let Some(parent_block) = parent else {
        return true;
    };
    let Some(account) = effective_account(parent, key) else {
        return false;
    };
    if account.value / DELEGATE_VALUE == 0 {
        return false;
    }
    parent_block.height < WAITING_PERIOD
        || account.origin_height + WAITING_PERIOD <= parent_block.height + 1
}

/// One fair draw per delegate slot; the smallest draw wins and becomes the
/// block's priority.
fn sortition(vrf_output: &[u8; VRF_OUTPUT_LENGTH], delegates: u64) -> (u32, Hash) {
    debug_assert!(delegates > 0, "sortition requires at least one slot");
    let slots = delegates.min(u32::MAX as u64) as u32;
    let mut best = (0u32, priority_for(vrf_output, 0));
    for i in 1..slots {
        let candidate = priority_for(vrf_output, i);
        if candidate < best.1 {
            best = (i, candidate);
        }
    }
    best
}

/// The draw for one delegate slot: `H(vrf_output ‖ be32(i))`.
pub fn priority_for(vrf_output: &[u8; VRF_OUTPUT_LENGTH], delegate: u32) -> Hash {
    generic_hash_multi(&[vrf_output, &delegate.to_be_bytes()])
}

/// Build the delta map for a block: coinbase first, then each transaction
/// in list order, with lazy copy-down of ancestor balances.
fn project_accounts(
    parent: Option<&Arc<Block>>,
    creator: &PublicKey,
    height: u32,
    transactions: &[Arc<Transaction>],
) -> Result<HashMap<PublicKey, Account>, BlockError> {
    let mut accounts: HashMap<PublicKey, Account> = HashMap::new();

    // Coinbase: the creator's credit precedes every transaction and never
    // appears in the Merkle root.
    let prev = effective_account(parent, creator);
    accounts.insert(
        *creator,
        Account {
            value: prev
                .map_or(0, |a| a.value)
                .checked_add(COINBASE_REWARD)
                .ok_or(BlockError::BalanceOverflow)?,
            origin_height: prev.map_or(height, |a| a.origin_height),
        },
    );

    for txn in transactions {
        // A transaction that already settled in an ancestor cannot settle
        // again on this chain.
        if appears_in_ancestors(parent, txn.hash()) {
            return Err(BlockError::ReplayedTransaction);
        }

        let sender_prev = accounts
            .get(txn.sender())
            .copied()
            .or_else(|| effective_account(parent, txn.sender()));
        let sender_value = sender_prev.map_or(0, |a| a.value);
        let new_sender_value = sender_value
            .checked_sub(txn.value())
            .ok_or(BlockError::InsufficientBalance)?;
        accounts.insert(
            *txn.sender(),
            Account {
                value: new_sender_value,
                origin_height: sender_prev.map_or(height, |a| a.origin_height),
            },
        );

        let recipient_prev = accounts
            .get(txn.recipient())
            .copied()
            .or_else(|| effective_account(parent, txn.recipient()));
        let new_recipient_value = recipient_prev
            .map_or(0, |a| a.value)
            .checked_add(txn.value())
            .ok_or(BlockError::BalanceOverflow)?;
        accounts.insert(
            *txn.recipient(),
            Account {
                value: new_recipient_value,
                origin_height: recipient_prev.map_or(height, |a| a.origin_height),
            },
        );
    }

    Ok(accounts)
}

/// Linear scan for a transaction hash along the ancestor path.
fn appears_in_ancestors(parent: Option<&Arc<Block>>, hash: &Hash) -> bool {
    parent.is_some_and(|block| block.chain_contains_transaction(hash))
}

/// Merkle root over an ordered list of transaction hashes.
///
/// Empty list → 32 zero bytes. A single hash is its own root (no
/// self-hashing). At each level adjacent pairs are hashed left-to-right;
/// an odd trailing element is lifted unchanged to the next level.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(generic_hash_multi(&[pair[0].as_bytes(), pair[1].as_bytes()]));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> Keypair {
        Keypair::generate()
    }

    fn transfer(sender: &Keypair, recipient: &PublicKey, value: u64, nonce: u32) -> Arc<Transaction> {
        Arc::new(Transaction::create(sender, *recipient, value, nonce))
    }

    /// Author a straight chain of empty blocks under one creator.
    fn grow_chain(creator: &Keypair, root: Arc<Block>, count: usize) -> Arc<Block> {
        let mut tip = root;
        for _ in 0..count {
            tip = Block::create(creator, Some(tip), vec![]).expect("chain growth");
        }
        tip
    }

    // -- Construction -------------------------------------------------------

    #[test]
    fn root_block_properties() {
        let kp = keypair();
        let block = Block::create(&kp, None, vec![]).unwrap();
        assert_eq!(block.height(), 1);
        assert!(block.parent_hash().is_zero());
        assert!(block.parent().is_none());
        assert_eq!(*block.merkle_root(), Hash::ZERO);
        assert_eq!(*block.seed(), generic_hash(&[0u8; 32]));
        // Root creators get exactly one draw, so the winning index is 0.
        assert_eq!(block.delegate(), 0);
    }

    #[test]
    fn coinbase_credits_creator() {
        let kp = keypair();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let account = b1.account(&kp.public_key()).unwrap();
        assert_eq!(account.value, COINBASE_REWARD);
        assert_eq!(account.origin_height, 1);

        let b2 = Block::create(&kp, Some(b1), vec![]).unwrap();
        let account = b2.account(&kp.public_key()).unwrap();
        assert_eq!(account.value, 2 * COINBASE_REWARD);
        // Origin sticks to the first block that touched the key.
        assert_eq!(account.origin_height, 1);
    }

    #[test]
    fn height_increments_along_parents() {
        let kp = keypair();
        let root = Block::create(&kp, None, vec![]).unwrap();
        let tip = grow_chain(&kp, root, 4);
        assert_eq!(tip.height(), 5);

        let mut cursor = Some(tip);
        while let Some(block) = cursor {
            if let Some(parent) = block.parent() {
                assert_eq!(block.height(), parent.height() + 1);
            } else {
                assert_eq!(block.height(), 1);
            }
            cursor = block.parent().cloned();
        }
    }

    #[test]
    fn transactions_move_value() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();

        let txn = transfer(&alice, &bob.public_key(), 100, 0);
        let b2 = Block::create(&alice, Some(root), vec![txn]).unwrap();

        let alice_account = b2.account(&alice.public_key()).unwrap();
        let bob_account = b2.account(&bob.public_key()).unwrap();
        assert_eq!(alice_account.value, 2 * COINBASE_REWARD - 100);
        assert_eq!(bob_account.value, 100);
        assert_eq!(bob_account.origin_height, 2);
    }

    #[test]
    fn sender_underflow_rejects_block() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();

        // Alice holds exactly one coinbase; spending more must fail even
        // though this block would credit her a second one.
        let txn = transfer(&alice, &bob.public_key(), COINBASE_REWARD + 1, 0);
        // The coinbase of the block being built is applied first, so this
        // spend actually clears. Spend past coinbase+balance instead.
        let too_much = transfer(&alice, &bob.public_key(), 3 * COINBASE_REWARD, 1);
        assert!(Block::create(&alice, Some(root.clone()), vec![txn]).is_ok());
        assert_eq!(
            Block::create(&alice, Some(root), vec![too_much]).unwrap_err(),
            BlockError::InsufficientBalance
        );
    }

    #[test]
    fn unfunded_sender_rejected() {
        let alice = keypair();
        let mallory = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();

        let txn = transfer(&mallory, &bob.public_key(), 1, 0);
        assert_eq!(
            Block::create(&alice, Some(root), vec![txn]).unwrap_err(),
            BlockError::InsufficientBalance
        );
    }

    #[test]
    fn intra_block_order_matters() {
        // Bob can spend money he received earlier in the same block.
        let alice = keypair();
        let bob = keypair();
        let carol = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();

        let fund_bob = transfer(&alice, &bob.public_key(), 500, 0);
        let bob_spends = transfer(&bob, &carol.public_key(), 400, 0);
        let block = Block::create(&alice, Some(root), vec![fund_bob, bob_spends]).unwrap();

        assert_eq!(block.account(&bob.public_key()).unwrap().value, 100);
        assert_eq!(block.account(&carol.public_key()).unwrap().value, 400);
    }

    #[test]
    fn replayed_ancestor_transaction_rejected() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();

        let txn = transfer(&alice, &bob.public_key(), 10, 0);
        let b2 = Block::create(&alice, Some(root), vec![txn.clone()]).unwrap();
        assert_eq!(
            Block::create(&alice, Some(b2), vec![txn]).unwrap_err(),
            BlockError::ReplayedTransaction
        );
    }

    // -- Staking ------------------------------------------------------------

    #[test]
    fn staking_requires_funding() {
        let alice = keypair();
        let pauper = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        assert_eq!(
            Block::create(&pauper, Some(root), vec![]).unwrap_err(),
            BlockError::StakingNotAllowed
        );
    }

    #[test]
    fn staking_requires_full_delegate_slot() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        let fund = transfer(&alice, &bob.public_key(), DELEGATE_VALUE - 1, 0);
        let b2 = Block::create(&alice, Some(root), vec![fund]).unwrap();

        // Bob holds 1023 tokens: zero slots, no staking, even inside the
        // bootstrap window.
        assert_eq!(
            Block::create(&bob, Some(b2), vec![]).unwrap_err(),
            BlockError::StakingNotAllowed
        );
    }

    #[test]
    fn newly_funded_key_waits_out_the_period() {
        let alice = keypair();
        let bob = keypair();

        // Grow a chain past the bootstrap window, then fund Bob.
        let root = Block::create(&alice, None, vec![]).unwrap();
        let tip = grow_chain(&alice, root, WAITING_PERIOD as usize + 3); // height 20
        assert_eq!(tip.height(), WAITING_PERIOD + 4);

        let fund = transfer(&alice, &bob.public_key(), DELEGATE_VALUE, 0);
        let funded_at = Block::create(&alice, Some(tip), vec![fund]).unwrap(); // height 21

        // Bob's funding must mature WAITING_PERIOD blocks before he can
        // author: heights 22..=36 fail, height 37 succeeds.
        let mut tip = funded_at.clone();
        for _ in 0..(WAITING_PERIOD - 1) {
            assert_eq!(
                Block::create(&bob, Some(tip.clone()), vec![]).unwrap_err(),
                BlockError::StakingNotAllowed
            );
            tip = Block::create(&alice, Some(tip), vec![]).unwrap();
        }
        // The candidate now sits at funded_height + WAITING_PERIOD.
        let block = Block::create(&bob, Some(tip), vec![]).unwrap();
        assert_eq!(block.height(), funded_at.height() + WAITING_PERIOD);
    }

    #[test]
    fn bootstrap_window_admits_young_chain_staking() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        let fund = transfer(&alice, &bob.public_key(), DELEGATE_VALUE, 0);
        let b2 = Block::create(&alice, Some(root), vec![fund]).unwrap();

        // Parent height 2 < WAITING_PERIOD: Bob may stake immediately.
        assert!(Block::create(&bob, Some(b2), vec![]).is_ok());
    }

    // -- Merkle -------------------------------------------------------------

    #[test]
    fn merkle_empty_is_zero() {
        assert_eq!(compute_merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn merkle_single_leaf_is_identity() {
        let h = generic_hash(b"only");
        assert_eq!(compute_merkle_root(&[h]), h);
    }

    #[test]
    fn merkle_pair_hashes_concatenation() {
        let a = generic_hash(b"left");
        let b = generic_hash(b"right");
        let expected = generic_hash_multi(&[a.as_bytes(), b.as_bytes()]);
        assert_eq!(compute_merkle_root(&[a, b]), expected);
    }

    #[test]
    fn merkle_odd_leaf_is_lifted_unchanged() {
        let a = generic_hash(b"a");
        let b = generic_hash(b"b");
        let c = generic_hash(b"c");
        // Level 1: (H(a‖b), c) — c lifted, not paired with itself.
        let ab = generic_hash_multi(&[a.as_bytes(), b.as_bytes()]);
        let expected = generic_hash_multi(&[ab.as_bytes(), c.as_bytes()]);
        assert_eq!(compute_merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn merkle_is_order_sensitive() {
        let a = generic_hash(b"a");
        let b = generic_hash(b"b");
        assert_ne!(compute_merkle_root(&[a, b]), compute_merkle_root(&[b, a]));
    }

    // -- Ancestry -----------------------------------------------------------

    #[test]
    fn has_ancestor_reflexive_and_transitive() {
        let kp = keypair();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let b2 = Block::create(&kp, Some(b1.clone()), vec![]).unwrap();
        let b3 = Block::create(&kp, Some(b2.clone()), vec![]).unwrap();

        assert!(b3.has_ancestor(Some(&b3)));
        assert!(b3.has_ancestor(Some(&b2)));
        assert!(b3.has_ancestor(Some(&b1)));
        assert!(!b1.has_ancestor(Some(&b3)));
        // Every block descends from the implicit genesis.
        assert!(b1.has_ancestor(None));
    }

    #[test]
    fn sibling_is_not_ancestor() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        let fund = transfer(&alice, &bob.public_key(), DELEGATE_VALUE, 0);
        let b2 = Block::create(&alice, Some(root), vec![fund]).unwrap();

        let left = Block::create(&alice, Some(b2.clone()), vec![]).unwrap();
        let right = Block::create(&bob, Some(b2), vec![]).unwrap();
        assert!(!left.has_ancestor(Some(&right)));
        assert!(!right.has_ancestor(Some(&left)));
    }

    #[test]
    fn child_with_creator_finds_the_right_fork() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        let fund = transfer(&alice, &bob.public_key(), DELEGATE_VALUE, 0);
        let b2 = Block::create(&alice, Some(root), vec![fund]).unwrap();

        let alice_child = Block::create(&alice, Some(b2.clone()), vec![]).unwrap();
        let bob_child = Block::create(&bob, Some(b2.clone()), vec![]).unwrap();
        b2.add_child(&alice_child);
        b2.add_child(&bob_child);

        assert_eq!(
            b2.child_with_creator(&alice.public_key()).unwrap().hash(),
            alice_child.hash()
        );
        assert_eq!(
            b2.child_with_creator(&bob.public_key()).unwrap().hash(),
            bob_child.hash()
        );
        assert!(b2.child_with_creator(&keypair().public_key()).is_none());
    }

    // -- Serialization ------------------------------------------------------

    #[test]
    fn envelope_roundtrip_preserves_derivations() {
        let alice = keypair();
        let bob = keypair();
        let root = Block::create(&alice, None, vec![]).unwrap();
        let txn = transfer(&alice, &bob.public_key(), 64, 9);
        let block = Block::create(&alice, Some(root.clone()), vec![txn]).unwrap();

        let bytes = block.to_bytes();
        let tuple = Tuple::parse(&bytes).unwrap();
        let lookup = |hash: &Hash| {
            if hash == root.hash() {
                Some(root.clone())
            } else {
                None
            }
        };
        let parsed = Block::from_tuple(&tuple, lookup).unwrap();

        assert_eq!(parsed.hash(), block.hash());
        assert_eq!(parsed.priority(), block.priority());
        assert_eq!(parsed.merkle_root(), block.merkle_root());
        assert_eq!(parsed.seed(), block.seed());
        assert_eq!(parsed.height(), block.height());
        assert_eq!(parsed.transactions().len(), 1);
        assert_eq!(
            parsed.transactions()[0].hash(),
            block.transactions()[0].hash()
        );
    }

    #[test]
    fn root_envelope_roundtrip() {
        let kp = keypair();
        let block = Block::create(&kp, None, vec![]).unwrap();
        let bytes = block.to_bytes();
        let tuple = Tuple::parse(&bytes).unwrap();
        let parsed = Block::from_tuple(&tuple, |_| None).unwrap();
        assert_eq!(parsed.hash(), block.hash());
    }

    #[test]
    fn unknown_parent_rejected() {
        let kp = keypair();
        let root = Block::create(&kp, None, vec![]).unwrap();
        let child = Block::create(&kp, Some(root), vec![]).unwrap();
        let bytes = child.to_bytes();
        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(
            Block::from_tuple(&tuple, |_| None).unwrap_err(),
            BlockError::UnknownParent
        );
    }

    #[test]
    fn tampered_merkle_root_rejected() {
        let kp = keypair();
        let bob = keypair();
        let root = Block::create(&kp, None, vec![]).unwrap();
        let txn = transfer(&kp, &bob.public_key(), 5, 0);
        let block = Block::create(&kp, Some(root.clone()), vec![txn]).unwrap();

        let mut bytes = block.to_bytes();
        // The merkle root binary sits after the timestamp and parent hash:
        // '(' '(' 'U'+8 'B'+4+32 'B'+4 <root>.
        let offset = 2 + 9 + 37 + 5;
        bytes[offset] ^= 0xff;
        let tuple = Tuple::parse(&bytes).unwrap();
        let lookup = |hash: &Hash| (hash == root.hash()).then(|| root.clone());
        assert_eq!(
            Block::from_tuple(&tuple, lookup).unwrap_err(),
            BlockError::MerkleMismatch
        );
    }

    #[test]
    fn out_of_range_delegate_rejected() {
        // Rebuild a valid block's header with an inflated delegate index;
        // re-sign it so only the range check can object.
        let kp = keypair();
        let root = Block::create(&kp, None, vec![]).unwrap();
        let block = Block::create(&kp, Some(root.clone()), vec![]).unwrap();

        let header = header_bytes(
            block.timestamp(),
            block.parent_hash(),
            block.merkle_root(),
            &kp.public_key(),
            &block.vrf_proof,
            99, // creator holds a single slot at this point
            0,
        );
        let forged_hash = generic_hash(&header);
        let forged_sig = kp.sign(forged_hash.as_bytes());

        let mut w = TupleWriter::new();
        w.begin();
        w.write_raw_tuple(&header);
        w.write_binary(forged_sig.as_bytes());
        w.begin().end();
        w.end();
        let bytes = w.finish();

        let tuple = Tuple::parse(&bytes).unwrap();
        let lookup = |hash: &Hash| (hash == root.hash()).then(|| root.clone());
        assert_eq!(
            Block::from_tuple(&tuple, lookup).unwrap_err(),
            BlockError::DelegateOutOfRange
        );
    }

    #[test]
    fn foreign_signature_rejected() {
        // A block signed by someone other than its declared creator.
        let kp = keypair();
        let mallory = keypair();
        let block = Block::create(&kp, None, vec![]).unwrap();

        let header = block.header_tuple_bytes();
        let forged_sig = mallory.sign(generic_hash(&header).as_bytes());

        let mut w = TupleWriter::new();
        w.begin();
        w.write_raw_tuple(&header);
        w.write_binary(forged_sig.as_bytes());
        w.begin().end();
        w.end();
        let bytes = w.finish();

        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(
            Block::from_tuple(&tuple, |_| None).unwrap_err(),
            BlockError::BadSignature
        );
    }

    #[test]
    fn wrong_tx_count_rejected() {
        let kp = keypair();
        let block = Block::create(&kp, None, vec![]).unwrap();

        // Declare one transaction but ship none.
        let header = header_bytes(
            block.timestamp(),
            block.parent_hash(),
            block.merkle_root(),
            &kp.public_key(),
            &block.vrf_proof,
            block.delegate(),
            1,
        );
        let sig = kp.sign(generic_hash(&header).as_bytes());
        let mut w = TupleWriter::new();
        w.begin();
        w.write_raw_tuple(&header);
        w.write_binary(sig.as_bytes());
        w.begin().end();
        w.end();
        let bytes = w.finish();

        let tuple = Tuple::parse(&bytes).unwrap();
        assert_eq!(
            Block::from_tuple(&tuple, |_| None).unwrap_err(),
            BlockError::InvalidShape
        );
    }

    #[test]
    fn priority_matches_declared_delegate() {
        let kp = keypair();
        let block = Block::create(&kp, None, vec![]).unwrap();
        assert_eq!(
            *block.priority(),
            priority_for(block.vrf_output(), block.delegate())
        );
    }

    #[test]
    fn seed_chains_from_parent() {
        let kp = keypair();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let b2 = Block::create(&kp, Some(b1.clone()), vec![]).unwrap();
        assert_eq!(
            *b2.seed(),
            generic_hash_multi(&[b1.seed().as_bytes(), kp.public_key().as_bytes()])
        );
    }

    #[test]
    fn json_view_carries_chain_linkage() {
        let kp = keypair();
        let b1 = Block::create(&kp, None, vec![]).unwrap();
        let b2 = Block::create(&kp, Some(b1.clone()), vec![]).unwrap();
        let v = b2.to_json();
        assert_eq!(v["height"].as_u64().unwrap(), 2);
        assert_eq!(v["header"]["parent"].as_str().unwrap(), b1.hash().to_hex());
        assert!(v["transactions"].as_array().unwrap().is_empty());
    }
}
