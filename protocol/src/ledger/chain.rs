//! # Blockchain Tree
//!
//! Owns every block the node has accepted and maintains the *principal*
//! leaf — the tip of the chain applications treat as the ledger. Blocks
//! form a tree through parent links; forks are first-class and linger
//! until pruned by never being extended.
//!
//! ## Fork Choice
//!
//! Priority-based: each block's 32-byte priority comes out of its VRF
//! sortition, lower is better, comparison is byte-wise. A new block
//! becomes principal when it extends the current principal, or when it
//! beats a sibling (or an ancestor-sibling along the principal chain) on
//! priority. Ties keep the incumbent.
//!
//! The tree reports at most one `Extension` per insertion, decided before
//! anything is announced. The caller (the node orchestrator) performs the
//! rollback replay when the previous principal is not an ancestor of the
//! new one.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::crypto::Hash;
use crate::ledger::block::Block;
use crate::ledger::transaction::Transaction;

/// A principal change: the previous leaf (None on the very first insert)
/// and the new one. When `prev` is not an ancestor of `new`, a fork has
/// overtaken the principal chain and the orphaned transactions must be
/// replayed into the pool.
#[derive(Debug, Clone)]
pub struct Extension {
    pub prev: Option<Arc<Block>>,
    pub new: Arc<Block>,
}

/// Result of offering a block to the tree.
#[derive(Debug)]
pub enum InsertOutcome {
    /// A block with this hash is already present; the offered copy was
    /// dropped and nothing changed.
    Duplicate,
    /// The block joined the tree; `extension` reports a principal change,
    /// if the fork-choice rule selected one.
    Inserted { extension: Option<Extension> },
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

// ---------------------------------------------------------------------------
// Blockchain
// ---------------------------------------------------------------------------

/// The block arena plus the principal pointer.
///
/// Blocks are held by `Arc` here and only here; parent links inside
/// blocks share ownership along the spine, and children lists are weak.
/// The transaction index is a weak, non-owning lookup across every block.
pub struct Blockchain {
    blocks: HashMap<Hash, Arc<Block>>,
    transactions: HashMap<Hash, Weak<Transaction>>,
    principal: Option<Arc<Block>>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            transactions: HashMap::new(),
            principal: None,
        }
    }

    /// Insert a block. Idempotent: re-offering a known hash returns
    /// `Duplicate` and mutates nothing. Otherwise the block is indexed,
    /// linked into its parent's children list, and run through fork
    /// choice.
    pub fn insert(&mut self, block: Arc<Block>) -> InsertOutcome {
        if self.blocks.contains_key(block.hash()) {
            return InsertOutcome::Duplicate;
        }

        self.blocks.insert(*block.hash(), Arc::clone(&block));
        for txn in block.transactions() {
            self.transactions.insert(*txn.hash(), Arc::downgrade(txn));
        }
        if let Some(parent) = block.parent() {
            parent.add_child(&block);
        }

        let extension = self.run_fork_choice(&block);
        if let Some(ext) = &extension {
            debug!(
                height = ext.new.height(),
                hash = %ext.new.hash(),
                "principal extended"
            );
        }
        InsertOutcome::Inserted { extension }
    }

    /// Look up a block by hash.
    pub fn block(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    /// Look up a transaction by hash across every block in the tree.
    pub fn transaction(&self, hash: &Hash) -> Option<Arc<Transaction>> {
        self.transactions.get(hash).and_then(Weak::upgrade)
    }

    /// The current principal leaf. None only before the first insertion.
    pub fn principal(&self) -> Option<&Arc<Block>> {
        self.principal.as_ref()
    }

    /// Height of the principal leaf; 0 for an empty tree.
    pub fn height(&self) -> u32 {
        self.principal.as_ref().map_or(0, |p| p.height())
    }

    /// Number of blocks in the tree.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Apply the priority fork-choice rule for a freshly inserted block,
    /// returning the extension if the principal changed.
    ///
    /// The decision is made first and announced once; an insertion never
    /// produces more than one extension, no matter how far up the chain
    /// the ancestor walk reaches.
    fn run_fork_choice(&mut self, block: &Arc<Block>) -> Option<Extension> {
        let Some(principal) = self.principal.clone() else {
            return Some(self.switch_principal(block));
        };

        // The block extends the principal leaf by one.
        if same_block(block.parent(), Some(&principal)) {
            return Some(self.switch_principal(block));
        }

        // A sibling of the principal leaf: smaller priority evicts it;
        // ties keep the incumbent.
        if same_block(block.parent(), principal.parent()) {
            if block.priority() < principal.priority() {
                return Some(self.switch_principal(block));
            }
            return None;
        }

        // Otherwise walk up the principal chain. At each depth, `curr` is
        // the principal-side node and `prev` its parent; once `prev` is an
        // ancestor of the new block the walk has reached the common
        // ancestor and the fork cannot win anymore.
        let mut curr = principal;
        let mut prev = curr.parent().cloned();
        loop {
            if block.has_ancestor(prev.as_ref()) {
                return None;
            }
            if block.priority() < curr.priority() {
                return Some(self.switch_principal(block));
            }
            // `prev` cannot be None here: has_ancestor(None) is true.
            curr = prev.take().expect("walk continued past the root");
            prev = curr.parent().cloned();
        }
    }

    fn switch_principal(&mut self, block: &Arc<Block>) -> Extension {
        let prev = self.principal.replace(Arc::clone(block));
        Extension {
            prev,
            new: Arc::clone(block),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash equality over optional block references; None matches None.
fn same_block(a: Option<&Arc<Block>>, b: Option<&Arc<Block>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.hash() == y.hash(),
        _ => false,
    }
}
