//! # Ledger Module
//!
//! The consensus data structures: signed value transfers, blocks with VRF
//! sortition, and the block tree with priority-based principal selection.
//!
//! ```text
//! transaction.rs — signed transfer, hash over the canonical body tuple
//! block.rs       — construction & validation: staking, sortition, Merkle
//!                  commitment, account projection, header signature
//! chain.rs       — block arena, fork choice, extension reporting
//! ```
//!
//! ## Ownership
//!
//! The `Blockchain` owns every block (`Arc<Block>` in its arena map); a
//! block owns its transactions; parent links run child→parent as owning
//! `Arc`s, while children lists hold `Weak` back-references so the tree
//! contains no reference cycles. The chain-wide transaction index is a
//! `Weak` lookup for the same reason.

pub mod block;
pub mod chain;
pub mod transaction;

pub use block::{Account, Block, BlockError};
pub use chain::{Blockchain, Extension, InsertOutcome};
pub use transaction::{Transaction, TransactionError};
