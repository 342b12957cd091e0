//! # Network Module
//!
//! The peer-to-peer layer: framed TCP transport, gossip flood suppression,
//! the pending-transaction pool, synchronization payloads, and the node
//! orchestrator that ties them to the ledger.
//!
//! ```text
//! wire.rs    — frame header, GUIDs, message types, incremental decoder
//! gossip.rs  — peer table, loop suppression, copy-once broadcast, TCP tasks
//! mempool.rs — insertion-ordered, hash-deduplicated pending pool
//! sync.rs    — pure payload builders/parsers for the sync messages
//! node.rs    — the single event loop: handlers, authoring tick, fork replay
//! ```
//!
//! ## Design Decisions
//!
//! - All protocol state is mutated from one orchestrator loop; the socket
//!   tasks only move bytes and deliver events through a channel. Handlers
//!   therefore observe a consistent ledger without further locking
//!   discipline.
//! - A broadcast serializes its frame exactly once; peer write queues
//!   share the bytes through `Arc`, and the allocation dies with the last
//!   outstanding write.
//! - Gossip frames are deduplicated by GUID against a bounded FIFO
//!   history before they are dispatched or reflected, so a flood echo
//!   costs one lookup.

pub mod gossip;
pub mod mempool;
pub mod node;
pub mod sync;
pub mod wire;

pub use gossip::{Network, NetworkEvent, PeerId};
pub use mempool::Mempool;
pub use node::{Node, NodeConfig};
pub use wire::{Frame, FrameDecoder, Guid, MessageType};
