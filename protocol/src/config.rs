//! # Protocol Configuration & Constants
//!
//! Every magic number in tarjeta lives here. These values define the DNA of
//! the network: changing any consensus constant after launch splits the
//! chain, so treat edits as hard forks.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Wire Protocol
// ---------------------------------------------------------------------------

/// Magic bytes that open every frame on the wire. "TRJT" in ASCII — peers
/// can reject non-tarjeta traffic after reading four bytes.
pub const WIRE_MAGIC: u32 = 0x5452_4A54;

/// Frame header size in bytes: magic (4) + payload length (4) + GUID (16)
/// + message type (2).
pub const FRAME_HEADER_LEN: usize = 26;

/// Version string exchanged in the handshake. Peers with a different
/// version string are disconnected — there is no cross-version
/// compatibility story during alpha.
pub const VERSION_STRING: &str = "1.0.0-alpha";

/// Bounded history of recently seen broadcast GUIDs, FIFO-evicted.
/// 1024 entries outlasts any realistic gossip echo on a small network.
pub const MESSAGE_HISTORY_SIZE: usize = 1024;

/// Upper bound on `--connect` arguments accepted at startup.
pub const MAX_INITIAL_CONNECTIONS: usize = 64;

// ---------------------------------------------------------------------------
// Consensus Parameters
// ---------------------------------------------------------------------------

/// Tokens credited to a block's creator, applied to the account map before
/// any transaction. The coinbase is implicit: it is not a transaction
/// object, never enters the Merkle root, and is never gossiped.
pub const COINBASE_REWARD: u64 = 1024;

/// Tokens per staking slot. An account holding `n * DELEGATE_VALUE` tokens
/// gets `n` independent sortition draws per block.
pub const DELEGATE_VALUE: u64 = 1024;

/// Number of blocks a newly funded key must wait before it may stake,
/// measured from the block in which the key first received funds. Keeps a
/// freshly funded attacker from staking before the funding transaction has
/// settled under a few rounds of fork choice.
pub const WAITING_PERIOD: u32 = 16;

/// Target interval between authored blocks. The authoring deadline is
/// restarted every time the principal chain is extended.
pub const BLOCK_TIME: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Cryptographic Sizes
// ---------------------------------------------------------------------------

/// Generic hash output length (BLAKE2b-256).
pub const HASH_LENGTH: usize = 32;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// ECVRF proof length: gamma (32) + challenge (16) + scalar (32).
pub const VRF_PROOF_LENGTH: usize = 80;

/// ECVRF output length (SHA-512 digest).
pub const VRF_OUTPUT_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Network Defaults
// ---------------------------------------------------------------------------

/// Default TCP listening port for peer connections.
pub const DEFAULT_PORT: u16 = 1960;

/// Default REST/metrics port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 128;
