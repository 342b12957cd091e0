//! # Cryptographic Primitives
//!
//! Everything security-related flows through this module. We deliberately
//! chose boring, well-audited building blocks:
//!
//! - **Ed25519** for signatures — fast, deterministic, and nobody has
//!   broken it.
//! - **BLAKE2b-256** as the generic hash — every block hash, transaction
//!   hash, Merkle node, sortition seed and priority in the system.
//! - **ECVRF over edwards25519** for leader election — a keyed random
//!   oracle whose outputs anyone can verify but only the key holder can
//!   produce.
//!
//! Nothing here is novel cryptography; the VRF is a careful transcription
//! of a published construction onto the same curve arithmetic the
//! signature scheme already uses. If you are tempted to optimize these
//! functions, go read about timing attacks first.

pub mod hash;
pub mod keys;
pub mod vrf;

pub use hash::{generic_hash, generic_hash_multi, Hash};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use vrf::{VrfError, VrfProof};
