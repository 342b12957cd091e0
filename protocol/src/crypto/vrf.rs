//! # Verifiable Random Function
//!
//! ECVRF-EDWARDS25519-SHA512-TAI (RFC 9381, §5) over the same curve and
//! key material as the Ed25519 signatures. The VRF is the randomness
//! source of leader election: a creator proves, with an 80-byte proof,
//! that a 64-byte pseudorandom output was honestly derived from the
//! sortition seed and their secret key. Anyone holding the public key can
//! check the proof; nobody can grind the output.
//!
//! ## Construction
//!
//! - `hash_to_curve` uses try-and-increment: hash `(suite ‖ 0x01 ‖ pk ‖
//!   alpha ‖ ctr)` with SHA-512 and take the first decompressable curve
//!   point, cleared of its cofactor component.
//! - The proof is `(Gamma, c, s)` with `Gamma = x·H`, a 16-byte challenge
//!   `c`, and `s = k + c·x (mod L)`.
//! - The output is `SHA-512(suite ‖ 0x03 ‖ cofactor·Gamma)`.
//!
//! The nonce `k` is derived deterministically from the second half of the
//! SHA-512 key expansion, exactly like an Ed25519 signing nonce; no
//! randomness is consumed at proving time.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use curve25519_dalek::traits::IsIdentity;
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::config::{VRF_OUTPUT_LENGTH, VRF_PROOF_LENGTH};
use crate::crypto::keys::{Keypair, PublicKey};

/// Suite identifier for ECVRF-EDWARDS25519-SHA512-TAI.
const SUITE: u8 = 0x03;

/// Domain separator: hash-to-curve.
const DST_HASH_TO_CURVE: u8 = 0x01;

/// Domain separator: challenge generation.
const DST_CHALLENGE: u8 = 0x02;

/// Domain separator: proof-to-hash.
const DST_PROOF_TO_HASH: u8 = 0x03;

/// Errors from VRF operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VrfError {
    /// Proof bytes did not decode to valid curve elements.
    #[error("malformed VRF proof")]
    MalformedProof,

    /// The public key bytes are not a usable curve point.
    #[error("invalid VRF public key")]
    InvalidPublicKey,

    /// No curve point was found for the input (probability ~2^-256 per
    /// counter, so reaching this means the input loop was exhausted).
    #[error("hash-to-curve failed")]
    HashToCurveFailed,

    /// The proof did not verify against the key and input.
    #[error("VRF proof verification failed")]
    InvalidProof,
}

// ---------------------------------------------------------------------------
// VrfProof
// ---------------------------------------------------------------------------

/// A decoded VRF proof: `Gamma ‖ c ‖ s`, 80 bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfProof {
    gamma: EdwardsPoint,
    c: Scalar,
    s: Scalar,
}

impl VrfProof {
    /// Serialize to the 80-byte wire form: compressed Gamma (32) ‖
    /// challenge (16) ‖ scalar (32).
    pub fn to_bytes(&self) -> [u8; VRF_PROOF_LENGTH] {
        let mut out = [0u8; VRF_PROOF_LENGTH];
        out[..32].copy_from_slice(self.gamma.compress().as_bytes());
        out[32..48].copy_from_slice(&self.c.to_bytes()[..16]);
        out[48..].copy_from_slice(&self.s.to_bytes());
        out
    }

    /// Decode from the 80-byte wire form, rejecting non-canonical scalars
    /// and off-curve Gamma.
    pub fn from_bytes(bytes: &[u8; VRF_PROOF_LENGTH]) -> Result<Self, VrfError> {
        let gamma_bytes: [u8; 32] = bytes[..32].try_into().expect("split is 32 bytes");
        let gamma = CompressedEdwardsY(gamma_bytes)
            .decompress()
            .ok_or(VrfError::MalformedProof)?;

        let mut c_bytes = [0u8; 32];
        c_bytes[..16].copy_from_slice(&bytes[32..48]);
        // The challenge occupies 128 bits, always below the group order.
        let c = Scalar::from_bytes_mod_order(c_bytes);

        let s_bytes: [u8; 32] = bytes[48..].try_into().expect("split is 32 bytes");
        let s: Option<Scalar> = Scalar::from_canonical_bytes(s_bytes).into();
        let s = s.ok_or(VrfError::MalformedProof)?;

        Ok(Self { gamma, c, s })
    }

    /// Derive the 64-byte VRF output from the proof alone. Only meaningful
    /// for proofs that verify (or that this node just produced).
    pub fn to_output(&self) -> [u8; VRF_OUTPUT_LENGTH] {
        let cleared = self.gamma.mul_by_cofactor();
        let digest = Sha512::new()
            .chain_update([SUITE, DST_PROOF_TO_HASH])
            .chain_update(cleared.compress().as_bytes())
            .finalize();
        let mut out = [0u8; VRF_OUTPUT_LENGTH];
        out.copy_from_slice(&digest);
        out
    }
}

impl std::fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VrfProof({}…)", &hex::encode(&self.to_bytes()[..8]))
    }
}

// ---------------------------------------------------------------------------
// Prove / Verify
// ---------------------------------------------------------------------------

/// Produce a proof over `alpha` with the keypair's secret key.
pub fn prove(keypair: &Keypair, alpha: &[u8]) -> Result<VrfProof, VrfError> {
    // Expand the Ed25519 seed the same way signing does: SHA-512, clamp
    // the lower half into the secret scalar, keep the upper half as the
    // deterministic nonce prefix.
    let seed = keypair.signing_key().to_bytes();
    let expansion = Sha512::digest(seed);
    let mut lower = [0u8; 32];
    lower.copy_from_slice(&expansion[..32]);
    let x = Scalar::from_bytes_mod_order(clamp_integer(lower));
    let nonce_prefix = &expansion[32..];

    let pk_bytes = *keypair.public_key().as_bytes();
    let h = hash_to_curve(&pk_bytes, alpha)?;
    let h_compressed = h.compress();

    let gamma = h * x;

    // Deterministic nonce: SHA-512(prefix ‖ H), reduced wide.
    let k_digest = Sha512::new()
        .chain_update(nonce_prefix)
        .chain_update(h_compressed.as_bytes())
        .finalize();
    let mut k_wide = [0u8; 64];
    k_wide.copy_from_slice(&k_digest);
    let k = Scalar::from_bytes_mod_order_wide(&k_wide);

    let k_b = EdwardsPoint::mul_base(&k);
    let k_h = h * k;

    let c = challenge(&h, &gamma, &k_b, &k_h);
    let s = k + c * x;

    Ok(VrfProof { gamma, c, s })
}

/// Verify `proof` against `public_key` and `alpha`; on success return the
/// 64-byte VRF output it commits to.
pub fn verify(
    public_key: &PublicKey,
    proof: &VrfProof,
    alpha: &[u8],
) -> Result<[u8; VRF_OUTPUT_LENGTH], VrfError> {
    let y = CompressedEdwardsY(*public_key.as_bytes())
        .decompress()
        .ok_or(VrfError::InvalidPublicKey)?;
    if y.is_small_order() {
        return Err(VrfError::InvalidPublicKey);
    }

    let h = hash_to_curve(public_key.as_bytes(), alpha)?;

    // U = s·B − c·Y, V = s·H − c·Gamma. For an honest proof both equal
    // k·B and k·H, reproducing the prover's challenge transcript.
    let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&-proof.c, &y, &proof.s);
    let v = h * proof.s - proof.gamma * proof.c;

    let expected = challenge(&h, &proof.gamma, &u, &v);
    if expected != proof.c {
        return Err(VrfError::InvalidProof);
    }

    Ok(proof.to_output())
}

/// Try-and-increment hash-to-curve: the first counter whose digest prefix
/// decompresses to a curve point wins, after clearing the cofactor.
fn hash_to_curve(pk_bytes: &[u8; 32], alpha: &[u8]) -> Result<EdwardsPoint, VrfError> {
    for ctr in 0u8..=255 {
        let digest = Sha512::new()
            .chain_update([SUITE, DST_HASH_TO_CURVE])
            .chain_update(pk_bytes)
            .chain_update(alpha)
            .chain_update([ctr])
            .finalize();
        let mut candidate = [0u8; 32];
        candidate.copy_from_slice(&digest[..32]);
        if let Some(point) = CompressedEdwardsY(candidate).decompress() {
            let cleared = point.mul_by_cofactor();
            if !cleared.is_identity() {
                return Ok(cleared);
            }
        }
    }
    Err(VrfError::HashToCurveFailed)
}

/// 16-byte challenge over the proof transcript, embedded in a scalar.
fn challenge(
    h: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> Scalar {
    let digest = Sha512::new()
        .chain_update([SUITE, DST_CHALLENGE])
        .chain_update(h.compress().as_bytes())
        .chain_update(gamma.compress().as_bytes())
        .chain_update(u.compress().as_bytes())
        .chain_update(v.compress().as_bytes())
        .finalize();
    let mut c_bytes = [0u8; 32];
    c_bytes[..16].copy_from_slice(&digest[..16]);
    Scalar::from_bytes_mod_order(c_bytes)
}
