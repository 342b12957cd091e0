// Copyright (c) 2026 Tarjeta Contributors. MIT License.
// See LICENSE for details.

//! # Tarjeta Protocol — Core Library
//!
//! The core of a peer-to-peer cryptocurrency node built around a
//! proof-of-stake block tree with VRF leader election. Forks are resolved
//! by block *priority*: every staked delegate slot gets an independent,
//! verifiable random draw per slot, and the chain with the best draws is
//! the ledger.
//!
//! ## Architecture
//!
//! - **codec** — The binary tuple format: the one serialization used on
//!   the wire and as the pre-image of every hash.
//! - **crypto** — BLAKE2b-256 hashing, Ed25519 signatures, and the ECVRF
//!   that drives sortition. Boring on purpose.
//! - **ledger** — Transactions, blocks (staking eligibility, sortition,
//!   Merkle commitment, account projection) and the block tree with
//!   priority fork choice.
//! - **network** — Framed TCP gossip with GUID flood suppression, the
//!   pending pool, sync payloads, and the orchestrator event loop.
//! - **config** — Every protocol constant, in one place.
//!
//! ## Design Philosophy
//!
//! 1. One canonical byte form for everything that gets hashed; parse and
//!    re-serialize must never change an identity.
//! 2. Validation re-derives, never trusts: a received block's every
//!    claim is recomputed before it touches the tree.
//! 3. All consensus state is mutated from a single event loop; sockets
//!    only move bytes.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod network;
