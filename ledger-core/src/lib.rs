//! E-Ledger Core
//!
//! Permissioned append-only ledger of hash-chained blocks recording business
//! transactions (e.g. supply-chain transfers).
//!
//! # Architecture
//!
//! - **Hash chain**: every block commits to its predecessor's hash
//! - **Merkle tree**: one root per block binds its ordered transactions
//! - **Pluggable consensus**: proof-of-work nonce search or proof-of-authority
//!   signing by registered validators, fixed per ledger
//! - **Single writer**: one actor applies mutations; readers share a lock
//!
//! # Invariants
//!
//! - Append-only: blocks are never modified or removed
//! - `chain[i].index == i` and `chain[i].previous_hash == chain[i - 1].hash`
//! - Stored hashes and Merkle roots always match recomputation
//! - A failed mutation leaves chain and pending pool untouched

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod metrics;
pub mod registry;
pub mod types;
pub mod validation;

// Re-exports
pub use config::Config;
pub use consensus::ConsensusStrategy;
pub use engine::{ChainSnapshot, ChainStats, LedgerEngine};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use merkle::{MerkleProof, MerkleTree};
pub use registry::{Validator, ValidatorRegistry};
pub use types::{Block, Payload, PayloadValue, Transaction};
pub use validation::{ChainValidation, Violation};
