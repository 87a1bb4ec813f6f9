//! Block finalization strategies
//!
//! Both variants share the draft/Block/Merkle machinery and differ only in
//! how a draft becomes a sealed block:
//!
//! - **ProofOfWork**: nonce search until the hash carries `difficulty`
//!   leading `'0'` hex characters. CPU-bound and blocking.
//! - **ProofOfAuthority**: no search; an active registered validator seals
//!   the block with `nonce = 0` and `difficulty = 0`.
//!
//! A ledger picks one strategy at construction and never mixes them.

use crate::{
    config::{ConsensusConfig, ConsensusMode},
    crypto::meets_difficulty,
    registry::ValidatorRegistry,
    types::{Block, BlockDraft},
    validation::Violation,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Consensus strategy selected once per ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// Nonce search against a leading-zero target
    ProofOfWork {
        /// Leading `'0'` hex characters required
        difficulty: u32,
        /// Optional bound on hash attempts; `None` searches forever
        max_attempts: Option<u64>,
    },
    /// Validator signing without search
    ProofOfAuthority,
}

impl ConsensusStrategy {
    /// Build from configuration
    pub fn from_config(config: &ConsensusConfig) -> Self {
        match config.mode {
            ConsensusMode::ProofOfWork => ConsensusStrategy::ProofOfWork {
                difficulty: config.difficulty,
                max_attempts: config.max_pow_attempts,
            },
            ConsensusMode::ProofOfAuthority => ConsensusStrategy::ProofOfAuthority,
        }
    }

    /// Unbounded proof-of-work at `difficulty`
    pub fn proof_of_work(difficulty: u32) -> Self {
        ConsensusStrategy::ProofOfWork {
            difficulty,
            max_attempts: None,
        }
    }

    /// Short name for logs and stats
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusStrategy::ProofOfWork { .. } => "proof_of_work",
            ConsensusStrategy::ProofOfAuthority => "proof_of_authority",
        }
    }

    /// Difficulty stamped on new blocks
    pub fn difficulty(&self) -> u32 {
        match self {
            ConsensusStrategy::ProofOfWork { difficulty, .. } => *difficulty,
            ConsensusStrategy::ProofOfAuthority => 0,
        }
    }

    /// True in authority mode
    pub fn is_authority(&self) -> bool {
        matches!(self, ConsensusStrategy::ProofOfAuthority)
    }

    /// Check that `producer_id` may finalize a block
    pub fn authorize(&self, producer_id: &str, registry: &ValidatorRegistry) -> Result<()> {
        if producer_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "producer id must not be empty".to_string(),
            ));
        }

        match self {
            ConsensusStrategy::ProofOfWork { .. } => Ok(()),
            ConsensusStrategy::ProofOfAuthority => {
                if registry.is_active(producer_id) {
                    Ok(())
                } else {
                    Err(Error::UnauthorizedProducer(producer_id.to_string()))
                }
            }
        }
    }

    /// Authorize the producer, then seal
    pub fn finalize(&self, draft: BlockDraft, registry: &ValidatorRegistry) -> Result<Block> {
        self.authorize(&draft.producer_id, registry)?;
        self.seal(draft)
    }

    /// Stamp hash, nonce, difficulty and producer signature onto a draft
    ///
    /// Does not consult the registry, so it can run off-lock (and is used
    /// for the genesis block, whose producer is never registered).
    pub fn seal(&self, draft: BlockDraft) -> Result<Block> {
        let mut block = match self {
            ConsensusStrategy::ProofOfWork {
                difficulty,
                max_attempts,
            } => mine(draft, *difficulty, *max_attempts)?,
            ConsensusStrategy::ProofOfAuthority => {
                let mut block = draft.into_block(0, 0);
                block.hash = block.compute_hash();
                block
            }
        };

        block.producer_signature = block.expected_producer_signature();
        Ok(block)
    }

    /// Consensus-specific checks for a non-genesis block
    pub fn check_block(
        &self,
        block: &Block,
        registry: &ValidatorRegistry,
    ) -> std::result::Result<(), Violation> {
        match self {
            ConsensusStrategy::ProofOfWork { .. } => {
                if !meets_difficulty(&block.hash, block.difficulty) {
                    return Err(Violation::InsufficientWork(block.difficulty));
                }
            }
            ConsensusStrategy::ProofOfAuthority => {
                if block.nonce != 0 || block.difficulty != 0 {
                    return Err(Violation::UnexpectedWork {
                        nonce: block.nonce,
                        difficulty: block.difficulty,
                    });
                }
                if !registry.contains(&block.producer_id) {
                    return Err(Violation::UnknownProducer(block.producer_id.clone()));
                }
            }
        }

        if block.producer_signature != block.expected_producer_signature() {
            return Err(Violation::BadProducerSignature);
        }

        Ok(())
    }
}

/// Increment the nonce until the hash meets `difficulty`
fn mine(draft: BlockDraft, difficulty: u32, max_attempts: Option<u64>) -> Result<Block> {
    let started = Instant::now();
    let mut block = draft.into_block(0, difficulty);
    let mut attempts: u64 = 0;

    loop {
        block.hash = block.compute_hash();
        attempts += 1;

        if meets_difficulty(&block.hash, difficulty) {
            break;
        }
        if let Some(max) = max_attempts {
            if attempts >= max {
                return Err(Error::MiningExhausted(attempts));
            }
        }
        block.nonce = block.nonce.wrapping_add(1);
    }

    tracing::debug!(
        index = block.index,
        nonce = block.nonce,
        attempts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof-of-work solved"
    );

    Ok(block)
}
