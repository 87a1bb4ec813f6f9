//! Chain integrity validation
//!
//! Replays a chain and reports the first block that breaks an invariant.
//! Validation never mutates the chain and never raises: violations come
//! back as data in a `ChainValidation` report.

use crate::{
    consensus::ConsensusStrategy, crypto::ZERO_HASH, registry::ValidatorRegistry, types::Block,
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Which check a block failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum Violation {
    /// Chain has no blocks at all
    #[error("chain has no genesis block")]
    MissingGenesis,

    /// Genesis does not reference the zero sentinel
    #[error("genesis previous hash is not the zero sentinel")]
    BadGenesisLink,

    /// Block sits at the wrong height
    #[error("block index {found} where {expected} was expected")]
    IndexMismatch {
        /// Position in the chain
        expected: u64,
        /// Stored index
        found: u64,
    },

    /// Stored hash differs from recomputation
    #[error("stored hash does not match recomputed hash")]
    HashMismatch,

    /// `previous_hash` does not match the prior block's hash
    #[error("previous hash does not match prior block")]
    BrokenLink,

    /// Stored Merkle root differs from recomputation
    #[error("merkle root does not match transactions")]
    MerkleRootMismatch,

    /// Hash misses its recorded proof-of-work target
    #[error("hash does not meet difficulty {0}")]
    InsufficientWork(u32),

    /// Authority block carries search parameters
    #[error("authority block has nonce {nonce} and difficulty {difficulty}")]
    UnexpectedWork {
        /// Stored nonce
        nonce: u64,
        /// Stored difficulty
        difficulty: u32,
    },

    /// Producer never registered (authority mode)
    #[error("producer {0} is not a registered validator")]
    UnknownProducer(String),

    /// Producer signature differs from `digest(hash || producer_id)`
    #[error("producer signature mismatch")]
    BadProducerSignature,

    /// A contained transaction fails pseudo-signature re-derivation
    #[error("transaction {0} fails signature verification")]
    BadTransactionSignature(String),
}

/// Result of replaying the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainValidation {
    /// Whether every check passed
    pub valid: bool,
    /// Index of the first offending block
    pub first_invalid_index: Option<u64>,
    /// Number of blocks in the chain
    pub height: usize,
    /// What failed at `first_invalid_index`
    pub violation: Option<Violation>,
}

impl ChainValidation {
    fn ok(height: usize) -> Self {
        Self {
            valid: true,
            first_invalid_index: None,
            height,
            violation: None,
        }
    }

    fn failed(height: usize, index: u64, violation: Violation) -> Self {
        Self {
            valid: false,
            first_invalid_index: Some(index),
            height,
            violation: Some(violation),
        }
    }

    /// Convert into `Err(ChainIntegrityViolation)` when invalid
    pub fn into_result(self) -> Result<()> {
        match (self.valid, self.first_invalid_index, self.violation) {
            (true, _, _) => Ok(()),
            (false, index, violation) => Err(Error::ChainIntegrityViolation {
                index: index.unwrap_or(0),
                reason: violation
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }
}

/// Walk the chain and stop at the first failing block
pub fn validate_chain(
    chain: &[Block],
    strategy: &ConsensusStrategy,
    registry: &ValidatorRegistry,
) -> ChainValidation {
    let height = chain.len();

    let genesis = match chain.first() {
        Some(genesis) => genesis,
        None => return ChainValidation::failed(0, 0, Violation::MissingGenesis),
    };
    if let Err(violation) = check_genesis(genesis) {
        tracing::warn!(index = 0, %violation, "chain integrity violation");
        return ChainValidation::failed(height, 0, violation);
    }

    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, block) = (&pair[0], &pair[1]);
        let expected_index = position as u64 + 1;

        if let Err(violation) = check_block(block, previous, expected_index, strategy, registry) {
            tracing::warn!(index = expected_index, %violation, "chain integrity violation");
            return ChainValidation::failed(height, expected_index, violation);
        }
    }

    ChainValidation::ok(height)
}

fn check_genesis(genesis: &Block) -> std::result::Result<(), Violation> {
    if genesis.index != 0 {
        return Err(Violation::IndexMismatch {
            expected: 0,
            found: genesis.index,
        });
    }
    if genesis.previous_hash != ZERO_HASH {
        return Err(Violation::BadGenesisLink);
    }
    if genesis.hash != genesis.compute_hash() {
        return Err(Violation::HashMismatch);
    }
    Ok(())
}

/// All checks for one non-genesis block against its predecessor
pub fn check_block(
    block: &Block,
    previous: &Block,
    expected_index: u64,
    strategy: &ConsensusStrategy,
    registry: &ValidatorRegistry,
) -> std::result::Result<(), Violation> {
    if block.index != expected_index {
        return Err(Violation::IndexMismatch {
            expected: expected_index,
            found: block.index,
        });
    }
    if block.hash != block.compute_hash() {
        return Err(Violation::HashMismatch);
    }
    if block.previous_hash != previous.hash {
        return Err(Violation::BrokenLink);
    }
    if block.merkle_root != block.compute_merkle_root() {
        return Err(Violation::MerkleRootMismatch);
    }

    strategy.check_block(block, registry)?;

    if let Some(tx) = block.transactions.iter().find(|tx| !tx.verify_signature()) {
        return Err(Violation::BadTransactionSignature(tx.id().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockDraft, FixedClock, Payload, Transaction};
    use chrono::{TimeZone, Utc};

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap())
    }

    fn build_chain(len: u64) -> (Vec<Block>, ValidatorRegistry) {
        let mut registry = ValidatorRegistry::new();
        registry.register("V1", "pk", "r").unwrap();
        let strategy = ConsensusStrategy::ProofOfAuthority;

        let genesis_tx = Transaction::create(Payload::new().with("type", "GENESIS"), "G", &clock());
        let genesis = strategy
            .seal(BlockDraft::new(0, ZERO_HASH, vec![genesis_tx], "SYSTEM_VALIDATOR", &clock()))
            .unwrap();

        let mut chain = vec![genesis];
        for i in 1..len {
            let tx = Transaction::create(Payload::new().with("seq", i as i64), "A", &clock());
            let prev = chain.last().unwrap().hash.clone();
            let block = strategy
                .finalize(BlockDraft::new(i, prev, vec![tx], "V1", &clock()), &registry)
                .unwrap();
            chain.push(block);
        }
        (chain, registry)
    }

    #[test]
    fn test_valid_chain() {
        let (chain, registry) = build_chain(4);
        let report = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry);

        assert!(report.valid);
        assert_eq!(report.first_invalid_index, None);
        assert_eq!(report.height, 4);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        let report = validate_chain(&[], &ConsensusStrategy::ProofOfAuthority, &ValidatorRegistry::new());
        assert!(!report.valid);
        assert_eq!(report.violation, Some(Violation::MissingGenesis));
    }

    #[test]
    fn test_broken_link_reported_at_block() {
        let (mut chain, registry) = build_chain(4);
        chain[2].previous_hash = "ab".repeat(32);
        chain[2].hash = chain[2].compute_hash();
        chain[2].producer_signature = chain[2].expected_producer_signature();

        let report = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_index, Some(2));
        assert_eq!(report.violation, Some(Violation::BrokenLink));
    }

    #[test]
    fn test_unrehashed_mutation_is_hash_mismatch() {
        let (mut chain, registry) = build_chain(3);
        chain[1].nonce = 99;

        let report = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry);
        assert_eq!(report.first_invalid_index, Some(1));
        assert_eq!(report.violation, Some(Violation::HashMismatch));
    }

    #[test]
    fn test_short_circuits_on_first_failure() {
        let (mut chain, registry) = build_chain(4);
        chain[1].nonce = 1;
        chain[3].nonce = 1;

        let report = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry);
        assert_eq!(report.first_invalid_index, Some(1));
    }

    #[test]
    fn test_index_gap_detected() {
        let (mut chain, registry) = build_chain(3);
        chain[2].index = 5;

        let report = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry);
        assert_eq!(report.first_invalid_index, Some(2));
        assert_eq!(
            report.violation,
            Some(Violation::IndexMismatch {
                expected: 2,
                found: 5
            })
        );
    }

    #[test]
    fn test_into_result_carries_reason() {
        let (mut chain, registry) = build_chain(2);
        chain[1].merkle_root = ZERO_HASH.to_string();

        let err = validate_chain(&chain, &ConsensusStrategy::ProofOfAuthority, &registry)
            .into_result()
            .unwrap_err();
        match err {
            Error::ChainIntegrityViolation { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("hash"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
