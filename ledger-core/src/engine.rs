//! Synchronous ledger engine
//!
//! Owns the chain, the pending pool, the validator registry and the
//! consensus strategy, and enforces every chain invariant. It has no
//! internal concurrency; `Ledger` wraps it for shared use.
//!
//! Block production is split into three steps so the proof-of-work search
//! can run without holding a write lock:
//!
//! 1. `prepare_block` (read-only): checks the pool and the producer,
//!    snapshots the pending transactions into a draft
//! 2. `ConsensusStrategy::seal`: pure, possibly long-running
//! 3. `commit_block` (mutating): re-checks the tip, the producer and the
//!    block itself, then publishes
//!
//! `produce_block` runs all three in sequence.

use crate::{
    config::Config,
    consensus::ConsensusStrategy,
    crypto::ZERO_HASH,
    merkle::{MerkleProof, MerkleTree},
    registry::{Validator, ValidatorRegistry},
    types::{Block, BlockDraft, Clock, Payload, SystemClock, Transaction},
    validation::{check_block, validate_chain, ChainValidation},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Actor credited by reward transactions
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Full engine state in serializable form
///
/// The engine keeps everything in memory; this is the shape an external
/// persistence layer stores and hands back to `LedgerEngine::restore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    /// Blocks, genesis first
    pub chain: Vec<Block>,
    /// Transactions waiting for the next block
    pub pending_transactions: Vec<Transaction>,
    /// Validator records in registration order
    pub validators: Vec<Validator>,
    /// Rotation cursor
    pub current_round: u64,
}

impl ChainSnapshot {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Summary figures for dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    /// Number of blocks
    pub height: usize,
    /// Transactions across all blocks
    pub total_transactions: usize,
    /// Transactions waiting in the pool
    pub pending_transactions: usize,
    /// Validators ever registered
    pub validators: usize,
    /// Currently active validators
    pub active_validators: usize,
    /// Consensus strategy name
    pub consensus: String,
    /// Difficulty stamped on new blocks
    pub difficulty: u32,
    /// Hash of the tip
    pub latest_hash: String,
}

/// Ledger state machine
#[derive(Debug)]
pub struct LedgerEngine {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    registry: ValidatorRegistry,
    strategy: ConsensusStrategy,
    max_pending: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    /// Create an engine with a fresh genesis block
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let strategy = ConsensusStrategy::from_config(&config.consensus);

        let genesis_payload = Payload::new()
            .with("type", "GENESIS")
            .with("message", config.genesis.message.as_str());
        let genesis_tx =
            Transaction::create(genesis_payload, config.genesis.actor_id.as_str(), clock.as_ref());
        let draft = BlockDraft::new(
            0,
            ZERO_HASH,
            vec![genesis_tx],
            config.genesis.producer_id.as_str(),
            clock.as_ref(),
        );
        let genesis = strategy.seal(draft)?;

        tracing::info!(
            consensus = strategy.name(),
            hash = %genesis.hash,
            "genesis block created"
        );

        Ok(Self {
            chain: vec![genesis],
            pending: Vec::new(),
            registry: ValidatorRegistry::new(),
            strategy,
            max_pending: config.pool.max_pending,
            clock,
        })
    }

    /// Rebuild an engine from a snapshot
    ///
    /// Only the genesis shape is checked here; call `validate_chain` to
    /// replay the full chain.
    pub fn restore(config: &Config, snapshot: ChainSnapshot) -> Result<Self> {
        config.validate()?;

        let genesis = snapshot.chain.first().ok_or(Error::EmptyChain)?;
        if genesis.index != 0 || genesis.previous_hash != ZERO_HASH {
            return Err(Error::InvalidInput(
                "snapshot does not start with a genesis block".to_string(),
            ));
        }

        let registry = ValidatorRegistry::from_records(snapshot.validators, snapshot.current_round)?;

        tracing::info!(height = snapshot.chain.len(), "ledger restored from snapshot");

        Ok(Self {
            chain: snapshot.chain,
            pending: snapshot.pending_transactions,
            registry,
            strategy: ConsensusStrategy::from_config(&config.consensus),
            max_pending: config.pool.max_pending,
            clock: Arc::new(SystemClock),
        })
    }

    /// Capture the full state
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.chain.clone(),
            pending_transactions: self.pending.clone(),
            validators: self.registry.validators().to_vec(),
            current_round: self.registry.current_round(),
        }
    }

    /// Configured strategy
    pub fn strategy(&self) -> &ConsensusStrategy {
        &self.strategy
    }

    /// Validator registry
    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Build, verify and queue a transaction; returns its id
    ///
    /// A transaction whose pseudo signature does not re-derive is dropped
    /// without an error; its id is still returned.
    pub fn submit_transaction(&mut self, payload: Payload, actor_id: &str) -> Result<String> {
        check_actor(actor_id)?;
        self.check_pool_capacity()?;

        let tx = Transaction::create(payload, actor_id, self.clock.as_ref());
        let id = tx.id().to_string();

        if tx.verify_signature() {
            tracing::debug!(tx_id = %id, actor = %actor_id, "transaction queued");
            self.pending.push(tx);
        } else {
            tracing::warn!(tx_id = %id, actor = %actor_id, "transaction dropped: signature mismatch");
        }

        Ok(id)
    }

    /// Queue a transaction built elsewhere; verification failures are errors
    pub fn submit_signed_transaction(&mut self, tx: Transaction) -> Result<String> {
        check_actor(tx.actor_id())?;
        if !tx.verify_signature() {
            return Err(Error::InvalidInput(format!(
                "transaction {} fails signature verification",
                tx.id()
            )));
        }
        if self.pending.iter().any(|p| p.id() == tx.id()) {
            return Err(Error::InvalidInput(format!(
                "transaction {} is already pending",
                tx.id()
            )));
        }
        self.check_pool_capacity()?;

        let id = tx.id().to_string();
        tracing::debug!(tx_id = %id, actor = %tx.actor_id(), "signed transaction queued");
        self.pending.push(tx);
        Ok(id)
    }

    fn check_pool_capacity(&self) -> Result<()> {
        match self.max_pending {
            Some(max) if self.pending.len() >= max => Err(Error::PendingPoolFull(max)),
            _ => Ok(()),
        }
    }

    /// Transactions waiting for the next block
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    // ------------------------------------------------------------------
    // Block production
    // ------------------------------------------------------------------

    /// Finalize the pending pool into a new block produced by `producer_id`
    pub fn produce_block(&mut self, producer_id: &str) -> Result<Block> {
        let draft = self.prepare_block(producer_id)?;
        let block = self.strategy.seal(draft)?;
        self.commit_block(block)
    }

    /// Produce with the next validator in rotation as producer
    ///
    /// The rotation only advances when the block is appended.
    pub fn produce_next_block(&mut self) -> Result<Block> {
        if self.pending.is_empty() {
            return Err(Error::EmptyPendingPool);
        }
        let producer = self.registry.peek_next()?.to_string();
        let block = self.produce_block(&producer)?;
        self.registry.next_in_rotation()?;
        Ok(block)
    }

    /// Draft the next block from the pending pool
    pub fn prepare_block(&self, producer_id: &str) -> Result<BlockDraft> {
        if self.pending.is_empty() {
            return Err(Error::EmptyPendingPool);
        }
        let latest = self.chain.last().ok_or(Error::EmptyChain)?;
        self.strategy.authorize(producer_id, &self.registry)?;

        Ok(BlockDraft::new(
            latest.index + 1,
            latest.hash.as_str(),
            self.pending.clone(),
            producer_id,
            self.clock.as_ref(),
        ))
    }

    /// Append a sealed block, clear the pool and queue the producer reward
    ///
    /// Fails without side effects if the block no longer extends the tip,
    /// was drafted from a different pool, its producer is no longer
    /// authorized, or it fails any per-block chain check.
    pub fn commit_block(&mut self, block: Block) -> Result<Block> {
        let latest = self.chain.last().ok_or(Error::EmptyChain)?;
        if block.previous_hash != latest.hash || block.index != latest.index + 1 {
            return Err(Error::StaleDraft(format!(
                "block {} does not extend tip {}",
                block.index, latest.index
            )));
        }

        self.strategy.authorize(&block.producer_id, &self.registry)?;
        if block.difficulty != self.strategy.difficulty() {
            return Err(Error::InvalidInput(format!(
                "block {} sealed at difficulty {}, ledger requires {}",
                block.index,
                block.difficulty,
                self.strategy.difficulty()
            )));
        }
        check_block(&block, latest, latest.index + 1, &self.strategy, &self.registry).map_err(
            |violation| {
                Error::InvalidInput(format!("block {} rejected: {}", block.index, violation))
            },
        )?;

        let same_pool = block.transactions.len() == self.pending.len()
            && block
                .transactions
                .iter()
                .zip(&self.pending)
                .all(|(a, b)| a.id() == b.id());
        if !same_pool {
            return Err(Error::StaleDraft(
                "pending pool changed while the block was sealed".to_string(),
            ));
        }

        let producer = block.producer_id.clone();
        self.chain.push(block.clone());
        self.pending.clear();

        let reward = Payload::new()
            .with("type", "REWARD")
            .with("amount", 1)
            .with("recipient", producer.as_str())
            .with("block", block.index as i64);
        self.pending
            .push(Transaction::create(reward, SYSTEM_ACTOR, self.clock.as_ref()));

        tracing::info!(
            index = block.index,
            hash = %block.hash,
            producer = %producer,
            transactions = block.transactions.len(),
            nonce = block.nonce,
            "block appended"
        );

        Ok(block)
    }

    // ------------------------------------------------------------------
    // Validators
    // ------------------------------------------------------------------

    /// Register a validator (authority mode only)
    pub fn register_validator(
        &mut self,
        identity: &str,
        public_key_material: &str,
        role: &str,
    ) -> Result<Validator> {
        self.require_authority()?;
        self.registry
            .register(identity, public_key_material, role)
            .cloned()
    }

    /// Deactivate a validator (authority mode only)
    pub fn deactivate_validator(&mut self, identity: &str) -> Result<()> {
        self.require_authority()?;
        self.registry.deactivate(identity)
    }

    /// Round-robin pick of the next producer
    pub fn next_in_rotation(&mut self) -> Result<String> {
        self.registry.next_in_rotation()
    }

    /// Rotation calls served so far
    pub fn current_round(&self) -> u64 {
        self.registry.current_round()
    }

    fn require_authority(&self) -> Result<()> {
        if self.strategy.is_authority() {
            Ok(())
        } else {
            Err(Error::InvalidInput(
                "validators are only used in proof-of-authority mode".to_string(),
            ))
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Replay the chain and report the first violation
    pub fn validate_chain(&self) -> ChainValidation {
        validate_chain(&self.chain, &self.strategy, &self.registry)
    }

    /// Number of transactions in the chain whose actor is `identity`
    ///
    /// A count, not a value balance: payload amounts are not interpreted.
    pub fn balance_of(&self, identity: &str) -> u64 {
        self.chain
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.actor_id() == identity)
            .count() as u64
    }

    /// Every chained transaction by `identity`, oldest first
    pub fn transactions_by_actor(&self, identity: &str) -> Vec<Transaction> {
        self.chain
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.actor_id() == identity)
            .cloned()
            .collect()
    }

    /// Locate a chained transaction; returns its block index as well
    pub fn find_transaction(&self, tx_id: &str) -> Option<(u64, &Transaction)> {
        self.chain.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.id() == tx_id)
                .map(|tx| (block.index, tx))
        })
    }

    /// Merkle inclusion proof for a chained transaction
    pub fn transaction_proof(&self, tx_id: &str) -> Result<MerkleProof> {
        for block in &self.chain {
            if let Some(position) = block.transactions.iter().position(|tx| tx.id() == tx_id) {
                return MerkleTree::from_transactions(&block.transactions)
                    .proof(position)
                    .ok_or_else(|| Error::TransactionNotFound(tx_id.to_string()));
            }
        }
        Err(Error::TransactionNotFound(tx_id.to_string()))
    }

    /// Whole chain, genesis first
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Block at `index`
    pub fn get_block(&self, index: u64) -> Result<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.chain.get(i))
            .ok_or(Error::BlockNotFound(index))
    }

    /// Tip of the chain
    pub fn latest_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(Error::EmptyChain)
    }

    /// Number of blocks
    pub fn chain_height(&self) -> usize {
        self.chain.len()
    }

    /// Summary figures
    pub fn chain_stats(&self) -> ChainStats {
        ChainStats {
            height: self.chain.len(),
            total_transactions: self.chain.iter().map(|b| b.transactions.len()).sum(),
            pending_transactions: self.pending.len(),
            validators: self.registry.len(),
            active_validators: self.registry.active_count(),
            consensus: self.strategy.name().to_string(),
            difficulty: self.strategy.difficulty(),
            latest_hash: self
                .chain
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_default(),
        }
    }
}

fn check_actor(actor_id: &str) -> Result<()> {
    if actor_id.trim().is_empty() {
        return Err(Error::InvalidInput("actor id must not be empty".to_string()));
    }
    Ok(())
}
