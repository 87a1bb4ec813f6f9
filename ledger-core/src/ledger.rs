//! Main ledger orchestration layer
//!
//! Ties the engine, the writer actor and metrics together into the API the
//! request layer consumes. Mutations are async and serialized through the
//! actor; queries are sync and read a consistent snapshot under a shared
//! lock.
//!
//! # Example
//!
//! ```no_run
//! use eledger_core::{types::Payload, Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> eledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     ledger.register_validator("V1", "pk-1", "MANUFACTURER").await?;
//!     let payload = Payload::new().with("type", "TRANSFER").with("batch", "A-1");
//!     ledger.submit_transaction(payload, "4000001000005").await?;
//!     let block = ledger.produce_block("V1").await?;
//!
//!     assert!(ledger.validate_chain().valid);
//!     println!("block {} sealed as {}", block.index, block.hash);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    consensus::ConsensusStrategy,
    engine::{ChainSnapshot, ChainStats, LedgerEngine},
    merkle::MerkleProof,
    metrics::Metrics,
    registry::Validator,
    types::{Block, Clock, Payload, Transaction},
    validation::ChainValidation,
    Config, Result,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Shared engine (for reads)
    engine: Arc<RwLock<LedgerEngine>>,

    metrics: Metrics,

    config: Config,
}

impl Ledger {
    /// Open a fresh ledger with a genesis block
    pub async fn open(config: Config) -> Result<Self> {
        let engine = LedgerEngine::new(&config)?;
        Self::start(config, engine)
    }

    /// Open a fresh ledger reading time from `clock`
    pub async fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let engine = LedgerEngine::with_clock(&config, clock)?;
        Self::start(config, engine)
    }

    /// Resume from a snapshot taken with `Ledger::snapshot`
    pub async fn restore(config: Config, snapshot: ChainSnapshot) -> Result<Self> {
        let engine = LedgerEngine::restore(&config, snapshot)?;
        Self::start(config, engine)
    }

    fn start(config: Config, engine: LedgerEngine) -> Result<Self> {
        let metrics = Metrics::new()?;
        metrics.update_state(engine.pending_transactions().len(), engine.chain_height());

        let engine = Arc::new(RwLock::new(engine));
        let handle = spawn_ledger_actor(
            engine.clone(),
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "ledger opened"
        );

        Ok(Self {
            handle,
            engine,
            metrics,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Build, verify and queue a transaction; returns its id
    pub async fn submit_transaction(
        &self,
        payload: Payload,
        actor_id: impl Into<String>,
    ) -> Result<String> {
        self.handle
            .submit_transaction(payload, actor_id.into())
            .await
    }

    /// Queue a pre-built transaction; fails if it does not verify
    pub async fn submit_signed_transaction(&self, transaction: Transaction) -> Result<String> {
        self.handle.submit_signed_transaction(transaction).await
    }

    /// Finalize the pending pool into a block produced by `producer_id`
    pub async fn produce_block(&self, producer_id: impl Into<String>) -> Result<Block> {
        self.handle.produce_block(Some(producer_id.into())).await
    }

    /// Finalize with the next validator in rotation
    pub async fn produce_next_block(&self) -> Result<Block> {
        self.handle.produce_block(None).await
    }

    /// Register a validator (authority mode only)
    pub async fn register_validator(
        &self,
        identity: impl Into<String>,
        public_key_material: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<Validator> {
        self.handle
            .register_validator(identity.into(), public_key_material.into(), role.into())
            .await
    }

    /// Deactivate a validator (authority mode only)
    pub async fn deactivate_validator(&self, identity: impl Into<String>) -> Result<()> {
        self.handle.deactivate_validator(identity.into()).await
    }

    /// Round-robin pick of the next producer; advances the round
    pub async fn next_in_rotation(&self) -> Result<String> {
        self.handle.next_in_rotation().await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Replay the chain and report the first violation
    pub fn validate_chain(&self) -> ChainValidation {
        self.engine.read().validate_chain()
    }

    /// Count of chained transactions whose actor is `identity`
    pub fn balance_of(&self, identity: &str) -> u64 {
        self.engine.read().balance_of(identity)
    }

    /// Full chain snapshot, genesis first
    pub fn get_chain(&self) -> Vec<Block> {
        self.engine.read().chain().to_vec()
    }

    /// Block at `index`
    pub fn get_block(&self, index: u64) -> Result<Block> {
        self.engine.read().get_block(index).cloned()
    }

    /// Tip of the chain
    pub fn latest_block(&self) -> Result<Block> {
        self.engine.read().latest_block().cloned()
    }

    /// Number of blocks
    pub fn chain_height(&self) -> usize {
        self.engine.read().chain_height()
    }

    /// Transactions waiting for the next block
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.engine.read().pending_transactions().to_vec()
    }

    /// Locate a chained transaction and the index of its block
    pub fn find_transaction(&self, tx_id: &str) -> Option<(u64, Transaction)> {
        self.engine
            .read()
            .find_transaction(tx_id)
            .map(|(index, tx)| (index, tx.clone()))
    }

    /// History of `identity`, oldest first
    pub fn transactions_by_actor(&self, identity: &str) -> Vec<Transaction> {
        self.engine.read().transactions_by_actor(identity)
    }

    /// Merkle inclusion proof for a chained transaction
    pub fn transaction_proof(&self, tx_id: &str) -> Result<MerkleProof> {
        self.engine.read().transaction_proof(tx_id)
    }

    /// Registered validators in registration order
    pub fn validators(&self) -> Vec<Validator> {
        self.engine.read().registry().validators().to_vec()
    }

    /// Rotation calls served so far
    pub fn current_round(&self) -> u64 {
        self.engine.read().current_round()
    }

    /// Configured consensus strategy
    pub fn consensus(&self) -> ConsensusStrategy {
        self.engine.read().strategy().clone()
    }

    /// Summary figures
    pub fn chain_stats(&self) -> ChainStats {
        self.engine.read().chain_stats()
    }

    /// Full state for an external persistence layer
    pub fn snapshot(&self) -> ChainSnapshot {
        self.engine.read().snapshot()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusMode;
    use crate::Error;

    async fn create_test_ledger() -> Ledger {
        Ledger::open(Config::default()).await.unwrap()
    }

    fn transfer(batch: &str) -> Payload {
        Payload::new()
            .with("type", "TRANSFER")
            .with("batch", batch)
            .with("from", "4000001000005")
            .with("to", "4000002000002")
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let ledger = create_test_ledger().await;
        assert_eq!(ledger.chain_height(), 1);
        assert_eq!(ledger.metrics().chain_height.get(), 1);
        assert!(ledger.validate_chain().valid);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_produce_validate() {
        let ledger = create_test_ledger().await;
        ledger
            .register_validator("V1", "pk-1", "MANUFACTURER")
            .await
            .unwrap();

        let id = ledger
            .submit_transaction(transfer("A-1"), "4000001000005")
            .await
            .unwrap();
        let block = ledger.produce_block("V1").await.unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(ledger.get_block(1).unwrap(), block);
        assert_eq!(ledger.latest_block().unwrap().hash, block.hash);
        assert_eq!(ledger.find_transaction(&id).unwrap().0, 1);
        assert!(ledger.transaction_proof(&id).unwrap().verify());

        let report = ledger.validate_chain();
        assert!(report.valid);
        assert_eq!(report.height, 2);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_pool_leaves_chain_unchanged() {
        let ledger = create_test_ledger().await;
        ledger.register_validator("V1", "pk", "r").await.unwrap();

        let result = ledger.produce_block("V1").await;
        assert!(matches!(result, Err(Error::EmptyPendingPool)));
        assert_eq!(ledger.chain_height(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_validator() {
        let ledger = create_test_ledger().await;
        ledger.register_validator("V1", "pk", "r").await.unwrap();

        let result = ledger.register_validator("V1", "pk", "r").await;
        assert!(matches!(result, Err(Error::DuplicateValidator(_))));
        assert_eq!(ledger.validators().len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_balance_of() {
        let ledger = create_test_ledger().await;
        ledger.register_validator("V1", "pk", "r").await.unwrap();

        for batch in ["A-1", "A-2", "A-3"] {
            ledger.submit_transaction(transfer(batch), "A").await.unwrap();
        }
        ledger.produce_block("V1").await.unwrap();
        ledger.submit_transaction(transfer("B-1"), "B").await.unwrap();
        ledger.produce_block("V1").await.unwrap();

        assert_eq!(ledger.balance_of("A"), 3);
        assert_eq!(ledger.balance_of("B"), 1);
        assert_eq!(ledger.transactions_by_actor("A").len(), 3);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_submissions() {
        let ledger = Arc::new(create_test_ledger().await);
        ledger.register_validator("V1", "pk", "r").await.unwrap();

        let mut tasks = Vec::new();
        for n in 0..20i64 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                let payload = Payload::new().with("type", "TRANSFER").with("seq", n);
                ledger.submit_transaction(payload, format!("actor-{}", n % 4)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(ledger.pending_transactions().len(), 20);

        let block = ledger.produce_block("V1").await.unwrap();
        assert_eq!(block.transactions.len(), 20);
        assert!(ledger.validate_chain().valid);
        assert_eq!(ledger.metrics().transactions_submitted.get(), 20);
    }

    #[tokio::test]
    async fn test_rotation() {
        let ledger = create_test_ledger().await;
        ledger.register_validator("V1", "pk", "r").await.unwrap();
        ledger.register_validator("V2", "pk", "r").await.unwrap();

        assert_eq!(ledger.next_in_rotation().await.unwrap(), "V1");
        assert_eq!(ledger.next_in_rotation().await.unwrap(), "V2");
        assert_eq!(ledger.next_in_rotation().await.unwrap(), "V1");
        assert_eq!(ledger.current_round(), 3);

        ledger.submit_transaction(transfer("A-1"), "A").await.unwrap();
        let block = ledger.produce_next_block().await.unwrap();
        assert_eq!(block.producer_id, "V2");

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_proof_of_work_ledger() {
        let mut config = Config::default();
        config.consensus.mode = ConsensusMode::ProofOfWork;
        config.consensus.difficulty = 1;
        let ledger = Ledger::open(config).await.unwrap();

        assert!(matches!(
            ledger.register_validator("V1", "pk", "r").await,
            Err(Error::InvalidInput(_))
        ));

        ledger.submit_transaction(transfer("A-1"), "A").await.unwrap();
        let block = ledger.produce_block("anyone").await.unwrap();
        assert_eq!(block.difficulty, 1);
        assert!(block.hash.starts_with('0'));
        assert_eq!(ledger.consensus().name(), "proof_of_work");
        assert!(ledger.validate_chain().valid);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_and_restore() {
        let ledger = create_test_ledger().await;
        ledger.register_validator("V1", "pk", "r").await.unwrap();
        ledger.submit_transaction(transfer("A-1"), "A").await.unwrap();
        ledger.produce_block("V1").await.unwrap();

        let snapshot = ledger.snapshot();
        ledger.shutdown().await.unwrap();

        let restored = Ledger::restore(Config::default(), snapshot.clone())
            .await
            .unwrap();
        assert_eq!(restored.get_chain(), snapshot.chain);
        assert_eq!(restored.chain_stats().height, 2);
        assert!(restored.validate_chain().valid);

        // Keys are not part of the snapshot, but the record still authorizes
        restored.produce_block("V1").await.unwrap();
        assert_eq!(restored.chain_height(), 3);

        restored.shutdown().await.unwrap();
    }
}
