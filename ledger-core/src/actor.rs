//! Actor-based concurrency for the ledger
//!
//! Single-writer pattern using a Tokio actor:
//! - One task applies every mutation, in mailbox order
//! - Readers share the engine through a `RwLock` and never wait on mining
//! - Bounded mailbox gives backpressure to submitters
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  read lock:   prepare_block() -> BlockDraft           │
//! │  no lock:     spawn_blocking(seal)   (nonce search)   │
//! │  write lock:  commit_block()         (atomic publish) │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!           Arc<RwLock<LedgerEngine>>  <── concurrent readers
//! ```

use crate::{
    engine::LedgerEngine,
    metrics::Metrics,
    registry::Validator,
    types::{Block, Payload, Transaction},
    Error, Result,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Build and queue a transaction
    Submit {
        payload: Payload,
        actor_id: String,
        response: oneshot::Sender<Result<String>>,
    },

    /// Queue a pre-built transaction
    SubmitSigned {
        transaction: Transaction,
        response: oneshot::Sender<Result<String>>,
    },

    /// Produce a block; `None` picks the producer by rotation
    ProduceBlock {
        producer: Option<String>,
        response: oneshot::Sender<Result<Block>>,
    },

    /// Register a validator
    RegisterValidator {
        identity: String,
        public_key_material: String,
        role: String,
        response: oneshot::Sender<Result<Validator>>,
    },

    /// Deactivate a validator
    DeactivateValidator {
        identity: String,
        response: oneshot::Sender<Result<()>>,
    },

    /// Advance the rotation
    NextInRotation {
        response: oneshot::Sender<Result<String>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that applies ledger mutations
#[derive(Debug)]
pub struct LedgerActor {
    engine: Arc<RwLock<LedgerEngine>>,
    mailbox: mpsc::Receiver<LedgerMessage>,
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        engine: Arc<RwLock<LedgerEngine>>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            engine,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop until shutdown or all handles are dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => {
                    tracing::info!("ledger actor shutting down");
                    break;
                }
                msg => self.handle_message(msg).await,
            }
        }
    }

    /// Handle a single message
    async fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Submit {
                payload,
                actor_id,
                response,
            } => {
                let result = self.submit(payload, &actor_id);
                let _ = response.send(result);
            }

            LedgerMessage::SubmitSigned {
                transaction,
                response,
            } => {
                let result = {
                    let mut engine = self.engine.write();
                    let result = engine.submit_signed_transaction(transaction);
                    self.refresh_gauges(&engine);
                    result
                };
                if result.is_ok() {
                    self.metrics.record_submitted();
                }
                let _ = response.send(result);
            }

            LedgerMessage::ProduceBlock { producer, response } => {
                let result = self.produce_block(producer).await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "block production failed");
                }
                let _ = response.send(result);
            }

            LedgerMessage::RegisterValidator {
                identity,
                public_key_material,
                role,
                response,
            } => {
                let result = self
                    .engine
                    .write()
                    .register_validator(&identity, &public_key_material, &role);
                let _ = response.send(result);
            }

            LedgerMessage::DeactivateValidator { identity, response } => {
                let result = self.engine.write().deactivate_validator(&identity);
                let _ = response.send(result);
            }

            LedgerMessage::NextInRotation { response } => {
                let result = self.engine.write().next_in_rotation();
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn submit(&self, payload: Payload, actor_id: &str) -> Result<String> {
        let mut engine = self.engine.write();
        let before = engine.pending_transactions().len();
        let id = engine.submit_transaction(payload, actor_id)?;

        if engine.pending_transactions().len() > before {
            self.metrics.record_submitted();
        } else {
            self.metrics.record_dropped();
        }
        self.refresh_gauges(&engine);
        Ok(id)
    }

    /// Draft under the read lock, seal on a blocking thread, commit under
    /// the write lock
    async fn produce_block(&mut self, producer: Option<String>) -> Result<Block> {
        let started = Instant::now();

        let (draft, strategy, rotated) = {
            let engine = self.engine.read();
            let (producer, rotated) = match producer {
                Some(producer) => (producer, false),
                None => {
                    if engine.pending_transactions().is_empty() {
                        return Err(Error::EmptyPendingPool);
                    }
                    (engine.registry().peek_next()?.to_string(), true)
                }
            };
            let draft = engine.prepare_block(&producer)?;
            (draft, engine.strategy().clone(), rotated)
        };

        let block = tokio::task::spawn_blocking(move || strategy.seal(draft))
            .await
            .map_err(|e| Error::Concurrency(format!("sealing task failed: {}", e)))??;

        let block = {
            let mut engine = self.engine.write();
            let block = engine.commit_block(block)?;
            if rotated {
                engine.next_in_rotation()?;
            }
            self.refresh_gauges(&engine);
            block
        };

        self.metrics
            .record_block_produced(started.elapsed().as_secs_f64());
        Ok(block)
    }

    fn refresh_gauges(&self, engine: &LedgerEngine) {
        self.metrics
            .update_state(engine.pending_transactions().len(), engine.chain_height());
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Build and queue a transaction
    pub async fn submit_transaction(&self, payload: Payload, actor_id: String) -> Result<String> {
        self.request(|response| LedgerMessage::Submit {
            payload,
            actor_id,
            response,
        })
        .await
    }

    /// Queue a pre-built transaction
    pub async fn submit_signed_transaction(&self, transaction: Transaction) -> Result<String> {
        self.request(|response| LedgerMessage::SubmitSigned {
            transaction,
            response,
        })
        .await
    }

    /// Produce a block with an explicit producer, or by rotation
    pub async fn produce_block(&self, producer: Option<String>) -> Result<Block> {
        self.request(|response| LedgerMessage::ProduceBlock { producer, response })
            .await
    }

    /// Register a validator
    pub async fn register_validator(
        &self,
        identity: String,
        public_key_material: String,
        role: String,
    ) -> Result<Validator> {
        self.request(|response| LedgerMessage::RegisterValidator {
            identity,
            public_key_material,
            role,
            response,
        })
        .await
    }

    /// Deactivate a validator
    pub async fn deactivate_validator(&self, identity: String) -> Result<()> {
        self.request(|response| LedgerMessage::DeactivateValidator { identity, response })
            .await
    }

    /// Advance the rotation
    pub async fn next_in_rotation(&self) -> Result<String> {
        self.request(|response| LedgerMessage::NextInRotation { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    engine: Arc<RwLock<LedgerEngine>>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(engine, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
