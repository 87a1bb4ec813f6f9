//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger. Each `Metrics` owns a
//! private registry, so several ledgers can live in one process.
//!
//! # Metrics
//!
//! - `ledger_transactions_submitted_total` - Transactions accepted into the pool
//! - `ledger_transactions_dropped_total` - Transactions dropped on failed verification
//! - `ledger_blocks_produced_total` - Blocks appended to the chain
//! - `ledger_pending_pool_size` - Transactions waiting for the next block
//! - `ledger_chain_height` - Number of blocks
//! - `ledger_block_production_duration_seconds` - Draft-to-commit latency

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions accepted into the pool
    pub transactions_submitted: IntCounter,

    /// Transactions dropped on failed verification
    pub transactions_dropped: IntCounter,

    /// Blocks appended
    pub blocks_produced: IntCounter,

    /// Pending pool size
    pub pending_pool_size: IntGauge,

    /// Chain height
    pub chain_height: IntGauge,

    /// Block production latency histogram
    pub block_production_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_submitted = IntCounter::new(
            "ledger_transactions_submitted_total",
            "Transactions accepted into the pending pool",
        )?;
        registry.register(Box::new(transactions_submitted.clone()))?;

        let transactions_dropped = IntCounter::new(
            "ledger_transactions_dropped_total",
            "Transactions dropped because their signature did not verify",
        )?;
        registry.register(Box::new(transactions_dropped.clone()))?;

        let blocks_produced =
            IntCounter::new("ledger_blocks_produced_total", "Blocks appended to the chain")?;
        registry.register(Box::new(blocks_produced.clone()))?;

        let pending_pool_size = IntGauge::new(
            "ledger_pending_pool_size",
            "Transactions waiting for the next block",
        )?;
        registry.register(Box::new(pending_pool_size.clone()))?;

        let chain_height = IntGauge::new("ledger_chain_height", "Number of blocks in the chain")?;
        registry.register(Box::new(chain_height.clone()))?;

        let block_production_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_block_production_duration_seconds",
                "Time from draft to committed block",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(block_production_duration.clone()))?;

        Ok(Self {
            transactions_submitted,
            transactions_dropped,
            blocks_produced,
            pending_pool_size,
            chain_height,
            block_production_duration,
            registry,
        })
    }

    /// Record a transaction accepted into the pool
    pub fn record_submitted(&self) {
        self.transactions_submitted.inc();
    }

    /// Record a transaction dropped on failed verification
    pub fn record_dropped(&self) {
        self.transactions_dropped.inc();
    }

    /// Record an appended block
    pub fn record_block_produced(&self, duration_seconds: f64) {
        self.blocks_produced.inc();
        self.block_production_duration.observe(duration_seconds);
    }

    /// Update pool and chain gauges
    pub fn update_state(&self, pending: usize, height: usize) {
        self.pending_pool_size.set(pending as i64);
        self.chain_height.set(height as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(format!("metrics: {}", e)))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_submitted", &self.transactions_submitted.get())
            .field("blocks_produced", &self.blocks_produced.get())
            .field("chain_height", &self.chain_height.get())
            .finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
