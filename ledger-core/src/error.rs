//! Error types for the ledger engine

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every mutation-path error is terminal for that one call only: the chain
/// and the pending pool are left exactly as they were before it.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed payload or identity
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Producer is not an active validator (authority mode)
    #[error("Unauthorized producer: {0}")]
    UnauthorizedProducer(String),

    /// Nothing queued to finalize
    #[error("No pending transactions to finalize")]
    EmptyPendingPool,

    /// Validator identity already registered
    #[error("Duplicate validator: {0}")]
    DuplicateValidator(String),

    /// Rotation requested with an empty active set
    #[error("No active validators")]
    NoActiveValidators,

    /// Chain failed validation at `index`
    #[error("Chain integrity violation at block {index}: {reason}")]
    ChainIntegrityViolation {
        /// Index of the first offending block
        index: u64,
        /// What check failed
        reason: String,
    },

    /// Chain has no genesis block
    #[error("Chain is empty")]
    EmptyChain,

    /// Block not found
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Validator not found
    #[error("Validator not found: {0}")]
    ValidatorNotFound(String),

    /// Pending pool reached its configured depth
    #[error("Pending pool full ({0} transactions)")]
    PendingPoolFull(usize),

    /// Proof-of-work search hit its configured attempt bound
    #[error("Proof-of-work search exhausted after {0} attempts")]
    MiningExhausted(u64),

    /// Sealed block no longer extends the chain tip
    #[error("Stale draft: {0}")]
    StaleDraft(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("metrics: {}", err))
    }
}
