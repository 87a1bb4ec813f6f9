//! Configuration for the ledger

use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Consensus configuration
    pub consensus: ConsensusConfig,

    /// Pending pool configuration
    pub pool: PoolConfig,

    /// Genesis block configuration
    pub genesis: GenesisConfig,

    /// Writer actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "eledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            consensus: ConsensusConfig::default(),
            pool: PoolConfig::default(),
            genesis: GenesisConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Block production mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    /// Nonce search
    ProofOfWork,
    /// Registered validators sign blocks
    ProofOfAuthority,
}

impl ConsensusMode {
    /// Parse from string (`pow`, `poa`, or the full snake_case name)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pow" | "proof_of_work" => Some(ConsensusMode::ProofOfWork),
            "poa" | "proof_of_authority" => Some(ConsensusMode::ProofOfAuthority),
            _ => None,
        }
    }
}

/// Consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Mode, fixed for the lifetime of a ledger
    pub mode: ConsensusMode,

    /// Leading `'0'` hex characters required (proof-of-work only)
    pub difficulty: u32,

    /// Bound on hash attempts per block; `None` searches forever
    pub max_pow_attempts: Option<u64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            mode: ConsensusMode::ProofOfAuthority,
            difficulty: 2,
            max_pow_attempts: None,
        }
    }
}

/// Pending pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum queued transactions; `None` is unbounded
    pub max_pending: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pending: Some(10_000),
        }
    }
}

/// Genesis block configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Message carried by the genesis transaction
    pub message: String,

    /// Actor of the genesis transaction
    pub actor_id: String,

    /// Producer recorded on the genesis block
    pub producer_id: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            message: "E-Ledger Genesis Block".to_string(),
            actor_id: "0000000000000".to_string(),
            producer_id: "SYSTEM_VALIDATOR".to_string(),
        }
    }
}

/// Writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(mode) = std::env::var("LEDGER_CONSENSUS") {
            config.consensus.mode = ConsensusMode::parse(&mode).ok_or_else(|| {
                crate::Error::Config(format!("Unknown consensus mode: {}", mode))
            })?;
        }

        if let Ok(difficulty) = std::env::var("LEDGER_DIFFICULTY") {
            config.consensus.difficulty = parse_env("LEDGER_DIFFICULTY", &difficulty)?;
        }

        if let Ok(attempts) = std::env::var("LEDGER_MAX_POW_ATTEMPTS") {
            config.consensus.max_pow_attempts =
                Some(parse_env("LEDGER_MAX_POW_ATTEMPTS", &attempts)?);
        }

        if let Ok(max) = std::env::var("LEDGER_MAX_PENDING") {
            let max: usize = parse_env("LEDGER_MAX_PENDING", &max)?;
            config.pool.max_pending = if max == 0 { None } else { Some(max) };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.consensus.mode == ConsensusMode::ProofOfWork && self.consensus.difficulty > 64 {
            return Err(crate::Error::Config(format!(
                "difficulty {} exceeds the 64 hex characters of a digest",
                self.consensus.difficulty
            )));
        }

        if self.consensus.max_pow_attempts == Some(0) {
            return Err(crate::Error::Config(
                "max_pow_attempts must be at least 1".to_string(),
            ));
        }

        if self.pool.max_pending == Some(0) {
            return Err(crate::Error::Config(
                "max_pending must be at least 1".to_string(),
            ));
        }

        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }

        if self.genesis.producer_id.trim().is_empty() {
            return Err(crate::Error::Config(
                "genesis producer_id must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}
