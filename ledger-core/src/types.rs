//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic digests (canonical field order, sorted payload keys)
//! - Round-trip serialization (serde, camelCase field names)
//! - Immutability of derived fields (`id`, `pseudo_signature`, `hash`)

use crate::{
    crypto::{digest_concat, PlaceholderSigner},
    merkle::merkle_root,
    Error, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source of wall-clock time for transactions and blocks
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant (deterministic tests, replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Canonical timestamp text used in every digest input
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// One value inside a transaction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Unsigned integer above `i64::MAX`
    UInt(u64),
    /// Floating point
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Ordered list
    List(Vec<PayloadValue>),
    /// Nested map (keys kept sorted)
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Borrow as text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read as integer, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PayloadValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

impl From<i64> for PayloadValue {
    fn from(n: i64) -> Self {
        PayloadValue::Integer(n)
    }
}

impl From<u64> for PayloadValue {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(PayloadValue::UInt(n), PayloadValue::Integer)
    }
}

impl From<i32> for PayloadValue {
    fn from(n: i32) -> Self {
        PayloadValue::Integer(n as i64)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

impl From<f64> for PayloadValue {
    fn from(f: f64) -> Self {
        PayloadValue::Float(f)
    }
}

impl From<Vec<PayloadValue>> for PayloadValue {
    fn from(items: Vec<PayloadValue>) -> Self {
        PayloadValue::List(items)
    }
}

/// Opaque key-value payload of a transaction
///
/// Keys are held in a `BTreeMap`, so the canonical serialization is
/// independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    /// Create empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.0.iter()
    }

    /// Build from an arbitrary JSON value; only objects are accepted
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidInput(
                "payload must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("payload: {}", e)))
    }

    /// Canonical JSON (sorted keys, no whitespace)
    pub fn canonical_json(&self) -> String {
        // String-keyed maps of these values always serialize
        serde_json::to_string(&self.0).expect("payload serialization cannot fail")
    }
}

impl FromIterator<(String, PayloadValue)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, PayloadValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One ledger event
///
/// `id` and `pseudo_signature` are derived at construction and never
/// assigned independently, hence the private fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: String,
    payload: Payload,
    actor_id: String,
    timestamp: DateTime<Utc>,
    pseudo_signature: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Transaction {
    /// Create a transaction stamped with the system clock
    pub fn new(payload: Payload, actor_id: impl Into<String>) -> Self {
        Self::create(payload, actor_id, &SystemClock)
    }

    /// Create a transaction stamped by `clock`
    pub fn create(payload: Payload, actor_id: impl Into<String>, clock: &dyn Clock) -> Self {
        Self::create_with_metadata(payload, actor_id, BTreeMap::new(), clock)
    }

    /// Create a transaction carrying metadata
    pub fn create_with_metadata(
        payload: Payload,
        actor_id: impl Into<String>,
        metadata: BTreeMap<String, String>,
        clock: &dyn Clock,
    ) -> Self {
        let actor_id = actor_id.into();
        let timestamp = clock.now();
        let ts = canonical_timestamp(&timestamp);

        let id = derive_id(&payload, &actor_id, &ts);
        let pseudo_signature = PlaceholderSigner.sign_parts(&[&id, &actor_id, &ts]);

        Self {
            id,
            payload,
            actor_id,
            timestamp,
            pseudo_signature,
            metadata,
        }
    }

    /// Transaction id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Acting identity
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Creation time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Stored pseudo signature
    pub fn pseudo_signature(&self) -> &str {
        &self.pseudo_signature
    }

    /// Metadata
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Re-derive id and pseudo signature from the stored fields and compare
    pub fn verify_signature(&self) -> bool {
        let ts = canonical_timestamp(&self.timestamp);
        let id = derive_id(&self.payload, &self.actor_id, &ts);

        id == self.id
            && PlaceholderSigner.verify_parts(&[&id, &self.actor_id, &ts], &self.pseudo_signature)
    }

    /// Leaf digest used by the Merkle tree
    pub fn digest(&self) -> String {
        let ts = canonical_timestamp(&self.timestamp);
        // BTreeMap<String, String> always serializes
        let metadata =
            serde_json::to_string(&self.metadata).expect("metadata serialization cannot fail");

        digest_concat(&[
            &self.id,
            &self.actor_id,
            &ts,
            &self.pseudo_signature,
            &metadata,
            &self.payload.canonical_json(),
        ])
    }
}

fn derive_id(payload: &Payload, actor_id: &str, ts: &str) -> String {
    digest_concat(&[&payload.canonical_json(), actor_id, ts])
}

/// Block before consensus: every header field set except `hash`/`nonce`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDraft {
    /// Height
    pub index: u64,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Hash of the block this one extends
    pub previous_hash: String,
    /// Transactions in Merkle leaf order
    pub transactions: Vec<Transaction>,
    /// Merkle root of `transactions`
    pub merkle_root: String,
    /// Identity finalizing the block
    pub producer_id: String,
}

impl BlockDraft {
    /// Build a draft and compute its Merkle root
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        transactions: Vec<Transaction>,
        producer_id: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        let merkle_root = merkle_root(&transactions);
        Self {
            index,
            timestamp: clock.now(),
            previous_hash: previous_hash.into(),
            transactions,
            merkle_root,
            producer_id: producer_id.into(),
        }
    }

    /// Turn into a block with the given search parameters; hash and
    /// producer signature are left empty for the strategy to stamp
    pub(crate) fn into_block(self, nonce: u64, difficulty: u32) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            hash: String::new(),
            nonce,
            merkle_root: self.merkle_root,
            difficulty,
            producer_id: self.producer_id,
            producer_signature: String::new(),
        }
    }
}

/// Finalized block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height (genesis = 0)
    pub index: u64,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    /// Transactions, in Merkle leaf order
    pub transactions: Vec<Transaction>,

    /// Hash of previous block (`ZERO_HASH` for genesis)
    pub previous_hash: String,

    /// Hash of this block's canonical header
    pub hash: String,

    /// Proof-of-work counter (0 under authority mode)
    pub nonce: u64,

    /// Merkle root of `transactions`
    pub merkle_root: String,

    /// Leading-zero target (0 under authority mode)
    pub difficulty: u32,

    /// Identity that finalized the block
    pub producer_id: String,

    /// `digest(hash || producer_id)`
    pub producer_signature: String,
}

impl Block {
    /// Compute block hash
    ///
    /// Transactions are bound through `merkle_root`; the producer signature
    /// is derived from this hash and therefore excluded.
    pub fn compute_hash(&self) -> String {
        digest_concat(&[
            &self.index.to_string(),
            &canonical_timestamp(&self.timestamp),
            &self.previous_hash,
            &self.merkle_root,
            &self.nonce.to_string(),
            &self.difficulty.to_string(),
            &self.producer_id,
        ])
    }

    /// Producer signature expected for the stored hash and producer
    pub fn expected_producer_signature(&self) -> String {
        PlaceholderSigner.sign_parts(&[&self.hash, &self.producer_id])
    }

    /// Recompute the Merkle root from the stored transactions
    pub fn compute_merkle_root(&self) -> String {
        merkle_root(&self.transactions)
    }

    /// True for the block at height 0
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
