//! Validator registry for authority mode
//!
//! Validators are kept in registration order, which is the rotation order.
//! Records are never removed, only deactivated, so every identity that ever
//! produced a block stays resolvable during chain validation.

use crate::{crypto::KeyPair, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registered validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    /// Identity (e.g. GLN)
    pub identity: String,
    /// Key material supplied at registration
    pub public_key_material: String,
    /// Whether this validator may currently produce blocks
    pub active: bool,
    /// Free-form role label
    pub role: String,
    /// Hex Ed25519 verifying key generated at registration
    pub verifying_key: String,
}

/// Authorized signers, their status, and the rotation cursor
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    validators: Vec<Validator>,
    /// Quick lookup by identity
    lookup: HashMap<String, usize>,
    /// Signing keys generated here; not part of snapshots
    keys: HashMap<String, KeyPair>,
    current_round: u64,
    threshold: usize,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            threshold: 1,
            ..Self::default()
        }
    }

    /// Rebuild from stored records (keys are not restored)
    pub fn from_records(records: Vec<Validator>, current_round: u64) -> Result<Self> {
        let mut registry = Self::new();
        for record in records {
            if registry.lookup.contains_key(&record.identity) {
                return Err(Error::DuplicateValidator(record.identity));
            }
            registry
                .lookup
                .insert(record.identity.clone(), registry.validators.len());
            registry.validators.push(record);
        }
        registry.current_round = current_round;
        registry.recompute_threshold();
        Ok(registry)
    }

    /// Register a new active validator and generate its key pair
    pub fn register(
        &mut self,
        identity: impl Into<String>,
        public_key_material: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<&Validator> {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(Error::InvalidInput(
                "validator identity must not be empty".to_string(),
            ));
        }
        if self.lookup.contains_key(&identity) {
            return Err(Error::DuplicateValidator(identity));
        }

        let keypair = KeyPair::generate();
        let validator = Validator {
            identity: identity.clone(),
            public_key_material: public_key_material.into(),
            active: true,
            role: role.into(),
            verifying_key: keypair.public_key_hex(),
        };

        let position = self.validators.len();
        self.validators.push(validator);
        self.lookup.insert(identity.clone(), position);
        self.keys.insert(identity, keypair);
        self.recompute_threshold();

        tracing::info!(
            validator = %self.validators[position].identity,
            role = %self.validators[position].role,
            threshold = self.threshold,
            "validator registered"
        );

        Ok(&self.validators[position])
    }

    /// Mark a validator inactive; it stays resolvable
    pub fn deactivate(&mut self, identity: &str) -> Result<()> {
        let position = *self
            .lookup
            .get(identity)
            .ok_or_else(|| Error::ValidatorNotFound(identity.to_string()))?;

        self.validators[position].active = false;
        self.recompute_threshold();

        tracing::info!(validator = %identity, threshold = self.threshold, "validator deactivated");
        Ok(())
    }

    /// Get a validator record, active or not
    pub fn get(&self, identity: &str) -> Option<&Validator> {
        self.lookup.get(identity).map(|&idx| &self.validators[idx])
    }

    /// Whether `identity` was ever registered
    pub fn contains(&self, identity: &str) -> bool {
        self.lookup.contains_key(identity)
    }

    /// Whether `identity` is registered and active
    pub fn is_active(&self, identity: &str) -> bool {
        self.get(identity).map_or(false, |v| v.active)
    }

    /// All records in registration order
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Active validators in registration order
    pub fn active_validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter().filter(|v| v.active)
    }

    /// Number of active validators
    pub fn active_count(&self) -> usize {
        self.active_validators().count()
    }

    /// Number of validators ever registered
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// `floor(active / 2) + 1`
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Rotation calls served so far
    pub fn current_round(&self) -> u64 {
        self.current_round
    }

    /// Signing key generated for `identity` at registration
    pub fn signer(&self, identity: &str) -> Option<&KeyPair> {
        self.keys.get(identity)
    }

    /// Validator the next rotation call would return, without advancing
    pub fn peek_next(&self) -> Result<&str> {
        let active: Vec<&Validator> = self.active_validators().collect();
        if active.is_empty() {
            return Err(Error::NoActiveValidators);
        }

        let selected: &Validator = active[(self.current_round % active.len() as u64) as usize];
        Ok(&selected.identity)
    }

    /// Round-robin over active validators; advances the round
    pub fn next_in_rotation(&mut self) -> Result<String> {
        let identity = self.peek_next()?.to_string();
        self.current_round += 1;
        Ok(identity)
    }

    fn recompute_threshold(&mut self) {
        self.threshold = self.active_count() / 2 + 1;
    }
}
