//! Hashing and signing primitives
//!
//! This module provides:
//! - SHA-256 digests rendered as lowercase hex (the ledger's only digest form)
//! - The `Signer` capability with two implementations:
//!   `PlaceholderSigner` (hash-based pseudo signature) and `KeyPair` (Ed25519)

use ed25519_dalek::{Signature as DalekSignature, Signer as _, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Previous-hash of the genesis block and Merkle root of an empty block
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data` as 64 lowercase hex characters
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(hash_bytes(data))
}

/// Digest of the plain concatenation of `parts`
///
/// All derived identifiers (transaction ids, pseudo signatures, block
/// hashes, Merkle nodes) go through here.
pub fn digest_concat(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// True when the first `difficulty` hex characters of `hash` are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Signing capability
///
/// The ledger binds transactions and blocks to identities through this
/// trait so that the hash-based placeholder can be replaced by real
/// asymmetric signing without touching the ledger's call contract.
pub trait Signer {
    /// Sign `message`, returning a hex signature
    fn sign(&self, message: &[u8]) -> String;

    /// Check `signature` against `message`
    fn verify(&self, message: &[u8], signature: &str) -> bool;
}

/// Hash-based pseudo signature: `sign(m) = sha256(m)`
///
/// Offers no authenticity whatsoever. Anyone can recompute it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSigner;

impl PlaceholderSigner {
    /// Sign the concatenation of `parts`
    pub fn sign_parts(&self, parts: &[&str]) -> String {
        digest_concat(parts)
    }

    /// Verify a signature over the concatenation of `parts`
    pub fn verify_parts(&self, parts: &[&str], signature: &str) -> bool {
        digest_concat(parts) == signature
    }
}

impl Signer for PlaceholderSigner {
    fn sign(&self, message: &[u8]) -> String {
        digest_hex(message)
    }

    fn verify(&self, message: &[u8], signature: &str) -> bool {
        digest_hex(message) == signature
    }
}

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Public key as hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}

impl Signer for KeyPair {
    fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    fn verify(&self, message: &[u8], signature: &str) -> bool {
        verify_signature(message, signature, &self.public_key())
    }
}

/// Verify a hex Ed25519 signature with a public key
pub fn verify_signature(message: &[u8], signature: &str, public_key: &[u8; 32]) -> bool {
    let bytes: [u8; 64] = match hex::decode(signature).ok().and_then(|b| b.try_into().ok()) {
        Some(bytes) => bytes,
        None => return false,
    };

    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key
        .verify(message, &DalekSignature::from_bytes(&bytes))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            digest_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_concat_matches_joined_input() {
        assert_eq!(digest_concat(&["ab", "c"]), digest_hex(b"abc"));
        assert_eq!(digest_concat(&[]), digest_hex(b""));
    }

    #[test]
    fn test_zero_hash_shape() {
        assert_eq!(ZERO_HASH.len(), 64);
        assert!(ZERO_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn test_placeholder_signer() {
        let signer = PlaceholderSigner;
        let sig = signer.sign_parts(&["id", "actor", "ts"]);
        assert!(signer.verify_parts(&["id", "actor", "ts"], &sig));
        assert!(!signer.verify_parts(&["id", "actor", "ts2"], &sig));
        assert_eq!(signer.sign(b"idactorts"), sig);
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same keys
        assert_eq!(keypair1.public_key(), keypair2.public_key());
        assert_eq!(keypair1.public_key_hex().len(), 64);
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"block hash";

        let signature = keypair.sign(message);
        assert_eq!(signature.len(), 128);
        assert!(keypair.verify(message, &signature));
        assert!(!keypair.verify(b"other hash", &signature));

        let other = KeyPair::generate();
        assert!(!verify_signature(message, &signature, &other.public_key()));
        assert!(!verify_signature(message, "not-hex", &keypair.public_key()));
    }

    #[test]
    fn test_signers_are_interchangeable() {
        fn sign_and_check(signer: &dyn Signer) -> bool {
            let sig = signer.sign(b"payload");
            signer.verify(b"payload", &sig) && !signer.verify(b"tampered", &sig)
        }

        assert!(sign_and_check(&PlaceholderSigner));
        assert!(sign_and_check(&KeyPair::from_seed(&[7u8; 32])));
    }
}
