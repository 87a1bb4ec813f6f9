//! Merkle tree over transaction digests
//!
//! # Design
//!
//! - Leaves are transaction digests (hex) in block order
//! - A parent is `sha256(left_hex || right_hex)`
//! - An odd level duplicates its last digest to complete the final pair
//! - One leaf: the root is that leaf; no leaves: `ZERO_HASH`
//!
//! The pairing rule has to match bit-for-bit for roots to interoperate.

use crate::{
    crypto::{digest_concat, ZERO_HASH},
    types::Transaction,
};
use serde::{Deserialize, Serialize};

/// Hash a pair of hex digests
fn hash_pair(left: &str, right: &str) -> String {
    digest_concat(&[left, right])
}

/// Merkle root of an ordered transaction list
pub fn merkle_root(transactions: &[Transaction]) -> String {
    MerkleTree::from_transactions(transactions).root()
}

/// Direction of sibling in Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

/// Merkle proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Leaf digest being proven
    pub leaf_hash: String,
    /// Position of the leaf
    pub leaf_index: usize,
    /// Sibling digests along the path to root
    pub siblings: Vec<(Direction, String)>,
    /// Root digest
    pub root_hash: String,
}

impl MerkleProof {
    /// Verify proof against its root hash
    pub fn verify(&self) -> bool {
        let mut current = self.leaf_hash.clone();

        for (direction, sibling) in &self.siblings {
            current = match direction {
                Direction::Left => hash_pair(sibling, &current),
                Direction::Right => hash_pair(&current, sibling),
            };
        }

        current == self.root_hash
    }
}

/// Merkle tree built from leaf digests
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<String>,
}

impl MerkleTree {
    /// Create tree from existing leaves
    pub fn from_leaves(leaves: Vec<String>) -> Self {
        Self { leaves }
    }

    /// Create tree whose leaves are the digests of `transactions`
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        Self::from_leaves(transactions.iter().map(Transaction::digest).collect())
    }

    /// Get number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Compute Merkle root
    pub fn root(&self) -> String {
        match self.leaves.len() {
            0 => ZERO_HASH.to_string(),
            1 => self.leaves[0].clone(),
            _ => {
                let mut level = self.leaves.clone();
                while level.len() > 1 {
                    level = next_level(&level);
                }
                level.remove(0)
            }
        }
    }

    /// Generate Merkle proof for the leaf at `leaf_index`
    pub fn proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf_hash = self.leaves.get(leaf_index)?.clone();
        let mut siblings = Vec::new();
        let mut level = self.leaves.clone();
        let mut index = leaf_index;

        while level.len() > 1 {
            let is_left = index % 2 == 0;
            let sibling = if is_left {
                // Odd tail pairs with itself
                level.get(index + 1).unwrap_or(&level[index]).clone()
            } else {
                level[index - 1].clone()
            };
            let direction = if is_left {
                Direction::Right
            } else {
                Direction::Left
            };
            siblings.push((direction, sibling));

            level = next_level(&level);
            index /= 2;
        }

        Some(MerkleProof {
            leaf_hash,
            leaf_index,
            siblings,
            root_hash: self.root(),
        })
    }
}

fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [last] => hash_pair(last, last),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest_hex;
    use crate::types::{FixedClock, Payload};
    use chrono::{TimeZone, Utc};

    fn leaf(data: &str) -> String {
        digest_hex(data.as_bytes())
    }

    fn tx(n: i64) -> Transaction {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        Transaction::create(Payload::new().with("seq", n), "ACTOR", &clock)
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::default();
        assert!(tree.is_empty());
        assert_eq!(tree.root(), ZERO_HASH);
        assert!(tree.proof(0).is_none());
        assert_eq!(merkle_root(&[]), ZERO_HASH);
    }

    #[test]
    fn test_single_leaf() {
        let t = tx(1);
        assert_eq!(merkle_root(std::slice::from_ref(&t)), t.digest());
    }

    #[test]
    fn test_four_leaves() {
        let leaves = vec![leaf("1"), leaf("2"), leaf("3"), leaf("4")];
        let tree = MerkleTree::from_leaves(leaves.clone());

        let h01 = hash_pair(&leaves[0], &leaves[1]);
        let h23 = hash_pair(&leaves[2], &leaves[3]);
        assert_eq!(tree.root(), hash_pair(&h01, &h23));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let leaves = vec![leaf("1"), leaf("2"), leaf("3")];
        let tree = MerkleTree::from_leaves(leaves.clone());

        let h01 = hash_pair(&leaves[0], &leaves[1]);
        let h22 = hash_pair(&leaves[2], &leaves[2]);
        assert_eq!(tree.root(), hash_pair(&h01, &h22));
    }

    #[test]
    fn test_three_transactions_match_four_with_duplicated_tail() {
        let txs = vec![tx(1), tx(2), tx(3)];
        let mut padded = txs.clone();
        padded.push(txs[2].clone());

        assert_eq!(merkle_root(&txs), merkle_root(&padded));
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let txs = vec![tx(1), tx(2)];
        let swapped = vec![tx(2), tx(1)];
        assert_ne!(merkle_root(&txs), merkle_root(&swapped));
        assert_eq!(merkle_root(&txs), merkle_root(&txs));
    }

    #[test]
    fn test_root_changes_with_payload() {
        let txs = vec![tx(1), tx(2), tx(3)];
        let changed = vec![tx(1), tx(20), tx(3)];
        assert_ne!(merkle_root(&txs), merkle_root(&changed));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in 1..=7 {
            let leaves: Vec<String> = (0..n).map(|i| leaf(&i.to_string())).collect();
            let tree = MerkleTree::from_leaves(leaves.clone());

            for (i, expected) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert_eq!(&proof.leaf_hash, expected);
                assert_eq!(proof.root_hash, tree.root());
                assert!(proof.verify(), "leaf {} of {}", i, n);
            }
            assert!(tree.proof(n).is_none());
        }
    }

    #[test]
    fn test_proof_verification_invalid() {
        let tree = MerkleTree::from_leaves(vec![leaf("1"), leaf("2")]);
        let mut proof = tree.proof(0).unwrap();
        assert_eq!(proof.siblings, vec![(Direction::Right, leaf("2"))]);

        proof.root_hash = leaf("fake_root");
        assert!(!proof.verify());
    }
}
