use serde::{Deserialize, Serialize};

use crate::error::{PrimitiveError, Result};
use crate::hash::Hash;

/// Which side of its sibling a node sits on, recorded so an inclusion proof
/// can be replayed without re-deriving tree shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

/// One step of an inclusion proof: a sibling hash and which side it sits on
/// relative to the node being proved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash,
    pub direction: Direction,
}

/// A Merkle inclusion proof: the leaf's position-independent path of sibling
/// hashes from leaf to root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recomputes the root implied by this proof and compares it against
    /// `expected_root`.
    pub fn verify(&self, expected_root: &Hash) -> Result<()> {
        let mut current = self.leaf;
        for step in &self.steps {
            current = match step.direction {
                Direction::Left => Hash::combine(&step.sibling, &current),
                Direction::Right => Hash::combine(&current, &step.sibling),
            };
        }
        if &current == expected_root {
            Ok(())
        } else {
            Err(PrimitiveError::InvalidMerkleProof)
        }
    }
}

/// A binary Merkle tree over an ordered list of leaves. Odd levels duplicate
/// their last node rather than leaving it unpaired, matching the standard
/// Bitcoin-style construction.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds a tree from already-hashed leaves. Panics are avoided by
    /// treating an empty input as a tree whose root is the zero hash.
    #[must_use]
    pub fn build(leaves: &[Hash]) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: vec![vec![Hash::zero()]],
            };
        }

        let mut levels = vec![leaves.to_vec()];
        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut i = 0;
            while i < current.len() {
                let left = current[i];
                let right = if i + 1 < current.len() {
                    current[i + 1]
                } else {
                    current[i]
                };
                next.push(Hash::combine(&left, &right));
                i += 2;
            }
            levels.push(next);
        }
        Self { levels }
    }

    #[must_use]
    pub fn root(&self) -> Hash {
        self.levels.last().unwrap()[0]
    }

    /// Produces an inclusion proof for the leaf at `index`, or `None` if the
    /// index is out of range.
    #[must_use]
    pub fn prove(&self, index: usize) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        if index >= leaves.len() {
            return None;
        }

        let mut steps = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx]
            } else {
                level[idx]
            };
            let direction = if idx % 2 == 0 {
                Direction::Right
            } else {
                Direction::Left
            };
            steps.push(ProofStep { sibling, direction });
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: leaves[index],
            steps,
        })
    }
}
