//! The commit-reveal protocol binding a miner's witness to a header before
//! it is disclosed.

use serde::{Deserialize, Serialize};

use crate::error::{PrimitiveError, Result};
use crate::hash::{Address, Hash};
use crate::merkle::MerkleProof;
use crate::subsetsum::Solution;

/// A 64-byte commitment leaf: `left(32) || right(32)`. `left` hides the
/// mining attempt (seed material, never reused across attempts); `right`
/// binds to the exact candidate answer the miner intends to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentLeaf {
    pub left: Hash,
    pub right: Hash,
}

impl CommitmentLeaf {
    /// Builds the hiding half: `SHA-256(seed || miner || commit_epoch || commit_nonce)`.
    #[must_use]
    pub fn hiding(seed: &Hash, miner: &Address, commit_epoch: u64, commit_nonce: u64) -> Hash {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 8);
        buf.extend_from_slice(seed.as_bytes());
        buf.extend_from_slice(miner.as_bytes());
        buf.extend_from_slice(&commit_epoch.to_le_bytes());
        buf.extend_from_slice(&commit_nonce.to_le_bytes());
        Hash::of(&buf)
    }

    /// Builds the binding half: `SHA-256(candidate_answer_serialised || salt)`.
    #[must_use]
    pub fn binding(candidate_answer: &Solution, salt: &[u8; 32]) -> Hash {
        let mut buf = candidate_answer.canonical_encoding();
        buf.extend_from_slice(salt);
        Hash::of(&buf)
    }

    /// Constructs a full leaf from its hiding and binding inputs.
    #[must_use]
    pub fn new(
        seed: &Hash,
        miner: &Address,
        commit_epoch: u64,
        commit_nonce: u64,
        candidate_answer: &Solution,
        salt: &[u8; 32],
    ) -> Self {
        Self {
            left: Self::hiding(seed, miner, commit_epoch, commit_nonce),
            right: Self::binding(candidate_answer, salt),
        }
    }

    /// The 64-byte wire encoding used as a Merkle leaf.
    #[must_use]
    pub fn as_leaf_hash(&self) -> Hash {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.left.as_bytes());
        buf[32..].copy_from_slice(self.right.as_bytes());
        Hash::of(&buf)
    }
}

/// Computes the header's `proof_commitment` field:
/// `SHA-256(commitments_root || commit_epoch || miner_pubkey)`.
#[must_use]
pub fn proof_commitment(commitments_root: &Hash, commit_epoch: u64, miner_pubkey: &Address) -> Hash {
    let mut buf = Vec::with_capacity(32 + 8 + 32);
    buf.extend_from_slice(commitments_root.as_bytes());
    buf.extend_from_slice(&commit_epoch.to_le_bytes());
    buf.extend_from_slice(miner_pubkey.as_bytes());
    Hash::of(&buf)
}

/// Everything a verifier needs to accept a reveal: the committed leaf, its
/// inclusion proof against `commitments_root`, the salt used for binding,
/// and the disclosed witness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reveal {
    pub leaf: CommitmentLeaf,
    pub inclusion_proof: MerkleProof,
    pub salt: [u8; 32],
    pub witness: Solution,
}

impl Reveal {
    /// Checks the reveal against a committed root: the Merkle proof must
    /// verify and the witness must reproduce the leaf's binding hash. Either
    /// failure is `InvalidBinding` per the commit-reveal rejection rules.
    pub fn verify(&self, commitments_root: &Hash) -> Result<()> {
        if self.inclusion_proof.leaf != self.leaf.as_leaf_hash() {
            return Err(PrimitiveError::InvalidBinding);
        }
        self.inclusion_proof
            .verify(commitments_root)
            .map_err(|_| PrimitiveError::InvalidBinding)?;

        let recomputed = CommitmentLeaf::binding(&self.witness, &self.salt);
        if recomputed != self.leaf.right {
            return Err(PrimitiveError::InvalidBinding);
        }
        Ok(())
    }
}
