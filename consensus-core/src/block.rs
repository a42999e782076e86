use serde::{Deserialize, Serialize};

use chain_primitives::encoding::LeWriter;
use chain_primitives::subsetsum::{Problem, Tier};
use chain_primitives::{Hash, Reveal};

use crate::error::{ConsensusError, Result};
use crate::header::BlockHeader;
use crate::transaction::Transaction;

/// A syntactically valid content identifier for the off-chain proof bundle.
/// The consensus core only requires that this resolves through *some*
/// external gateway; pinning and storage quorum live entirely outside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainCid(String);

impl OffchainCid {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > 256 || !raw.is_ascii() {
            return Err(ConsensusError::InvalidHeader(format!(
                "offchain_cid {raw:?} is not a syntactically valid identifier"
            )));
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The proof bundle reference attached to a block's mining attempt: the
/// derived problem instance and the commit-reveal proving it was solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemMetadata {
    pub problem: Problem,
    pub reveal: Reveal,
}

/// `(header, transactions, problem_metadata, offchain_cid)`. Immutable once
/// constructed; the header's roots are the only thing binding the body to
/// the hash that identifies the block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub problem_metadata: ProblemMetadata,
    pub offchain_cid: OffchainCid,
}

impl Block {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.header_hash()
    }

    /// Canonical block body: `u32 tx_count || [transactions]`, each
    /// transaction encoded as `message || signature`. This is what the
    /// tx-root Merkle tree is built over, one leaf per `SHA-256` of a
    /// transaction's wire encoding.
    #[must_use]
    pub fn canonical_body(&self) -> Vec<u8> {
        let mut w = LeWriter::new();
        w.u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            w.bytes(&tx.wire_encoding());
        }
        w.finish()
    }

    /// Builds the genesis block: `height=0`, `parent_hash=0x32`,
    /// `cumulative_work=0`, with the given configured difficulty target and
    /// an empty, self-consistent mining attempt (tier 1, vacuous commitment).
    #[must_use]
    pub fn genesis(
        difficulty_target: u64,
        commitments_root: Hash,
        state_root: Hash,
        problem: Problem,
        reveal: Reveal,
        offchain_cid: OffchainCid,
        timestamp: i64,
    ) -> Self {
        use chain_primitives::{commitment::proof_commitment, Address};

        let miner_pubkey = Address::zero();
        let commit_epoch = 0;
        let header = BlockHeader {
            version: 1,
            parent_hash: Hash::zero(),
            height: 0,
            timestamp,
            tx_root: Hash::zero(),
            state_root,
            commitments_root,
            difficulty_target,
            cumulative_work: 0,
            miner_pubkey,
            commit_nonce: 0,
            problem_type: 0,
            tier: Tier::One as u8,
            commit_epoch,
            proof_commitment: proof_commitment(&commitments_root, commit_epoch, &miner_pubkey),
            extra: [0u8; 32],
        };
        Self {
            header,
            transactions: Vec::new(),
            problem_metadata: ProblemMetadata { problem, reveal },
            offchain_cid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_primitives::commitment::CommitmentLeaf;
    use chain_primitives::merkle::MerkleTree;
    use chain_primitives::subsetsum::Solution;
    use chain_primitives::Address;

    fn trivial_reveal() -> (Problem, Reveal) {
        let problem = Problem {
            multiset: vec![1, 2, 3, 4, 5, 6, 7, 8],
            target: 10,
            tier: Tier::One,
        };
        let witness = Solution {
            elements: vec![2, 8],
        };
        let salt = [1u8; 32];
        let leaf = CommitmentLeaf::new(&Hash::zero(), &Address::zero(), 0, 0, &witness, &salt);
        let tree = MerkleTree::build(&[leaf.as_leaf_hash()]);
        let proof = tree.prove(0).unwrap();
        (
            problem,
            Reveal {
                leaf,
                inclusion_proof: proof,
                salt,
                witness,
            },
        )
    }

    #[test]
    fn genesis_has_expected_invariants() {
        let (problem, reveal) = trivial_reveal();
        let genesis = Block::genesis(
            1,
            Hash::zero(),
            Hash::zero(),
            problem,
            reveal,
            OffchainCid::new("bafy-genesis").unwrap(),
            0,
        );
        assert_eq!(genesis.header.height, 0);
        assert_eq!(genesis.header.parent_hash, Hash::zero());
        assert_eq!(genesis.header.cumulative_work, 0);
    }

    #[test]
    fn empty_body_has_zero_tx_count_prefix() {
        let (problem, reveal) = trivial_reveal();
        let genesis = Block::genesis(
            1,
            Hash::zero(),
            Hash::zero(),
            problem,
            reveal,
            OffchainCid::new("bafy-genesis").unwrap(),
            0,
        );
        let body = genesis.canonical_body();
        assert_eq!(&body[..4], &0u32.to_le_bytes());
    }

    #[test]
    fn rejects_empty_cid() {
        assert!(OffchainCid::new("").is_err());
    }
}
