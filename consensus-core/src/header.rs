use serde::{Deserialize, Serialize};

use chain_primitives::encoding::LeWriter;
use chain_primitives::{Address, Hash};

/// The fixed-layout, canonical block header. Field order here is the wire
/// order: every integer is little-endian, hashes and the public key are raw
/// bytes, `extra` is a reserved pad for future fields so the layout never
/// needs to shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub parent_hash: Hash,
    pub height: u64,
    pub timestamp: i64,
    pub tx_root: Hash,
    pub state_root: Hash,
    pub commitments_root: Hash,
    pub difficulty_target: u64,
    pub cumulative_work: u128,
    pub miner_pubkey: Address,
    pub commit_nonce: u64,
    pub problem_type: u16,
    pub tier: u8,
    pub commit_epoch: u64,
    pub proof_commitment: Hash,
    pub extra: [u8; 32],
}

impl BlockHeader {
    /// Canonical byte encoding, in field declaration order, little-endian.
    /// This is the preimage for [`BlockHeader::header_hash`] and the only
    /// representation that may ever be hashed.
    #[must_use]
    pub fn canonical_encoding(&self) -> Vec<u8> {
        let mut w = LeWriter::new();
        w.u32(self.version)
            .bytes(self.parent_hash.as_bytes())
            .u64(self.height)
            .i64(self.timestamp)
            .bytes(self.tx_root.as_bytes())
            .bytes(self.state_root.as_bytes())
            .bytes(self.commitments_root.as_bytes())
            .u64(self.difficulty_target)
            .u128(self.cumulative_work)
            .bytes(self.miner_pubkey.as_bytes())
            .u64(self.commit_nonce)
            .u16(self.problem_type)
            .u8(self.tier)
            .u64(self.commit_epoch)
            .bytes(self.proof_commitment.as_bytes())
            .bytes(&self.extra);
        w.finish()
    }

    #[must_use]
    pub fn header_hash(&self) -> Hash {
        Hash::of(&self.canonical_encoding())
    }

    /// `height = parent.height + 1`.
    #[must_use]
    pub fn extends_height(&self, parent: &BlockHeader) -> bool {
        self.height == parent.height + 1
    }

    /// `timestamp > parent.timestamp`.
    #[must_use]
    pub fn advances_time(&self, parent: &BlockHeader) -> bool {
        self.timestamp > parent.timestamp
    }

    #[must_use]
    pub fn tier_in_range(&self) -> bool {
        (1..=5).contains(&self.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader {
            version: 1,
            parent_hash: Hash::zero(),
            height: 0,
            timestamp: 0,
            tx_root: Hash::zero(),
            state_root: Hash::zero(),
            commitments_root: Hash::zero(),
            difficulty_target: 1,
            cumulative_work: 0,
            miner_pubkey: Address::zero(),
            commit_nonce: 0,
            problem_type: 0,
            tier: 1,
            commit_epoch: 0,
            proof_commitment: Hash::zero(),
            extra: [0u8; 32],
        }
    }

    #[test]
    fn header_hash_is_deterministic() {
        let h = sample();
        assert_eq!(h.header_hash(), h.header_hash());
    }

    #[test]
    fn header_hash_changes_with_any_field() {
        let a = sample();
        let mut b = sample();
        b.commit_nonce = 1;
        assert_ne!(a.header_hash(), b.header_hash());
    }

    #[test]
    fn encoding_length_is_fixed() {
        let a = sample();
        let mut b = sample();
        b.height = 12345;
        b.cumulative_work = u128::MAX;
        assert_eq!(a.canonical_encoding().len(), b.canonical_encoding().len());
    }

    #[test]
    fn tier_range_validated() {
        let mut h = sample();
        assert!(h.tier_in_range());
        h.tier = 0;
        assert!(!h.tier_in_range());
        h.tier = 6;
        assert!(!h.tier_in_range());
    }
}
