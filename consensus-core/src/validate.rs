use chain_primitives::subsetsum::{derive_problem, derive_seed, verify_exact, Tier, VerifyBudget};
use chain_primitives::{Address, MerkleTree};

use crate::block::Block;
use crate::builder::apply_block;
use crate::error::{ConsensusError, Result};
use crate::header::BlockHeader;
use crate::state::Storage;

pub const MAX_CLOCK_SKEW_SECS: i64 = 600;

/// The two ways a block's producer identity and proof of work can be
/// accepted. Every other validation step (§4.3 steps 1-3, 5-6) is identical
/// between modes; only step 4 branches.
pub trait IdentityAndWork {
    fn validate_identity_and_work(
        &self,
        block: &Block,
        parent: &BlockHeader,
    ) -> Result<()>;
}

/// Open/permissionless mode: identity is whoever solved the bound
/// Subset-Sum instance. No producer allowlist.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenWorkStrategy {
    pub verify_budget: VerifyBudget,
}

impl IdentityAndWork for OpenWorkStrategy {
    fn validate_identity_and_work(&self, block: &Block, parent: &BlockHeader) -> Result<()> {
        verify_proof_commitment(block)?;
        verify_subset_sum(block, parent, &self.verify_budget)
    }
}

/// Authority mode: the producer must be the validator scheduled for this
/// height by round-robin; work is still checked so an authority block can't
/// forge a commitment it never solved.
#[derive(Debug, Clone)]
pub struct AuthorityStrategy {
    pub validators: Vec<Address>,
    pub verify_budget: VerifyBudget,
}

impl IdentityAndWork for AuthorityStrategy {
    fn validate_identity_and_work(&self, block: &Block, parent: &BlockHeader) -> Result<()> {
        if self.validators.is_empty() {
            return Err(ConsensusError::UnauthorizedProducer(
                "no active validators".into(),
            ));
        }
        let scheduled = self.validators[(block.header.height as usize) % self.validators.len()];
        if scheduled != block.header.miner_pubkey {
            return Err(ConsensusError::WrongTurn);
        }
        verify_proof_commitment(block)?;
        verify_subset_sum(block, parent, &self.verify_budget)
    }
}

fn verify_proof_commitment(block: &Block) -> Result<()> {
    let expected = chain_primitives::commitment::proof_commitment(
        &block.header.commitments_root,
        block.header.commit_epoch,
        &block.header.miner_pubkey,
    );
    if expected != block.header.proof_commitment {
        return Err(ConsensusError::InvalidReveal(
            "proof_commitment does not match commitments_root".into(),
        ));
    }
    block
        .problem_metadata
        .reveal
        .verify(&block.header.commitments_root)
        .map_err(|e| ConsensusError::InvalidReveal(e.to_string()))
}

fn verify_subset_sum(block: &Block, parent: &BlockHeader, budget: &VerifyBudget) -> Result<()> {
    let tier = Tier::from_u8(block.header.tier)
        .ok_or_else(|| ConsensusError::InvalidHeader("tier out of range".into()))?;
    let seed = derive_seed(
        &parent.header_hash(),
        block.header.commit_epoch,
        &block.header.miner_pubkey,
        block.header.commit_nonce,
    );
    let expected_problem = derive_problem(seed, tier);
    if expected_problem != block.problem_metadata.problem {
        return Err(ConsensusError::InvalidWork(
            "problem instance does not match anti-grinding derivation".into(),
        ));
    }
    verify_exact(&expected_problem, &block.problem_metadata.reveal.witness, budget)
        .map_err(|e| ConsensusError::InvalidWork(e.to_string()))
}

/// Runs the full §4.3 validation pipeline against a candidate block and its
/// parent header, using `strategy` for the identity-and-work step. The
/// first failure is returned immediately; nothing here mutates `storage`
/// except the disposable fork used to recompute roots.
pub fn validate_block<S: Storage + Clone>(
    block: &Block,
    parent: &BlockHeader,
    storage: &S,
    strategy: &dyn IdentityAndWork,
    receiver_wall_clock: i64,
) -> Result<()> {
    if block.hash() != block.header.header_hash() {
        return Err(ConsensusError::InvalidHeader(
            "header hash does not match recomputation".into(),
        ));
    }
    if !block.header.extends_height(parent) {
        return Err(ConsensusError::InvalidHeader(
            "height does not extend parent".into(),
        ));
    }
    if block.header.parent_hash != parent.header_hash() {
        return Err(ConsensusError::InvalidHeader(
            "parent_hash does not match parent header".into(),
        ));
    }
    if !block.header.advances_time(parent) {
        return Err(ConsensusError::InvalidHeader(
            "timestamp does not advance".into(),
        ));
    }
    if block.header.timestamp - receiver_wall_clock > MAX_CLOCK_SKEW_SECS {
        return Err(ConsensusError::InvalidHeader(
            "timestamp too far in the future".into(),
        ));
    }

    strategy.validate_identity_and_work(block, parent)?;

    let mut fork = storage.clone();
    let recomputed_state_root = apply_block(&mut fork, block)?;
    if recomputed_state_root != block.header.state_root {
        return Err(ConsensusError::InvalidStateTransition(
            "state_root mismatch".into(),
        ));
    }
    let recomputed_tx_root = MerkleTree::build(
        &block
            .transactions
            .iter()
            .map(|tx| tx.tx_hash())
            .collect::<Vec<_>>(),
    )
    .root();
    if recomputed_tx_root != block.header.tx_root {
        return Err(ConsensusError::InvalidStateTransition(
            "tx_root mismatch".into(),
        ));
    }
    let recomputed_commitments_root =
        MerkleTree::build(&[block.problem_metadata.reveal.leaf.as_leaf_hash()]).root();
    if recomputed_commitments_root != block.header.commitments_root {
        return Err(ConsensusError::InvalidStateTransition(
            "commitments_root mismatch".into(),
        ));
    }

    let expected_work = parent.cumulative_work
        + chain_primitives::subsetsum::work_weight(block.header.difficulty_target);
    if block.header.cumulative_work != expected_work {
        return Err(ConsensusError::InvalidHeader(
            "cumulative_work does not match difficulty accumulation".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{OffchainCid, ProblemMetadata};
    use crate::builder::{build_block, BuildParams};
    use crate::mempool::InMemoryMempool;
    use crate::state::InMemoryStorage;
    use chain_primitives::commitment::CommitmentLeaf;
    use chain_primitives::subsetsum::{derive_problem, derive_seed, Solution};
    use chain_primitives::{Hash, KeyPair};

    fn solved_problem_metadata(
        parent_hash: &Hash,
        miner: &Address,
        commit_epoch: u64,
        commit_nonce: u64,
        tier: Tier,
    ) -> ProblemMetadata {
        let seed = derive_seed(parent_hash, commit_epoch, miner, commit_nonce);
        let problem = derive_problem(seed, tier);
        let n = problem.multiset.len();
        let mut witness = None;
        'search: for mask in 1u32..(1u32 << n) {
            let mut sum = 0u64;
            let mut picked = Vec::new();
            for i in 0..n {
                if mask & (1 << i) != 0 {
                    sum += problem.multiset[i];
                    picked.push(problem.multiset[i]);
                }
            }
            if sum == problem.target {
                witness = Some(picked);
                break 'search;
            }
        }
        let elements = witness.expect("planted solution exists");
        let solution = Solution { elements };
        let salt = [3u8; 32];
        let leaf = CommitmentLeaf::new(&seed, miner, commit_epoch, commit_nonce, &solution, &salt);
        let tree = MerkleTree::build(&[leaf.as_leaf_hash()]);
        let proof = tree.prove(0).unwrap();
        ProblemMetadata {
            problem,
            reveal: chain_primitives::Reveal {
                leaf,
                inclusion_proof: proof,
                salt,
                witness: solution,
            },
        }
    }

    fn genesis_header() -> BlockHeader {
        crate::block::Block::genesis(
            1,
            Hash::zero(),
            Hash::zero(),
            chain_primitives::subsetsum::Problem {
                multiset: vec![1, 2, 3, 4, 5, 6, 7, 8],
                target: 1,
                tier: Tier::One,
            },
            dummy_reveal(),
            OffchainCid::new("bafy-genesis").unwrap(),
            0,
        )
        .header
    }

    fn dummy_reveal() -> chain_primitives::Reveal {
        use chain_primitives::commitment::CommitmentLeaf;
        let witness = Solution { elements: vec![1] };
        let salt = [0u8; 32];
        let leaf = CommitmentLeaf::new(&Hash::zero(), &Address::zero(), 0, 0, &witness, &salt);
        let tree = MerkleTree::build(&[leaf.as_leaf_hash()]);
        chain_primitives::Reveal {
            leaf,
            inclusion_proof: tree.prove(0).unwrap(),
            salt,
            witness,
        }
    }

    #[test]
    fn valid_open_mode_block_passes_full_pipeline() {
        let parent = genesis_header();
        let kp = KeyPair::generate();
        let miner = kp.address();
        let storage = InMemoryStorage::new();
        let mempool = InMemoryMempool::new();

        let metadata = solved_problem_metadata(&parent.header_hash(), &miner, 1, 0, Tier::One);
        let params = BuildParams {
            miner_pubkey: miner,
            commit_nonce: 0,
            commit_epoch: 1,
            difficulty_target: 1,
            problem_metadata: metadata,
            offchain_cid: OffchainCid::new("bafy-block-1").unwrap(),
            now: 10,
        };
        let block = build_block(&parent, &storage, &mempool, params).unwrap();

        let strategy = OpenWorkStrategy::default();
        validate_block(&block, &parent, &storage, &strategy, 10).expect("block must validate");
    }

    #[test]
    fn tampered_commitments_root_is_rejected() {
        let parent = genesis_header();
        let kp = KeyPair::generate();
        let miner = kp.address();
        let storage = InMemoryStorage::new();
        let mempool = InMemoryMempool::new();

        let metadata = solved_problem_metadata(&parent.header_hash(), &miner, 1, 0, Tier::One);
        let params = BuildParams {
            miner_pubkey: miner,
            commit_nonce: 0,
            commit_epoch: 1,
            difficulty_target: 1,
            problem_metadata: metadata,
            offchain_cid: OffchainCid::new("bafy-block-1").unwrap(),
            now: 10,
        };
        let mut block = build_block(&parent, &storage, &mempool, params).unwrap();
        block.header.commitments_root = Hash::of(b"forged");

        let strategy = OpenWorkStrategy::default();
        assert!(validate_block(&block, &parent, &storage, &strategy, 10).is_err());
    }

    #[test]
    fn authority_mode_rejects_out_of_turn_producer() {
        let parent = genesis_header();
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let miner = kp.address();
        let storage = InMemoryStorage::new();
        let mempool = InMemoryMempool::new();

        let metadata = solved_problem_metadata(&parent.header_hash(), &miner, 1, 0, Tier::One);
        let params = BuildParams {
            miner_pubkey: miner,
            commit_nonce: 0,
            commit_epoch: 1,
            difficulty_target: 1,
            problem_metadata: metadata,
            offchain_cid: OffchainCid::new("bafy-block-1").unwrap(),
            now: 10,
        };
        let block = build_block(&parent, &storage, &mempool, params).unwrap();

        let strategy = AuthorityStrategy {
            validators: vec![other.address()],
            verify_budget: VerifyBudget::default(),
        };
        assert!(matches!(
            validate_block(&block, &parent, &storage, &strategy, 10),
            Err(ConsensusError::WrongTurn)
        ));
    }
}
