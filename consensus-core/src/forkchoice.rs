use std::collections::HashMap;

use chain_primitives::Hash;

use crate::block::Block;
use crate::error::{ConsensusError, Result};
use crate::header::BlockHeader;
use crate::reorg::SnapshotLedger;
use crate::state::Storage;
use crate::validate::{validate_block, IdentityAndWork};

pub const MAX_CACHED_BLOCKS: usize = 100;
pub const MAX_TIP_LAG: u64 = 10;

/// `(block, height, total_weight)`, `total_weight` being the block's
/// `cumulative_work`.
#[derive(Debug, Clone)]
pub struct ChainTip {
    pub block_hash: Hash,
    pub height: u64,
    pub total_weight: u128,
}

impl ChainTip {
    fn of(block: &Block) -> Self {
        Self {
            block_hash: block.hash(),
            height: block.header.height,
            total_weight: block.header.cumulative_work,
        }
    }

    /// Fork choice is a pure function of `(cumulative_work, header_hash,
    /// timestamp)`: greatest work wins, ties broken by smaller header hash,
    /// then by earliest timestamp.
    fn outranks(&self, other: &ChainTip, self_header: &BlockHeader, other_header: &BlockHeader) -> bool {
        (self.total_weight, &other.block_hash, other_header.timestamp).cmp(&(
            other.total_weight,
            &self.block_hash,
            self_header.timestamp,
        )) == std::cmp::Ordering::Greater
    }
}

/// Tracks competing tips and the current canonical chain. Mutation is
/// guarded by the chain-write lock in a real node (the `ConsensusEngine`
/// wraps this); reads take a shared lock. This type itself assumes
/// single-threaded, serialised access.
pub struct ForkChoice {
    blocks: HashMap<Hash, Block>,
    tips: HashMap<Hash, ChainTip>,
    canonical_tip: Hash,
    canonical_height_floor: u64,
}

impl ForkChoice {
    /// Seeds fork choice with the genesis block as the sole canonical tip.
    #[must_use]
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let tip = ChainTip::of(&genesis);
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        let mut tips = HashMap::new();
        tips.insert(hash, tip);
        Self {
            blocks,
            tips,
            canonical_tip: hash,
            canonical_height_floor: 0,
        }
    }

    #[must_use]
    pub fn canonical_tip_hash(&self) -> Hash {
        self.canonical_tip
    }

    #[must_use]
    pub fn canonical_tip(&self) -> &Block {
        self.blocks.get(&self.canonical_tip).expect("canonical tip always present")
    }

    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// `add_block` per the fork-choice contract: rejects duplicates,
    /// requires a known parent, validates per the full pipeline, inserts as
    /// a new tip, prunes tips too far behind canonical, and reports whether
    /// the caller must now run a reorg.
    ///
    /// `storage` holds the state as of the *canonical* tip. When `block`
    /// extends a side chain, validation instead runs against the ancestor
    /// state recorded in `ledger` — a block must never be checked against
    /// the wrong parent's balances just because that parent isn't canonical.
    pub fn add_block<S: Storage + Clone>(
        &mut self,
        block: Block,
        storage: &S,
        ledger: &SnapshotLedger,
        strategy: &dyn IdentityAndWork,
        receiver_wall_clock: i64,
    ) -> Result<bool> {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Err(ConsensusError::DuplicateBlock);
        }

        let parent = self
            .blocks
            .get(&block.header.parent_hash)
            .map(|b| b.header.clone())
            .ok_or(ConsensusError::OrphanBlock)?;

        if block.header.parent_hash == self.canonical_tip {
            validate_block(&block, &parent, storage, strategy, receiver_wall_clock)?;
        } else {
            let token = ledger
                .get(parent.height)
                .ok_or(ConsensusError::ReorgBudgetExceeded)?;
            let mut ancestor_state = storage.clone();
            ancestor_state.restore(token)?;
            validate_block(&block, &parent, &ancestor_state, strategy, receiver_wall_clock)?;
        }

        let new_tip = ChainTip::of(&block);
        let canonical_header = self.canonical_tip().header.clone();
        let canonical = self
            .tips
            .get(&self.canonical_tip)
            .cloned()
            .unwrap_or_else(|| ChainTip::of(self.canonical_tip()));

        self.blocks.insert(hash, block.clone());
        self.tips.insert(hash, new_tip.clone());

        self.prune_lagging_tips();

        let reorg_required = new_tip.outranks(&canonical, &block.header, &canonical_header);
        Ok(reorg_required)
    }

    fn prune_lagging_tips(&mut self) {
        let canonical_height = self
            .tips
            .get(&self.canonical_tip)
            .map(|t| t.height)
            .unwrap_or(self.canonical_height_floor);

        self.tips.retain(|hash, tip| {
            *hash == self.canonical_tip || canonical_height.saturating_sub(tip.height) <= MAX_TIP_LAG
        });

        if self.blocks.len() > MAX_CACHED_BLOCKS {
            let floor = canonical_height.saturating_sub(MAX_CACHED_BLOCKS as u64);
            self.blocks.retain(|hash, block| {
                *hash == self.canonical_tip || block.header.height >= floor
            });
        }
    }

    /// Commits a new canonical tip after a successful reorg/extension.
    pub fn set_canonical_tip(&mut self, hash: Hash) -> Result<()> {
        if !self.blocks.contains_key(&hash) {
            return Err(ConsensusError::OrphanBlock);
        }
        self.canonical_tip = hash;
        self.canonical_height_floor = self.blocks[&hash].header.height;
        Ok(())
    }
}
