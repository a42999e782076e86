use std::collections::{BTreeMap, HashSet};

use chain_primitives::Hash;

use crate::builder::apply_block;
use crate::error::{ConsensusError, Result};
use crate::forkchoice::ForkChoice;
use crate::state::{SnapshotToken, Storage};

pub const REORG_LOOKBACK_CAP: u64 = 1_000;

/// Emitted once a reorg commits: the tip being abandoned, the tip taking its
/// place, and how many blocks back the engine had to walk to find their
/// common ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
    pub old_tip: Hash,
    pub new_tip: Hash,
    pub depth: u64,
}

/// Remembers a storage snapshot token taken right after each block commits,
/// so a reorg can rewind to any recent ancestor directly instead of
/// replaying the whole chain from genesis. This is the reverse-delta style
/// optimisation the state-transition design explicitly allows, as long as
/// the observable result after a reorg matches a from-genesis replay.
#[derive(Debug, Default)]
pub struct SnapshotLedger {
    by_height: BTreeMap<u64, SnapshotToken>,
}

impl SnapshotLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, height: u64, token: SnapshotToken) {
        self.by_height.insert(height, token);
        if self.by_height.len() as u64 > REORG_LOOKBACK_CAP {
            if let Some(&oldest) = self.by_height.keys().next() {
                self.by_height.remove(&oldest);
            }
        }
    }

    #[must_use]
    pub fn get(&self, height: u64) -> Option<SnapshotToken> {
        self.by_height.get(&height).copied()
    }
}

/// Walks both chains back from their tips, bounded to `look_back_cap`
/// levels, and returns the first hash common to both. `ReorgBudgetExceeded`
/// if no common ancestor is found within the budget.
fn find_common_ancestor(
    fork_choice: &ForkChoice,
    old_tip: Hash,
    new_tip: Hash,
    look_back_cap: u64,
) -> Result<Hash> {
    let mut old_ancestors = HashSet::new();
    let mut cursor = old_tip;
    old_ancestors.insert(cursor);
    for _ in 0..look_back_cap {
        match fork_choice.get(&cursor) {
            Some(block) if block.header.height == 0 => break,
            Some(block) => {
                cursor = block.header.parent_hash;
                old_ancestors.insert(cursor);
            }
            None => break,
        }
    }

    let mut cursor = new_tip;
    if old_ancestors.contains(&cursor) {
        return Ok(cursor);
    }
    for _ in 0..look_back_cap {
        let block = fork_choice.get(&cursor).ok_or(ConsensusError::OrphanBlock)?;
        if block.header.height == 0 {
            break;
        }
        cursor = block.header.parent_hash;
        if old_ancestors.contains(&cursor) {
            return Ok(cursor);
        }
    }

    Err(ConsensusError::ReorgBudgetExceeded)
}

/// Performs the atomic reorg: snapshot, rewind to the common ancestor,
/// forward-apply the new chain, and either commit or fully restore. Any
/// failure along the way leaves `storage` and `fork_choice` exactly as they
/// were before this call.
pub fn reorg<S: Storage>(
    fork_choice: &mut ForkChoice,
    storage: &mut S,
    ledger: &mut SnapshotLedger,
    new_tip_hash: Hash,
) -> Result<ReorgEvent> {
    let old_tip_hash = fork_choice.canonical_tip_hash();
    let before = storage.snapshot();

    let ancestor_hash = match find_common_ancestor(fork_choice, old_tip_hash, new_tip_hash, REORG_LOOKBACK_CAP)
    {
        Ok(hash) => hash,
        Err(e) => {
            storage.restore(before)?;
            return Err(e);
        }
    };
    let ancestor_height = fork_choice
        .get(&ancestor_hash)
        .map(|b| b.header.height)
        .ok_or(ConsensusError::OrphanBlock)?;

    let ancestor_token = match ledger.get(ancestor_height) {
        Some(token) => token,
        None => {
            storage.restore(before)?;
            return Err(ConsensusError::ReorgBudgetExceeded);
        }
    };

    if let Err(e) = storage.restore(ancestor_token) {
        storage.restore(before)?;
        return Err(e);
    }

    let mut chain_to_replay = Vec::new();
    let mut cursor = new_tip_hash;
    while cursor != ancestor_hash {
        let block = match fork_choice.get(&cursor) {
            Some(block) => block.clone(),
            None => {
                storage.restore(before)?;
                return Err(ConsensusError::OrphanBlock);
            }
        };
        cursor = block.header.parent_hash;
        chain_to_replay.push(block);
    }
    chain_to_replay.reverse();

    let depth = chain_to_replay.len() as u64;

    for block in &chain_to_replay {
        if let Err(e) = apply_block(storage, block) {
            storage.restore(before)?;
            return Err(e);
        }
        let token = storage.snapshot();
        ledger.record(block.header.height, token);
    }

    fork_choice.set_canonical_tip(new_tip_hash)?;

    Ok(ReorgEvent {
        old_tip: old_tip_hash,
        new_tip: new_tip_hash,
        depth,
    })
}
