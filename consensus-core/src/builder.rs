use chain_primitives::commitment::proof_commitment;
use chain_primitives::{Address, Hash, MerkleTree};

use crate::block::{Block, OffchainCid, ProblemMetadata};
use crate::error::{ConsensusError, Result};
use crate::header::BlockHeader;
use crate::mempool::Mempool;
use crate::state::{Account, Storage};
use crate::transaction::Transaction;

pub const MAX_TX_PER_BLOCK: usize = 1_000;
pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Reserved account that receives the burned share of every fee. Never
/// spendable in practice since nothing ever signs from it, but modelled as
/// an ordinary account so the state-root Merkle tree accounts for burned
/// value like any other balance.
pub const BURN_ADDRESS: Address = Address::from_bytes([0xEEu8; 32]);
pub const TREASURY_ADDRESS: Address = Address::from_bytes([0xFFu8; 32]);
pub const VALIDATOR_POOL_ADDRESS: Address = Address::from_bytes([0xFDu8; 32]);

/// Inputs specific to one mining attempt: everything the builder needs to
/// finish the header besides transaction selection and root computation.
pub struct BuildParams {
    pub miner_pubkey: Address,
    pub commit_nonce: u64,
    pub commit_epoch: u64,
    pub difficulty_target: u64,
    pub problem_metadata: ProblemMetadata,
    pub offchain_cid: OffchainCid,
    pub now: i64,
}

/// Canonical execution order: ascending `(from, nonce)`, ties broken by
/// `tx_hash` ascending. Selection order (by priority) and execution order
/// are deliberately different passes — see step 1 vs step 3 of transaction
/// selection.
fn canonical_order(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    txs.sort_by(|a, b| {
        a.from
            .cmp(&b.from)
            .then_with(|| a.nonce.cmp(&b.nonce))
            .then_with(|| a.tx_hash().cmp(&b.tx_hash()))
    });
    txs
}

/// Selects and orders transactions for a new block: top-priority from the
/// mempool up to `MAX_TX_PER_BLOCK` and `BLOCK_GAS_LIMIT`, then re-sorted
/// into canonical execution order so every node applies the same sequence
/// regardless of mempool insertion order.
fn select_transactions(mempool: &dyn Mempool, now: i64) -> Vec<Transaction> {
    let by_priority = mempool.snapshot_top(MAX_TX_PER_BLOCK, BLOCK_GAS_LIMIT, now);
    canonical_order(by_priority)
}

/// Computes the state root: a Merkle root over sorted account leaves,
/// ordered by address ascending.
fn state_root(storage: &dyn Storage) -> Hash {
    let mut accounts = storage.accounts_sorted();
    accounts.sort_by(|a, b| a.address.cmp(&b.address));
    let leaves: Vec<Hash> = accounts.iter().map(Account::state_leaf).collect();
    MerkleTree::build(&leaves).root()
}

fn tx_root(txs: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = txs.iter().map(Transaction::tx_hash).collect();
    MerkleTree::build(&leaves).root()
}

fn commitments_root(problem_metadata: &ProblemMetadata) -> Hash {
    MerkleTree::build(&[problem_metadata.reveal.leaf.as_leaf_hash()]).root()
}

/// Distributes a fee: 60% miner, 20% burn, 15% treasury, 5% validator pool,
/// integer division with the remainder assigned to burn.
#[must_use]
pub fn distribute_fee(fee: u64) -> (u64, u64, u64, u64) {
    let miner = fee * 60 / 100;
    let treasury = fee * 15 / 100;
    let validator_pool = fee * 5 / 100;
    let accounted = miner + treasury + validator_pool;
    let burn = fee - accounted;
    (miner, burn, treasury, validator_pool)
}

/// Builds a candidate block against `state`. The passed-in `storage` itself
/// is never mutated — transactions are applied to a disposable clone purely
/// to compute the post-apply `state_root` the header must carry (§4.2:
/// `apply_block` produces the block's `new_state_root`; the header is never
/// finalised against the pre-block root). Build failures (empty mempool when
/// one is required, unreadable state) are reported to the caller without
/// side effects on `storage`.
pub fn build_block<S: Storage + Clone>(
    parent: &BlockHeader,
    storage: &S,
    mempool: &dyn Mempool,
    params: BuildParams,
) -> Result<Block> {
    let txs = select_transactions(mempool, params.now);
    let tx_root_value = tx_root(&txs);
    let mut fork = storage.clone();
    let state_root_value =
        apply_transactions(&mut fork, &txs, params.miner_pubkey, parent.height + 1)?;
    let commitments_root_value = commitments_root(&params.problem_metadata);

    let header = BlockHeader {
        version: 1,
        parent_hash: parent.header_hash(),
        height: parent.height + 1,
        timestamp: params.now,
        tx_root: tx_root_value,
        state_root: state_root_value,
        commitments_root: commitments_root_value,
        difficulty_target: params.difficulty_target,
        cumulative_work: parent.cumulative_work
            + chain_primitives::subsetsum::work_weight(params.difficulty_target),
        miner_pubkey: params.miner_pubkey,
        commit_nonce: params.commit_nonce,
        problem_type: 0,
        tier: params.problem_metadata.problem.tier as u8,
        commit_epoch: params.commit_epoch,
        proof_commitment: proof_commitment(
            &commitments_root_value,
            params.commit_epoch,
            &params.miner_pubkey,
        ),
        extra: [0u8; 32],
    };

    Ok(Block {
        header,
        transactions: txs,
        problem_metadata: params.problem_metadata,
        offchain_cid: params.offchain_cid,
    })
}

/// Applies a block's transactions to `storage` in canonical order, crediting
/// fees and mutating account state. A transaction that fails its checks at
/// apply time is fatal for the whole block — a builder must never have
/// included it in the first place.
pub fn apply_block<S: Storage>(storage: &mut S, block: &Block) -> Result<Hash> {
    apply_transactions(
        storage,
        &block.transactions,
        block.header.miner_pubkey,
        block.header.height,
    )
}

/// The shared state-transition core: applies `txs` in the order given,
/// crediting fees to `miner` and stamping accounts with `height`, then
/// returns the resulting state root. Shared by `apply_block` (mutating the
/// canonical storage) and `build_block` (mutating a disposable clone to
/// learn the header's `state_root` before the block exists).
fn apply_transactions<S: Storage>(
    storage: &mut S,
    txs: &[Transaction],
    miner: Address,
    height: u64,
) -> Result<Hash> {
    for tx in txs {
        tx.verify_signature()?;

        let mut sender = storage
            .get_account(&tx.from)
            .ok_or_else(|| ConsensusError::InvalidStateTransition("unknown sender".into()))?;
        if sender.nonce != tx.nonce {
            return Err(ConsensusError::InvalidStateTransition(format!(
                "nonce mismatch: expected {}, got {}",
                sender.nonce, tx.nonce
            )));
        }
        let fee = tx.fee();
        let debit = tx
            .amount
            .checked_add(fee)
            .ok_or_else(|| ConsensusError::InvalidStateTransition("amount overflow".into()))?;
        if sender.balance < debit {
            return Err(ConsensusError::InvalidStateTransition(
                "insufficient balance".into(),
            ));
        }

        let mut recipient = storage
            .get_account(&tx.to)
            .unwrap_or_else(|| Account::new(tx.to, height));

        sender.balance -= debit;
        sender.nonce += 1;
        sender.updated_at = height;
        recipient.balance = recipient
            .balance
            .checked_add(tx.amount)
            .ok_or_else(|| ConsensusError::InvalidStateTransition("balance overflow".into()))?;
        recipient.updated_at = height;

        storage.put_account(sender);
        storage.put_account(recipient);

        let (miner_share, burn_share, treasury_share, pool_share) = distribute_fee(fee);
        credit(storage, miner, miner_share, height)?;
        credit(storage, BURN_ADDRESS, burn_share, height)?;
        credit(storage, TREASURY_ADDRESS, treasury_share, height)?;
        credit(storage, VALIDATOR_POOL_ADDRESS, pool_share, height)?;
    }

    Ok(state_root(storage))
}

fn credit<S: Storage>(storage: &mut S, address: Address, amount: u64, height: u64) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    let mut account = storage
        .get_account(&address)
        .unwrap_or_else(|| Account::new(address, height));
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| ConsensusError::InvalidStateTransition("balance overflow".into()))?;
    account.updated_at = height;
    storage.put_account(account);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::{InMemoryMempool, Mempool as _};
    use crate::state::InMemoryStorage;
    use chain_primitives::KeyPair;

    #[test]
    fn fee_distribution_sums_to_the_whole_fee() {
        let (miner, burn, treasury, pool) = distribute_fee(105_000);
        assert_eq!(miner + burn + treasury + pool, 105_000);
        assert_eq!(miner, 63_000);
        assert_eq!(treasury, 15_750);
        assert_eq!(pool, 5_250);
    }

    #[test]
    fn scenario_simple_extension_matches_expected_balances() {
        let kp = KeyPair::generate();
        let sender_addr = kp.address();
        let recipient_addr = Address::from_bytes([9u8; 32]);
        let miner_addr = Address::from_bytes([7u8; 32]);

        let mut storage = InMemoryStorage::new();
        storage.put_account(Account {
            address: sender_addr,
            balance: 1_000_000,
            nonce: 0,
            created_at: 0,
            updated_at: 0,
        });

        let tx = Transaction::signed(1, 0, &kp, recipient_addr, 1000, 0, 21_000, 5, vec![], 0);
        assert_eq!(tx.fee(), 105_000);

        let mut mempool = InMemoryMempool::new();
        mempool.insert(tx, 0);

        let block = Block {
            header: BlockHeader {
                version: 1,
                parent_hash: Hash::zero(),
                height: 1,
                timestamp: 1,
                tx_root: Hash::zero(),
                state_root: Hash::zero(),
                commitments_root: Hash::zero(),
                difficulty_target: 1,
                cumulative_work: 1,
                miner_pubkey: miner_addr,
                commit_nonce: 0,
                problem_type: 0,
                tier: 1,
                commit_epoch: 0,
                proof_commitment: Hash::zero(),
                extra: [0u8; 32],
            },
            transactions: mempool.snapshot_top(10, 1_000_000, 0),
            problem_metadata: crate::block::ProblemMetadata {
                problem: chain_primitives::subsetsum::Problem {
                    multiset: vec![1, 2, 3, 4, 5, 6, 7, 8],
                    target: 1,
                    tier: chain_primitives::subsetsum::Tier::One,
                },
                reveal: dummy_reveal(),
            },
            offchain_cid: OffchainCid::new("bafy-test").unwrap(),
        };

        apply_block(&mut storage, &block).expect("apply must succeed");

        let sender_after = storage.get_account(&sender_addr).unwrap();
        let recipient_after = storage.get_account(&recipient_addr).unwrap();
        let miner_after = storage.get_account(&miner_addr).unwrap();
        let burn_after = storage.get_account(&BURN_ADDRESS).unwrap();
        let treasury_after = storage.get_account(&TREASURY_ADDRESS).unwrap();
        let pool_after = storage.get_account(&VALIDATOR_POOL_ADDRESS).unwrap();

        assert_eq!(sender_after.balance, 1_000_000 - 1000 - 105_000);
        assert_eq!(recipient_after.balance, 1000);
        assert_eq!(miner_after.balance, 63_000);
        assert_eq!(burn_after.balance, 21_000);
        assert_eq!(treasury_after.balance, 15_750);
        assert_eq!(pool_after.balance, 5_250);
    }

    fn dummy_reveal() -> chain_primitives::Reveal {
        use chain_primitives::commitment::CommitmentLeaf;
        use chain_primitives::subsetsum::Solution;
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
}
