use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use chain_primitives::encoding::LeWriter;
use chain_primitives::{Address, Hash};

use crate::error::{ConsensusError, Result};

/// `(address, balance, nonce, created_at, updated_at)`. `nonce` is the next
/// expected transaction nonce from this address; `balance` never goes
/// negative — debits beyond balance are rejected at apply time, not clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub nonce: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Account {
    #[must_use]
    pub fn new(address: Address, at_height: u64) -> Self {
        Self {
            address,
            balance: 0,
            nonce: 0,
            created_at: at_height,
            updated_at: at_height,
        }
    }

    /// The leaf preimage for the state-root Merkle tree:
    /// `address || balance_le || nonce_le`.
    #[must_use]
    pub fn state_leaf(&self) -> Hash {
        let mut w = LeWriter::new();
        w.bytes(self.address.as_bytes()).u64(self.balance).u64(self.nonce);
        Hash::of(&w.finish())
    }
}

/// Lifecycle of an escrowed amount locked against a submitted problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowState {
    Locked,
    Released,
    Refunded,
}

/// `(id, submitter, amount, problem_hash, created_block, expiry_block,
/// state, recipient?, settled_block?, settlement_tx?)`. Once settled
/// (`Released` or `Refunded`) the record is immutable — no further
/// transition is legal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: Hash,
    pub submitter: Address,
    pub amount: u64,
    pub problem_hash: Hash,
    pub created_block: u64,
    pub expiry_block: u64,
    pub state: EscrowState,
    pub recipient: Option<Address>,
    pub settled_block: Option<u64>,
    pub settlement_tx: Option<Hash>,
}

/// Minimum escrow size and the legal lock-duration window for a `Released`
/// transition, per the data model.
pub const MIN_ESCROW_RELEASE_AMOUNT: u64 = 1_000;
pub const MIN_ESCROW_DURATION_BLOCKS: u64 = 100;
pub const MAX_ESCROW_DURATION_BLOCKS: u64 = 100_000;

impl Escrow {
    #[must_use]
    pub fn id_for(submitter: &Address, problem_hash: &Hash, created_block: u64) -> Hash {
        let mut w = LeWriter::new();
        w.bytes(submitter.as_bytes())
            .bytes(problem_hash.as_bytes())
            .u64(created_block);
        Hash::of(&w.finish())
    }

    pub fn new(
        submitter: Address,
        amount: u64,
        problem_hash: Hash,
        created_block: u64,
        expiry_block: u64,
    ) -> Self {
        Self {
            id: Self::id_for(&submitter, &problem_hash, created_block),
            submitter,
            amount,
            problem_hash,
            created_block,
            expiry_block,
            state: EscrowState::Locked,
            recipient: None,
            settled_block: None,
            settlement_tx: None,
        }
    }

    /// `Locked -> Released`: legal only while locked, amount at least
    /// `MIN_ESCROW_RELEASE_AMOUNT`, and lock duration within the legal
    /// window.
    pub fn release(&mut self, recipient: Address, at_block: u64, settlement_tx: Hash) -> Result<()> {
        if self.state != EscrowState::Locked {
            return Err(ConsensusError::InvalidStateTransition(
                "escrow is not locked".into(),
            ));
        }
        let duration = at_block.saturating_sub(self.created_block);
        if self.amount < MIN_ESCROW_RELEASE_AMOUNT
            || !(MIN_ESCROW_DURATION_BLOCKS..=MAX_ESCROW_DURATION_BLOCKS).contains(&duration)
        {
            return Err(ConsensusError::InvalidStateTransition(
                "escrow release conditions not met".into(),
            ));
        }
        self.state = EscrowState::Released;
        self.recipient = Some(recipient);
        self.settled_block = Some(at_block);
        self.settlement_tx = Some(settlement_tx);
        Ok(())
    }

    /// `Locked -> Refunded`: legal once `current_block >= expiry_block`.
    pub fn refund(&mut self, current_block: u64) -> Result<()> {
        if self.state != EscrowState::Locked {
            return Err(ConsensusError::InvalidStateTransition(
                "escrow is not locked".into(),
            ));
        }
        if current_block < self.expiry_block {
            return Err(ConsensusError::InvalidStateTransition(
                "escrow has not expired".into(),
            ));
        }
        self.state = EscrowState::Refunded;
        self.settled_block = Some(current_block);
        Ok(())
    }
}

/// An opaque handle to a previously captured state image. Only the storage
/// implementation that issued it can resolve it back into a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotToken(u64);

/// The storage contract the consensus core depends on. Account and escrow
/// persistence beyond rollback support lives outside this crate; this trait
/// is the seam a real storage engine plugs into.
pub trait Storage {
    fn get_account(&self, address: &Address) -> Option<Account>;
    fn put_account(&mut self, account: Account);
    fn get_escrow(&self, id: &Hash) -> Option<Escrow>;
    fn put_escrow(&mut self, escrow: Escrow);
    fn accounts_sorted(&self) -> Vec<Account>;
    fn snapshot(&mut self) -> SnapshotToken;
    fn restore(&mut self, token: SnapshotToken) -> Result<()>;
    fn clear(&mut self);
}

/// A simple in-memory `Storage` implementation keyed by address/escrow id,
/// with snapshots held as full deep copies. Good enough for the consensus
/// core's own tests and a reference node; a production deployment plugs in
/// a durable implementation against the same trait.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    accounts: BTreeMap<Address, Account>,
    escrows: BTreeMap<Hash, Escrow>,
    snapshots: Vec<(BTreeMap<Address, Account>, BTreeMap<Hash, Escrow>)>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn get_account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    fn put_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    fn get_escrow(&self, id: &Hash) -> Option<Escrow> {
        self.escrows.get(id).cloned()
    }

    fn put_escrow(&mut self, escrow: Escrow) {
        self.escrows.insert(escrow.id, escrow);
    }

    fn accounts_sorted(&self) -> Vec<Account> {
        self.accounts.values().cloned().collect()
    }

    fn snapshot(&mut self) -> SnapshotToken {
        self.snapshots
            .push((self.accounts.clone(), self.escrows.clone()));
        SnapshotToken((self.snapshots.len() - 1) as u64)
    }

    fn restore(&mut self, token: SnapshotToken) -> Result<()> {
        let (accounts, escrows) = self
            .snapshots
            .get(token.0 as usize)
            .cloned()
            .ok_or_else(|| ConsensusError::StorageError("unknown snapshot token".into()))?;
        self.accounts = accounts;
        self.escrows = escrows;
        Ok(())
    }

    fn clear(&mut self) {
        self.accounts.clear();
        self.escrows.clear();
    }
}
