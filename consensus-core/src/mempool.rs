use std::collections::BTreeMap;

use chain_primitives::Hash;

use crate::transaction::Transaction;

/// Result of attempting to insert a transaction into the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Accepted,
    Rejected,
}

/// The mempool contract: a snapshot-then-build interface so a builder never
/// observes transactions inserted after it started assembling a candidate.
pub trait Mempool {
    fn insert(&mut self, tx: Transaction, received_at: i64) -> InsertOutcome;
    fn remove(&mut self, tx_hash: &Hash);
    /// Returns up to `limit` transactions ordered by descending priority
    /// `gas_price * (1 + age_in_hours)`, ties broken by ascending `tx_hash`,
    /// stopping before the running gas total would exceed `gas_budget`.
    fn snapshot_top(&self, limit: usize, gas_budget: u64, now: i64) -> Vec<Transaction>;
}

struct Entry {
    tx: Transaction,
    received_at: i64,
}

/// A simple in-memory mempool keyed by transaction hash. Internally locked
/// in a real node (network layer and apply-block write, builder and API
/// read); this type itself is a plain, single-threaded structure — callers
/// wrap it in a mutex where concurrent access is needed.
#[derive(Default)]
pub struct InMemoryMempool {
    entries: BTreeMap<Hash, Entry>,
}

impl InMemoryMempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn priority(gas_price: u64, received_at: i64, now: i64) -> u64 {
    let age_hours = ((now - received_at).max(0) / 3600) as u64;
    gas_price.saturating_mul(1 + age_hours)
}

impl Mempool for InMemoryMempool {
    fn insert(&mut self, tx: Transaction, received_at: i64) -> InsertOutcome {
        if tx.verify_signature().is_err() {
            return InsertOutcome::Rejected;
        }
        self.entries.insert(tx.tx_hash(), Entry { tx, received_at });
        InsertOutcome::Accepted
    }

    fn remove(&mut self, tx_hash: &Hash) {
        self.entries.remove(tx_hash);
    }

    fn snapshot_top(&self, limit: usize, gas_budget: u64, now: i64) -> Vec<Transaction> {
        let mut candidates: Vec<&Entry> = self.entries.values().collect();
        candidates.sort_by(|a, b| {
            let pa = priority(a.tx.gas_price, a.received_at, now);
            let pb = priority(b.tx.gas_price, b.received_at, now);
            pb.cmp(&pa).then_with(|| a.tx.tx_hash().cmp(&b.tx.tx_hash()))
        });

        let mut selected = Vec::new();
        let mut gas_used = 0u64;
        for entry in candidates {
            if selected.len() >= limit {
                break;
            }
            let next_gas = gas_used.saturating_add(entry.tx.gas_limit);
            if next_gas > gas_budget {
                break;
            }
            gas_used = next_gas;
            selected.push(entry.tx.clone());
        }
        selected
    }
}
