//! Block and header model, state-transition function, mempool, fork-choice
//! and the atomic reorganisation engine.
//!
//! Built on `chain_primitives` for every consensus-visible hash, signature,
//! Merkle proof, and Subset-Sum check; this crate owns everything stateful
//! on top of those primitives.

pub mod block;
pub mod builder;
pub mod engine;
pub mod error;
pub mod forkchoice;
pub mod header;
pub mod mempool;
pub mod reorg;
pub mod state;
pub mod transaction;
pub mod validate;

pub use block::{Block, OffchainCid, ProblemMetadata};
pub use builder::{apply_block, build_block, distribute_fee, BuildParams};
pub use engine::ConsensusEngine;
pub use error::{ConsensusError, Result};
pub use forkchoice::{ChainTip, ForkChoice};
pub use header::BlockHeader;
pub use mempool::{InMemoryMempool, InsertOutcome, Mempool};
pub use reorg::{reorg, ReorgEvent, SnapshotLedger};
pub use state::{Account, Escrow, EscrowState, InMemoryStorage, SnapshotToken, Storage};
pub use transaction::Transaction;
pub use validate::{validate_block, AuthorityStrategy, IdentityAndWork, OpenWorkStrategy};
