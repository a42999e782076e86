//! Cryptographic primitives, canonical encoding, the Merkle engine, the
//! commit-reveal protocol and the Subset-Sum proof-of-work verifier.
//!
//! Everything in this crate is pure and deterministic: no I/O, no wall-clock
//! reads, no global state. Higher layers (`consensus-core`, `slashing`) build
//! on these types but never the reverse.

pub mod commitment;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod subsetsum;

pub use commitment::{proof_commitment, CommitmentLeaf, Reveal};
pub use crypto::{sha256, verify, KeyPair};
pub use encoding::LeWriter;
pub use error::{PrimitiveError, Result};
pub use hash::{Address, Hash, Signature};
pub use merkle::{Direction, MerkleProof, MerkleTree, ProofStep};
pub use subsetsum::{
    derive_problem, derive_seed, verify_exact, verify_fast, work_score, work_weight, Problem,
    Solution, Tier, VerifyBudget,
};
