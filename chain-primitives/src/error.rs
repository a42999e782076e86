use thiserror::Error;

/// Errors raised by the primitive layer: hashing, signatures, Merkle proofs,
/// commitments and the Subset-Sum verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("merkle proof does not verify")]
    InvalidMerkleProof,

    #[error("commitment binding check failed")]
    InvalidBinding,

    #[error("subset-sum proof is invalid: {0}")]
    InvalidProof(String),

    #[error("verification budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("malformed encoding: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, PrimitiveError>;
