use thiserror::Error;

use chain_primitives::PrimitiveError;

/// The error taxonomy enumerated for the consensus core. Every validation
/// and state-transition entry point returns one of these rather than a
/// generic error — callers branch on the variant to decide whether to log,
/// slash, or retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid proof of work: {0}")]
    InvalidWork(String),

    #[error("invalid reveal: {0}")]
    InvalidReveal(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("unauthorized producer: {0}")]
    UnauthorizedProducer(String),

    #[error("block produced out of turn")]
    WrongTurn,

    #[error("parent block unknown")]
    OrphanBlock,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("reorg look-back budget exceeded")]
    ReorgBudgetExceeded,

    #[error("block already present")]
    DuplicateBlock,

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
