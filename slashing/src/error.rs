use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlashingError {
    #[error("validator {0} is unknown")]
    UnknownValidator(String),

    #[error("no active validators remain")]
    NoActiveValidators,
}

pub type Result<T> = std::result::Result<T, SlashingError>;
