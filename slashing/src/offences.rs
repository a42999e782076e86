use serde::{Deserialize, Serialize};

use chain_primitives::Address;

/// A validator protocol violation recognised by the authority-mode slashing
/// manager, with the fixed severity it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offence {
    /// Two distinct valid blocks signed by the same validator at the same height.
    DoubleSign,
    /// Block rejected by the validation pipeline.
    InvalidBlock,
    /// Block produced when another validator was scheduled.
    WrongTurn,
    /// Consecutive missed slots exceeded the liveness threshold.
    Liveness,
}

impl Offence {
    #[must_use]
    pub fn severity(self) -> u32 {
        match self {
            Self::DoubleSign => 10,
            Self::InvalidBlock => 5,
            Self::WrongTurn => 3,
            Self::Liveness => 1,
        }
    }
}

/// A compact evidence tuple: `(validator, offence, height, evidence_bytes,
/// timestamp, severity)`. Append-only; recorded verbatim for audit even
/// though the manager only needs `severity` to update state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub validator: Address,
    pub offence: Offence,
    pub height: u64,
    pub evidence_bytes: Vec<u8>,
    pub timestamp: i64,
    pub severity: u32,
}

impl Evidence {
    #[must_use]
    pub fn new(validator: Address, offence: Offence, height: u64, evidence_bytes: Vec<u8>, timestamp: i64) -> Self {
        Self {
            validator,
            offence,
            height,
            evidence_bytes,
            timestamp,
            severity: offence.severity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_match_the_offence_table() {
        assert_eq!(Offence::DoubleSign.severity(), 10);
        assert_eq!(Offence::InvalidBlock.severity(), 5);
        assert_eq!(Offence::WrongTurn.severity(), 3);
        assert_eq!(Offence::Liveness.severity(), 1);
    }
}
