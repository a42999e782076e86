use serde::{Deserialize, Serialize};

use chain_primitives::encoding::LeWriter;
use chain_primitives::{verify, Address, Hash, KeyPair, Signature};

use crate::error::{ConsensusError, Result};

pub const MIN_FEE: u64 = 1_000;

/// A signed transfer between accounts. `gas_limit * gas_price` is the fee
/// charged regardless of how much gas the transaction actually needs — the
/// core has no contract execution, so gas accounting exists purely as a fee
/// and block-size mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub codec_version: u8,
    pub tx_type: u8,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub data: Vec<u8>,
    pub timestamp: i64,
    pub signature: Signature,
}

impl Transaction {
    /// Canonical signing message: every field except the signature itself,
    /// in field order, little-endian, with `data` length-prefixed.
    #[must_use]
    pub fn signing_message(&self) -> Vec<u8> {
        let mut w = LeWriter::new();
        w.u8(self.codec_version)
            .u8(self.tx_type)
            .bytes(self.from.as_bytes())
            .bytes(self.to.as_bytes())
            .u64(self.amount)
            .u64(self.nonce)
            .u64(self.gas_limit)
            .u64(self.gas_price)
            .bytes_with_len(&self.data)
            .i64(self.timestamp);
        w.finish()
    }

    #[must_use]
    pub fn tx_hash(&self) -> Hash {
        Hash::of(&self.signing_message())
    }

    /// Encoding used inside a canonical block body: the signing message
    /// followed by the 64-byte signature.
    #[must_use]
    pub fn wire_encoding(&self) -> Vec<u8> {
        let mut buf = self.signing_message();
        buf.extend_from_slice(self.signature.as_bytes());
        buf
    }

    #[must_use]
    pub fn fee(&self) -> u64 {
        (self.gas_limit.saturating_mul(self.gas_price)).max(MIN_FEE)
    }

    /// Verifies the signature over the canonical signing message.
    pub fn verify_signature(&self) -> Result<()> {
        verify(&self.from, &self.signing_message(), &self.signature)
            .map_err(ConsensusError::Primitive)
    }

    /// Builds and signs a transaction with the given keypair.
    #[must_use]
    pub fn signed(
        codec_version: u8,
        tx_type: u8,
        keypair: &KeyPair,
        to: Address,
        amount: u64,
        nonce: u64,
        gas_limit: u64,
        gas_price: u64,
        data: Vec<u8>,
        timestamp: i64,
    ) -> Self {
        let mut tx = Self {
            codec_version,
            tx_type,
            from: keypair.address(),
            to,
            amount,
            nonce,
            gas_limit,
            gas_price,
            data,
            timestamp,
            signature: Signature::zero(),
        };
        tx.signature = keypair.sign(&tx.signing_message());
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_transaction_verifies() {
        let kp = KeyPair::generate();
        let tx = Transaction::signed(1, 0, &kp, Address::zero(), 1000, 0, 21_000, 5, vec![], 0);
        tx.verify_signature().expect("signature must verify");
    }

    #[test]
    fn mutated_transaction_fails_verification() {
        let kp = KeyPair::generate();
        let mut tx = Transaction::signed(1, 0, &kp, Address::zero(), 1000, 0, 21_000, 5, vec![], 0);
        tx.amount = 2000;
        assert!(tx.verify_signature().is_err());
    }

    #[test]
    fn fee_is_floored_at_min_fee() {
        let kp = KeyPair::generate();
        let tx = Transaction::signed(1, 0, &kp, Address::zero(), 0, 0, 1, 1, vec![], 0);
        assert_eq!(tx.fee(), MIN_FEE);
    }

    #[test]
    fn tx_hash_is_stable_for_identical_contents() {
        let kp = KeyPair::generate();
        let tx = Transaction::signed(1, 0, &kp, Address::zero(), 1000, 0, 21_000, 5, vec![], 0);
        assert_eq!(tx.tx_hash(), tx.tx_hash());
    }
}
