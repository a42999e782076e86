use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{PrimitiveError, Result};
use crate::hash::{Address, Hash, Signature};

/// Computes the single consensus hash function, `SHA-256`. Thin wrapper kept
/// so call sites read `crypto::sha256(...)` rather than reaching into `Hash`
/// directly — mirrors how the commitment and Merkle modules name their hash
/// calls.
#[must_use]
pub fn sha256(data: &[u8]) -> Hash {
    Hash::of(data)
}

/// An Ed25519 keypair. The signing key is zeroized on drop; only the
/// corresponding public key ever needs to outlive the pair.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.signing_key.zeroize();
    }
}

impl KeyPair {
    /// Generates a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing_key }
    }

    /// Reconstructs a keypair from a 32-byte seed, e.g. loaded from disk.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] =
            seed.try_into()
                .map_err(|_| PrimitiveError::InvalidKeySize {
                    expected: 32,
                    actual: seed.len(),
                })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature::from_bytes(sig.to_bytes())
    }
}

/// Verifies an Ed25519 signature over `message` made by `address`.
pub fn verify(address: &Address, message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(address.as_bytes())
        .map_err(|_| PrimitiveError::InvalidKeySize {
            expected: 32,
            actual: address.as_bytes().len(),
        })?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key
        .verify(message, &sig)
        .map_err(|_| PrimitiveError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = KeyPair::generate();
        let msg = b"a canonical transaction body";
        let sig = kp.sign(msg);
        verify(&kp.address(), msg, &sig).expect("signature must verify");
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original message");
        assert!(verify(&kp.address(), b"tampered message", &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let kp_a = KeyPair::generate();
        let kp_b = KeyPair::generate();
        let sig = kp_a.sign(b"message");
        assert!(verify(&kp_b.address(), b"message", &sig).is_err());
    }

    #[test]
    fn sha256_is_deterministic_and_matches_hash_of() {
        assert_eq!(sha256(b"x"), Hash::of(b"x"));
    }
}
