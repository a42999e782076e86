use std::collections::HashSet;

use chain_primitives::Address;

use crate::error::Result;
use crate::offences::Evidence;
use crate::validator::{ValidatorRegistry, ValidatorStatus, DEFAULT_JAIL_SECONDS};

pub const BAN_THRESHOLD: u32 = 100;

/// Tracks validator reputation and activation status, applying offences to
/// `ValidatorRegistry` and retaining every piece of evidence in an
/// append-only ledger. Offences can be recorded concurrently with chain
/// progress in a real node; this type itself assumes serialised access
/// behind its own lock.
pub struct SlashingManager {
    registry: ValidatorRegistry,
    ledger: Vec<Evidence>,
    seen: HashSet<Evidence>,
    jail_duration_secs: i64,
}

impl SlashingManager {
    #[must_use]
    pub fn new(validators: Vec<Address>) -> Self {
        Self {
            registry: ValidatorRegistry::new(validators),
            ledger: Vec::new(),
            seen: HashSet::new(),
            jail_duration_secs: DEFAULT_JAIL_SECONDS,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn status(&self, address: &Address) -> Option<&ValidatorStatus> {
        self.registry.get(address)
    }

    #[must_use]
    pub fn ledger(&self) -> &[Evidence] {
        &self.ledger
    }

    /// Records an offence. Recording identical evidence a second time is a
    /// no-op — reputation and counters are left exactly as the first
    /// recording left them, satisfying slashing idempotence.
    pub fn record_offence(&mut self, evidence: Evidence, now: i64) -> Result<()> {
        if self.seen.contains(&evidence) {
            return Ok(());
        }

        let validator = self.registry.get_mut(&evidence.validator)?;
        validator.slash_count += 1;
        validator.total_severity += evidence.severity;
        validator.last_slash_time = Some(evidence.timestamp);
        if matches!(evidence.offence, crate::offences::Offence::InvalidBlock) {
            validator.invalid_blocks += 1;
        }

        let decrease = evidence.severity.saturating_mul(100);
        validator.reputation = validator.reputation.saturating_sub(decrease);
        validator.deactivate_if_below_threshold();

        let banned = validator.total_severity >= BAN_THRESHOLD;
        let address = evidence.validator;

        self.seen.insert(evidence.clone());
        self.ledger.push(evidence);

        if banned {
            self.registry.ban(&address)?;
        } else {
            self.registry.jail(&address, now, self.jail_duration_secs)?;
        }
        Ok(())
    }

    /// Called once per block a scheduled validator actually produces:
    /// resets its missed-slot counter and applies the reputation recovery
    /// step.
    pub fn record_produced_block(&mut self, address: &Address) -> Result<()> {
        let validator = self.registry.get_mut(address)?;
        validator.consecutive_missed = 0;
        validator.record_produced_block();
        Ok(())
    }

    /// Called when the scheduled validator misses its slot. Once
    /// consecutive misses exceed `threshold`, this raises a `Liveness`
    /// offence against itself (the manager only self-reports misses the
    /// caller attributes to this validator's own inaction).
    pub fn record_missed_slot(
        &mut self,
        address: &Address,
        height: u64,
        now: i64,
        threshold: u32,
    ) -> Result<Option<Evidence>> {
        let validator = self.registry.get_mut(address)?;
        validator.consecutive_missed += 1;
        if validator.consecutive_missed > threshold {
            let evidence = Evidence::new(
                *address,
                crate::offences::Offence::Liveness,
                height,
                Vec::new(),
                now,
            );
            self.record_offence(evidence.clone(), now)?;
            return Ok(Some(evidence));
        }
        Ok(None)
    }
}

// Evidence needs Hash/Eq for the `seen` de-duplication set. Derived here
// rather than on the type itself since only the manager cares about
// set membership.
impl std::hash::Hash for Evidence {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.validator.hash(state);
        (self.offence as u8).hash(state);
        self.height.hash(state);
        self.evidence_bytes.hash(state);
        self.timestamp.hash(state);
        self.severity.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offences::Offence;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn double_sign_jails_and_drops_reputation_to_zero() {
        let mut manager = SlashingManager::new(vec![addr(1), addr(2)]);
        let evidence = Evidence::new(addr(1), Offence::DoubleSign, 7, vec![], 1_000);
        manager.record_offence(evidence, 1_000).unwrap();

        let status = manager.status(&addr(1)).unwrap();
        assert_eq!(status.reputation, 0);
        assert_eq!(status.total_severity, 10);
        assert!(status.is_jailed(1_000));
    }

    #[test]
    fn recording_same_evidence_twice_is_idempotent() {
        let mut manager = SlashingManager::new(vec![addr(1)]);
        let evidence = Evidence::new(addr(1), Offence::WrongTurn, 5, vec![1, 2, 3], 500);
        manager.record_offence(evidence.clone(), 500).unwrap();
        let after_first = manager.status(&addr(1)).unwrap().clone();
        manager.record_offence(evidence, 500).unwrap();
        let after_second = manager.status(&addr(1)).unwrap().clone();
        assert_eq!(after_first, after_second);
        assert_eq!(manager.ledger().len(), 1);
    }

    #[test]
    fn total_severity_crossing_ban_threshold_bans_permanently() {
        let mut manager = SlashingManager::new(vec![addr(1)]);
        for i in 0..10 {
            let evidence = Evidence::new(addr(1), Offence::DoubleSign, i, vec![i as u8], 100 + i as i64);
            manager.record_offence(evidence, 100 + i as i64).unwrap();
        }
        assert!(manager.status(&addr(1)).unwrap().is_banned());
        assert!(manager.registry().active_validators(1_000_000).is_empty());
    }

    #[test]
    fn reputation_recovers_after_jail_and_one_produced_block() {
        let mut manager = SlashingManager::new(vec![addr(1), addr(2)]);
        let evidence = Evidence::new(addr(1), Offence::DoubleSign, 7, vec![], 0);
        manager.record_offence(evidence, 0).unwrap();
        manager.record_produced_block(&addr(1)).unwrap();
        let status = manager.status(&addr(1)).unwrap();
        assert_eq!(status.reputation, 10);
        assert!(!status.active);
    }
}
