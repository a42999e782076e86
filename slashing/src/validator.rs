use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use chain_primitives::Address;

use crate::error::{Result, SlashingError};

/// Reputation is tracked as permille (parts per thousand) rather than a
/// float, so it stays a consensus-safe integer: `1000` means reputation
/// `1.0`, `600` means `0.6`. Every probability in this module is expressed
/// the same way.
pub const REPUTATION_SCALE: u32 = 1_000;
pub const MIN_REPUTATION: u32 = 600;
pub const RECOVERY_PER_BLOCK: u32 = 10;
pub const DEFAULT_JAIL_SECONDS: i64 = 3_600;
pub const DEFAULT_LIVENESS_THRESHOLD: u32 = 10;

/// `(address, active, slash_count, total_severity, last_slash_time,
/// consecutive_missed, produced_blocks, invalid_blocks, reputation)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStatus {
    pub address: Address,
    pub active: bool,
    pub slash_count: u32,
    pub total_severity: u32,
    pub last_slash_time: Option<i64>,
    pub consecutive_missed: u32,
    pub produced_blocks: u64,
    pub invalid_blocks: u64,
    pub reputation: u32,
    jailed_until: Option<i64>,
    banned: bool,
}

impl ValidatorStatus {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            active: true,
            slash_count: 0,
            total_severity: 0,
            last_slash_time: None,
            consecutive_missed: 0,
            produced_blocks: 0,
            invalid_blocks: 0,
            reputation: REPUTATION_SCALE,
            jailed_until: None,
            banned: false,
        }
    }

    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.banned
    }

    #[must_use]
    pub fn is_jailed(&self, now: i64) -> bool {
        matches!(self.jailed_until, Some(until) if now < until)
    }

    /// Banned, or jailed, or deactivated by falling below `MIN_REPUTATION` —
    /// any of these exclude a validator from the round-robin schedule.
    #[must_use]
    pub fn is_eligible(&self, now: i64) -> bool {
        self.active && !self.banned && !self.is_jailed(now)
    }

    pub(crate) fn deactivate_if_below_threshold(&mut self) {
        if self.reputation < MIN_REPUTATION {
            self.active = false;
        }
    }

    /// Recovery step called once per block this validator produces:
    /// reputation rises by `RECOVERY_PER_BLOCK`, reactivating the validator
    /// once it clears `MIN_REPUTATION` again. Reactivation is independent of
    /// any current jail — a temporary jail and the reputation gate are
    /// orthogonal; `is_eligible` applies both.
    pub fn record_produced_block(&mut self) {
        self.produced_blocks += 1;
        self.reputation = (self.reputation + RECOVERY_PER_BLOCK).min(REPUTATION_SCALE);
        if self.reputation >= MIN_REPUTATION && !self.banned {
            self.active = true;
        }
    }
}

/// Tracks the authority set and the round-robin production schedule,
/// deterministically skipping banned or currently-jailed validators.
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<Address, ValidatorStatus>,
    order: Vec<Address>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new(addresses: Vec<Address>) -> Self {
        let mut validators = BTreeMap::new();
        for addr in &addresses {
            validators.insert(*addr, ValidatorStatus::new(*addr));
        }
        Self {
            validators,
            order: addresses,
        }
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&ValidatorStatus> {
        self.validators.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Result<&mut ValidatorStatus> {
        self.validators
            .get_mut(address)
            .ok_or_else(|| SlashingError::UnknownValidator(address.to_string()))
    }

    /// Validators excluding banned or currently-jailed members, in
    /// registration order — this is `active_validators`.
    #[must_use]
    pub fn active_validators(&self, now: i64) -> Vec<Address> {
        self.order
            .iter()
            .filter(|addr| {
                self.validators
                    .get(addr)
                    .map(|v| v.is_eligible(now))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// The validator scheduled for `height` by round-robin over the
    /// eligible set, or `None` if none are eligible.
    #[must_use]
    pub fn scheduled_producer(&self, height: u64, now: i64) -> Option<Address> {
        let active = self.active_validators(now);
        if active.is_empty() {
            return None;
        }
        Some(active[(height as usize) % active.len()])
    }

    /// Jailing is a temporary gate tracked by `jailed_until`, orthogonal to
    /// `active` (which tracks the reputation-based deactivation). A jailed
    /// validator is ineligible purely by `is_jailed(now)`, and becomes
    /// eligible again the instant `now` passes `jailed_until` without any
    /// explicit reactivation step.
    pub fn jail(&mut self, address: &Address, now: i64, duration_secs: i64) -> Result<()> {
        let v = self.get_mut(address)?;
        v.jailed_until = Some(now + duration_secs);
        Ok(())
    }

    pub fn ban(&mut self, address: &Address) -> Result<()> {
        let v = self.get_mut(address)?;
        v.banned = true;
        v.active = false;
        Ok(())
    }
}
