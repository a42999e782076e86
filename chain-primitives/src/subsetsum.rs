//! The proof-of-work core: derivation of commit-bound Subset-Sum instances
//! and their exact verification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PrimitiveError, Result};
use crate::hash::{Address, Hash};

/// Problem-size class. Each tier fixes the element-count window the
/// multiset must fall within; higher tiers are harder to search exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tier {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
}

impl Tier {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            _ => None,
        }
    }

    /// Inclusive `(min, max)` element-count window for the tier.
    #[must_use]
    pub fn element_window(self) -> (usize, usize) {
        match self {
            Self::One => (8, 12),
            Self::Two => (12, 16),
            Self::Three => (16, 20),
            Self::Four => (20, 24),
            Self::Five => (24, 32),
        }
    }

    /// Relative weight used in the work-score formula; higher tiers pay more
    /// per element found.
    #[must_use]
    pub fn weight(self) -> u64 {
        self as u64
    }

    fn contains(self, element_count: usize) -> bool {
        let (min, max) = self.element_window();
        (min..=max).contains(&element_count)
    }
}

/// Upper bound on the magnitude of a single multiset element, fixed so the
/// DP table (`O(T)` memory) stays bounded regardless of tier.
pub const MAX_ELEMENT_VALUE: u64 = 1 << 20;

/// Hard ceiling on bytes the exact DP verifier may allocate. Exceeding this
/// while checking an adversarial witness is a verifier-side rejection, not a
/// panic.
pub const VERIFY_MEMORY_CAP: usize = 64 * 1024 * 1024;

/// A committed Subset-Sum instance: `(multiset, target, tier)`. Entirely
/// determined by the inputs to [`derive_problem`] — no miner-chosen value
/// participates in its construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub multiset: Vec<u64>,
    pub target: u64,
    pub tier: Tier,
}

/// A claimed witness: the multiset of values the prover asserts sums to the
/// problem's target. Stored as values rather than indices so a reveal can be
/// checked against the instance without also transmitting positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub elements: Vec<u64>,
}

impl Solution {
    /// Canonical little-endian serialisation used as the binding preimage in
    /// the commitment module: `u32 count || elements sorted ascending as u64
    /// LE`. Sorting makes the encoding independent of discovery order.
    #[must_use]
    pub fn canonical_encoding(&self) -> Vec<u8> {
        let mut sorted = self.elements.clone();
        sorted.sort_unstable();
        let mut buf = Vec::with_capacity(4 + sorted.len() * 8);
        buf.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
        for value in sorted {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }
}

/// A deterministic byte stream keyed off a seed hash, used to expand the
/// anti-grinding seed into problem elements and a planted solution. Each
/// output word is `SHA-256(seed || counter_le)` truncated to 8 bytes.
struct Prf {
    seed: Hash,
    counter: u64,
}

impl Prf {
    fn new(seed: Hash) -> Self {
        Self { seed, counter: 0 }
    }

    fn next_u64(&mut self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(self.counter.to_le_bytes());
        self.counter += 1;
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(word)
    }

    fn next_in_range(&mut self, min_inclusive: u64, max_inclusive: u64) -> u64 {
        let span = max_inclusive - min_inclusive + 1;
        min_inclusive + self.next_u64() % span
    }
}

/// Derives the anti-grinding seed bound to a mining attempt:
/// `SHA-256(parent_header_hash || commit_epoch || miner_pubkey || commit_nonce)`.
#[must_use]
pub fn derive_seed(
    parent_header_hash: &Hash,
    commit_epoch: u64,
    miner_pubkey: &Address,
    commit_nonce: u64,
) -> Hash {
    let mut buf = Vec::with_capacity(32 + 8 + 32 + 8);
    buf.extend_from_slice(parent_header_hash.as_bytes());
    buf.extend_from_slice(&commit_epoch.to_le_bytes());
    buf.extend_from_slice(miner_pubkey.as_bytes());
    buf.extend_from_slice(&commit_nonce.to_le_bytes());
    Hash::of(&buf)
}

/// Expands an anti-grinding seed into a problem instance for `tier`. The
/// instance carries a planted solution so it is always satisfiable, but the
/// plant is not recoverable from the header alone — only by running the same
/// PRF from the matching seed, which requires knowing `commit_nonce` and
/// `commit_epoch` before they are revealed.
#[must_use]
pub fn derive_problem(seed: Hash, tier: Tier) -> Problem {
    let (min_count, max_count) = tier.element_window();
    let mut prf = Prf::new(seed);
    let span = (max_count - min_count + 1) as u64;
    let element_count = min_count + (prf.next_u64() % span) as usize;

    let multiset: Vec<u64> = (0..element_count)
        .map(|_| prf.next_in_range(1, MAX_ELEMENT_VALUE))
        .collect();

    let plant_size = 1 + (prf.next_u64() as usize % element_count);
    let mut indices: Vec<usize> = (0..element_count).collect();
    // Fisher-Yates using the same PRF, so the plant is fully determined by
    // `seed` and reproducible by anyone who knows it.
    for i in (1..indices.len()).rev() {
        let j = (prf.next_u64() as usize) % (i + 1);
        indices.swap(i, j);
    }
    let target: u64 = indices[..plant_size].iter().map(|&i| multiset[i]).sum();

    Problem {
        multiset,
        target,
        tier,
    }
}

/// Enforces the per-verification resource budget described by the consensus
/// core: a cap on DP table bytes and a cap on basic DP steps.
#[derive(Debug, Clone, Copy)]
pub struct VerifyBudget {
    pub max_memory_bytes: usize,
    pub max_dp_steps: u64,
}

impl Default for VerifyBudget {
    fn default() -> Self {
        Self {
            max_memory_bytes: VERIFY_MEMORY_CAP,
            max_dp_steps: 1 << 34,
        }
    }
}

/// Checks multiset containment: every value in `solution` occurs in
/// `problem` no more often than it occurs in the problem's multiset.
fn is_submultiset(problem: &[u64], solution: &[u64]) -> bool {
    let mut available: HashMap<u64, u64> = HashMap::new();
    for &value in problem {
        *available.entry(value).or_insert(0) += 1;
    }
    for &value in solution {
        match available.get_mut(&value) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }
    true
}

/// Fast path: checks a claimed solution by summing it and checking multiset
/// containment, in `O(|S| log |M|)` time. Used when the witness is trusted
/// to be well-formed (e.g. self-produced blocks); the DP path in
/// [`verify_exact`] is the one light clients must run against untrusted
/// reveals.
#[must_use]
pub fn verify_fast(problem: &Problem, solution: &Solution) -> bool {
    if solution.elements.is_empty() {
        return false;
    }
    if !problem.tier.contains(problem.multiset.len()) {
        return false;
    }
    if !is_submultiset(&problem.multiset, &solution.elements) {
        return false;
    }
    solution.elements.iter().sum::<u64>() == problem.target
}

/// Exact verification via the standard 0/1 subset-sum dynamic program,
/// bounded by `budget`. Confirms the claimed witness is achievable from the
/// problem's multiset even when the prover's `solution` cannot be trusted —
/// i.e. it does not merely check the claimed subset, it confirms that *some*
/// exact DP reachability matches, in addition to the fast multiset check.
pub fn verify_exact(problem: &Problem, solution: &Solution, budget: &VerifyBudget) -> Result<()> {
    if solution.elements.is_empty() {
        return Err(PrimitiveError::InvalidProof("empty solution".into()));
    }
    if !problem.tier.contains(problem.multiset.len()) {
        return Err(PrimitiveError::InvalidProof(
            "multiset size outside tier window".into(),
        ));
    }
    if !is_submultiset(&problem.multiset, &solution.elements) {
        return Err(PrimitiveError::InvalidProof(
            "solution is not a submultiset of the problem".into(),
        ));
    }
    if solution.elements.iter().sum::<u64>() != problem.target {
        return Err(PrimitiveError::InvalidProof(
            "solution does not sum to target".into(),
        ));
    }

    let target = problem.target as usize;
    if target.saturating_add(1) > budget.max_memory_bytes {
        return Err(PrimitiveError::BudgetExceeded(format!(
            "target {target} exceeds memory cap {}",
            budget.max_memory_bytes
        )));
    }
    let steps = problem.multiset.len() as u64 * (target as u64 + 1);
    if steps > budget.max_dp_steps {
        return Err(PrimitiveError::BudgetExceeded(format!(
            "dp step count {steps} exceeds cap {}",
            budget.max_dp_steps
        )));
    }

    let mut reachable = vec![false; target + 1];
    reachable[0] = true;
    for &value in &problem.multiset {
        let value = value as usize;
        if value > target {
            continue;
        }
        for sum in (value..=target).rev() {
            if reachable[sum - value] {
                reachable[sum] = true;
            }
        }
    }
    if reachable[target] {
        Ok(())
    } else {
        Err(PrimitiveError::InvalidProof(
            "target is not reachable from the problem multiset".into(),
        ))
    }
}

/// Integer work score `W = tier_weight * |S| * floor(log2(T))`, used for
/// reward accounting and difficulty retargeting.
#[must_use]
pub fn work_score(problem: &Problem, solution: &Solution) -> u64 {
    let log2_target = if problem.target == 0 {
        0
    } else {
        u64::from(problem.target.ilog2())
    };
    problem.tier.weight() * solution.elements.len() as u64 * log2_target
}

/// `work_weight(difficulty_target) = 2^difficulty_target`, stored as `u128`
/// so cumulative work across a long chain cannot overflow.
#[must_use]
pub fn work_weight(difficulty_target: u64) -> u128 {
    1u128 << difficulty_target.min(127)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Hash {
        derive_seed(&Hash::of(b"parent"), 7, &Address::zero(), 42)
    }

    #[test]
    fn derived_problem_respects_tier_window() {
        for tier in [Tier::One, Tier::Two, Tier::Three, Tier::Four, Tier::Five] {
            let problem = derive_problem(seed(), tier);
            let (min, max) = tier.element_window();
            assert!(problem.multiset.len() >= min && problem.multiset.len() <= max);
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_problem(seed(), Tier::Three);
        let b = derive_problem(seed(), Tier::Three);
        assert_eq!(a, b);
    }

    #[test]
    fn different_nonce_yields_different_problem() {
        let other_seed = derive_seed(&Hash::of(b"parent"), 7, &Address::zero(), 43);
        let a = derive_problem(seed(), Tier::Three);
        let b = derive_problem(other_seed, Tier::Three);
        assert_ne!(a, b);
    }

    #[test]
    fn planted_solution_recovers_and_verifies() {
        let problem = derive_problem(seed(), Tier::Two);
        // Brute force is fine here: tier 2 windows are at most 16 elements.
        let n = problem.multiset.len();
        let mut found: Option<Vec<u64>> = None;
        'search: for mask in 1u32..(1u32 << n) {
            let mut sum = 0u64;
            let mut picked = Vec::new();
            for i in 0..n {
                if mask & (1 << i) != 0 {
                    sum += problem.multiset[i];
                    picked.push(problem.multiset[i]);
                }
            }
            if sum == problem.target {
                found = Some(picked);
                break 'search;
            }
        }
        let elements = found.expect("a planted solution must exist");
        let solution = Solution { elements };
        assert!(verify_fast(&problem, &solution));
        verify_exact(&problem, &solution, &VerifyBudget::default()).unwrap();
    }

    #[test]
    fn rejects_solution_not_in_multiset() {
        let problem = Problem {
            multiset: vec![2, 3, 5, 7, 11, 13, 17, 19],
            target: 9999,
            tier: Tier::One,
        };
        let solution = Solution {
            elements: vec![9999],
        };
        assert!(!verify_fast(&problem, &solution));
        assert!(verify_exact(&problem, &solution, &VerifyBudget::default()).is_err());
    }

    #[test]
    fn rejects_wrong_sum() {
        let problem = Problem {
            multiset: vec![2, 3, 5, 7, 11, 13, 17, 19],
            target: 10,
            tier: Tier::One,
        };
        let solution = Solution {
            elements: vec![2, 3, 7],
        };
        assert!(!verify_fast(&problem, &solution));
    }

    #[test]
    fn budget_rejects_oversized_target() {
        let problem = Problem {
            multiset: vec![1; 8],
            target: 8,
            tier: Tier::One,
        };
        let solution = Solution { elements: vec![1; 8] };
        let tiny_budget = VerifyBudget {
            max_memory_bytes: 4,
            max_dp_steps: 1 << 34,
        };
        assert!(matches!(
            verify_exact(&problem, &solution, &tiny_budget),
            Err(PrimitiveError::BudgetExceeded(_))
        ));
    }

    #[test]
    fn work_weight_is_power_of_two() {
        assert_eq!(work_weight(0), 1);
        assert_eq!(work_weight(10), 1024);
    }
}
