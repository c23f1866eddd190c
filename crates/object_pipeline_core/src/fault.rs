use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Value a draw from `[0, denominator)` must equal to trigger a fault.
pub const FAULT_SENTINEL: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
    Proceed,
    Inject,
}

impl FaultDecision {
    pub fn is_injected(self) -> bool {
        matches!(self, Self::Inject)
    }

    /// Picks the destination for the current call.
    pub fn target<'a>(self, real: &'a str, invalid: &'a str) -> &'a str {
        match self {
            Self::Proceed => real,
            Self::Inject => invalid,
        }
    }
}

/// Seeded generator shared by all invocations of one process.
///
/// Reproducibility is not a goal; the only contract is a long-run fault rate
/// of `1 / denominator`.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<StdRng>,
}

impl FaultInjector {
    /// Seeds from the wall clock at construction time.
    pub fn from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns true with probability `1 / denominator`; a zero denominator
    /// disables injection.
    pub fn should_fail(&self, denominator: u32) -> bool {
        if denominator == 0 {
            return false;
        }

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..denominator) == FAULT_SENTINEL
    }

    pub fn decide(&self, denominator: u32) -> FaultDecision {
        if self.should_fail(denominator) {
            FaultDecision::Inject
        } else {
            FaultDecision::Proceed
        }
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::from_clock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn long_run_rate_tracks_denominator() {
        let injector = FaultInjector::with_seed(42);
        let draws = 150_000;
        let failures = (0..draws).filter(|_| injector.should_fail(15)).count();

        // Expected 10_000; the binomial standard deviation is about 97.
        assert!(
            (9_500..=10_500).contains(&failures),
            "unexpected failure count {failures}"
        );
    }

    #[test]
    fn delete_rate_is_one_in_three() {
        let injector = FaultInjector::from_clock();
        let failures = (0..30_000).filter(|_| injector.should_fail(3)).count();

        assert!((9_400..=10_600).contains(&failures), "unexpected failure count {failures}");
    }

    #[test]
    fn zero_denominator_never_fails_and_one_always_fails() {
        let injector = FaultInjector::with_seed(7);

        assert!((0..1_000).all(|_| !injector.should_fail(0)));
        assert!((0..1_000).all(|_| injector.should_fail(1)));
    }

    #[test]
    fn decision_redirects_only_when_injected() {
        assert_eq!(FaultDecision::Proceed.target("in", "wrong"), "in");
        assert_eq!(FaultDecision::Inject.target("in", "wrong"), "wrong");
        assert!(FaultDecision::Inject.is_injected());
    }

    #[test]
    fn shared_injector_is_usable_across_threads() {
        let injector = Arc::new(FaultInjector::with_seed(3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let injector = Arc::clone(&injector);
                std::thread::spawn(move || (0..10_000).filter(|_| injector.should_fail(15)).count())
            })
            .collect();

        let total: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker should not panic"))
            .sum();
        assert!((2_300..=3_050).contains(&total), "unexpected failure count {total}");
    }
}
