//! Selection strategies

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks exactly one candidate from an already-filtered set.
pub trait Strategy<T>: Send + Sync {
    fn apply<'a>(&self, candidates: &'a [T]) -> Option<&'a T>;
}

/// Round-robin over a single shared counter.
///
/// The counter is fetched-and-incremented once per call, so concurrent
/// callers on the same instance still share one global ordering.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    counter: AtomicU64,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Strategy<T> for RoundRobinStrategy {
    fn apply<'a>(&self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        candidates.get((n % candidates.len() as u64) as usize)
    }
}

/// Uniform random pick.
pub struct RandomStrategy {
    rng: Mutex<StdRng>,
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for reproducible selection.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Strategy<T> for RandomStrategy {
    fn apply<'a>(&self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.rng.lock().gen_range(0..candidates.len());
        candidates.get(idx)
    }
}

/// Always the first candidate.
///
/// Combined with a fail filter this sticks to the first healthy candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoStrategy;

impl<T> Strategy<T> for FifoStrategy {
    fn apply<'a>(&self, candidates: &'a [T]) -> Option<&'a T> {
        candidates.first()
    }
}
