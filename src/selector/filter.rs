//! Candidate filters applied before a strategy picks

use std::time::Duration;

use tracing::trace;

use super::Selectable;

/// Fail timeout used when a filter is configured with a zero timeout.
pub const DEFAULT_FAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// Narrows a candidate set.
pub trait Filter<T>: Send + Sync {
    fn filter(&self, candidates: Vec<T>) -> Vec<T>;
}

/// Drops candidates that failed at least `max_fails` times within
/// `fail_timeout` of their last failure.
///
/// A single candidate is never filtered, and `max_fails == 0` disables the
/// filter. The result may be empty when every candidate is unhealthy.
#[derive(Debug, Clone, Copy)]
pub struct FailFilter {
    max_fails: u64,
    fail_timeout: Duration,
}

impl FailFilter {
    pub fn new(max_fails: u64, fail_timeout: Duration) -> Self {
        let fail_timeout = if fail_timeout.is_zero() {
            DEFAULT_FAIL_TIMEOUT
        } else {
            fail_timeout
        };
        Self {
            max_fails,
            fail_timeout,
        }
    }

    pub fn max_fails(&self) -> u64 {
        self.max_fails
    }

    pub fn fail_timeout(&self) -> Duration {
        self.fail_timeout
    }

    fn is_alive<T: Selectable>(&self, candidate: &T) -> bool {
        match candidate.marker() {
            Some(marker) => {
                marker.count() < self.max_fails || marker.elapsed() >= self.fail_timeout
            }
            None => true,
        }
    }
}

impl<T: Selectable + Send> Filter<T> for FailFilter {
    fn filter(&self, candidates: Vec<T>) -> Vec<T> {
        if candidates.len() <= 1 || self.max_fails == 0 {
            return candidates;
        }
        let before = candidates.len();
        let alive: Vec<T> = candidates.into_iter().filter(|c| self.is_alive(c)).collect();
        trace!("fail filter: {} of {} candidates alive", alive.len(), before);
        alive
    }
}
