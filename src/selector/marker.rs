//! Lock-free failure marker

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Failure counter and last-failure timestamp for one selectable endpoint.
///
/// `reset` only clears the count; the timestamp of the last failure is kept,
/// so health checks must look at both the count and the elapsed time.
#[derive(Debug, Default)]
pub struct FailMarker {
    /// Milliseconds since the unix epoch of the last `mark`.
    fail_time: AtomicU64,
    fail_count: AtomicU64,
}

impl FailMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last failure (the epoch if never marked).
    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.fail_time.load(Ordering::Acquire))
    }

    pub fn count(&self) -> u64 {
        self.fail_count.load(Ordering::Acquire)
    }

    /// Record one failure.
    pub fn mark(&self) {
        self.fail_count.fetch_add(1, Ordering::AcqRel);
        self.fail_time.store(now_millis(), Ordering::Release);
    }

    /// Clear the failure count.
    pub fn reset(&self) {
        self.fail_count.store(0, Ordering::Release);
    }

    /// Time since the last failure, zero if the clock went backwards.
    pub fn elapsed(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.time())
            .unwrap_or(Duration::ZERO)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_and_reset() {
        let marker = FailMarker::new();
        assert_eq!(marker.count(), 0);
        assert_eq!(marker.time(), UNIX_EPOCH);

        marker.mark();
        marker.mark();
        assert_eq!(marker.count(), 2);
        assert!(marker.elapsed() < Duration::from_secs(5));

        let failed_at = marker.time();
        marker.reset();
        assert_eq!(marker.count(), 0);
        // the timestamp is left stale
        assert_eq!(marker.time(), failed_at);
    }

    #[test]
    fn test_concurrent_marks() {
        let marker = Arc::new(FailMarker::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let marker = marker.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        marker.mark();
                    }
                });
            }
        });
        assert_eq!(marker.count(), 8000);
    }
}
