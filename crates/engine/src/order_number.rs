//! Human-readable order number generation.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Generates order numbers of the form `ORD-<UTC timestamp>-<sequence>`.
///
/// The sequence is process-monotonic, so numbers are unique within a process
/// even when the timestamp repeats; cross-process uniqueness is the
/// persistence boundary's responsibility.
#[derive(Debug, Default)]
pub struct OrderNumberGenerator {
    sequence: AtomicU64,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("ORD-{}-{seq:06}", now.format("%Y%m%d%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn numbers_carry_prefix_timestamp_and_sequence() {
        let generator = OrderNumberGenerator::new();
        let now = "2026-08-31T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(generator.next(now), "ORD-20260831120000-000001");
        assert_eq!(generator.next(now), "ORD-20260831120000-000002");
    }

    #[test]
    fn numbers_are_unique_under_concurrency() {
        let generator = Arc::new(OrderNumberGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| generator.next(Utc::now())).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for number in handle.join().unwrap() {
                assert!(seen.insert(number), "duplicate order number generated");
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
