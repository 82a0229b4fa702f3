//! Round-robin selection: equal visitation frequency, weights ignored.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Balancer, Weighted};

/// Cycles through the slice one position per call. Weight-0 items are still visited.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart the cycle at position 0.
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }
}

impl Balancer for RoundRobin {
    fn pick_index<T: Weighted>(&self, items: &[T]) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        // fetch_add wraps at usize::MAX.
        let c = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(c % items.len())
    }
}
