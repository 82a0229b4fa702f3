//! Smooth weighted round-robin.
//!
//! Every position keeps a running score. Each call adds every item's weight to
//! its score, picks the highest score (lowest index wins ties) and subtracts the
//! total weight from the winner. Over any `sum(weights)` consecutive calls on a
//! stable slice each item is picked exactly `weight` times, interleaved rather
//! than in bursts.

use std::sync::{Mutex, PoisonError};

use super::{Balancer, Weighted};

#[derive(Debug, Default)]
pub struct SmoothWeighted {
    scores: Mutex<Vec<i64>>,
}

impl SmoothWeighted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop accumulated scores; the next call starts a fresh round.
    pub fn reset(&self) {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Balancer for SmoothWeighted {
    fn pick_index<T: Weighted>(&self, items: &[T]) -> Option<usize> {
        let total: i64 = items.iter().map(|i| i64::from(i.weight())).sum();
        if total == 0 {
            return None;
        }

        let mut scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        // A different slice length means a new round.
        if scores.len() != items.len() {
            scores.clear();
            scores.resize(items.len(), 0);
        }

        let mut best: Option<usize> = None;
        for (i, item) in items.iter().enumerate() {
            let w = i64::from(item.weight());
            if w == 0 {
                scores[i] = 0;
                continue;
            }
            scores[i] += w;
            if best.map_or(true, |b| scores[i] > scores[b]) {
                best = Some(i);
            }
        }

        let best = best?;
        scores[best] -= total;
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn frequencies_follow_weights_and_zero_is_never_picked() {
        let weights = [0u32, 1, 2, 3, 4, 5];
        let b = SmoothWeighted::new();
        let mut counts = [0u32; 6];
        for _ in 0..10_000 {
            counts[b.pick_index(&weights).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0, "weight-0 item must never be selected");
        let unit = counts[1] as f64;
        for w in 1..=5usize {
            let expected = 10_000.0 * w as f64 / 15.0;
            let got = counts[w] as f64;
            assert!(
                (got - expected).abs() <= expected * 0.10,
                "weight {}: got {}, expected ~{}",
                w,
                got,
                expected
            );
            let ratio = got / unit;
            assert!((ratio - w as f64).abs() <= w as f64 * 0.10, "ratio {} for weight {}", ratio, w);
        }
    }

    #[test]
    fn all_zero_or_empty_is_no_selection() {
        let b = SmoothWeighted::new();
        assert_eq!(b.pick_index(&[0u32, 0, 0]), None);
        let empty: [u32; 0] = [];
        assert_eq!(b.pick_index(&empty), None);
        assert!(b.next(&[0u32]).is_none());
    }

    #[test]
    fn interleaves_instead_of_bursting() {
        // Classic 5:1:1 case: a a b a c a a
        let b = SmoothWeighted::new();
        let weights = [5u32, 1, 1];
        let seq: Vec<usize> = (0..7).map(|_| b.pick_index(&weights).unwrap()).collect();
        assert_eq!(seq, vec![0, 0, 1, 0, 2, 0, 0]);
    }

    #[test]
    fn reset_starts_a_fresh_round() {
        let weights = [5u32, 1, 1];
        let b = SmoothWeighted::new();
        assert_eq!(b.pick_index(&weights), Some(0));
        assert_eq!(b.pick_index(&weights), Some(0));
        assert_eq!(b.pick_index(&weights), Some(1));
        b.reset();
        let seq: Vec<usize> = (0..7).filter_map(|_| b.pick_index(&weights)).collect();
        assert_eq!(seq, vec![0, 0, 1, 0, 2, 0, 0]);
    }

    #[test]
    fn exact_counts_per_full_cycle() {
        let b = SmoothWeighted::new();
        let weights = [3u32, 1, 2];
        let mut counts = [0u32; 3];
        for _ in 0..6 * 50 {
            counts[b.pick_index(&weights).unwrap()] += 1;
        }
        assert_eq!(counts, [150, 50, 100]);
    }

    #[test]
    fn length_change_starts_new_round() {
        let b = SmoothWeighted::new();
        b.pick_index(&[1u32, 5]);
        b.pick_index(&[1u32, 5]);
        // Fresh round on a 3-element slice: the heaviest wins the first pick.
        assert_eq!(b.pick_index(&[1u32, 1, 9]), Some(2));
    }

    #[test]
    fn item_dropping_to_zero_weight_is_skipped() {
        let b = SmoothWeighted::new();
        for _ in 0..5 {
            b.pick_index(&[4u32, 4]);
        }
        for _ in 0..20 {
            assert_eq!(b.pick_index(&[0u32, 4]), Some(1));
        }
    }

    #[test]
    fn concurrent_draws_keep_exact_proportions() {
        let b = Arc::new(SmoothWeighted::new());
        let weights = [1u32, 2, 3, 4];
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || {
                    let mut counts = [0u32; 4];
                    for _ in 0..2500 {
                        counts[b.pick_index(&weights).unwrap()] += 1;
                    }
                    counts
                })
            })
            .collect();
        let mut totals = [0u32; 4];
        for h in handles {
            for (t, c) in totals.iter_mut().zip(h.join().unwrap()) {
                *t += c;
            }
        }
        assert_eq!(totals, [1000, 2000, 3000, 4000]);
    }
}
