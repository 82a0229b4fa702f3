//! `dispatch pick`: draw from a balancer and show how often each item won.

use anyhow::{bail, Result};
use dispatch_core::balancer::{Balancer, BalancerPool, Strategy};

pub fn run_pick(weights: &[u32], strategy: Strategy, draws: usize) -> Result<()> {
    let pool = BalancerPool::new(strategy);
    let counts = histogram(&pool, weights, draws);
    let selected: usize = counts.iter().sum();
    if selected == 0 && draws > 0 {
        bail!("no item is selectable with strategy {}", strategy);
    }

    let total_weight: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    println!("strategy {}  draws {}", strategy, draws);
    for (i, (&w, &n)) in weights.iter().zip(&counts).enumerate() {
        let share = 100.0 * n as f64 / selected.max(1) as f64;
        let ideal = match strategy {
            Strategy::RoundRobin => 100.0 / weights.len() as f64,
            Strategy::Weighted if total_weight > 0 => 100.0 * f64::from(w) / total_weight as f64,
            Strategy::Weighted => 0.0,
        };
        println!("  [{i}] weight {w:>4}  picked {n:>8}  {share:>6.2}%  (ideal {ideal:.2}%)");
    }
    Ok(())
}

fn histogram(pool: &BalancerPool, weights: &[u32], draws: usize) -> Vec<usize> {
    let mut counts = vec![0usize; weights.len()];
    for _ in 0..draws {
        match pool.pick_index(weights) {
            Some(i) => counts[i] += 1,
            None => break,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_histogram_is_proportional() {
        let pool = BalancerPool::new(Strategy::Weighted);
        assert_eq!(histogram(&pool, &[1, 0, 3], 400), vec![100, 0, 300]);
    }

    #[test]
    fn round_robin_histogram_is_even() {
        let pool = BalancerPool::new(Strategy::RoundRobin);
        assert_eq!(histogram(&pool, &[1, 0, 3], 300), vec![100, 100, 100]);
    }

    #[test]
    fn all_zero_weights_fail_for_weighted() {
        assert!(run_pick(&[0, 0], Strategy::Weighted, 10).is_err());
        assert!(run_pick(&[0, 0], Strategy::RoundRobin, 10).is_ok());
    }
}
