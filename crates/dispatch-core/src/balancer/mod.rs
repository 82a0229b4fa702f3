//! Candidate selection for work dispatch.
//!
//! A balancer picks one item out of a caller-supplied slice per call. Items only
//! have to report a capacity weight through [`Weighted`]; the balancer never owns
//! them and keeps only its own cursor state, so every instance is independent.
//! Callers are expected to pass a positionally-stable slice within one round
//! (same candidates, same order).

mod round_robin;
mod weighted;

pub use round_robin::RoundRobin;
pub use weighted::SmoothWeighted;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Anything that can be dispatched to: a worker, a device, a node.
pub trait Weighted {
    /// Declared capacity weight. Zero means "never pick" for the weighted strategy.
    fn weight(&self) -> u32;
}

impl Weighted for u32 {
    fn weight(&self) -> u32 {
        *self
    }
}

impl<T: Weighted + ?Sized> Weighted for &T {
    fn weight(&self) -> u32 {
        (**self).weight()
    }
}

impl<T: Weighted + ?Sized> Weighted for Arc<T> {
    fn weight(&self) -> u32 {
        (**self).weight()
    }
}

/// Selection strategy. Implementations synchronize internally and are safe to
/// share between threads without external locking.
pub trait Balancer: Send + Sync {
    /// Index of the next item to dispatch to, or `None` when nothing is selectable.
    fn pick_index<T: Weighted>(&self, items: &[T]) -> Option<usize>;

    /// Next item to dispatch to, or `None` when nothing is selectable.
    fn next<'a, T: Weighted>(&self, items: &'a [T]) -> Option<&'a T> {
        self.pick_index(items).and_then(|i| items.get(i))
    }
}

/// Which selection strategy a [`BalancerPool`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Equal visitation, weights ignored.
    RoundRobin,
    /// Smooth weighted round-robin; frequency proportional to weight.
    #[default]
    Weighted,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::RoundRobin => write!(f, "round_robin"),
            Strategy::Weighted => write!(f, "weighted"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "rr" => Ok(Strategy::RoundRobin),
            "weighted" | "wrr" => Ok(Strategy::Weighted),
            other => Err(format!(
                "unknown balancer strategy '{}' (expected round_robin or weighted)",
                other
            )),
        }
    }
}

/// A balancer whose strategy is chosen at runtime (e.g. from config).
#[derive(Debug)]
pub enum BalancerPool {
    RoundRobin(RoundRobin),
    Weighted(SmoothWeighted),
}

impl BalancerPool {
    pub fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::RoundRobin => BalancerPool::RoundRobin(RoundRobin::new()),
            Strategy::Weighted => BalancerPool::Weighted(SmoothWeighted::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            BalancerPool::RoundRobin(_) => Strategy::RoundRobin,
            BalancerPool::Weighted(_) => Strategy::Weighted,
        }
    }

    /// Forget rotation state, e.g. after the fleet was replaced.
    pub fn reset(&self) {
        match self {
            BalancerPool::RoundRobin(b) => b.reset(),
            BalancerPool::Weighted(b) => b.reset(),
        }
    }
}

impl Default for BalancerPool {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

impl Balancer for BalancerPool {
    fn pick_index<T: Weighted>(&self, items: &[T]) -> Option<usize> {
        match self {
            BalancerPool::RoundRobin(b) => b.pick_index(items),
            BalancerPool::Weighted(b) => b.pick_index(items),
        }
    }
}
