//! Node selection strategies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How `acquire` picks a node when establishing or reusing a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Successive acquisitions cycle deterministically through nodes in
    /// configured order.
    #[default]
    RoundRobin,
    /// Uniform choice among nodes, independent of prior choices.
    Random,
}

/// Stateful selector; stores the rotation counter for round-robin.
#[derive(Debug)]
pub(crate) struct NodeSelector {
    strategy: SelectionStrategy,
    counter: AtomicUsize,
}

impl NodeSelector {
    pub(crate) fn new(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    /// Pick an index in `0..node_count`.
    pub(crate) fn next(&self, node_count: usize) -> usize {
        debug_assert!(node_count > 0);
        match self.strategy {
            SelectionStrategy::RoundRobin => {
                self.counter.fetch_add(1, Ordering::Relaxed) % node_count
            }
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..node_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_in_order() {
        let selector = NodeSelector::new(SelectionStrategy::RoundRobin);
        let picks: Vec<usize> = (0..6).map(|_| selector.next(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn random_stays_in_range() {
        let selector = NodeSelector::new(SelectionStrategy::Random);
        for _ in 0..100 {
            assert!(selector.next(4) < 4);
        }
    }
}
