use super::clustering::{Cluster, ClusterAssignment};
use super::weights::BoltzmannWeights;
use crate::core::models::ids::MicrostateId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A microstate and its normalized weight, ordered so that "greater" means "ranks
/// higher": larger probability first, then lower id.
#[derive(Debug, Clone, Copy)]
pub struct RankedMicrostate {
    pub id: MicrostateId,
    pub probability: f64,
}

impl PartialEq for RankedMicrostate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for RankedMicrostate {}

impl PartialOrd for RankedMicrostate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedMicrostate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.probability
            .total_cmp(&other.probability)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// The `n` microstates with the largest individual weight, best first.
///
/// Ties are broken by ascending microstate id.
pub fn top_microstates(weights: &BoltzmannWeights, n: usize) -> Vec<RankedMicrostate> {
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<RankedMicrostate>> = BinaryHeap::with_capacity(n + 1);
    for (idx, probability) in weights.probabilities().enumerate() {
        heap.push(Reverse(RankedMicrostate {
            id: MicrostateId(idx),
            probability,
        }));
        if heap.len() > n {
            heap.pop();
        }
    }
    // Ascending order of `Reverse` is descending rank.
    heap.into_sorted_vec().into_iter().map(|r| r.0).collect()
}

/// Clusters by total weighted occupancy, descending; ties keep ascending cluster id.
pub fn rank_clusters(assignment: &ClusterAssignment) -> Vec<&Cluster> {
    let mut ranked: Vec<&Cluster> = assignment.clusters().iter().collect();
    ranked.sort_by(|a, b| b.occupancy.total_cmp(&a.occupancy));
    ranked
}
