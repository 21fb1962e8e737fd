use super::config::{CHARGE_TOLERANCE, ClusterBasis, ClusterMode};
use super::error::EngineError;
use super::weights::BoltzmannWeights;
use crate::core::models::ensemble::Ensemble;
use crate::core::models::ids::{ClusterId, MicrostateId, ResidueIndex};
use crate::core::models::microstate::Microstate;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// A group of microstates whose restricted assignments match under the clustering rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    /// The first microstate assigned to this cluster.
    pub representative_id: MicrostateId,
    /// Active state indices of the representative, restricted to the clustered residues.
    pub representative: Vec<usize>,
    /// Members in canonical microstate order.
    pub members: Vec<MicrostateId>,
    /// Total sampled count of all members.
    pub count: u128,
    /// Total normalized weight of all members.
    pub occupancy: f64,
    key: Vec<usize>,
}

impl Cluster {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn new(
        id: ClusterId,
        microstate: &Microstate,
        subset: &[ResidueIndex],
        key: Vec<usize>,
    ) -> Self {
        Self {
            id,
            representative_id: microstate.id(),
            representative: subset.iter().map(|r| microstate.states()[r.0]).collect(),
            members: Vec::new(),
            count: 0,
            occupancy: 0.0,
            key,
        }
    }

    fn add(&mut self, microstate: &Microstate, probability: f64) {
        self.members.push(microstate.id());
        self.count += u128::from(microstate.count());
        self.occupancy += probability;
    }
}

/// Cluster membership of every microstate of one ensemble, for one clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    residues: Vec<ResidueIndex>,
    mode: ClusterMode,
    basis: ClusterBasis,
    clusters: Vec<Cluster>,
    membership: Vec<ClusterId>,
}

impl ClusterAssignment {
    /// The residues the assignment vectors were restricted to, in canonical order.
    pub fn residues(&self) -> &[ResidueIndex] {
        &self.residues
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    pub fn basis(&self) -> ClusterBasis {
        self.basis
    }

    /// Clusters in creation order; `clusters()[i].id == ClusterId(i)`.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.0)
    }

    pub fn cluster_of(&self, microstate: MicrostateId) -> Option<ClusterId> {
        self.membership.get(microstate.0).copied()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Groups microstates by their assignments restricted to `residues`.
///
/// Microstates are visited in canonical order. Each joins the first existing cluster
/// (in creation order) whose representative matches it, otherwise it founds a new
/// cluster and becomes its representative. In [`ClusterMode::Exact`] a match means
/// identical restricted vectors; in [`ClusterMode::Threshold`] it means at most
/// `max_differences` differing residues. With [`ClusterBasis::Charges`], states whose
/// formal charges agree within [`CHARGE_TOLERANCE`] compare equal.
///
/// `residues` may be given in any order and may contain duplicates. An empty subset
/// places every microstate in a single cluster.
///
/// # Errors
///
/// Returns [`EngineError::InvalidState`] for a residue index outside the ensemble and
/// [`EngineError::Consistency`] if `weights` belongs to a different ensemble.
#[instrument(skip_all, name = "microstate_clustering", fields(residues = residues.len()))]
pub fn cluster_microstates(
    ensemble: &Ensemble,
    weights: &BoltzmannWeights,
    residues: &[ResidueIndex],
    mode: ClusterMode,
    basis: ClusterBasis,
) -> Result<ClusterAssignment, EngineError> {
    weights.ensure_matches(ensemble)?;

    let table = ensemble.residue_table();
    let mut subset = residues.to_vec();
    subset.sort_unstable();
    subset.dedup();
    for &index in &subset {
        table.get(index)?;
    }

    // Per clustered residue: state index -> comparison class.
    let classes: Vec<Vec<usize>> = subset
        .iter()
        .map(|&index| {
            let residue = &table.residues()[index.0];
            match basis {
                ClusterBasis::States => (0..residue.num_states()).collect(),
                ClusterBasis::Charges => residue.charge_classes(CHARGE_TOLERANCE),
            }
        })
        .collect();

    let key_of = |ms: &Microstate| -> Vec<usize> {
        subset
            .iter()
            .zip(&classes)
            .map(|(r, class)| class[ms.states()[r.0]])
            .collect()
    };

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut membership = Vec::with_capacity(ensemble.len());
    let mut exact_index: HashMap<Vec<usize>, ClusterId> = HashMap::new();

    for (ms, probability) in ensemble.microstates().iter().zip(weights.probabilities()) {
        let key = key_of(ms);
        let found = match mode {
            ClusterMode::Exact => exact_index.get(&key).copied(),
            ClusterMode::Threshold { max_differences } => clusters
                .iter()
                .find(|c| differences(&c.key, &key) <= max_differences)
                .map(|c| c.id),
        };

        let id = match found {
            Some(id) => id,
            None => {
                let id = ClusterId(clusters.len());
                if mode == ClusterMode::Exact {
                    exact_index.insert(key.clone(), id);
                }
                clusters.push(Cluster::new(id, ms, &subset, key));
                id
            }
        };
        clusters[id.0].add(ms, probability);
        membership.push(id);
    }

    debug!(?mode, ?basis, "Cluster membership assigned.");
    info!(
        clusters = clusters.len(),
        microstates = ensemble.len(),
        "Microstate clustering complete."
    );

    Ok(ClusterAssignment {
        residues: subset,
        mode,
        basis,
        clusters,
        membership,
    })
}

fn differences(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}
