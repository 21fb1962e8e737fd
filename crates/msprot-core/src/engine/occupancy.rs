use super::error::EngineError;
use super::weights::{BoltzmannWeights, NORMALIZATION_TOLERANCE};
use crate::core::models::ensemble::Ensemble;
use crate::core::models::ids::ResidueIndex;
use tracing::{debug, instrument};

/// Boltzmann-weighted state occupancy of a single residue.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueOccupancy {
    pub residue: ResidueIndex,
    /// Occupancy fraction of every state, indexed like the residue's state list.
    pub fractions: Vec<f64>,
    /// `Σ charge(state) * fraction(state)`.
    pub average_charge: f64,
}

impl ResidueOccupancy {
    pub fn fraction(&self, state: usize) -> Option<f64> {
        self.fractions.get(state).copied()
    }

    /// The state with the highest fraction; the lowest index wins ties.
    pub fn most_occupied_state(&self) -> (usize, f64) {
        self.fractions
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, f)| {
                if f > best.1 { (idx, f) } else { best }
            })
    }

    /// Whether at least two states are occupied at or above `min_occupancy`.
    pub fn is_fluctuating(&self, min_occupancy: f64) -> bool {
        self.fractions.iter().filter(|&&f| f >= min_occupancy).count() >= 2
    }
}

/// Per-residue occupancy fractions and average charges of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyTable {
    residues: Vec<ResidueOccupancy>,
}

impl OccupancyTable {
    /// Aggregates normalized microstate weights per residue state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Consistency`] if `weights` does not belong to `ensemble` or
    /// if any residue's fractions do not sum to one within `1e-9`.
    #[instrument(skip_all, name = "occupancy_table")]
    pub fn compute(ensemble: &Ensemble, weights: &BoltzmannWeights) -> Result<Self, EngineError> {
        weights.ensure_matches(ensemble)?;

        let mut sums: Vec<Vec<f64>> = ensemble
            .residues()
            .iter()
            .map(|residue| vec![0.0; residue.num_states()])
            .collect();

        for (ms, &w) in ensemble.microstates().iter().zip(weights.weights()) {
            if w == 0.0 {
                continue;
            }
            for (residue_sums, &state) in sums.iter_mut().zip(ms.states()) {
                residue_sums[state] += w;
            }
        }

        let partition = weights.partition();
        let mut residues = Vec::with_capacity(sums.len());
        for ((idx, residue), state_sums) in ensemble.residues().iter().enumerate().zip(sums) {
            let fractions: Vec<f64> = state_sums.into_iter().map(|s| s / partition).collect();

            let total: f64 = fractions.iter().sum();
            if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
                return Err(EngineError::Consistency {
                    check: "residue_normalization",
                    detail: format!("occupancy fractions of {residue} sum to {total}"),
                });
            }

            let average_charge = residue
                .states()
                .iter()
                .zip(&fractions)
                .map(|(state, f)| state.charge() * f)
                .sum();

            residues.push(ResidueOccupancy {
                residue: ResidueIndex(idx),
                fractions,
                average_charge,
            });
        }

        debug!(residues = residues.len(), "Residue occupancies computed.");
        Ok(Self { residues })
    }

    pub fn residues(&self) -> &[ResidueOccupancy] {
        &self.residues
    }

    pub fn residue(&self, index: ResidueIndex) -> Option<&ResidueOccupancy> {
        self.residues.get(index.0)
    }

    pub fn fraction(&self, index: ResidueIndex, state: usize) -> Option<f64> {
        self.residue(index).and_then(|r| r.fraction(state))
    }

    pub fn average_charge(&self, index: ResidueIndex) -> Option<f64> {
        self.residue(index).map(|r| r.average_charge)
    }

    /// Sum of the average charges of all residues.
    pub fn total_average_charge(&self) -> f64 {
        self.residues.iter().map(|r| r.average_charge).sum()
    }

    /// Residues with at least two states occupied at or above `min_occupancy`, in
    /// canonical order.
    pub fn fluctuating_residues(&self, min_occupancy: f64) -> Vec<ResidueIndex> {
        self.residues
            .iter()
            .filter(|r| r.is_fluctuating(min_occupancy))
            .map(|r| r.residue)
            .collect()
    }
}
