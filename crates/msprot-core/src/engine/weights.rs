use super::config::{ConfigError, ThermodynamicsConfig};
use super::error::{DegenerateEnsembleError, EngineError};
use crate::core::models::ensemble::Ensemble;
use crate::core::models::ids::MicrostateId;
use tracing::{debug, instrument, warn};

/// Allowed deviation of a probability sum from one.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Boltzmann weights `w_i = n_i * exp(-(E_i - E_ref) / kT)` of every microstate.
///
/// The weights are accumulated in canonical microstate order so repeated runs on the
/// same input produce bit-identical results.
#[derive(Debug, Clone, PartialEq)]
pub struct BoltzmannWeights {
    kt: f64,
    reference_energy: f64,
    weights: Vec<f64>,
    partition: f64,
}

impl BoltzmannWeights {
    /// Computes weights using the temperature and energy unit of `thermo`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DegenerateEnsemble`] if the ensemble is empty or the
    /// partition value is zero or not finite, and [`EngineError::Consistency`] if the
    /// normalized weights do not sum to one.
    #[instrument(skip_all, name = "boltzmann_weights", fields(temperature = thermo.temperature_kelvin))]
    pub fn compute(ensemble: &Ensemble, thermo: &ThermodynamicsConfig) -> Result<Self, EngineError> {
        Self::with_kt(ensemble, thermo.kt(), thermo.energy_reference)
    }

    /// Computes weights for an explicit thermal energy `kt`, in the unit of the input
    /// energies.
    pub fn with_kt(
        ensemble: &Ensemble,
        kt: f64,
        energy_reference: Option<f64>,
    ) -> Result<Self, EngineError> {
        if !(kt.is_finite() && kt > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "kt",
                reason: format!("must be a finite positive number (got {kt})"),
            }
            .into());
        }
        let min_energy = ensemble
            .min_energy()
            .ok_or(DegenerateEnsembleError::Empty)?;
        let reference_energy = energy_reference.unwrap_or(min_energy);

        let weights: Vec<f64> = ensemble
            .microstates()
            .iter()
            .map(|ms| {
                if ms.count() == 0 {
                    0.0
                } else {
                    ms.count() as f64 * (-(ms.energy() - reference_energy) / kt).exp()
                }
            })
            .collect();

        let partition: f64 = weights.iter().sum();
        if !partition.is_finite() {
            return Err(DegenerateEnsembleError::NonFinitePartition(partition).into());
        }
        if partition <= 0.0 {
            return Err(DegenerateEnsembleError::ZeroPartition.into());
        }

        let result = Self {
            kt,
            reference_energy,
            weights,
            partition,
        };
        result.check_normalization()?;

        let negligible = result.weights.iter().filter(|&&w| w == 0.0).count();
        if negligible > 0 {
            warn!(
                negligible,
                total = result.weights.len(),
                "Microstates with zero weight (unsampled or underflowed)."
            );
        }
        debug!(
            partition = result.partition,
            reference_energy, kt, "Boltzmann weights computed."
        );
        Ok(result)
    }

    fn check_normalization(&self) -> Result<(), EngineError> {
        let total: f64 = self.probabilities().sum();
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(EngineError::Consistency {
                check: "global_normalization",
                detail: format!("microstate probabilities sum to {total}"),
            });
        }
        Ok(())
    }

    /// Fails unless these weights were computed for an ensemble the size of `ensemble`.
    pub fn ensure_matches(&self, ensemble: &Ensemble) -> Result<(), EngineError> {
        if self.weights.len() != ensemble.len() {
            return Err(EngineError::Consistency {
                check: "weights_match_ensemble",
                detail: format!(
                    "{} weights for {} microstates",
                    self.weights.len(),
                    ensemble.len()
                ),
            });
        }
        Ok(())
    }

    pub fn kt(&self) -> f64 {
        self.kt
    }

    /// The energy subtracted before exponentiation (`E_min` unless overridden).
    pub fn reference_energy(&self) -> f64 {
        self.reference_energy
    }

    /// The partition value `Z`, relative to the reference energy.
    pub fn partition(&self) -> f64 {
        self.partition
    }

    /// Unnormalized weights in microstate order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight(&self, id: MicrostateId) -> Option<f64> {
        self.weights.get(id.0).copied()
    }

    pub fn probability(&self, id: MicrostateId) -> Option<f64> {
        self.weight(id).map(|w| w / self.partition)
    }

    /// Normalized weights `w_i / Z` in microstate order.
    pub fn probabilities(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights.iter().map(move |w| w / self.partition)
    }

    /// Free energy of the ensemble, `E_ref - kT ln Z`.
    pub fn free_energy(&self) -> f64 {
        self.reference_energy - self.kt * self.partition.ln()
    }

    /// Boltzmann-weighted mean energy.
    pub fn average_energy(&self, ensemble: &Ensemble) -> f64 {
        ensemble
            .microstates()
            .iter()
            .zip(self.probabilities())
            .map(|(ms, p)| p * ms.energy())
            .sum()
    }
}
