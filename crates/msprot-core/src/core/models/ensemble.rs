use super::ids::{MicrostateId, ResidueIndex};
use super::microstate::Microstate;
use super::residue::{Residue, ResidueSpecifier};
use std::collections::HashMap;
use thiserror::Error;

/// Referential integrity violations between microstates and the residue table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidStateError {
    #[error("Unknown residue: {residue}")]
    UnknownResidue { residue: ResidueSpecifier },

    #[error("Residue index {index} is out of range ({num_residues} residues)")]
    UnknownResidueIndex { index: usize, num_residues: usize },

    #[error("Residue {residue} is declared more than once")]
    DuplicateResidue { residue: ResidueSpecifier },

    #[error("Residue {residue} declares no states")]
    NoStates { residue: ResidueSpecifier },

    #[error(
        "State index {state_index} is out of range for residue {residue} ({num_states} states)"
    )]
    StateOutOfRange {
        residue: ResidueSpecifier,
        state_index: usize,
        num_states: usize,
    },

    #[error("Microstate assigns {found} residues, but the ensemble tracks {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Residue {residue} is assigned more than once")]
    DuplicateAssignment { residue: ResidueSpecifier },

    #[error("Residue {residue} has no assigned state")]
    MissingAssignment { residue: ResidueSpecifier },

    #[error("Invalid state label '{label}': labels must be non-empty and contain no whitespace")]
    InvalidLabel { label: String },

    #[error("State '{label}' has a non-finite charge ({charge})")]
    InvalidCharge { label: String, charge: f64 },

    #[error("Microstate energy must be finite (got {energy})")]
    NonFiniteEnergy { energy: f64 },
}

/// The residues of an ensemble in canonical order.
///
/// The order in which residues are pushed is the order every downstream component
/// uses for positional comparisons between microstates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidueTable {
    residues: Vec<Residue>,
    index_map: HashMap<ResidueSpecifier, ResidueIndex>,
}

impl ResidueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a residue at the end of the canonical ordering.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError::DuplicateResidue`] if a residue with the same chain,
    /// sequence number and name already exists.
    pub fn push(&mut self, residue: Residue) -> Result<ResidueIndex, InvalidStateError> {
        let specifier = residue.specifier();
        if self.index_map.contains_key(&specifier) {
            return Err(InvalidStateError::DuplicateResidue { residue: specifier });
        }
        let index = ResidueIndex(self.residues.len());
        self.index_map.insert(specifier, index);
        self.residues.push(residue);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn residue(&self, index: ResidueIndex) -> Option<&Residue> {
        self.residues.get(index.0)
    }

    pub fn find(&self, specifier: &ResidueSpecifier) -> Option<ResidueIndex> {
        self.index_map.get(specifier).copied()
    }

    /// Like [`Self::residue`], but reports a missing residue as an error.
    pub fn get(&self, index: ResidueIndex) -> Result<&Residue, InvalidStateError> {
        self.residues
            .get(index.0)
            .ok_or(InvalidStateError::UnknownResidueIndex {
                index: index.0,
                num_residues: self.residues.len(),
            })
    }

    /// Checks that `state_index` names a state of the residue at `index`.
    pub fn validate_state(
        &self,
        index: ResidueIndex,
        state_index: usize,
    ) -> Result<(), InvalidStateError> {
        let residue = self.get(index)?;
        if state_index >= residue.num_states() {
            return Err(InvalidStateError::StateOutOfRange {
                residue: residue.specifier(),
                state_index,
                num_states: residue.num_states(),
            });
        }
        Ok(())
    }

    pub fn indices(&self) -> impl Iterator<Item = ResidueIndex> + '_ {
        (0..self.residues.len()).map(ResidueIndex)
    }

    /// Checks a positional assignment vector against the table.
    pub fn validate_assignment(&self, states: &[usize]) -> Result<(), InvalidStateError> {
        if states.len() != self.residues.len() {
            return Err(InvalidStateError::LengthMismatch {
                expected: self.residues.len(),
                found: states.len(),
            });
        }
        for (residue, &state_index) in self.residues.iter().zip(states) {
            if state_index >= residue.num_states() {
                return Err(InvalidStateError::StateOutOfRange {
                    residue: residue.specifier(),
                    state_index,
                    num_states: residue.num_states(),
                });
            }
        }
        Ok(())
    }

    /// Converts `(residue, state index)` pairs in any order into a positional assignment
    /// vector in canonical order.
    ///
    /// # Errors
    ///
    /// Fails if a residue is unknown, assigned twice, missing, or if a state index is out
    /// of range for its residue.
    pub fn resolve_pairs(
        &self,
        pairs: &[(ResidueSpecifier, usize)],
    ) -> Result<Vec<usize>, InvalidStateError> {
        let mut assignment: Vec<Option<usize>> = vec![None; self.residues.len()];
        for (specifier, state_index) in pairs {
            let index = self
                .find(specifier)
                .ok_or_else(|| InvalidStateError::UnknownResidue {
                    residue: specifier.clone(),
                })?;
            let num_states = self.residues[index.0].num_states();
            if *state_index >= num_states {
                return Err(InvalidStateError::StateOutOfRange {
                    residue: specifier.clone(),
                    state_index: *state_index,
                    num_states,
                });
            }
            if assignment[index.0].replace(*state_index).is_some() {
                return Err(InvalidStateError::DuplicateAssignment {
                    residue: specifier.clone(),
                });
            }
        }
        assignment
            .into_iter()
            .zip(&self.residues)
            .map(|(state, residue)| {
                state.ok_or_else(|| InvalidStateError::MissingAssignment {
                    residue: residue.specifier(),
                })
            })
            .collect()
    }
}

/// Incrementally assembles an [`Ensemble`], validating every microstate on entry.
#[derive(Debug, Clone)]
pub struct EnsembleBuilder {
    residues: ResidueTable,
    microstates: Vec<Microstate>,
}

impl EnsembleBuilder {
    pub fn new(residues: ResidueTable) -> Self {
        Self {
            residues,
            microstates: Vec::new(),
        }
    }

    pub fn residues(&self) -> &ResidueTable {
        &self.residues
    }

    /// Number of microstates accepted so far.
    pub fn len(&self) -> usize {
        self.microstates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.microstates.is_empty()
    }

    /// Appends a microstate given as one state index per residue in canonical order.
    pub fn push_microstate(
        &mut self,
        count: u64,
        energy: f64,
        states: Vec<usize>,
    ) -> Result<MicrostateId, InvalidStateError> {
        if !energy.is_finite() {
            return Err(InvalidStateError::NonFiniteEnergy { energy });
        }
        self.residues.validate_assignment(&states)?;
        let id = MicrostateId(self.microstates.len());
        self.microstates.push(Microstate {
            id,
            count,
            energy,
            states: states.into_boxed_slice(),
        });
        Ok(id)
    }

    /// Appends a microstate given as `(residue, state index)` pairs.
    pub fn push_pairs(
        &mut self,
        count: u64,
        energy: f64,
        pairs: &[(ResidueSpecifier, usize)],
    ) -> Result<MicrostateId, InvalidStateError> {
        let states = self.residues.resolve_pairs(pairs)?;
        self.push_microstate(count, energy, states)
    }

    pub fn build(self) -> Ensemble {
        Ensemble {
            residues: self.residues,
            microstates: self.microstates,
        }
    }
}

/// A read-only collection of microstates sampled at one simulation condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    residues: ResidueTable,
    microstates: Vec<Microstate>,
}

impl Ensemble {
    pub fn residue_table(&self) -> &ResidueTable {
        &self.residues
    }

    pub fn residues(&self) -> &[Residue] {
        self.residues.residues()
    }

    pub fn residue(&self, index: ResidueIndex) -> Option<&Residue> {
        self.residues.residue(index)
    }

    pub fn find_residue(&self, specifier: &ResidueSpecifier) -> Option<ResidueIndex> {
        self.residues.find(specifier)
    }

    pub fn num_residues(&self) -> usize {
        self.residues.len()
    }

    pub fn microstates(&self) -> &[Microstate] {
        &self.microstates
    }

    pub fn microstate(&self, id: MicrostateId) -> Option<&Microstate> {
        self.microstates.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.microstates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.microstates.is_empty()
    }

    /// Total number of sampling events across all microstates.
    ///
    /// Summed in `u128`, which cannot overflow for any number of `u64` counts that fits
    /// in memory.
    pub fn total_count(&self) -> u128 {
        self.microstates.iter().map(|ms| u128::from(ms.count)).sum()
    }

    pub fn min_energy(&self) -> Option<f64> {
        self.microstates.iter().map(|ms| ms.energy).reduce(f64::min)
    }

    /// Labels of the active states of a microstate, in canonical residue order.
    pub fn state_labels<'a>(&'a self, microstate: &'a Microstate) -> Vec<&'a str> {
        self.residues()
            .iter()
            .zip(microstate.states())
            .filter_map(|(residue, &idx)| residue.state(idx).map(|s| s.label()))
            .collect()
    }
}
