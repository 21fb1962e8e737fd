use super::ensemble::InvalidStateError;
use crate::core::utils::identifiers::classify_residue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad ionization behavior of a residue, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResidueKind {
    Acidic, // Deprotonates to a negative charge (ASP, GLU, CTR, ...)
    Basic,  // Protonates to a positive charge (LYS, ARG, HIS, NTR, ...)
    Polar,  // Tautomer or orientation states only (SER, HOH, ...)
    Other,
}

impl ResidueKind {
    pub fn is_ionizable(self) -> bool {
        matches!(self, ResidueKind::Acidic | ResidueKind::Basic)
    }
}

impl fmt::Display for ResidueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResidueKind::Acidic => "acidic",
            ResidueKind::Basic => "basic",
            ResidueKind::Polar => "polar",
            ResidueKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Chain, sequence number and name of a residue, the key used for lookups.
///
/// The name is part of the identity: terminal groups such as `NTR` and `CTR` share
/// the sequence number of the amino acid they are attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResidueSpecifier {
    pub chain_id: char,
    pub residue_number: isize,
    pub name: String,
}

impl ResidueSpecifier {
    pub fn new(chain_id: char, residue_number: isize, name: &str) -> Self {
        Self {
            chain_id,
            residue_number,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResidueSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:04}", self.name, self.chain_id, self.residue_number)
    }
}

/// One discrete protonation, tautomer or conformer possibility of a residue.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    label: String,
    charge: f64,
}

impl State {
    /// Creates a state with the given label and net formal charge.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError::InvalidLabel`] if the label is empty or contains
    /// whitespace, and [`InvalidStateError::InvalidCharge`] if the charge is not finite.
    pub fn new(label: &str, charge: f64) -> Result<Self, InvalidStateError> {
        if label.is_empty() || label.chars().any(char::is_whitespace) {
            return Err(InvalidStateError::InvalidLabel {
                label: label.to_string(),
            });
        }
        if !charge.is_finite() {
            return Err(InvalidStateError::InvalidCharge {
                label: label.to_string(),
                charge,
            });
        }
        Ok(Self {
            label: label.to_string(),
            charge,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }
}

/// An ionizable or otherwise variable site together with its possible states.
///
/// The order of `states` is significant: microstates refer to states by their
/// position in this list.
#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub chain_id: char,       // Chain identifier from the source file
    pub residue_number: isize, // Residue sequence number from the source file
    pub name: String,          // Residue name (e.g., "ASP", "HIS")
    pub kind: ResidueKind,     // Classification derived from `name`
    states: Vec<State>,
}

impl Residue {
    /// Creates a residue with an ordered, non-empty list of states.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError::NoStates`] if `states` is empty.
    pub fn new(
        chain_id: char,
        residue_number: isize,
        name: &str,
        states: Vec<State>,
    ) -> Result<Self, InvalidStateError> {
        if states.is_empty() {
            return Err(InvalidStateError::NoStates {
                residue: ResidueSpecifier::new(chain_id, residue_number, name),
            });
        }
        Ok(Self {
            chain_id,
            residue_number,
            name: name.to_string(),
            kind: classify_residue(name),
            states,
        })
    }

    pub fn specifier(&self) -> ResidueSpecifier {
        ResidueSpecifier::new(self.chain_id, self.residue_number, &self.name)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn has_single_state(&self) -> bool {
        self.states.len() == 1
    }

    /// Maps every state to the lowest index whose charge agrees with it within
    /// `tolerance`, so states that differ only by tautomer share one class.
    pub fn charge_classes(&self, tolerance: f64) -> Vec<usize> {
        let mut classes = Vec::with_capacity(self.states.len());
        for (idx, state) in self.states.iter().enumerate() {
            let class = self.states[..idx]
                .iter()
                .position(|earlier| (earlier.charge - state.charge).abs() <= tolerance)
                .map_or(idx, |pos| classes[pos]);
            classes.push(class);
        }
        classes
    }
}

impl fmt::Display for Residue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.specifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(spec: &[(&str, f64)]) -> Vec<State> {
        spec.iter()
            .map(|(label, charge)| State::new(label, *charge).unwrap())
            .collect()
    }

    #[test]
    fn new_residue_initializes_fields_correctly() {
        let residue = Residue::new('A', 12, "ASP", states(&[("ASP0", 0.0), ("ASP-", -1.0)]))
            .unwrap();
        assert_eq!(residue.chain_id, 'A');
        assert_eq!(residue.residue_number, 12);
        assert_eq!(residue.name, "ASP");
        assert_eq!(residue.kind, ResidueKind::Acidic);
        assert_eq!(residue.num_states(), 2);
        assert_eq!(residue.state(1).unwrap().label(), "ASP-");
        assert!(residue.state(2).is_none());
        assert!(!residue.has_single_state());
    }

    #[test]
    fn new_residue_rejects_empty_state_list() {
        let result = Residue::new('A', 1, "LYS", vec![]);
        assert!(matches!(result, Err(InvalidStateError::NoStates { .. })));
    }

    #[test]
    fn state_rejects_whitespace_label_and_non_finite_charge() {
        assert!(matches!(
            State::new("HIS +", 1.0),
            Err(InvalidStateError::InvalidLabel { .. })
        ));
        assert!(matches!(
            State::new("", 1.0),
            Err(InvalidStateError::InvalidLabel { .. })
        ));
        assert!(matches!(
            State::new("HIS+", f64::NAN),
            Err(InvalidStateError::InvalidCharge { .. })
        ));
    }

    #[test]
    fn display_uses_name_chain_and_padded_number() {
        let residue = Residue::new('B', 7, "GLU", states(&[("GLU0", 0.0)])).unwrap();
        assert_eq!(residue.to_string(), "GLUB0007");
    }

    #[test]
    fn charge_classes_merge_tautomers_with_equal_charge() {
        let residue = Residue::new(
            'A',
            35,
            "HIS",
            states(&[("HID", 0.0), ("HIE", 0.0), ("HIP", 1.0), ("HIE2", 1e-9)]),
        )
        .unwrap();
        assert_eq!(residue.charge_classes(1e-6), vec![0, 0, 2, 0]);
    }
}
