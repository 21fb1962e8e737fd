use super::ids::{MicrostateId, ResidueIndex};
use super::residue::Residue;

/// One sampled assignment of an active state to every residue of an ensemble.
///
/// Instances only come out of [`super::ensemble::EnsembleBuilder`], which checks the
/// assignment against the residue table, so `states` always has one valid index per
/// residue in canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct Microstate {
    pub(crate) id: MicrostateId,
    pub(crate) count: u64,
    pub(crate) energy: f64,
    pub(crate) states: Box<[usize]>,
}

impl Microstate {
    pub fn id(&self) -> MicrostateId {
        self.id
    }

    /// Number of times this microstate was sampled.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Active state index of every residue, in canonical residue order.
    pub fn states(&self) -> &[usize] {
        &self.states
    }

    pub fn state_of(&self, residue: ResidueIndex) -> Option<usize> {
        self.states.get(residue.0).copied()
    }

    /// Sum of the formal charges of the active states.
    pub fn net_charge(&self, residues: &[Residue]) -> f64 {
        residues
            .iter()
            .zip(self.states.iter())
            .filter_map(|(residue, &state_idx)| residue.state(state_idx))
            .map(|state| state.charge())
            .sum()
    }

    /// Number of residues (among `subset`) whose active states differ.
    pub fn hamming_distance(&self, other: &Microstate, subset: &[ResidueIndex]) -> usize {
        subset
            .iter()
            .filter(|r| self.states.get(r.0) != other.states.get(r.0))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::residue::State;

    fn microstate(id: usize, states: &[usize]) -> Microstate {
        Microstate {
            id: MicrostateId(id),
            count: 1,
            energy: 0.0,
            states: states.to_vec().into_boxed_slice(),
        }
    }

    #[test]
    fn net_charge_sums_active_state_charges() {
        let residues = vec![
            Residue::new(
                'A',
                1,
                "ASP",
                vec![
                    State::new("ASP0", 0.0).unwrap(),
                    State::new("ASP-", -1.0).unwrap(),
                ],
            )
            .unwrap(),
            Residue::new(
                'A',
                2,
                "LYS",
                vec![
                    State::new("LYS0", 0.0).unwrap(),
                    State::new("LYS+", 1.0).unwrap(),
                ],
            )
            .unwrap(),
        ];
        assert_eq!(microstate(0, &[1, 1]).net_charge(&residues), 0.0);
        assert_eq!(microstate(0, &[1, 0]).net_charge(&residues), -1.0);
        assert_eq!(microstate(0, &[0, 1]).net_charge(&residues), 1.0);
    }

    #[test]
    fn hamming_distance_only_counts_selected_residues() {
        let a = microstate(0, &[0, 1, 2]);
        let b = microstate(1, &[0, 0, 0]);
        let all = [ResidueIndex(0), ResidueIndex(1), ResidueIndex(2)];
        assert_eq!(a.hamming_distance(&b, &all), 2);
        assert_eq!(a.hamming_distance(&b, &[ResidueIndex(0)]), 0);
        assert_eq!(a.hamming_distance(&b, &[]), 0);
    }

    #[test]
    fn state_of_returns_none_past_the_last_residue() {
        let ms = microstate(3, &[1, 0]);
        assert_eq!(ms.state_of(ResidueIndex(0)), Some(1));
        assert_eq!(ms.state_of(ResidueIndex(2)), None);
    }
}
