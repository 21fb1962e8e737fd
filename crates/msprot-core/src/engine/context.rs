use super::config::{AnalysisConfig, ResidueSelection};
use super::error::EngineError;
use super::occupancy::OccupancyTable;
use super::progress::ProgressReporter;
use crate::core::models::ensemble::{Ensemble, InvalidStateError};
use crate::core::models::ids::ResidueIndex;
use std::collections::BTreeSet;

/// Borrowed inputs shared by every phase of one analysis run.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub ensemble: &'a Ensemble,
    pub config: &'a AnalysisConfig,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        ensemble: &'a Ensemble,
        config: &'a AnalysisConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            ensemble,
            config,
            reporter,
        }
    }

    pub fn resolve(
        &self,
        selection: &ResidueSelection,
        occupancy: &OccupancyTable,
    ) -> Result<Vec<ResidueIndex>, EngineError> {
        resolve_selection(
            self.ensemble,
            selection,
            occupancy,
            self.config.min_occupancy,
        )
    }
}

/// Resolves a residue selection to indices in canonical order.
///
/// # Errors
///
/// Returns [`InvalidStateError::UnknownResidue`] if an explicitly included residue is
/// not part of the ensemble. Unknown excluded residues are ignored.
pub fn resolve_selection(
    ensemble: &Ensemble,
    selection: &ResidueSelection,
    occupancy: &OccupancyTable,
    min_occupancy: f64,
) -> Result<Vec<ResidueIndex>, EngineError> {
    let table = ensemble.residue_table();
    let selected: BTreeSet<ResidueIndex> = match selection {
        ResidueSelection::All => table.indices().collect(),
        ResidueSelection::List { include, exclude } => {
            let mut candidates: BTreeSet<ResidueIndex> = if include.is_empty() {
                table.indices().collect()
            } else {
                include
                    .iter()
                    .map(|specifier| {
                        table
                            .find(specifier)
                            .ok_or_else(|| InvalidStateError::UnknownResidue {
                                residue: specifier.clone(),
                            })
                    })
                    .collect::<Result<_, _>>()?
            };
            for specifier in exclude {
                if let Some(index) = table.find(specifier) {
                    candidates.remove(&index);
                }
            }
            candidates
        }
        ResidueSelection::Kind(kind) => table
            .indices()
            .filter(|&idx| table.residue(idx).is_some_and(|r| r.kind == *kind))
            .collect(),
        ResidueSelection::Ionizable => table
            .indices()
            .filter(|&idx| table.residue(idx).is_some_and(|r| r.kind.is_ionizable()))
            .collect(),
        ResidueSelection::Fluctuating => occupancy
            .fluctuating_residues(min_occupancy)
            .into_iter()
            .collect(),
    };
    Ok(selected.into_iter().collect())
}
