use super::clustering::{Cluster, ClusterAssignment};
use super::correlation::CorrelationReport;
use super::error::EngineError;
use super::occupancy::OccupancyTable;
use super::ranking::RankedMicrostate;
use super::weights::BoltzmannWeights;
use crate::core::io::tables::{Cell, Table};
use crate::core::models::ensemble::Ensemble;
use crate::core::models::ids::ResidueIndex;
use crate::core::models::residue::Residue;
use itertools::Itertools;

pub const RESIDUE_COLUMNS: &[&str] = &[
    "chain",
    "residue_number",
    "residue",
    "kind",
    "state_index",
    "state",
    "charge",
    "occupancy",
    "charge_contribution",
    "residue_average_charge",
];

pub const CLUSTER_COLUMNS: &[&str] = &[
    "rank",
    "cluster_id",
    "members",
    "count",
    "occupancy",
    "representative",
    "microstates",
];

pub const MICROSTATE_COLUMNS: &[&str] = &[
    "rank",
    "microstate_id",
    "energy",
    "count",
    "probability",
    "net_charge",
    "states",
];

pub const CORRELATION_COLUMNS: &[&str] = &["first", "second", "correlation"];

pub const SKIPPED_PAIR_COLUMNS: &[&str] = &["first", "second", "reason"];

/// Every table produced by one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTables {
    pub residues: Table,
    pub clusters: Table,
    pub top_microstates: Table,
    /// Present when pairwise correlation was requested.
    pub correlations: Option<Table>,
    pub skipped_pairs: Option<Table>,
}

/// One row per residue state: occupancy fraction, the state's contribution to the
/// residue's average charge, and that average.
pub fn residue_table(
    ensemble: &Ensemble,
    occupancy: &OccupancyTable,
) -> Result<Table, EngineError> {
    let mut table = Table::new(RESIDUE_COLUMNS);
    for (residue, occ) in ensemble.residues().iter().zip(occupancy.residues()) {
        let rows = residue.states().iter().zip(&occ.fractions).enumerate();
        for (index, (state, &fraction)) in rows {
            table.push_row(vec![
                Cell::from(residue.chain_id.to_string()),
                Cell::from(residue.residue_number),
                Cell::from(residue.name.as_str()),
                Cell::from(residue.kind.to_string()),
                Cell::from(index),
                Cell::from(state.label()),
                Cell::from(state.charge()),
                Cell::from(fraction),
                Cell::from(state.charge() * fraction),
                Cell::from(occ.average_charge),
            ])?;
        }
    }
    Ok(table)
}

fn labelled_state(residue: &Residue, state: usize) -> String {
    let label = residue.state(state).map_or("?", |s| s.label());
    format!("{residue}:{label}")
}

/// Ranked clusters with their representative assignment and members.
pub fn cluster_table(
    ensemble: &Ensemble,
    assignment: &ClusterAssignment,
    ranked: &[&Cluster],
) -> Result<Table, EngineError> {
    let mut table = Table::new(CLUSTER_COLUMNS);
    for (rank, cluster) in ranked.iter().enumerate() {
        let representative = assignment
            .residues()
            .iter()
            .zip(&cluster.representative)
            .filter_map(|(&r, &state)| ensemble.residue(r).map(|res| labelled_state(res, state)))
            .join(" ");
        table.push_row(vec![
            Cell::from(rank + 1),
            Cell::from(cluster.id.0),
            Cell::from(cluster.member_count()),
            Cell::from(cluster.count),
            Cell::from(cluster.occupancy),
            Cell::from(representative),
            Cell::from(cluster.members.iter().join(" ")),
        ])?;
    }
    Ok(table)
}

/// The highest-weighted microstates with their full state assignment.
pub fn microstate_table(
    ensemble: &Ensemble,
    ranked: &[RankedMicrostate],
) -> Result<Table, EngineError> {
    let mut table = Table::new(MICROSTATE_COLUMNS);
    for (rank, entry) in ranked.iter().enumerate() {
        let Some(ms) = ensemble.microstate(entry.id) else {
            return Err(EngineError::Consistency {
                check: "ranked_microstate_exists",
                detail: format!("microstate {} is not part of the ensemble", entry.id),
            });
        };
        table.push_row(vec![
            Cell::from(rank + 1),
            Cell::from(entry.id.0),
            Cell::from(ms.energy()),
            Cell::from(ms.count()),
            Cell::from(entry.probability),
            Cell::from(ms.net_charge(ensemble.residues())),
            Cell::from(ensemble.state_labels(ms).join(" ")),
        ])?;
    }
    Ok(table)
}

/// Residue pairs whose absolute correlation is at least `min_abs_correlation`, and the
/// pairs that could not be correlated.
pub fn correlation_tables(
    ensemble: &Ensemble,
    report: &CorrelationReport,
    min_abs_correlation: f64,
) -> Result<(Table, Table), EngineError> {
    let name = |index: ResidueIndex| {
        ensemble
            .residue(index)
            .map_or_else(|| index.to_string(), |r| r.to_string())
    };

    let mut pairs = Table::new(CORRELATION_COLUMNS);
    for pair in report
        .pairs
        .iter()
        .filter(|p| p.coefficient.abs() >= min_abs_correlation)
    {
        pairs.push_row(vec![
            Cell::from(name(pair.first)),
            Cell::from(name(pair.second)),
            Cell::from(pair.coefficient),
        ])?;
    }

    let mut skipped = Table::new(SKIPPED_PAIR_COLUMNS);
    for pair in &report.skipped {
        skipped.push_row(vec![
            Cell::from(name(pair.first)),
            Cell::from(name(pair.second)),
            Cell::from(pair.reason.to_string()),
        ])?;
    }
    Ok((pairs, skipped))
}

impl SummaryTables {
    pub fn build(
        ensemble: &Ensemble,
        occupancy: &OccupancyTable,
        assignment: &ClusterAssignment,
        ranked_clusters: &[&Cluster],
        top_microstates: &[RankedMicrostate],
        correlation: Option<(&CorrelationReport, f64)>,
    ) -> Result<Self, EngineError> {
        let (correlations, skipped_pairs) = match correlation {
            Some((report, min_abs)) => {
                let (pairs, skipped) = correlation_tables(ensemble, report, min_abs)?;
                (Some(pairs), Some(skipped))
            }
            None => (None, None),
        };
        Ok(Self {
            residues: residue_table(ensemble, occupancy)?,
            clusters: cluster_table(ensemble, assignment, ranked_clusters)?,
            top_microstates: microstate_table(ensemble, top_microstates)?,
            correlations,
            skipped_pairs,
        })
    }
}

/// Ensemble-level scalars reported next to the tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleStatistics {
    pub microstates: usize,
    pub total_count: u128,
    pub partition: f64,
    pub free_energy: f64,
    pub average_energy: f64,
    pub total_average_charge: f64,
}

impl EnsembleStatistics {
    pub fn collect(
        ensemble: &Ensemble,
        weights: &BoltzmannWeights,
        occupancy: &OccupancyTable,
    ) -> Self {
        Self {
            microstates: ensemble.len(),
            total_count: ensemble.total_count(),
            partition: weights.partition(),
            free_energy: weights.free_energy(),
            average_energy: weights.average_energy(ensemble),
            total_average_charge: occupancy.total_average_charge(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ensemble::{EnsembleBuilder, ResidueTable};
    use crate::core::models::ids::MicrostateId;
    use crate::core::models::residue::State;
    use crate::engine::clustering::cluster_microstates;
    use crate::engine::config::{ClusterBasis, ClusterMode};
    use crate::engine::correlation::{PairCorrelation, SkippedPair};
    use crate::engine::error::InsufficientDataError;
    use crate::engine::ranking::{rank_clusters, top_microstates};

    fn two_state(number: isize, name: &str, charges: (f64, f64)) -> Residue {
        Residue::new(
            'A',
            number,
            name,
            vec![
                State::new("A", charges.0).unwrap(),
                State::new("B", charges.1).unwrap(),
            ],
        )
        .unwrap()
    }

    fn create_example_ensemble() -> Ensemble {
        let mut table = ResidueTable::new();
        table.push(two_state(1, "LYS", (0.0, 1.0))).unwrap();
        table.push(two_state(2, "ASP", (0.0, -1.0))).unwrap();
        let mut builder = EnsembleBuilder::new(table);
        builder.push_microstate(5, 0.0, vec![0, 0]).unwrap();
        builder.push_microstate(3, 1.0, vec![1, 0]).unwrap();
        builder.push_microstate(2, 2.0, vec![0, 1]).unwrap();
        builder.build()
    }

    #[test]
    fn residue_table_has_one_row_per_state() {
        let ensemble = create_example_ensemble();
        let weights = BoltzmannWeights::with_kt(&ensemble, 1.0, None).unwrap();
        let occupancy = OccupancyTable::compute(&ensemble, &weights).unwrap();
        let table = residue_table(&ensemble, &occupancy).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.cell(1, "state"), Some(&Cell::from("B")));
        assert_eq!(table.cell(1, "kind"), Some(&Cell::from("basic")));

        let z = 5.0 + 3.0 * (-1.0f64).exp() + 2.0 * (-2.0f64).exp();
        let expected = 3.0 * (-1.0f64).exp() / z;
        let occ = table.cell(1, "occupancy").and_then(Cell::as_f64).unwrap();
        let contribution = table
            .cell(1, "charge_contribution")
            .and_then(Cell::as_f64)
            .unwrap();
        assert!((occ - expected).abs() < 1e-9);
        assert!((contribution - expected).abs() < 1e-9);

        let occupancy_sum: f64 = (0..2)
            .map(|row| table.cell(row, "occupancy").and_then(Cell::as_f64).unwrap())
            .sum();
        assert!((occupancy_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cluster_and_microstate_tables_follow_ranking() {
        let ensemble = create_example_ensemble();
        let weights = BoltzmannWeights::with_kt(&ensemble, 1.0, None).unwrap();
        let assignment = cluster_microstates(
            &ensemble,
            &weights,
            &[ResidueIndex(0), ResidueIndex(1)],
            ClusterMode::Exact,
            ClusterBasis::States,
        )
        .unwrap();
        let ranked = rank_clusters(&assignment);
        let clusters = cluster_table(&ensemble, &assignment, &ranked).unwrap();

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters.cell(0, "rank"), Some(&Cell::Count(1)));
        assert_eq!(clusters.cell(0, "cluster_id"), Some(&Cell::Count(0)));
        assert_eq!(
            clusters.cell(1, "representative"),
            Some(&Cell::from("LYSA0001:B ASPA0002:A"))
        );
        assert_eq!(clusters.cell(2, "microstates"), Some(&Cell::from("2")));

        let top = top_microstates(&weights, 2);
        let microstates = microstate_table(&ensemble, &top).unwrap();
        assert_eq!(microstates.len(), 2);
        assert_eq!(microstates.cell(0, "microstate_id"), Some(&Cell::Count(0)));
        assert_eq!(microstates.cell(1, "states"), Some(&Cell::from("B A")));
        assert_eq!(microstates.cell(1, "net_charge"), Some(&Cell::Float(1.0)));
    }

    #[test]
    fn correlation_tables_filter_weak_pairs() {
        let ensemble = create_example_ensemble();
        let report = CorrelationReport {
            pairs: vec![PairCorrelation {
                first: ResidueIndex(0),
                second: ResidueIndex(1),
                coefficient: -0.05,
            }],
            skipped: vec![SkippedPair {
                first: ResidueIndex(0),
                second: ResidueIndex(1),
                reason: InsufficientDataError::SingleState {
                    residue: "LYSA0001".to_string(),
                },
            }],
        };

        let (pairs, skipped) = correlation_tables(&ensemble, &report, 0.1).unwrap();
        assert!(pairs.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped.cell(0, "first"), Some(&Cell::from("LYSA0001")));

        let (pairs, _) = correlation_tables(&ensemble, &report, 0.0).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn unknown_ranked_microstate_is_a_consistency_error() {
        let ensemble = create_example_ensemble();
        let ranked = [RankedMicrostate {
            id: MicrostateId(42),
            probability: 1.0,
        }];
        assert!(matches!(
            microstate_table(&ensemble, &ranked),
            Err(EngineError::Consistency { .. })
        ));
    }
}
