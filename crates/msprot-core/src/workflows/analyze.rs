use crate::core::io::crgms::{CrgmsFile, CrgmsMetadata};
use crate::core::io::traits::EnsembleFile;
use crate::core::models::ensemble::Ensemble;
use crate::engine::clustering::{ClusterAssignment, cluster_microstates};
use crate::engine::config::AnalysisConfig;
use crate::engine::context::AnalysisContext;
use crate::engine::correlation::{CorrelationReport, correlate_residue_pairs};
use crate::engine::error::EngineError;
use crate::engine::occupancy::OccupancyTable;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::ranking::{rank_clusters, top_microstates};
use crate::engine::summary::{EnsembleStatistics, SummaryTables};
use crate::engine::weights::BoltzmannWeights;
use std::path::Path;
use tracing::{info, instrument};

/// Everything derived from one ensemble by one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub weights: BoltzmannWeights,
    pub occupancy: OccupancyTable,
    pub correlation: Option<CorrelationReport>,
    pub clusters: ClusterAssignment,
    pub statistics: EnsembleStatistics,
    pub tables: SummaryTables,
}

/// A decoded crgms file together with its analysis.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub ensemble: Ensemble,
    pub metadata: CrgmsMetadata,
    pub report: AnalysisReport,
}

#[instrument(skip_all, name = "analysis_workflow", fields(microstates = ensemble.len()))]
pub fn run(
    ensemble: &Ensemble,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
) -> Result<AnalysisReport, EngineError> {
    let context = AnalysisContext::new(ensemble, config, reporter);

    // === Phase 1: Boltzmann weights ===
    let weights = reporter.phase("Boltzmann Weights", || {
        BoltzmannWeights::compute(ensemble, &config.thermodynamics)
    })?;

    // === Phase 2: Residue occupancy ===
    let occupancy = reporter.phase("Residue Occupancy", || {
        OccupancyTable::compute(ensemble, &weights)
    })?;

    // === Phase 3: Pairwise correlation (optional) ===
    let correlation = match &config.correlation {
        Some(correlation_config) => Some(reporter.phase("Pairwise Correlation", || {
            let residues = context.resolve(&correlation_config.residues, &occupancy)?;
            correlate_residue_pairs(ensemble, &weights, &residues, context.reporter)
        })?),
        None => None,
    };

    // === Phase 4: Clustering ===
    let clusters = reporter.phase("Clustering", || {
        let residues = context.resolve(&config.clustering.residues, &occupancy)?;
        cluster_microstates(
            ensemble,
            &weights,
            &residues,
            config.clustering.mode,
            config.clustering.basis,
        )
    })?;

    // === Phase 5: Ranking and summary tables ===
    let tables = reporter.phase("Summary", || {
        let ranked_clusters = rank_clusters(&clusters);
        let ranked_microstates = top_microstates(&weights, config.top_n);
        let correlation_input = correlation.as_ref().zip(
            config
                .correlation
                .as_ref()
                .map(|c| c.min_abs_correlation),
        );
        SummaryTables::build(
            ensemble,
            &occupancy,
            &clusters,
            &ranked_clusters,
            &ranked_microstates,
            correlation_input,
        )
    })?;

    let statistics = EnsembleStatistics::collect(ensemble, &weights, &occupancy);
    reporter.report(Progress::Message(format!(
        "{} microstates, {} clusters, total average charge {:.3}",
        statistics.microstates,
        clusters.len(),
        statistics.total_average_charge
    )));
    info!(
        clusters = clusters.len(),
        free_energy = statistics.free_energy,
        "Analysis complete."
    );

    Ok(AnalysisReport {
        weights,
        occupancy,
        correlation,
        clusters,
        statistics,
        tables,
    })
}

/// Decodes a crgms file and analyzes it.
pub fn run_from_path(
    path: &Path,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
) -> Result<FileAnalysis, EngineError> {
    let (ensemble, metadata) = reporter.phase("Decoding", || CrgmsFile::read_from_path(path))?;
    info!(
        path = %path.display(),
        residues = ensemble.num_residues(),
        microstates = ensemble.len(),
        "Loaded microstate ensemble."
    );
    let report = run(&ensemble, config, reporter)?;
    Ok(FileAnalysis {
        ensemble,
        metadata,
        report,
    })
}
