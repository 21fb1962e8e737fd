use super::error::{EngineError, InsufficientDataError};
use super::progress::{Progress, ProgressReporter};
use super::weights::BoltzmannWeights;
use crate::core::models::ensemble::Ensemble;
use crate::core::models::ids::ResidueIndex;
use crate::core::models::microstate::Microstate;
use crate::core::models::residue::Residue;
use itertools::Itertools;
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Weighted variances at or below this value are treated as zero.
const VARIANCE_EPSILON: f64 = 1e-12;

/// A specific state of a specific residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateRef {
    pub residue: ResidueIndex,
    pub state: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairCorrelation {
    pub first: ResidueIndex,
    pub second: ResidueIndex,
    pub coefficient: f64,
}

/// A residue pair whose correlation is undefined, kept next to the successful pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPair {
    pub first: ResidueIndex,
    pub second: ResidueIndex,
    pub reason: InsufficientDataError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorrelationReport {
    pub pairs: Vec<PairCorrelation>,
    pub skipped: Vec<SkippedPair>,
}

struct Moments {
    covariance: f64,
    variance_x: f64,
    variance_y: f64,
}

fn weighted_moments(
    microstates: &[Microstate],
    probabilities: &[f64],
    x: impl Fn(&Microstate) -> f64,
    y: impl Fn(&Microstate) -> f64,
) -> Moments {
    let (mean_x, mean_y) = microstates
        .iter()
        .zip(probabilities)
        .fold((0.0, 0.0), |(mx, my), (ms, &p)| (mx + p * x(ms), my + p * y(ms)));

    microstates.iter().zip(probabilities).fold(
        Moments {
            covariance: 0.0,
            variance_x: 0.0,
            variance_y: 0.0,
        },
        |acc, (ms, &p)| {
            let dx = x(ms) - mean_x;
            let dy = y(ms) - mean_y;
            Moments {
                covariance: acc.covariance + p * dx * dy,
                variance_x: acc.variance_x + p * dx * dx,
                variance_y: acc.variance_y + p * dy * dy,
            }
        },
    )
}

fn require_multiple_states(residue: &Residue) -> Result<(), InsufficientDataError> {
    if residue.has_single_state() {
        return Err(InsufficientDataError::SingleState {
            residue: residue.to_string(),
        });
    }
    Ok(())
}

fn indicator(target: StateRef) -> impl Fn(&Microstate) -> f64 {
    move |ms| {
        if ms.state_of(target.residue) == Some(target.state) {
            1.0
        } else {
            0.0
        }
    }
}

fn active_charge(residue: &Residue, index: ResidueIndex) -> impl Fn(&Microstate) -> f64 + '_ {
    move |ms| {
        ms.state_of(index)
            .and_then(|s| residue.state(s))
            .map_or(0.0, |st| st.charge())
    }
}

fn pearson(
    moments: Moments,
    first: &Residue,
    second: &Residue,
    quantity: impl Fn(bool) -> String,
) -> Result<f64, InsufficientDataError> {
    if moments.variance_x <= VARIANCE_EPSILON {
        return Err(InsufficientDataError::NoVariance {
            residue: first.to_string(),
            quantity: quantity(true),
        });
    }
    if moments.variance_y <= VARIANCE_EPSILON {
        return Err(InsufficientDataError::NoVariance {
            residue: second.to_string(),
            quantity: quantity(false),
        });
    }
    let r = moments.covariance / (moments.variance_x * moments.variance_y).sqrt();
    Ok(r.clamp(-1.0, 1.0))
}

/// Weighted Pearson correlation of the indicator variables "residue `a.residue` is in
/// state `a.state`" and "residue `b.residue` is in state `b.state`".
///
/// # Errors
///
/// Returns [`EngineError::InsufficientData`] if either residue has a single possible
/// state or either indicator never varies, [`EngineError::InvalidState`] for
/// unknown residues or states, and [`EngineError::Consistency`] if `weights` belong to
/// a different ensemble.
pub fn state_correlation(
    ensemble: &Ensemble,
    weights: &BoltzmannWeights,
    a: StateRef,
    b: StateRef,
) -> Result<f64, EngineError> {
    weights.ensure_matches(ensemble)?;
    let table = ensemble.residue_table();
    let first = table.get(a.residue)?;
    let second = table.get(b.residue)?;
    for (residue, state_ref) in [(first, a), (second, b)] {
        table.validate_state(state_ref.residue, state_ref.state)?;
        require_multiple_states(residue)?;
    }

    let probabilities: Vec<f64> = weights.probabilities().collect();
    let moments = weighted_moments(
        ensemble.microstates(),
        &probabilities,
        indicator(a),
        indicator(b),
    );
    let label = |is_first: bool| {
        let (residue, s) = if is_first { (first, a) } else { (second, b) };
        format!(
            "occupancy of state {}",
            residue.state(s.state).map_or("?", |st| st.label())
        )
    };
    Ok(pearson(moments, first, second, label)?)
}

/// Weighted Pearson correlation of the formal charges of two residues.
pub fn charge_correlation(
    ensemble: &Ensemble,
    weights: &BoltzmannWeights,
    a: ResidueIndex,
    b: ResidueIndex,
) -> Result<f64, EngineError> {
    weights.ensure_matches(ensemble)?;
    let probabilities: Vec<f64> = weights.probabilities().collect();
    charge_correlation_with(ensemble, &probabilities, a, b)
}

fn charge_correlation_with(
    ensemble: &Ensemble,
    probabilities: &[f64],
    a: ResidueIndex,
    b: ResidueIndex,
) -> Result<f64, EngineError> {
    let table = ensemble.residue_table();
    let first = table.get(a)?;
    let second = table.get(b)?;
    require_multiple_states(first)?;
    require_multiple_states(second)?;

    let moments = weighted_moments(
        ensemble.microstates(),
        probabilities,
        active_charge(first, a),
        active_charge(second, b),
    );
    Ok(pearson(moments, first, second, |_| "charge".to_string())?)
}

/// Charge correlation of every unordered pair drawn from `residues`.
///
/// Pairs whose correlation is undefined are collected in
/// [`CorrelationReport::skipped`] instead of aborting. With the `parallel` feature the
/// pairs are evaluated concurrently; the report order is the canonical pair order
/// either way.
#[instrument(skip_all, name = "pair_correlation", fields(residues = residues.len()))]
pub fn correlate_residue_pairs(
    ensemble: &Ensemble,
    weights: &BoltzmannWeights,
    residues: &[ResidueIndex],
    reporter: &ProgressReporter,
) -> Result<CorrelationReport, EngineError> {
    weights.ensure_matches(ensemble)?;
    let table = ensemble.residue_table();
    for &index in residues {
        table.get(index)?;
    }
    let pairs: Vec<(ResidueIndex, ResidueIndex)> = residues
        .iter()
        .copied()
        .unique()
        .sorted()
        .tuple_combinations()
        .collect();
    let probabilities: Vec<f64> = weights.probabilities().collect();

    reporter.report(Progress::TaskStart {
        total_steps: pairs.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = pairs.iter();

    #[cfg(feature = "parallel")]
    let iterator = pairs.par_iter();

    let results: Vec<Result<f64, EngineError>> = iterator
        .map(|&(a, b)| {
            let result = charge_correlation_with(ensemble, &probabilities, a, b);
            reporter.report(Progress::TaskIncrement { steps: 1 });
            result
        })
        .collect();

    reporter.report(Progress::TaskFinish);

    let mut report = CorrelationReport::default();
    for ((first, second), result) in pairs.into_iter().zip(results) {
        match result {
            Ok(coefficient) => report.pairs.push(PairCorrelation {
                first,
                second,
                coefficient,
            }),
            Err(EngineError::InsufficientData(reason)) => report.skipped.push(SkippedPair {
                first,
                second,
                reason,
            }),
            Err(other) => return Err(other),
        }
    }

    if !report.skipped.is_empty() {
        warn!(
            skipped = report.skipped.len(),
            "Some residue pairs have undefined correlation and were skipped."
        );
    }
    info!(pairs = report.pairs.len(), "Pairwise charge correlation complete.");
    Ok(report)
}
