//! # Engine Module
//!
//! Numerical analysis of a loaded microstate [`Ensemble`](crate::core::models::ensemble::Ensemble).
//!
//! ## Overview
//!
//! Every engine borrows the ensemble immutably and returns an independently owned
//! result, so phases can be run, repeated or skipped without affecting each other.
//! Thermodynamic parameters and thresholds are passed in explicitly through
//! [`config::AnalysisConfig`]; nothing is read from global state.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Temperature, energy unit, clustering and correlation settings
//! - **Weights** ([`weights`]) - Boltzmann weights, partition value and free energy
//! - **Occupancy** ([`occupancy`]) - Per-residue state fractions and average charges
//! - **Correlation** ([`correlation`]) - Weighted Pearson correlation of states and charges
//! - **Clustering** ([`clustering`]) - Deterministic first-match grouping of microstates
//! - **Ranking** ([`ranking`]) - Top microstates and clusters by weight
//! - **Summary** ([`summary`]) - Plain tables for external reporting
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-specific error types
//!
//! Only pairwise correlation runs in parallel (with the `parallel` feature); the other
//! phases are sequential so that repeated runs produce bit-identical results.

pub mod clustering;
pub mod config;
pub(crate) mod context;
pub mod correlation;
pub mod error;
pub mod occupancy;
pub mod progress;
pub mod ranking;
pub mod summary;
pub mod weights;
