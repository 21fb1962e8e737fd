//! # msprot Core Library
//!
//! Boltzmann-weighted analysis of protonation microstate ensembles sampled by a
//! continuum-electrostatics simulation. Every microstate assigns one discrete
//! protonation/tautomer state to each tracked residue and carries an energy and the
//! number of times it was sampled.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Immutable data models (`Ensemble`, `ResidueTable`,
//!   `Microstate`), the charge-microstate ("crgms") reader and writer, and delimited
//!   table output.
//!
//! - **[`engine`]: The Logic Core.** Stateless numerical engines that borrow an
//!   `Ensemble` and produce owned results: Boltzmann weights, per-residue occupancy,
//!   pairwise correlation, microstate clustering, ranking and summary tables.
//!
//! - **[`workflows`]: The Public API.** Ties `core` and `engine` together into a single
//!   analysis run driven by an [`engine::config::AnalysisConfig`].

pub mod core;
pub mod engine;
pub mod workflows;
