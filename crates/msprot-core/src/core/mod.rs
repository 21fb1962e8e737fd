//! # Core Module
//!
//! Fundamental data structures and I/O for protonation microstate ensembles.
//!
//! ## Architecture
//!
//! - **Ensemble Representation** ([`models`]) - Residues, their discrete states, microstates
//!   and the immutable ensemble that owns them
//! - **File I/O** ([`io`]) - The crgms text format and delimited summary tables
//! - **Residue Knowledge** ([`utils`]) - Classification of residues by ionization behavior
//!
//! Everything in this module is free of thermodynamic parameters; temperature, energy
//! units and thresholds only enter in [`crate::engine`].

pub mod io;
pub mod models;
pub mod utils;
