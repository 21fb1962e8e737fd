//! # Core Models Module
//!
//! Data structures representing a sampled microstate ensemble.
//!
//! ## Key Components
//!
//! - [`ids`] - Positional identifiers for residues, microstates and clusters
//! - [`residue`] - Residue identity and its ordered list of discrete states
//! - [`microstate`] - One sampled assignment of states across all residues
//! - [`ensemble`] - The residue table in canonical order, the validated builder and the
//!   read-only ensemble consumed by every engine
//!
//! ## Usage
//!
//! ```ignore
//! use msprot::core::models::ensemble::{EnsembleBuilder, ResidueTable};
//! use msprot::core::models::residue::{Residue, State};
//!
//! let mut table = ResidueTable::new();
//! table.push(Residue::new('A', 12, "ASP", vec![State::new("ASP0", 0.0)?, State::new("ASP-", -1.0)?])?)?;
//!
//! let mut builder = EnsembleBuilder::new(table);
//! builder.push_microstate(5, 0.0, vec![1])?;
//! let ensemble = builder.build();
//! ```

pub mod ensemble;
pub mod ids;
pub mod microstate;
pub mod residue;
