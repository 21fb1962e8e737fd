//! Provides input/output for microstate ensembles and analysis tables.
//!
//! The [`crgms`] module reads and writes the compact charge-microstate text format,
//! behind the format-agnostic [`traits::EnsembleFile`] interface. The [`tables`] module
//! holds the plain tabular structure produced by the summary builder and writes it as
//! delimited text.

pub mod crgms;
pub mod tables;
pub mod traits;
