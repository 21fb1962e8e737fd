//! # Workflows Module
//!
//! High-level entry points that run the complete analysis pipeline.
//!
//! ## Overview
//!
//! A workflow takes a decoded ensemble (or a path to a crgms file) and an
//! [`AnalysisConfig`](crate::engine::config::AnalysisConfig), runs every engine phase in
//! order and returns the derived results together with the summary tables.
//!
//! - **Analysis Workflow** ([`analyze`]) - Weights, occupancy, optional correlation,
//!   clustering, ranking and summary tables

pub mod analyze;
