//! Error taxonomy for CFG construction and analysis.

use thiserror::Error;

/// Failures that can abort a [`crate::builder::CfgBuilder::build`] call.
///
/// Only truly invalid input reaches this type. Break/continue outside a
/// loop and a failed nested-function build are recoverable per the
/// failure semantics and are logged through `tracing` instead.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

/// Failures surfaced by the reachability analyzer.
///
/// Reachability never fails on a well-formed [`crate::graph::Cfg`]; the
/// only failure mode is a caller supplying a seed block that does not
/// belong to the graph being analyzed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}
