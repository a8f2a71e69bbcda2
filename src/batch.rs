//! Parallel analysis across every CFG produced by [`crate::builder::CfgBuilder::build_all`].
//!
//! Each [`Cfg`] is immutable once built, so reachability and complexity can
//! run over the whole map concurrently: analyzers allocate their own
//! scratch state per call and share no mutable state with one another.

use rustc_hash::FxHashMap;
use rayon::prelude::*;

use crate::complexity::{self, ComplexityConfig, ComplexityResult};
use crate::graph::Cfg;
use crate::reachability::{self, ReachabilityResult};

/// Runs the reachability analyzer over every CFG in `cfgs`, keyed by the
/// same qualified name [`crate::builder::CfgBuilder::build_all`] used.
pub fn analyze_all(cfgs: &FxHashMap<String, Cfg>) -> FxHashMap<String, ReachabilityResult> {
    cfgs.par_iter()
        .map(|(name, cfg)| (name.clone(), reachability::analyze(cfg)))
        .collect()
}

/// Runs the complexity calculator over every CFG in `cfgs` under `config`.
pub fn complexity_all(
    cfgs: &FxHashMap<String, Cfg>,
    config: &ComplexityConfig,
) -> FxHashMap<String, ComplexityResult> {
    cfgs.par_iter()
        .map(|(name, cfg)| (name.clone(), complexity::compute(cfg, config)))
        .collect()
}
