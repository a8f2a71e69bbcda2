//! Forward-closure reachability analysis and dead-code classification (C4).

use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::graph::{BlockId, Cfg};

/// Result of [`analyze`] / [`analyze_from`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReachabilityResult {
    pub reachable_blocks: FxHashSet<BlockId>,
    pub unreachable_blocks: FxHashSet<BlockId>,
    pub reachable_count: usize,
    pub unreachable_count: usize,
    pub total_blocks: usize,
    #[serde(with = "duration_as_micros")]
    pub analysis_time: Duration,
}

mod duration_as_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}

impl ReachabilityResult {
    /// `has_unreachable_code()`: true iff any unreachable block carries a statement.
    pub fn has_unreachable_code(&self, cfg: &Cfg) -> bool {
        self.unreachable_blocks
            .iter()
            .any(|id| !cfg.block(*id).is_empty())
    }

    /// `unreachable_with_statements()`: the unreachable blocks that carry ≥1 statement.
    pub fn unreachable_with_statements<'a>(&self, cfg: &'a Cfg) -> FxHashMap<BlockId, &'a crate::graph::Block> {
        self.unreachable_blocks
            .iter()
            .filter_map(|id| {
                let block = cfg.block(*id);
                if block.is_empty() {
                    None
                } else {
                    Some((*id, block))
                }
            })
            .collect()
    }

    /// `reachability_ratio()`: `reachable_count / total_blocks`, `1.0` when `total_blocks == 0`.
    pub fn reachability_ratio(&self) -> f64 {
        if self.total_blocks == 0 {
            1.0
        } else {
            self.reachable_count as f64 / self.total_blocks as f64
        }
    }
}

/// A reachability analyzer over a single CFG, supporting additional seed entry points.
pub struct ReachabilityAnalyzer<'a> {
    cfg: &'a Cfg,
    extra_entry_points: Vec<BlockId>,
}

impl<'a> ReachabilityAnalyzer<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        ReachabilityAnalyzer {
            cfg,
            extra_entry_points: Vec::new(),
        }
    }

    /// `add_entry_point(block)`: extends the seed set used by [`Self::analyze`].
    ///
    /// Used by downstream analyses that treat exception-handler entries as
    /// independently reachable regardless of whether any `raise`/`try`
    /// actually transfers control to them in this particular CFG.
    pub fn add_entry_point(&mut self, block: BlockId) {
        self.extra_entry_points.push(block);
    }

    /// `analyze(cfg)`: forward closure seeded from the CFG's entry plus any
    /// extra entry points registered via [`Self::add_entry_point`].
    pub fn analyze(&self) -> ReachabilityResult {
        let mut seeds = vec![self.cfg.entry];
        seeds.extend(self.extra_entry_points.iter().copied());
        self.analyze_seeds(&seeds)
    }

    /// `analyze_from(block)`: forward closure using `block` as the sole seed.
    pub fn analyze_from(&self, block: BlockId) -> ReachabilityResult {
        self.analyze_seeds(&[block])
    }

    fn analyze_seeds(&self, seeds: &[BlockId]) -> ReachabilityResult {
        let started = std::time::Instant::now();
        let reachable = find_reachable_blocks(self.cfg, seeds);

        let total_blocks = self.cfg.blocks.len();
        let unreachable: FxHashSet<BlockId> = self
            .cfg
            .blocks
            .keys()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();

        ReachabilityResult {
            reachable_count: reachable.len(),
            unreachable_count: unreachable.len(),
            total_blocks,
            reachable_blocks: reachable,
            unreachable_blocks: unreachable,
            analysis_time: started.elapsed(),
        }
    }
}

/// Convenience wrapper equivalent to `ReachabilityAnalyzer::new(cfg).analyze()`.
pub fn analyze(cfg: &Cfg) -> ReachabilityResult {
    ReachabilityAnalyzer::new(cfg).analyze()
}

/// Convenience wrapper equivalent to `ReachabilityAnalyzer::new(cfg).analyze_from(block)`.
pub fn analyze_from(cfg: &Cfg, block: BlockId) -> ReachabilityResult {
    ReachabilityAnalyzer::new(cfg).analyze_from(block)
}

/// Forward BFS over all edge kinds from `seeds`, terminating via a visited set.
fn find_reachable_blocks(cfg: &Cfg, seeds: &[BlockId]) -> FxHashSet<BlockId> {
    let mut visited: FxHashSet<BlockId> = FxHashSet::default();
    let mut stack: Vec<BlockId> = seeds.to_vec();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(block) = cfg.blocks.get(&id) else {
            continue;
        };
        for edge in &block.successors {
            if !visited.contains(&edge.to) {
                stack.push(edge.to);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    #[test]
    fn empty_cfg_is_fully_reachable_with_ratio_one() {
        let mut cfg = Cfg::new_cfg("m");
        let entry = cfg.entry;
        let exit = cfg.exit;
        cfg.connect(entry, exit, EdgeKind::Normal);

        let result = analyze(&cfg);
        assert_eq!(result.reachable_count + result.unreachable_count, result.total_blocks);
        assert_eq!(result.reachability_ratio(), 1.0);
    }

    #[test]
    fn block_after_return_is_unreachable_and_flagged_as_dead_code() {
        let mut cfg = Cfg::new_cfg("m");
        let entry = cfg.entry;
        let exit = cfg.exit;
        let body = cfg.create_block("func_body");
        cfg.connect(entry, body, EdgeKind::Normal);
        cfg.connect(body, exit, EdgeKind::Return);

        let dead_block = cfg.create_block("unreachable");
        cfg.block_mut(dead_block)
            .statements
            .push(crate::ast::Node::new(crate::ast::NodeKind::Assign));

        let result = analyze(&cfg);
        assert!(result.unreachable_blocks.contains(&dead_block));
        assert!(result.has_unreachable_code(&cfg));
        assert_eq!(result.unreachable_with_statements(&cfg).len(), 1);
    }

    #[test]
    fn empty_unreachable_block_is_not_dead_code() {
        let mut cfg = Cfg::new_cfg("m");
        let entry = cfg.entry;
        let exit = cfg.exit;
        cfg.connect(entry, exit, EdgeKind::Normal);
        cfg.create_block("unreachable"); // carries no statements

        let result = analyze(&cfg);
        assert!(!result.has_unreachable_code(&cfg));
    }

    #[test]
    fn add_entry_point_extends_seed_set() {
        let mut cfg = Cfg::new_cfg("m");
        let entry = cfg.entry;
        let exit = cfg.exit;
        let orphan_handler = cfg.create_block("except_block");
        cfg.connect(orphan_handler, exit, EdgeKind::Normal);
        cfg.connect(entry, exit, EdgeKind::Normal);

        let mut analyzer = ReachabilityAnalyzer::new(&cfg);
        let baseline = analyzer.analyze();
        assert!(!baseline.reachable_blocks.contains(&orphan_handler));

        analyzer.add_entry_point(orphan_handler);
        let extended = analyzer.analyze();
        assert!(extended.reachable_blocks.contains(&orphan_handler));
    }
}
