//! McCabe cyclomatic complexity and risk classification (C5).

use serde::{Deserialize, Serialize};

use crate::ast::NodeKind;
use crate::graph::{Cfg, EdgeKind};

/// Thresholds separating `low`/`medium`/`high` risk.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ComplexityConfig {
    pub low_max: u32,
    pub medium_max: u32,
}

impl Default for ComplexityConfig {
    /// Thresholds modeled on the conventional McCabe bands: `1-10` low,
    /// `11-20` medium, `21+` high.
    fn default() -> Self {
        ComplexityConfig {
            low_max: 10,
            medium_max: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl ComplexityConfig {
    pub fn classify(&self, complexity: u32) -> RiskLevel {
        if complexity <= self.low_max {
            RiskLevel::Low
        } else if complexity <= self.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Per-function complexity result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplexityResult {
    pub complexity: u32,
    pub edges: usize,
    pub nodes: usize,
    pub connected_components: u32,
    pub function_name: String,
    pub if_statements: u32,
    pub loop_statements: u32,
    pub exception_handlers: u32,
    pub switch_cases: u32,
    pub risk_level: RiskLevel,
}

/// Computes a [`ComplexityResult`] for `cfg` under `config`.
///
/// `complexity = max(1, D + H + S + 1)`, where `D` is the number of
/// distinct decision-point blocks (a block counts once even if it has
/// both a `CondTrue` and a `CondFalse` outgoing edge), `H` is the number
/// of `Exception`-kind edges, and `S` is reserved for switch/pattern-match
/// cases folded in separately from `D`.
pub fn compute(cfg: &Cfg, config: &ComplexityConfig) -> ComplexityResult {
    let mut decision_blocks = 0u32;
    let mut exception_edges = 0u32;
    let mut if_statements = 0u32;
    let mut loop_statements = 0u32;
    let mut exception_handlers = 0u32;
    let mut switch_cases = 0u32;
    let mut edge_count = 0usize;

    for block in cfg.blocks.values() {
        let has_condition_edge = block
            .successors
            .iter()
            .any(|e| matches!(e.kind, EdgeKind::CondTrue | EdgeKind::CondFalse));
        if has_condition_edge {
            decision_blocks += 1;
        }

        for edge in &block.successors {
            edge_count += 1;
            if edge.kind == EdgeKind::Exception {
                exception_edges += 1;
            }
        }

        for stmt in &block.statements {
            match stmt.kind {
                NodeKind::If => if_statements += 1,
                NodeKind::While | NodeKind::For | NodeKind::AsyncFor => loop_statements += 1,
                NodeKind::Try => exception_handlers += stmt.handlers.len() as u32,
                NodeKind::Match => switch_cases += stmt.cases.len() as u32,
                _ => {}
            }
        }
    }

    let decision_points = decision_blocks;
    let handler_transfers = exception_edges;
    let switch_term = 0u32; // reserved: folded into D only when pattern matching contributes decisions directly
    let complexity = (decision_points + handler_transfers + switch_term + 1).max(1);

    ComplexityResult {
        complexity,
        edges: edge_count,
        nodes: cfg.blocks.len(),
        connected_components: 1,
        function_name: cfg.name.clone(),
        if_statements,
        loop_statements,
        exception_handlers,
        switch_cases,
        risk_level: config.classify(complexity),
    }
}

/// Aggregate statistics over a batch of [`ComplexityResult`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregateComplexity {
    pub total: usize,
    pub avg: f64,
    pub min: u32,
    pub max: u32,
    pub low_count: usize,
    pub medium_count: usize,
    pub high_count: usize,
}

/// Computes an [`AggregateComplexity`] over `results`; all fields are
/// zeroed (`avg = 0.0`) for an empty slice.
pub fn aggregate(results: &[ComplexityResult]) -> AggregateComplexity {
    if results.is_empty() {
        return AggregateComplexity {
            total: 0,
            avg: 0.0,
            min: 0,
            max: 0,
            low_count: 0,
            medium_count: 0,
            high_count: 0,
        };
    }

    let total = results.len();
    let sum: u64 = results.iter().map(|r| r.complexity as u64).sum();
    let min = results.iter().map(|r| r.complexity).min().unwrap();
    let max = results.iter().map(|r| r.complexity).max().unwrap();

    let mut low_count = 0;
    let mut medium_count = 0;
    let mut high_count = 0;
    for r in results {
        match r.risk_level {
            RiskLevel::Low => low_count += 1,
            RiskLevel::Medium => medium_count += 1,
            RiskLevel::High => high_count += 1,
        }
    }

    AggregateComplexity {
        total,
        avg: sum as f64 / total as f64,
        min,
        max,
        low_count,
        medium_count,
        high_count,
    }
}
