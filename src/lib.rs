//! Control-flow graph construction, reachability analysis, and cyclomatic
//! complexity for a dynamically-typed, indentation-structured scripting
//! language.
//!
//! The crate does not parse source text: it consumes AST nodes ([`ast`])
//! built by an external producer and turns each function/module/class
//! into a [`graph::Cfg`] ([`builder`]), then answers reachability
//! ([`reachability`]) and complexity ([`complexity`]) questions over the
//! result. Source loading, reporting, and configuration-file parsing are
//! left to callers.

pub mod ast;
pub mod batch;
pub mod builder;
pub mod complexity;
pub mod error;
pub mod graph;
pub mod reachability;

pub use ast::{Comprehension, ExceptHandler, MatchCase, Node, NodeKind, WithItem};
pub use builder::CfgBuilder;
pub use complexity::{AggregateComplexity, ComplexityConfig, ComplexityResult, RiskLevel};
pub use error::{AnalysisError, BuildError};
pub use graph::{Block, BlockId, Cfg, Edge, EdgeKind};
pub use reachability::{ReachabilityAnalyzer, ReachabilityResult};
