//! Concrete AST node shape consumed by the builder.
//!
//! The AST producer itself lives outside this crate; this module only
//! fixes the node shape §6 of the design requires so the builder has a
//! concrete type to match on. A real front end constructs these nodes
//! from parsed source; tests construct them by hand.

use serde::{Deserialize, Serialize};

/// Closed enumeration of statement/expression kinds the builder dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Module,
    FunctionDef,
    AsyncFunctionDef,
    ClassDef,
    Return,
    Raise,
    If,
    For,
    AsyncFor,
    While,
    With,
    AsyncWith,
    Try,
    Match,
    Break,
    Continue,
    Pass,
    Assign,
    AugAssign,
    AnnAssign,
    Expr,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    Delete,
    Assert,
    NamedExpr,
    /// A comprehension appearing in expression position (list/set/dict/gen).
    Comprehension,
    /// Any expression the builder does not need to look inside.
    Generic,
}

/// One arm of a `match` statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Box<Node>,
    pub guard: Option<Box<Node>>,
    pub body: Vec<Node>,
}

/// One `except` clause of a `try` statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub kind: Option<Box<Node>>,
    pub name: Option<String>,
    pub body: Vec<Node>,
}

/// One context-manager item of a `with` statement (`with a as b, c as d:`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithItem {
    pub context_expr: Box<Node>,
    pub optional_vars: Option<Box<Node>>,
}

/// One `for ... in ...` clause of a comprehension, plus its `if` filters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Box<Node>,
    pub iter: Box<Node>,
    pub ifs: Vec<Node>,
    pub is_async: bool,
}

/// A polymorphic AST node.
///
/// Not every field is populated for every `kind`; §6 lists which fields
/// are meaningful for which statement kinds. Fields irrelevant to a
/// given kind are left at their default (empty vec / `None`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub body: Vec<Node>,
    pub orelse: Vec<Node>,
    pub test: Option<Box<Node>>,
    pub finalbody: Vec<Node>,
    pub handlers: Vec<ExceptHandler>,
    pub cases: Vec<MatchCase>,
    pub items: Vec<WithItem>,
    pub generators: Vec<Comprehension>,
    pub elt: Option<Box<Node>>,
    /// Opaque nested expressions, walked only to discover embedded
    /// `Comprehension` / `NamedExpr` occurrences.
    pub children: Vec<Node>,
    pub start_line: u32,
    pub end_line: u32,
}

impl Node {
    /// Builds a bare node of `kind` with every other field empty/default.
    ///
    /// Test fixtures and callers further populate the fields relevant to
    /// `kind` (`body`, `test`, `handlers`, ...) after construction.
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            name: None,
            body: Vec::new(),
            orelse: Vec::new(),
            test: None,
            finalbody: Vec::new(),
            handlers: Vec::new(),
            cases: Vec::new(),
            items: Vec::new(),
            generators: Vec::new(),
            elt: None,
            children: Vec::new(),
            start_line: 0,
            end_line: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_body(mut self, body: Vec<Node>) -> Self {
        self.body = body;
        self
    }

    pub fn with_orelse(mut self, orelse: Vec<Node>) -> Self {
        self.orelse = orelse;
        self
    }

    pub fn with_test(mut self, test: Node) -> Self {
        self.test = Some(Box::new(test));
        self
    }

    pub fn with_finalbody(mut self, finalbody: Vec<Node>) -> Self {
        self.finalbody = finalbody;
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<ExceptHandler>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_cases(mut self, cases: Vec<MatchCase>) -> Self {
        self.cases = cases;
        self
    }

    pub fn with_items(mut self, items: Vec<WithItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_generators(mut self, generators: Vec<Comprehension>) -> Self {
        self.generators = generators;
        self
    }

    /// Does this expression subtree contain a comprehension or walrus
    /// (`NamedExpr`) the builder must lower separately?
    pub fn contains_comprehension_or_named_expr(&self) -> bool {
        matches!(self.kind, NodeKind::Comprehension | NodeKind::NamedExpr)
            || self
                .children
                .iter()
                .any(Node::contains_comprehension_or_named_expr)
    }
}
