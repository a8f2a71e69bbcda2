//! Graph primitives: basic blocks, typed edges, the CFG container, and
//! visitor traversal (C1).

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::Node;

/// Stable identifier of a [`Block`] within its owning [`Cfg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of control-flow transfer an [`Edge`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Fall-through or unconditional transfer.
    Normal,
    /// The "predicate held" branch of an `if`/`while`/`for`/comprehension filter/match guard.
    CondTrue,
    /// The "predicate failed" branch of the same constructs.
    CondFalse,
    /// An exceptional transfer: `raise`, try-body-to-handler, or failed context-manager setup.
    Exception,
    /// A loop back-edge to its header.
    Loop,
    /// Transfer to the exit of the innermost enclosing loop.
    Break,
    /// Transfer to the header of the innermost enclosing loop.
    Continue,
    /// Transfer toward the function's EXIT (directly, or via a pending finally).
    Return,
}

/// A directed, typed control-flow edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

/// A maximal straight-line run of statements with a single entry/exit
/// with respect to control flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub statements: Vec<Node>,
    pub predecessors: Vec<Edge>,
    pub successors: Vec<Edge>,
    pub is_entry: bool,
    pub is_exit: bool,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// True once this block ends in a return/raise/break/continue-shaped
    /// transfer, i.e. it already carries an outgoing edge whose kind is
    /// not `Normal`/`CondTrue`/`CondFalse`.
    pub fn has_terminating_successor(&self) -> bool {
        self.successors.iter().any(|e| {
            matches!(
                e.kind,
                EdgeKind::Return | EdgeKind::Exception | EdgeKind::Break | EdgeKind::Continue
            )
        })
    }
}

/// A per-function control-flow graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cfg {
    pub name: String,
    pub entry: BlockId,
    pub exit: BlockId,
    pub blocks: FxHashMap<BlockId, Block>,
    next_id: usize,
}

/// Outcome of a single visitor callback, directing traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    Stop,
}

impl Cfg {
    /// `new_cfg(name)`: a CFG with entry and exit already present and disconnected.
    pub fn new_cfg(name: impl Into<String>) -> Self {
        let mut cfg = Cfg {
            name: name.into(),
            entry: BlockId(0),
            exit: BlockId(1),
            blocks: FxHashMap::default(),
            next_id: 0,
        };
        let entry_id = cfg.mint_id();
        cfg.blocks.insert(
            entry_id,
            Block {
                id: entry_id,
                label: "ENTRY".to_string(),
                statements: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
                is_entry: true,
                is_exit: false,
            },
        );
        let exit_id = cfg.mint_id();
        cfg.blocks.insert(
            exit_id,
            Block {
                id: exit_id,
                label: "EXIT".to_string(),
                statements: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
                is_entry: false,
                is_exit: true,
            },
        );
        cfg.entry = entry_id;
        cfg.exit = exit_id;
        cfg
    }

    fn mint_id(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        id
    }

    /// `create_block(label_prefix)`: a fresh block labeled `<prefix>_<counter>`.
    pub fn create_block(&mut self, label_prefix: &str) -> BlockId {
        let id = self.mint_id();
        let label = format!("{label_prefix}_{}", id.0);
        self.blocks.insert(
            id,
            Block {
                id,
                label,
                statements: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
                is_entry: false,
                is_exit: false,
            },
        );
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks
            .get(&id)
            .unwrap_or_else(|| panic!("block {id} does not exist in cfg {}", self.name))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("block {id} does not exist in cfg {}", self.name))
    }

    /// `connect(from, to, kind)`: appends an edge to both endpoints' lists.
    ///
    /// A no-op if either endpoint does not exist in this CFG (the "nil
    /// endpoint" case from the design is represented here by a missing id).
    pub fn connect(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        if !self.blocks.contains_key(&from) || !self.blocks.contains_key(&to) {
            return;
        }
        let edge = Edge { from, to, kind };
        self.block_mut(from).successors.push(edge);
        self.block_mut(to).predecessors.push(edge);
    }

    pub fn has_successor(&self, from: BlockId, to: BlockId) -> bool {
        self.blocks
            .get(&from)
            .is_some_and(|b| b.successors.iter().any(|e| e.to == to))
    }

    /// `remove_block(b)`: detaches `b` from every predecessor/successor.
    /// Refuses to remove entry or exit.
    pub fn remove_block(&mut self, id: BlockId) {
        if id == self.entry || id == self.exit {
            return;
        }
        let Some(removed) = self.blocks.remove(&id) else {
            return;
        };
        for edge in &removed.predecessors {
            if let Some(pred) = self.blocks.get_mut(&edge.from) {
                pred.successors.retain(|e| e.to != id);
            }
        }
        for edge in &removed.successors {
            if let Some(succ) = self.blocks.get_mut(&edge.to) {
                succ.predecessors.retain(|e| e.from != id);
            }
        }
    }

    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    /// Depth-first preorder traversal from `start`, visiting each block
    /// at most once. `on_block`/`on_edge` may request early termination.
    pub fn dfs(
        &self,
        start: BlockId,
        mut on_block: impl FnMut(&Block) -> VisitControl,
        mut on_edge: impl FnMut(&Edge) -> VisitControl,
    ) {
        let mut visited: std::collections::HashSet<BlockId> = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(block) = self.blocks.get(&id) else {
                continue;
            };
            if on_block(block) == VisitControl::Stop {
                return;
            }
            for edge in block.successors.iter() {
                if on_edge(edge) == VisitControl::Stop {
                    return;
                }
                if !visited.contains(&edge.to) {
                    stack.push(edge.to);
                }
            }
        }
    }

    /// Breadth-first traversal from `start`, visiting each block at most once.
    pub fn bfs(
        &self,
        start: BlockId,
        mut on_block: impl FnMut(&Block) -> VisitControl,
        mut on_edge: impl FnMut(&Edge) -> VisitControl,
    ) {
        let mut enqueued: std::collections::HashSet<BlockId> = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(start);
        enqueued.insert(start);
        while let Some(id) = queue.pop_front() {
            let Some(block) = self.blocks.get(&id) else {
                continue;
            };
            if on_block(block) == VisitControl::Stop {
                return;
            }
            for edge in block.successors.iter() {
                if on_edge(edge) == VisitControl::Stop {
                    return;
                }
                if enqueued.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cfg {} ({} blocks)", self.name, self.blocks.len())?;
        let mut ids: Vec<_> = self.blocks.keys().copied().collect();
        ids.sort();
        for id in ids {
            let block = &self.blocks[&id];
            let successors: Vec<String> = block
                .successors
                .iter()
                .map(|e| format!("{}:{:?}", e.to, e.kind))
                .collect();
            writeln!(
                f,
                "  {} [{}] stmts={} -> {}",
                block.id,
                block.label,
                block.statements.len(),
                successors.join(", ")
            )?;
        }
        Ok(())
    }
}
