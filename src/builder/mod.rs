//! Walks an AST and emits the blocks and edges of its control-flow graph (C3).

pub mod context;

use rustc_hash::FxHashMap;

use crate::ast::{Node, NodeKind};
use crate::error::BuildError;
use crate::graph::{Cfg, EdgeKind, BlockId};
use context::{BuilderContext, ExceptionFrame, LoopFrame};

pub struct CfgBuilder {
    cfg: Cfg,
    ctx: BuilderContext,
}

impl CfgBuilder {
    fn new(name: impl Into<String>) -> Self {
        let cfg = Cfg::new_cfg(name);
        let entry = cfg.entry;
        CfgBuilder {
            cfg,
            ctx: BuilderContext::new(entry),
        }
    }

    /// `build(node)`: a single CFG for `node` (a module, function, or class).
    pub fn build(node: &Node) -> Result<Cfg, BuildError> {
        let mut nested = FxHashMap::default();
        Self::build_root(node, Vec::new(), &mut nested)
    }

    /// Same as [`Self::build`], wrapped in `anyhow` for callers that thread
    /// a single catch-all error type through a pipeline of fallible stages.
    pub fn build_with_context(node: &Node) -> anyhow::Result<Cfg> {
        use anyhow::Context;
        Self::build(node).context("failed to build control-flow graph")
    }

    /// `build_all(node)`: `qualified_name -> CFG` for `node` and every
    /// function/method reachable through nested definitions.
    pub fn build_all(node: &Node) -> FxHashMap<String, Cfg> {
        let mut nested = FxHashMap::default();
        match Self::build_root(node, Vec::new(), &mut nested) {
            Ok(cfg) => {
                nested.insert(cfg.name.clone(), cfg);
            }
            Err(err) => {
                tracing::warn!(error = %err, "root CFG build failed");
            }
        }
        nested
    }

    fn build_root(
        node: &Node,
        scope_stack: Vec<String>,
        nested: &mut FxHashMap<String, Cfg>,
    ) -> Result<Cfg, BuildError> {
        let name = match node.kind {
            NodeKind::Module => "__main__".to_string(),
            NodeKind::FunctionDef | NodeKind::AsyncFunctionDef | NodeKind::ClassDef => {
                node.name.clone().ok_or_else(|| BuildError::InvalidInput {
                    reason: "def node is missing a name".to_string(),
                })?
            }
            other => {
                return Err(BuildError::InvalidInput {
                    reason: format!("{other:?} is not a valid CFG root"),
                });
            }
        };

        let mut builder = CfgBuilder::new(name);
        builder.ctx.scope_stack = scope_stack;

        let entry = builder.cfg.entry;
        let body_block = builder.cfg.create_block("func_body");
        builder.cfg.connect(entry, body_block, EdgeKind::Normal);
        builder.ctx.current_block = body_block;

        builder.build_body(&node.body, nested);
        builder.finalize();
        Ok(builder.cfg)
    }

    /// Connects a dangling `current_block` to EXIT if it isn't terminated
    /// and doesn't already lead there.
    fn finalize(&mut self) {
        let exit = self.cfg.exit;
        let current = self.ctx.current_block;
        if current != exit
            && !self.cfg.has_successor(current, exit)
            && !self.is_dead_end(current)
        {
            self.cfg.connect(current, exit, EdgeKind::Normal);
        }
    }

    fn add_statement(&mut self, node: Node) {
        self.cfg.block_mut(self.ctx.current_block).statements.push(node);
    }

    fn connect_current(&mut self, to: BlockId, kind: EdgeKind) {
        self.cfg.connect(self.ctx.current_block, to, kind);
    }

    fn fresh_unreachable(&mut self) {
        let id = self.cfg.create_block("unreachable");
        self.ctx.current_block = id;
    }

    /// True when `block` must NOT receive a synthetic fall-through edge:
    /// either it already carries an explicit non-local transfer, or it is
    /// a fresh `unreachable` placeholder installed after one (in which
    /// case the transfer lives on the block that preceded it, not here).
    fn is_dead_end(&self, block: BlockId) -> bool {
        let b = self.cfg.block(block);
        b.label.starts_with("unreachable") || b.has_terminating_successor()
    }

    fn build_body(&mut self, body: &[Node], nested: &mut FxHashMap<String, Cfg>) {
        for stmt in body {
            self.build_statement(stmt, nested);
        }
    }

    fn build_statement(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        match node.kind {
            NodeKind::Return => self.build_return(node),
            NodeKind::Raise => self.build_raise(node),
            NodeKind::Break => self.build_break(node),
            NodeKind::Continue => self.build_continue(node),
            NodeKind::If => self.build_if(node, nested, false),
            NodeKind::While => self.build_while(node, nested),
            NodeKind::For | NodeKind::AsyncFor => self.build_for(node, nested),
            NodeKind::With | NodeKind::AsyncWith => self.build_with(node, nested),
            NodeKind::Try => self.build_try(node, nested),
            NodeKind::Match => self.build_match(node, nested),
            NodeKind::FunctionDef | NodeKind::AsyncFunctionDef => {
                self.build_function_def(node, nested)
            }
            NodeKind::ClassDef => self.build_class_def(node, nested),
            _ => self.build_sequential(node),
        }
    }

    /// Assignment, expr-statement, import, global/nonlocal, delete, assert,
    /// pass and any other statement with no control-flow shape of its own.
    fn build_sequential(&mut self, node: &Node) {
        for child in &node.children {
            if child.kind == NodeKind::Comprehension {
                self.build_comprehension(child);
            }
        }
        self.add_statement(node.clone());
    }

    fn build_return(&mut self, node: &Node) {
        self.add_statement(node.clone());
        match self.ctx.innermost_finally() {
            Some(target) => self.connect_current(target, EdgeKind::Return),
            None => {
                let exit = self.cfg.exit;
                self.connect_current(exit, EdgeKind::Return);
            }
        }
        self.fresh_unreachable();
    }

    fn build_raise(&mut self, node: &Node) {
        self.add_statement(node.clone());
        if let Some(target) = self.ctx.innermost_finally() {
            self.connect_current(target, EdgeKind::Exception);
        } else if let Some(frame) = self
            .ctx
            .exception_stack
            .iter()
            .rev()
            .find(|f| !f.handlers.is_empty())
        {
            let handlers = frame.handlers.clone();
            for h in handlers {
                self.connect_current(h, EdgeKind::Exception);
            }
        } else {
            let exit = self.cfg.exit;
            self.connect_current(exit, EdgeKind::Exception);
        }
        self.fresh_unreachable();
    }

    fn build_break(&mut self, node: &Node) {
        self.add_statement(node.clone());
        match self.ctx.innermost_loop() {
            None => tracing::warn!("break statement outside of any enclosing loop; ignored"),
            Some(frame) => {
                if self.ctx.finally_stack.len() > frame.finally_depth_at_entry {
                    let target = self.ctx.innermost_finally().unwrap();
                    self.connect_current(target, EdgeKind::Break);
                } else {
                    self.connect_current(frame.exit, EdgeKind::Break);
                }
            }
        }
        self.fresh_unreachable();
    }

    fn build_continue(&mut self, node: &Node) {
        self.add_statement(node.clone());
        match self.ctx.innermost_loop() {
            None => tracing::warn!("continue statement outside of any enclosing loop; ignored"),
            Some(frame) => {
                if self.ctx.finally_stack.len() > frame.finally_depth_at_entry {
                    let target = self.ctx.innermost_finally().unwrap();
                    self.connect_current(target, EdgeKind::Continue);
                } else {
                    self.connect_current(frame.header, EdgeKind::Continue);
                }
            }
        }
        self.fresh_unreachable();
    }

    fn build_if(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>, is_elif: bool) {
        let prefix = if is_elif { "elif" } else { "if" };
        self.add_statement(node.clone());
        let predicate_block = self.ctx.current_block;

        let then_block = self.cfg.create_block(&format!("{prefix}_then"));
        let is_elif_chain = node.orelse.len() == 1 && node.orelse[0].kind == NodeKind::If;
        let else_block = if node.orelse.is_empty() {
            None
        } else {
            Some(self.cfg.create_block(&format!("{prefix}_else")))
        };
        let merge_block = self.cfg.create_block(&format!("{prefix}_merge"));

        self.cfg.connect(predicate_block, then_block, EdgeKind::CondTrue);
        match else_block {
            Some(eb) => self.cfg.connect(predicate_block, eb, EdgeKind::CondFalse),
            None => self.cfg.connect(predicate_block, merge_block, EdgeKind::CondFalse),
        }

        self.ctx.current_block = then_block;
        self.build_body(&node.body, nested);
        if !self.is_dead_end(self.ctx.current_block) {
            self.connect_current(merge_block, EdgeKind::Normal);
        }

        if let Some(eb) = else_block {
            self.ctx.current_block = eb;
            if is_elif_chain {
                self.build_if(&node.orelse[0], nested, true);
            } else {
                self.build_body(&node.orelse, nested);
            }
            if !self.is_dead_end(self.ctx.current_block) {
                self.connect_current(merge_block, EdgeKind::Normal);
            }
        }

        self.ctx.current_block = merge_block;
    }

    fn build_while(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        let header = self.cfg.create_block("loop_header");
        self.connect_current(header, EdgeKind::Normal);

        self.ctx.current_block = header;
        self.add_statement(node.clone());

        let body = self.cfg.create_block("loop_body");
        let loop_else = if node.orelse.is_empty() {
            None
        } else {
            Some(self.cfg.create_block("loop_else"))
        };
        let exit = self.cfg.create_block("loop_exit");

        self.cfg.connect(header, body, EdgeKind::CondTrue);
        match loop_else {
            Some(eb) => self.cfg.connect(header, eb, EdgeKind::CondFalse),
            None => self.cfg.connect(header, exit, EdgeKind::CondFalse),
        }

        self.ctx.loop_stack.push(LoopFrame {
            header,
            exit,
            finally_depth_at_entry: self.ctx.finally_stack.len(),
        });
        self.ctx.current_block = body;
        self.build_body(&node.body, nested);
        if !self.is_dead_end(self.ctx.current_block) {
            self.connect_current(header, EdgeKind::Loop);
        }
        self.ctx.loop_stack.pop();

        if let Some(eb) = loop_else {
            self.ctx.current_block = eb;
            self.build_body(&node.orelse, nested);
            if !self.is_dead_end(self.ctx.current_block) {
                self.connect_current(exit, EdgeKind::Normal);
            }
        }

        self.ctx.current_block = exit;
    }

    /// Same topology as `while`; the loop-variable binding is attached to
    /// the body's first block by the caller, not to the header.
    fn build_for(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        let header = self.cfg.create_block("loop_header");
        self.connect_current(header, EdgeKind::Normal);

        self.ctx.current_block = header;
        self.add_statement(node.clone());

        let body = self.cfg.create_block("loop_body");
        let loop_else = if node.orelse.is_empty() {
            None
        } else {
            Some(self.cfg.create_block("loop_else"))
        };
        let exit = self.cfg.create_block("loop_exit");

        self.cfg.connect(header, body, EdgeKind::CondTrue);
        match loop_else {
            Some(eb) => self.cfg.connect(header, eb, EdgeKind::CondFalse),
            None => self.cfg.connect(header, exit, EdgeKind::CondFalse),
        }

        self.ctx.loop_stack.push(LoopFrame {
            header,
            exit,
            finally_depth_at_entry: self.ctx.finally_stack.len(),
        });
        self.ctx.current_block = body;
        self.build_body(&node.body, nested);
        if !self.is_dead_end(self.ctx.current_block) {
            self.connect_current(header, EdgeKind::Loop);
        }
        self.ctx.loop_stack.pop();

        if let Some(eb) = loop_else {
            self.ctx.current_block = eb;
            self.build_body(&node.orelse, nested);
            if !self.is_dead_end(self.ctx.current_block) {
                self.connect_current(exit, EdgeKind::Normal);
            }
        }

        self.ctx.current_block = exit;
    }

    fn build_with(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        let setup = self.cfg.create_block("with_setup");
        self.connect_current(setup, EdgeKind::Normal);
        self.ctx.current_block = setup;
        self.add_statement(node.clone());

        let body = self.cfg.create_block("with_body");
        let teardown = self.cfg.create_block("with_teardown");
        self.cfg.connect(setup, body, EdgeKind::Normal);
        self.cfg.connect(setup, teardown, EdgeKind::Exception);

        self.ctx.current_block = body;
        self.build_body(&node.body, nested);
        if !self.is_dead_end(self.ctx.current_block) {
            self.connect_current(teardown, EdgeKind::Normal);
        }

        self.ctx.current_block = teardown;
    }

    fn build_try(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        let try_block = self.cfg.create_block("try_block");
        self.connect_current(try_block, EdgeKind::Normal);

        let handler_entries: Vec<BlockId> = node
            .handlers
            .iter()
            .map(|_| self.cfg.create_block("except_block"))
            .collect();
        let try_else = if node.orelse.is_empty() {
            None
        } else {
            Some(self.cfg.create_block("try_else"))
        };
        let finally_entry = if node.finalbody.is_empty() {
            None
        } else {
            Some(self.cfg.create_block("finally_block"))
        };
        let try_merge = self.cfg.create_block("try_merge");

        self.ctx.exception_stack.push(ExceptionFrame {
            handlers: handler_entries.clone(),
            else_block: try_else,
            finally_depth_at_entry: self.ctx.finally_stack.len(),
        });
        if let Some(fb) = finally_entry {
            self.ctx.finally_stack.push(fb);
        }

        self.ctx.current_block = try_block;
        self.build_body(&node.body, nested);
        let try_tail = self.ctx.current_block;
        for h in &handler_entries {
            if !self.cfg.has_successor(try_tail, *h) {
                self.cfg.connect(try_tail, *h, EdgeKind::Exception);
            }
        }
        let after_try_target = try_else.or(finally_entry).unwrap_or(try_merge);
        if !self.is_dead_end(try_tail) {
            self.cfg.connect(try_tail, after_try_target, EdgeKind::Normal);
        }

        for (handler_node, handler_entry) in node.handlers.iter().zip(handler_entries.iter()) {
            self.ctx.current_block = *handler_entry;
            self.build_body(&handler_node.body, nested);
            let handler_tail = self.ctx.current_block;
            let after_handler_target = finally_entry.unwrap_or(try_merge);
            if !self.is_dead_end(handler_tail) {
                self.cfg.connect(handler_tail, after_handler_target, EdgeKind::Normal);
            }
        }

        if let Some(te) = try_else {
            self.ctx.current_block = te;
            self.build_body(&node.orelse, nested);
            let te_tail = self.ctx.current_block;
            let after_else_target = finally_entry.unwrap_or(try_merge);
            if !self.is_dead_end(te_tail) {
                self.cfg.connect(te_tail, after_else_target, EdgeKind::Normal);
            }
        }

        // Step 6: pop before building the finally body so a non-local
        // transfer lexically inside `finally` resolves against the
        // enclosing context, not this try's own frames.
        self.ctx.exception_stack.pop();
        if finally_entry.is_some() {
            self.ctx.finally_stack.pop();
        }

        if let Some(fb) = finally_entry {
            self.build_finally_body(fb, &node.finalbody, try_merge, nested);
        }

        self.ctx.current_block = try_merge;
    }

    /// §4.3.1: buckets the finally entry block's incoming edge kinds and
    /// emits one outgoing edge per observed kind, unless the finally body
    /// itself performs an explicit non-local transfer ("finally wins").
    fn build_finally_body(
        &mut self,
        fb: BlockId,
        body: &[Node],
        try_merge: BlockId,
        nested: &mut FxHashMap<String, Cfg>,
    ) {
        let mut kinds: Vec<EdgeKind> = self
            .cfg
            .block(fb)
            .predecessors
            .iter()
            .map(|e| e.kind)
            .collect();
        kinds.sort_by_key(|k| format!("{k:?}"));
        kinds.dedup();
        if kinds.is_empty() {
            kinds.push(EdgeKind::Normal);
        }

        self.ctx.current_block = fb;
        self.build_body(body, nested);
        let tail = self.ctx.current_block;

        if self.is_dead_end(tail) {
            return;
        }

        for kind in kinds {
            if let Some(target) = self.finally_continuation_target(kind, try_merge) {
                if target == tail {
                    continue; // never let a finally block route to itself
                }
                self.cfg.connect(tail, target, kind);
            }
        }
    }

    fn finally_continuation_target(&self, kind: EdgeKind, try_merge: BlockId) -> Option<BlockId> {
        match kind {
            EdgeKind::Normal => Some(try_merge),
            EdgeKind::Return => Some(self.ctx.innermost_finally().unwrap_or(self.cfg.exit)),
            EdgeKind::Exception => Some(
                self.ctx
                    .innermost_finally()
                    .or_else(|| {
                        self.ctx
                            .exception_stack
                            .iter()
                            .rev()
                            .find_map(|f| f.handlers.first().copied())
                    })
                    .unwrap_or(self.cfg.exit),
            ),
            EdgeKind::Break => match self.ctx.innermost_loop() {
                Some(frame) if self.ctx.finally_stack.len() > frame.finally_depth_at_entry => {
                    self.ctx.innermost_finally()
                }
                Some(frame) => Some(frame.exit),
                None => self.ctx.innermost_finally(),
            },
            EdgeKind::Continue => match self.ctx.innermost_loop() {
                Some(frame) if self.ctx.finally_stack.len() > frame.finally_depth_at_entry => {
                    self.ctx.innermost_finally()
                }
                Some(frame) => Some(frame.header),
                None => self.ctx.innermost_finally(),
            },
            EdgeKind::CondTrue | EdgeKind::CondFalse | EdgeKind::Loop => None,
        }
    }

    fn build_match(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        let eval = self.cfg.create_block("match_eval");
        self.connect_current(eval, EdgeKind::Normal);
        self.ctx.current_block = eval;
        self.add_statement(node.clone());

        let merge = self.cfg.create_block("match_merge");

        if node.cases.is_empty() {
            self.cfg.connect(eval, merge, EdgeKind::Normal);
            self.ctx.current_block = merge;
            return;
        }

        let case_blocks: Vec<BlockId> = node
            .cases
            .iter()
            .map(|_| self.cfg.create_block("match_case"))
            .collect();

        let mut predicate_block = eval;
        for (i, case_block) in case_blocks.iter().enumerate() {
            self.cfg.connect(predicate_block, *case_block, EdgeKind::CondTrue);
            let is_last = i + 1 == case_blocks.len();
            let is_wildcard = is_last && node.cases[i].guard.is_none();
            if !is_wildcard {
                let next_predicate = if is_last { merge } else { case_blocks[i + 1] };
                self.cfg.connect(*case_block, next_predicate, EdgeKind::CondFalse);
            }
            predicate_block = *case_block;
        }

        for (case, case_block) in node.cases.iter().zip(case_blocks.iter()) {
            self.ctx.current_block = *case_block;
            self.build_body(&case.body, nested);
            if !self.is_dead_end(self.ctx.current_block) {
                self.connect_current(merge, EdgeKind::Normal);
            }
        }

        self.ctx.current_block = merge;
    }

    fn build_function_def(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        self.add_statement(node.clone());
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let qualified = self.ctx.scope_qualified(&name);
        let mut scope_stack = self.ctx.scope_stack.clone();
        scope_stack.push(name);

        match Self::build_root(node, scope_stack, nested) {
            Ok(cfg) => {
                nested.insert(qualified, cfg);
            }
            Err(err) => {
                tracing::warn!(
                    function = %qualified,
                    error = %err,
                    "nested function CFG build failed; parent build continues"
                );
            }
        }
    }

    fn build_class_def(&mut self, node: &Node, nested: &mut FxHashMap<String, Cfg>) {
        self.add_statement(node.clone());
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        self.ctx.scope_stack.push(name);

        let class_body = self.cfg.create_block("class_body");
        self.connect_current(class_body, EdgeKind::Normal);
        self.ctx.current_block = class_body;

        for member in &node.body {
            if matches!(member.kind, NodeKind::FunctionDef | NodeKind::AsyncFunctionDef) {
                self.build_function_def(member, nested);
            } else {
                self.build_statement(member, nested);
            }
        }

        self.ctx.scope_stack.pop();
    }

    /// Lowers a comprehension into the six canonical blocks per generator
    /// clause (`comp_init` once, then `comp_header`/`comp_filter`/
    /// `comp_body`/`comp_append`/`comp_exit` per `for` clause, nested for
    /// multi-clause comprehensions).
    fn build_comprehension(&mut self, comp: &Node) {
        let init = self.cfg.create_block("comp_init");
        self.connect_current(init, EdgeKind::Normal);
        self.ctx.current_block = init;
        self.build_comprehension_level(comp, 0);
    }

    fn build_comprehension_level(&mut self, comp: &Node, level: usize) {
        let Some(generator) = comp.generators.get(level) else {
            return;
        };

        let header = self.cfg.create_block("comp_header");
        self.connect_current(header, EdgeKind::Normal);

        let body = self.cfg.create_block("comp_body");
        let exit = self.cfg.create_block("comp_exit");
        self.cfg.connect(header, body, EdgeKind::CondTrue);
        self.cfg.connect(header, exit, EdgeKind::CondFalse);

        self.ctx.current_block = body;
        let append = self.cfg.create_block("comp_append");
        if generator.ifs.is_empty() {
            self.connect_current(append, EdgeKind::Normal);
        } else {
            let filter = self.cfg.create_block("comp_filter");
            self.connect_current(filter, EdgeKind::Normal);
            self.cfg.connect(filter, append, EdgeKind::CondTrue);
            self.cfg.connect(filter, header, EdgeKind::CondFalse);
        }

        self.ctx.current_block = append;
        self.build_comprehension_level(comp, level + 1);
        self.connect_current(header, EdgeKind::Loop);

        self.ctx.current_block = exit;
    }
}
