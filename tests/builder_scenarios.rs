//! End-to-end CFG-construction scenarios built directly from hand-written
//! AST trees (there is no parser in this crate, so these trees stand in
//! for parsed source).

use pycfg_core::ast::{ExceptHandler, MatchCase, Node, NodeKind};
use pycfg_core::graph::EdgeKind;
use pycfg_core::{CfgBuilder, ComplexityConfig};

fn generic() -> Node {
    Node::new(NodeKind::Generic)
}

fn assign() -> Node {
    Node::new(NodeKind::Assign)
}

fn return_stmt() -> Node {
    Node::new(NodeKind::Return)
}

fn break_stmt() -> Node {
    Node::new(NodeKind::Break)
}

fn expr_stmt() -> Node {
    Node::new(NodeKind::Expr)
}

fn module(body: Vec<Node>) -> Node {
    Node::new(NodeKind::Module).with_body(body)
}

/// S1: `x = 1; return x; y = 2`
#[test]
fn s1_statement_after_return_is_unreachable_dead_code() {
    let m = module(vec![assign(), return_stmt(), assign()]);
    let cfg = CfgBuilder::build(&m).unwrap();

    let result = pycfg_core::reachability::analyze(&cfg);
    assert!(result.has_unreachable_code(&cfg));
    assert_eq!(result.unreachable_with_statements(&cfg).len(), 1);

    let dead = result
        .unreachable_with_statements(&cfg)
        .into_iter()
        .next()
        .unwrap();
    assert!(dead.1.label.starts_with("unreachable"));
}

/// S2: `def f(x): if x>0: return x; return -x`
#[test]
fn s2_two_returns_after_a_branch_yield_complexity_two() {
    let if_node = Node::new(NodeKind::If)
        .with_test(generic())
        .with_body(vec![return_stmt()]);
    let f = Node::new(NodeKind::FunctionDef)
        .with_name("f")
        .with_body(vec![if_node, return_stmt()]);
    let m = module(vec![f]);

    let cfgs = CfgBuilder::build_all(&m);
    let f_cfg = cfgs.get("f").expect("nested function CFG for f");

    let result = pycfg_core::complexity::compute(f_cfg, &ComplexityConfig::default());
    assert_eq!(result.complexity, 2);
}

/// S3: `try: return 1; finally: cleanup()`
#[test]
fn s3_return_inside_try_routes_through_finally_not_directly_to_exit() {
    let try_node = Node::new(NodeKind::Try)
        .with_body(vec![return_stmt()])
        .with_finalbody(vec![expr_stmt()]);
    let m = module(vec![try_node]);
    let cfg = CfgBuilder::build(&m).unwrap();

    let finally_block = cfg
        .blocks
        .values()
        .find(|b| b.label.starts_with("finally_block"))
        .expect("a finally_block exists");
    let return_edges: Vec<_> = finally_block
        .successors
        .iter()
        .filter(|e| e.kind == EdgeKind::Return)
        .collect();
    assert_eq!(return_edges.len(), 1);
    assert_eq!(return_edges[0].to, cfg.exit);
    assert_ne!(return_edges[0].to, finally_block.id, "finally must not self-loop");

    let try_block = cfg
        .blocks
        .values()
        .find(|b| b.label.starts_with("try_block"))
        .expect("a try_block exists");
    assert!(
        !try_block
            .successors
            .iter()
            .any(|e| e.kind == EdgeKind::Return && e.to == cfg.exit),
        "try body must not bypass finally with a direct Return edge to EXIT"
    );
}

/// S4: `for i in range(5): if i==2: break else: print("done")`
#[test]
fn s4_for_loop_with_break_and_loop_else() {
    let if_node = Node::new(NodeKind::If)
        .with_test(generic())
        .with_body(vec![break_stmt()]);
    let for_node = Node::new(NodeKind::For)
        .with_test(generic())
        .with_body(vec![if_node])
        .with_orelse(vec![expr_stmt()]);
    let m = module(vec![for_node]);
    let cfg = CfgBuilder::build(&m).unwrap();

    assert!(cfg.blocks.values().any(|b| b.label.starts_with("loop_header")));
    assert!(cfg.blocks.values().any(|b| b.label.starts_with("loop_body")));
    assert!(cfg.blocks.values().any(|b| b.label.starts_with("loop_else")));
    assert!(cfg.blocks.values().any(|b| b.label.starts_with("loop_exit")));

    let loop_exit = cfg
        .blocks
        .values()
        .find(|b| b.label.starts_with("loop_exit"))
        .unwrap();
    assert!(loop_exit.predecessors.iter().any(|e| e.kind == EdgeKind::Break));
}

/// S5: match with three cases (0, 1, wildcard), each returning.
#[test]
fn s5_match_with_three_cases() {
    let case = |guard: Option<Node>| MatchCase {
        pattern: Box::new(generic()),
        guard: guard.map(Box::new),
        body: vec![return_stmt()],
    };
    let match_node = Node::new(NodeKind::Match).with_test(generic()).with_cases(vec![
        case(None),
        case(None),
        case(None),
    ]);
    let m = module(vec![match_node]);
    let cfg = CfgBuilder::build(&m).unwrap();

    assert!(cfg.blocks.values().any(|b| b.label.starts_with("match_eval")));
    assert!(cfg.blocks.values().any(|b| b.label.starts_with("match_merge")));
    let case_blocks = cfg
        .blocks
        .values()
        .filter(|b| b.label.starts_with("match_case"))
        .count();
    assert_eq!(case_blocks, 3);

    let has_true = cfg
        .blocks
        .values()
        .any(|b| b.successors.iter().any(|e| e.kind == EdgeKind::CondTrue));
    let has_false = cfg
        .blocks
        .values()
        .any(|b| b.successors.iter().any(|e| e.kind == EdgeKind::CondFalse));
    assert!(has_true);
    assert!(has_false);
    assert!(cfg.size() >= 6);
}

/// S6: nested `try...finally` with `return` in the inner try.
#[test]
fn s6_nested_finally_return_routes_through_both_levels() {
    let inner_try = Node::new(NodeKind::Try)
        .with_body(vec![return_stmt()])
        .with_finalbody(vec![expr_stmt()]);
    let outer_try = Node::new(NodeKind::Try)
        .with_body(vec![inner_try])
        .with_finalbody(vec![expr_stmt()]);
    let m = module(vec![outer_try]);
    let cfg = CfgBuilder::build(&m).unwrap();

    let finally_blocks: Vec<_> = cfg
        .blocks
        .values()
        .filter(|b| b.label.starts_with("finally_block"))
        .collect();
    assert_eq!(finally_blocks.len(), 2, "one finally per try level");

    // Exactly one finally has a Return edge landing on EXIT (the outer one);
    // the other routes its Return edge to that outer finally instead.
    let landing_on_exit: Vec<_> = finally_blocks
        .iter()
        .filter(|b| {
            b.successors
                .iter()
                .any(|e| e.kind == EdgeKind::Return && e.to == cfg.exit)
        })
        .collect();
    assert_eq!(landing_on_exit.len(), 1);

    let routes_to_other_finally: Vec<_> = finally_blocks
        .iter()
        .filter(|b| {
            b.successors.iter().any(|e| {
                e.kind == EdgeKind::Return
                    && finally_blocks.iter().any(|other| other.id == e.to)
            })
        })
        .collect();
    assert_eq!(routes_to_other_finally.len(), 1);

    for fb in &finally_blocks {
        assert!(
            !fb.successors.iter().any(|e| e.to == fb.id),
            "finally block must never self-loop"
        );
    }
}

/// Boundary: a module with no statements still yields entry -> exit.
#[test]
fn boundary_empty_module_has_entry_exit_and_full_reachability() {
    let m = module(vec![]);
    let cfg = CfgBuilder::build(&m).unwrap();
    let result = pycfg_core::reachability::analyze(&cfg);
    assert_eq!(result.reachability_ratio(), 1.0);
}

/// Boundary: a single `pass` yields one statement-carrying block, complexity 1.
#[test]
fn boundary_single_pass_has_complexity_one() {
    let m = module(vec![Node::new(NodeKind::Pass)]);
    let cfg = CfgBuilder::build(&m).unwrap();
    let result = pycfg_core::complexity::compute(&cfg, &ComplexityConfig::default());
    assert_eq!(result.complexity, 1);
}

/// Invariant 1: entry has no predecessors; exit has no successors.
#[test]
fn invariant_entry_and_exit_shape() {
    let m = module(vec![assign()]);
    let cfg = CfgBuilder::build(&m).unwrap();
    assert!(cfg.block(cfg.entry).predecessors.is_empty());
    assert!(cfg.block(cfg.exit).successors.is_empty());
}

/// Invariant 3: a block labeled `unreachable` has zero predecessors.
#[test]
fn invariant_unreachable_blocks_have_no_predecessors() {
    let m = module(vec![return_stmt(), assign()]);
    let cfg = CfgBuilder::build(&m).unwrap();
    for block in cfg.blocks.values() {
        if block.label.starts_with("unreachable") {
            assert!(block.predecessors.is_empty());
        }
    }
}

/// Raise with no enclosing handler or finally transfers directly to EXIT.
#[test]
fn raise_with_no_handler_or_finally_goes_to_exit() {
    let m = module(vec![Node::new(NodeKind::Raise)]);
    let cfg = CfgBuilder::build(&m).unwrap();
    let exit = cfg.exit;
    assert!(cfg
        .blocks
        .values()
        .any(|b| b.successors.iter().any(|e| e.kind == EdgeKind::Exception && e.to == exit)));
}

/// A try with a handler routes raises to the handler entry.
#[test]
fn try_except_routes_exceptional_edges_to_handler() {
    let try_node = Node::new(NodeKind::Try)
        .with_body(vec![assign()])
        .with_handlers(vec![ExceptHandler {
            kind: None,
            name: None,
            body: vec![assign()],
        }]);
    let m = module(vec![try_node]);
    let cfg = CfgBuilder::build(&m).unwrap();
    assert!(cfg.blocks.values().any(|b| b.label.starts_with("except_block")));
    let try_block = cfg
        .blocks
        .values()
        .find(|b| b.label.starts_with("try_block"))
        .unwrap();
    assert!(try_block.successors.iter().any(|e| e.kind == EdgeKind::Exception));
}
