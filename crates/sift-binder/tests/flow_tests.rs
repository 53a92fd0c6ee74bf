//! Flow graph construction tests: assignment chains, branch labels, loop
//! back edges, exception-resume edges, and reachability.

use sift_binder::{BinderState, flow_flags};
use sift_common::FileId;
use sift_syntax::{AstBuilder, NodeId};

fn bind(build: impl FnOnce(&mut AstBuilder) -> NodeId) -> (sift_syntax::NodeArena, BinderState) {
    let mut builder = AstBuilder::new(FileId(0), "test.sf");
    let root = build(&mut builder);
    let arena = builder.finish();
    let mut binder = BinderState::new();
    binder.bind_module(&arena, root);
    (arena, binder)
}

#[test]
fn test_assignment_chains_on_cursor() {
    let mut use_x = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        use_x = b.name("x");
        let stmt = b.expr_stmt(use_x);
        b.module(vec![assign, stmt])
    });
    let flow = binder.flow_at(use_x);
    let node = binder.flow_nodes.get(flow).unwrap();
    assert!(node.has_any_flags(flow_flags::ASSIGNMENT));
    // The assignment's antecedent chain reaches the start node.
    let antecedent = node.antecedents[0];
    let start = binder.flow_nodes.get(antecedent).unwrap();
    assert!(start.has_any_flags(flow_flags::START));
}

#[test]
fn test_if_produces_conditions_and_merge_label() {
    let mut use_then = NodeId::NONE;
    let mut use_after = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let cond_assign = {
            let c = b.name("c");
            let t = b.bool_lit(true);
            b.assign(c, t)
        };
        let test = b.name("c");
        use_then = b.name("c");
        let then_stmt = b.expr_stmt(use_then);
        let pass = b.pass_stmt();
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![pass]);
        use_after = b.name("c");
        let after = b.expr_stmt(use_after);
        b.module(vec![cond_assign, if_stmt, after])
    });
    let then_flow = binder.flow_nodes.get(binder.flow_at(use_then)).unwrap();
    assert!(then_flow.has_any_flags(flow_flags::TRUE_CONDITION));

    let after_flow = binder.flow_nodes.get(binder.flow_at(use_after)).unwrap();
    assert!(after_flow.has_any_flags(flow_flags::BRANCH_LABEL));
    // Both branch streams converge at the label.
    assert_eq!(after_flow.antecedents.len(), 2);
}

#[test]
fn test_while_creates_loop_label_with_back_edge() {
    let mut use_after = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let c_assign = {
            let c = b.name("c");
            let t = b.bool_lit(true);
            b.assign(c, t)
        };
        let test = b.name("c");
        let body_assign = {
            let x = b.name("x");
            let one = b.int(1);
            b.assign(x, one)
        };
        let while_stmt = b.while_stmt(test, vec![body_assign]);
        use_after = b.name("c");
        let after = b.expr_stmt(use_after);
        b.module(vec![c_assign, while_stmt, after])
    });
    // Find the loop label: it must have two antecedents (entry and the
    // body's back edge), forming a cycle.
    let mut found_loop = false;
    for id in 0..binder.flow_nodes.len() as u32 {
        let node = binder
            .flow_nodes
            .get(sift_binder::FlowNodeId(id))
            .unwrap();
        if node.has_any_flags(flow_flags::LOOP_LABEL) {
            found_loop = true;
            assert_eq!(node.antecedents.len(), 2, "entry + back edge");
        }
    }
    assert!(found_loop);
    // Traversal over the cyclic graph terminates.
    assert!(!binder
        .flow_nodes
        .is_unreachable(binder.flow_at(use_after)));
}

#[test]
fn test_return_makes_following_statements_unreachable() {
    let mut dead = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let ret = b.return_stmt(NodeId::NONE);
        let x = b.name("x");
        let one = b.int(1);
        dead = b.assign(x, one);
        let def = b.function_def("f", vec![], NodeId::NONE, vec![ret, dead]);
        b.module(vec![def])
    });
    assert!(binder.flow_nodes.is_unreachable(binder.flow_at(dead)));
}

#[test]
fn test_both_branches_returning_makes_merge_unreachable() {
    let mut after = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let param = b.param("c", NodeId::NONE);
        let test = b.name("c");
        let r1 = b.return_stmt(NodeId::NONE);
        let r2 = b.return_stmt(NodeId::NONE);
        let if_stmt = b.if_stmt(test, vec![r1], vec![r2]);
        after = b.pass_stmt();
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt, after]);
        b.module(vec![def])
    });
    assert!(binder.flow_nodes.is_unreachable(binder.flow_at(after)));
}

#[test]
fn test_call_threads_post_call_node() {
    let mut call = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let pass = b.pass_stmt();
        let def = b.function_def("g", vec![], NodeId::NONE, vec![pass]);
        let callee = b.name("g");
        call = b.call(callee, vec![]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    let flow = binder.flow_nodes.get(binder.flow_at(call)).unwrap();
    assert!(flow.has_any_flags(flow_flags::POST_CALL));
}

#[test]
fn test_try_handler_receives_exception_edges() {
    let mut use_in_handler = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let risky_def = {
            let p = b.pass_stmt();
            b.function_def("risky", vec![], NodeId::NONE, vec![p])
        };
        let call_stmt = {
            let callee = b.name("risky");
            let call = b.call(callee, vec![]);
            b.expr_stmt(call)
        };
        use_in_handler = b.name("risky");
        let handler_body = b.expr_stmt(use_in_handler);
        let exc = b.name("Exception");
        let handler = b.except_handler(exc, None, vec![handler_body]);
        let try_stmt = b.try_stmt(vec![call_stmt], vec![handler], vec![], vec![]);
        b.module(vec![risky_def, try_stmt])
    });
    let handler_flow = binder
        .flow_nodes
        .get(binder.flow_at(use_in_handler))
        .unwrap();
    assert!(handler_flow.has_any_flags(flow_flags::BRANCH_LABEL));
    // Pre-try state plus the post-call resume edge.
    assert_eq!(handler_flow.antecedents.len(), 2);
    let has_post_call = handler_flow.antecedents.iter().any(|&a| {
        binder
            .flow_nodes
            .get(a)
            .is_some_and(|n| n.has_any_flags(flow_flags::POST_CALL))
    });
    assert!(has_post_call);
}

#[test]
fn test_raise_feeds_handler_and_kills_cursor() {
    let mut dead = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let exc_value = {
            let callee = b.name("Exception");
            b.call(callee, vec![])
        };
        let raise = b.raise_stmt(exc_value);
        dead = b.pass_stmt();
        let exc = b.name("Exception");
        let p = b.pass_stmt();
        let handler = b.except_handler(exc, None, vec![p]);
        let try_stmt = b.try_stmt(vec![raise, dead], vec![handler], vec![], vec![]);
        b.module(vec![try_stmt])
    });
    assert!(binder.flow_nodes.is_unreachable(binder.flow_at(dead)));
}

#[test]
fn test_break_reaches_loop_exit() {
    let mut use_after = NodeId::NONE;
    let (_, binder) = bind(|b| {
        let c_assign = {
            let c = b.name("c");
            let t = b.bool_lit(true);
            b.assign(c, t)
        };
        let test = b.name("c");
        let brk = b.break_stmt();
        let while_stmt = b.while_stmt(test, vec![brk]);
        use_after = b.name("c");
        let after = b.expr_stmt(use_after);
        b.module(vec![c_assign, while_stmt, after])
    });
    let after_flow = binder.flow_nodes.get(binder.flow_at(use_after)).unwrap();
    assert!(after_flow.has_any_flags(flow_flags::BRANCH_LABEL));
    // The exit label collects the break edge and the false condition.
    assert_eq!(after_flow.antecedents.len(), 2);
}

#[test]
fn test_binder_reset_clears_state() {
    let (arena, mut binder) = bind(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        b.module(vec![assign])
    });
    assert!(!binder.symbols.is_empty());
    binder.reset();
    assert!(binder.symbols.is_empty());
    assert_eq!(binder.flow_nodes.len(), 1); // fresh unreachable node
    // Rebinding after reset works.
    let root = NodeId((arena.len() - 1) as u32);
    binder.bind_module(&arena, root);
    assert!(!binder.symbols.is_empty());
}
