//! Flow-sensitive narrowing tests: class-membership tests, identity tests,
//! truthiness, literal equality, user-declared guards, loops, exception
//! paths, and attribute chains.

use sift_binder::BinderState;
use sift_common::{DiagnosticSink, FileId, codes};
use sift_solver::{DeclarationTable, TypeCache, TypeEvaluator, TypeId, TypeInterner};
use sift_syntax::{AstBuilder, BinaryOp, CompareOp, NodeArena, NodeId};

struct Fixture {
    arena: NodeArena,
    binder: BinderState,
    db: TypeInterner,
    globals: DeclarationTable,
    sink: DiagnosticSink,
    cache: TypeCache,
}

impl Fixture {
    fn build(f: impl FnOnce(&mut AstBuilder) -> NodeId) -> Fixture {
        let mut builder = AstBuilder::new(FileId(0), "main.sf");
        let root = f(&mut builder);
        let interner = builder.interner();
        let arena = builder.finish();
        let mut binder = BinderState::new();
        binder.bind_module(&arena, root);
        Fixture {
            arena,
            binder,
            db: TypeInterner::with_strings(interner),
            globals: DeclarationTable::new(),
            sink: DiagnosticSink::new(),
            cache: TypeCache::new(),
        }
    }

    fn eval_at(&mut self, node: NodeId) -> TypeId {
        let flow = self.binder.flow_at(node);
        let mut ev = TypeEvaluator::new(
            &self.arena,
            &self.binder,
            &self.db,
            &self.globals,
            &self.sink,
            &mut self.cache,
        );
        ev.evaluate(node, flow)
    }
}

/// `def f(x: int | str): if isinstance(x, int): <use> else: <use>`
#[test]
fn test_isinstance_narrows_both_branches() {
    let mut use_then = NodeId::NONE;
    let mut use_else = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let str_ann = b.name("str");
        let ann = b.binary(int_ann, BinaryOp::BitOr, str_ann);
        let param = b.param("x", ann);
        let isinstance = b.name("isinstance");
        let x_arg = b.name("x");
        let int_class = b.name("int");
        let test = b.call(isinstance, vec![x_arg, int_class]);
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        use_else = b.name("x");
        let else_stmt = b.expr_stmt(use_else);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![else_stmt]);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt]);
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_then), fixture.db.builtins.int_instance);
    assert_eq!(fixture.eval_at(use_else), fixture.db.builtins.str_instance);
}

/// Narrowing to a structurally unrelated class yields Never.
#[test]
fn test_isinstance_unrelated_is_never() {
    let mut use_then = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let ann = b.name("str");
        let param = b.param("x", ann);
        let isinstance = b.name("isinstance");
        let x_arg = b.name("x");
        let int_class = b.name("int");
        let test = b.call(isinstance, vec![x_arg, int_class]);
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![]);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt]);
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_then), TypeId::NEVER);
}

/// `def f(x: int | None): if x is None: return; <use>` narrows to int for
/// all code after the guard.
#[test]
fn test_is_none_guard_with_early_return() {
    let mut use_after = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let none_ann = b.none();
        let ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let param = b.param("x", ann);
        let x_test = b.name("x");
        let test = b.is_none_test(x_test);
        let ret = b.return_stmt(NodeId::NONE);
        let if_stmt = b.if_stmt(test, vec![ret], vec![]);
        use_after = b.name("x");
        let after = b.expr_stmt(use_after);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt, after]);
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_after), fixture.db.builtins.int_instance);
    assert!(fixture.sink.is_empty());
}

#[test]
fn test_truthiness_removes_none_in_true_branch() {
    let mut use_then = NodeId::NONE;
    let mut use_else = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let str_ann = b.name("str");
        let none_ann = b.none();
        let ann = b.binary(str_ann, BinaryOp::BitOr, none_ann);
        let param = b.param("x", ann);
        let test = b.name("x");
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        use_else = b.name("x");
        let else_stmt = b.expr_stmt(use_else);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![else_stmt]);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt]);
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_then), fixture.db.builtins.str_instance);
    // str is not split into falsy literals; None stays in the false branch.
    let else_ty = fixture.eval_at(use_else);
    let members = fixture.db.union_members(else_ty);
    assert!(members.contains(&TypeId::NONE));
    assert!(members.contains(&fixture.db.builtins.str_instance));
}

#[test]
fn test_equality_to_literal_narrows() {
    let mut use_then = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let param = b.param("x", int_ann);
        let x_test = b.name("x");
        let three = b.int(3);
        let test = b.compare(x_test, CompareOp::Eq, three);
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![]);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt]);
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_then), fixture.db.literal_int(3));
}

/// `and` chains narrow each conjunct independently in the true stream.
#[test]
fn test_boolean_and_narrows_conjuncts() {
    let mut use_then = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let none_ann = b.none();
        let ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let param_x = b.param("x", ann);
        let cond_x = b.name("x");
        let x_not_none = {
            let none = b.none();
            b.compare(cond_x, CompareOp::IsNot, none)
        };
        let cond_y = b.name("y");
        let y_assign = {
            let y = b.name("y");
            let t = b.bool_lit(true);
            b.assign(y, t)
        };
        let test = b.bool_op(sift_syntax::BoolOpKind::And, vec![x_not_none, cond_y]);
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![]);
        let def = b.function_def(
            "f",
            vec![param_x],
            NodeId::NONE,
            vec![y_assign, if_stmt],
        );
        b.module(vec![def])
    });
    assert_eq!(fixture.eval_at(use_then), fixture.db.builtins.int_instance);
}

/// Loop back edges terminate through the visited set and keep the
/// narrowing after the loop exit sound.
#[test]
fn test_while_loop_narrowing_reaches_fixed_point() {
    let mut use_after = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let none_ann = b.none();
        let ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let param = b.param("x", ann);
        let x_test = b.name("x");
        let test = b.is_none_test(x_test);
        let body_assign = {
            let x = b.name("x");
            let one = b.int(1);
            b.assign(x, one)
        };
        let while_stmt = b.while_stmt(test, vec![body_assign]);
        use_after = b.name("x");
        let after = b.expr_stmt(use_after);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![while_stmt, after]);
        b.module(vec![def])
    });
    let ty = fixture.eval_at(use_after);
    let members = fixture.db.union_members(ty);
    assert!(!members.contains(&TypeId::NONE), "None must be narrowed away");
    assert!(members.contains(&fixture.db.builtins.int_instance));
}

/// Assignment stops the backward walk: narrowing never looks past a
/// reassignment.
#[test]
fn test_assignment_stops_walk() {
    let mut use_after = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let none_ann = b.none();
        let ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let param = b.param("x", ann);
        let x_test = b.name("x");
        let test = b.is_none_test(x_test);
        // if x is None: x = 5
        let assign = {
            let x = b.name("x");
            let five = b.int(5);
            b.assign(x, five)
        };
        let if_stmt = b.if_stmt(test, vec![assign], vec![]);
        use_after = b.name("x");
        let after = b.expr_stmt(use_after);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt, after]);
        b.module(vec![def])
    });
    let ty = fixture.eval_at(use_after);
    let members = fixture.db.union_members(ty);
    // Union of the then-branch assignment and the not-None fall-through.
    assert!(members.contains(&fixture.db.literal_int(5)));
    assert!(members.contains(&fixture.db.builtins.int_instance));
    assert!(!members.contains(&TypeId::NONE));
}

/// A user-declared guard (`-> TypeGuard[str]`) narrows its argument.
#[test]
fn test_user_declared_type_guard() {
    let mut use_then = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let guard_head = b.name("TypeGuard");
        let guard_arg = b.name("str");
        let guard_ann = b.subscript(guard_head, guard_arg);
        let v_param = b.param("v", NodeId::NONE);
        let ret_true = {
            let t = b.bool_lit(true);
            b.return_stmt(t)
        };
        let is_str = b.function_def("is_str", vec![v_param], guard_ann, vec![ret_true]);

        let int_ann = b.name("int");
        let str_ann = b.name("str");
        let ann = b.binary(int_ann, BinaryOp::BitOr, str_ann);
        let param = b.param("x", ann);
        let callee = b.name("is_str");
        let x_arg = b.name("x");
        let test = b.call(callee, vec![x_arg]);
        use_then = b.name("x");
        let then_stmt = b.expr_stmt(use_then);
        let if_stmt = b.if_stmt(test, vec![then_stmt], vec![]);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt]);
        b.module(vec![is_str, def])
    });
    assert_eq!(fixture.eval_at(use_then), fixture.db.builtins.str_instance);
}

/// A call inside `try` contributes an exception-resume edge to the handler,
/// so a use in the handler sees both the pre-call and post-assignment
/// states.
#[test]
fn test_post_call_edge_reaches_handler() {
    let mut use_in_handler = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let assign = {
            let x = b.name("x");
            let one = b.int(1);
            b.assign(x, one)
        };
        let risky_def = {
            let p = b.pass_stmt();
            b.function_def("risky", vec![], NodeId::NONE, vec![p])
        };
        let call = {
            let callee = b.name("risky");
            b.call(callee, vec![])
        };
        let call_stmt = b.expr_stmt(call);
        use_in_handler = b.name("x");
        let handler_use = b.expr_stmt(use_in_handler);
        let exc = b.name("Exception");
        let handler = b.except_handler(exc, None, vec![handler_use]);
        let try_stmt = b.try_stmt(vec![assign, call_stmt], vec![handler], vec![], vec![]);
        b.module(vec![risky_def, try_stmt])
    });
    let ty = fixture.eval_at(use_in_handler);
    let members = fixture.db.union_members(ty);
    // Assigned on the path through the call; unbound on the path where the
    // exception fired before the assignment — reported, then stripped.
    assert!(members.contains(&fixture.db.literal_int(1)));
    let diags = fixture.sink.drain_sorted();
    assert!(diags.iter().any(|d| d.code == codes::POSSIBLY_UNBOUND));
}

/// Attribute chains are narrowable references.
#[test]
fn test_attribute_narrowing_through_member_access() {
    let mut use_attr = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // class C: y: int | None
        let int_ann = b.name("int");
        let none_ann = b.none();
        let member_ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let y_target = b.name("y");
        let member = b.assign_ann(y_target, member_ann, NodeId::NONE);
        let class_def = b.class_def("C", vec![], vec![member]);
        // def f(c: C): if c.y is None: return; c.y
        let c_ann = b.name("C");
        let param = b.param("c", c_ann);
        let c_ref = b.name("c");
        let attr_test = b.attribute(c_ref, "y");
        let test = b.is_none_test(attr_test);
        let ret = b.return_stmt(NodeId::NONE);
        let if_stmt = b.if_stmt(test, vec![ret], vec![]);
        let c_ref2 = b.name("c");
        use_attr = b.attribute(c_ref2, "y");
        let after = b.expr_stmt(use_attr);
        let def = b.function_def("f", vec![param], NodeId::NONE, vec![if_stmt, after]);
        b.module(vec![class_def, def])
    });
    assert_eq!(fixture.eval_at(use_attr), fixture.db.builtins.int_instance);
}

/// Reassigning the base object invalidates narrowing of its attributes.
#[test]
fn test_base_reassignment_invalidates_attribute_narrowing() {
    let mut use_attr = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let int_ann = b.name("int");
        let none_ann = b.none();
        let member_ann = b.binary(int_ann, BinaryOp::BitOr, none_ann);
        let y_target = b.name("y");
        let member = b.assign_ann(y_target, member_ann, NodeId::NONE);
        let class_def = b.class_def("C", vec![], vec![member]);

        let c_ann = b.name("C");
        let param = b.param("c", c_ann);
        let c_ref = b.name("c");
        let attr_test = b.attribute(c_ref, "y");
        let test = b.is_none_test(attr_test);
        let ret = b.return_stmt(NodeId::NONE);
        let guard = b.if_stmt(test, vec![ret], vec![]);
        // c = make() — the narrowing above no longer applies.
        let reassign = {
            let c = b.name("c");
            let callee = b.name("C");
            let call = b.call(callee, vec![]);
            b.assign(c, call)
        };
        let c_ref2 = b.name("c");
        use_attr = b.attribute(c_ref2, "y");
        let after = b.expr_stmt(use_attr);
        let def = b.function_def(
            "f",
            vec![param],
            NodeId::NONE,
            vec![guard, reassign, after],
        );
        b.module(vec![class_def, def])
    });
    let ty = fixture.eval_at(use_attr);
    let members = fixture.db.union_members(ty);
    assert!(members.contains(&TypeId::NONE), "narrowing must be dropped");
    assert!(members.contains(&fixture.db.builtins.int_instance));
}
