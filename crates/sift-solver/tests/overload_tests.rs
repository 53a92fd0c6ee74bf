//! Overload resolution and generic call tests.

use sift_binder::BinderState;
use sift_common::{DiagnosticSink, FileId, codes};
use sift_solver::{DeclarationTable, TypeCache, TypeEvaluator, TypeId, TypeInterner};
use sift_syntax::{AstBuilder, NodeArena, NodeId};

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

/// Three overloads of `f`: (int) -> int, (str) -> str, (float) -> float.
fn overload_module(
    b: &mut AstBuilder,
    call_arg: impl FnOnce(&mut AstBuilder) -> NodeId,
) -> (NodeId, NodeId) {
    let mut defs = Vec::new();
    for (param_ty, ret_ty) in [("int", "int"), ("str", "str"), ("float", "float")] {
        let ann = b.name(param_ty);
        let param = b.param("a", ann);
        let ret_ann = b.name(ret_ty);
        let pass = b.pass_stmt();
        let def = b.function_def_full("f", vec![], vec![param], ret_ann, vec![pass], true);
        defs.push(def);
    }
    let callee = b.name("f");
    let arg = call_arg(b);
    let call = b.call(callee, vec![arg]);
    let stmt = b.expr_stmt(call);
    defs.push(stmt);
    let module = b.module(defs);
    (module, call)
}

#[test]
fn test_overload_selects_matching_candidate_in_order() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let (module, c) = overload_module(b, |b| b.str_lit("hello"));
        call = c;
        module
    });
    // The string argument matches exactly the second overload.
    assert_eq!(fixture.eval_at(call), fixture.db.builtins.str_instance);
    assert!(fixture.sink.is_empty());
}

#[test]
fn test_overload_first_match_wins() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // An int argument matches both the int and float overloads; the
        // first declared wins.
        let (module, c) = overload_module(b, |b| b.int(1));
        call = c;
        module
    });
    assert_eq!(fixture.eval_at(call), fixture.db.builtins.int_instance);
    assert!(fixture.sink.is_empty());
}

#[test]
fn test_no_matching_overload_reports_closest_once() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let (module, c) = overload_module(b, |b| b.none());
        call = c;
        module
    });
    // Evaluation still yields the closest candidate's return type.
    assert_eq!(fixture.eval_at(call), fixture.db.builtins.int_instance);
    let diags = fixture.sink.drain_sorted();
    assert_eq!(diags.len(), 1, "exactly one diagnostic: {:?}", diags);
    assert_eq!(diags[0].code, codes::NO_MATCHING_OVERLOAD);
    // All three candidates miss by one argument; first-declared wins the
    // tie and is named in the message.
    assert!(
        diags[0].message_text.contains("overload 1 of 3"),
        "message was: {}",
        diags[0].message_text
    );
}

#[test]
fn test_plain_call_mismatch_reports_argument() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let ann = b.name("int");
        let param = b.param("a", ann);
        let pass = b.pass_stmt();
        let def = b.function_def("g", vec![param], NodeId::NONE, vec![pass]);
        let callee = b.name("g");
        let arg = b.str_lit("oops");
        call = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    // Unannotated return with a `pass` body: the call yields None.
    assert_eq!(fixture.eval_at(call), TypeId::NONE);
    let diags = fixture.sink.drain_sorted();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, codes::ARGUMENT_MISMATCH);
}

#[test]
fn test_arity_mismatch_reported() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let ann = b.name("int");
        let param = b.param("a", ann);
        let pass = b.pass_stmt();
        let def = b.function_def("g", vec![param], NodeId::NONE, vec![pass]);
        let callee = b.name("g");
        call = b.call(callee, vec![]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    fixture.eval_at(call);
    let diags = fixture.sink.drain_sorted();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, codes::ARGUMENT_COUNT);
}

#[test]
fn test_generic_call_infers_type_parameter() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // def identity[T](x: T) -> T: return x
        let tp = b.type_param("T", NodeId::NONE);
        let t_ann = b.name("T");
        let param = b.param("x", t_ann);
        let ret_ann = b.name("T");
        let x_ref = b.name("x");
        let ret = b.return_stmt(x_ref);
        let def = b.function_def_full(
            "identity",
            vec![tp],
            vec![param],
            ret_ann,
            vec![ret],
            false,
        );
        let callee = b.name("identity");
        let arg = b.int(5);
        call = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    // Literal arguments widen during inference: T = int.
    assert_eq!(fixture.eval_at(call), fixture.db.builtins.int_instance);
    assert!(fixture.sink.is_empty());
}

#[test]
fn test_generic_unconstrained_parameter_is_unknown() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // def first[T, U](x: T) -> U: ...
        let tp_t = b.type_param("T", NodeId::NONE);
        let tp_u = b.type_param("U", NodeId::NONE);
        let t_ann = b.name("T");
        let param = b.param("x", t_ann);
        let ret_ann = b.name("U");
        let pass = b.pass_stmt();
        let def = b.function_def_full(
            "first",
            vec![tp_t, tp_u],
            vec![param],
            ret_ann,
            vec![pass],
            false,
        );
        let callee = b.name("first");
        let arg = b.int(5);
        call = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    assert_eq!(fixture.eval_at(call), TypeId::UNKNOWN);
}

#[test]
fn test_generic_bound_violation_is_diagnostic_not_failure() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // def clamp[N: int](x: N) -> N: ...
        let bound = b.name("int");
        let tp = b.type_param("N", bound);
        let n_ann = b.name("N");
        let param = b.param("x", n_ann);
        let ret_ann = b.name("N");
        let pass = b.pass_stmt();
        let def =
            b.function_def_full("clamp", vec![tp], vec![param], ret_ann, vec![pass], false);
        let callee = b.name("clamp");
        let arg = b.str_lit("not a number");
        call = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call);
        b.module(vec![def, stmt])
    });
    // Best-effort: evaluation still returns the inferred specialization.
    assert_eq!(fixture.eval_at(call), fixture.db.builtins.str_instance);
    let diags = fixture.sink.drain_sorted();
    assert!(
        diags
            .iter()
            .any(|d| d.code == codes::TYPE_VAR_BOUND_VIOLATION),
        "expected a bound violation diagnostic, got {:?}",
        diags
    );
}

#[test]
fn test_not_callable_reports() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        let callee = b.name("x");
        call = b.call(callee, vec![]);
        let stmt = b.expr_stmt(call);
        b.module(vec![assign, stmt])
    });
    assert_eq!(fixture.eval_at(call), TypeId::UNKNOWN);
    let diags = fixture.sink.drain_sorted();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, codes::NOT_CALLABLE);
}

#[test]
fn test_class_construction_returns_instance() {
    let mut call = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        // class Point: def __init__(self, x: int): pass
        let self_param = b.param("self", NodeId::NONE);
        let int_ann = b.name("int");
        let x_param = b.param("x", int_ann);
        let pass = b.pass_stmt();
        let init = b.function_def("__init__", vec![self_param, x_param], NodeId::NONE, vec![pass]);
        let class_def = b.class_def("Point", vec![], vec![init]);
        let callee = b.name("Point");
        let arg = b.int(3);
        call = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call);
        b.module(vec![class_def, stmt])
    });
    let ty = fixture.eval_at(call);
    let rendered = fixture.db.display(ty);
    assert_eq!(rendered, "Point");
    assert!(fixture.sink.is_empty());

    // Wrong constructor argument type is a diagnostic.
    let mut call2 = NodeId::NONE;
    let mut fixture2 = Fixture::build(|b| {
        let self_param = b.param("self", NodeId::NONE);
        let int_ann = b.name("int");
        let x_param = b.param("x", int_ann);
        let pass = b.pass_stmt();
        let init = b.function_def("__init__", vec![self_param, x_param], NodeId::NONE, vec![pass]);
        let class_def = b.class_def("Point", vec![], vec![init]);
        let callee = b.name("Point");
        let arg = b.str_lit("three");
        call2 = b.call(callee, vec![arg]);
        let stmt = b.expr_stmt(call2);
        b.module(vec![class_def, stmt])
    });
    fixture2.eval_at(call2);
    let diags = fixture2.sink.drain_sorted();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, codes::ARGUMENT_MISMATCH);
}
