//! Incremental cache tests: dependency-scoped invalidation and the
//! cancellation discipline.

use sift_binder::{BinderState, SymbolId};
use sift_common::{DiagnosticSink, FileId};
use sift_solver::{
    DeclarationTable, Dependency, ImportedDecl, TypeCache, TypeEvaluator, TypeInterner,
};
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

    fn eval_at(&mut self, node: NodeId) {
        let flow = self.binder.flow_at(node);
        let mut ev = TypeEvaluator::new(
            &self.arena,
            &self.binder,
            &self.db,
            &self.globals,
            &self.sink,
            &mut self.cache,
        );
        ev.evaluate(node, flow);
    }
}

/// Entries depending on an imported symbol are invalidated by that
/// symbol's origin, while entries depending only on local state survive —
/// and vice versa (the incremental-edit scenario).
#[test]
fn test_invalidation_follows_recorded_dependencies() {
    let lib_file = FileId(1);
    let lib_symbol = SymbolId(42);

    let mut use_local = NodeId::NONE;
    let mut use_imported = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        use_local = b.name("x");
        let local_stmt = b.expr_stmt(use_local);
        use_imported = b.name("lib_value");
        let imported_stmt = b.expr_stmt(use_imported);
        b.module(vec![assign, local_stmt, imported_stmt])
    });
    let atom = fixture.db.intern_str("lib_value");
    fixture.globals.insert(
        atom,
        ImportedDecl {
            ty: fixture.db.builtins.str_instance,
            origin_file: lib_file,
            origin_symbol: lib_symbol,
        },
    );

    fixture.eval_at(use_local);
    fixture.eval_at(use_imported);
    let populated = fixture.cache.len();
    assert!(populated >= 2);

    // Editing the lib file's symbol removes only the entry that consulted
    // it; local entries survive.
    let removed = fixture.cache.invalidate_symbol(Dependency {
        file: lib_file,
        symbol: lib_symbol,
    });
    assert_eq!(removed, 1);
    assert_eq!(fixture.cache.len(), populated - 1);

    // Editing the local file removes the local-dependent entries but does
    // not disturb anything imported-only (already gone here, so nothing
    // else is double-counted).
    let removed_local = fixture.cache.invalidate_file(FileId(0));
    assert!(removed_local >= 1);
}

/// Editing a function body invalidates the entries that depended on that
/// function's symbol, not entries of an unrelated module.
#[test]
fn test_body_edit_invalidates_only_dependents() {
    let mut call = NodeId::NONE;
    let mut use_unrelated = NodeId::NONE;
    let mut helper_def = NodeId::NONE;
    let mut fixture = Fixture::build(|b| {
        let ret_ann = b.name("int");
        let one = b.int(1);
        let ret = b.return_stmt(one);
        helper_def = b.function_def("helper", vec![], ret_ann, vec![ret]);
        let callee = b.name("helper");
        call = b.call(callee, vec![]);
        let call_stmt = b.expr_stmt(call);
        let y = b.name("y");
        let two = b.int(2);
        let assign = b.assign(y, two);
        use_unrelated = b.name("y");
        let use_stmt = b.expr_stmt(use_unrelated);
        b.module(vec![helper_def, call_stmt, assign, use_stmt])
    });

    fixture.eval_at(call);
    fixture.eval_at(use_unrelated);
    let helper_sym = fixture.binder.symbol_for_node(helper_def).unwrap();

    // The call's cache entry recorded its dependency on the helper symbol.
    let removed = fixture.cache.invalidate_symbol(Dependency {
        file: FileId(0),
        symbol: helper_sym,
    });
    assert!(removed >= 1, "call entries must depend on the callee symbol");

    // The unrelated use's entry survived.
    let y_flow = fixture.binder.flow_at(use_unrelated);
    assert!(
        fixture
            .cache
            .lookup(sift_solver::EvalKey {
                node: use_unrelated,
                flow: y_flow
            })
            .is_some()
    );
}

#[test]
fn test_discard_evaluating_leaves_cache_clean() {
    let mut fixture = Fixture::build(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        b.module(vec![assign])
    });
    let key = sift_solver::EvalKey {
        node: NodeId(0),
        flow: sift_binder::FlowNodeId::NONE,
    };
    fixture.cache.mark_evaluating(key);
    assert!(fixture.cache.is_evaluating(key));
    // A cancelled pass discards in-progress entries; resolved ones stay.
    fixture.eval_at(NodeId(0));
    fixture.cache.discard_evaluating();
    assert!(!fixture.cache.is_evaluating(key));
}
