//! Incremental re-analysis: caches persist across passes and invalidation
//! is scoped to recorded dependencies (the edit scenario).

use sift_binder::BinderState;
use sift_checker::{CancellationToken, CheckerOptions, check_file};
use sift_common::FileId;
use sift_solver::{DeclarationTable, Dependency, ImportedDecl, TypeCache, TypeInterner};
use sift_syntax::{AstBuilder, NodeArena, NodeId};

fn prepare(
    build: impl FnOnce(&mut AstBuilder) -> NodeId,
) -> (NodeArena, BinderState, TypeInterner) {
    let mut builder = AstBuilder::new(FileId(0), "main.sf");
    let root = build(&mut builder);
    let interner = builder.interner();
    let arena = builder.finish();
    let mut binder = BinderState::new();
    binder.bind_module(&arena, root);
    let db = TypeInterner::with_strings(interner);
    (arena, binder, db)
}

#[test]
fn test_second_pass_is_all_cache_hits() {
    let (arena, binder, db) = prepare(|b| {
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        let use_x = b.name("x");
        let stmt = b.expr_stmt(use_x);
        b.module(vec![assign, stmt])
    });
    let globals = DeclarationTable::new();
    let mut cache = TypeCache::new();
    let cancel = CancellationToken::new();

    let first = check_file(
        &arena,
        &binder,
        &db,
        &globals,
        CheckerOptions::default(),
        &mut cache,
        &cancel,
    );
    assert!(first.completed);
    let computed_after_first = cache.computations();
    assert!(computed_after_first > 0);

    let second = check_file(
        &arena,
        &binder,
        &db,
        &globals,
        CheckerOptions::default(),
        &mut cache,
        &cancel,
    );
    assert!(second.completed);
    // No underlying computation ran again.
    assert_eq!(cache.computations(), computed_after_first);
}

/// Editing an imported file's body invalidates only the entries of this
/// file that consulted the edited symbol; everything else survives and the
/// next pass only recomputes the invalidated slice.
#[test]
fn test_dependency_scoped_invalidation_across_passes() {
    let lib_file = FileId(3);
    let lib_symbol = sift_binder::SymbolId(11);
    let (arena, binder, db) = prepare(|b| {
        let import = b.import(&[("lib_fn", None)]);
        let local = {
            let x = b.name("x");
            let one = b.int(1);
            b.assign(x, one)
        };
        let use_import = b.name("lib_fn");
        let import_use = b.expr_stmt(use_import);
        let use_local = b.name("x");
        let local_use = b.expr_stmt(use_local);
        b.module(vec![import, local, import_use, local_use])
    });
    let mut globals = DeclarationTable::new();
    globals.insert(
        db.intern_str("lib_fn"),
        ImportedDecl {
            ty: db.builtins.str_instance,
            origin_file: lib_file,
            origin_symbol: lib_symbol,
        },
    );
    let mut cache = TypeCache::new();
    let cancel = CancellationToken::new();

    let first = check_file(
        &arena,
        &binder,
        &db,
        &globals,
        CheckerOptions::default(),
        &mut cache,
        &cancel,
    );
    assert!(first.completed);
    assert!(first.diagnostics.is_empty(), "got {:?}", first.diagnostics);
    let after_first = cache.computations();
    let populated = cache.len();

    // Simulate an edit to the imported function's body.
    let removed = cache.invalidate_symbol(Dependency {
        file: lib_file,
        symbol: lib_symbol,
    });
    assert!(removed >= 1);
    assert!(removed < populated, "local entries must survive the edit");

    let second = check_file(
        &arena,
        &binder,
        &db,
        &globals,
        CheckerOptions::default(),
        &mut cache,
        &cancel,
    );
    assert!(second.completed);
    let recomputed = cache.computations() - after_first;
    assert_eq!(
        recomputed as usize, removed,
        "only invalidated entries recompute"
    );
}
