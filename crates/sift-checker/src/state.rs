//! The per-file checking driver.

use crate::cancel::CancellationToken;
use rustc_hash::FxHashSet;
use sift_binder::{BinderState, DeclarationKind, symbol_flags};
use smallvec::SmallVec;
use sift_common::{Diagnostic, DiagnosticSink, TextRange, codes};
use sift_solver::{
    DeclarationTable, TypeCache, TypeEvaluator, TypeId, TypeInterner, is_assignable,
};
use sift_syntax::{NodeArena, NodeData, NodeId};
use std::panic::AssertUnwindSafe;
use tracing::debug;

/// Analysis configuration. `strict` controls whether expressions that
/// resolve to `Unknown` are reported; lenient runs only surface definite
/// problems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckerOptions {
    pub strict: bool,
    pub report_unreachable: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        CheckerOptions {
            strict: false,
            report_unreachable: true,
        }
    }
}

/// Result of checking one file.
#[derive(Clone, Debug)]
pub struct CheckResult {
    pub diagnostics: Vec<Diagnostic>,
    /// False when the pass was cancelled or abandoned after an internal
    /// failure; the cache holds no half-resolved entries either way.
    pub completed: bool,
}

pub struct CheckerState<'a> {
    arena: &'a NodeArena,
    binder: &'a BinderState,
    db: &'a TypeInterner,
    globals: &'a DeclarationTable,
    options: CheckerOptions,
    cache: &'a mut TypeCache,
    sink: &'a DiagnosticSink,
    cancel: CancellationToken,
    /// Declared return types of enclosing functions; `None` entries mean
    /// unannotated (nothing to check against).
    return_annotations: SmallVec<[Option<TypeId>; 4]>,
}

impl<'a> CheckerState<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: &'a NodeArena,
        binder: &'a BinderState,
        db: &'a TypeInterner,
        globals: &'a DeclarationTable,
        options: CheckerOptions,
        cache: &'a mut TypeCache,
        sink: &'a DiagnosticSink,
        cancel: CancellationToken,
    ) -> Self {
        CheckerState {
            arena,
            binder,
            db,
            globals,
            options,
            cache,
            sink,
            cancel,
            return_annotations: SmallVec::new(),
        }
    }

    fn evaluator(&mut self) -> TypeEvaluator<'_> {
        TypeEvaluator::new(
            self.arena,
            self.binder,
            self.db,
            self.globals,
            self.sink,
            &mut *self.cache,
        )
    }

    fn eval(&mut self, node: NodeId) -> TypeId {
        if node.is_none() {
            return TypeId::UNKNOWN;
        }
        let flow = self.binder.flow_at(node);
        self.evaluator().evaluate(node, flow)
    }

    fn eval_annotation(&mut self, node: NodeId) -> TypeId {
        self.evaluator().evaluate_annotation(node)
    }

    fn error(&self, range: TextRange, message: String, code: u32) {
        self.sink.report(Diagnostic::error(
            self.arena.file_name.clone(),
            range,
            message,
            code,
        ));
    }

    /// Check one file in source order. Returns false when cancelled; the
    /// cache is left without in-progress entries in that case.
    pub fn check_module(&mut self, root: NodeId) -> bool {
        let body = match self.arena.module(root) {
            Some(module) => module.body.clone(),
            None => return true,
        };
        self.check_declaration_conflicts();
        for stmt in body {
            if self.cancel.is_cancelled() {
                self.cache.discard_evaluating();
                debug!("check cancelled at statement boundary");
                return false;
            }
            self.check_statement(stmt);
        }
        true
    }

    fn check_statement(&mut self, stmt: NodeId) {
        self.check_reachability(stmt);
        let Some(node) = self.arena.get(stmt) else { return };
        match &node.data {
            NodeData::Assign(assign) => {
                let assign = assign.clone();
                self.check_assignment(stmt, &assign);
            }
            NodeData::ExprStmt(expr) => {
                let value = expr.value;
                let ty = self.eval(value);
                self.check_unknown(value, ty);
            }
            NodeData::If(if_stmt) => {
                let if_stmt = if_stmt.clone();
                self.eval(if_stmt.test);
                for s in if_stmt.body {
                    self.check_statement(s);
                }
                for s in if_stmt.orelse {
                    self.check_statement(s);
                }
            }
            NodeData::While(while_stmt) => {
                let while_stmt = while_stmt.clone();
                self.eval(while_stmt.test);
                for s in while_stmt.body {
                    self.check_statement(s);
                }
            }
            NodeData::For(for_stmt) => {
                let for_stmt = for_stmt.clone();
                self.eval(for_stmt.iter);
                for s in for_stmt.body {
                    self.check_statement(s);
                }
            }
            NodeData::Try(try_stmt) => {
                let try_stmt = try_stmt.clone();
                for s in try_stmt.body {
                    self.check_statement(s);
                }
                for handler in try_stmt.handlers {
                    if let Some(h) = self.arena.except_handler(handler) {
                        for s in h.body.clone() {
                            self.check_statement(s);
                        }
                    }
                }
                for s in try_stmt.orelse {
                    self.check_statement(s);
                }
                for s in try_stmt.finalbody {
                    self.check_statement(s);
                }
            }
            NodeData::FunctionDef(def) => {
                let def = def.clone();
                self.check_function(stmt, &def);
            }
            NodeData::ClassDef(def) => {
                let body = def.body.clone();
                self.eval(stmt);
                for s in body {
                    self.check_statement(s);
                }
            }
            NodeData::Return(ret) => {
                let value = ret.value;
                self.check_return(stmt, value);
            }
            NodeData::Raise(raise) => {
                let value = raise.value;
                if !value.is_none() {
                    self.eval(value);
                }
            }
            NodeData::Assert(assert) => {
                let (test, msg) = (assert.test, assert.msg);
                self.eval(test);
                if !msg.is_none() {
                    self.eval(msg);
                }
            }
            NodeData::Import(import) => {
                let names = import.names.clone();
                for imported in names {
                    let bound = imported.alias.unwrap_or(imported.name);
                    if self.globals.get(bound).is_none() {
                        let text = self.db.resolve_atom(imported.name);
                        self.error(
                            self.arena.range(stmt),
                            format!("Import '{text}' could not be resolved."),
                            codes::UNRESOLVED_NAME,
                        );
                    }
                }
            }
            NodeData::Pass | NodeData::Break | NodeData::Continue | NodeData::Error => {}
            _ => {
                // Expression in statement position on a malformed tree.
                self.eval(stmt);
            }
        }
    }

    fn check_reachability(&mut self, stmt: NodeId) {
        if !self.options.report_unreachable {
            return;
        }
        let flow = self.binder.flow_at(stmt);
        if flow.is_none() {
            return;
        }
        if self.binder.flow_nodes.is_unreachable(flow) {
            self.sink.report(Diagnostic::suggestion(
                self.arena.file_name.clone(),
                self.arena.range(stmt),
                "Code is unreachable.".to_string(),
                codes::UNREACHABLE_CODE,
            ));
        }
    }

    fn check_unknown(&mut self, node: NodeId, ty: TypeId) {
        if self.options.strict && ty == TypeId::UNKNOWN {
            self.sink.report(Diagnostic::warning(
                self.arena.file_name.clone(),
                self.arena.range(node),
                "Expression type is Unknown.".to_string(),
                codes::UNKNOWN_TYPE,
            ));
        }
    }

    fn check_assignment(&mut self, stmt: NodeId, assign: &sift_syntax::Assign) {
        if assign.value.is_none() {
            // Declaration only: verify the annotation is well-formed.
            self.eval_annotation(assign.annotation);
            return;
        }
        let value_ty = self.eval(assign.value);
        self.check_unknown(assign.value, value_ty);

        let declared = self.declared_target_type(assign);
        if let Some(declared) = declared
            && declared != TypeId::UNKNOWN
            && !is_assignable(self.db, value_ty, declared)
        {
            let value_rendered = self.db.display(value_ty);
            let declared_rendered = self.db.display(declared);
            self.error(
                self.arena.range(stmt),
                format!(
                    "Type '{value_rendered}' is not assignable to declared type \
                     '{declared_rendered}'."
                ),
                codes::ASSIGNMENT_MISMATCH,
            );
        }
    }

    /// The declared (annotated) type the assignment must satisfy, if any:
    /// the inline annotation, an annotation from an earlier declaration of
    /// the same name, or the declared member type for attribute targets.
    fn declared_target_type(&mut self, assign: &sift_syntax::Assign) -> Option<TypeId> {
        if !assign.annotation.is_none() {
            return Some(self.eval_annotation(assign.annotation));
        }
        let target = assign.target;
        let Some(node) = self.arena.get(target) else {
            return None;
        };
        match &node.data {
            NodeData::Name(_) => {
                let sym = self.binder.symbol_for_node(target)?;
                let symbol = self.binder.symbols.get(sym)?;
                let decl = symbol.annotated_declaration().copied()?;
                Some(self.eval_annotation(decl.annotation))
            }
            NodeData::Attribute(attr) => {
                let (value, name) = (attr.value, attr.attr);
                let value_flow = self.binder.flow_at(value);
                let mut evaluator = TypeEvaluator::new(
                    self.arena,
                    self.binder,
                    self.db,
                    self.globals,
                    self.sink,
                    &mut *self.cache,
                );
                let value_ty = evaluator.evaluate(value, value_flow);
                let member = evaluator.attribute_on_type(target, value_ty, name, false);
                if member == TypeId::UNKNOWN {
                    None
                } else {
                    Some(member)
                }
            }
            _ => None,
        }
    }

    fn check_function(&mut self, stmt: NodeId, def: &sift_syntax::FunctionDef) {
        // Evaluating the definition checks its annotations and caches the
        // signature.
        self.eval(stmt);

        let declared_return = if def.return_annotation.is_none() {
            None
        } else if self.is_type_guard_annotation(def.return_annotation) {
            // Guard functions return bools; their annotation is a predicate
            // declaration, not a return type to check against.
            None
        } else {
            Some(self.eval_annotation(def.return_annotation))
        };
        self.return_annotations.push(declared_return);
        for &s in &def.body {
            self.check_statement(s);
        }
        self.return_annotations.pop();
    }

    fn is_type_guard_annotation(&self, annotation: NodeId) -> bool {
        let Some(subscript) = self.arena.subscript(annotation) else {
            return false;
        };
        self.arena
            .name(subscript.value)
            .is_some_and(|n| &*self.arena.interner.resolve(n.name) == "TypeGuard")
    }

    fn check_return(&mut self, stmt: NodeId, value: NodeId) {
        let value_ty = if value.is_none() {
            TypeId::NONE
        } else {
            self.eval(value)
        };
        let Some(Some(declared)) = self.return_annotations.last().copied() else {
            return;
        };
        if declared != TypeId::UNKNOWN && !is_assignable(self.db, value_ty, declared) {
            let value_rendered = self.db.display(value_ty);
            let declared_rendered = self.db.display(declared);
            self.error(
                self.arena.range(stmt),
                format!(
                    "Return type '{value_rendered}' is not assignable to declared \
                     return type '{declared_rendered}'."
                ),
                codes::RETURN_MISMATCH,
            );
        }
    }

    /// A name declared as both a function and a class in one scope is a
    /// conflict; repeated function declarations are overload sets and stay
    /// legal.
    fn check_declaration_conflicts(&mut self) {
        let mut reported: FxHashSet<u32> = FxHashSet::default();
        for (_, symbol) in self.binder.symbols.iter() {
            if symbol.flags & symbol_flags::FUNCTION == 0
                || symbol.flags & symbol_flags::CLASS == 0
            {
                continue;
            }
            let Some(second) = symbol
                .declarations
                .iter()
                .find(|d| matches!(d.kind, DeclarationKind::Class))
            else {
                continue;
            };
            if reported.insert(second.node.0) {
                let text = self.arena.interner.resolve(symbol.name);
                self.error(
                    self.arena.range(second.node),
                    format!("'{text}' is declared as both a function and a class."),
                    codes::DUPLICATE_DECLARATION,
                );
            }
        }
    }
}

/// Check one file inside a panic boundary. A corrupt-invariant panic is
/// downgraded to an internal-error diagnostic for this file, the cache is
/// scrubbed of in-progress entries, and the batch moves on.
#[allow(clippy::too_many_arguments)]
pub fn check_file(
    arena: &NodeArena,
    binder: &BinderState,
    db: &TypeInterner,
    globals: &DeclarationTable,
    options: CheckerOptions,
    cache: &mut TypeCache,
    cancel: &CancellationToken,
) -> CheckResult {
    let root = binder
        .scope(binder.module_scope)
        .map(|scope| scope.node)
        .unwrap_or(NodeId::NONE);
    let sink = DiagnosticSink::new();
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut state = CheckerState::new(
            arena,
            binder,
            db,
            globals,
            options,
            cache,
            &sink,
            cancel.clone(),
        );
        state.check_module(root)
    }));
    let completed = match outcome {
        Ok(completed) => completed,
        Err(_) => {
            cache.discard_evaluating();
            sink.report(Diagnostic::error(
                arena.file_name.clone(),
                arena.range(root),
                "Internal error while checking this file.".to_string(),
                codes::INTERNAL_ERROR,
            ));
            false
        }
    };
    CheckResult {
        diagnostics: sink.drain_sorted(),
        completed,
    }
}
