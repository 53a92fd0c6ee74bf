//! Lazy, memoized type evaluation.
//!
//! `evaluate(node, flow)` computes the type of one expression at one flow
//! position, consulting the narrowing walk for references, and caches the
//! result keyed by `(node, flow)`. Evaluation is pure given the binder
//! output and the declaration table; its only side effects are cache writes,
//! dependency recording, and diagnostics through the sink.
//!
//! Re-entrant evaluation of a key already in progress (legal for
//! self-referential aliases and classes) returns a `Recursive` marker type;
//! when the outer evaluation completes, the marker is bound to the resolved
//! type and the cache entry is patched, so consumers that embedded the
//! marker compare equal to the resolution from then on.

use crate::cache::{Dependency, EvalKey, TypeCache};
use crate::intern::TypeInterner;
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::types::{
    ClassShape, FunctionShape, ParamInfo, PredicateInfo, TypeId, TypeKey, TypeVarInfo, Variance,
};
use rustc_hash::{FxHashMap, FxHashSet};
use sift_binder::{BinderState, FlowNodeId, ScopeId, SymbolId, symbol_flags};
use sift_common::{Atom, Diagnostic, DiagnosticSink, FileId, TextRange, codes, limits};
use sift_syntax::{
    BinaryOp, LiteralKind, NodeArena, NodeData, NodeId, UnaryOp,
};
use tracing::trace;

/// One imported name, pre-resolved by the external import collaborator.
#[derive(Copy, Clone, Debug)]
pub struct ImportedDecl {
    pub ty: TypeId,
    pub origin_file: FileId,
    pub origin_symbol: SymbolId,
}

/// Read-only table of imported names shared by every pipeline of a pass.
#[derive(Default)]
pub struct DeclarationTable {
    entries: FxHashMap<Atom, ImportedDecl>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        DeclarationTable::default()
    }

    pub fn insert(&mut self, name: Atom, decl: ImportedDecl) {
        self.entries.insert(name, decl);
    }

    pub fn get(&self, name: Atom) -> Option<&ImportedDecl> {
        self.entries.get(&name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EvalMode {
    Value,
    Annotation,
}

/// Per-pass evaluation context: binder output, interner, declaration table,
/// and the mutable cache, threaded explicitly through every call — there is
/// no ambient singleton.
pub struct TypeEvaluator<'a> {
    pub(crate) arena: &'a NodeArena,
    pub(crate) binder: &'a BinderState,
    pub(crate) db: &'a TypeInterner,
    pub(crate) globals: &'a DeclarationTable,
    pub(crate) sink: &'a DiagnosticSink,
    pub(crate) cache: &'a mut TypeCache,
    /// Keys currently being computed; the slot holds the marker handed to
    /// re-entrant evaluations, created on first re-entry.
    pending: FxHashMap<EvalKey, Option<TypeId>>,
    guard: RecursionGuard<EvalKey>,
    dep_stack: Vec<FxHashSet<Dependency>>,
    type_param_env: Vec<FxHashMap<Atom, TypeId>>,
    recursion_reported: bool,
}

impl<'a> TypeEvaluator<'a> {
    pub fn new(
        arena: &'a NodeArena,
        binder: &'a BinderState,
        db: &'a TypeInterner,
        globals: &'a DeclarationTable,
        sink: &'a DiagnosticSink,
        cache: &'a mut TypeCache,
    ) -> Self {
        TypeEvaluator {
            arena,
            binder,
            db,
            globals,
            sink,
            cache,
            pending: FxHashMap::default(),
            guard: RecursionGuard::with_profile(RecursionProfile::TypeEvaluation),
            dep_stack: Vec::new(),
            type_param_env: Vec::new(),
            recursion_reported: false,
        }
    }

    /// Type of `node` as a value expression at flow position `flow`.
    pub fn evaluate(&mut self, node: NodeId, flow: FlowNodeId) -> TypeId {
        self.memoized(EvalKey { node, flow }, EvalMode::Value)
    }

    /// Type named by `node` read as a type annotation. Annotations are
    /// flow-insensitive, so the cache key uses the none flow.
    pub fn evaluate_annotation(&mut self, node: NodeId) -> TypeId {
        if node.is_none() {
            return TypeId::UNKNOWN;
        }
        self.memoized(
            EvalKey {
                node,
                flow: FlowNodeId::NONE,
            },
            EvalMode::Annotation,
        )
    }

    fn memoized(&mut self, key: EvalKey, mode: EvalMode) -> TypeId {
        if let Some((ty, deps)) = self.cache.lookup(key) {
            self.record_dependencies(&deps);
            return ty;
        }
        if self.pending.contains_key(&key) {
            if let Some(marker) = self.pending.get(&key).copied().flatten() {
                return marker;
            }
            let marker = self.db.fresh_recursive();
            self.pending.insert(key, Some(marker));
            return marker;
        }
        match self.guard.enter(key) {
            RecursionResult::Entered => {}
            RecursionResult::Cycle | RecursionResult::Exceeded => {
                self.report_recursion_limit(key.node);
                return TypeId::UNKNOWN;
            }
        }
        self.pending.insert(key, None);
        self.cache.mark_evaluating(key);
        self.dep_stack.push(FxHashSet::default());

        let result = stacker::maybe_grow(limits::STACK_RED_ZONE, limits::STACK_GROWTH, || {
            match mode {
                EvalMode::Value => self.evaluate_uncached(key.node, key.flow),
                EvalMode::Annotation => self.evaluate_annotation_uncached(key.node),
            }
        });

        let deps = self.dep_stack.pop().unwrap_or_default();
        if let Some(parent) = self.dep_stack.last_mut() {
            parent.extend(deps.iter().copied());
        }
        if let Some(Some(marker)) = self.pending.remove(&key) {
            self.db.bind_recursive(marker, result);
        }
        self.guard.leave(key);
        self.cache.resolve(key, result, deps);
        trace!(node = key.node.0, flow = key.flow.0, "evaluated");
        result
    }

    // ===== Dependencies and diagnostics =====

    pub(crate) fn add_dependency(&mut self, file: FileId, symbol: SymbolId) {
        if let Some(frame) = self.dep_stack.last_mut() {
            frame.insert(Dependency { file, symbol });
        }
    }

    fn record_dependencies(&mut self, deps: &[Dependency]) {
        if let Some(frame) = self.dep_stack.last_mut() {
            frame.extend(deps.iter().copied());
        }
    }

    pub(crate) fn range_of(&self, node: NodeId) -> TextRange {
        self.arena.range(node)
    }

    pub(crate) fn error(&self, node: NodeId, message: String, code: u32) {
        self.sink.report(Diagnostic::error(
            self.arena.file_name.clone(),
            self.range_of(node),
            message,
            code,
        ));
    }

    pub(crate) fn warning(&self, node: NodeId, message: String, code: u32) {
        self.sink.report(Diagnostic::warning(
            self.arena.file_name.clone(),
            self.range_of(node),
            message,
            code,
        ));
    }

    fn report_recursion_limit(&mut self, node: NodeId) {
        if !self.recursion_reported {
            self.recursion_reported = true;
            self.sink.report(Diagnostic::suggestion(
                self.arena.file_name.clone(),
                self.range_of(node),
                "Type evaluation depth limit exceeded; treating as Unknown.".to_string(),
                codes::RECURSION_LIMIT,
            ));
        }
    }

    // ===== Value evaluation =====

    fn evaluate_uncached(&mut self, node: NodeId, flow: FlowNodeId) -> TypeId {
        let Some(n) = self.arena.get(node) else {
            return TypeId::UNKNOWN;
        };
        match &n.data {
            NodeData::Literal(lit) => self.literal_type(&lit.value),
            NodeData::Name(_) => self.evaluate_name(node, flow),
            NodeData::Attribute(_) => self.evaluate_attribute(node, flow),
            NodeData::Call(_) => self.evaluate_call(node, flow),
            NodeData::Compare(c) => {
                let (left, right) = (c.left, c.right);
                self.evaluate(left, flow);
                self.evaluate(right, flow);
                self.db.builtins.bool_instance
            }
            NodeData::BoolOp(b) => {
                let values = b.values.clone();
                let members: Vec<TypeId> =
                    values.iter().map(|&v| self.evaluate(v, flow)).collect();
                self.db.union(members)
            }
            NodeData::Unary(u) => {
                let (op, operand) = (u.op, u.operand);
                let operand_ty = self.evaluate(operand, flow);
                match op {
                    UnaryOp::Not => self.db.builtins.bool_instance,
                    UnaryOp::Neg => self.db.widen_literal(operand_ty),
                }
            }
            NodeData::Binary(b) => {
                let (left, op, right) = (b.left, b.op, b.right);
                let left_ty = self.evaluate(left, flow);
                let right_ty = self.evaluate(right, flow);
                self.binary_result(left_ty, op, right_ty)
            }
            NodeData::Tuple(t) => {
                let elements = t.elements.clone();
                let members: Vec<TypeId> = elements
                    .iter()
                    .map(|&e| self.db.widen_literal(self.evaluate_owned(e, flow)))
                    .collect();
                let element = if members.is_empty() {
                    TypeId::UNKNOWN
                } else {
                    self.db.union(members)
                };
                self.db.tuple_of(element)
            }
            NodeData::List(l) => {
                let elements = l.elements.clone();
                let members: Vec<TypeId> = elements
                    .iter()
                    .map(|&e| self.db.widen_literal(self.evaluate_owned(e, flow)))
                    .collect();
                let element = if members.is_empty() {
                    TypeId::UNKNOWN
                } else {
                    self.db.union(members)
                };
                self.db.list_of(element)
            }
            NodeData::ListComp(comp) => {
                let element = comp.element;
                let element_flow = self.binder.flow_at(element);
                let element_ty = self.evaluate(element, element_flow);
                self.db.list_of(self.db.widen_literal(element_ty))
            }
            NodeData::Subscript(s) => {
                let (value, index) = (s.value, s.index);
                self.evaluate_subscript(value, index, flow)
            }
            NodeData::Lambda(l) => {
                let l = l.clone();
                self.evaluate_lambda(node, &l)
            }
            NodeData::FunctionDef(_) => self.evaluate_function_def(node),
            NodeData::ClassDef(_) => self.evaluate_class_def(node),
            NodeData::Error => TypeId::UNKNOWN,
            _ => TypeId::UNKNOWN,
        }
    }

    // Borrow helper: evaluate where the closure already holds `self.db`.
    fn evaluate_owned(&mut self, node: NodeId, flow: FlowNodeId) -> TypeId {
        self.evaluate(node, flow)
    }

    pub(crate) fn literal_type(&self, value: &LiteralKind) -> TypeId {
        match value {
            LiteralKind::Int(v) => self.db.literal_int(*v),
            LiteralKind::Str(s) => self.db.intern(TypeKey::Literal(
                crate::types::LiteralValue::Str(*s),
            )),
            LiteralKind::Bool(v) => self.db.literal_bool(*v),
            // Float literal types are not modeled; floats are just floats.
            LiteralKind::Float(_) => self.db.builtins.float_instance,
            LiteralKind::None => TypeId::NONE,
        }
    }

    fn binary_result(&mut self, left: TypeId, op: BinaryOp, right: TypeId) -> TypeId {
        let db = self.db;
        if op == BinaryOp::BitOr && self.is_type_object(left) && self.is_type_object(right) {
            // `int | str` in value position is itself a type expression.
            let left = self.to_instance(left);
            let right = self.to_instance(right);
            return db.union2(left, right);
        }
        let left = db.widen_literal(db.resolve_recursive(left));
        let right = db.widen_literal(db.resolve_recursive(right));
        let int = db.builtins.int_instance;
        let float = db.builtins.float_instance;
        let s = db.builtins.str_instance;
        let bool_ = db.builtins.bool_instance;
        let as_num = |t: TypeId| t == int || t == float || t == bool_;
        match op {
            BinaryOp::Add if left == s && right == s => s,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod
                if as_num(left) && as_num(right) =>
            {
                if left == float || right == float { float } else { int }
            }
            BinaryOp::Div if as_num(left) && as_num(right) => float,
            BinaryOp::BitOr | BinaryOp::BitAnd if left == int && right == int => int,
            _ => TypeId::UNKNOWN,
        }
    }

    fn is_type_object(&self, ty: TypeId) -> bool {
        matches!(
            self.db.lookup(self.db.resolve_recursive(ty)),
            Some(TypeKey::Class(..) | TypeKey::None | TypeKey::Union(_))
        )
    }

    pub(crate) fn to_instance(&self, ty: TypeId) -> TypeId {
        match self.db.lookup(self.db.resolve_recursive(ty)) {
            Some(TypeKey::Class(shape, args)) => self.db.intern(TypeKey::Instance(shape, args)),
            Some(TypeKey::Union(members)) => {
                let members: Vec<TypeId> = self
                    .db
                    .type_list(members)
                    .iter()
                    .map(|&m| self.to_instance(m))
                    .collect();
                self.db.union(members)
            }
            _ => ty,
        }
    }

    // ===== Names =====

    fn evaluate_name(&mut self, node: NodeId, flow: FlowNodeId) -> TypeId {
        let Some(name_expr) = self.arena.name(node) else {
            return TypeId::UNKNOWN;
        };
        let name = name_expr.name;
        let Some(sym_id) = self.binder.symbol_for_node(node) else {
            return self.evaluate_free_name(node, name);
        };
        self.add_dependency(self.arena.file, sym_id);
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        let flags = symbol.flags;
        let declarations = symbol.declarations.clone();

        if flags & symbol_flags::CLASS != 0 {
            if let Some(decl) = declarations
                .iter()
                .find(|d| d.kind == sift_binder::DeclarationKind::Class)
            {
                return self.evaluate(decl.node, FlowNodeId::NONE);
            }
        }
        if flags & symbol_flags::FUNCTION != 0 {
            return self.evaluate_function_symbol(sym_id);
        }
        if flags & symbol_flags::IMPORT != 0 {
            if let Some(decl) = self.globals.get(name).copied() {
                self.add_dependency(decl.origin_file, decl.origin_symbol);
                return decl.ty;
            }
            let text = self.db.resolve_atom(name);
            self.error(
                node,
                format!("Import '{text}' could not be resolved."),
                codes::UNRESOLVED_NAME,
            );
            return TypeId::UNKNOWN;
        }
        if flags & symbol_flags::UNKNOWN != 0 {
            return TypeId::UNKNOWN;
        }

        let assumed = self.assumed_reference_type(sym_id);
        let narrowed = self.narrow(node, flow, assumed);
        self.check_possibly_unbound(node, name, narrowed)
    }

    fn evaluate_free_name(&mut self, node: NodeId, name: Atom) -> TypeId {
        if let Some(decl) = self.globals.get(name).copied() {
            self.add_dependency(decl.origin_file, decl.origin_symbol);
            return decl.ty;
        }
        if let Some(ty) = self.db.builtins.lookup(name) {
            return ty;
        }
        let text = self.db.resolve_atom(name);
        self.error(
            node,
            format!("Name '{text}' is not defined."),
            codes::UNRESOLVED_NAME,
        );
        TypeId::UNKNOWN
    }

    /// The flow-walk starting assumption for a reference: the declared
    /// (annotated) type when one exists; `Unknown` for unannotated
    /// parameters (bound at call time); otherwise `Unbound`, so paths that
    /// reach the scope start without an assignment surface as such.
    pub(crate) fn assumed_reference_type(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        if let Some(decl) = symbol.annotated_declaration().copied() {
            return self.evaluate_annotation(decl.annotation);
        }
        let is_parameter = symbol
            .declarations
            .iter()
            .any(|d| d.kind == sift_binder::DeclarationKind::Parameter);
        if is_parameter {
            TypeId::UNKNOWN
        } else {
            TypeId::UNBOUND
        }
    }

    fn check_possibly_unbound(&mut self, node: NodeId, name: Atom, narrowed: TypeId) -> TypeId {
        let members = self.db.union_members(self.db.resolve_recursive(narrowed));
        let had_unbound = members
            .iter()
            .any(|&m| self.db.resolve_recursive(m) == TypeId::UNBOUND);
        if !had_unbound {
            return narrowed;
        }
        let rest: Vec<TypeId> = members
            .into_iter()
            .filter(|&m| self.db.resolve_recursive(m) != TypeId::UNBOUND)
            .collect();
        let text = self.db.resolve_atom(name);
        if rest.is_empty() {
            self.error(
                node,
                format!("'{text}' is unbound."),
                codes::POSSIBLY_UNBOUND,
            );
            return TypeId::UNKNOWN;
        }
        self.warning(
            node,
            format!("'{text}' is possibly unbound."),
            codes::POSSIBLY_UNBOUND,
        );
        self.db.union(rest)
    }

    /// Flow-insensitive declared type of a symbol: the annotation when one
    /// exists, otherwise the union of all declarations' value types with
    /// literals widened to their class.
    pub fn declared_type_of_symbol(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        if let Some(decl) = symbol.annotated_declaration().copied() {
            return self.evaluate_annotation(decl.annotation);
        }
        let declarations = symbol.declarations.clone();
        self.add_dependency(self.arena.file, sym_id);
        let mut members = Vec::new();
        for decl in declarations {
            let ty = self.declaration_value_type(&decl);
            members.push(self.db.widen_literal(ty));
        }
        self.db.union(members)
    }

    fn declaration_value_type(&mut self, decl: &sift_binder::Declaration) -> TypeId {
        use sift_binder::DeclarationKind;
        match decl.kind {
            DeclarationKind::Variable => {
                if let Some(assign) = self.arena.assign(decl.node) {
                    let value = assign.value;
                    if value.is_none() {
                        return TypeId::UNKNOWN;
                    }
                    let value_flow = self.binder.flow_at(value);
                    return self.evaluate(value, value_flow);
                }
                TypeId::UNKNOWN
            }
            DeclarationKind::Parameter => TypeId::UNKNOWN,
            DeclarationKind::Function => self.evaluate(decl.node, FlowNodeId::NONE),
            DeclarationKind::Class => self.evaluate(decl.node, FlowNodeId::NONE),
            DeclarationKind::LoopTarget => {
                if let Some(for_stmt) = self.arena.for_stmt(decl.node) {
                    let iter = for_stmt.iter;
                    let iter_flow = self.binder.flow_at(iter);
                    let iter_ty = self.evaluate(iter, iter_flow);
                    return self.iterated_element_type(iter_ty);
                }
                TypeId::UNKNOWN
            }
            DeclarationKind::ComprehensionTarget => {
                if let Some(comp) = self.arena.list_comp(decl.node) {
                    let iter = comp.iter;
                    let iter_flow = self.binder.flow_at(iter);
                    let iter_ty = self.evaluate(iter, iter_flow);
                    return self.iterated_element_type(iter_ty);
                }
                TypeId::UNKNOWN
            }
            DeclarationKind::ImportAlias => {
                let name = self
                    .binder
                    .symbols
                    .get(self.binder.symbol_for_node(decl.node).unwrap_or(SymbolId::NONE))
                    .map(|s| s.name);
                if let Some(name) = name
                    && let Some(imported) = self.globals.get(name).copied()
                {
                    self.add_dependency(imported.origin_file, imported.origin_symbol);
                    return imported.ty;
                }
                TypeId::UNKNOWN
            }
            DeclarationKind::ExceptBinding => {
                if decl.annotation.is_none() {
                    self.db.builtins.base_exception_instance
                } else {
                    self.evaluate_annotation(decl.annotation)
                }
            }
            DeclarationKind::Placeholder => TypeId::UNKNOWN,
        }
    }

    pub(crate) fn iterated_element_type(&self, iter_ty: TypeId) -> TypeId {
        let iter_ty = self.db.resolve_recursive(iter_ty);
        match self.db.lookup(iter_ty) {
            Some(TypeKey::Instance(shape, args)) => {
                let args = self.db.type_list(args);
                if shape == self.db.builtins.list_shape
                    || shape == self.db.builtins.tuple_shape
                    || shape == self.db.builtins.dict_shape
                {
                    args.first().copied().unwrap_or(TypeId::UNKNOWN)
                } else if shape == self.db.builtins.str_shape {
                    self.db.builtins.str_instance
                } else {
                    TypeId::UNKNOWN
                }
            }
            Some(TypeKey::Union(members)) => {
                let members: Vec<TypeId> = self
                    .db
                    .type_list(members)
                    .iter()
                    .map(|&m| self.iterated_element_type(m))
                    .collect();
                self.db.union(members)
            }
            _ => TypeId::UNKNOWN,
        }
    }

    // ===== Attributes =====

    fn evaluate_attribute(&mut self, node: NodeId, flow: FlowNodeId) -> TypeId {
        let Some(attr_expr) = self.arena.attribute(node) else {
            return TypeId::UNKNOWN;
        };
        let (value, attr) = (attr_expr.value, attr_expr.attr);
        let value_ty = self.evaluate(value, flow);
        let base = self.attribute_on_type(node, value_ty, attr, true);
        // The attribute chain itself is a narrowable reference.
        self.narrow(node, flow, base)
    }

    /// Member type of `attr` on `value_ty`, before narrowing. Also the
    /// checker's way to find the declared type of an attribute target.
    pub fn attribute_on_type(
        &mut self,
        node: NodeId,
        value_ty: TypeId,
        attr: Atom,
        report: bool,
    ) -> TypeId {
        let value_ty = self.db.resolve_recursive(value_ty);
        match self.db.lookup(value_ty) {
            Some(TypeKey::Any | TypeKey::Unknown) => TypeId::UNKNOWN,
            Some(TypeKey::Union(members)) => {
                let members = self.db.type_list(members);
                let mut out = Vec::with_capacity(members.len());
                for &member in members.iter() {
                    out.push(self.attribute_on_type(node, member, attr, report));
                }
                self.db.union(out)
            }
            Some(TypeKey::Instance(shape, args)) => {
                match self.lookup_member(shape, attr, true) {
                    Some(member_ty) => self.specialize_member(shape, args, member_ty),
                    None => {
                        if report {
                            self.report_missing_attribute(node, value_ty, attr);
                        }
                        TypeId::UNKNOWN
                    }
                }
            }
            Some(TypeKey::Class(shape, args)) => {
                match self.lookup_member(shape, attr, false) {
                    Some(member_ty) => self.specialize_member(shape, args, member_ty),
                    None => {
                        if report {
                            self.report_missing_attribute(node, value_ty, attr);
                        }
                        TypeId::UNKNOWN
                    }
                }
            }
            Some(TypeKey::Literal(value)) => {
                let instance = self.db.literal_class_instance(&value);
                self.attribute_on_type(node, instance, attr, report)
            }
            _ => {
                if report {
                    self.report_missing_attribute(node, value_ty, attr);
                }
                TypeId::UNKNOWN
            }
        }
    }

    fn report_missing_attribute(&mut self, node: NodeId, value_ty: TypeId, attr: Atom) {
        let attr_text = self.db.resolve_atom(attr);
        let rendered = self.db.display(value_ty);
        self.error(
            node,
            format!("'{rendered}' has no attribute '{attr_text}'."),
            codes::UNRESOLVED_ATTRIBUTE,
        );
    }

    /// Resolve a member through the class body scope, walking bases.
    /// `bind_self` drops the leading `self` parameter of methods, modeling
    /// bound-method access on instances.
    fn lookup_member(
        &mut self,
        shape_id: crate::types::ClassShapeId,
        attr: Atom,
        bind_self: bool,
    ) -> Option<TypeId> {
        let shape = self.db.class_shape(shape_id);
        if !shape.scope.is_none()
            && let Some(scope) = self.binder.scope(shape.scope)
            && let Some(member_sym) = scope.table.get(attr)
        {
            self.add_dependency(self.arena.file, member_sym);
            let member_ty = self.member_symbol_type(member_sym);
            return Some(if bind_self {
                self.bind_method(member_ty)
            } else {
                member_ty
            });
        }
        let bases = self.db.type_list(shape.bases);
        for &base in bases.iter() {
            if let Some(TypeKey::Instance(base_shape, _)) =
                self.db.lookup(self.db.resolve_recursive(base))
                && let Some(found) = self.lookup_member(base_shape, attr, bind_self)
            {
                return Some(found);
            }
        }
        None
    }

    fn member_symbol_type(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        if symbol.flags & symbol_flags::FUNCTION != 0 {
            return self.evaluate_function_symbol(sym_id);
        }
        self.declared_type_of_symbol(sym_id)
    }

    fn bind_method(&mut self, member_ty: TypeId) -> TypeId {
        let member_ty = self.db.resolve_recursive(member_ty);
        match self.db.lookup(member_ty) {
            Some(TypeKey::Function(shape_id)) => {
                let shape = self.db.function_shape(shape_id);
                let self_atom = self.db.intern_str("self");
                if shape.params.first().map(|p| p.name) == Some(self_atom) {
                    let mut shape = (*shape).clone();
                    shape.params.remove(0);
                    return self.db.function(shape);
                }
                member_ty
            }
            Some(TypeKey::Overloaded(members)) => {
                let members: Vec<TypeId> = self
                    .db
                    .type_list(members)
                    .iter()
                    .map(|&m| self.bind_method(m))
                    .collect();
                self.db.overloaded(members)
            }
            _ => member_ty,
        }
    }

    /// Apply a class's specialization arguments to a member type.
    fn specialize_member(
        &mut self,
        shape_id: crate::types::ClassShapeId,
        args: crate::types::TypeListId,
        member_ty: TypeId,
    ) -> TypeId {
        let args = self.db.type_list(args);
        if args.is_empty() {
            return member_ty;
        }
        let params = self.db.type_list(self.db.class_shape(shape_id).type_params);
        let mut substitution = crate::infer::Substitution::new();
        for (&param, &arg) in params.iter().zip(args.iter()) {
            substitution.insert(param, arg);
        }
        crate::infer::instantiate(self.db, member_ty, &substitution)
    }

    // ===== Subscripts =====

    fn evaluate_subscript(&mut self, value: NodeId, index: NodeId, flow: FlowNodeId) -> TypeId {
        let value_ty = self.db.resolve_recursive(self.evaluate(value, flow));
        match self.db.lookup(value_ty) {
            // Subscripting a class object is a type expression in value
            // position (`list[int]`, generic aliases).
            Some(TypeKey::Class(shape, _)) => {
                let args = self.annotation_arguments(index);
                self.db.class_type(shape, args)
            }
            Some(TypeKey::Instance(shape, args)) => {
                self.evaluate(index, flow);
                let args = self.db.type_list(args);
                if shape == self.db.builtins.list_shape || shape == self.db.builtins.tuple_shape {
                    args.first().copied().unwrap_or(TypeId::UNKNOWN)
                } else if shape == self.db.builtins.dict_shape {
                    args.get(1).copied().unwrap_or(TypeId::UNKNOWN)
                } else if shape == self.db.builtins.str_shape {
                    self.db.builtins.str_instance
                } else {
                    TypeId::UNKNOWN
                }
            }
            _ => {
                self.evaluate(index, flow);
                TypeId::UNKNOWN
            }
        }
    }

    // ===== Lambdas =====

    fn evaluate_lambda(&mut self, _node: NodeId, lambda: &sift_syntax::LambdaExpr) -> TypeId {
        let mut params = Vec::with_capacity(lambda.params.len());
        for &param in &lambda.params {
            if let Some(p) = self.arena.param(param) {
                let (p_name, p_ann, p_default) = (p.name, p.annotation, p.default);
                let ty = if p_ann.is_none() {
                    TypeId::UNKNOWN
                } else {
                    self.evaluate_annotation(p_ann)
                };
                params.push(ParamInfo {
                    name: p_name,
                    ty,
                    has_default: !p_default.is_none(),
                });
            }
        }
        let body_flow = self.binder.flow_at(lambda.body);
        let ret = self.evaluate(lambda.body, body_flow);
        self.db.function(FunctionShape {
            name: self.db.intern_str("<lambda>"),
            node: _node,
            params,
            ret,
            type_params: crate::types::TypeListId::EMPTY,
            predicate: None,
        })
    }

    // ===== Functions =====

    pub(crate) fn evaluate_function_symbol(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        self.add_dependency(self.arena.file, sym_id);
        let fn_decls: Vec<NodeId> = symbol
            .declarations
            .iter()
            .filter(|d| d.kind == sift_binder::DeclarationKind::Function)
            .map(|d| d.node)
            .collect();
        if fn_decls.is_empty() {
            return TypeId::UNKNOWN;
        }
        let overload_decls: Vec<NodeId> = fn_decls
            .iter()
            .copied()
            .filter(|&d| {
                self.arena
                    .function_def(d)
                    .is_some_and(|f| f.is_overload)
            })
            .collect();
        if overload_decls.len() > 1 {
            let members: Vec<TypeId> = overload_decls
                .iter()
                .map(|&d| self.evaluate(d, FlowNodeId::NONE))
                .collect();
            return self.db.overloaded(members);
        }
        // Plain redefinition: the last definition wins.
        let last = *fn_decls.last().unwrap();
        self.evaluate(last, FlowNodeId::NONE)
    }

    fn evaluate_function_def(&mut self, stmt: NodeId) -> TypeId {
        let Some(def) = self.arena.function_def(stmt) else {
            return TypeId::UNKNOWN;
        };
        let def = def.clone();

        let mut frames = 0;
        if let Some(class_params) = self.enclosing_class_type_params(stmt) {
            self.push_type_param_frame(&class_params);
            frames += 1;
        }
        let type_params = self.build_type_params(&def.type_params, stmt);
        if !type_params.is_empty() {
            self.push_type_param_frame(&type_params);
            frames += 1;
        }

        let mut params = Vec::with_capacity(def.params.len());
        for &param in &def.params {
            if let Some(p) = self.arena.param(param) {
                let (p_name, p_ann, p_default) = (p.name, p.annotation, p.default);
                let ty = if p_ann.is_none() {
                    TypeId::UNKNOWN
                } else {
                    self.evaluate_annotation(p_ann)
                };
                params.push(ParamInfo {
                    name: p_name,
                    ty,
                    has_default: !p_default.is_none(),
                });
            }
        }

        let predicate = self.type_guard_predicate(&def, &params);
        let ret = if predicate.is_some() {
            self.db.builtins.bool_instance
        } else if !def.return_annotation.is_none() {
            self.evaluate_annotation(def.return_annotation)
        } else {
            self.infer_return_type(&def.body)
        };

        for _ in 0..frames {
            self.pop_type_param_frame();
        }

        self.db.function(FunctionShape {
            name: def.name,
            node: stmt,
            params,
            ret,
            type_params: self
                .db
                .intern_type_list(type_params.iter().map(|&(_, ty)| ty).collect()),
            predicate,
        })
    }

    /// `-> TypeGuard[T]` declares that a true return narrows the first
    /// non-self argument to `T`.
    fn type_guard_predicate(
        &mut self,
        def: &sift_syntax::FunctionDef,
        params: &[ParamInfo],
    ) -> Option<PredicateInfo> {
        let annotation = def.return_annotation;
        let subscript = self.arena.subscript(annotation)?;
        let (sub_value, sub_index) = (subscript.value, subscript.index);
        let name = self.arena.name(sub_value)?;
        if name.name != self.db.intern_str("TypeGuard") {
            return None;
        }
        let ty = self.evaluate_annotation(sub_index);
        let self_atom = self.db.intern_str("self");
        let param = params
            .iter()
            .position(|p| p.name != self_atom)
            .unwrap_or(0) as u32;
        Some(PredicateInfo { param, ty })
    }

    fn infer_return_type(&mut self, body: &[NodeId]) -> TypeId {
        let mut returns = Vec::new();
        let mut saw_return = false;
        self.collect_returns(body, &mut returns, &mut saw_return);
        if !saw_return {
            return TypeId::NONE;
        }
        let mut members = Vec::new();
        for value in returns {
            if value.is_none() {
                members.push(TypeId::NONE);
            } else {
                let flow = self.binder.flow_at(value);
                let ty = self.evaluate(value, flow);
                members.push(ty);
            }
        }
        self.db.union(members)
    }

    fn collect_returns(&self, body: &[NodeId], out: &mut Vec<NodeId>, saw: &mut bool) {
        for &stmt in body {
            let Some(node) = self.arena.get(stmt) else { continue };
            match &node.data {
                NodeData::Return(r) => {
                    *saw = true;
                    out.push(r.value);
                }
                NodeData::If(i) => {
                    self.collect_returns(&i.body, out, saw);
                    self.collect_returns(&i.orelse, out, saw);
                }
                NodeData::While(w) => self.collect_returns(&w.body, out, saw),
                NodeData::For(f) => self.collect_returns(&f.body, out, saw),
                NodeData::Try(t) => {
                    self.collect_returns(&t.body, out, saw);
                    for &handler in &t.handlers {
                        if let Some(h) = self.arena.except_handler(handler) {
                            self.collect_returns(&h.body, out, saw);
                        }
                    }
                    self.collect_returns(&t.orelse, out, saw);
                    self.collect_returns(&t.finalbody, out, saw);
                }
                // Nested callables return for themselves.
                NodeData::FunctionDef(_) | NodeData::ClassDef(_) => {}
                _ => {}
            }
        }
    }

    // ===== Classes =====

    fn evaluate_class_def(&mut self, stmt: NodeId) -> TypeId {
        let Some(def) = self.arena.class_def(stmt) else {
            return TypeId::UNKNOWN;
        };
        let def = def.clone();
        let scope = self
            .binder
            .node_scope_ids
            .get(&stmt.0)
            .copied()
            .unwrap_or(ScopeId::NONE);

        let type_params = self.build_type_params(&def.type_params, stmt);
        self.push_type_param_frame(&type_params);
        let mut bases: Vec<TypeId> = def
            .bases
            .iter()
            .map(|&b| self.evaluate_annotation(b))
            .collect();
        self.pop_type_param_frame();
        bases.retain(|&b| b != TypeId::UNKNOWN);
        if bases.is_empty() {
            bases.push(self.db.builtins.object_instance);
        }

        let shape = self.db.intern_class_shape(ClassShape {
            name: def.name,
            node: stmt,
            scope,
            type_params: self
                .db
                .intern_type_list(type_params.iter().map(|&(_, ty)| ty).collect()),
            bases: self.db.intern_type_list(bases),
        });
        self.db.class_type(shape, Vec::new())
    }

    // ===== Type parameters =====

    fn build_type_params(&mut self, nodes: &[NodeId], binder_node: NodeId) -> Vec<(Atom, TypeId)> {
        let mut out = Vec::with_capacity(nodes.len());
        for &node in nodes {
            if let Some(tp) = self.arena.type_param(node) {
                let (tp_name, tp_bound) = (tp.name, tp.bound);
                let bound = if tp_bound.is_none() {
                    TypeId::UNKNOWN
                } else {
                    self.evaluate_annotation(tp_bound)
                };
                let ty = self.db.intern(TypeKey::TypeVar(TypeVarInfo {
                    name: tp_name,
                    bound,
                    variance: Variance::Invariant,
                    binder: binder_node,
                }));
                out.push((tp_name, ty));
            }
        }
        out
    }

    fn enclosing_class_type_params(&mut self, def_node: NodeId) -> Option<Vec<(Atom, TypeId)>> {
        let scope_id = self.binder.node_scope_ids.get(&def_node.0).copied()?;
        let parent = self.binder.scope(scope_id)?.parent;
        let parent_scope = self.binder.scope(parent)?;
        if parent_scope.kind != sift_binder::ScopeKind::Class {
            return None;
        }
        let class_node = parent_scope.node;
        let class_def = self.arena.class_def(class_node)?;
        let type_param_nodes = class_def.type_params.clone();
        if type_param_nodes.is_empty() {
            return None;
        }
        Some(self.build_type_params(&type_param_nodes, class_node))
    }

    fn push_type_param_frame(&mut self, params: &[(Atom, TypeId)]) {
        let mut frame = FxHashMap::default();
        for &(name, ty) in params {
            frame.insert(name, ty);
        }
        self.type_param_env.push(frame);
    }

    fn pop_type_param_frame(&mut self) {
        self.type_param_env.pop();
    }

    fn lookup_type_param(&self, name: Atom) -> Option<TypeId> {
        for frame in self.type_param_env.iter().rev() {
            if let Some(&ty) = frame.get(&name) {
                return Some(ty);
            }
        }
        None
    }

    // ===== Annotations =====

    fn evaluate_annotation_uncached(&mut self, node: NodeId) -> TypeId {
        let Some(n) = self.arena.get(node) else {
            return TypeId::UNKNOWN;
        };
        match &n.data {
            NodeData::Literal(lit) => match lit.value {
                LiteralKind::None => TypeId::NONE,
                // Literal annotations only mean something under `Literal[...]`.
                _ => TypeId::UNKNOWN,
            },
            NodeData::Name(name_expr) => {
                let name = name_expr.name;
                self.annotation_name(node, name)
            }
            NodeData::Binary(b) if b.op == BinaryOp::BitOr => {
                let (left, right) = (b.left, b.right);
                let left = self.evaluate_annotation(left);
                let right = self.evaluate_annotation(right);
                self.db.union2(left, right)
            }
            NodeData::Subscript(s) => {
                let (value, index) = (s.value, s.index);
                self.annotation_subscript(node, value, index)
            }
            NodeData::Error => TypeId::UNKNOWN,
            _ => TypeId::UNKNOWN,
        }
    }

    fn annotation_name(&mut self, node: NodeId, name: Atom) -> TypeId {
        if name == self.db.intern_str("Any") {
            return TypeId::ANY;
        }
        if let Some(ty) = self.lookup_type_param(name) {
            return ty;
        }
        if let Some(sym_id) = self.binder.symbol_for_node(node) {
            self.add_dependency(self.arena.file, sym_id);
            let Some(symbol) = self.binder.symbols.get(sym_id) else {
                return TypeId::UNKNOWN;
            };
            let flags = symbol.flags;
            if flags & symbol_flags::CLASS != 0 {
                let class_ty = self.evaluate_name_as_class(sym_id);
                return self.to_instance(class_ty);
            }
            if flags & symbol_flags::IMPORT != 0 {
                if let Some(decl) = self.globals.get(name).copied() {
                    self.add_dependency(decl.origin_file, decl.origin_symbol);
                    return self.to_instance(decl.ty);
                }
                return TypeId::UNKNOWN;
            }
            if flags & symbol_flags::VARIABLE != 0 {
                // Implicit type alias: an unannotated module-level name whose
                // value is a type expression.
                return self.evaluate_alias_symbol(sym_id);
            }
            return TypeId::UNKNOWN;
        }
        if let Some(decl) = self.globals.get(name).copied() {
            self.add_dependency(decl.origin_file, decl.origin_symbol);
            return self.to_instance(decl.ty);
        }
        if let Some(class_ty) = self.db.builtins.lookup(name) {
            return self.to_instance(class_ty);
        }
        let text = self.db.resolve_atom(name);
        self.error(
            node,
            format!("Name '{text}' is not defined."),
            codes::UNRESOLVED_NAME,
        );
        TypeId::UNKNOWN
    }

    fn evaluate_name_as_class(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        let decl = symbol
            .declarations
            .iter()
            .find(|d| d.kind == sift_binder::DeclarationKind::Class)
            .copied();
        match decl {
            Some(decl) => self.evaluate(decl.node, FlowNodeId::NONE),
            None => TypeId::UNKNOWN,
        }
    }

    /// Evaluate a variable used in type position as an alias of its assigned
    /// value, read as a type expression. The memoized entry for the value
    /// node makes self-reference (`T = list[T] | int`) terminate through the
    /// pending-marker protocol.
    fn evaluate_alias_symbol(&mut self, sym_id: SymbolId) -> TypeId {
        let Some(symbol) = self.binder.symbols.get(sym_id) else {
            return TypeId::UNKNOWN;
        };
        let decl = symbol
            .declarations
            .iter()
            .find(|d| d.kind == sift_binder::DeclarationKind::Variable)
            .copied();
        let Some(decl) = decl else {
            return TypeId::UNKNOWN;
        };
        let Some(assign) = self.arena.assign(decl.node) else {
            return TypeId::UNKNOWN;
        };
        let value = assign.value;
        if value.is_none() {
            return TypeId::UNKNOWN;
        }
        self.evaluate_annotation(value)
    }

    fn annotation_subscript(&mut self, node: NodeId, value: NodeId, index: NodeId) -> TypeId {
        if let Some(name_expr) = self.arena.name(value) {
            let head = name_expr.name;
            if head == self.db.intern_str("Union") {
                let members = self.annotation_arguments(index);
                return self.db.union(members);
            }
            if head == self.db.intern_str("Optional") {
                let inner = self.evaluate_annotation(index);
                return self.db.union2(inner, TypeId::NONE);
            }
            if head == self.db.intern_str("Literal") {
                return self.annotation_literal(index);
            }
            if head == self.db.intern_str("TypeGuard") {
                // In type position a guard is just a bool; the predicate
                // semantics attach at the function definition.
                return self.db.builtins.bool_instance;
            }
        }
        // Specialized class reference: list[int], MyBox[str], ...
        let head_ty = self.db.resolve_recursive(self.head_class_type(value));
        match self.db.lookup(head_ty) {
            Some(TypeKey::Class(shape, _)) => {
                let args = self.annotation_arguments(index);
                self.db.instance(shape, args)
            }
            Some(TypeKey::Union(_)) => {
                // Alias of a union cannot be further specialized here.
                head_ty
            }
            _ => {
                self.error(
                    node,
                    "Expected a class in subscripted annotation.".to_string(),
                    codes::UNRESOLVED_NAME,
                );
                TypeId::UNKNOWN
            }
        }
    }

    /// Resolve the head of a subscripted annotation to a class object.
    fn head_class_type(&mut self, value: NodeId) -> TypeId {
        if let Some(name_expr) = self.arena.name(value) {
            let name = name_expr.name;
            if let Some(sym_id) = self.binder.symbol_for_node(value) {
                self.add_dependency(self.arena.file, sym_id);
                if let Some(symbol) = self.binder.symbols.get(sym_id) {
                    if symbol.flags & symbol_flags::CLASS != 0 {
                        return self.evaluate_name_as_class(sym_id);
                    }
                    if symbol.flags & symbol_flags::VARIABLE != 0 {
                        return self.evaluate_alias_symbol(sym_id);
                    }
                }
                return TypeId::UNKNOWN;
            }
            if let Some(decl) = self.globals.get(name).copied() {
                self.add_dependency(decl.origin_file, decl.origin_symbol);
                return decl.ty;
            }
            if let Some(class_ty) = self.db.builtins.lookup(name) {
                return class_ty;
            }
        }
        TypeId::UNKNOWN
    }

    pub(crate) fn annotation_arguments(&mut self, index: NodeId) -> Vec<TypeId> {
        if let Some(tuple) = self.arena.tuple(index) {
            let elements = tuple.elements.clone();
            elements
                .iter()
                .map(|&e| self.evaluate_annotation(e))
                .collect()
        } else {
            vec![self.evaluate_annotation(index)]
        }
    }

    fn annotation_literal(&mut self, index: NodeId) -> TypeId {
        let nodes: Vec<NodeId> = if let Some(tuple) = self.arena.tuple(index) {
            tuple.elements.clone()
        } else {
            vec![index]
        };
        let mut members = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.arena.literal(node) {
                Some(lit) if !matches!(lit.value, LiteralKind::Float(_) | LiteralKind::None) => {
                    let value = lit.value;
                    members.push(self.literal_type(&value));
                }
                Some(lit) if matches!(lit.value, LiteralKind::None) => {
                    members.push(TypeId::NONE);
                }
                _ => members.push(TypeId::UNKNOWN),
            }
        }
        self.db.union(members)
    }
}
