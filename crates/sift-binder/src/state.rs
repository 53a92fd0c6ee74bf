//! Binder implementation.
//!
//! A single depth-first traversal per file builds three things at once: the
//! persistent scope tree with its symbol tables, the node→symbol and
//! node→flow side tables, and the control-flow graph. A "current flow"
//! cursor is threaded through the walk; each narrowing-relevant event
//! (assignment, branch test, join, loop back edge, call) appends a flow node
//! chained on the cursor.

use crate::flow::{FlowNodeArena, FlowNodeId, flow_flags};
use crate::scopes::{Scope, ScopeId, ScopeKind};
use crate::symbols::{
    Declaration, DeclarationKind, Symbol, SymbolArena, SymbolId, symbol_flags,
};
use rustc_hash::FxHashMap;
use sift_common::Atom;
use sift_syntax::{BoolOpKind, NodeArena, NodeData, NodeId, UnaryOp};
use tracing::trace;

/// Configuration for the binder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinderOptions {
    /// When set, `assert cond` narrows like an `if` whose false branch
    /// raises. Disabled by drivers that treat asserts as stripped.
    pub assert_narrows: bool,
}

impl Default for BinderOptions {
    fn default() -> Self {
        BinderOptions {
            assert_narrows: true,
        }
    }
}

pub struct BinderState {
    pub options: BinderOptions,
    /// Arena for symbol storage.
    pub symbols: SymbolArena,
    /// Persistent scopes; index 0 is the module scope after binding.
    pub scopes: Vec<Scope>,
    /// Map from scope-introducing node to its scope.
    pub node_scope_ids: FxHashMap<u32, ScopeId>,
    current_scope_id: ScopeId,
    /// Flow nodes for control flow analysis.
    pub flow_nodes: FlowNodeArena,
    /// Current flow cursor.
    current_flow: FlowNodeId,
    /// Shared node representing unreachable code.
    pub unreachable_flow: FlowNodeId,
    /// Node-to-symbol mapping for references and declaring nodes.
    pub node_symbols: FxHashMap<u32, SymbolId>,
    /// Flow node active at each bound node; consulted by the evaluator when
    /// narrowing a reference and by the checker for reachability.
    pub node_flow: FxHashMap<u32, FlowNodeId>,
    pub module_scope: ScopeId,
    break_targets: Vec<FlowNodeId>,
    continue_targets: Vec<FlowNodeId>,
    /// Innermost handler entry labels for active `try` blocks.
    exception_targets: Vec<FlowNodeId>,
}

impl BinderState {
    pub fn new() -> Self {
        Self::with_options(BinderOptions::default())
    }

    pub fn with_options(options: BinderOptions) -> Self {
        let mut flow_nodes = FlowNodeArena::new();
        let unreachable_flow = flow_nodes.alloc(flow_flags::UNREACHABLE);
        BinderState {
            options,
            symbols: SymbolArena::new(),
            scopes: Vec::new(),
            node_scope_ids: FxHashMap::default(),
            current_scope_id: ScopeId::NONE,
            flow_nodes,
            current_flow: FlowNodeId::NONE,
            unreachable_flow,
            node_symbols: FxHashMap::default(),
            node_flow: FxHashMap::default(),
            module_scope: ScopeId::NONE,
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            exception_targets: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
        self.scopes.clear();
        self.node_scope_ids.clear();
        self.current_scope_id = ScopeId::NONE;
        self.flow_nodes.clear();
        self.unreachable_flow = self.flow_nodes.alloc(flow_flags::UNREACHABLE);
        self.current_flow = FlowNodeId::NONE;
        self.node_symbols.clear();
        self.node_flow.clear();
        self.module_scope = ScopeId::NONE;
        self.break_targets.clear();
        self.continue_targets.clear();
        self.exception_targets.clear();
    }

    /// Bind one file. `root` must be a module node of `arena`.
    pub fn bind_module(&mut self, arena: &NodeArena, root: NodeId) {
        let module_scope = self.enter_scope(ScopeKind::Module, root);
        self.module_scope = module_scope;

        let start = self.flow_nodes.alloc(flow_flags::START);
        self.current_flow = start;

        let body = match arena.module(root) {
            Some(module) => module.body.clone(),
            // Not a module node; recover with an empty body.
            None => Vec::new(),
        };

        self.collect_declarations(arena, &body);
        for &stmt in &body {
            self.bind_statement(arena, stmt);
        }

        self.exit_scope();
        trace!(
            flow_nodes = self.flow_nodes.len(),
            symbols = self.symbols.len(),
            "module bound"
        );
    }

    // ===== Scopes and symbols =====

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        if id.is_none() {
            return None;
        }
        self.scopes.get(id.0 as usize)
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope_id
    }

    fn enter_scope(&mut self, kind: ScopeKind, node: NodeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, self.current_scope_id, node));
        self.node_scope_ids.insert(node.0, id);
        self.current_scope_id = id;
        id
    }

    fn exit_scope(&mut self) {
        let parent = self
            .scope(self.current_scope_id)
            .map(|s| s.parent)
            .unwrap_or(ScopeId::NONE);
        self.current_scope_id = parent;
    }

    /// Resolve a name from `scope` outward. Class scopes are only consulted
    /// when they are the starting scope; nested functions do not see their
    /// enclosing class body names.
    pub fn lookup_name(&self, scope: ScopeId, name: Atom) -> Option<SymbolId> {
        let mut current = scope;
        let mut first = true;
        while let Some(s) = self.scope(current) {
            if (first || s.kind != ScopeKind::Class)
                && let Some(id) = s.table.get(name)
            {
                return Some(id);
            }
            first = false;
            current = s.parent;
        }
        None
    }

    fn declare(
        &mut self,
        name: Atom,
        node: NodeId,
        annotation: NodeId,
        kind: DeclarationKind,
        flags: u32,
    ) -> SymbolId {
        let declaration = Declaration {
            node,
            annotation,
            kind,
        };
        let scope_id = self.current_scope_id;
        let existing = self
            .scope(scope_id)
            .and_then(|s| s.table.get(name));
        let sym_id = match existing {
            Some(sym_id) => {
                if let Some(symbol) = self.symbols.get_mut(sym_id) {
                    symbol.flags |= flags;
                    symbol.declarations.push(declaration);
                }
                sym_id
            }
            None => {
                let sym_id = self.symbols.alloc(Symbol {
                    name,
                    flags,
                    scope: scope_id,
                    declarations: vec![declaration],
                });
                if let Some(scope) = self.scopes.get_mut(scope_id.0 as usize) {
                    scope.table.set(name, sym_id);
                }
                sym_id
            }
        };
        self.node_symbols.insert(node.0, sym_id);
        sym_id
    }

    /// Placeholder for a declaration position occupied by an error node.
    fn declare_placeholder(&mut self, arena: &NodeArena, node: NodeId) -> SymbolId {
        let name = arena.interner.intern("<error>");
        self.declare(
            name,
            node,
            NodeId::NONE,
            DeclarationKind::Placeholder,
            symbol_flags::UNKNOWN,
        )
    }

    /// Pre-declare every name assigned anywhere in this scope so references
    /// that textually precede their assignment still resolve. Nested
    /// function and class bodies get their own pass when their scope is
    /// entered; only their names are declared here.
    fn collect_declarations(&mut self, arena: &NodeArena, stmts: &[NodeId]) {
        for &stmt in stmts {
            let Some(node) = arena.get(stmt) else { continue };
            match &node.data {
                NodeData::Assign(a) => {
                    self.collect_target_declarations(arena, a.target, a.annotation, stmt);
                }
                NodeData::FunctionDef(f) => {
                    self.declare(
                        f.name,
                        stmt,
                        NodeId::NONE,
                        DeclarationKind::Function,
                        symbol_flags::FUNCTION,
                    );
                }
                NodeData::ClassDef(c) => {
                    self.declare(
                        c.name,
                        stmt,
                        NodeId::NONE,
                        DeclarationKind::Class,
                        symbol_flags::CLASS,
                    );
                }
                NodeData::For(f) => {
                    self.collect_loop_target_declarations(arena, f.target, stmt);
                    self.collect_declarations(arena, &f.body);
                }
                NodeData::Import(import) => {
                    for imported in &import.names {
                        let bound = imported.alias.unwrap_or(imported.name);
                        self.declare(
                            bound,
                            stmt,
                            NodeId::NONE,
                            DeclarationKind::ImportAlias,
                            symbol_flags::IMPORT,
                        );
                    }
                }
                NodeData::If(i) => {
                    self.collect_declarations(arena, &i.body);
                    self.collect_declarations(arena, &i.orelse);
                }
                NodeData::While(w) => {
                    self.collect_declarations(arena, &w.body);
                }
                NodeData::Try(t) => {
                    self.collect_declarations(arena, &t.body);
                    for &handler in &t.handlers {
                        if let Some(h) = arena.except_handler(handler) {
                            let (h_name, h_exc, h_body) =
                                (h.name, h.exc_type, h.body.clone());
                            if let Some(name) = h_name {
                                self.declare(
                                    name,
                                    handler,
                                    h_exc,
                                    DeclarationKind::ExceptBinding,
                                    symbol_flags::VARIABLE,
                                );
                            }
                            self.collect_declarations(arena, &h_body);
                        }
                    }
                    self.collect_declarations(arena, &t.orelse);
                    self.collect_declarations(arena, &t.finalbody);
                }
                _ => {}
            }
        }
    }

    /// Declarations reference the assignment statement, not the target
    /// name, so the evaluator can reach the assigned value through them.
    fn collect_target_declarations(
        &mut self,
        arena: &NodeArena,
        target: NodeId,
        annotation: NodeId,
        stmt: NodeId,
    ) {
        let Some(node) = arena.get(target) else { return };
        match &node.data {
            NodeData::Name(name) => {
                self.declare(
                    name.name,
                    stmt,
                    annotation,
                    DeclarationKind::Variable,
                    symbol_flags::VARIABLE,
                );
            }
            NodeData::Tuple(tuple) => {
                for &element in &tuple.elements.clone() {
                    // Annotations never distribute over tuple targets.
                    self.collect_target_declarations(arena, element, NodeId::NONE, stmt);
                }
            }
            NodeData::Error => {
                self.declare_placeholder(arena, target);
            }
            // Attribute/subscript targets do not declare names.
            _ => {}
        }
    }

    fn collect_loop_target_declarations(
        &mut self,
        arena: &NodeArena,
        target: NodeId,
        loop_stmt: NodeId,
    ) {
        let Some(node) = arena.get(target) else { return };
        match &node.data {
            NodeData::Name(name) => {
                self.declare(
                    name.name,
                    loop_stmt,
                    NodeId::NONE,
                    DeclarationKind::LoopTarget,
                    symbol_flags::VARIABLE,
                );
            }
            NodeData::Tuple(tuple) => {
                for &element in &tuple.elements.clone() {
                    self.collect_loop_target_declarations(arena, element, loop_stmt);
                }
            }
            NodeData::Error => {
                self.declare_placeholder(arena, target);
            }
            _ => {}
        }
    }

    // ===== Flow node creation =====

    fn new_flow(&mut self, flags: u32, node: NodeId, antecedent: FlowNodeId) -> FlowNodeId {
        let id = self.flow_nodes.alloc_with_node(flags, node);
        self.flow_nodes.add_antecedent(id, antecedent);
        id
    }

    pub fn create_branch_label(&mut self) -> FlowNodeId {
        self.flow_nodes.alloc(flow_flags::BRANCH_LABEL)
    }

    pub fn create_loop_label(&mut self) -> FlowNodeId {
        self.flow_nodes.alloc(flow_flags::LOOP_LABEL)
    }

    pub fn add_antecedent(&mut self, label: FlowNodeId, antecedent: FlowNodeId) {
        if antecedent == self.unreachable_flow {
            return;
        }
        self.flow_nodes.add_antecedent(label, antecedent);
    }

    fn create_flow_condition(
        &mut self,
        flags: u32,
        antecedent: FlowNodeId,
        test: NodeId,
    ) -> FlowNodeId {
        if antecedent == self.unreachable_flow {
            return self.unreachable_flow;
        }
        self.new_flow(flags, test, antecedent)
    }

    fn create_flow_assignment(&mut self, node: NodeId) {
        let flow = self.new_flow(flow_flags::ASSIGNMENT, node, self.current_flow);
        self.current_flow = flow;
    }

    fn create_flow_call(&mut self, call: NodeId) {
        let flow = self.new_flow(flow_flags::POST_CALL, call, self.current_flow);
        // The same node doubles as the exception-resume edge into the
        // innermost handler.
        if let Some(&handler) = self.exception_targets.last() {
            self.add_antecedent(handler, flow);
        }
        self.current_flow = flow;
    }

    /// Build the condition stream for one side of a branch. `and`/`or` tests
    /// are decomposed so each conjunct narrows independently; `not` flips
    /// the branch sense.
    fn bind_condition(
        &mut self,
        arena: &NodeArena,
        test: NodeId,
        sense: bool,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        let Some(node) = arena.get(test) else {
            return antecedent;
        };
        match &node.data {
            NodeData::Unary(u) if u.op == UnaryOp::Not => {
                let operand = u.operand;
                self.bind_condition(arena, operand, !sense, antecedent)
            }
            NodeData::BoolOp(b)
                if (b.op == BoolOpKind::And && sense)
                    || (b.op == BoolOpKind::Or && !sense) =>
            {
                let values = b.values.clone();
                let mut flow = antecedent;
                for value in values {
                    flow = self.bind_condition(arena, value, sense, flow);
                }
                flow
            }
            _ => {
                let flags = if sense {
                    flow_flags::TRUE_CONDITION
                } else {
                    flow_flags::FALSE_CONDITION
                };
                self.create_flow_condition(flags, antecedent, test)
            }
        }
    }

    // ===== Statement binding =====

    fn bind_statement(&mut self, arena: &NodeArena, stmt: NodeId) {
        self.node_flow.insert(stmt.0, self.current_flow);
        let Some(node) = arena.get(stmt) else { return };
        match &node.data {
            NodeData::Assign(a) => {
                let a = a.clone();
                if !a.value.is_none() {
                    self.bind_expression(arena, a.value);
                }
                if !a.annotation.is_none() {
                    self.bind_type_expression(arena, a.annotation);
                }
                // An annotation-only declaration assigns nothing; it must
                // not produce an assignment flow node.
                self.bind_assignment_target(arena, a.target, stmt, !a.value.is_none());
            }
            NodeData::ExprStmt(e) => {
                let value = e.value;
                self.bind_expression(arena, value);
            }
            NodeData::FunctionDef(_) => {
                self.bind_function_def(arena, stmt);
            }
            NodeData::ClassDef(_) => {
                self.bind_class_def(arena, stmt);
            }
            NodeData::If(_) => {
                self.bind_if_statement(arena, stmt);
            }
            NodeData::While(_) => {
                self.bind_while_statement(arena, stmt);
            }
            NodeData::For(_) => {
                self.bind_for_statement(arena, stmt);
            }
            NodeData::Try(_) => {
                self.bind_try_statement(arena, stmt);
            }
            NodeData::Assert(a) => {
                let test = a.test;
                let msg = a.msg;
                self.bind_expression(arena, test);
                if !msg.is_none() {
                    self.bind_expression(arena, msg);
                }
                if self.options.assert_narrows {
                    // The false branch raises; only the true stream survives.
                    self.current_flow =
                        self.bind_condition(arena, test, true, self.current_flow);
                }
            }
            NodeData::Return(r) => {
                let value = r.value;
                if !value.is_none() {
                    self.bind_expression(arena, value);
                }
                self.current_flow = self.unreachable_flow;
            }
            NodeData::Raise(r) => {
                let value = r.value;
                if !value.is_none() {
                    self.bind_expression(arena, value);
                }
                if let Some(&handler) = self.exception_targets.last() {
                    let pre_raise = self.current_flow;
                    self.add_antecedent(handler, pre_raise);
                }
                self.current_flow = self.unreachable_flow;
            }
            NodeData::Break => {
                if let Some(&target) = self.break_targets.last() {
                    let flow = self.current_flow;
                    self.add_antecedent(target, flow);
                }
                self.current_flow = self.unreachable_flow;
            }
            NodeData::Continue => {
                if let Some(&target) = self.continue_targets.last() {
                    let flow = self.current_flow;
                    self.add_antecedent(target, flow);
                }
                self.current_flow = self.unreachable_flow;
            }
            NodeData::Import(_) | NodeData::Pass => {}
            NodeData::Error => {
                // Recovered syntax gap; keep the cursor and continue.
            }
            _ => {
                // Expression node in statement position (malformed tree).
                self.bind_expression(arena, stmt);
            }
        }
    }

    fn bind_assignment_target(
        &mut self,
        arena: &NodeArena,
        target: NodeId,
        assign_stmt: NodeId,
        has_value: bool,
    ) {
        let Some(node) = arena.get(target) else { return };
        match &node.data {
            NodeData::Name(name) => {
                let name = name.name;
                let sym = self
                    .lookup_name(self.current_scope_id, name)
                    .unwrap_or_else(|| {
                        // Target missed by the pre-pass (malformed nesting);
                        // declare on the spot.
                        self.declare(
                            name,
                            assign_stmt,
                            NodeId::NONE,
                            DeclarationKind::Variable,
                            symbol_flags::VARIABLE,
                        )
                    });
                self.node_symbols.insert(target.0, sym);
                self.node_flow.insert(target.0, self.current_flow);
                if has_value {
                    self.create_flow_assignment(assign_stmt);
                }
            }
            NodeData::Tuple(tuple) => {
                for &element in &tuple.elements.clone() {
                    self.bind_assignment_target(arena, element, assign_stmt, has_value);
                }
            }
            NodeData::Attribute(a) => {
                let value = a.value;
                self.bind_expression(arena, value);
                self.node_flow.insert(target.0, self.current_flow);
                if has_value {
                    self.create_flow_assignment(assign_stmt);
                }
            }
            NodeData::Subscript(s) => {
                let (value, index) = (s.value, s.index);
                self.bind_expression(arena, value);
                self.bind_expression(arena, index);
                if has_value {
                    self.create_flow_assignment(assign_stmt);
                }
            }
            NodeData::Error => {
                self.declare_placeholder(arena, target);
            }
            _ => {}
        }
    }

    fn bind_function_def(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(def) = arena.function_def(stmt) else { return };
        let def = def.clone();

        for &param in &def.params {
            if let Some(p) = arena.param(param)
                && !p.annotation.is_none()
            {
                let annotation = p.annotation;
                self.bind_type_expression(arena, annotation);
            }
        }
        if !def.return_annotation.is_none() {
            self.bind_type_expression(arena, def.return_annotation);
        }

        // The body runs at some later time under its own flow; narrowing
        // never crosses the closure boundary.
        let saved_flow = self.current_flow;
        let saved_breaks = std::mem::take(&mut self.break_targets);
        let saved_continues = std::mem::take(&mut self.continue_targets);
        let saved_exceptions = std::mem::take(&mut self.exception_targets);

        self.enter_scope(ScopeKind::Function, stmt);
        let start = self.flow_nodes.alloc(flow_flags::START);
        self.current_flow = start;

        for &param in &def.params {
            if let Some(p) = arena.param(param) {
                let (p_name, p_ann, p_default) = (p.name, p.annotation, p.default);
                if !p_default.is_none() {
                    self.bind_expression(arena, p_default);
                }
                self.declare(
                    p_name,
                    param,
                    p_ann,
                    DeclarationKind::Parameter,
                    symbol_flags::PARAMETER,
                );
            }
        }

        self.collect_declarations(arena, &def.body);
        for &body_stmt in &def.body {
            self.bind_statement(arena, body_stmt);
        }

        self.exit_scope();
        self.current_flow = saved_flow;
        self.break_targets = saved_breaks;
        self.continue_targets = saved_continues;
        self.exception_targets = saved_exceptions;
    }

    fn bind_class_def(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(def) = arena.class_def(stmt) else { return };
        let def = def.clone();

        for &base in &def.bases {
            self.bind_type_expression(arena, base);
        }

        self.enter_scope(ScopeKind::Class, stmt);
        // Class bodies execute inline at definition time, so the flow cursor
        // runs straight through them.
        self.collect_declarations(arena, &def.body);
        for &body_stmt in &def.body {
            self.bind_statement(arena, body_stmt);
        }
        self.exit_scope();
    }

    fn bind_if_statement(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(if_stmt) = arena.if_stmt(stmt) else { return };
        let if_stmt = if_stmt.clone();

        self.bind_expression(arena, if_stmt.test);
        let pre_condition_flow = self.current_flow;

        let true_flow = self.bind_condition(arena, if_stmt.test, true, pre_condition_flow);
        self.current_flow = true_flow;
        for &body_stmt in &if_stmt.body {
            self.bind_statement(arena, body_stmt);
        }
        let after_then_flow = self.current_flow;

        let false_flow = self.bind_condition(arena, if_stmt.test, false, pre_condition_flow);
        self.current_flow = false_flow;
        for &else_stmt in &if_stmt.orelse {
            self.bind_statement(arena, else_stmt);
        }
        let after_else_flow = self.current_flow;

        let merge_label = self.create_branch_label();
        self.add_antecedent(merge_label, after_then_flow);
        self.add_antecedent(merge_label, after_else_flow);
        self.current_flow = merge_label;
    }

    fn bind_while_statement(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(while_stmt) = arena.while_stmt(stmt) else { return };
        let while_stmt = while_stmt.clone();

        let pre_loop_flow = self.current_flow;
        let loop_label = self.create_loop_label();
        self.add_antecedent(loop_label, pre_loop_flow);
        self.current_flow = loop_label;

        self.bind_expression(arena, while_stmt.test);
        let pre_condition_flow = self.current_flow;

        let exit_label = self.create_branch_label();
        self.break_targets.push(exit_label);
        self.continue_targets.push(loop_label);

        let true_flow = self.bind_condition(arena, while_stmt.test, true, pre_condition_flow);
        self.current_flow = true_flow;
        for &body_stmt in &while_stmt.body {
            self.bind_statement(arena, body_stmt);
        }
        let back_edge = self.current_flow;
        self.add_antecedent(loop_label, back_edge);

        self.break_targets.pop();
        self.continue_targets.pop();

        let false_flow = self.bind_condition(arena, while_stmt.test, false, pre_condition_flow);
        self.add_antecedent(exit_label, false_flow);
        self.current_flow = exit_label;
    }

    fn bind_for_statement(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(for_stmt) = arena.for_stmt(stmt) else { return };
        let for_stmt = for_stmt.clone();

        self.bind_expression(arena, for_stmt.iter);

        let pre_loop_flow = self.current_flow;
        let loop_label = self.create_loop_label();
        self.add_antecedent(loop_label, pre_loop_flow);
        self.current_flow = loop_label;

        self.bind_assignment_target(arena, for_stmt.target, stmt, true);

        let exit_label = self.create_branch_label();
        self.break_targets.push(exit_label);
        self.continue_targets.push(loop_label);

        for &body_stmt in &for_stmt.body {
            self.bind_statement(arena, body_stmt);
        }
        let back_edge = self.current_flow;
        self.add_antecedent(loop_label, back_edge);

        self.break_targets.pop();
        self.continue_targets.pop();

        // The loop exhausts at its head.
        self.add_antecedent(exit_label, loop_label);
        self.current_flow = exit_label;
    }

    fn bind_try_statement(&mut self, arena: &NodeArena, stmt: NodeId) {
        let Some(try_stmt) = arena.try_stmt(stmt) else { return };
        let try_stmt = try_stmt.clone();

        let pre_try_flow = self.current_flow;
        let handler_entry = if try_stmt.handlers.is_empty() {
            None
        } else {
            let label = self.create_branch_label();
            // An exception can surface before the first statement runs.
            self.add_antecedent(label, pre_try_flow);
            Some(label)
        };

        if let Some(label) = handler_entry {
            self.exception_targets.push(label);
        }
        for &body_stmt in &try_stmt.body {
            self.bind_statement(arena, body_stmt);
        }
        if handler_entry.is_some() {
            self.exception_targets.pop();
        }

        for &else_stmt in &try_stmt.orelse {
            self.bind_statement(arena, else_stmt);
        }
        let after_body_flow = self.current_flow;

        let merge_label = self.create_branch_label();
        self.add_antecedent(merge_label, after_body_flow);

        for &handler in &try_stmt.handlers {
            let Some(h) = arena.except_handler(handler) else {
                continue;
            };
            let h = h.clone();
            self.current_flow = handler_entry.unwrap_or(pre_try_flow);
            if !h.exc_type.is_none() {
                self.bind_type_expression(arena, h.exc_type);
            }
            if h.name.is_some() {
                // The binding was pre-declared; the handler entry is its
                // assignment point.
                self.node_flow.insert(handler.0, self.current_flow);
                self.create_flow_assignment(handler);
            }
            for &handler_stmt in &h.body {
                self.bind_statement(arena, handler_stmt);
            }
            let handler_end = self.current_flow;
            self.add_antecedent(merge_label, handler_end);
        }

        self.current_flow = merge_label;
        for &final_stmt in &try_stmt.finalbody {
            self.bind_statement(arena, final_stmt);
        }
    }

    // ===== Expression binding =====

    pub fn bind_expression(&mut self, arena: &NodeArena, expr: NodeId) {
        if expr.is_none() {
            return;
        }
        self.node_flow.insert(expr.0, self.current_flow);
        let Some(node) = arena.get(expr) else { return };
        match &node.data {
            NodeData::Name(name) => {
                let name = name.name;
                if let Some(sym) = self.lookup_name(self.current_scope_id, name) {
                    self.node_symbols.insert(expr.0, sym);
                }
            }
            NodeData::Literal(_) | NodeData::Error => {}
            NodeData::Call(call) => {
                let call = call.clone();
                self.bind_expression(arena, call.callee);
                for &arg in &call.args {
                    self.bind_expression(arena, arg);
                }
                self.create_flow_call(expr);
                // The reference flow recorded above predates the call node;
                // refresh it so narrowing for the whole call expression sees
                // the post-call state.
                self.node_flow.insert(expr.0, self.current_flow);
            }
            NodeData::Attribute(a) => {
                let value = a.value;
                self.bind_expression(arena, value);
                self.node_flow.insert(expr.0, self.current_flow);
            }
            NodeData::Subscript(s) => {
                let (value, index) = (s.value, s.index);
                self.bind_expression(arena, value);
                self.bind_expression(arena, index);
            }
            NodeData::Tuple(t) => {
                for &element in &t.elements.clone() {
                    self.bind_expression(arena, element);
                }
            }
            NodeData::List(l) => {
                for &element in &l.elements.clone() {
                    self.bind_expression(arena, element);
                }
            }
            NodeData::Compare(c) => {
                let (left, right) = (c.left, c.right);
                self.bind_expression(arena, left);
                self.bind_expression(arena, right);
            }
            NodeData::BoolOp(b) => {
                for &value in &b.values.clone() {
                    self.bind_expression(arena, value);
                }
            }
            NodeData::Unary(u) => {
                let operand = u.operand;
                self.bind_expression(arena, operand);
            }
            NodeData::Binary(b) => {
                let (left, right) = (b.left, b.right);
                self.bind_expression(arena, left);
                self.bind_expression(arena, right);
            }
            NodeData::Lambda(l) => {
                let l = l.clone();
                let saved_flow = self.current_flow;
                self.enter_scope(ScopeKind::Lambda, expr);
                let start = self.flow_nodes.alloc(flow_flags::START);
                self.current_flow = start;
                for &param in &l.params {
                    if let Some(p) = arena.param(param) {
                        let (p_name, p_ann) = (p.name, p.annotation);
                        self.declare(
                            p_name,
                            param,
                            p_ann,
                            DeclarationKind::Parameter,
                            symbol_flags::PARAMETER,
                        );
                    }
                }
                self.bind_expression(arena, l.body);
                self.exit_scope();
                self.current_flow = saved_flow;
            }
            NodeData::ListComp(comp) => {
                let comp = comp.clone();
                self.bind_expression(arena, comp.iter);
                let saved_flow = self.current_flow;
                self.enter_scope(ScopeKind::Comprehension, expr);
                if let Some(target) = arena.name(comp.target) {
                    let name = target.name;
                    let sym = self.declare(
                        name,
                        expr,
                        NodeId::NONE,
                        DeclarationKind::ComprehensionTarget,
                        symbol_flags::VARIABLE,
                    );
                    self.node_symbols.insert(comp.target.0, sym);
                }
                self.create_flow_assignment(expr);
                if !comp.condition.is_none() {
                    self.bind_expression(arena, comp.condition);
                    self.current_flow =
                        self.bind_condition(arena, comp.condition, true, self.current_flow);
                }
                self.bind_expression(arena, comp.element);
                self.exit_scope();
                self.current_flow = saved_flow;
            }
            _ => {}
        }
    }

    /// Bind the names inside a type annotation. Annotations are ordinary
    /// expressions but evaluate in a type context; they resolve names and
    /// never disturb the flow graph.
    fn bind_type_expression(&mut self, arena: &NodeArena, expr: NodeId) {
        if expr.is_none() {
            return;
        }
        self.node_flow.insert(expr.0, self.current_flow);
        let Some(node) = arena.get(expr) else { return };
        match &node.data {
            NodeData::Name(name) => {
                let name = name.name;
                if let Some(sym) = self.lookup_name(self.current_scope_id, name) {
                    self.node_symbols.insert(expr.0, sym);
                }
            }
            NodeData::Attribute(a) => {
                let value = a.value;
                self.bind_type_expression(arena, value);
            }
            NodeData::Subscript(s) => {
                let (value, index) = (s.value, s.index);
                self.bind_type_expression(arena, value);
                self.bind_type_expression(arena, index);
            }
            NodeData::Tuple(t) => {
                for &element in &t.elements.clone() {
                    self.bind_type_expression(arena, element);
                }
            }
            NodeData::Binary(b) => {
                let (left, right) = (b.left, b.right);
                self.bind_type_expression(arena, left);
                self.bind_type_expression(arena, right);
            }
            _ => {}
        }
    }

    // ===== Queries =====

    pub fn flow_at(&self, node: NodeId) -> FlowNodeId {
        self.node_flow
            .get(&node.0)
            .copied()
            .unwrap_or(FlowNodeId::NONE)
    }

    pub fn symbol_for_node(&self, node: NodeId) -> Option<SymbolId> {
        self.node_symbols.get(&node.0).copied()
    }
}

impl Default for BinderState {
    fn default() -> Self {
        BinderState::new()
    }
}
