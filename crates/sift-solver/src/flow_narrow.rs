//! Flow-sensitive narrowing: the backward walk.
//!
//! `narrow(reference, flow, assumed)` walks antecedent edges from a use
//! site toward the start node:
//!
//! - a condition node whose test matches the reference applies the guard
//!   selected by the test's shape, with the edge's branch polarity;
//! - a label unions the narrowed results of its reachable antecedents and
//!   canonicalizes, so the result is independent of visitation order;
//! - an assignment of the same reference stops the walk with the assigned
//!   value's type;
//! - loop back edges are cut by a per-call visited set: a revisited node
//!   answers with the assumed type as the fixed-point approximation;
//! - reaching the start returns the assumed type unchanged.

use crate::evaluate::TypeEvaluator;
use crate::narrow::{TypeGuard, apply_guard};
use crate::relate::is_assignable;
use crate::types::{TypeId, TypeKey};
use rustc_hash::FxHashSet;
use sift_binder::{FlowNodeId, flow_flags};
use sift_common::limits;
use sift_syntax::{CompareOp, NodeData, NodeId, UnaryOp};

/// What an assignment flow node means for the walked reference.
enum AssignmentEffect {
    /// Unrelated target; keep walking.
    NotMatching,
    /// Same reference; the walk stops with this type.
    Assigned(TypeId),
    /// A prefix of the reference was reassigned (`x = ...` under a walk for
    /// `x.y`); earlier narrowing no longer applies.
    Invalidated,
}

impl<'a> TypeEvaluator<'a> {
    /// Narrow `reference` at `flow`, starting from `assumed`.
    pub fn narrow(&mut self, reference: NodeId, flow: FlowNodeId, assumed: TypeId) -> TypeId {
        let mut visited = FxHashSet::default();
        let mut steps = 0u32;
        self.narrow_walk(reference, flow, assumed, &mut visited, &mut steps)
    }

    fn narrow_walk(
        &mut self,
        reference: NodeId,
        mut flow: FlowNodeId,
        assumed: TypeId,
        visited: &mut FxHashSet<FlowNodeId>,
        steps: &mut u32,
    ) -> TypeId {
        loop {
            *steps += 1;
            if *steps > limits::MAX_FLOW_WALK_STEPS {
                return assumed;
            }
            if flow.is_none() {
                return assumed;
            }
            if !visited.insert(flow) {
                // Loop back edge: answer with the unnarrowed type.
                return assumed;
            }
            let Some(node) = self.binder.flow_nodes.get(flow) else {
                return assumed;
            };
            let flags = node.flags;
            let event_node = node.node;
            let antecedents: Vec<FlowNodeId> = node.antecedents.iter().copied().collect();

            if flags & flow_flags::START != 0 {
                return assumed;
            }
            if flags & flow_flags::UNREACHABLE != 0 {
                return TypeId::NEVER;
            }
            if flags & flow_flags::ASSIGNMENT != 0 {
                match self.assignment_effect(reference, event_node) {
                    AssignmentEffect::Assigned(ty) => return ty,
                    AssignmentEffect::Invalidated => return assumed,
                    AssignmentEffect::NotMatching => {
                        flow = antecedents.first().copied().unwrap_or(FlowNodeId::NONE);
                        continue;
                    }
                }
            }
            if flags & flow_flags::CONDITION != 0 {
                let antecedent = antecedents.first().copied().unwrap_or(FlowNodeId::NONE);
                let incoming = self.narrow_walk(reference, antecedent, assumed, visited, steps);
                if let Some((guard, invert)) = self.guard_for_test(event_node, reference) {
                    let positive = (flags & flow_flags::TRUE_CONDITION != 0) != invert;
                    return apply_guard(self.db, &guard, incoming, positive);
                }
                return incoming;
            }
            if flags & flow_flags::LABEL != 0 {
                let mut results = Vec::with_capacity(antecedents.len());
                for antecedent in antecedents {
                    if self.binder.flow_nodes.is_unreachable(antecedent) {
                        continue;
                    }
                    // Each antecedent branch narrows independently; the
                    // shared prefix above the join is revisited per branch.
                    let mut branch_visited = visited.clone();
                    results.push(self.narrow_walk(
                        reference,
                        antecedent,
                        assumed,
                        &mut branch_visited,
                        steps,
                    ));
                }
                if results.is_empty() {
                    return TypeId::NEVER;
                }
                return self.db.union(results);
            }
            if flags & flow_flags::POST_CALL != 0 {
                flow = antecedents.first().copied().unwrap_or(FlowNodeId::NONE);
                continue;
            }
            return assumed;
        }
    }

    // ===== Assignments =====

    fn assignment_effect(&mut self, reference: NodeId, event_node: NodeId) -> AssignmentEffect {
        let Some(node) = self.arena.get(event_node) else {
            return AssignmentEffect::NotMatching;
        };
        match &node.data {
            NodeData::Assign(assign) => {
                let (target, value, annotation) = (assign.target, assign.value, assign.annotation);
                if value.is_none() {
                    return AssignmentEffect::NotMatching;
                }
                self.target_effect(target, reference, value, annotation)
            }
            NodeData::For(for_stmt) => {
                let (target, iter) = (for_stmt.target, for_stmt.iter);
                match self.match_target(target, reference) {
                    TargetMatch::Same => {
                        let iter_flow = self.binder.flow_at(iter);
                        let iter_ty = self.evaluate(iter, iter_flow);
                        AssignmentEffect::Assigned(self.iterated_element_type(iter_ty))
                    }
                    TargetMatch::Prefix => AssignmentEffect::Invalidated,
                    TargetMatch::None => AssignmentEffect::NotMatching,
                }
            }
            NodeData::ExceptHandler(handler) => {
                let handler_sym = self.binder.symbol_for_node(event_node);
                let reference_sym = self.binder.symbol_for_node(reference);
                if handler_sym.is_some() && handler_sym == reference_sym {
                    let ty = if handler.exc_type.is_none() {
                        self.db.builtins.base_exception_instance
                    } else {
                        let exc_type = handler.exc_type;
                        self.evaluate_annotation(exc_type)
                    };
                    AssignmentEffect::Assigned(ty)
                } else {
                    AssignmentEffect::NotMatching
                }
            }
            NodeData::ListComp(comp) => {
                let (target, iter) = (comp.target, comp.iter);
                match self.match_target(target, reference) {
                    TargetMatch::Same => {
                        let iter_flow = self.binder.flow_at(iter);
                        let iter_ty = self.evaluate(iter, iter_flow);
                        AssignmentEffect::Assigned(self.iterated_element_type(iter_ty))
                    }
                    _ => AssignmentEffect::NotMatching,
                }
            }
            _ => AssignmentEffect::NotMatching,
        }
    }

    fn target_effect(
        &mut self,
        target: NodeId,
        reference: NodeId,
        value: NodeId,
        annotation: NodeId,
    ) -> AssignmentEffect {
        match self.match_target(target, reference) {
            TargetMatch::Same => {
                let ty = self.assigned_value_type(target, value, annotation);
                AssignmentEffect::Assigned(ty)
            }
            TargetMatch::Prefix => AssignmentEffect::Invalidated,
            TargetMatch::None => {
                // Tuple targets: any element may be the reference.
                if let Some(tuple) = self.arena.tuple(target) {
                    for &element in &tuple.elements.clone() {
                        match self.match_target(element, reference) {
                            TargetMatch::Same => {
                                // Element-wise destructuring is untracked.
                                return AssignmentEffect::Assigned(TypeId::UNKNOWN);
                            }
                            TargetMatch::Prefix => return AssignmentEffect::Invalidated,
                            TargetMatch::None => {}
                        }
                    }
                }
                AssignmentEffect::NotMatching
            }
        }
    }

    fn assigned_value_type(&mut self, target: NodeId, value: NodeId, annotation: NodeId) -> TypeId {
        let value_flow = self.binder.flow_at(value);
        let value_ty = self.evaluate(value, value_flow);
        // Declared discipline: on mismatch, evaluation proceeds with the
        // declared type (the checker owns the diagnostic).
        let declared = if annotation.is_none() {
            self.binder
                .symbol_for_node(target)
                .map(|sym| self.assumed_reference_type(sym))
                .filter(|&ty| ty != TypeId::UNBOUND && ty != TypeId::UNKNOWN)
        } else {
            Some(self.evaluate_annotation(annotation))
        };
        if let Some(declared) = declared
            && !is_assignable(self.db, value_ty, declared)
        {
            return declared;
        }
        value_ty
    }

    // ===== Reference matching =====

    pub(crate) fn is_matching_reference(&self, a: NodeId, b: NodeId) -> bool {
        let (Some(a_node), Some(b_node)) = (self.arena.get(a), self.arena.get(b)) else {
            return false;
        };
        match (&a_node.data, &b_node.data) {
            (NodeData::Name(a_name), NodeData::Name(b_name)) => {
                match (
                    self.binder.symbol_for_node(a),
                    self.binder.symbol_for_node(b),
                ) {
                    (Some(a_sym), Some(b_sym)) => a_sym == b_sym,
                    _ => a_name.name == b_name.name,
                }
            }
            (NodeData::Attribute(a_attr), NodeData::Attribute(b_attr)) => {
                a_attr.attr == b_attr.attr
                    && self.is_matching_reference(a_attr.value, b_attr.value)
            }
            _ => false,
        }
    }

    fn reference_base(&self, reference: NodeId) -> Option<NodeId> {
        self.arena.attribute(reference).map(|a| a.value)
    }

    fn match_target(&self, target: NodeId, reference: NodeId) -> TargetMatch {
        if self.is_matching_reference(target, reference) {
            return TargetMatch::Same;
        }
        // `x = ...` invalidates narrowing of `x.y`, `x.y.z`, ...
        let mut base = self.reference_base(reference);
        while let Some(prefix) = base {
            if self.is_matching_reference(target, prefix) {
                return TargetMatch::Prefix;
            }
            base = self.reference_base(prefix);
        }
        TargetMatch::None
    }

    // ===== Guard extraction =====

    /// Select a narrowing predicate from the shape of a tested expression,
    /// when the test constrains `reference`. The `bool` is an inversion
    /// introduced by `is not` / `!=` / `not`.
    fn guard_for_test(
        &mut self,
        test: NodeId,
        reference: NodeId,
    ) -> Option<(TypeGuard, bool)> {
        let node = self.arena.get(test)?;
        match &node.data {
            NodeData::Unary(u) if u.op == UnaryOp::Not => {
                let operand = u.operand;
                let (guard, invert) = self.guard_for_test(operand, reference)?;
                Some((guard, !invert))
            }
            NodeData::Compare(compare) => {
                let (left, op, right) = (compare.left, compare.op, compare.right);
                self.comparison_guard(left, op, right, reference)
            }
            NodeData::Call(call) => {
                let call = call.clone();
                self.call_guard(&call, reference)
            }
            _ => {
                if self.is_matching_reference(test, reference) {
                    Some((TypeGuard::Truthy, false))
                } else {
                    None
                }
            }
        }
    }

    fn comparison_guard(
        &mut self,
        left: NodeId,
        op: CompareOp,
        right: NodeId,
        reference: NodeId,
    ) -> Option<(TypeGuard, bool)> {
        let (invert, is_identity) = match op {
            CompareOp::Is => (false, true),
            CompareOp::IsNot => (true, true),
            CompareOp::Eq => (false, false),
            CompareOp::NotEq => (true, false),
            _ => return None,
        };
        // The reference can sit on either side of the comparison.
        let other = if self.is_matching_reference(left, reference) {
            right
        } else if self.is_matching_reference(right, reference) {
            left
        } else {
            return None;
        };
        let other_lit = self.arena.literal(other)?;
        let other_value = other_lit.value;
        match other_value {
            sift_syntax::LiteralKind::None => Some((TypeGuard::IsNone, invert)),
            _ if !is_identity => {
                let literal = self.literal_type(&other_value);
                if literal == self.db.builtins.float_instance {
                    return None;
                }
                Some((TypeGuard::LiteralEqual(literal), invert))
            }
            _ => None,
        }
    }

    fn call_guard(
        &mut self,
        call: &sift_syntax::CallExpr,
        reference: NodeId,
    ) -> Option<(TypeGuard, bool)> {
        let callee_name = self.arena.name(call.callee).map(|n| n.name);
        // isinstance(x, C) or isinstance(x, (C, D))
        if callee_name == Some(self.db.intern_str("isinstance")) && call.args.len() == 2 {
            if !self.is_matching_reference(call.args[0], reference) {
                return None;
            }
            let target = self.instance_test_type(call.args[1]);
            return Some((TypeGuard::IsInstance(target), false));
        }
        // User-declared type guard: f(x) where f returns TypeGuard[T].
        let callee_flow = self.binder.flow_at(call.callee);
        let callee_ty = self.evaluate(call.callee, callee_flow);
        let shape_id = match self.db.lookup(self.db.resolve_recursive(callee_ty)) {
            Some(TypeKey::Function(shape_id)) => shape_id,
            _ => return None,
        };
        let shape = self.db.function_shape(shape_id);
        let predicate = shape.predicate?;
        let arg = call.args.get(predicate.param as usize).copied()?;
        if !self.is_matching_reference(arg, reference) {
            return None;
        }
        Some((TypeGuard::Predicate(predicate.ty), false))
    }

    /// The instance type a class-membership test narrows to; a tuple of
    /// classes narrows to the union of their instances.
    fn instance_test_type(&mut self, class_expr: NodeId) -> TypeId {
        if let Some(tuple) = self.arena.tuple(class_expr) {
            let elements = tuple.elements.clone();
            let members: Vec<TypeId> = elements
                .iter()
                .map(|&e| self.instance_test_type(e))
                .collect();
            return self.db.union(members);
        }
        let flow = self.binder.flow_at(class_expr);
        let class_ty = self.evaluate(class_expr, flow);
        self.to_instance(class_ty)
    }
}

enum TargetMatch {
    Same,
    Prefix,
    None,
}
