//! Call and overload resolution.
//!
//! Overloads are tried in declaration order; the first candidate whose
//! required parameters are satisfied and whose every argument is assignable
//! wins. When none match, the candidate with the fewest mismatches —
//! first-declared wins ties — is named in exactly one diagnostic, and its
//! return type is used best-effort so evaluation keeps going.

use crate::evaluate::TypeEvaluator;
use crate::infer::{InferenceContext, Substitution, instantiate};
use crate::relate::is_assignable;
use crate::types::{FunctionShapeId, TypeId, TypeKey};
use sift_common::codes;
use sift_syntax::{NodeData, NodeId};
use smallvec::SmallVec;

/// One argument that failed its parameter, for diagnostics.
struct Mismatch {
    argument: usize,
    expected: TypeId,
    actual: TypeId,
}

/// Outcome of matching one signature against an argument list.
struct SignatureFit {
    ret: TypeId,
    mismatches: Vec<Mismatch>,
    arity_error: Option<String>,
    substitution: Substitution,
}

impl SignatureFit {
    fn mismatch_count(&self) -> u32 {
        self.mismatches.len() as u32 + if self.arity_error.is_some() { 1 } else { 0 }
    }

    fn is_match(&self) -> bool {
        self.mismatches.is_empty() && self.arity_error.is_none()
    }
}

impl<'a> TypeEvaluator<'a> {
    pub(crate) fn evaluate_call(&mut self, node: NodeId, flow: sift_binder::FlowNodeId) -> TypeId {
        let Some(call_node) = self.arena.get(node) else {
            return TypeId::UNKNOWN;
        };
        let NodeData::Call(call) = &call_node.data else {
            return TypeId::UNKNOWN;
        };
        let (callee, args) = (call.callee, call.args.clone());

        // Class-membership tests are primitive: always a bool, and the
        // class argument is a type expression rather than a plain value.
        if let Some(name) = self.arena.name(callee).map(|n| n.name)
            && name == self.db.intern_str("isinstance")
            && self.binder.symbol_for_node(callee).is_none()
        {
            for &arg in &args {
                self.evaluate(arg, flow);
            }
            return self.db.builtins.bool_instance;
        }

        let callee_ty = self.evaluate(callee, flow);
        let arg_types: SmallVec<[TypeId; 4]> =
            args.iter().map(|&a| self.evaluate(a, flow)).collect();
        self.resolve_call(node, callee_ty, &args, &arg_types)
    }

    pub(crate) fn resolve_call(
        &mut self,
        call_node: NodeId,
        callee_ty: TypeId,
        arg_nodes: &[NodeId],
        arg_types: &[TypeId],
    ) -> TypeId {
        let callee_ty = self.db.resolve_recursive(callee_ty);
        match self.db.lookup(callee_ty) {
            Some(TypeKey::Any | TypeKey::Unknown) => TypeId::UNKNOWN,
            Some(TypeKey::Function(shape_id)) => {
                let fit = self.match_signature(shape_id, arg_types, true);
                self.report_fit(call_node, arg_nodes, shape_id, &fit);
                fit.ret
            }
            Some(TypeKey::Overloaded(members)) => {
                self.resolve_overloaded(call_node, members, arg_types)
            }
            Some(TypeKey::Class(shape, explicit_args)) => {
                self.resolve_construction(call_node, arg_nodes, shape, explicit_args, arg_types)
            }
            Some(TypeKey::Instance(..)) => {
                // Instances are callable through `__call__`.
                let dunder = self.db.intern_str("__call__");
                let member = self.attribute_on_type(call_node, callee_ty, dunder, false);
                if member == TypeId::UNKNOWN {
                    let rendered = self.db.display(callee_ty);
                    self.error(
                        call_node,
                        format!("'{rendered}' is not callable."),
                        codes::NOT_CALLABLE,
                    );
                    return TypeId::UNKNOWN;
                }
                self.resolve_call(call_node, member, arg_nodes, arg_types)
            }
            _ => {
                let rendered = self.db.display(callee_ty);
                self.error(
                    call_node,
                    format!("'{rendered}' is not callable."),
                    codes::NOT_CALLABLE,
                );
                TypeId::UNKNOWN
            }
        }
    }

    /// Match one signature. Bound violations are emitted only when
    /// `emit_violations` is set; overload candidate trials stay silent so a
    /// failed probe never leaks diagnostics.
    fn match_signature(
        &mut self,
        shape_id: FunctionShapeId,
        arg_types: &[TypeId],
        emit_violations: bool,
    ) -> SignatureFit {
        let shape = self.db.function_shape(shape_id);
        let type_params: Vec<TypeId> = self.db.type_list(shape.type_params).to_vec();

        let substitution = if type_params.is_empty() {
            Substitution::new()
        } else {
            let mut ctx = InferenceContext::new(self.db);
            for (param, &arg) in shape.params.iter().zip(arg_types.iter()) {
                ctx.unify(param.ty, arg);
            }
            let (substitution, violations) = ctx.resolve(&type_params);
            for violation in violations.into_iter().filter(|_| emit_violations) {
                let name = self.db.resolve_atom(violation.type_var.name);
                let inferred = self.db.display(violation.inferred);
                let bound = self.db.display(violation.type_var.bound);
                self.error(
                    shape.node,
                    format!(
                        "Inferred type '{inferred}' for type variable '{name}' \
                         violates its bound '{bound}'."
                    ),
                    codes::TYPE_VAR_BOUND_VIOLATION,
                );
            }
            substitution
        };

        let required = shape.params.iter().filter(|p| !p.has_default).count();
        let mut arity_error = None;
        if arg_types.len() < required {
            arity_error = Some(format!(
                "Expected at least {required} argument(s), got {}.",
                arg_types.len()
            ));
        } else if arg_types.len() > shape.params.len() {
            arity_error = Some(format!(
                "Expected at most {} argument(s), got {}.",
                shape.params.len(),
                arg_types.len()
            ));
        }

        let mut mismatches = Vec::new();
        for (index, (param, &arg)) in shape.params.iter().zip(arg_types.iter()).enumerate() {
            let expected = instantiate(self.db, param.ty, &substitution);
            if !is_assignable(self.db, arg, expected) {
                mismatches.push(Mismatch {
                    argument: index,
                    expected,
                    actual: arg,
                });
            }
        }

        let ret = instantiate(self.db, shape.ret, &substitution);
        SignatureFit {
            ret,
            mismatches,
            arity_error,
            substitution,
        }
    }

    /// Emit diagnostics for a direct (non-overloaded) call.
    fn report_fit(
        &mut self,
        call_node: NodeId,
        arg_nodes: &[NodeId],
        shape_id: FunctionShapeId,
        fit: &SignatureFit,
    ) {
        let shape = self.db.function_shape(shape_id);
        let name = self.db.resolve_atom(shape.name);
        if let Some(arity) = &fit.arity_error {
            self.error(
                call_node,
                format!("Call to '{name}': {arity}"),
                codes::ARGUMENT_COUNT,
            );
        }
        for mismatch in &fit.mismatches {
            let node = arg_nodes.get(mismatch.argument).copied().unwrap_or(call_node);
            let actual = self.db.display(mismatch.actual);
            let expected = self.db.display(mismatch.expected);
            self.error(
                node,
                format!(
                    "Argument of type '{actual}' is not assignable to parameter \
                     of type '{expected}' in call to '{name}'."
                ),
                codes::ARGUMENT_MISMATCH,
            );
        }
    }

    fn resolve_overloaded(
        &mut self,
        call_node: NodeId,
        members: crate::types::TypeListId,
        arg_types: &[TypeId],
    ) -> TypeId {
        let members = self.db.type_list(members);
        let mut best: Option<(usize, SignatureFit)> = None;
        for (index, &member) in members.iter().enumerate() {
            let Some(TypeKey::Function(shape_id)) = self.db.lookup(member) else {
                continue;
            };
            let fit = self.match_signature(shape_id, arg_types, false);
            if fit.is_match() {
                // First candidate that fully fits wins.
                return fit.ret;
            }
            let better = match &best {
                // First-declared wins among equal-mismatch candidates.
                Some((_, current)) => fit.mismatch_count() < current.mismatch_count(),
                None => true,
            };
            if better {
                best = Some((index, fit));
            }
        }

        let Some((index, fit)) = best else {
            return TypeId::UNKNOWN;
        };
        let Some(TypeKey::Function(shape_id)) = self.db.lookup(members[index]) else {
            return TypeId::UNKNOWN;
        };
        let shape = self.db.function_shape(shape_id);
        let name = self.db.resolve_atom(shape.name);

        let mut details: Vec<String> = Vec::new();
        if let Some(arity) = &fit.arity_error {
            details.push(arity.clone());
        }
        for mismatch in &fit.mismatches {
            let expected =
                instantiate(self.db, mismatch.expected, &fit.substitution);
            details.push(format!(
                "argument {} is '{}', expected '{}'",
                mismatch.argument + 1,
                self.db.display(mismatch.actual),
                self.db.display(expected),
            ));
        }
        self.error(
            call_node,
            format!(
                "No overload of '{}' matches the provided arguments; closest is \
                 overload {} of {}: {}.",
                name,
                index + 1,
                members.len(),
                details.join("; "),
            ),
            codes::NO_MATCHING_OVERLOAD,
        );
        fit.ret
    }

    fn resolve_construction(
        &mut self,
        call_node: NodeId,
        arg_nodes: &[NodeId],
        shape: crate::types::ClassShapeId,
        explicit_args: crate::types::TypeListId,
        arg_types: &[TypeId],
    ) -> TypeId {
        // Explicitly specialized construction: Box[int](...)
        if !self.db.type_list(explicit_args).is_empty() {
            self.check_constructor(call_node, arg_nodes, shape, arg_types);
            let args = self.db.type_list(explicit_args).to_vec();
            return self.db.instance(shape, args);
        }

        let class_shape = self.db.class_shape(shape);
        let type_params: Vec<TypeId> = self.db.type_list(class_shape.type_params).to_vec();
        if type_params.is_empty() {
            self.check_constructor(call_node, arg_nodes, shape, arg_types);
            return self.db.instance(shape, Vec::new());
        }

        // Infer specialization from the initializer's parameters.
        let init_shape = self.constructor_shape(shape);
        let inferred: Vec<TypeId> = match init_shape {
            Some(init_id) => {
                let init = self.db.function_shape(init_id);
                let mut ctx = InferenceContext::new(self.db);
                for (param, &arg) in init.params.iter().zip(arg_types.iter()) {
                    ctx.unify(param.ty, arg);
                }
                let (substitution, _) = ctx.resolve(&type_params);
                type_params
                    .iter()
                    .map(|tp| substitution.get(tp).copied().unwrap_or(TypeId::UNKNOWN))
                    .collect()
            }
            None => type_params.iter().map(|_| TypeId::UNKNOWN).collect(),
        };
        self.check_constructor(call_node, arg_nodes, shape, arg_types);
        self.db.instance(shape, inferred)
    }

    fn constructor_shape(
        &mut self,
        shape: crate::types::ClassShapeId,
    ) -> Option<FunctionShapeId> {
        let dunder_init = self.db.intern_str("__init__");
        let class_shape = self.db.class_shape(shape);
        let scope = self.binder.scope(class_shape.scope)?;
        let init_sym = scope.table.get(dunder_init)?;
        let init_ty = self.evaluate_function_symbol(init_sym);
        let bound = self.bind_first_param(init_ty);
        match self.db.lookup(bound) {
            Some(TypeKey::Function(id)) => Some(id),
            _ => None,
        }
    }

    /// Drop the `self` parameter from an initializer signature.
    fn bind_first_param(&mut self, ty: TypeId) -> TypeId {
        match self.db.lookup(self.db.resolve_recursive(ty)) {
            Some(TypeKey::Function(shape_id)) => {
                let shape = self.db.function_shape(shape_id);
                if shape.params.is_empty() {
                    return ty;
                }
                let mut shape = (*shape).clone();
                shape.params.remove(0);
                self.db.function(shape)
            }
            _ => ty,
        }
    }

    fn check_constructor(
        &mut self,
        call_node: NodeId,
        arg_nodes: &[NodeId],
        shape: crate::types::ClassShapeId,
        arg_types: &[TypeId],
    ) {
        if let Some(init_id) = self.constructor_shape(shape) {
            let fit = self.match_signature(init_id, arg_types, true);
            self.report_fit(call_node, arg_nodes, init_id, &fit);
        }
    }
}
