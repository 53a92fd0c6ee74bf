//! Generic type inference via union-find.
//!
//! Type parameters of a called signature become inference variables; actual
//! argument types are unified structurally against the parameter
//! annotations; resolving the table yields a substitution map. Parameters
//! the call leaves unconstrained resolve to `Unknown`.

use crate::intern::TypeInterner;
use crate::recursion::{RecursionGuard, RecursionProfile};
use crate::relate::is_assignable;
use crate::types::{FunctionShape, ParamInfo, TypeId, TypeKey, TypeVarInfo};
use ena::unify::{InPlaceUnificationTable, NoError, UnifyKey, UnifyValue};
use indexmap::IndexMap;

/// An inference variable standing for one type parameter of the callee.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InferenceVar(pub u32);

/// Wrapper for `Option<TypeId>` to implement `UnifyValue` without running
/// into the orphan rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InferenceValue(pub Option<TypeId>);

impl UnifyKey for InferenceVar {
    type Value = InferenceValue;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        InferenceVar(u)
    }

    fn tag() -> &'static str {
        "InferenceVar"
    }
}

impl UnifyValue for InferenceValue {
    type Error = NoError;

    fn unify_values(a: &Self, b: &Self) -> Result<Self, Self::Error> {
        match (a.0, b.0) {
            (None, None) => Ok(InferenceValue(None)),
            (Some(t), None) | (None, Some(t)) => Ok(InferenceValue(Some(t))),
            (Some(a), Some(b)) if a == b => Ok(InferenceValue(Some(a))),
            // Conflicting bindings keep the first; the post-substitution
            // assignability pass reports the mismatch.
            (Some(a), Some(_)) => Ok(InferenceValue(Some(a))),
        }
    }
}

/// Substitution from `TypeVar` type ids to inferred types, in the order the
/// parameters were first encountered.
pub type Substitution = IndexMap<TypeId, TypeId>;

/// One violated upper bound discovered while resolving.
#[derive(Clone, Debug)]
pub struct BoundViolation {
    pub type_var: TypeVarInfo,
    pub inferred: TypeId,
}

pub struct InferenceContext<'a> {
    db: &'a TypeInterner,
    table: InPlaceUnificationTable<InferenceVar>,
    vars: IndexMap<TypeId, InferenceVar>,
}

impl<'a> InferenceContext<'a> {
    pub fn new(db: &'a TypeInterner) -> Self {
        InferenceContext {
            db,
            table: InPlaceUnificationTable::new(),
            vars: IndexMap::new(),
        }
    }

    fn var_for(&mut self, type_var: TypeId) -> InferenceVar {
        if let Some(&var) = self.vars.get(&type_var) {
            return var;
        }
        let var = self.table.new_key(InferenceValue(None));
        self.vars.insert(type_var, var);
        var
    }

    pub fn probe(&mut self, type_var: TypeId) -> Option<TypeId> {
        let var = self.vars.get(&type_var).copied()?;
        self.table.probe_value(var).0
    }

    /// Structurally unify one parameter annotation against one argument
    /// type, collecting bindings for every type parameter encountered.
    pub fn unify(&mut self, param: TypeId, arg: TypeId) {
        let mut guard = RecursionGuard::with_profile(RecursionProfile::CallResolution);
        self.unify_inner(param, arg, &mut guard);
    }

    fn unify_inner(
        &mut self,
        param: TypeId,
        arg: TypeId,
        guard: &mut RecursionGuard<(TypeId, TypeId)>,
    ) {
        let param = self.db.resolve_recursive(param);
        let arg = self.db.resolve_recursive(arg);
        if !guard.enter((param, arg)).is_entered() {
            return;
        }
        self.unify_pair(param, arg, guard);
        guard.leave((param, arg));
    }

    fn unify_pair(
        &mut self,
        param: TypeId,
        arg: TypeId,
        guard: &mut RecursionGuard<(TypeId, TypeId)>,
    ) {
        let Some(param_key) = self.db.lookup(param) else {
            return;
        };
        match param_key {
            TypeKey::TypeVar(_) => {
                let var = self.var_for(param);
                // Literal arguments infer their class; `f(1)` binds `T`
                // to `int`, not `Literal[1]`.
                let widened = self.db.widen_literal(arg);
                let value = InferenceValue(Some(widened));
                let _ = self.table.unify_var_value(var, value);
            }
            TypeKey::Instance(p_shape, p_args) => {
                if let Some(TypeKey::Instance(a_shape, a_args)) = self.db.lookup(arg)
                    && p_shape == a_shape
                {
                    let p_args = self.db.type_list(p_args);
                    let a_args = self.db.type_list(a_args);
                    for (&p, &a) in p_args.iter().zip(a_args.iter()) {
                        self.unify_inner(p, a, guard);
                    }
                }
            }
            TypeKey::Union(members) => {
                // Bind type-parameter members only with what the concrete
                // members cannot already absorb.
                let members = self.db.type_list(members);
                let concrete: Vec<TypeId> = members
                    .iter()
                    .copied()
                    .filter(|&m| !contains_type_var(self.db, m))
                    .collect();
                let concrete_union = self.db.union(concrete);
                if concrete_union != TypeId::NEVER && is_assignable(self.db, arg, concrete_union) {
                    return;
                }
                for &member in members.iter() {
                    if contains_type_var(self.db, member) {
                        self.unify_inner(member, arg, guard);
                    }
                }
            }
            TypeKey::Function(p_id) => {
                if let Some(TypeKey::Function(a_id)) = self.db.lookup(arg) {
                    let p_shape = self.db.function_shape(p_id);
                    let a_shape = self.db.function_shape(a_id);
                    for (p, a) in p_shape.params.iter().zip(a_shape.params.iter()) {
                        self.unify_inner(p.ty, a.ty, guard);
                    }
                    self.unify_inner(p_shape.ret, a_shape.ret, guard);
                }
            }
            _ => {}
        }
    }

    /// Resolve every registered parameter. Unconstrained parameters become
    /// `Unknown`; upper-bound violations are returned for the caller to
    /// report, with the inferred type kept best-effort.
    pub fn resolve(&mut self, type_params: &[TypeId]) -> (Substitution, Vec<BoundViolation>) {
        let mut substitution = Substitution::new();
        let mut violations = Vec::new();
        for &type_var in type_params {
            let inferred = match self.vars.get(&type_var).copied() {
                Some(var) => self.table.probe_value(var).0.unwrap_or(TypeId::UNKNOWN),
                None => TypeId::UNKNOWN,
            };
            if let Some(TypeKey::TypeVar(info)) = self.db.lookup(type_var)
                && info.bound != TypeId::UNKNOWN
                && inferred != TypeId::UNKNOWN
                && !is_assignable(self.db, inferred, info.bound)
            {
                violations.push(BoundViolation {
                    type_var: info,
                    inferred,
                });
            }
            substitution.insert(type_var, inferred);
        }
        (substitution, violations)
    }
}

/// Whether `ty` structurally mentions any type parameter.
pub fn contains_type_var(db: &TypeInterner, ty: TypeId) -> bool {
    let mut guard = RecursionGuard::with_profile(RecursionProfile::CallResolution);
    contains_type_var_inner(db, ty, &mut guard)
}

fn contains_type_var_inner(
    db: &TypeInterner,
    ty: TypeId,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> bool {
    let ty = db.resolve_recursive(ty);
    if !guard.enter((ty, ty)).is_entered() {
        return false;
    }
    let result = match db.lookup(ty) {
        Some(TypeKey::TypeVar(_)) => true,
        Some(TypeKey::Instance(_, args)) | Some(TypeKey::Class(_, args)) => db
            .type_list(args)
            .iter()
            .any(|&a| contains_type_var_inner(db, a, guard)),
        Some(TypeKey::Union(members)) | Some(TypeKey::Overloaded(members)) => db
            .type_list(members)
            .iter()
            .any(|&m| contains_type_var_inner(db, m, guard)),
        Some(TypeKey::Function(shape_id)) => {
            let shape = db.function_shape(shape_id);
            shape
                .params
                .iter()
                .any(|p| contains_type_var_inner(db, p.ty, guard))
                || contains_type_var_inner(db, shape.ret, guard)
        }
        _ => false,
    };
    guard.leave((ty, ty));
    result
}

/// Replace type parameters per `substitution`, rebuilding composites.
pub fn instantiate(db: &TypeInterner, ty: TypeId, substitution: &Substitution) -> TypeId {
    if substitution.is_empty() {
        return ty;
    }
    let mut guard = RecursionGuard::with_profile(RecursionProfile::CallResolution);
    instantiate_inner(db, ty, substitution, &mut guard)
}

fn instantiate_inner(
    db: &TypeInterner,
    ty: TypeId,
    substitution: &Substitution,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> TypeId {
    let ty = db.resolve_recursive(ty);
    if !guard.enter((ty, ty)).is_entered() {
        return ty;
    }
    let result = match db.lookup(ty) {
        Some(TypeKey::TypeVar(_)) => substitution.get(&ty).copied().unwrap_or(ty),
        Some(TypeKey::Instance(shape, args)) => {
            let args: Vec<TypeId> = db
                .type_list(args)
                .iter()
                .map(|&a| instantiate_inner(db, a, substitution, guard))
                .collect();
            db.instance(shape, args)
        }
        Some(TypeKey::Class(shape, args)) => {
            let args: Vec<TypeId> = db
                .type_list(args)
                .iter()
                .map(|&a| instantiate_inner(db, a, substitution, guard))
                .collect();
            db.class_type(shape, args)
        }
        Some(TypeKey::Union(members)) => {
            let members: Vec<TypeId> = db
                .type_list(members)
                .iter()
                .map(|&m| instantiate_inner(db, m, substitution, guard))
                .collect();
            db.union(members)
        }
        Some(TypeKey::Function(shape_id)) => {
            let shape = db.function_shape(shape_id);
            let params: Vec<ParamInfo> = shape
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name,
                    ty: instantiate_inner(db, p.ty, substitution, guard),
                    has_default: p.has_default,
                })
                .collect();
            let predicate = shape.predicate.map(|pred| crate::types::PredicateInfo {
                param: pred.param,
                ty: instantiate_inner(db, pred.ty, substitution, guard),
            });
            db.function(FunctionShape {
                name: shape.name,
                node: shape.node,
                params,
                ret: instantiate_inner(db, shape.ret, substitution, guard),
                type_params: shape.type_params,
                predicate,
            })
        }
        _ => ty,
    };
    guard.leave((ty, ty));
    result
}
