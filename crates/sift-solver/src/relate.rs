//! Assignability.
//!
//! The single relation the checker and the overload matcher consult:
//! can a value of `source` be used where `target` is expected. Gradual
//! semantics: `Any`/`Unknown` are compatible in both directions, so missing
//! information never cascades into diagnostics.

use crate::intern::TypeInterner;
use crate::recursion::{RecursionGuard, RecursionProfile};
use crate::types::{TypeId, TypeKey, TypeListId};

pub fn is_assignable(db: &TypeInterner, source: TypeId, target: TypeId) -> bool {
    let mut guard = RecursionGuard::with_profile(RecursionProfile::Assignability);
    assignable(db, source, target, &mut guard)
}

fn assignable(
    db: &TypeInterner,
    source: TypeId,
    target: TypeId,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> bool {
    let source = db.resolve_recursive(source);
    let target = db.resolve_recursive(target);
    if source == target {
        return true;
    }
    let key = (source, target);
    let entered = guard.enter(key);
    if entered.is_cycle() || entered.is_exceeded() {
        // Recursive structures relate coinductively: assuming the pair holds
        // while re-deriving it is what terminates `T = list[T] | int`
        // against itself. On a blown budget we also answer yes; a spurious
        // diagnostic would be worse than a missed one.
        return true;
    }
    let result = assignable_uncached(db, source, target, guard);
    guard.leave(key);
    result
}

fn assignable_uncached(
    db: &TypeInterner,
    source: TypeId,
    target: TypeId,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> bool {
    let Some(source_key) = db.lookup(source) else {
        return false;
    };
    let Some(target_key) = db.lookup(target) else {
        return false;
    };

    if matches!(target_key, TypeKey::Any | TypeKey::Unknown) {
        return true;
    }
    match source_key {
        TypeKey::Any | TypeKey::Unknown | TypeKey::Never => return true,
        TypeKey::Unbound => return false,
        _ => {}
    }

    // Everything bound is an object.
    if target == db.builtins.object_instance {
        return true;
    }

    if let TypeKey::Union(members) = source_key {
        return db
            .type_list(members)
            .iter()
            .all(|&m| assignable(db, m, target, guard));
    }
    if let TypeKey::Union(members) = target_key {
        return db
            .type_list(members)
            .iter()
            .any(|&m| assignable(db, source, m, guard));
    }

    match (source_key, target_key) {
        (TypeKey::Literal(value), _) => {
            assignable(db, db.literal_class_instance(&value), target, guard)
        }
        (_, TypeKey::Literal(_)) => false,

        (TypeKey::Instance(s_shape, s_args), TypeKey::Instance(t_shape, t_args)) => {
            if s_shape == t_shape {
                return args_compatible(db, t_shape, s_args, t_args, guard);
            }
            // Implicit numeric promotion.
            if s_shape == db.builtins.int_shape && t_shape == db.builtins.float_shape {
                return true;
            }
            let bases = db.class_shape(s_shape).bases;
            db.type_list(bases)
                .iter()
                .any(|&base| assignable(db, base, target, guard))
        }

        (TypeKey::Class(s_shape, s_args), TypeKey::Class(t_shape, t_args)) => {
            s_shape == t_shape && args_compatible(db, t_shape, s_args, t_args, guard)
        }

        (TypeKey::Function(s_id), TypeKey::Function(t_id)) => {
            function_assignable(db, s_id, t_id, guard)
        }
        (TypeKey::Overloaded(members), TypeKey::Function(_)) => db
            .type_list(members)
            .iter()
            .any(|&m| assignable(db, m, target, guard)),

        (TypeKey::TypeVar(info), _) => {
            info.bound != TypeId::UNKNOWN && assignable(db, info.bound, target, guard)
        }
        (_, TypeKey::TypeVar(info)) => {
            // Pre-substitution check against the parameter's bound.
            info.bound == TypeId::UNKNOWN || assignable(db, source, info.bound, guard)
        }

        _ => false,
    }
}

/// Specialization arguments, compared per the declared variance of each
/// parameter. An unspecialized side (empty args) is compatible with any
/// specialization.
fn args_compatible(
    db: &TypeInterner,
    shape: crate::types::ClassShapeId,
    source_args: TypeListId,
    target_args: TypeListId,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> bool {
    if source_args == target_args {
        return true;
    }
    let source_args = db.type_list(source_args);
    let target_args = db.type_list(target_args);
    if source_args.is_empty() || target_args.is_empty() {
        return true;
    }
    if source_args.len() != target_args.len() {
        return false;
    }
    let params = db.type_list(db.class_shape(shape).type_params);
    for (index, (&s, &t)) in source_args.iter().zip(target_args.iter()).enumerate() {
        let variance = params
            .get(index)
            .and_then(|&p| match db.lookup(p) {
                Some(TypeKey::TypeVar(info)) => Some(info.variance),
                _ => None,
            })
            .unwrap_or(crate::types::Variance::Invariant);
        let ok = match variance {
            crate::types::Variance::Invariant => {
                // Unknown on either side keeps partial specializations usable.
                s == t
                    || s == TypeId::UNKNOWN
                    || t == TypeId::UNKNOWN
                    || db.equivalent(s, t)
            }
            crate::types::Variance::Covariant => assignable(db, s, t, guard),
            crate::types::Variance::Contravariant => assignable(db, t, s, guard),
        };
        if !ok {
            return false;
        }
    }
    true
}

fn function_assignable(
    db: &TypeInterner,
    source: crate::types::FunctionShapeId,
    target: crate::types::FunctionShapeId,
    guard: &mut RecursionGuard<(TypeId, TypeId)>,
) -> bool {
    let source = db.function_shape(source);
    let target = db.function_shape(target);
    let source_required = source.params.iter().filter(|p| !p.has_default).count();
    if target.params.len() < source_required || target.params.len() > source.params.len() {
        return false;
    }
    for (s_param, t_param) in source.params.iter().zip(target.params.iter()) {
        // Parameters are contravariant.
        if !assignable(db, t_param.ty, s_param.ty, guard) {
            return false;
        }
    }
    assignable(db, source.ret, target.ret, guard)
}
