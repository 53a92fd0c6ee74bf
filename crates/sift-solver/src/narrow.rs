//! Narrowing predicates.
//!
//! A `TypeGuard` is the AST-agnostic description of one control-flow test:
//! the flow walk extracts a guard from the tested expression's shape, and
//! this module applies it to a type for the branch polarity the walked edge
//! represents. A closed sum type with one application function per kind —
//! no dynamic dispatch.

use crate::intern::TypeInterner;
use crate::relate::is_assignable;
use crate::types::{LiteralValue, TypeId, TypeKey};

/// One narrowing condition, independent of any syntax node.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeGuard {
    /// `isinstance(x, C)`; payload is the instance type of `C` (a union for
    /// a tuple of classes).
    IsInstance(TypeId),
    /// `x is None` / `x is not None`.
    IsNone,
    /// Bare `x` tested for truthiness.
    Truthy,
    /// `x == literal` / `x != literal`; payload is the literal type.
    LiteralEqual(TypeId),
    /// A call to a user-declared type-guard function; payload is the
    /// narrowed-to type.
    Predicate(TypeId),
}

/// Apply `guard` to `assumed` for the given branch polarity. The result is
/// canonical (union rules apply) and `Never` when no member survives.
pub fn apply_guard(db: &TypeInterner, guard: &TypeGuard, assumed: TypeId, positive: bool) -> TypeId {
    let assumed = db.resolve_recursive(assumed);
    let members = db.union_members(assumed);
    let mut result: Vec<TypeId> = Vec::with_capacity(members.len());
    for member in members {
        let member = db.resolve_recursive(member);
        // A condition only executes once the name is bound.
        if member == TypeId::UNBOUND {
            continue;
        }
        match guard {
            TypeGuard::IsInstance(target) => {
                narrow_is_instance(db, member, *target, positive, &mut result)
            }
            TypeGuard::IsNone => narrow_is_none(db, member, positive, &mut result),
            TypeGuard::Truthy => narrow_truthy(db, member, positive, &mut result),
            TypeGuard::LiteralEqual(literal) => {
                narrow_literal_equal(db, member, *literal, positive, &mut result)
            }
            TypeGuard::Predicate(target) => {
                if positive {
                    narrow_is_instance(db, member, *target, true, &mut result);
                } else {
                    // A failed user guard promises nothing about the value.
                    result.push(member);
                }
            }
        }
    }
    db.union(result)
}

fn narrow_is_instance(
    db: &TypeInterner,
    member: TypeId,
    target: TypeId,
    positive: bool,
    result: &mut Vec<TypeId>,
) {
    if matches!(db.lookup(member), Some(TypeKey::Any | TypeKey::Unknown)) {
        result.push(if positive { target } else { member });
        return;
    }
    if positive {
        if is_assignable(db, member, target) {
            // Already at least as specific as the tested class.
            result.push(member);
        } else if is_assignable(db, target, member) {
            result.push(target);
        }
        // Structurally unrelated member: dropped; all-dropped unions
        // collapse to Never.
    } else if !is_assignable(db, member, target) {
        result.push(member);
    }
}

fn narrow_is_none(db: &TypeInterner, member: TypeId, positive: bool, result: &mut Vec<TypeId>) {
    let is_none = member == TypeId::NONE;
    let is_dynamic = matches!(db.lookup(member), Some(TypeKey::Any | TypeKey::Unknown));
    if positive {
        if is_none {
            result.push(member);
        } else if is_dynamic {
            result.push(TypeId::NONE);
        }
    } else if !is_none {
        result.push(member);
    }
}

fn narrow_truthy(db: &TypeInterner, member: TypeId, positive: bool, result: &mut Vec<TypeId>) {
    match db.lookup(member) {
        Some(TypeKey::None) => {
            if !positive {
                result.push(member);
            }
        }
        Some(TypeKey::Literal(value)) => {
            let falsy = literal_is_falsy(db, &value);
            if positive != falsy {
                result.push(member);
            }
        }
        Some(TypeKey::Instance(shape, _)) if shape == db.builtins.bool_shape => {
            // bool is exactly True | False.
            result.push(db.literal_bool(positive));
        }
        // int/str and arbitrary objects are not split into their falsy
        // values; user classes may define their own truthiness.
        _ => result.push(member),
    }
}

fn narrow_literal_equal(
    db: &TypeInterner,
    member: TypeId,
    literal: TypeId,
    positive: bool,
    result: &mut Vec<TypeId>,
) {
    let member_key = db.lookup(member);
    if positive {
        let possible = match &member_key {
            Some(TypeKey::Literal(_)) => member == literal,
            Some(TypeKey::Any | TypeKey::Unknown) => true,
            _ => is_assignable(db, literal, member),
        };
        if possible {
            result.push(literal);
        }
    } else {
        match member_key {
            // Only an exact literal member is excluded by `!=`.
            Some(TypeKey::Literal(_)) if member == literal => {}
            Some(TypeKey::Instance(shape, _))
                if shape == db.builtins.bool_shape
                    && matches!(
                        db.lookup(literal),
                        Some(TypeKey::Literal(LiteralValue::Bool(_)))
                    ) =>
            {
                // bool != True collapses to False and vice versa.
                if let Some(TypeKey::Literal(LiteralValue::Bool(value))) = db.lookup(literal) {
                    result.push(db.literal_bool(!value));
                }
            }
            _ => result.push(member),
        }
    }
}

fn literal_is_falsy(db: &TypeInterner, value: &LiteralValue) -> bool {
    match value {
        LiteralValue::Int(v) => *v == 0,
        LiteralValue::Bool(v) => !*v,
        LiteralValue::Str(s) => db.resolve_atom(*s).is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_none_narrowing() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let opt_int = db.union2(int, TypeId::NONE);
        assert_eq!(apply_guard(&db, &TypeGuard::IsNone, opt_int, true), TypeId::NONE);
        assert_eq!(apply_guard(&db, &TypeGuard::IsNone, opt_int, false), int);
    }

    #[test]
    fn test_is_instance_narrowing() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let s = db.builtins.str_instance;
        let union = db.union2(int, s);
        let guard = TypeGuard::IsInstance(int);
        assert_eq!(apply_guard(&db, &guard, union, true), int);
        assert_eq!(apply_guard(&db, &guard, union, false), s);
        // Unrelated entry type collapses to Never.
        assert_eq!(apply_guard(&db, &guard, s, true), TypeId::NEVER);
        // Supertype entry narrows down to the tested class.
        assert_eq!(
            apply_guard(&db, &guard, db.builtins.object_instance, true),
            int
        );
    }

    #[test]
    fn test_truthy_narrowing() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let b = db.builtins.bool_instance;
        let union = db.union(vec![int, b, TypeId::NONE]);
        let narrowed_true = apply_guard(&db, &TypeGuard::Truthy, union, true);
        let members = db.union_members(narrowed_true);
        assert!(members.contains(&int));
        assert!(members.contains(&db.literal_bool(true)));
        assert!(!members.contains(&TypeId::NONE));

        let narrowed_false = apply_guard(&db, &TypeGuard::Truthy, union, false);
        let members = db.union_members(narrowed_false);
        assert!(members.contains(&TypeId::NONE));
        assert!(members.contains(&db.literal_bool(false)));
        assert!(members.contains(&int));
    }

    #[test]
    fn test_literal_equality_narrowing() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let one = db.literal_int(1);
        let two = db.literal_int(2);
        let union = db.union2(one, two);
        let guard = TypeGuard::LiteralEqual(one);
        assert_eq!(apply_guard(&db, &guard, union, true), one);
        assert_eq!(apply_guard(&db, &guard, union, false), two);
        // Wide int narrows to the literal on equality.
        assert_eq!(apply_guard(&db, &guard, int, true), one);
        // But `!= 1` cannot remove anything from a wide int.
        assert_eq!(apply_guard(&db, &guard, int, false), int);
    }

    #[test]
    fn test_guard_drops_unbound() {
        let db = TypeInterner::new();
        let union = db.union2(db.builtins.int_instance, TypeId::UNBOUND);
        let narrowed = apply_guard(&db, &TypeGuard::Truthy, union, true);
        assert_eq!(narrowed, db.builtins.int_instance);
    }
}
