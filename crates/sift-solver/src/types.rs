//! Structural type keys.
//!
//! Types are immutable values interned by structure: a `TypeKey` describes a
//! type, interning it yields a `TypeId`, and equal structures always produce
//! the same id. All composite keys reference other types through ids or
//! interned shape/list handles, so comparison and hashing never recurse.

use sift_binder::ScopeId;
use sift_common::Atom;
use sift_syntax::NodeId;

/// Interned type handle. Equality of ids is structural equality of types,
/// with one exception: `Recursive` markers compare equal to their resolved
/// type only through [`crate::TypeInterner::equivalent`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const UNKNOWN: TypeId = TypeId(0);
    pub const ANY: TypeId = TypeId(1);
    pub const UNBOUND: TypeId = TypeId(2);
    pub const NEVER: TypeId = TypeId(3);
    pub const NONE: TypeId = TypeId(4);
}

/// Interned list of type ids. Id 0 is the empty list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeListId(pub u32);

impl TypeListId {
    pub const EMPTY: TypeListId = TypeListId(0);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassShapeId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionShapeId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Int(i64),
    Str(Atom),
    Bool(bool),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// A type parameter. Identity is the (name, binder) pair: two parameters
/// named `T` on different functions are different types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVarInfo {
    pub name: Atom,
    /// Upper bound; `TypeId::UNKNOWN` when unconstrained.
    pub bound: TypeId,
    pub variance: Variance,
    /// The `def`/`class` node that introduced the parameter, or
    /// `NodeId::NONE` for builtin shapes.
    pub binder: NodeId,
}

/// Nominal class identity plus everything member lookup needs: the class
/// body scope and the base list. Members themselves are resolved lazily
/// through the binder so self-referential classes never force a cycle here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassShape {
    pub name: Atom,
    /// Defining node; `NodeId::NONE` for builtins.
    pub node: NodeId,
    /// Class body scope; `ScopeId::NONE` for builtins.
    pub scope: ScopeId,
    /// List of `TypeVar` type ids.
    pub type_params: TypeListId,
    /// List of base instance types.
    pub bases: TypeListId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    pub name: Atom,
    pub ty: TypeId,
    pub has_default: bool,
}

/// Declared type-guard behavior: calling the function narrows argument
/// `param` to `ty` on the true branch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PredicateInfo {
    pub param: u32,
    pub ty: TypeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionShape {
    pub name: Atom,
    /// Defining node; `NodeId::NONE` for synthesized shapes.
    pub node: NodeId,
    pub params: Vec<ParamInfo>,
    pub ret: TypeId,
    /// List of `TypeVar` type ids.
    pub type_params: TypeListId,
    pub predicate: Option<PredicateInfo>,
}

/// The closed set of type constructors.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Not enough information to infer anything.
    Unknown,
    /// Explicitly dynamic; compatible in both directions.
    Any,
    /// A name on some path before its first assignment.
    Unbound,
    /// No possible value.
    Never,
    /// The `None` singleton.
    None,
    Module(Atom),
    /// The class object itself (the callable that constructs instances).
    Class(ClassShapeId, TypeListId),
    /// An instance of a class, optionally specialized.
    Instance(ClassShapeId, TypeListId),
    Function(FunctionShapeId),
    /// Ordered overload signatures sharing one name; members are
    /// `Function` types in declaration order.
    Overloaded(TypeListId),
    /// Canonical union: flattened, deduplicated, members sorted by id.
    Union(TypeListId),
    TypeVar(TypeVarInfo),
    Literal(LiteralValue),
    /// Placeholder for an evaluation currently in progress; bound to its
    /// resolution when the outer evaluation completes.
    Recursive(u32),
}
