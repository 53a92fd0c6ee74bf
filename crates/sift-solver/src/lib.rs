//! Type solver: the structural type model, the lazy memoized evaluator, the
//! narrowing engine, generic inference, overload resolution, and the
//! dependency-tracked cache.
//!
//! The solver is pure type algebra over binder output. It never reads
//! source text and never raises for type-incorrect user code: every
//! user-facing problem is a diagnostic through the sink, and every result
//! is a best-effort `TypeId`.

pub mod cache;
pub mod call;
pub mod display;
pub mod evaluate;
pub mod flow_narrow;
pub mod infer;
pub mod intern;
pub mod narrow;
pub mod recursion;
pub mod relate;
pub mod types;

pub use cache::{Dependency, EvalKey, TypeCache};
pub use evaluate::{DeclarationTable, ImportedDecl, TypeEvaluator};
pub use infer::{InferenceContext, Substitution, contains_type_var, instantiate};
pub use intern::{Builtins, TypeInterner};
pub use narrow::{TypeGuard, apply_guard};
pub use recursion::{RecursionGuard, RecursionProfile, RecursionResult};
pub use relate::is_assignable;
pub use types::{
    ClassShape, ClassShapeId, FunctionShape, FunctionShapeId, LiteralValue, ParamInfo,
    PredicateInfo, TypeId, TypeKey, TypeListId, TypeVarInfo, Variance,
};
