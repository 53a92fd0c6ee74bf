//! Centralized limits and thresholds.
//!
//! Every recursive engine in the analyzer bounds itself with one of these
//! constants instead of a magic number at the call site.

/// Maximum depth for lazy type evaluation (aliases, class bodies, generic
/// instantiation). Exceeding it yields `Unknown` plus a low-severity
/// diagnostic rather than a crash.
pub const MAX_EVALUATE_DEPTH: u32 = 50;

/// Maximum depth for structural assignability comparison. Deeper than
/// evaluation because recursive types can legitimately nest far before a
/// cycle is detected.
pub const MAX_RELATE_DEPTH: u32 = 100;

/// Iteration bound shared by the evaluation and relation guards.
pub const MAX_GUARD_ITERATIONS: u32 = 100_000;

/// Upper bound on backward flow-graph traversal per narrowing query.
pub const MAX_FLOW_WALK_STEPS: u32 = 10_000;

/// Depth cap when rendering a type for a diagnostic message.
pub const MAX_DISPLAY_DEPTH: u32 = 8;

/// Red-zone and stack-growth sizes for `stacker::maybe_grow` at the
/// evaluator's recursive entry points.
pub const STACK_RED_ZONE: usize = 64 * 1024;
pub const STACK_GROWTH: usize = 1024 * 1024;
