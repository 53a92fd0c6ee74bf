//! Checker: drives one analysis pass per file over the binder output,
//! evaluating every statement's expressions, verifying assignment, call,
//! and return compatibility, and accumulating diagnostics.
//!
//! The checker is the system's outermost safety boundary: internal panics
//! from corrupt state are caught per file so one file can never abort a
//! batch, and a cancelled pass discards its in-progress cache entries so it
//! can never poison a later one.

pub mod cancel;
pub mod query;
pub mod state;

pub use cancel::CancellationToken;
pub use query::{type_at_offset, type_of};
pub use state::{CheckResult, CheckerOptions, CheckerState, check_file};
