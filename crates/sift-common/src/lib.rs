//! Shared foundation for the sift analyzer crates.
//!
//! Everything here is deliberately small and dependency-light: source
//! positions, file identities, interned strings, the diagnostics model, and
//! the centralized limit constants the recursive engines consult.

pub mod diagnostics;
pub mod intern;
pub mod limits;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSink, codes};
pub use intern::{Atom, Interner};
pub use span::{FileId, TextRange};
