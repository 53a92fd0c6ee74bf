//! Diagnostics model shared by all analyzer stages.
//!
//! The evaluator and checker never fail on type-incorrect user code; every
//! user-facing problem becomes a `Diagnostic` routed through a
//! `DiagnosticSink`. Only corrupt internal invariants are allowed to panic,
//! and the checker contains those at the per-file boundary.

use crate::span::TextRange;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
}

/// Rule codes. 1xxx: binding/scope issues, 2xxx: type errors,
/// 3xxx: low-severity analysis notes, 9xxx: internal failures.
pub mod codes {
    pub const DUPLICATE_DECLARATION: u32 = 1001;

    pub const ASSIGNMENT_MISMATCH: u32 = 2001;
    pub const ARGUMENT_MISMATCH: u32 = 2002;
    pub const NO_MATCHING_OVERLOAD: u32 = 2003;
    pub const UNRESOLVED_NAME: u32 = 2004;
    pub const UNRESOLVED_ATTRIBUTE: u32 = 2005;
    pub const NOT_CALLABLE: u32 = 2006;
    pub const ARGUMENT_COUNT: u32 = 2007;
    pub const TYPE_VAR_BOUND_VIOLATION: u32 = 2008;
    pub const RETURN_MISMATCH: u32 = 2009;
    pub const POSSIBLY_UNBOUND: u32 = 2010;

    pub const RECURSION_LIMIT: u32 = 3001;
    pub const UNREACHABLE_CODE: u32 = 3002;
    pub const UNKNOWN_TYPE: u32 = 3003;

    pub const INTERNAL_ERROR: u32 = 9001;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub file: String,
    pub start: u32,
    pub length: u32,
    pub message_text: String,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, range: TextRange, message: impl Into<String>, code: u32) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Error,
            code,
            file: file.into(),
            start: range.start,
            length: range.len,
            message_text: message.into(),
        }
    }

    pub fn warning(file: impl Into<String>, range: TextRange, message: impl Into<String>, code: u32) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Warning,
            code,
            file: file.into(),
            start: range.start,
            length: range.len,
            message_text: message.into(),
        }
    }

    pub fn suggestion(file: impl Into<String>, range: TextRange, message: impl Into<String>, code: u32) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Suggestion,
            code,
            file: file.into(),
            start: range.start,
            length: range.len,
            message_text: message.into(),
        }
    }
}

/// Collects diagnostics during one analysis pass.
///
/// The sink is shared by reference between the checker and the evaluator;
/// interior mutability keeps the evaluator's signature free of `&mut`
/// plumbing for what is conceptually an output channel.
#[derive(Default)]
pub struct DiagnosticSink {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.borrow().is_empty()
    }

    /// Take every collected diagnostic, ordered by source position.
    pub fn drain_sorted(&self) -> Vec<Diagnostic> {
        let mut diags = std::mem::take(&mut *self.diagnostics.borrow_mut());
        diags.sort_by_key(|d| (d.file.clone(), d.start, d.code));
        diags
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_orders_by_position() {
        let sink = DiagnosticSink::new();
        sink.report(Diagnostic::error("m", TextRange::new(40, 2), "later", codes::UNRESOLVED_NAME));
        sink.report(Diagnostic::error("m", TextRange::new(4, 2), "earlier", codes::UNRESOLVED_NAME));
        let diags = sink.drain_sorted();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].message_text, "earlier");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_diagnostic_serializes() {
        let diag = Diagnostic::warning("m", TextRange::new(0, 1), "note", codes::UNREACHABLE_CODE);
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("3002"));
    }
}
