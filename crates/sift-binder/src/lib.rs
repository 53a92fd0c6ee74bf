//! Binder: one pass per file that produces the scope tree, the symbol
//! tables, and the control-flow graph the narrowing engine walks.
//!
//! The binder never fails on malformed input. Error nodes become placeholder
//! symbols flagged unknown, and as much flow structure as can be recovered
//! is kept so downstream analysis still has something to work with.

pub mod flow;
pub mod scopes;
pub mod state;
pub mod symbols;

pub use flow::{FlowNode, FlowNodeArena, FlowNodeId, flow_flags};
pub use scopes::{Scope, ScopeId, ScopeKind};
pub use state::{BinderOptions, BinderState};
pub use symbols::{
    Declaration, DeclarationKind, Symbol, SymbolArena, SymbolId, SymbolTable, symbol_flags,
};
