//! Persistent scope tree.
//!
//! Scopes are stored flat in the binder and reference their parent by id, so
//! scope information can be queried after binding without replaying the
//! traversal order.

use crate::symbols::SymbolTable;
use serde::{Deserialize, Serialize};
use sift_syntax::NodeId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const NONE: ScopeId = ScopeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == ScopeId::NONE
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: ScopeId,
    /// Syntax node that introduced the scope (module, def, class, lambda,
    /// comprehension).
    pub node: NodeId,
    pub table: SymbolTable,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: ScopeId, node: NodeId) -> Self {
        Scope {
            kind,
            parent,
            node,
            table: SymbolTable::new(),
        }
    }
}
