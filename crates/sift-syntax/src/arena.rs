//! Node arena.
//!
//! Nodes live in a flat `Vec` and reference each other by `NodeId`, so the
//! tree (and the flow graph built over it) can be traversed with plain
//! integer indices and explicit visited sets — no `Rc` cycles, no lifetimes
//! threading through every consumer.

use crate::ast::{
    Assert, Assign, AttributeExpr, BinaryExpr, BoolOpExpr, CallExpr, ClassDef, CompareExpr,
    ExceptHandler, ExprStmt, For, FunctionDef, If, Import, LambdaExpr, ListComp, ListExpr,
    LiteralExpr, ModuleData, NameExpr, NodeData, Param, Raise, Return, SubscriptExpr, SyntaxKind,
    Try, TupleExpr, TypeParam, UnaryExpr, While,
};
use serde::{Deserialize, Serialize};
use sift_common::{FileId, Interner, TextRange};
use std::sync::Arc;

/// Index of a node within its arena. Only valid for the arena that
/// allocated it.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == NodeId::NONE
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub range: TextRange,
    pub data: NodeData,
}

impl Node {
    pub fn kind(&self) -> SyntaxKind {
        self.data.kind()
    }
}

pub struct NodeArena {
    nodes: Vec<Node>,
    pub file: FileId,
    pub file_name: String,
    pub interner: Arc<Interner>,
}

macro_rules! payload_accessor {
    ($fn_name:ident, $variant:ident, $payload:ty) => {
        pub fn $fn_name(&self, id: NodeId) -> Option<&$payload> {
            match &self.get(id)?.data {
                NodeData::$variant(data) => Some(data),
                _ => None,
            }
        }
    };
}

impl NodeArena {
    pub fn new(file: FileId, file_name: impl Into<String>, interner: Arc<Interner>) -> Self {
        NodeArena {
            nodes: Vec::new(),
            file,
            file_name: file_name.into(),
            interner,
        }
    }

    pub fn alloc(&mut self, data: NodeData, range: TextRange) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { range, data });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn kind(&self, id: NodeId) -> Option<SyntaxKind> {
        self.get(id).map(Node::kind)
    }

    pub fn range(&self, id: NodeId) -> TextRange {
        self.get(id).map(|n| n.range).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Smallest node whose range contains `offset`; used by the per-node
    /// type query surface.
    pub fn node_at_offset(&self, offset: u32) -> Option<NodeId> {
        let mut best: Option<(u32, NodeId)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if node.range.contains(offset) {
                let len = node.range.len;
                if best.is_none_or(|(best_len, _)| len < best_len) {
                    best = Some((len, NodeId(index as u32)));
                }
            }
        }
        best.map(|(_, id)| id)
    }

    payload_accessor!(module, Module, ModuleData);
    payload_accessor!(function_def, FunctionDef, FunctionDef);
    payload_accessor!(class_def, ClassDef, ClassDef);
    payload_accessor!(type_param, TypeParam, TypeParam);
    payload_accessor!(param, Param, Param);
    payload_accessor!(assign, Assign, Assign);
    payload_accessor!(return_stmt, Return, Return);
    payload_accessor!(raise_stmt, Raise, Raise);
    payload_accessor!(if_stmt, If, If);
    payload_accessor!(while_stmt, While, While);
    payload_accessor!(for_stmt, For, For);
    payload_accessor!(try_stmt, Try, Try);
    payload_accessor!(except_handler, ExceptHandler, ExceptHandler);
    payload_accessor!(assert_stmt, Assert, Assert);
    payload_accessor!(import_stmt, Import, Import);
    payload_accessor!(expr_stmt, ExprStmt, ExprStmt);
    payload_accessor!(name, Name, NameExpr);
    payload_accessor!(literal, Literal, LiteralExpr);
    payload_accessor!(call, Call, CallExpr);
    payload_accessor!(attribute, Attribute, AttributeExpr);
    payload_accessor!(subscript, Subscript, SubscriptExpr);
    payload_accessor!(tuple, Tuple, TupleExpr);
    payload_accessor!(list, List, ListExpr);
    payload_accessor!(list_comp, ListComp, ListComp);
    payload_accessor!(compare, Compare, CompareExpr);
    payload_accessor!(bool_op, BoolOp, BoolOpExpr);
    payload_accessor!(unary, Unary, UnaryExpr);
    payload_accessor!(binary, Binary, BinaryExpr);
    payload_accessor!(lambda, Lambda, LambdaExpr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LiteralKind;

    #[test]
    fn test_alloc_and_accessors() {
        let interner = Arc::new(Interner::new());
        let mut arena = NodeArena::new(FileId(0), "test.sf", interner.clone());
        let name = interner.intern("x");
        let id = arena.alloc(
            NodeData::Name(NameExpr { name }),
            TextRange::new(0, 1),
        );
        assert_eq!(arena.name(id).unwrap().name, name);
        assert!(arena.literal(id).is_none());
        assert_eq!(arena.kind(id), Some(SyntaxKind::Name));
    }

    #[test]
    fn test_node_at_offset_prefers_smallest() {
        let interner = Arc::new(Interner::new());
        let mut arena = NodeArena::new(FileId(0), "test.sf", interner);
        let inner = arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::Int(1),
            }),
            TextRange::new(4, 1),
        );
        let _outer = arena.alloc(
            NodeData::ExprStmt(ExprStmt { value: inner }),
            TextRange::new(0, 10),
        );
        assert_eq!(arena.node_at_offset(4), Some(inner));
    }
}
