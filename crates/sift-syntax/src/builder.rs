//! Programmatic tree construction.
//!
//! External front ends hand the analyzer an already-parsed tree; `AstBuilder`
//! is the interface they (and every test in this workspace) use to produce
//! one. Leaves receive monotonically increasing synthetic ranges and
//! composite nodes span their children, so range-based queries behave like
//! they would on parser output.

use crate::arena::{NodeArena, NodeId};
use crate::ast::*;
use sift_common::{Atom, FileId, Interner, TextRange};
use std::sync::Arc;

pub struct AstBuilder {
    arena: NodeArena,
    cursor: u32,
}

impl AstBuilder {
    pub fn new(file: FileId, file_name: impl Into<String>) -> Self {
        let interner = Arc::new(Interner::new());
        AstBuilder {
            arena: NodeArena::new(file, file_name, interner),
            cursor: 0,
        }
    }

    pub fn with_interner(
        file: FileId,
        file_name: impl Into<String>,
        interner: Arc<Interner>,
    ) -> Self {
        AstBuilder {
            arena: NodeArena::new(file, file_name, interner),
            cursor: 0,
        }
    }

    pub fn interner(&self) -> Arc<Interner> {
        self.arena.interner.clone()
    }

    pub fn atom(&self, text: &str) -> Atom {
        self.arena.interner.intern(text)
    }

    /// Finish building and take the arena.
    pub fn finish(self) -> NodeArena {
        self.arena
    }

    fn leaf_range(&mut self, width: u32) -> TextRange {
        let range = TextRange::new(self.cursor, width.max(1));
        self.cursor += width.max(1) + 1;
        range
    }

    fn span_of(&self, children: &[NodeId]) -> TextRange {
        let mut start = u32::MAX;
        let mut end = 0u32;
        for &child in children {
            if child.is_none() {
                continue;
            }
            let range = self.arena.range(child);
            start = start.min(range.start);
            end = end.max(range.end());
        }
        if start == u32::MAX {
            TextRange::new(self.cursor, 1)
        } else {
            TextRange::new(start, end - start)
        }
    }

    fn alloc_spanning(&mut self, data: NodeData, children: &[NodeId]) -> NodeId {
        let range = self.span_of(children);
        self.cursor = self.cursor.max(range.end() + 1);
        self.arena.alloc(data, range)
    }

    // ===== Expressions =====

    pub fn name(&mut self, text: &str) -> NodeId {
        let name = self.atom(text);
        let range = self.leaf_range(text.len() as u32);
        self.arena.alloc(NodeData::Name(NameExpr { name }), range)
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        let range = self.leaf_range(2);
        self.arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::Int(value),
            }),
            range,
        )
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        let range = self.leaf_range(3);
        self.arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::Float(value.to_bits()),
            }),
            range,
        )
    }

    pub fn str_lit(&mut self, value: &str) -> NodeId {
        let atom = self.atom(value);
        let range = self.leaf_range(value.len() as u32 + 2);
        self.arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::Str(atom),
            }),
            range,
        )
    }

    pub fn bool_lit(&mut self, value: bool) -> NodeId {
        let range = self.leaf_range(if value { 4 } else { 5 });
        self.arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::Bool(value),
            }),
            range,
        )
    }

    pub fn none(&mut self) -> NodeId {
        let range = self.leaf_range(4);
        self.arena.alloc(
            NodeData::Literal(LiteralExpr {
                value: LiteralKind::None,
            }),
            range,
        )
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let mut children = vec![callee];
        children.extend(&args);
        self.alloc_spanning(NodeData::Call(CallExpr { callee, args }), &children)
    }

    pub fn attribute(&mut self, value: NodeId, attr: &str) -> NodeId {
        let attr = self.atom(attr);
        let range = {
            let base = self.arena.range(value);
            let range = TextRange::new(base.start, base.len + 4);
            self.cursor = self.cursor.max(range.end() + 1);
            range
        };
        self.arena
            .alloc(NodeData::Attribute(AttributeExpr { value, attr }), range)
    }

    pub fn subscript(&mut self, value: NodeId, index: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Subscript(SubscriptExpr { value, index }),
            &[value, index],
        )
    }

    pub fn tuple(&mut self, elements: Vec<NodeId>) -> NodeId {
        let children = elements.clone();
        self.alloc_spanning(NodeData::Tuple(TupleExpr { elements }), &children)
    }

    pub fn list(&mut self, elements: Vec<NodeId>) -> NodeId {
        let children = elements.clone();
        self.alloc_spanning(NodeData::List(ListExpr { elements }), &children)
    }

    pub fn list_comp(
        &mut self,
        element: NodeId,
        target: NodeId,
        iter: NodeId,
        condition: NodeId,
    ) -> NodeId {
        self.alloc_spanning(
            NodeData::ListComp(ListComp {
                element,
                target,
                iter,
                condition,
            }),
            &[element, target, iter, condition],
        )
    }

    pub fn compare(&mut self, left: NodeId, op: CompareOp, right: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Compare(CompareExpr { left, op, right }),
            &[left, right],
        )
    }

    pub fn is_none_test(&mut self, expr: NodeId) -> NodeId {
        let none = self.none();
        self.compare(expr, CompareOp::Is, none)
    }

    pub fn bool_op(&mut self, op: BoolOpKind, values: Vec<NodeId>) -> NodeId {
        let children = values.clone();
        self.alloc_spanning(NodeData::BoolOp(BoolOpExpr { op, values }), &children)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.alloc_spanning(NodeData::Unary(UnaryExpr { op, operand }), &[operand])
    }

    pub fn binary(&mut self, left: NodeId, op: BinaryOp, right: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Binary(BinaryExpr { left, op, right }),
            &[left, right],
        )
    }

    pub fn lambda(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
        let mut children = params.clone();
        children.push(body);
        self.alloc_spanning(NodeData::Lambda(LambdaExpr { params, body }), &children)
    }

    pub fn error_expr(&mut self) -> NodeId {
        let range = self.leaf_range(1);
        self.arena.alloc(NodeData::Error, range)
    }

    // ===== Statements =====

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Assign(Assign {
                target,
                annotation: NodeId::NONE,
                value,
            }),
            &[target, value],
        )
    }

    pub fn assign_ann(&mut self, target: NodeId, annotation: NodeId, value: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Assign(Assign {
                target,
                annotation,
                value,
            }),
            &[target, annotation, value],
        )
    }

    pub fn expr_stmt(&mut self, value: NodeId) -> NodeId {
        self.alloc_spanning(NodeData::ExprStmt(ExprStmt { value }), &[value])
    }

    pub fn return_stmt(&mut self, value: NodeId) -> NodeId {
        self.alloc_spanning(NodeData::Return(Return { value }), &[value])
    }

    pub fn raise_stmt(&mut self, value: NodeId) -> NodeId {
        self.alloc_spanning(NodeData::Raise(Raise { value }), &[value])
    }

    pub fn if_stmt(&mut self, test: NodeId, body: Vec<NodeId>, orelse: Vec<NodeId>) -> NodeId {
        let mut children = vec![test];
        children.extend(&body);
        children.extend(&orelse);
        self.alloc_spanning(NodeData::If(If { test, body, orelse }), &children)
    }

    pub fn while_stmt(&mut self, test: NodeId, body: Vec<NodeId>) -> NodeId {
        let mut children = vec![test];
        children.extend(&body);
        self.alloc_spanning(NodeData::While(While { test, body }), &children)
    }

    pub fn for_stmt(&mut self, target: NodeId, iter: NodeId, body: Vec<NodeId>) -> NodeId {
        let mut children = vec![target, iter];
        children.extend(&body);
        self.alloc_spanning(NodeData::For(For { target, iter, body }), &children)
    }

    pub fn try_stmt(
        &mut self,
        body: Vec<NodeId>,
        handlers: Vec<NodeId>,
        orelse: Vec<NodeId>,
        finalbody: Vec<NodeId>,
    ) -> NodeId {
        let mut children = body.clone();
        children.extend(&handlers);
        children.extend(&orelse);
        children.extend(&finalbody);
        self.alloc_spanning(
            NodeData::Try(Try {
                body,
                handlers,
                orelse,
                finalbody,
            }),
            &children,
        )
    }

    pub fn except_handler(
        &mut self,
        exc_type: NodeId,
        name: Option<&str>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let name = name.map(|n| self.atom(n));
        let mut children = vec![exc_type];
        children.extend(&body);
        self.alloc_spanning(
            NodeData::ExceptHandler(ExceptHandler {
                exc_type,
                name,
                body,
            }),
            &children,
        )
    }

    pub fn assert_stmt(&mut self, test: NodeId) -> NodeId {
        self.alloc_spanning(
            NodeData::Assert(Assert {
                test,
                msg: NodeId::NONE,
            }),
            &[test],
        )
    }

    pub fn import(&mut self, names: &[(&str, Option<&str>)]) -> NodeId {
        let names = names
            .iter()
            .map(|(name, alias)| ImportedName {
                name: self.atom(name),
                alias: alias.map(|a| self.atom(a)),
            })
            .collect();
        let range = self.leaf_range(8);
        self.arena.alloc(NodeData::Import(Import { names }), range)
    }

    pub fn pass_stmt(&mut self) -> NodeId {
        let range = self.leaf_range(4);
        self.arena.alloc(NodeData::Pass, range)
    }

    pub fn break_stmt(&mut self) -> NodeId {
        let range = self.leaf_range(5);
        self.arena.alloc(NodeData::Break, range)
    }

    pub fn continue_stmt(&mut self) -> NodeId {
        let range = self.leaf_range(8);
        self.arena.alloc(NodeData::Continue, range)
    }

    pub fn error_stmt(&mut self) -> NodeId {
        let range = self.leaf_range(1);
        self.arena.alloc(NodeData::Error, range)
    }

    // ===== Definitions =====

    pub fn param(&mut self, name: &str, annotation: NodeId) -> NodeId {
        let name = self.atom(name);
        let range = self.leaf_range(4);
        self.arena.alloc(
            NodeData::Param(Param {
                name,
                annotation,
                default: NodeId::NONE,
            }),
            range,
        )
    }

    pub fn param_default(&mut self, name: &str, annotation: NodeId, default: NodeId) -> NodeId {
        let name = self.atom(name);
        let range = self.leaf_range(4);
        self.arena.alloc(
            NodeData::Param(Param {
                name,
                annotation,
                default,
            }),
            range,
        )
    }

    pub fn type_param(&mut self, name: &str, bound: NodeId) -> NodeId {
        let name = self.atom(name);
        let range = self.leaf_range(2);
        self.arena
            .alloc(NodeData::TypeParam(TypeParam { name, bound }), range)
    }

    pub fn function_def(
        &mut self,
        name: &str,
        params: Vec<NodeId>,
        return_annotation: NodeId,
        body: Vec<NodeId>,
    ) -> NodeId {
        self.function_def_full(name, Vec::new(), params, return_annotation, body, false)
    }

    pub fn function_def_full(
        &mut self,
        name: &str,
        type_params: Vec<NodeId>,
        params: Vec<NodeId>,
        return_annotation: NodeId,
        body: Vec<NodeId>,
        is_overload: bool,
    ) -> NodeId {
        let name = self.atom(name);
        let mut children = type_params.clone();
        children.extend(&params);
        children.push(return_annotation);
        children.extend(&body);
        self.alloc_spanning(
            NodeData::FunctionDef(FunctionDef {
                name,
                type_params,
                params,
                return_annotation,
                body,
                is_overload,
            }),
            &children,
        )
    }

    pub fn class_def(&mut self, name: &str, bases: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        self.class_def_full(name, Vec::new(), bases, body)
    }

    pub fn class_def_full(
        &mut self,
        name: &str,
        type_params: Vec<NodeId>,
        bases: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let name = self.atom(name);
        let mut children = type_params.clone();
        children.extend(&bases);
        children.extend(&body);
        self.alloc_spanning(
            NodeData::ClassDef(ClassDef {
                name,
                type_params,
                bases,
                body,
            }),
            &children,
        )
    }

    pub fn module(&mut self, body: Vec<NodeId>) -> NodeId {
        let children = body.clone();
        self.alloc_spanning(NodeData::Module(ModuleData { body }), &children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_contained_ranges() {
        let mut b = AstBuilder::new(FileId(0), "test.sf");
        let x = b.name("x");
        let one = b.int(1);
        let assign = b.assign(x, one);
        let module = b.module(vec![assign]);
        let arena = b.finish();
        assert!(arena.range(x).contained_in(arena.range(assign)));
        assert!(arena.range(assign).contained_in(arena.range(module)));
    }

    #[test]
    fn test_leaves_do_not_overlap() {
        let mut b = AstBuilder::new(FileId(0), "test.sf");
        let a = b.name("a");
        let c = b.name("c");
        let arena = b.finish();
        assert!(arena.range(a).end() <= arena.range(c).start);
    }
}
