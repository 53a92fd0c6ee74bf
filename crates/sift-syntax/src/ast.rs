//! Node payloads for statements and expressions.
//!
//! The analyzed language is dynamically typed and duck typed, with optional
//! inline annotations written as ordinary expressions (`x: int | None`,
//! `list[str]`). Annotations therefore reuse the expression payloads; the
//! evaluator decides whether an expression position is a type context.

use crate::arena::NodeId;
use serde::{Deserialize, Serialize};
use sift_common::Atom;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntaxKind {
    Module,
    FunctionDef,
    ClassDef,
    TypeParam,
    Param,
    Assign,
    Return,
    Raise,
    If,
    While,
    For,
    Try,
    ExceptHandler,
    Assert,
    Import,
    ExprStmt,
    Pass,
    Break,
    Continue,
    Error,
    Name,
    Literal,
    Call,
    Attribute,
    Subscript,
    Tuple,
    List,
    ListComp,
    Compare,
    BoolOp,
    Unary,
    Binary,
    Lambda,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Is,
    IsNot,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Literal constants. Floats carry their bit pattern so payloads stay `Eq`;
/// the evaluator maps them to the `float` class rather than a literal type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Int(i64),
    Float(u64),
    Str(Atom),
    Bool(bool),
    None,
}

#[derive(Clone, Debug)]
pub struct ModuleData {
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: Atom,
    pub type_params: Vec<NodeId>,
    pub params: Vec<NodeId>,
    /// Annotation expression, `NodeId::NONE` when omitted.
    pub return_annotation: NodeId,
    pub body: Vec<NodeId>,
    /// Marks one signature of an overload set; the set shares a symbol.
    pub is_overload: bool,
}

#[derive(Clone, Debug)]
pub struct TypeParam {
    pub name: Atom,
    pub bound: NodeId,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: Atom,
    pub annotation: NodeId,
    pub default: NodeId,
}

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub name: Atom,
    pub type_params: Vec<NodeId>,
    pub bases: Vec<NodeId>,
    pub body: Vec<NodeId>,
}

/// `target = value`, `target: annotation = value`, or `target: annotation`.
#[derive(Clone, Debug)]
pub struct Assign {
    pub target: NodeId,
    pub annotation: NodeId,
    pub value: NodeId,
}

#[derive(Clone, Debug)]
pub struct Return {
    pub value: NodeId,
}

#[derive(Clone, Debug)]
pub struct Raise {
    pub value: NodeId,
}

#[derive(Clone, Debug)]
pub struct If {
    pub test: NodeId,
    pub body: Vec<NodeId>,
    pub orelse: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct While {
    pub test: NodeId,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct For {
    pub target: NodeId,
    pub iter: NodeId,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Try {
    pub body: Vec<NodeId>,
    pub handlers: Vec<NodeId>,
    pub orelse: Vec<NodeId>,
    pub finalbody: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct ExceptHandler {
    pub exc_type: NodeId,
    pub name: Option<Atom>,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Assert {
    pub test: NodeId,
    pub msg: NodeId,
}

#[derive(Clone, Debug)]
pub struct ImportedName {
    pub name: Atom,
    pub alias: Option<Atom>,
}

#[derive(Clone, Debug)]
pub struct Import {
    pub names: Vec<ImportedName>,
}

#[derive(Clone, Debug)]
pub struct ExprStmt {
    pub value: NodeId,
}

#[derive(Clone, Debug)]
pub struct NameExpr {
    pub name: Atom,
}

#[derive(Clone, Debug)]
pub struct LiteralExpr {
    pub value: LiteralKind,
}

#[derive(Clone, Debug)]
pub struct CallExpr {
    pub callee: NodeId,
    pub args: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct AttributeExpr {
    pub value: NodeId,
    pub attr: Atom,
}

#[derive(Clone, Debug)]
pub struct SubscriptExpr {
    pub value: NodeId,
    pub index: NodeId,
}

#[derive(Clone, Debug)]
pub struct TupleExpr {
    pub elements: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct ListExpr {
    pub elements: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct ListComp {
    pub element: NodeId,
    pub target: NodeId,
    pub iter: NodeId,
    /// Filter condition, `NodeId::NONE` when absent.
    pub condition: NodeId,
}

#[derive(Clone, Debug)]
pub struct CompareExpr {
    pub left: NodeId,
    pub op: CompareOp,
    pub right: NodeId,
}

#[derive(Clone, Debug)]
pub struct BoolOpExpr {
    pub op: BoolOpKind,
    pub values: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: NodeId,
}

#[derive(Clone, Debug)]
pub struct BinaryExpr {
    pub left: NodeId,
    pub op: BinaryOp,
    pub right: NodeId,
}

#[derive(Clone, Debug)]
pub struct LambdaExpr {
    pub params: Vec<NodeId>,
    pub body: NodeId,
}

/// Tagged payload stored in each arena node.
#[derive(Clone, Debug)]
pub enum NodeData {
    Module(ModuleData),
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    TypeParam(TypeParam),
    Param(Param),
    Assign(Assign),
    Return(Return),
    Raise(Raise),
    If(If),
    While(While),
    For(For),
    Try(Try),
    ExceptHandler(ExceptHandler),
    Assert(Assert),
    Import(Import),
    ExprStmt(ExprStmt),
    Pass,
    Break,
    Continue,
    /// Recovered syntax gap; the binder substitutes placeholders and keeps going.
    Error,
    Name(NameExpr),
    Literal(LiteralExpr),
    Call(CallExpr),
    Attribute(AttributeExpr),
    Subscript(SubscriptExpr),
    Tuple(TupleExpr),
    List(ListExpr),
    ListComp(ListComp),
    Compare(CompareExpr),
    BoolOp(BoolOpExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Lambda(LambdaExpr),
}

impl NodeData {
    pub fn kind(&self) -> SyntaxKind {
        match self {
            NodeData::Module(_) => SyntaxKind::Module,
            NodeData::FunctionDef(_) => SyntaxKind::FunctionDef,
            NodeData::ClassDef(_) => SyntaxKind::ClassDef,
            NodeData::TypeParam(_) => SyntaxKind::TypeParam,
            NodeData::Param(_) => SyntaxKind::Param,
            NodeData::Assign(_) => SyntaxKind::Assign,
            NodeData::Return(_) => SyntaxKind::Return,
            NodeData::Raise(_) => SyntaxKind::Raise,
            NodeData::If(_) => SyntaxKind::If,
            NodeData::While(_) => SyntaxKind::While,
            NodeData::For(_) => SyntaxKind::For,
            NodeData::Try(_) => SyntaxKind::Try,
            NodeData::ExceptHandler(_) => SyntaxKind::ExceptHandler,
            NodeData::Assert(_) => SyntaxKind::Assert,
            NodeData::Import(_) => SyntaxKind::Import,
            NodeData::ExprStmt(_) => SyntaxKind::ExprStmt,
            NodeData::Pass => SyntaxKind::Pass,
            NodeData::Break => SyntaxKind::Break,
            NodeData::Continue => SyntaxKind::Continue,
            NodeData::Error => SyntaxKind::Error,
            NodeData::Name(_) => SyntaxKind::Name,
            NodeData::Literal(_) => SyntaxKind::Literal,
            NodeData::Call(_) => SyntaxKind::Call,
            NodeData::Attribute(_) => SyntaxKind::Attribute,
            NodeData::Subscript(_) => SyntaxKind::Subscript,
            NodeData::Tuple(_) => SyntaxKind::Tuple,
            NodeData::List(_) => SyntaxKind::List,
            NodeData::ListComp(_) => SyntaxKind::ListComp,
            NodeData::Compare(_) => SyntaxKind::Compare,
            NodeData::BoolOp(_) => SyntaxKind::BoolOp,
            NodeData::Unary(_) => SyntaxKind::Unary,
            NodeData::Binary(_) => SyntaxKind::Binary,
            NodeData::Lambda(_) => SyntaxKind::Lambda,
        }
    }
}
