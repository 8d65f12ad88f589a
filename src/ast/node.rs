//! Tree node definitions
//!
//! Nodes live in a [`Tree`](super::Tree) arena and are addressed by [`NodeId`].
//! Child slots are positional; the comment on each [`NodeKind`] variant lists
//! the expected children in order.

use super::types::{Dispatch, FieldRef, MethodRef, QualifiedMemberId, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a variable in its tree's variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub(crate) u32);

impl VariableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Role of a variable within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Parameter { index: usize },
    Local,
    This,
    /// Temporary introduced by allocation hoisting
    Hoisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: TypeRef,
    pub kind: VariableKind,
}

impl Variable {
    pub fn parameter_index(&self) -> Option<usize> {
        match self.kind {
            VariableKind::Parameter { index } => Some(index),
            _ => None,
        }
    }
}

/// Bit pattern of a double literal, so literals can be hashed and compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatBits(u64);

impl FloatBits {
    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for FloatBits {
    fn from(value: f64) -> Self {
        FloatBits(value.to_bits())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(FloatBits),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UnaryOp {
    /// Increment and decrement write back to their operand
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrement
                | UnaryOp::PreDecrement
                | UnaryOp::PostIncrement
                | UnaryOp::PostDecrement
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
    ForEach,
}

/// Discriminant and payload of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// `[statement...]`
    FunctionBody,
    /// `[statement...]`
    Block,
    /// `[expression]`
    ExpressionStatement,
    /// `[declarator...]`
    VariableDeclaration,
    /// `[initializer?]`
    VariableDeclarator { variable: VariableId },
    /// `[header expression..., body]`; the body is always the last child
    Loop(LoopKind),
    /// `[condition, then, else?]`
    If,
    /// `[value?]`
    Return,
    /// `[value]`
    Throw,
    /// `[try, catch?, finally?]`
    Try { has_catch: bool, has_finally: bool },
    /// `[body]`
    Lambda,
    Literal(Literal),
    /// Zero value of the node's static type
    DefaultValue,
    Variable(VariableId),
    /// `[receiver]` for instance fields, no children for static fields
    Field(FieldRef),
    /// `[array, index]`
    ArrayElement,
    /// `[this?, argument...]`
    Invocation {
        method: MethodRef,
        dispatch: Dispatch,
        has_this: bool,
    },
    /// `[argument...]`
    NewObject { constructor: QualifiedMemberId },
    /// `[array, index]`
    NewElementReference { packed: bool },
    /// `[temporary, array, index]`: points an existing element reference at a new element
    Retarget { packed: bool },
    /// `[target]`: pass-by-reference of a variable, field or element
    ReferenceOf,
    /// `[left, right]`
    Binary(BinaryOp),
    /// `[operand]`
    Unary(UnaryOp),
    /// `[expression...]`: evaluates all, yields the last
    Comma,
    /// `[condition, then, else]`
    Conditional,
}

impl NodeKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, NodeKind::Loop(_))
    }

    /// Invocations and constructor calls both take an argument list
    pub fn is_call(&self) -> bool {
        matches!(self, NodeKind::Invocation { .. } | NodeKind::NewObject { .. })
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::FunctionBody
                | NodeKind::Block
                | NodeKind::ExpressionStatement
                | NodeKind::VariableDeclaration
                | NodeKind::Loop(_)
                | NodeKind::If
                | NodeKind::Return
                | NodeKind::Throw
                | NodeKind::Try { .. }
        )
    }

    /// Short label used in logs and diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::FunctionBody => "function-body",
            NodeKind::Block => "block",
            NodeKind::ExpressionStatement => "expression-statement",
            NodeKind::VariableDeclaration => "variable-declaration",
            NodeKind::VariableDeclarator { .. } => "variable-declarator",
            NodeKind::Loop(_) => "loop",
            NodeKind::If => "if",
            NodeKind::Return => "return",
            NodeKind::Throw => "throw",
            NodeKind::Try { .. } => "try",
            NodeKind::Lambda => "lambda",
            NodeKind::Literal(_) => "literal",
            NodeKind::DefaultValue => "default-value",
            NodeKind::Variable(_) => "variable",
            NodeKind::Field(_) => "field",
            NodeKind::ArrayElement => "array-element",
            NodeKind::Invocation { .. } => "invocation",
            NodeKind::NewObject { .. } => "new-object",
            NodeKind::NewElementReference { .. } => "new-element-reference",
            NodeKind::Retarget { .. } => "retarget",
            NodeKind::ReferenceOf => "reference-of",
            NodeKind::Binary(_) => "binary",
            NodeKind::Unary(_) => "unary",
            NodeKind::Comma => "comma",
            NodeKind::Conditional => "conditional",
        }
    }
}

/// One arena entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub static_type: Option<TypeRef>,
    /// Set by the source when the expression is a compile-time constant
    #[serde(default)]
    pub constant: bool,
}

impl Node {
    pub fn new(kind: NodeKind, children: Vec<NodeId>, static_type: Option<TypeRef>) -> Self {
        Self {
            kind,
            children,
            parent: None,
            static_type,
            constant: false,
        }
    }
}
