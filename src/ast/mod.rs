//! Tree model for lowered method bodies
//!
//! The module is organized into sub-modules by functionality:
//!
//! - `types`: type and member references from the source type system
//! - `node`: node kinds, variables and literals
//! - `tree`: the per-function arena with replace-by-position mutation
//! - `builder`: node construction helpers
//! - `visitor`: traversal with ancestor tracking and replacement

pub mod builder;
pub mod node;
pub mod tree;
pub mod types;
pub mod visitor;

pub use node::{
    BinaryOp, FloatBits, Literal, LoopKind, Node, NodeId, NodeKind, UnaryOp, Variable, VariableId,
    VariableKind,
};
pub use tree::{StructuralKey, Tree, TryParts};
pub use types::{Dispatch, FieldRef, MethodRef, PrimitiveType, QualifiedMemberId, TypeRef};
pub use visitor::{VisitContext, Visitor, Walk};
