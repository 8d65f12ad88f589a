//! Node construction helpers
//!
//! Every helper returns a detached node; attach it with
//! [`Tree::push_statement`] or as a child of another helper.

use super::node::{
    BinaryOp, Literal, LoopKind, NodeId, NodeKind, UnaryOp, Variable, VariableId, VariableKind,
};
use super::tree::Tree;
use super::types::{Dispatch, FieldRef, MethodRef, PrimitiveType, QualifiedMemberId, TypeRef};
use crate::error::Result;

impl Tree {
    /// Declare parameter `index`
    pub fn parameter(&mut self, name: impl Into<String>, index: usize, ty: TypeRef) -> VariableId {
        self.add_variable(Variable {
            name: name.into(),
            ty,
            kind: VariableKind::Parameter { index },
        })
    }

    pub fn local(&mut self, name: impl Into<String>, ty: TypeRef) -> VariableId {
        self.add_variable(Variable {
            name: name.into(),
            ty,
            kind: VariableKind::Local,
        })
    }

    pub fn this_variable(&mut self, ty: TypeRef) -> VariableId {
        self.add_variable(Variable {
            name: "this".to_string(),
            ty,
            kind: VariableKind::This,
        })
    }

    /// Append a statement to the function body
    pub fn push_statement(&mut self, statement: NodeId) -> Result<()> {
        let root = self.root();
        let position = self.children(root).len();
        self.insert_child(root, position, statement)
    }

    pub fn literal(&mut self, literal: Literal, ty: TypeRef) -> NodeId {
        let id = self.add_node(NodeKind::Literal(literal), Vec::new(), Some(ty));
        self.set_constant(id, true);
        id
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.literal(Literal::Int(value), TypeRef::Primitive(PrimitiveType::Int32))
    }

    pub fn null(&mut self) -> NodeId {
        self.literal(Literal::Null, TypeRef::Primitive(PrimitiveType::Object))
    }

    pub fn default_value(&mut self, ty: TypeRef) -> NodeId {
        self.add_node(NodeKind::DefaultValue, Vec::new(), Some(ty))
    }

    pub fn var(&mut self, variable: VariableId) -> NodeId {
        let ty = self.variable(variable).ty.clone();
        self.add_node(NodeKind::Variable(variable), Vec::new(), Some(ty))
    }

    pub fn field(&mut self, receiver: NodeId, field: FieldRef, ty: TypeRef) -> NodeId {
        self.add_node(NodeKind::Field(field), vec![receiver], Some(ty))
    }

    pub fn static_field(&mut self, field: FieldRef, ty: TypeRef) -> NodeId {
        self.add_node(NodeKind::Field(field), Vec::new(), Some(ty))
    }

    pub fn array_element(&mut self, array: NodeId, index: NodeId) -> NodeId {
        let ty = match self.static_type(array) {
            Some(TypeRef::Array(element)) => Some((**element).clone()),
            _ => None,
        };
        self.add_node(NodeKind::ArrayElement, vec![array, index], ty)
    }

    /// `array[index]` with both operands read from variables
    pub fn array_element_of(&mut self, array: VariableId, index: VariableId) -> NodeId {
        let array = self.var(array);
        let index = self.var(index);
        self.array_element(array, index)
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId, ty: TypeRef) -> NodeId {
        self.add_node(NodeKind::Binary(op), vec![left, right], Some(ty))
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        let ty = self.static_type(target).cloned().unwrap_or(TypeRef::Void);
        self.binary(BinaryOp::Assign, target, value, ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId, ty: TypeRef) -> NodeId {
        self.add_node(NodeKind::Unary(op), vec![operand], Some(ty))
    }

    pub fn comma(&mut self, expressions: Vec<NodeId>) -> NodeId {
        let ty = expressions
            .last()
            .and_then(|&last| self.static_type(last).cloned());
        self.add_node(NodeKind::Comma, expressions, ty)
    }

    pub fn reference_of(&mut self, target: NodeId) -> NodeId {
        let ty = self
            .static_type(target)
            .cloned()
            .map(TypeRef::by_ref);
        self.add_node(NodeKind::ReferenceOf, vec![target], ty)
    }

    /// Static call or call on a non-overridable member
    pub fn call(
        &mut self,
        method: QualifiedMemberId,
        this: Option<NodeId>,
        args: Vec<NodeId>,
        return_type: TypeRef,
    ) -> NodeId {
        self.invocation(MethodRef::Member(method), Dispatch::Direct, this, args, return_type)
    }

    pub fn invocation(
        &mut self,
        method: MethodRef,
        dispatch: Dispatch,
        this: Option<NodeId>,
        args: Vec<NodeId>,
        return_type: TypeRef,
    ) -> NodeId {
        let has_this = this.is_some();
        let children: Vec<NodeId> = this.into_iter().chain(args).collect();
        self.add_node(
            NodeKind::Invocation {
                method,
                dispatch,
                has_this,
            },
            children,
            Some(return_type),
        )
    }

    pub fn new_object(
        &mut self,
        constructor: QualifiedMemberId,
        args: Vec<NodeId>,
        ty: TypeRef,
    ) -> NodeId {
        self.add_node(NodeKind::NewObject { constructor }, args, Some(ty))
    }

    pub fn new_element_reference(&mut self, array: NodeId, index: NodeId, packed: bool) -> NodeId {
        let element = match self.static_type(array) {
            Some(TypeRef::Array(element)) => (**element).clone(),
            _ => TypeRef::Primitive(PrimitiveType::Object),
        };
        self.add_node(
            NodeKind::NewElementReference { packed },
            vec![array, index],
            Some(TypeRef::ElementReference(Box::new(element))),
        )
    }

    pub fn expr_stmt(&mut self, expression: NodeId) -> NodeId {
        self.add_node(NodeKind::ExpressionStatement, vec![expression], None)
    }

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.add_node(NodeKind::Block, statements, None)
    }

    pub fn declare(&mut self, variable: VariableId, initializer: Option<NodeId>) -> NodeId {
        let declarator = self.add_node(
            NodeKind::VariableDeclarator { variable },
            initializer.into_iter().collect(),
            None,
        );
        self.add_node(NodeKind::VariableDeclaration, vec![declarator], None)
    }

    /// `while (condition) body`
    pub fn while_loop(&mut self, condition: NodeId, body: NodeId) -> NodeId {
        self.add_node(NodeKind::Loop(LoopKind::While), vec![condition, body], None)
    }

    /// `for (init; condition; update) body`
    pub fn for_loop(
        &mut self,
        init: NodeId,
        condition: NodeId,
        update: NodeId,
        body: NodeId,
    ) -> NodeId {
        self.add_node(
            NodeKind::Loop(LoopKind::For),
            vec![init, condition, update, body],
            None,
        )
    }

    pub fn if_stmt(
        &mut self,
        condition: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    ) -> NodeId {
        let children: Vec<NodeId> = [condition, then].into_iter().chain(otherwise).collect();
        self.add_node(NodeKind::If, children, None)
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::Return, value.into_iter().collect(), None)
    }

    pub fn throw(&mut self, value: NodeId) -> NodeId {
        self.add_node(NodeKind::Throw, vec![value], None)
    }

    pub fn try_finally(&mut self, body: NodeId, finally: NodeId) -> NodeId {
        self.add_node(
            NodeKind::Try {
                has_catch: false,
                has_finally: true,
            },
            vec![body, finally],
            None,
        )
    }

    pub fn try_catch_finally(
        &mut self,
        body: NodeId,
        catch: NodeId,
        finally: Option<NodeId>,
    ) -> NodeId {
        let has_finally = finally.is_some();
        let children: Vec<NodeId> = [body, catch].into_iter().chain(finally).collect();
        self.add_node(
            NodeKind::Try {
                has_catch: true,
                has_finally,
            },
            children,
            None,
        )
    }

    pub fn lambda(&mut self, body: NodeId) -> NodeId {
        self.add_node(NodeKind::Lambda, vec![body], Some(TypeRef::class("System.Delegate")))
    }
}
