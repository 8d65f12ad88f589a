//! Dead finally block elimination
//!
//! A `try { body } finally { ... }` without a catch is replaced by its body
//! when every finally statement is an expression statement with no
//! observable effect. The finally is removed in full or not at all.

use super::{OptimizationPass, PassContext};
use crate::analysis::CallResolver;
use crate::ast::{BinaryOp, Literal, Node, NodeId, NodeKind, Tree, Visitor, Walk};
use crate::error::Result;
use crate::program::{Function, TypeSystem};
use crate::translator::PassConfig;

pub struct DeadFinallyEliminationPass;

impl OptimizationPass for DeadFinallyEliminationPass {
    fn name(&self) -> &'static str {
        "dead-finally-elimination"
    }

    fn should_run(&self, config: &PassConfig) -> bool {
        config.eliminate_dead_finally
    }

    fn run(&self, function: &mut Function, ctx: &PassContext<'_, '_>) -> Result<bool> {
        let resolver = ctx.engine.resolver(&function.id);
        let mut eliminator = DeadFinallyEliminator {
            types: ctx.types,
            resolver: &resolver,
            removed: 0,
        };
        Walk::run(&mut function.tree, &mut eliminator)?;
        if eliminator.removed > 0 {
            log::debug!(
                "removed {} dead finally blocks in {}",
                eliminator.removed,
                function.id
            );
        }
        Ok(eliminator.removed > 0)
    }
}

struct DeadFinallyEliminator<'a> {
    types: &'a TypeSystem,
    resolver: &'a dyn CallResolver,
    removed: usize,
}

impl DeadFinallyEliminator<'_> {
    fn finally_is_dead(&self, tree: &Tree, finally: NodeId) -> bool {
        let statements = match tree.kind(finally) {
            NodeKind::Block => tree.children(finally),
            _ => std::slice::from_ref(&finally),
        };
        statements.iter().all(|&statement| {
            let NodeKind::ExpressionStatement = tree.kind(statement) else {
                return false;
            };
            let Some(&expression) = tree.children(statement).first() else {
                return true;
            };
            !reads_mutable_state(tree, expression) && self.is_effectively_constant(tree, expression)
        })
    }

    fn is_effectively_constant(&self, tree: &Tree, expression: NodeId) -> bool {
        if tree.is_constant(expression) {
            return true;
        }
        match tree.kind(expression) {
            NodeKind::Literal(_) | NodeKind::DefaultValue => true,
            NodeKind::Invocation {
                method, dispatch, ..
            } => {
                let operands_clean = tree
                    .children(expression)
                    .iter()
                    .all(|&operand| is_side_effect_free(tree, operand));
                operands_clean
                    && !dereferences_null(tree, tree.node(expression))
                    && (self.resolver.is_pure_call(method, *dispatch)
                        || self.is_pure_disposal(tree, expression))
            }
            _ => false,
        }
    }

    /// `Dispose` on a type declared free of disposal side effects
    fn is_pure_disposal(&self, tree: &Tree, call: NodeId) -> bool {
        let NodeKind::Invocation { method, .. } = tree.kind(call) else {
            return false;
        };
        if method.name() != "Dispose" {
            return false;
        }
        let declared = method
            .member()
            .is_some_and(|id| self.types.has_pure_disposal(&id.declaring_type));
        let receiver = tree
            .call_receiver(call)
            .and_then(|receiver| tree.static_type(receiver))
            .is_some_and(|ty| self.types.has_pure_disposal(&ty.name()));
        declared || receiver
    }
}

fn reads_mutable_state(tree: &Tree, expression: NodeId) -> bool {
    tree.any_in_subtree(expression, |node| {
        matches!(&node.kind, NodeKind::Field(field) if field.is_mutable_static())
    })
}

/// Member access through a `null` literal throws
fn dereferences_null(tree: &Tree, node: &Node) -> bool {
    let has_receiver = match &node.kind {
        NodeKind::Field(field) => !field.is_static,
        NodeKind::Invocation { has_this, .. } => *has_this,
        _ => false,
    };
    has_receiver
        && node
            .children
            .first()
            .is_some_and(|&receiver| *tree.kind(receiver) == NodeKind::Literal(Literal::Null))
}

/// Evaluating the expression can neither write anything nor throw
fn is_side_effect_free(tree: &Tree, expression: NodeId) -> bool {
    !tree.any_in_subtree(expression, |node| match &node.kind {
        NodeKind::Literal(_)
        | NodeKind::DefaultValue
        | NodeKind::Variable(_)
        | NodeKind::ReferenceOf
        | NodeKind::Comma
        | NodeKind::Conditional => false,
        NodeKind::Field(field) => field.is_mutable_static() || dereferences_null(tree, node),
        NodeKind::Binary(op) => matches!(op, BinaryOp::Assign | BinaryOp::Div | BinaryOp::Rem),
        NodeKind::Unary(op) => op.is_mutating(),
        _ => true,
    })
}

impl Visitor for DeadFinallyEliminator<'_> {
    fn visit_try(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)?;

        let Some(parts) = walk.tree().try_parts(node) else {
            return Ok(());
        };
        // with a catch the finally's ordering against unwinding stays observable
        if parts.catch.is_some() {
            return Ok(());
        }
        let Some(finally) = parts.finally else {
            return Ok(());
        };
        if !self.finally_is_dead(walk.tree(), finally) {
            return Ok(());
        }

        walk.tree_mut().take_children(node);
        walk.replace_visited(node, parts.body)?;
        self.removed += 1;
        log::trace!("replaced try {} with its body {}", node, parts.body);
        Ok(())
    }
}
