//! Tree traversal with ancestor tracking and in-place replacement
//!
//! A [`Visitor`] gets one handler per node kind. Default handlers descend into
//! children; an overriding handler only descends if it calls
//! [`Walk::visit_children`] itself, which lets it skip subtrees.
//!
//! A handler may swap the node it is visiting for a detached subtree with
//! [`Walk::replace`]. The replacement takes the original's position and is
//! visited immediately, so the original is never revisited and the
//! replacement can trigger further rewrites.

use super::node::{NodeId, NodeKind};
use super::tree::Tree;
use crate::error::Result;

/// Traversal state visible to handlers
#[derive(Debug, Clone, Default)]
pub struct VisitContext {
    /// Enclosing nodes, outermost first
    ancestors: Vec<NodeId>,
    /// Enclosing invocations and constructor calls, outermost first
    calls: Vec<NodeId>,
    /// Loop nesting inside the innermost function scope
    loop_depth: usize,
    /// Loop depths of the enclosing scopes suspended by lambdas
    suspended_loop_depths: Vec<usize>,
}

impl VisitContext {
    /// Direct parent of the node being visited
    pub fn parent(&self) -> Option<NodeId> {
        self.ancestors.last().copied()
    }

    pub fn ancestors(&self) -> &[NodeId] {
        &self.ancestors
    }

    /// Whether the visited node is inside a loop of the current function scope
    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    pub fn loop_depth(&self) -> usize {
        self.loop_depth
    }

    /// Whether the visited node is inside a lambda body
    pub fn in_lambda(&self) -> bool {
        !self.suspended_loop_depths.is_empty()
    }

    /// Innermost enclosing invocation or constructor call
    pub fn enclosing_call(&self) -> Option<NodeId> {
        self.calls.last().copied()
    }

    /// Innermost ancestor whose kind satisfies `pred`
    pub fn closest(&self, tree: &Tree, mut pred: impl FnMut(&NodeKind) -> bool) -> Option<NodeId> {
        self.ancestors
            .iter()
            .rev()
            .copied()
            .find(|&id| pred(tree.kind(id)))
    }

    fn enter(&mut self, tree: &Tree, node: NodeId) {
        match tree.kind(node) {
            NodeKind::Loop(_) => self.loop_depth += 1,
            NodeKind::Lambda => {
                self.suspended_loop_depths.push(self.loop_depth);
                self.loop_depth = 0;
            }
            kind if kind.is_call() => self.calls.push(node),
            _ => {}
        }
        self.ancestors.push(node);
    }

    fn leave(&mut self, tree: &Tree, node: NodeId) {
        self.ancestors.pop();
        match tree.kind(node) {
            NodeKind::Loop(_) => self.loop_depth -= 1,
            NodeKind::Lambda => {
                self.loop_depth = self.suspended_loop_depths.pop().unwrap_or(0);
            }
            kind if kind.is_call() => {
                self.calls.pop();
            }
            _ => {}
        }
    }
}

/// An in-progress traversal of one tree
pub struct Walk<'t> {
    tree: &'t mut Tree,
    context: VisitContext,
}

impl<'t> Walk<'t> {
    pub fn new(tree: &'t mut Tree) -> Self {
        Self {
            tree,
            context: VisitContext::default(),
        }
    }

    /// Visit the whole tree from its root
    pub fn run<V: Visitor + ?Sized>(tree: &'t mut Tree, visitor: &mut V) -> Result<()> {
        let root = tree.root();
        Walk::new(tree).visit(visitor, root)
    }

    pub fn tree(&self) -> &Tree {
        &*self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut *self.tree
    }

    pub fn context(&self) -> &VisitContext {
        &self.context
    }

    /// Dispatch `node` to the visitor's handler for its kind
    pub fn visit<V: Visitor + ?Sized>(&mut self, visitor: &mut V, node: NodeId) -> Result<()> {
        visitor.visit_node(self, node)
    }

    /// Visit the children of `node` in order
    ///
    /// Children are looked up by position after each visit, so a child that
    /// was replaced while being visited is not visited again.
    pub fn visit_children<V: Visitor + ?Sized>(
        &mut self,
        visitor: &mut V,
        node: NodeId,
    ) -> Result<()> {
        self.context.enter(self.tree, node);
        let mut position = 0;
        let result = loop {
            let Some(child) = self.tree.child(node, position) else {
                break Ok(());
            };
            if let Err(err) = self.visit(visitor, child) {
                break Err(err);
            }
            position += 1;
        };
        self.context.leave(self.tree, node);
        result
    }

    /// Replace the node being visited and continue into the replacement
    ///
    /// Returns whatever occupies the original position once the replacement
    /// has been visited (it may have been replaced again).
    pub fn replace<V: Visitor + ?Sized>(
        &mut self,
        visitor: &mut V,
        node: NodeId,
        replacement: NodeId,
    ) -> Result<NodeId> {
        let (parent, position) = self
            .tree
            .position_in_parent(node)
            .ok_or_else(|| crate::error::Error::tree(format!("{} is not attached", node)))?;
        self.swap(node, replacement)?;
        self.visit(visitor, replacement)?;
        Ok(self.tree.child(parent, position).unwrap_or(replacement))
    }

    /// Replace a node with a subtree this walk has already visited
    ///
    /// Used after [`Walk::visit_children`] to splice in one of the node's own
    /// former descendants. The replacement is not visited again.
    pub fn replace_visited(&mut self, node: NodeId, replacement: NodeId) -> Result<()> {
        self.swap(node, replacement)
    }

    fn swap(&mut self, node: NodeId, replacement: NodeId) -> Result<()> {
        self.tree.replace(node, replacement)?;
        log::trace!(
            "replaced {} ({}) with {} ({})",
            node,
            self.tree.kind(node).label(),
            replacement,
            self.tree.kind(replacement).label()
        );
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Handler {
    FunctionBody,
    Loop,
    Try,
    Lambda,
    Invocation,
    NewObject,
    NewElementReference,
    Retarget,
    Variable,
    Binary,
    Other,
}

impl Handler {
    fn for_kind(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::FunctionBody => Handler::FunctionBody,
            NodeKind::Loop(_) => Handler::Loop,
            NodeKind::Try { .. } => Handler::Try,
            NodeKind::Lambda => Handler::Lambda,
            NodeKind::Invocation { .. } => Handler::Invocation,
            NodeKind::NewObject { .. } => Handler::NewObject,
            NodeKind::NewElementReference { .. } => Handler::NewElementReference,
            NodeKind::Retarget { .. } => Handler::Retarget,
            NodeKind::Variable(_) => Handler::Variable,
            NodeKind::Binary(_) => Handler::Binary,
            _ => Handler::Other,
        }
    }
}

/// Per-kind handlers; every default descends into the children
pub trait Visitor {
    fn visit_node(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        match Handler::for_kind(walk.tree().kind(node)) {
            Handler::FunctionBody => self.visit_function_body(walk, node),
            Handler::Loop => self.visit_loop(walk, node),
            Handler::Try => self.visit_try(walk, node),
            Handler::Lambda => self.visit_lambda(walk, node),
            Handler::Invocation => self.visit_invocation(walk, node),
            Handler::NewObject => self.visit_new_object(walk, node),
            Handler::NewElementReference => self.visit_new_element_reference(walk, node),
            Handler::Retarget => self.visit_retarget(walk, node),
            Handler::Variable => self.visit_variable(walk, node),
            Handler::Binary => self.visit_binary(walk, node),
            Handler::Other => self.visit_other(walk, node),
        }
    }

    fn visit_function_body(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_loop(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_try(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_lambda(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_invocation(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_new_object(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_new_element_reference(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_retarget(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_variable(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_binary(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }

    fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Literal, PrimitiveType, TypeRef};

    fn int() -> TypeRef {
        TypeRef::Primitive(PrimitiveType::Int32)
    }

    /// Records every visited literal and the loop depth it was seen at
    #[derive(Default)]
    struct LiteralRecorder {
        seen: Vec<(NodeId, usize)>,
    }

    impl Visitor for LiteralRecorder {
        fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
            if matches!(walk.tree().kind(node), NodeKind::Literal(_)) {
                self.seen.push((node, walk.context().loop_depth()));
            }
            walk.visit_children(self, node)
        }
    }

    /// Rewrites `1` to `2` and `2` to `3`, so a single `1` ends as `3`
    #[derive(Default)]
    struct Increment {
        visited: Vec<NodeId>,
    }

    impl Visitor for Increment {
        fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
            self.visited.push(node);
            if let NodeKind::Literal(Literal::Int(v)) = *walk.tree().kind(node) {
                if v < 3 {
                    let next = walk.tree_mut().int(v + 1);
                    walk.replace(self, node, next)?;
                    return Ok(());
                }
            }
            walk.visit_children(self, node)
        }
    }

    /// Replaces single-statement blocks by their statement
    #[derive(Default)]
    struct Unwrap {
        visited: Vec<NodeId>,
    }

    impl Visitor for Unwrap {
        fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
            self.visited.push(node);
            walk.visit_children(self, node)?;
            if *walk.tree().kind(node) == NodeKind::Block && walk.tree().children(node).len() == 1 {
                let inner = walk.tree_mut().take_children(node)[0];
                walk.replace_visited(node, inner)?;
            }
            Ok(())
        }
    }

    /// Does not descend into binary operators
    struct SkipBinary {
        literals: usize,
    }

    impl Visitor for SkipBinary {
        fn visit_binary(&mut self, _walk: &mut Walk<'_>, _node: NodeId) -> Result<()> {
            Ok(())
        }

        fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
            if matches!(walk.tree().kind(node), NodeKind::Literal(_)) {
                self.literals += 1;
            }
            walk.visit_children(self, node)
        }
    }

    #[test]
    fn test_document_order_and_loop_depth() {
        let mut tree = Tree::new();
        let outer = tree.int(0);
        let outer_stmt = tree.expr_stmt(outer);
        let cond = tree.int(1);
        let inner = tree.int(2);
        let inner_stmt = tree.expr_stmt(inner);
        let body = tree.block(vec![inner_stmt]);
        let lp = tree.while_loop(cond, body);
        tree.push_statement(outer_stmt).unwrap();
        tree.push_statement(lp).unwrap();

        let mut recorder = LiteralRecorder::default();
        Walk::run(&mut tree, &mut recorder).unwrap();

        assert_eq!(recorder.seen, vec![(outer, 0), (cond, 1), (inner, 1)]);
    }

    #[test]
    fn test_replacement_is_revisited_and_original_is_not() {
        let mut tree = Tree::new();
        let one = tree.int(1);
        let stmt = tree.expr_stmt(one);
        tree.push_statement(stmt).unwrap();

        let mut visitor = Increment::default();
        Walk::run(&mut tree, &mut visitor).unwrap();

        let final_child = tree.child(stmt, 0).unwrap();
        assert_eq!(*tree.kind(final_child), NodeKind::Literal(Literal::Int(3)));
        assert_eq!(visitor.visited.iter().filter(|&&n| n == one).count(), 1);
        assert!(visitor.visited.contains(&final_child));
        assert!(!tree.is_attached(one));
    }

    #[test]
    fn test_replace_visited_does_not_revisit() {
        let mut tree = Tree::new();
        let value = tree.int(4);
        let stmt = tree.expr_stmt(value);
        let block = tree.block(vec![stmt]);
        tree.push_statement(block).unwrap();

        let mut visitor = Unwrap::default();
        Walk::run(&mut tree, &mut visitor).unwrap();

        assert_eq!(tree.children(tree.root()), &[stmt]);
        assert!(!tree.is_attached(block));
        assert_eq!(visitor.visited.iter().filter(|&&n| n == stmt).count(), 1);
    }

    #[test]
    fn test_handler_can_skip_subtree() {
        let mut tree = Tree::new();
        let a = tree.int(5);
        let b = tree.int(6);
        let add = tree.binary(BinaryOp::Add, a, b, int());
        let stmt = tree.expr_stmt(add);
        let c = tree.int(7);
        let stmt2 = tree.expr_stmt(c);
        tree.push_statement(stmt).unwrap();
        tree.push_statement(stmt2).unwrap();

        let mut visitor = SkipBinary { literals: 0 };
        Walk::run(&mut tree, &mut visitor).unwrap();
        assert_eq!(visitor.literals, 1);
    }

    #[test]
    fn test_lambda_resets_loop_depth() {
        let mut tree = Tree::new();
        let inside = tree.int(9);
        let inside_stmt = tree.expr_stmt(inside);
        let lambda_body = tree.block(vec![inside_stmt]);
        let lambda = tree.lambda(lambda_body);
        let lambda_stmt = tree.expr_stmt(lambda);
        let body = tree.block(vec![lambda_stmt]);
        let cond = tree.int(1);
        let lp = tree.while_loop(cond, body);
        tree.push_statement(lp).unwrap();

        let mut recorder = LiteralRecorder::default();
        Walk::run(&mut tree, &mut recorder).unwrap();
        assert!(recorder.seen.contains(&(inside, 0)));
    }
}
