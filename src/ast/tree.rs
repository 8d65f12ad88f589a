//! Arena-backed function tree
//!
//! All nodes of one function live in a single `Vec<Node>`. Structural changes
//! go through [`Tree::replace`], [`Tree::insert_child`] and
//! [`Tree::take_children`], which keep parent links consistent and bump the
//! tree version. Replaced nodes stay in the arena detached from the root.

use super::node::{Node, NodeId, NodeKind, Variable, VariableId};
use super::types::TypeRef;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Arena tree for one function body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
    variables: Vec<Variable>,
    root: NodeId,
    #[serde(default)]
    version: u64,
}

/// Value fingerprint of a subtree
///
/// Two keys are equal iff the subtrees have the same kinds, payloads, static
/// types and children, regardless of where they live in the arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    kind: NodeKind,
    static_type: Option<TypeRef>,
    children: Vec<StructuralKey>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding an empty function body
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::FunctionBody, Vec::new(), None)],
            variables: Vec::new(),
            root: NodeId(0),
            version: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Structural version, incremented by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self.node(id).children.get(position).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn static_type(&self, id: NodeId) -> Option<&TypeRef> {
        self.node(id).static_type.as_ref()
    }

    pub fn is_constant(&self, id: NodeId) -> bool {
        self.node(id).constant
    }

    pub fn set_constant(&mut self, id: NodeId, constant: bool) {
        self.nodes[id.index()].constant = constant;
    }

    /// Add a detached node owning `children`
    ///
    /// The children must themselves be detached (freshly built or taken from a
    /// node with [`Tree::take_children`]).
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        children: Vec<NodeId>,
        static_type: Option<TypeRef>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for &child in &children {
            debug_assert!(
                self.nodes[child.index()].parent.is_none(),
                "child {} is already attached",
                child
            );
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node::new(kind, children, static_type));
        id
    }

    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(variable);
        id
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableId(i as u32), v))
    }

    /// Parameter variables ordered by parameter index
    pub fn parameters(&self) -> Vec<(usize, VariableId)> {
        let mut params: Vec<(usize, VariableId)> = self
            .variables()
            .filter_map(|(id, v)| v.parameter_index().map(|index| (index, id)))
            .collect();
        params.sort();
        params
    }

    /// Parent of `id` and the position of `id` in the parent's children
    pub fn position_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let position = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, position))
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether `id` is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_ancestor_or_self(self.root, id)
    }

    fn check_graftable(&self, parent: NodeId, replacement: NodeId) -> Result<()> {
        if replacement.index() >= self.nodes.len() {
            return Err(Error::tree(format!("node {} does not exist", replacement)));
        }
        if self.parent(replacement).is_some() || replacement == self.root {
            return Err(Error::tree(format!(
                "replacement {} is already attached to the tree",
                replacement
            )));
        }
        if self.is_ancestor_or_self(replacement, parent) {
            return Err(Error::tree(format!(
                "grafting {} under {} would create a cycle",
                replacement, parent
            )));
        }
        Ok(())
    }

    /// Replace `node` with the detached subtree `replacement` at the same position
    pub fn replace(&mut self, node: NodeId, replacement: NodeId) -> Result<NodeId> {
        if node == replacement {
            return Err(Error::tree(format!("cannot replace {} with itself", node)));
        }
        let (parent, position) = self.position_in_parent(node).ok_or_else(|| {
            Error::tree(format!("node {} has no parent and cannot be replaced", node))
        })?;
        self.check_graftable(parent, replacement)?;

        self.nodes[parent.index()].children[position] = replacement;
        self.nodes[replacement.index()].parent = Some(parent);
        self.nodes[node.index()].parent = None;
        self.version += 1;
        Ok(replacement)
    }

    /// Insert the detached subtree `child` at `position` in `parent`
    pub fn insert_child(&mut self, parent: NodeId, position: usize, child: NodeId) -> Result<()> {
        self.check_graftable(parent, child)?;
        let len = self.children(parent).len();
        if position > len {
            return Err(Error::tree(format!(
                "position {} out of range for {} with {} children",
                position, parent, len
            )));
        }
        self.nodes[parent.index()].children.insert(position, child);
        self.nodes[child.index()].parent = Some(parent);
        self.version += 1;
        Ok(())
    }

    /// Detach and return all children of `id`
    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for &child in &children {
            self.nodes[child.index()].parent = None;
        }
        if !children.is_empty() {
            self.version += 1;
        }
        children
    }

    /// Pre-order list of `id` and all of its descendants
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Whether any node in the subtree rooted at `id` satisfies `pred`
    pub fn any_in_subtree(&self, id: NodeId, mut pred: impl FnMut(&Node) -> bool) -> bool {
        self.descendants(id).into_iter().any(|n| pred(self.node(n)))
    }

    pub fn structural_key(&self, id: NodeId) -> StructuralKey {
        let node = self.node(id);
        StructuralKey {
            kind: node.kind.clone(),
            static_type: node.static_type.clone(),
            children: node
                .children
                .iter()
                .map(|&c| self.structural_key(c))
                .collect(),
        }
    }

    pub fn structurally_equal(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (left, right) = (self.node(a), self.node(b));
        left.kind == right.kind
            && left.static_type == right.static_type
            && left.children.len() == right.children.len()
            && left
                .children
                .iter()
                .zip(&right.children)
                .all(|(&l, &r)| self.structurally_equal(l, r))
    }

    /// Rebuild parent links from child lists and reject malformed arenas
    ///
    /// Trees read from JSON are relinked before use.
    pub fn relink(&mut self) -> Result<()> {
        if self.root.index() >= self.nodes.len() {
            return Err(Error::tree(format!("root {} does not exist", self.root)));
        }
        for node in &mut self.nodes {
            node.parent = None;
        }
        for index in 0..self.nodes.len() {
            let parent = NodeId(index as u32);
            for position in 0..self.nodes[index].children.len() {
                let child = self.nodes[index].children[position];
                if child.index() >= self.nodes.len() {
                    return Err(Error::tree(format!(
                        "{} references missing child {}",
                        parent, child
                    )));
                }
                if child == self.root || self.nodes[child.index()].parent.is_some() {
                    return Err(Error::tree(format!("{} has more than one parent", child)));
                }
                self.nodes[child.index()].parent = Some(parent);
            }
        }
        for node in &self.nodes {
            let variable = match &node.kind {
                NodeKind::Variable(v) | NodeKind::VariableDeclarator { variable: v } => Some(*v),
                _ => None,
            };
            if let Some(v) = variable {
                if v.index() >= self.variables.len() {
                    return Err(Error::tree(format!("unknown variable {}", v)));
                }
            }
        }
        Ok(())
    }

    /// Split a try node into its blocks
    pub fn try_parts(&self, id: NodeId) -> Option<TryParts> {
        let NodeKind::Try {
            has_catch,
            has_finally,
        } = *self.kind(id)
        else {
            return None;
        };
        let children = self.children(id);
        let body = *children.first()?;
        let catch = if has_catch { children.get(1).copied() } else { None };
        let finally = if has_finally { children.last().copied() } else { None };
        Some(TryParts {
            body,
            catch,
            finally,
        })
    }

    /// Receiver of an invocation, if it has one
    pub fn call_receiver(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Invocation { has_this: true, .. } => self.children(id).first().copied(),
            _ => None,
        }
    }

    /// Argument list of an invocation or constructor call, excluding the receiver
    pub fn call_arguments(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            NodeKind::Invocation { has_this, .. } => {
                let skip = usize::from(*has_this);
                &self.children(id)[skip.min(self.children(id).len())..]
            }
            NodeKind::NewObject { .. } => self.children(id),
            _ => &[],
        }
    }
}

/// Blocks of a try statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryParts {
    pub body: NodeId,
    pub catch: Option<NodeId>,
    pub finally: Option<NodeId>,
}
