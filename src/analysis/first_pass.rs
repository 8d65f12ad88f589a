//! First analysis pass: definitions, uses and aliasing
//!
//! A single read-only traversal that records, for every variable, how often it
//! is defined and used, whether its address is taken, whether a lambda
//! captures it and which other variables receive copies of it. It also
//! collects the call, return, throw and store sites the second pass walks.

use crate::ast::{
    BinaryOp, Dispatch, FieldRef, MethodRef, NodeId, NodeKind, Tree, VariableId, VariableKind,
};
use crate::program::Function;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Def/use summary for one variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableUsage {
    pub definitions: usize,
    pub uses: usize,
    pub address_taken: bool,
    pub captured: bool,
    /// Variables that were assigned this variable's value
    pub aliases: BTreeSet<VariableId>,
}

/// Location written by a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StoreTarget {
    Variable(VariableId),
    /// Write through a by-ref parameter into the caller's storage
    ByRefParameter(VariableId),
    Field {
        field: FieldRef,
        receiver: Option<NodeId>,
    },
    ArrayElement,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSite {
    pub node: NodeId,
    pub target: StoreTarget,
    /// Stored value; `None` for increments and decrements
    pub value: Option<NodeId>,
}

/// An invocation or constructor call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub node: NodeId,
    pub method: MethodRef,
    pub dispatch: Dispatch,
    pub receiver: Option<NodeId>,
    pub arguments: Vec<NodeId>,
}

/// `ReferenceOf` applied directly to a variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSite {
    pub node: NodeId,
    pub variable: VariableId,
    /// The reference is passed straight into a call
    pub call_argument: bool,
}

/// Facts produced by the first pass over one function
#[derive(Debug, Clone, Serialize)]
pub struct FirstPassFacts {
    /// Tree version the facts were computed from
    pub version: u64,
    pub variables: BTreeMap<VariableId, VariableUsage>,
    pub calls: Vec<CallSite>,
    pub returns: Vec<NodeId>,
    pub throws: Vec<NodeId>,
    pub stores: Vec<StoreSite>,
    pub references: Vec<ReferenceSite>,
    pub mutable_static_reads: Vec<NodeId>,
    pub loop_count: usize,
}

impl FirstPassFacts {
    pub fn usage(&self, variable: VariableId) -> Option<&VariableUsage> {
        self.variables.get(&variable)
    }

    /// Whether a variable is written after its initial definition
    pub fn is_reassigned(&self, tree: &Tree, variable: VariableId) -> bool {
        let definitions = self.usage(variable).map_or(0, |u| u.definitions);
        match tree.variable(variable).kind {
            VariableKind::Parameter { .. } | VariableKind::This => definitions > 0,
            VariableKind::Local | VariableKind::Hoisted => definitions > 1,
        }
    }

    /// `variable` plus every variable its value was copied into, transitively
    pub fn alias_closure(&self, variable: VariableId) -> BTreeSet<VariableId> {
        let mut closure = BTreeSet::new();
        let mut queue = VecDeque::from([variable]);
        while let Some(current) = queue.pop_front() {
            if !closure.insert(current) {
                continue;
            }
            if let Some(usage) = self.usage(current) {
                queue.extend(usage.aliases.iter().copied());
            }
        }
        closure
    }
}

/// Variables an expression may evaluate to (or to a reference to)
pub fn yielded_variables(tree: &Tree, node: NodeId) -> Vec<VariableId> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let children = tree.children(current);
        match tree.kind(current) {
            NodeKind::Variable(v) => out.push(*v),
            NodeKind::Comma => stack.extend(children.last().copied()),
            NodeKind::Conditional => stack.extend(children.iter().skip(1).copied()),
            NodeKind::ReferenceOf => stack.extend(children.first().copied()),
            NodeKind::Binary(BinaryOp::Assign) => stack.extend(children.get(1).copied()),
            _ => {}
        }
    }
    out
}

/// Run the first pass over a function
pub fn analyze(function: &Function) -> FirstPassFacts {
    let tree = &function.tree;
    let mut collector = Collector {
        tree,
        facts: FirstPassFacts {
            version: tree.version(),
            variables: tree
                .variables()
                .map(|(id, _)| (id, VariableUsage::default()))
                .collect(),
            calls: Vec::new(),
            returns: Vec::new(),
            throws: Vec::new(),
            stores: Vec::new(),
            references: Vec::new(),
            mutable_static_reads: Vec::new(),
            loop_count: 0,
        },
        lambda_depth: 0,
    };
    collector.walk(tree.root());
    log::trace!(
        "first pass for {}: {} calls, {} stores, {} loops",
        function.id,
        collector.facts.calls.len(),
        collector.facts.stores.len(),
        collector.facts.loop_count
    );
    collector.facts
}

struct Collector<'t> {
    tree: &'t Tree,
    facts: FirstPassFacts,
    lambda_depth: usize,
}

impl Collector<'_> {
    fn usage_mut(&mut self, variable: VariableId) -> &mut VariableUsage {
        self.facts.variables.entry(variable).or_default()
    }

    fn walk_children(&mut self, node: NodeId) {
        for &child in self.tree.children(node) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: NodeId) {
        let tree = self.tree;
        let children = tree.children(node);
        match tree.kind(node) {
            NodeKind::Variable(v) => {
                let captured = self.lambda_depth > 0;
                let usage = self.usage_mut(*v);
                usage.uses += 1;
                usage.captured |= captured;
            }
            NodeKind::VariableDeclarator { variable } => {
                if let Some(&init) = children.first() {
                    self.usage_mut(*variable).definitions += 1;
                    self.record_copy(init, *variable);
                    self.walk(init);
                }
            }
            NodeKind::Binary(BinaryOp::Assign) if children.len() == 2 => {
                let (target, value) = (children[0], children[1]);
                self.record_store(node, target, Some(value));
                self.walk(value);
            }
            NodeKind::Unary(op) if op.is_mutating() && children.len() == 1 => {
                let operand = children[0];
                self.record_store(node, operand, None);
                // the operand is also read
                self.walk(operand);
            }
            NodeKind::ReferenceOf => {
                if let Some(&target) = children.first() {
                    if let NodeKind::Variable(v) = tree.kind(target) {
                        let call_argument = tree
                            .parent(node)
                            .is_some_and(|p| tree.call_arguments(p).contains(&node));
                        self.usage_mut(*v).address_taken = true;
                        self.facts.references.push(ReferenceSite {
                            node,
                            variable: *v,
                            call_argument,
                        });
                    }
                }
                self.walk_children(node);
            }
            NodeKind::Field(field) => {
                if field.is_mutable_static() {
                    self.facts.mutable_static_reads.push(node);
                }
                self.walk_children(node);
            }
            NodeKind::Invocation {
                method, dispatch, ..
            } => {
                self.facts.calls.push(CallSite {
                    node,
                    method: method.clone(),
                    dispatch: *dispatch,
                    receiver: tree.call_receiver(node),
                    arguments: tree.call_arguments(node).to_vec(),
                });
                self.walk_children(node);
            }
            NodeKind::NewObject { constructor } => {
                self.facts.calls.push(CallSite {
                    node,
                    method: MethodRef::Member(constructor.clone()),
                    dispatch: Dispatch::Direct,
                    receiver: None,
                    arguments: children.to_vec(),
                });
                self.walk_children(node);
            }
            NodeKind::Return => {
                self.facts.returns.extend(children.first().copied());
                self.walk_children(node);
            }
            NodeKind::Throw => {
                self.facts.throws.extend(children.first().copied());
                self.walk_children(node);
            }
            NodeKind::Loop(_) => {
                self.facts.loop_count += 1;
                self.walk_children(node);
            }
            NodeKind::Lambda => {
                self.lambda_depth += 1;
                self.walk_children(node);
                self.lambda_depth -= 1;
            }
            _ => self.walk_children(node),
        }
    }

    /// Record `value` flowing into `variable`
    fn record_copy(&mut self, value: NodeId, variable: VariableId) {
        for source in yielded_variables(self.tree, value) {
            if source != variable {
                self.usage_mut(source).aliases.insert(variable);
            }
        }
    }

    fn record_store(&mut self, node: NodeId, target: NodeId, value: Option<NodeId>) {
        let tree = self.tree;
        let store_target = match tree.kind(target) {
            NodeKind::Variable(v) => {
                let variable = tree.variable(*v);
                let by_ref_parameter = variable.ty.is_by_ref()
                    && matches!(variable.kind, VariableKind::Parameter { .. });
                let captured = self.lambda_depth > 0;
                let usage = self.usage_mut(*v);
                usage.definitions += 1;
                usage.captured |= captured;
                if let Some(value) = value {
                    self.record_copy(value, *v);
                }
                if by_ref_parameter {
                    StoreTarget::ByRefParameter(*v)
                } else {
                    StoreTarget::Variable(*v)
                }
            }
            NodeKind::Field(field) => {
                // the receiver is read, the field itself is written
                self.walk_children(target);
                StoreTarget::Field {
                    field: field.clone(),
                    receiver: tree.children(target).first().copied(),
                }
            }
            NodeKind::ArrayElement => {
                self.walk_children(target);
                StoreTarget::ArrayElement
            }
            _ => {
                self.walk(target);
                StoreTarget::Other
            }
        };
        self.facts.stores.push(StoreSite {
            node,
            target: store_target,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PrimitiveType, QualifiedMemberId, TypeRef};

    fn int() -> TypeRef {
        TypeRef::Primitive(PrimitiveType::Int32)
    }

    fn function(tree: Tree) -> Function {
        Function::new(QualifiedMemberId::new("Demo.Program", "Test", "()"), tree)
    }

    #[test]
    fn test_counts_definitions_and_uses() {
        let mut tree = Tree::new();
        let p = tree.parameter("p", 0, int());
        let x = tree.local("x", int());

        let p_read = tree.var(p);
        let decl = tree.declare(x, Some(p_read));
        let x_target = tree.var(x);
        let one = tree.int(1);
        let assign = tree.assign(x_target, one);
        let assign_stmt = tree.expr_stmt(assign);
        let x_read = tree.var(x);
        let ret = tree.ret(Some(x_read));
        tree.push_statement(decl).unwrap();
        tree.push_statement(assign_stmt).unwrap();
        tree.push_statement(ret).unwrap();

        let facts = analyze(&function(tree.clone()));
        let x_usage = facts.usage(x).unwrap();
        assert_eq!(x_usage.definitions, 2);
        assert_eq!(x_usage.uses, 1);
        assert!(facts.is_reassigned(&tree, x));
        assert!(!facts.is_reassigned(&tree, p));
        assert_eq!(facts.alias_closure(p), BTreeSet::from([p, x]));
        assert_eq!(facts.returns, vec![x_read]);
    }

    #[test]
    fn test_reference_outside_call_marks_address_taken() {
        let mut tree = Tree::new();
        let x = tree.local("x", int());
        let y = tree.local("y", TypeRef::by_ref(int()));
        let x_read = tree.var(x);
        let reference = tree.reference_of(x_read);
        let y_target = tree.var(y);
        let assign = tree.assign(y_target, reference);
        let stmt = tree.expr_stmt(assign);
        tree.push_statement(stmt).unwrap();

        let facts = analyze(&function(tree));
        assert!(facts.usage(x).unwrap().address_taken);
        assert_eq!(facts.references.len(), 1);
        assert!(!facts.references[0].call_argument);
    }

    #[test]
    fn test_lambda_use_marks_captured() {
        let mut tree = Tree::new();
        let x = tree.local("x", int());
        let x_read = tree.var(x);
        let stmt = tree.expr_stmt(x_read);
        let body = tree.block(vec![stmt]);
        let lambda = tree.lambda(body);
        let lambda_stmt = tree.expr_stmt(lambda);
        tree.push_statement(lambda_stmt).unwrap();

        let facts = analyze(&function(tree));
        assert!(facts.usage(x).unwrap().captured);
    }

    #[test]
    fn test_collects_static_reads_and_stores() {
        let mut tree = Tree::new();
        let counter = crate::ast::FieldRef::static_field("Demo.Program", "counter");
        let read = tree.static_field(counter.clone(), int());
        let read_stmt = tree.expr_stmt(read);
        let target = tree.static_field(counter, int());
        let one = tree.int(1);
        let write = tree.assign(target, one);
        let write_stmt = tree.expr_stmt(write);
        tree.push_statement(read_stmt).unwrap();
        tree.push_statement(write_stmt).unwrap();

        let facts = analyze(&function(tree));
        // the store target is not a read
        assert_eq!(facts.mutable_static_reads, vec![read]);
        assert!(matches!(
            facts.stores[0].target,
            StoreTarget::Field { ref field, receiver: None } if field.is_static
        ));
    }
}
