//! Allocation hoisting pass
//!
//! Inside loops, struct constructions and array element references that are
//! handed to a call which does not retain them are rewritten to reuse one
//! function-level temporary instead of allocating fresh storage on every
//! iteration:
//!
//! - `new S(args)` becomes `(S::.ctor(temp, args), temp)`
//! - `&array[index]` becomes `retarget(temp, array, index)`
//!
//! Element references with structurally equal operands share one temporary,
//! unless a side effect runs between two sites feeding the same pending call.
//! All temporaries are declared in a single statement prepended to the body.

use super::{OptimizationPass, PassContext};
use crate::analysis::CallResolver;
use crate::ast::{
    BinaryOp, Dispatch, MethodRef, NodeId, NodeKind, QualifiedMemberId, StructuralKey, Tree,
    TypeRef, Variable, VariableId, VariableKind, VisitContext, Visitor, Walk,
};
use crate::error::Result;
use crate::program::{Function, TypeSystem};
use crate::translator::PassConfig;
use std::collections::HashMap;

/// Name prefix of the temporaries this pass introduces
pub const HOISTED_PREFIX: &str = "$hoisted";

pub struct HoistAllocationsPass;

impl OptimizationPass for HoistAllocationsPass {
    fn name(&self) -> &'static str {
        "hoist-allocations"
    }

    fn should_run(&self, config: &PassConfig) -> bool {
        config.hoist_allocations
    }

    fn run(&self, function: &mut Function, ctx: &PassContext<'_, '_>) -> Result<bool> {
        if ctx.engine.first_pass(function).loop_count == 0 {
            return Ok(false);
        }
        let resolver = ctx.engine.resolver(&function.id);
        let mut hoister = AllocationHoister::new(
            ctx.types,
            &resolver,
            ctx.config.unresolved_escape_heuristic,
            &function.tree,
        );
        Walk::run(&mut function.tree, &mut hoister)?;
        let hoisted = hoister.flush(&mut function.tree)?;
        if hoisted > 0 {
            log::debug!("hoisted {} temporaries in {}", hoisted, function.id);
        }
        Ok(hoisted > 0)
    }
}

/// A temporary waiting to be declared at the top of the function
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDeclaration {
    pub name: String,
    pub ty: TypeRef,
    pub variable: VariableId,
    /// Initial value; `None` declares the variable without one
    pub default_value: Option<NodeId>,
}

type ElementKey = (StructuralKey, StructuralKey);

/// A shared element temporary and the site that last retargeted it
#[derive(Debug, Clone, Copy)]
struct ElementTemporary {
    variable: VariableId,
    /// Call the current target was bound for
    consumer: NodeId,
    /// Side effects evaluated before the binding
    effects: usize,
}

struct AllocationHoister<'a> {
    types: &'a TypeSystem,
    resolver: &'a dyn CallResolver,
    unresolved_heuristic: bool,
    pending: Vec<PendingDeclaration>,
    element_temporaries: HashMap<ElementKey, ElementTemporary>,
    /// Side-effecting nodes evaluated so far, in evaluation order
    effects: usize,
    next_index: usize,
}

impl<'a> AllocationHoister<'a> {
    fn new(
        types: &'a TypeSystem,
        resolver: &'a dyn CallResolver,
        unresolved_heuristic: bool,
        tree: &Tree,
    ) -> Self {
        let existing = tree
            .variables()
            .filter(|(_, v)| v.kind == VariableKind::Hoisted)
            .count();
        Self {
            types,
            resolver,
            unresolved_heuristic,
            pending: Vec::new(),
            element_temporaries: HashMap::new(),
            effects: 0,
            next_index: existing,
        }
    }

    fn temporary(
        &mut self,
        tree: &mut Tree,
        ty: TypeRef,
        default_value: Option<NodeId>,
    ) -> VariableId {
        let name = format!("{}{}", HOISTED_PREFIX, self.next_index);
        self.next_index += 1;
        let variable = tree.add_variable(Variable {
            name: name.clone(),
            ty: ty.clone(),
            kind: VariableKind::Hoisted,
        });
        self.pending.push(PendingDeclaration {
            name,
            ty,
            variable,
            default_value,
        });
        variable
    }

    /// Whether the loop context allows reusing storage across iterations
    fn in_hoistable_position(walk: &Walk<'_>) -> bool {
        let context = walk.context();
        context.in_loop() && !context.in_lambda()
    }

    /// Call and argument position `node` is passed in, directly or by reference
    fn argument_slot(walk: &Walk<'_>, node: NodeId) -> Option<(NodeId, usize)> {
        let tree = walk.tree();
        let call = walk.context().enclosing_call()?;
        let parent = walk.context().parent()?;
        let argument = if parent == call {
            node
        } else if matches!(tree.kind(parent), NodeKind::ReferenceOf)
            && tree.parent(parent) == Some(call)
        {
            parent
        } else {
            return None;
        };
        let position = tree.call_arguments(call).iter().position(|&a| a == argument)?;
        Some((call, position))
    }

    /// Whether a value passed at `position` of `call` may outlive the call
    fn escapes_through(&self, tree: &Tree, call: NodeId, position: usize) -> bool {
        let (method, dispatch) = match tree.kind(call) {
            NodeKind::Invocation {
                method, dispatch, ..
            } => (method.clone(), *dispatch),
            NodeKind::NewObject { constructor } => {
                (MethodRef::Member(constructor.clone()), Dispatch::Direct)
            }
            _ => return true,
        };
        if let Some(facts) = self.resolver.resolve_call(&method, dispatch) {
            return facts.parameter_escapes(position);
        }
        if !self.unresolved_heuristic || !self.is_unresolved_target(&method, dispatch) {
            return true;
        }
        // Approximation: an unresolved target is trusted when the declared
        // member's facts show no escaping parameter at all. Overrides are
        // not inspected.
        match self.resolver.declared_facts(&method) {
            Some(facts) if !facts.conservative && facts.has_no_escaping_parameters() => {
                log::debug!(
                    "treating argument {} of unresolved call {} as non-escaping",
                    position,
                    method
                );
                false
            }
            _ => true,
        }
    }

    fn is_unresolved_target(&self, method: &MethodRef, dispatch: Dispatch) -> bool {
        match method {
            MethodRef::Unresolved { .. } => true,
            MethodRef::Member(id) => dispatch == Dispatch::Virtual && self.types.is_overridable(id),
        }
    }

    fn argument_escapes(&self, walk: &Walk<'_>, node: NodeId) -> bool {
        match Self::argument_slot(walk, node) {
            Some((call, position)) => self.escapes_through(walk.tree(), call, position),
            None => true,
        }
    }

    /// Whether the constructor leaves `this` behind anywhere
    fn constructor_retains_instance(&self, constructor: &QualifiedMemberId) -> bool {
        match self
            .resolver
            .resolve_call(&MethodRef::Member(constructor.clone()), Dispatch::Direct)
        {
            Some(facts) => facts.conservative || facts.this_escapes,
            None => true,
        }
    }

    fn hoist_struct(
        &mut self,
        walk: &mut Walk<'_>,
        node: NodeId,
        constructor: QualifiedMemberId,
        ty: TypeRef,
    ) -> Result<()> {
        let tree = walk.tree_mut();
        let default_value = tree.default_value(ty.clone());
        let temp = self.temporary(tree, ty.clone(), Some(default_value));

        let arguments = tree.take_children(node);
        let receiver = tree.var(temp);
        let init = tree.call(constructor, Some(receiver), arguments, TypeRef::Void);
        let result = tree.var(temp);
        let sequence = tree.comma(vec![init, result]);
        walk.replace(self, node, sequence)?;
        Ok(())
    }

    /// Whether a cached temporary can be retargeted for a new site
    ///
    /// Retargeting rebinds every earlier site whose call has not run yet, so
    /// that is only allowed while no side effect happened since the binding.
    fn can_share(&self, context: &VisitContext, cached: &ElementTemporary) -> bool {
        cached.effects == self.effects || !context.ancestors().contains(&cached.consumer)
    }

    fn hoist_element_reference(
        &mut self,
        walk: &mut Walk<'_>,
        node: NodeId,
        packed: bool,
    ) -> Result<()> {
        let (array, index) = match *walk.tree().children(node) {
            [array, index] => (array, index),
            _ => return walk.visit_children(self, node),
        };
        let Some(consumer) = walk.context().enclosing_call() else {
            return walk.visit_children(self, node);
        };

        let tree = walk.tree();
        let key = if has_side_effect_operand(tree, array) || has_side_effect_operand(tree, index) {
            None
        } else {
            Some((tree.structural_key(array), tree.structural_key(index)))
        };
        let cached = key
            .as_ref()
            .and_then(|key| self.element_temporaries.get(key))
            .filter(|cached| self.can_share(walk.context(), cached))
            .map(|cached| cached.variable);

        let tree = walk.tree_mut();
        let ty = tree
            .static_type(node)
            .cloned()
            .unwrap_or_else(|| TypeRef::ElementReference(Box::new(TypeRef::Void)));
        let temp = match cached {
            Some(temp) => temp,
            None => {
                let null = tree.null();
                let zero = tree.int(0);
                let default_value = tree.add_node(
                    NodeKind::NewElementReference { packed },
                    vec![null, zero],
                    Some(ty.clone()),
                );
                self.temporary(tree, ty.clone(), Some(default_value))
            }
        };
        if let Some(key) = key {
            self.element_temporaries.insert(
                key,
                ElementTemporary {
                    variable: temp,
                    consumer,
                    effects: self.effects,
                },
            );
        }

        let operands = tree.take_children(node);
        let target = tree.var(temp);
        let children = std::iter::once(target).chain(operands).collect();
        let retarget = tree.add_node(NodeKind::Retarget { packed }, children, Some(ty));
        walk.replace(self, node, retarget)?;
        Ok(())
    }

    /// Visit `node` and count it once its own evaluation may have a side effect
    fn evaluate(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        walk.visit_children(self, node)?;
        if is_side_effect(walk.tree().kind(node)) {
            self.effects += 1;
        }
        Ok(())
    }

    /// Prepend the declaration statement; returns how many temporaries it declares
    fn flush(&mut self, tree: &mut Tree) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let declarators = self
            .pending
            .drain(..)
            .map(|pending| {
                tree.add_node(
                    NodeKind::VariableDeclarator {
                        variable: pending.variable,
                    },
                    pending.default_value.into_iter().collect(),
                    None,
                )
            })
            .collect::<Vec<_>>();
        let count = declarators.len();
        let declaration = tree.add_node(NodeKind::VariableDeclaration, declarators, None);
        tree.insert_child(tree.root(), 0, declaration)?;
        self.element_temporaries.clear();
        Ok(count)
    }
}

fn is_side_effect(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Unary(_)
            | NodeKind::Invocation { .. }
            | NodeKind::NewObject { .. }
            | NodeKind::Binary(BinaryOp::Assign)
    )
}

/// Operands whose re-evaluation order matters are never shared
fn has_side_effect_operand(tree: &Tree, operand: NodeId) -> bool {
    tree.any_in_subtree(operand, |node| is_side_effect(&node.kind))
}

impl Visitor for AllocationHoister<'_> {
    fn visit_invocation(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        self.evaluate(walk, node)
    }

    fn visit_binary(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        self.evaluate(walk, node)
    }

    fn visit_other(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        self.evaluate(walk, node)
    }

    fn visit_new_object(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        let NodeKind::NewObject { constructor } = walk.tree().kind(node).clone() else {
            return walk.visit_children(self, node);
        };
        let ty = walk.tree().static_type(node).cloned();
        let candidate = match &ty {
            Some(ty) => {
                Self::in_hoistable_position(walk)
                    && self.types.is_struct(ty)
                    && !self.argument_escapes(walk, node)
                    && !self.constructor_retains_instance(&constructor)
            }
            None => false,
        };
        match ty {
            Some(ty) if candidate => self.hoist_struct(walk, node, constructor, ty),
            _ => self.evaluate(walk, node),
        }
    }

    fn visit_new_element_reference(&mut self, walk: &mut Walk<'_>, node: NodeId) -> Result<()> {
        let NodeKind::NewElementReference { packed } = *walk.tree().kind(node) else {
            return walk.visit_children(self, node);
        };
        if Self::in_hoistable_position(walk) && !self.argument_escapes(walk, node) {
            self.hoist_element_reference(walk, node, packed)
        } else {
            walk.visit_children(self, node)
        }
    }
}
