//! Second analysis pass: escape and purity
//!
//! Consumes [`FirstPassFacts`] and answers two questions about a function:
//! which parameter positions let their value reach an observable sink, and
//! whether calling the function has any observable side effect. Callee facts
//! come from a [`CallResolver`]; whenever a callee cannot be resolved the
//! answer is the conservative one (escapes, impure).

use super::first_pass::{yielded_variables, FirstPassFacts, StoreTarget};
use crate::ast::{Dispatch, MethodRef, NodeId, QualifiedMemberId, Tree, VariableId, VariableKind};
use crate::program::Function;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Why a function was classified as impure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ImpurityReason {
    /// Write to a location that is not one of the function's own locals
    Store { node: NodeId },
    MutableStaticRead { node: NodeId },
    Throw { node: NodeId },
    /// Call to a callee that is not known to be pure
    Call { node: NodeId, method: String },
    /// The facts are a stand-in for a function that could not be analyzed
    Unknown,
}

/// Escape and purity facts for one function
#[derive(Debug, Clone, Serialize)]
pub struct SecondPassFacts {
    pub function: QualifiedMemberId,
    /// Tree version the facts were computed from
    pub version: u64,
    pub escaping_parameters: BTreeSet<usize>,
    /// Every parameter position escapes, including ones not declared
    pub all_parameters_escape: bool,
    pub this_escapes: bool,
    pub is_pure: bool,
    pub impurity: Vec<ImpurityReason>,
    /// Facts were not computed from the function body
    pub conservative: bool,
}

impl SecondPassFacts {
    /// Worst-case answer used for unresolvable or re-entrant requests
    pub fn conservative(function: QualifiedMemberId) -> Self {
        Self {
            function,
            version: 0,
            escaping_parameters: BTreeSet::new(),
            all_parameters_escape: true,
            this_escapes: true,
            is_pure: false,
            impurity: vec![ImpurityReason::Unknown],
            conservative: true,
        }
    }

    pub fn parameter_escapes(&self, index: usize) -> bool {
        self.all_parameters_escape || self.escaping_parameters.contains(&index)
    }

    pub fn has_no_escaping_parameters(&self) -> bool {
        !self.all_parameters_escape && self.escaping_parameters.is_empty()
    }
}

/// Source of callee facts during the second pass
pub trait CallResolver {
    /// Facts for the member a call will actually reach, if it can be determined
    fn resolve_call(&self, method: &MethodRef, dispatch: Dispatch) -> Option<Arc<SecondPassFacts>>;

    /// Whether a call has no observable side effect
    fn is_pure_call(&self, method: &MethodRef, dispatch: Dispatch) -> bool;

    /// Facts for the declared member, ignoring where virtual dispatch may land
    fn declared_facts(&self, method: &MethodRef) -> Option<Arc<SecondPassFacts>> {
        self.resolve_call(method, Dispatch::Direct)
    }
}

/// Run the second pass over a function
pub fn compute(
    function: &Function,
    first: &FirstPassFacts,
    resolver: &dyn CallResolver,
) -> SecondPassFacts {
    let tree = &function.tree;
    let escapes = EscapeCheck {
        tree,
        first,
        resolver,
    };

    let escaping_parameters = tree
        .parameters()
        .into_iter()
        .filter(|&(_, variable)| escapes.variable_escapes(variable))
        .map(|(index, _)| index)
        .collect();
    let this_escapes = tree
        .variables()
        .filter(|(_, v)| v.kind == VariableKind::This)
        .any(|(id, _)| escapes.variable_escapes(id));

    let impurity = impurity_reasons(function, first, resolver);
    let facts = SecondPassFacts {
        function: function.id.clone(),
        version: tree.version(),
        escaping_parameters,
        all_parameters_escape: false,
        this_escapes,
        is_pure: impurity.is_empty(),
        impurity,
        conservative: false,
    };
    log::trace!(
        "second pass for {}: escaping {:?}, this escapes {}, pure {}",
        function.id,
        facts.escaping_parameters,
        facts.this_escapes,
        facts.is_pure
    );
    facts
}

struct EscapeCheck<'a> {
    tree: &'a Tree,
    first: &'a FirstPassFacts,
    resolver: &'a dyn CallResolver,
}

impl EscapeCheck<'_> {
    fn yields_any(&self, node: NodeId, closure: &BTreeSet<VariableId>) -> bool {
        yielded_variables(self.tree, node)
            .iter()
            .any(|v| closure.contains(v))
    }

    fn variable_escapes(&self, variable: VariableId) -> bool {
        let closure = self.first.alias_closure(variable);

        let captured_or_leaked = closure.iter().any(|v| {
            self.first
                .usage(*v)
                .is_some_and(|u| u.captured)
        }) || self
            .first
            .references
            .iter()
            .any(|r| !r.call_argument && closure.contains(&r.variable));
        if captured_or_leaked {
            return true;
        }

        let returned_or_thrown = self
            .first
            .returns
            .iter()
            .chain(&self.first.throws)
            .any(|&value| self.yields_any(value, &closure));
        if returned_or_thrown {
            return true;
        }

        let stored = self.first.stores.iter().any(|store| {
            let Some(value) = store.value else {
                return false;
            };
            // copies between plain variables are tracked as aliases
            !matches!(store.target, StoreTarget::Variable(_)) && self.yields_any(value, &closure)
        });
        if stored {
            return true;
        }

        self.first.calls.iter().any(|call| {
            let receiver_escapes = call
                .receiver
                .is_some_and(|receiver| self.yields_any(receiver, &closure));
            let escaping_positions: Vec<usize> = call
                .arguments
                .iter()
                .enumerate()
                .filter(|&(_, &argument)| self.yields_any(argument, &closure))
                .map(|(position, _)| position)
                .collect();
            if !receiver_escapes && escaping_positions.is_empty() {
                return false;
            }
            match self.resolver.resolve_call(&call.method, call.dispatch) {
                None => true,
                Some(callee) => {
                    (receiver_escapes && callee.this_escapes)
                        || escaping_positions
                            .iter()
                            .any(|&position| callee.parameter_escapes(position))
                }
            }
        })
    }
}

fn impurity_reasons(
    function: &Function,
    first: &FirstPassFacts,
    resolver: &dyn CallResolver,
) -> Vec<ImpurityReason> {
    let tree = &function.tree;
    let mut reasons = Vec::new();

    for store in &first.stores {
        let local = match &store.target {
            StoreTarget::Variable(_) => true,
            StoreTarget::Field {
                field,
                receiver: Some(receiver),
            } if !field.is_static => {
                let targets = yielded_variables(tree, *receiver);
                !targets.is_empty()
                    && targets.iter().all(|&v| {
                        let variable = tree.variable(v);
                        match variable.kind {
                            // constructors initialize their own instance
                            VariableKind::This => function.is_constructor(),
                            VariableKind::Local | VariableKind::Hoisted => variable.ty.is_struct(),
                            VariableKind::Parameter { .. } => false,
                        }
                    })
            }
            _ => false,
        };
        if !local {
            reasons.push(ImpurityReason::Store { node: store.node });
        }
    }

    reasons.extend(
        first
            .mutable_static_reads
            .iter()
            .map(|&node| ImpurityReason::MutableStaticRead { node }),
    );
    reasons.extend(first.throws.iter().map(|&node| ImpurityReason::Throw { node }));

    for call in &first.calls {
        if !resolver.is_pure_call(&call.method, call.dispatch) {
            reasons.push(ImpurityReason::Call {
                node: call.node,
                method: call.method.to_string(),
            });
        }
    }
    reasons
}
