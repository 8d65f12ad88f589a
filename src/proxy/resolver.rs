//! Call-site redirection lookup

use super::policy::{ProxyBehavior, ProxyMode, RedirectionTable};
use super::template::TemplateInstance;
use crate::ast::{NodeId, NodeKind, QualifiedMemberId, Tree};
use crate::error::{Error, Result};
use crate::program::Function;

/// How one call site translates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirection {
    Template(TemplateInstance),
    Operator {
        symbol: String,
        left: NodeId,
        right: NodeId,
    },
    /// Declared on a fully proxied type but not listed; emitted unchanged
    Identity,
}

pub struct RedirectionResolver<'t> {
    table: &'t RedirectionTable,
}

impl<'t> RedirectionResolver<'t> {
    pub fn new(table: &'t RedirectionTable) -> Self {
        Self { table }
    }

    /// Resolve the invocation or constructor call `call` inside `function`
    ///
    /// `Ok(None)` means the call takes the default translation path. Calling an
    /// external member is an error naming the member and the call site.
    pub fn resolve(
        &self,
        function: &QualifiedMemberId,
        tree: &Tree,
        call: NodeId,
    ) -> Result<Option<Redirection>> {
        let member = match tree.kind(call) {
            NodeKind::Invocation { method, .. } => match method.member() {
                Some(id) => id,
                None => return Ok(None),
            },
            NodeKind::NewObject { constructor } => constructor,
            _ => return Ok(None),
        };
        let Some(mode) = self.table.mode(&member.declaring_type) else {
            return Ok(None);
        };
        let Some(entry) = self.table.entry(member) else {
            return Ok(match mode {
                ProxyMode::AnnotatedOnly => None,
                ProxyMode::AllDeclared => Some(Redirection::Identity),
            });
        };

        let arguments = tree.call_arguments(call);
        let redirection = match &entry.policy.behavior {
            ProxyBehavior::External => {
                return Err(Error::MissingRedirection {
                    member: member.to_string(),
                    function: function.to_string(),
                    node: call.index(),
                })
            }
            ProxyBehavior::Operator { symbol } => match *arguments {
                [left, right] => Redirection::Operator {
                    symbol: symbol.clone(),
                    left,
                    right,
                },
                _ => {
                    return Err(Error::policy(
                        member.to_string(),
                        format!("operator called with {} operands", arguments.len()),
                    ))
                }
            },
            ProxyBehavior::Replace { .. } => {
                let template = entry.template.as_ref().ok_or_else(|| {
                    Error::internal(format!("template for {} was not compiled", member))
                })?;
                Redirection::Template(template.instantiate(
                    &member.to_string(),
                    tree.call_receiver(call),
                    arguments,
                )?)
            }
        };
        log::trace!("call {} to {} is redirected", call, member);
        Ok(Some(redirection))
    }

    /// Resolve every call in a function, failing on the first external member
    ///
    /// Returns the number of calls that are redirected to a template or operator.
    pub fn check_function(&self, function: &Function) -> Result<usize> {
        let tree = &function.tree;
        let mut redirected = 0;
        for node in tree.descendants(tree.root()) {
            if !tree.kind(node).is_call() {
                continue;
            }
            match self.resolve(&function.id, tree, node)? {
                Some(Redirection::Template(_)) | Some(Redirection::Operator { .. }) => {
                    redirected += 1
                }
                Some(Redirection::Identity) | None => {}
            }
        }
        Ok(redirected)
    }
}
