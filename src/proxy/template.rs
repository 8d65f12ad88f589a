//! Replacement expression templates
//!
//! A template is target-language text with `$name` placeholders: `$this` for
//! the receiver, `$<parameter>` for a declared parameter and `$arguments`
//! for the whole argument list of a variadic member. Templates are parsed
//! and checked against the member's declaration when the table is built.

use super::policy::MemberPolicy;
use crate::ast::NodeId;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    This,
    Parameter(usize),
    Arguments,
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

/// One piece of an instantiated template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Node(NodeId),
    ArgumentList(Vec<NodeId>),
}

/// A template bound to the operands of one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInstance {
    pub fragments: Vec<Fragment>,
}

impl TemplateInstance {
    /// Render with `render_node` producing the text of each bound operand
    pub fn render(&self, mut render_node: impl FnMut(NodeId) -> String) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text(text) => out.push_str(text),
                Fragment::Node(node) => out.push_str(&render_node(*node)),
                Fragment::ArgumentList(nodes) => {
                    let rendered: Vec<String> = nodes.iter().map(|&n| render_node(n)).collect();
                    out.push_str(&rendered.join(", "));
                }
            }
        }
        out
    }
}

impl Template {
    /// Parse `source` for `member`, rejecting placeholders it cannot bind
    pub fn parse(source: &str, member: &MemberPolicy) -> std::result::Result<Self, String> {
        let mut parts = Vec::new();
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(source) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Text(source[last..whole.start()].to_string()));
            }
            last = whole.end();
            let part = match name.as_str() {
                "this" if member.is_static => {
                    return Err("`$this` used in a static member".to_string())
                }
                "this" => Part::This,
                "arguments" if !member.variadic => {
                    return Err("`$arguments` used in a non-variadic member".to_string())
                }
                "arguments" => Part::Arguments,
                other => match member.parameters.iter().position(|p| p == other) {
                    Some(index) => Part::Parameter(index),
                    None => return Err(format!("`${}` is not a declared parameter", other)),
                },
            };
            parts.push(part);
        }
        if last < source.len() {
            parts.push(Part::Text(source[last..].to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance
    pub fn placeholders(&self) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(&self.source)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Bind the template to a call's receiver and arguments
    pub fn instantiate(
        &self,
        member: &str,
        receiver: Option<NodeId>,
        arguments: &[NodeId],
    ) -> Result<TemplateInstance> {
        let mut fragments = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let fragment = match part {
                Part::Text(text) => Fragment::Text(text.clone()),
                Part::This => Fragment::Node(receiver.ok_or_else(|| {
                    Error::policy(member, "call has no receiver to bind to `$this`")
                })?),
                Part::Parameter(index) => Fragment::Node(*arguments.get(*index).ok_or_else(|| {
                    Error::policy(
                        member,
                        format!(
                            "call passes {} arguments but the template needs parameter {}",
                            arguments.len(),
                            index
                        ),
                    )
                })?),
                Part::Arguments => Fragment::ArgumentList(arguments.to_vec()),
            };
            fragments.push(fragment);
        }
        Ok(TemplateInstance { fragments })
    }
}
