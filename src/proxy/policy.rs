//! Redirection policy tables
//!
//! Policies are declared per proxied type and loaded once, before any function
//! is analyzed. [`RedirectionTableBuilder::build`] validates every entry and
//! compiles its template; the resulting [`RedirectionTable`] is immutable.

use super::template::Template;
use crate::ast::QualifiedMemberId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which members of a proxied type are redirected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// Only members listed in the policy; the rest take the default path
    #[default]
    AnnotatedOnly,
    /// Every declared member; unlisted ones translate unchanged
    AllDeclared,
}

/// What a listed member translates to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyBehavior {
    /// Substitute the call with an expression template
    Replace { template: String },
    /// Static binary operator rendered infix, e.g. `==`
    Operator { symbol: String },
    /// Implemented only by the source runtime; calling it cannot be translated
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPolicy {
    pub name: String,
    pub signature: String,
    /// Declared parameter names, usable as `$name` in templates
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub is_static: bool,
    /// The replacement has no observable side effect
    #[serde(default)]
    pub pure: bool,
    pub behavior: ProxyBehavior,
}

impl MemberPolicy {
    pub fn member_id(&self, proxied_type: &str) -> QualifiedMemberId {
        QualifiedMemberId::new(proxied_type, self.name.as_str(), self.signature.as_str())
    }
}

/// Policy for one proxied type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectionPolicy {
    pub proxied_type: String,
    #[serde(default)]
    pub mode: ProxyMode,
    #[serde(default)]
    pub members: Vec<MemberPolicy>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<RedirectionPolicy>,
}

/// A validated member entry
#[derive(Debug, Clone)]
pub struct RedirectionEntry {
    pub policy: MemberPolicy,
    /// Compiled template for [`ProxyBehavior::Replace`]
    pub template: Option<Template>,
}

/// Immutable lookup from member to redirection
#[derive(Debug, Default)]
pub struct RedirectionTable {
    policies: Vec<RedirectionPolicy>,
    modes: HashMap<String, ProxyMode>,
    entries: HashMap<QualifiedMemberId, RedirectionEntry>,
}

impl RedirectionTable {
    /// A table without policies; nothing is redirected
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load policies from `{ "policies": [...] }`
    pub fn from_json(json: &str) -> Result<Self> {
        let file: PolicyFile = serde_json::from_str(json)?;
        let mut builder = RedirectionTableBuilder::new();
        for policy in file.policies {
            builder.add(policy);
        }
        builder.build()
    }

    pub fn to_json(&self) -> Result<String> {
        let file = PolicyFile {
            policies: self.policies.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn policies(&self) -> &[RedirectionPolicy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mode of a proxied type, `None` if the type has no policy
    pub fn mode(&self, type_name: &str) -> Option<ProxyMode> {
        self.modes.get(type_name).copied()
    }

    pub fn entry(&self, member: &QualifiedMemberId) -> Option<&RedirectionEntry> {
        self.entries.get(member)
    }

    pub fn is_pure(&self, member: &QualifiedMemberId) -> bool {
        self.entry(member).is_some_and(|entry| entry.policy.pure)
    }

    pub fn is_external(&self, member: &QualifiedMemberId) -> bool {
        self.entry(member)
            .is_some_and(|entry| entry.policy.behavior == ProxyBehavior::External)
    }
}

#[derive(Debug, Default)]
pub struct RedirectionTableBuilder {
    policies: Vec<RedirectionPolicy>,
}

impl RedirectionTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, policy: RedirectionPolicy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    pub fn policy(mut self, policy: RedirectionPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Validate every policy and freeze the table
    pub fn build(self) -> Result<RedirectionTable> {
        let mut modes = HashMap::new();
        let mut entries = HashMap::new();
        for policy in &self.policies {
            if modes
                .insert(policy.proxied_type.clone(), policy.mode)
                .is_some()
            {
                return Err(Error::policy(
                    &policy.proxied_type,
                    "type has more than one policy",
                ));
            }
            for member in &policy.members {
                let id = member.member_id(&policy.proxied_type);
                let template = compile(&id, member)?;
                let entry = RedirectionEntry {
                    policy: member.clone(),
                    template,
                };
                if entries.insert(id.clone(), entry).is_some() {
                    return Err(Error::policy(id.to_string(), "member is listed twice"));
                }
            }
        }
        log::debug!(
            "loaded {} redirection policies with {} members",
            self.policies.len(),
            entries.len()
        );
        Ok(RedirectionTable {
            policies: self.policies,
            modes,
            entries,
        })
    }
}

fn compile(id: &QualifiedMemberId, member: &MemberPolicy) -> Result<Option<Template>> {
    match &member.behavior {
        ProxyBehavior::Replace { template } => Template::parse(template, member)
            .map(Some)
            .map_err(|message| Error::policy(id.to_string(), message)),
        ProxyBehavior::Operator { symbol } => {
            if symbol.trim().is_empty() {
                return Err(Error::policy(id.to_string(), "operator symbol is empty"));
            }
            if !member.is_static || member.parameters.len() != 2 {
                return Err(Error::policy(
                    id.to_string(),
                    "operators must be static members with two parameters",
                ));
            }
            Ok(None)
        }
        ProxyBehavior::External => Ok(None),
    }
}
