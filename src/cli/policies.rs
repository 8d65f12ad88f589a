//! Validate and list a redirection policy file

use super::utils;
use crate::proxy::{ProxyBehavior, ProxyMode};
use anyhow::{Context, Result};
use std::path::Path;

/// Run the policies subcommand
pub fn policies(input: &Path) -> Result<()> {
    let table = utils::read_policies(Some(input))
        .with_context(|| format!("Invalid policy file {}", input.display()))?;

    for policy in table.policies() {
        let mode = match policy.mode {
            ProxyMode::AnnotatedOnly => "annotated members only",
            ProxyMode::AllDeclared => "all declared members",
        };
        println!("{} ({})", policy.proxied_type, mode);
        for member in &policy.members {
            let behavior = match &member.behavior {
                ProxyBehavior::Replace { template } => format!("=> {}", template),
                ProxyBehavior::Operator { symbol } => format!("=> infix {}", symbol),
                ProxyBehavior::External => "external, no translation".to_string(),
            };
            let pure = if member.pure { " [pure]" } else { "" };
            println!("  {}{} {}{}", member.name, member.signature, behavior, pure);
        }
    }
    println!(
        "{} policies, {} members",
        table.policies().len(),
        table.len()
    );
    Ok(())
}
