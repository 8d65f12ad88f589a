//! Dump analysis facts for inspection
//!
//! Prints, per function, the def/use summary of every variable and the
//! escape and purity facts the rewrite passes would see.

use super::utils;
use crate::analysis::{CallGraph, FunctionAnalysisEngine};
use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

/// Run the analyze subcommand
///
/// `function` filters by a substring of the qualified member identifier.
pub fn analyze(input: &Path, function: Option<&str>, policies: Option<&Path>) -> Result<()> {
    let table = utils::read_policies(policies)
        .with_context(|| "Failed to load redirection policies")?;
    let program = utils::read_program(input)
        .with_context(|| format!("Failed to read program {}", input.display()))?;
    let engine = FunctionAnalysisEngine::new(&program, &table);
    let graph = CallGraph::build(&program, &engine)?;
    engine.warm_up(&graph.bottom_up_order())?;

    let mut functions = Vec::new();
    for id in program.function_ids() {
        let name = id.to_string();
        if function.is_some_and(|filter| !name.contains(filter)) {
            continue;
        }
        let guard = program.lock(&id)?;
        let first = engine.first_pass(&guard);
        let second = engine.second_pass(&guard);

        let variables: Vec<serde_json::Value> = first
            .variables
            .iter()
            .map(|(variable, usage)| {
                let declared = guard.tree.variable(*variable);
                json!({
                    "name": declared.name,
                    "type": declared.ty.to_string(),
                    "definitions": usage.definitions,
                    "uses": usage.uses,
                    "address_taken": usage.address_taken,
                    "captured": usage.captured,
                    "reassigned": first.is_reassigned(&guard.tree, *variable),
                })
            })
            .collect();

        functions.push(json!({
            "function": name,
            "recursive": graph.is_recursive(&id),
            "callees": graph.callees(&id).iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            "loops": first.loop_count,
            "calls": first.calls.len(),
            "variables": variables,
            "escape": second.as_ref(),
        }));
    }

    if functions.is_empty() {
        if let Some(filter) = function {
            anyhow::bail!("No function matches '{}'", filter);
        }
    }
    println!("{}", serde_json::to_string_pretty(&functions)?);
    Ok(())
}
