//! Rewrite passes run on every function before emission
//!
//! Passes run in a fixed order. Each one reports whether it changed the tree;
//! a change invalidates the function's cached analysis facts so the next pass
//! sees facts for the rewritten tree.

mod dead_finally_elimination;
mod hoist_allocations;

pub use dead_finally_elimination::DeadFinallyEliminationPass;
pub use hoist_allocations::{HoistAllocationsPass, PendingDeclaration};

use crate::analysis::FunctionAnalysisEngine;
use crate::error::{Error, Result};
use crate::program::{Function, TypeSystem};
use crate::translator::PassConfig;

/// Trait for optimization passes
pub trait OptimizationPass: Send + Sync {
    /// Get the name of this optimization pass
    fn name(&self) -> &'static str;

    /// Rewrite one function, returning whether the tree changed
    fn run(&self, function: &mut Function, ctx: &PassContext<'_, '_>) -> Result<bool>;

    /// Check if this pass should run
    fn should_run(&self, _config: &PassConfig) -> bool {
        true
    }
}

/// Shared handles a pass may consult
pub struct PassContext<'a, 'p> {
    pub types: &'p TypeSystem,
    pub engine: &'a FunctionAnalysisEngine<'p>,
    pub config: &'a PassConfig,
}

impl<'a, 'p> PassContext<'a, 'p> {
    pub fn new(engine: &'a FunctionAnalysisEngine<'p>, config: &'a PassConfig) -> Self {
        Self {
            types: engine.program().types(),
            engine,
            config,
        }
    }
}

/// The standard pipeline: hoisting, then dead-finally elimination
pub fn default_passes() -> Vec<Box<dyn OptimizationPass>> {
    vec![
        Box::new(HoistAllocationsPass),
        Box::new(DeadFinallyEliminationPass),
    ]
}

/// Run `passes` over a function in order
///
/// Returns the names of the passes that changed the tree.
pub fn run_passes(
    passes: &[Box<dyn OptimizationPass>],
    function: &mut Function,
    ctx: &PassContext<'_, '_>,
) -> Result<Vec<&'static str>> {
    let mut applied = Vec::new();
    for pass in passes {
        if !pass.should_run(ctx.config) {
            log::trace!("skipping {} for {}", pass.name(), function.id);
            continue;
        }
        let changed = pass.run(function, ctx).map_err(|err| match err {
            Error::Pass { .. } | Error::MissingRedirection { .. } => err,
            other => Error::Pass {
                pass: pass.name(),
                function: function.id.to_string(),
                message: other.to_string(),
            },
        })?;
        if changed {
            log::debug!("{} changed {}", pass.name(), function.id);
            ctx.engine.invalidate(&function.id);
            applied.push(pass.name());
        }
    }
    Ok(applied)
}
