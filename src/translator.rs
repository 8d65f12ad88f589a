//! Pipeline orchestration
//!
//! Runs the rewrite passes over every function of a [`Program`]. The analysis
//! cache is warmed bottom-up over the call graph first, so callee summaries
//! exist before callers are rewritten. Functions are then processed in
//! parallel; a failing function keeps its original tree and is reported
//! without stopping the others.

use crate::analysis::optimization_passes::{
    default_passes, run_passes, OptimizationPass, PassContext,
};
use crate::analysis::{CallGraph, FunctionAnalysisEngine};
use crate::ast::QualifiedMemberId;
use crate::error::{Error, Result};
use crate::program::Program;
use crate::proxy::{RedirectionResolver, RedirectionTable};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which passes run and how they approximate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub hoist_allocations: bool,
    pub eliminate_dead_finally: bool,
    /// Trust unresolved call targets whose declared member has no escaping
    /// parameters. This is an approximation: overrides are not inspected.
    pub unresolved_escape_heuristic: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            hoist_allocations: true,
            eliminate_dead_finally: true,
            unresolved_escape_heuristic: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    pub passes: PassConfig,
    pub parallel: bool,
    /// Worker count; `None` uses the global rayon pool
    pub threads: Option<usize>,
    /// Fail functions that call external members
    pub check_redirections: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            passes: PassConfig::default(),
            parallel: true,
            threads: None,
            check_redirections: true,
        }
    }
}

impl TranslateOptions {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Result of translating one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedFunction {
    pub passes_applied: Vec<&'static str>,
    pub redirected_calls: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionOutcome {
    pub function: QualifiedMemberId,
    pub result: std::result::Result<TranslatedFunction, Error>,
}

#[derive(Debug, Clone, Default)]
pub struct TranslationReport {
    /// One outcome per function, in identifier order
    pub outcomes: Vec<FunctionOutcome>,
    /// Second-pass computations performed during the run
    pub analysis_computations: usize,
}

impl TranslationReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&QualifiedMemberId, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.function, e)))
    }

    pub fn outcome(&self, function: &QualifiedMemberId) -> Option<&FunctionOutcome> {
        self.outcomes.iter().find(|o| &o.function == function)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let functions: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(translated) => serde_json::json!({
                    "function": outcome.function.to_string(),
                    "status": "ok",
                    "passes_applied": translated.passes_applied,
                    "redirected_calls": translated.redirected_calls,
                }),
                Err(err) => serde_json::json!({
                    "function": outcome.function.to_string(),
                    "status": "failed",
                    "error": err.to_string(),
                }),
            })
            .collect();
        serde_json::json!({
            "succeeded": self.succeeded(),
            "failed": self.outcomes.len() - self.succeeded(),
            "analysis_computations": self.analysis_computations,
            "functions": functions,
        })
    }
}

pub struct Translator {
    options: TranslateOptions,
    redirections: RedirectionTable,
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Translator {
    pub fn new(options: TranslateOptions, redirections: RedirectionTable) -> Self {
        Self::with_passes(options, redirections, default_passes())
    }

    pub fn with_passes(
        options: TranslateOptions,
        redirections: RedirectionTable,
        passes: Vec<Box<dyn OptimizationPass>>,
    ) -> Self {
        Self {
            options,
            redirections,
            passes,
        }
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    pub fn redirections(&self) -> &RedirectionTable {
        &self.redirections
    }

    /// Translate every function of `program` in place
    pub fn translate(&self, program: &Program) -> Result<TranslationReport> {
        self.translate_with(program, |_| {})
    }

    /// Like [`Translator::translate`], calling `on_done` after each function
    pub fn translate_with<F>(&self, program: &Program, on_done: F) -> Result<TranslationReport>
    where
        F: Fn(&QualifiedMemberId) + Send + Sync,
    {
        let engine = FunctionAnalysisEngine::new(program, &self.redirections);
        let graph = CallGraph::build(program, &engine)?;
        engine.warm_up(&graph.bottom_up_order())?;

        let ids = program.function_ids();
        let work = |id: &QualifiedMemberId| {
            let result = self.translate_function(&engine, id);
            on_done(id);
            FunctionOutcome {
                function: id.clone(),
                result,
            }
        };

        let outcomes: Vec<FunctionOutcome> = if !self.options.parallel {
            ids.iter().map(work).collect()
        } else if let Some(threads) = self.options.threads {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::internal(format!("failed to build thread pool: {}", e)))?;
            pool.install(|| ids.par_iter().map(work).collect())
        } else {
            ids.par_iter().map(work).collect()
        };

        let report = TranslationReport {
            outcomes,
            analysis_computations: engine.computations(),
        };
        log::debug!(
            "translated {} functions, {} failed",
            report.succeeded(),
            report.outcomes.len() - report.succeeded()
        );
        Ok(report)
    }

    fn translate_function(
        &self,
        engine: &FunctionAnalysisEngine<'_>,
        id: &QualifiedMemberId,
    ) -> std::result::Result<TranslatedFunction, Error> {
        let mut function = engine.program().lock(id)?;
        let original = function.tree.clone();
        let ctx = PassContext::new(engine, &self.options.passes);

        let result = run_passes(&self.passes, &mut function, &ctx).and_then(|passes_applied| {
            let redirected_calls = if self.options.check_redirections {
                RedirectionResolver::new(&self.redirections).check_function(&function)?
            } else {
                0
            };
            Ok(TranslatedFunction {
                passes_applied,
                redirected_calls,
            })
        });

        if let Err(err) = &result {
            log::warn!("translation of {} failed: {}", id, err);
            function.tree = original;
            engine.invalidate(id);
        }
        result
    }
}
