//! Static analysis of function trees
//!
//! This module provides the per-function analysis the rewrite passes consume:
//! - Def/use and aliasing facts (first pass)
//! - Escape and purity facts (second pass)
//! - A shared, versioned fact cache with cross-function lookups
//! - A whole-program call graph for bottom-up scheduling

pub mod call_graph;
pub mod engine;
pub mod first_pass;
pub mod optimization_passes;
pub mod second_pass;

pub use call_graph::CallGraph;
pub use engine::{ChainResolver, FunctionAnalysisEngine};
pub use first_pass::{CallSite, FirstPassFacts, StoreSite, StoreTarget, VariableUsage};
pub use second_pass::{CallResolver, ImpurityReason, SecondPassFacts};
