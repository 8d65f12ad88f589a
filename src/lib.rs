//! ilxlate: ahead-of-time rewrite pipeline for lowered managed method bodies
//!
//! This library takes method bodies that a metadata reader has already lowered
//! to a tree, analyzes them (def/use, escape, purity) and rewrites them with
//! optimization passes before emission. Calls into proxied runtime types are
//! resolved against a declarative redirection policy table.

pub mod analysis;
pub mod ast;
pub mod cli;
pub mod error;
pub mod program;
pub mod proxy;
pub mod translator;

pub use error::{Error, Result};
pub use translator::{PassConfig, TranslateOptions, TranslationReport, Translator};

// Re-export commonly used types
pub use analysis::{FunctionAnalysisEngine, SecondPassFacts};
pub use ast::{NodeId, NodeKind, QualifiedMemberId, Tree, TypeRef, Visitor, Walk};
pub use program::{Function, Program, ProgramFile, TypeSystem};
pub use proxy::{RedirectionResolver, RedirectionTable};
