//! Whole-program call graph
//!
//! Built once from the first-pass call sites of every function. Only calls
//! to members defined in the program become edges; calls into external
//! members have no body to analyze.

use super::engine::FunctionAnalysisEngine;
use crate::ast::QualifiedMemberId;
use crate::error::Result;
use crate::program::Program;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Caller to callee edges between program functions
pub struct CallGraph {
    graph: DiGraph<QualifiedMemberId, ()>,
    indices: HashMap<QualifiedMemberId, NodeIndex>,
}

impl CallGraph {
    pub fn build(program: &Program, engine: &FunctionAnalysisEngine<'_>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for id in program.function_ids() {
            let index = graph.add_node(id.clone());
            indices.insert(id, index);
        }

        for (caller, &caller_index) in &indices {
            let function = program.lock(caller)?;
            let facts = engine.first_pass(&function);
            for call in &facts.calls {
                let Some(callee) = call.method.member() else {
                    continue;
                };
                if let Some(&callee_index) = indices.get(callee) {
                    graph.update_edge(caller_index, callee_index, ());
                }
            }
        }

        log::debug!(
            "call graph: {} functions, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self { graph, indices })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn callees(&self, id: &QualifiedMemberId) -> Vec<&QualifiedMemberId> {
        self.neighbors(id, Direction::Outgoing)
    }

    pub fn callers(&self, id: &QualifiedMemberId) -> Vec<&QualifiedMemberId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &QualifiedMemberId, direction: Direction) -> Vec<&QualifiedMemberId> {
        let Some(&index) = self.indices.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&QualifiedMemberId> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| &self.graph[n])
            .collect();
        out.sort();
        out
    }

    /// Whether a function can reach itself through calls
    pub fn is_recursive(&self, id: &QualifiedMemberId) -> bool {
        let Some(&index) = self.indices.get(id) else {
            return false;
        };
        if self.graph.contains_edge(index, index) {
            return true;
        }
        tarjan_scc(&self.graph)
            .iter()
            .any(|component| component.len() > 1 && component.contains(&index))
    }

    /// Functions ordered so callees come before their callers
    ///
    /// Members of one strongly connected component stay adjacent; their
    /// relative order is by identifier.
    pub fn bottom_up_order(&self) -> Vec<QualifiedMemberId> {
        // tarjan_scc yields components in reverse topological order
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|mut component| {
                component.sort_by(|&a, &b| self.graph[a].cmp(&self.graph[b]));
                component
            })
            .map(|index| self.graph[index].clone())
            .collect()
    }
}
