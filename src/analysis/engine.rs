//! Per-function fact cache shared by all workers
//!
//! Facts are computed lazily, memoized by [`QualifiedMemberId`] and tagged
//! with the tree version they were computed from, so a stale entry is never
//! handed out for a mutated tree. Passes call [`FunctionAnalysisEngine::invalidate`]
//! after changing a function; the next request recomputes from scratch.
//!
//! Cross-function lookups only ever `try_lock` the callee. A callee that is
//! already being computed further up the same request chain gets the
//! conservative answer, which is what terminates mutual recursion. A callee
//! that another worker is rewriting gets its last known facts.

use super::first_pass::{self, FirstPassFacts};
use super::second_pass::{self, CallResolver, SecondPassFacts};
use crate::ast::{Dispatch, MethodRef, QualifiedMemberId};
use crate::error::Result;
use crate::program::{Function, FunctionAccess, Program};
use crate::proxy::RedirectionTable;
use dashmap::DashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct FunctionAnalysisEngine<'p> {
    program: &'p Program,
    redirections: &'p RedirectionTable,
    first_pass: DashMap<QualifiedMemberId, Arc<FirstPassFacts>>,
    second_pass: DashMap<QualifiedMemberId, Arc<SecondPassFacts>>,
    /// Second-pass facts discarded by the latest invalidation
    previous: DashMap<QualifiedMemberId, Arc<SecondPassFacts>>,
    computations: AtomicUsize,
}

impl<'p> FunctionAnalysisEngine<'p> {
    pub fn new(program: &'p Program, redirections: &'p RedirectionTable) -> Self {
        Self {
            program,
            redirections,
            first_pass: DashMap::new(),
            second_pass: DashMap::new(),
            previous: DashMap::new(),
            computations: AtomicUsize::new(0),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn redirections(&self) -> &'p RedirectionTable {
        self.redirections
    }

    /// Def/use facts for a function the caller holds
    pub fn first_pass(&self, function: &Function) -> Arc<FirstPassFacts> {
        let cached = self
            .first_pass
            .get(&function.id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(facts) = cached {
            if facts.version == function.tree.version() {
                return facts;
            }
        }
        let facts = Arc::new(first_pass::analyze(function));
        self.first_pass
            .insert(function.id.clone(), Arc::clone(&facts));
        facts
    }

    /// Escape and purity facts for a function the caller holds
    pub fn second_pass(&self, function: &Function) -> Arc<SecondPassFacts> {
        let resolver = self.resolver(&function.id);
        self.second_pass_with(function, &resolver)
    }

    /// Resolver for passes running on `function`
    ///
    /// Requests that lead back to `function` are answered conservatively.
    pub fn resolver(&self, function: &QualifiedMemberId) -> ChainResolver<'_, 'p> {
        ChainResolver {
            engine: self,
            visiting: RefCell::new(vec![function.clone()]),
        }
    }

    fn second_pass_with(
        &self,
        function: &Function,
        resolver: &ChainResolver<'_, 'p>,
    ) -> Arc<SecondPassFacts> {
        let cached = self.cached_second_pass(&function.id);
        if let Some(facts) = cached {
            if facts.version == function.tree.version() {
                return facts;
            }
        }
        let first = self.first_pass(function);
        let facts = Arc::new(second_pass::compute(function, &first, resolver));
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.second_pass
            .insert(function.id.clone(), Arc::clone(&facts));
        facts
    }

    fn cached_second_pass(&self, id: &QualifiedMemberId) -> Option<Arc<SecondPassFacts>> {
        self.second_pass
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Discard both passes' facts for a function
    pub fn invalidate(&self, id: &QualifiedMemberId) {
        self.first_pass.remove(id);
        if let Some((_, facts)) = self.second_pass.remove(id) {
            self.previous.insert(id.clone(), facts);
        }
        log::trace!("invalidated facts for {}", id);
    }

    /// Compute second-pass facts for every function in `order`
    pub fn warm_up(&self, order: &[QualifiedMemberId]) -> Result<()> {
        for id in order {
            let function = self.program.lock(id)?;
            self.second_pass(&function);
        }
        log::debug!("warmed analysis cache for {} functions", order.len());
        Ok(())
    }

    /// Number of second-pass computations so far
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Callee lookups on behalf of one request chain
pub struct ChainResolver<'e, 'p> {
    engine: &'e FunctionAnalysisEngine<'p>,
    /// Functions whose facts are being computed on this chain
    visiting: RefCell<Vec<QualifiedMemberId>>,
}

impl ChainResolver<'_, '_> {
    fn lookup(&self, id: &QualifiedMemberId) -> Option<Arc<SecondPassFacts>> {
        if self.visiting.borrow().contains(id) {
            log::trace!("re-entrant request for {}, answering conservatively", id);
            return Some(Arc::new(SecondPassFacts::conservative(id.clone())));
        }
        let engine = self.engine;
        match engine.program.try_lock(id) {
            FunctionAccess::Available(function) => {
                self.visiting.borrow_mut().push(id.clone());
                let facts = engine.second_pass_with(&function, self);
                self.visiting.borrow_mut().pop();
                Some(facts)
            }
            FunctionAccess::Busy => {
                let last = engine
                    .cached_second_pass(id)
                    .or_else(|| engine.previous.get(id).map(|entry| Arc::clone(entry.value())));
                Some(last.unwrap_or_else(|| Arc::new(SecondPassFacts::conservative(id.clone()))))
            }
            FunctionAccess::Missing => None,
        }
    }

    fn may_be_overridden(&self, id: &QualifiedMemberId, dispatch: Dispatch) -> bool {
        dispatch == Dispatch::Virtual && self.engine.program.types().is_overridable(id)
    }
}

impl CallResolver for ChainResolver<'_, '_> {
    fn resolve_call(&self, method: &MethodRef, dispatch: Dispatch) -> Option<Arc<SecondPassFacts>> {
        let id = method.member()?;
        if self.may_be_overridden(id, dispatch) {
            return None;
        }
        self.lookup(id)
    }

    fn is_pure_call(&self, method: &MethodRef, dispatch: Dispatch) -> bool {
        let Some(id) = method.member() else {
            return false;
        };
        let redirections = self.engine.redirections;
        if redirections.is_pure(id) {
            return true;
        }
        if redirections.is_external(id) {
            return false;
        }
        if self.engine.program.types().is_declared_pure(id) {
            return true;
        }
        if self.may_be_overridden(id, dispatch) {
            return false;
        }
        self.lookup(id)
            .is_some_and(|facts| facts.is_pure && !facts.conservative)
    }

    fn declared_facts(&self, method: &MethodRef) -> Option<Arc<SecondPassFacts>> {
        self.lookup(method.member()?)
    }
}
