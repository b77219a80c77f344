//! # Analysis Framework
//!
//! Analyses are pure functions over a container whose results are
//! cached in the container's [`PassManager`], keyed by the analysis
//! type. Every cached entry is stamped with the container's monotonic
//! mutation version; a mismatch on the next request recomputes. Each
//! container mutator bumps its version, so a transform never observes
//! a stale analysis — it simply re-requests after mutating.
//!
//! Function analyses key on the function's version. Module analyses
//! key on the module's version plus the sum of every function's, so a
//! mutation anywhere in the module invalidates them.

pub mod dataflow;
pub mod dominance;
pub mod side_effect;

pub use dataflow::DataFlowGraphAnalysis;
pub use dominance::DominanceAnalysis;
pub use side_effect::SideEffectAnalysis;

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ir::function::Function;
use crate::ir::module::Module;

/// An analysis over a single function.
pub trait FunctionAnalysis: 'static {
    type Result: 'static;

    /// Identifier used in logs.
    const NAME: &'static str;

    fn run(function: &Function, module: &Module) -> Self::Result;
}

/// An analysis over a whole module.
pub trait ModuleAnalysis: 'static {
    type Result: 'static;

    const NAME: &'static str;

    fn run(module: &Module) -> Self::Result;
}

struct CachedResult {
    version: u64,
    result: Rc<dyn Any>,
}

/// Per-container cache of analysis results.
pub struct PassManager {
    cache: RefCell<FxHashMap<TypeId, CachedResult>>,
}

impl PassManager {
    pub fn new() -> Self {
        PassManager {
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Returns the cached result produced at `version`, or computes,
    /// caches, and returns a fresh one.
    pub fn cached_or<R: 'static>(
        &self,
        key: TypeId,
        name: &'static str,
        version: u64,
        compute: impl FnOnce() -> R,
    ) -> Rc<R> {
        {
            let cache = self.cache.borrow();
            if let Some(entry) = cache.get(&key) {
                if entry.version == version {
                    if let Ok(result) = entry.result.clone().downcast::<R>() {
                        return result;
                    }
                }
            }
        }
        log::trace!("computing analysis {} at version {}", name, version);
        let result: Rc<R> = Rc::new(compute());
        self.cache.borrow_mut().insert(
            key,
            CachedResult {
                version,
                result: result.clone(),
            },
        );
        result
    }

    /// Drops every cached result.
    pub fn invalidate_all(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PassManager {
    /// Cloning a container starts with an empty cache.
    fn clone(&self) -> Self {
        PassManager::new()
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

impl Function {
    /// Requests a function analysis, cached until the next mutation of
    /// this function.
    pub fn analysis<A: FunctionAnalysis>(&self, module: &Module) -> Rc<A::Result> {
        self.passes
            .cached_or(TypeId::of::<A>(), A::NAME, self.version(), || {
                A::run(self, module)
            })
    }
}

impl Module {
    /// Requests a module analysis, cached until the next mutation of
    /// the module or any of its functions.
    pub fn analysis<A: ModuleAnalysis>(&self) -> Rc<A::Result> {
        self.passes
            .cached_or(TypeId::of::<A>(), A::NAME, self.state_version(), || {
                A::run(self)
            })
    }
}
