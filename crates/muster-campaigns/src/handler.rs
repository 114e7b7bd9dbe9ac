use crate::family::{Family, WorkerParams};
use async_trait::async_trait;
use muster_core::MusterResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Context handed to a handler for one unit of work.
#[derive(Debug)]
pub struct UnitContext<'a> {
    pub agent_id: &'a str,
    pub params: &'a WorkerParams,
    /// Units this worker has produced so far.
    pub units_done: u64,
}

/// The unit-of-work contract a capability family plugs into the
/// orchestrator.
///
/// The orchestrator owns spawning, pacing, cancellation, bookkeeping and
/// stats; a handler only produces units. Handler errors are logged by the
/// worker loop and never stop it.
#[async_trait]
pub trait FamilyHandler: Send + Sync {
    /// The family this handler drives.
    fn family(&self) -> Family;

    /// Validates start parameters. Called before any worker is registered.
    fn validate(&self, _params: &WorkerParams) -> MusterResult<()> {
        Ok(())
    }

    /// Produces one unit batch, returning how many units it counts for.
    async fn run_unit(&self, ctx: UnitContext<'_>) -> MusterResult<u64>;

    /// Pause between unit batches.
    fn pace(&self, params: &WorkerParams) -> Duration;
}

/// Registry of family handlers, keyed by family.
pub struct HandlerRegistry {
    handlers: HashMap<Family, Arc<dyn FamilyHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry preloaded with the in-process simulation handlers.
    pub fn with_simulators() -> Self {
        let mut registry = Self::new();
        registry.add(Arc::new(crate::sim::HashLoopMiner));
        registry.add(Arc::new(crate::sim::DryRunFlooder));
        registry.add(Arc::new(crate::sim::QueryWalker));
        registry
    }

    /// Registers a handler under its family, replacing any previous one.
    pub fn add(&mut self, handler: Arc<dyn FamilyHandler>) {
        self.handlers.insert(handler.family(), handler);
    }

    pub fn get(&self, family: Family) -> Option<Arc<dyn FamilyHandler>> {
        self.handlers.get(&family).cloned()
    }

    pub fn families(&self) -> Vec<Family> {
        self.handlers.keys().copied().collect()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
