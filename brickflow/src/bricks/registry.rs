//! Brick registry.

use super::{
    AssignModVariableBrick, Brick, BrickCapabilities, EchoBrick, ErrorBrick, ForEachBrick,
    GetStateBrick, IdentityBrick, IfElseBrick, RetryBrick, RunBrick, SetStateBrick,
    TryExceptBrick, WaitBrick, WithAsyncModVariableBrick,
};
use crate::errors::BrickNotFoundError;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Lookup table from brick identifier to implementation.
///
/// Populated at startup; lookups afterwards are O(1) and side-effect free.
#[derive(Default)]
pub struct BrickRegistry {
    bricks: DashMap<String, Arc<dyn Brick>>,
}

impl BrickRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in bricks.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(IfElseBrick));
        registry.register(Arc::new(TryExceptBrick));
        registry.register(Arc::new(RunBrick));
        registry.register(Arc::new(ForEachBrick));
        registry.register(Arc::new(RetryBrick));
        registry.register(Arc::new(AssignModVariableBrick));
        registry.register(Arc::new(GetStateBrick));
        registry.register(Arc::new(SetStateBrick));
        registry.register(Arc::new(WithAsyncModVariableBrick));
        registry.register(Arc::new(EchoBrick));
        registry.register(Arc::new(IdentityBrick));
        registry.register(Arc::new(ErrorBrick));
        registry.register(Arc::new(WaitBrick));
        registry
    }

    /// Registers a brick, replacing any brick with the same id.
    pub fn register(&self, brick: Arc<dyn Brick>) -> Option<Arc<dyn Brick>> {
        self.bricks.insert(brick.id().to_string(), brick)
    }

    /// Looks up a brick.
    pub fn lookup(&self, id: &str) -> Result<Arc<dyn Brick>, BrickNotFoundError> {
        self.bricks
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BrickNotFoundError::new(id))
    }

    /// Returns the capability flags of a brick.
    pub fn capabilities(&self, id: &str) -> Result<BrickCapabilities, BrickNotFoundError> {
        let brick = self.lookup(id)?;
        Ok(BrickCapabilities {
            kind: brick.kind(),
            is_pure: brick.is_pure(),
            is_root_aware: brick.is_root_aware(),
            required_capabilities: brick.required_capabilities(),
            is_control_flow: brick.is_control_flow(),
        })
    }

    /// Returns true if a brick is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.bricks.contains_key(id)
    }

    /// Returns the registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.bricks.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered bricks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    /// Returns true if no bricks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }
}

impl fmt::Debug for BrickRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickRegistry")
            .field("bricks", &self.ids())
            .finish()
    }
}
