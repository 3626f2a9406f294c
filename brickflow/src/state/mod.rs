//! Mod variable state.
//!
//! State lives in namespaces (shared, per mod, per component). The store is
//! injected into every brick through its options, never reached as a global,
//! and the persistence medium is a pluggable [`StateBackend`].

mod merge;
mod store;

pub use merge::{merge_state, MergeStrategy};
pub use store::{
    InMemoryStateBackend, ModVariableStore, StateBackend, StateChange, StateNamespace,
};
