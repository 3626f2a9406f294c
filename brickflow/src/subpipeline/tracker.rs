//! Tracker for detached runs.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Information about a detached run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedRunInfo {
    /// The detached run's ID.
    pub run_id: Uuid,
    /// The run that spawned it.
    pub parent_run_id: Uuid,
    /// The trace owner of the run.
    pub owner: String,
    /// The nesting depth at which it was spawned.
    pub depth: u32,
    /// When it was spawned (ISO 8601).
    pub spawned_at: String,
}

/// Thread-safe tracker for detached runs and their task handles.
#[derive(Debug, Default)]
pub struct DetachedRunTracker {
    runs: RwLock<HashMap<Uuid, DetachedRunInfo>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DetachedRunTracker {
    /// Creates a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active run.
    pub fn register(&self, info: DetachedRunInfo) {
        self.runs.write().insert(info.run_id, info);
    }

    /// Unregisters a finished run.
    pub fn unregister(&self, run_id: Uuid) -> Option<DetachedRunInfo> {
        self.runs.write().remove(&run_id)
    }

    /// Gets information about an active run.
    #[must_use]
    pub fn get(&self, run_id: Uuid) -> Option<DetachedRunInfo> {
        self.runs.read().get(&run_id).cloned()
    }

    /// Returns the active runs spawned by a parent.
    #[must_use]
    pub fn children_of(&self, parent_run_id: Uuid) -> Vec<DetachedRunInfo> {
        self.runs
            .read()
            .values()
            .filter(|info| info.parent_run_id == parent_run_id)
            .cloned()
            .collect()
    }

    /// Returns all active runs.
    #[must_use]
    pub fn active(&self) -> Vec<DetachedRunInfo> {
        self.runs.read().values().cloned().collect()
    }

    /// Returns the number of active runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    /// Returns true if no runs are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    /// Stores the task handle of a spawned run.
    pub fn push_handle(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Takes every stored task handle.
    pub fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.handles.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(parent: Uuid) -> DetachedRunInfo {
        DetachedRunInfo {
            run_id: Uuid::now_v7(),
            parent_run_id: parent,
            owner: "button".into(),
            depth: 1,
            spawned_at: crate::utils::iso_timestamp(),
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let tracker = DetachedRunTracker::new();
        let parent = Uuid::now_v7();
        let child = info(parent);
        let run_id = child.run_id;

        tracker.register(child);
        tracker.register(info(Uuid::now_v7()));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.children_of(parent).len(), 1);
        assert!(tracker.get(run_id).is_some());

        assert!(tracker.unregister(run_id).is_some());
        assert!(tracker.get(run_id).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_handles_are_drained() {
        let tracker = DetachedRunTracker::new();
        tracker.push_handle(tokio::spawn(async {}));
        tracker.push_handle(tokio::spawn(async {}));

        let handles = tracker.take_handles();
        assert!(!handles.is_empty());
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(tracker.take_handles().is_empty());
    }
}
