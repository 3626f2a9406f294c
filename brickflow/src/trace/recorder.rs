//! Trace recorders.

use super::record::{TraceEntry, TraceKey, TraceOutcome, TraceRecord};
use crate::config::TraceRetentionConfig;
use crate::errors::SerializedError;
use crate::pipeline::InstanceId;
use crate::utils::now_utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use uuid::Uuid;

/// Receives trace events from the executor and serves them to readers.
///
/// Writes are append-only from the executor's perspective. Readers must
/// tolerate records that were entered but never exited.
pub trait TraceRecorder: Send + Sync + Debug {
    /// Records that an invocation was entered.
    ///
    /// Entering the same key again replaces the previous record.
    fn record_enter(&self, entry: TraceEntry);

    /// Records a successful exit.
    fn record_exit(&self, key: &TraceKey, output: Value);

    /// Records a failed exit.
    fn record_error(&self, key: &TraceKey, error: SerializedError);

    /// Records a skipped invocation.
    fn record_skip(&self, entry: TraceEntry, reason: &str);

    /// Returns the records of an instance in the latest run that executed it.
    fn latest_run(&self, instance_id: &InstanceId) -> Vec<TraceRecord>;

    /// Returns all records of an owner's most recent top-level run.
    fn latest_owner_run(&self, owner: &str) -> Vec<TraceRecord>;

    /// Returns all records of a run.
    fn run_records(&self, run_id: Uuid) -> Vec<TraceRecord>;

    /// Removes every run belonging to an owner, or the run with that id.
    fn clear(&self, scope_id: &str);
}

#[derive(Debug)]
struct RunTrace {
    owner: String,
    records: Vec<TraceRecord>,
    /// Detached runs retained and evicted together with this run.
    detached: Vec<Uuid>,
}

impl RunTrace {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            records: Vec::new(),
            detached: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    runs: HashMap<Uuid, RunTrace>,
    /// Top-level runs per owner, oldest first.
    owner_runs: HashMap<String, VecDeque<Uuid>>,
    latest_by_instance: HashMap<InstanceId, Uuid>,
}

impl RecorderState {
    /// Opens the run a record belongs to.
    ///
    /// Only top-level runs occupy an owner's retention slots. A detached run
    /// lives in the slot of its top-level run and is dropped when that run is
    /// evicted, so records of an already evicted tree are discarded.
    fn open_run(&mut self, record: &TraceRecord, max_runs: usize) -> bool {
        if self.runs.contains_key(&record.run_id) {
            return true;
        }

        if let Some(root_run_id) = record.root_run_id {
            let Some(root) = self.runs.get_mut(&root_run_id) else {
                return false;
            };
            root.detached.push(record.run_id);
            self.runs.insert(record.run_id, RunTrace::new(&record.owner));
            return true;
        }

        self.runs.insert(record.run_id, RunTrace::new(&record.owner));
        let queue = self.owner_runs.entry(record.owner.clone()).or_default();
        queue.push_back(record.run_id);
        let excess = queue.len().saturating_sub(max_runs);
        let evicted: Vec<Uuid> = queue.drain(..excess).collect();
        for run_id in evicted {
            self.remove_run(run_id);
        }
        true
    }

    /// Removes a run and the detached runs it spawned.
    fn remove_run(&mut self, run_id: Uuid) {
        let Some(run) = self.runs.remove(&run_id) else {
            return;
        };
        self.latest_by_instance.retain(|_, latest| *latest != run_id);
        for child in run.detached {
            self.remove_run(child);
        }
    }

    fn upsert(&mut self, record: TraceRecord, max_runs: usize) {
        if !self.open_run(&record, max_runs) {
            return;
        }
        self.latest_by_instance
            .insert(record.instance_id.clone(), record.run_id);

        let Some(run) = self.runs.get_mut(&record.run_id) else {
            return;
        };
        let key = record.key();
        match run.records.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = record,
            None => run.records.push(record),
        }
    }

    fn finish(&mut self, key: &TraceKey, outcome: TraceOutcome) -> bool {
        let Some(run) = self.runs.get_mut(&key.run_id) else {
            return false;
        };
        let open = run.records.iter_mut().find(|record| {
            record.instance_id == key.instance_id
                && record.branches == key.branches
                && !record.outcome.is_terminal()
        });
        match open {
            Some(record) => {
                record.outcome = outcome;
                record.ended_at = Some(now_utc());
                true
            }
            None => false,
        }
    }
}

/// An in-memory recorder keeping the most recent runs of each owner.
#[derive(Debug, Default)]
pub struct InMemoryTraceRecorder {
    state: RwLock<RecorderState>,
    retention: TraceRetentionConfig,
}

impl InMemoryTraceRecorder {
    /// Creates a recorder with default retention.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder with the given retention.
    #[must_use]
    pub fn with_retention(retention: TraceRetentionConfig) -> Self {
        Self {
            state: RwLock::new(RecorderState::default()),
            retention,
        }
    }

    fn max_runs(&self) -> usize {
        self.retention.max_runs_per_owner.max(1)
    }

    /// Returns the retained run ids of an owner, oldest first.
    #[must_use]
    pub fn runs_for_owner(&self, owner: &str) -> Vec<Uuid> {
        self.state
            .read()
            .owner_runs
            .get(owner)
            .map(|runs| runs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns every retained record.
    #[must_use]
    pub fn all_records(&self) -> Vec<TraceRecord> {
        let state = self.state.read();
        let mut records: Vec<_> = state
            .runs
            .values()
            .flat_map(|run| run.records.iter().cloned())
            .collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }
}

impl TraceRecorder for InMemoryTraceRecorder {
    fn record_enter(&self, entry: TraceEntry) {
        let max_runs = self.max_runs();
        self.state
            .write()
            .upsert(TraceRecord::from_entry(entry, TraceOutcome::Running), max_runs);
    }

    fn record_exit(&self, key: &TraceKey, output: Value) {
        if !self.state.write().finish(key, TraceOutcome::Succeeded { output }) {
            tracing::debug!(
                run_id = %key.run_id,
                instance_id = %key.instance_id,
                "Exit without an open trace record"
            );
        }
    }

    fn record_error(&self, key: &TraceKey, error: SerializedError) {
        if !self.state.write().finish(key, TraceOutcome::Failed { error }) {
            tracing::debug!(
                run_id = %key.run_id,
                instance_id = %key.instance_id,
                "Error without an open trace record"
            );
        }
    }

    fn record_skip(&self, entry: TraceEntry, reason: &str) {
        let max_runs = self.max_runs();
        let outcome = TraceOutcome::Skipped {
            reason: reason.to_string(),
        };
        self.state
            .write()
            .upsert(TraceRecord::from_entry(entry, outcome), max_runs);
    }

    fn latest_run(&self, instance_id: &InstanceId) -> Vec<TraceRecord> {
        let state = self.state.read();
        let Some(run) = state
            .latest_by_instance
            .get(instance_id)
            .and_then(|run_id| state.runs.get(run_id))
        else {
            return Vec::new();
        };
        run.records
            .iter()
            .filter(|record| &record.instance_id == instance_id)
            .cloned()
            .collect()
    }

    fn latest_owner_run(&self, owner: &str) -> Vec<TraceRecord> {
        let state = self.state.read();
        state
            .owner_runs
            .get(owner)
            .and_then(VecDeque::back)
            .and_then(|run_id| state.runs.get(run_id))
            .map(|run| run.records.clone())
            .unwrap_or_default()
    }

    fn run_records(&self, run_id: Uuid) -> Vec<TraceRecord> {
        self.state
            .read()
            .runs
            .get(&run_id)
            .map(|run| run.records.clone())
            .unwrap_or_default()
    }

    fn clear(&self, scope_id: &str) {
        let mut state = self.state.write();
        let doomed: Vec<Uuid> = state
            .runs
            .iter()
            .filter(|(run_id, run)| run.owner == scope_id || run_id.to_string() == scope_id)
            .map(|(run_id, _)| *run_id)
            .collect();

        for run_id in &doomed {
            state.remove_run(*run_id);
        }
        for queue in state.owner_runs.values_mut() {
            queue.retain(|run_id| !doomed.contains(run_id));
        }
        state.owner_runs.retain(|_, queue| !queue.is_empty());
    }
}
