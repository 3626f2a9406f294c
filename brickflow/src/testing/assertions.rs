//! Test assertions for run results and trace records.

use serde_json::Value;

use crate::pipeline::{InstanceId, RunResult};
use crate::trace::{TraceOutcome, TraceRecord};

/// Asserts that the run completed.
pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "Expected success, got error: {:?}",
        result.error()
    );
}

/// Asserts that the run failed.
pub fn assert_run_failed(result: &RunResult) {
    assert!(
        !result.is_success(),
        "Expected failure, got output: {:?}",
        result.output()
    );
}

/// Asserts that the run failed with an error of the given type name.
pub fn assert_run_failed_with(result: &RunResult, name: &str) {
    let actual = result.error().map(crate::errors::BrickflowError::name);
    assert_eq!(
        actual,
        Some(name),
        "Expected a {name}, got {:?}",
        result.error()
    );
}

/// Asserts that the run produced `expected`.
pub fn assert_run_output(result: &RunResult, expected: &Value) {
    assert_eq!(
        result.output(),
        Some(expected),
        "Expected output {expected}, got {:?}",
        result.result
    );
}

fn records_for<'a>(records: &'a [TraceRecord], instance_id: &str) -> Vec<&'a TraceRecord> {
    let instance_id = InstanceId::from(instance_id);
    records
        .iter()
        .filter(|record| record.instance_id == instance_id)
        .collect()
}

/// Asserts that an instance has exactly `expected` records.
pub fn assert_trace_count(records: &[TraceRecord], instance_id: &str, expected: usize) {
    let actual = records_for(records, instance_id).len();
    assert_eq!(
        actual, expected,
        "Expected {expected} records for '{instance_id}', got {actual}"
    );
}

/// Asserts that an instance has a succeeded record.
pub fn assert_trace_succeeded(records: &[TraceRecord], instance_id: &str) {
    let found = records_for(records, instance_id)
        .iter()
        .any(|record| matches!(record.outcome, TraceOutcome::Succeeded { .. }));
    assert!(found, "Expected a succeeded record for '{instance_id}'");
}

/// Asserts that an instance has a failed record.
pub fn assert_trace_failed(records: &[TraceRecord], instance_id: &str) {
    let found = records_for(records, instance_id)
        .iter()
        .any(|record| record.is_failed());
    assert!(found, "Expected a failed record for '{instance_id}'");
}

/// Asserts that an instance was skipped for `reason`.
pub fn assert_trace_skipped(records: &[TraceRecord], instance_id: &str, reason: &str) {
    let found = records_for(records, instance_id).iter().any(|record| {
        matches!(&record.outcome, TraceOutcome::Skipped { reason: actual } if actual == reason)
    });
    assert!(
        found,
        "Expected '{instance_id}' to be skipped for '{reason}'"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BrickExecutionError;
    use crate::pipeline::{BrickInvocation, Pipeline};
    use crate::testing::TestHarness;
    use serde_json::json;
    use uuid::Uuid;

    fn result(value: Result<Value, BrickExecutionError>) -> RunResult {
        RunResult {
            run_id: Uuid::now_v7(),
            duration_ms: 0.0,
            result: value.map_err(Into::into),
        }
    }

    #[test]
    fn test_assert_run_succeeded() {
        let result = result(Ok(json!(1)));
        assert_run_succeeded(&result);
        assert_run_output(&result, &json!(1));
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_run_succeeded_fails() {
        assert_run_succeeded(&result(Err(BrickExecutionError::new("boom"))));
    }

    #[test]
    fn test_assert_run_failed_with() {
        let result = result(Err(BrickExecutionError::new("boom")));
        assert_run_failed(&result);
        assert_run_failed_with(&result, "BrickExecutionError");
    }

    #[tokio::test]
    async fn test_trace_assertions() {
        let harness = TestHarness::new();
        let pipeline = Pipeline::new(vec![
            BrickInvocation::new(crate::bricks::ids::ECHO)
                .with_instance_id("echo")
                .with_config("message", "hi"),
            BrickInvocation::new(crate::bricks::ids::ECHO)
                .with_instance_id("never")
                .with_condition(json!(false))
                .with_config("message", "no"),
        ]);

        let result = harness.run(&pipeline, Value::Null).await;
        let records = harness.records(&result);

        assert_trace_succeeded(&records, "echo");
        assert_trace_count(&records, "echo", 1);
        assert_trace_skipped(&records, "never", "condition");
    }

    #[test]
    #[should_panic(expected = "Expected a failed record")]
    fn test_assert_trace_failed_fails() {
        assert_trace_failed(&[], "missing");
    }
}
