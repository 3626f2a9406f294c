//! Testing utilities for brickflow pipelines.
//!
//! This module provides:
//! - Mock bricks that record their calls
//! - A harness wiring an executor to inspectable collaborators
//! - Assertions over run results and trace records

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_run_failed, assert_run_failed_with, assert_run_output, assert_run_succeeded,
    assert_trace_count, assert_trace_failed, assert_trace_skipped, assert_trace_succeeded,
};
pub use fixtures::{TestContext, TestHarness};
pub use mocks::{FailingBrick, MockBrick, RecordingBrick, SlowBrick};
