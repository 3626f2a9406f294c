//! Execution traces.
//!
//! The executor emits enter/exit/error/skip events for every invocation.
//! Records are keyed by run id, instance id and branch frames, so the debugging
//! UI and the static analyses can look up what happened at any position of the
//! latest run.

mod jsonl;
mod record;
mod recorder;

pub use jsonl::{
    encode_trace_jsonl_line, export_trace_jsonl, import_trace_jsonl, parse_trace_jsonl_line,
    read_trace_jsonl, write_trace_jsonl, TraceJsonlError,
};
pub use record::{TraceEntry, TraceKey, TraceOutcome, TraceRecord};
pub use recorder::{InMemoryTraceRecorder, TraceRecorder};
