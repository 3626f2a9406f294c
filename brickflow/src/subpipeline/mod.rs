//! Detached (fire-and-forget) sub-pipeline runs.
//!
//! A detached run gets its own run id and trace records, and is tracked here
//! until it completes so callers can await outstanding work.

mod tracker;

pub use tracker::{DetachedRunInfo, DetachedRunTracker};
