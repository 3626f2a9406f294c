//! Cooperative cancellation for pipeline runs.
//!
//! Every run carries a [`CancellationToken`] as its abort signal. Bricks
//! observe it either by polling [`CancellationToken::is_cancelled`] or by
//! awaiting [`CancellationToken::cancelled`] inside a `tokio::select!`.

mod token;

pub use token::CancellationToken;
