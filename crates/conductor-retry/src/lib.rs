#![forbid(unsafe_code)]
//! Retry/backoff/cancellation wrapper around provider calls, spec.md §4.3.

mod abort;
mod engine;
mod schedule;

pub use abort::AbortSignal;
pub use engine::{call_with_retry, RetryContext};
pub use schedule::{compute_delay, RetrySchedule};
