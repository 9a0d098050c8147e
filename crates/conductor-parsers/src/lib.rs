#![forbid(unsafe_code)]
//! Recovers structured data from free-form, possibly adversarial, model and
//! subprocess output: unified diffs, numbered/bulleted plans, token usage,
//! and ANSI-sanitized text.

mod diff;
mod plan;
mod sanitize;
mod usage;

pub use diff::extract_diff;
pub use plan::extract_plan;
pub use sanitize::{normalize_newlines, sanitize};
pub use usage::extract_usage;
