#![forbid(unsafe_code)]
//! Per-run artifact directory layout, manifest persistence, and the
//! append-only event trace writer — spec.md §3 (Run Artifacts) and §6.

mod layout;
mod manifest;
mod redact;
mod trace;

pub use layout::RunLayout;
pub use manifest::ManifestWriter;
pub use redact::redact;
pub use trace::FileEventSink;
