#![forbid(unsafe_code)]
//! Pipe/PTY process supervision for provider subprocess adapters, spec.md §4.1.
//!
//! A [`ProcessSupervisor`] owns exactly one child process for its lifetime:
//! it builds a minimal, allowlisted environment, spawns in pipe or PTY mode
//! (falling back to pipe with a diagnostic when PTY allocation fails),
//! enforces a hard cap on captured output, and exposes the three read
//! primitives the provider adapters and run engine use to drive a child to
//! completion.

mod capture;
mod env;
mod error;
mod supervisor;

pub use capture::{CaptureCapExceeded, RollingBuffer};
pub use env::EnvPolicy;
pub use error::ProcessError;
pub use supervisor::{
    ChunkEvent, ExitOutcome, ProcessSupervisor, SpawnMode, SpawnRequest, SupervisorState,
};
