#![forbid(unsafe_code)]
//! Profile-driven verification command selection, execution, failure
//! signature, and failure summarization — spec.md §4.6.

mod external;
mod profile;
mod runner;
mod selection;
mod signature;
mod summary;

pub use external::{
    AllowAllPolicy, CommandExecution, CommandPolicy, MemoryEntry, ProceduralMemory,
    SafeCommandRunner, TargetingManager, ToolchainDetector, ToolchainInfo,
};
pub use profile::{AutoConfig, CustomStep, ProfileMode, Task, TestScope, VerificationProfile};
pub use runner::{write_command_sources, VerificationRunner};
pub use selection::{select_command, Selection};
pub use signature::failure_signature;
pub use summary::{digest_failure, suggested_action, CheckDigest};
