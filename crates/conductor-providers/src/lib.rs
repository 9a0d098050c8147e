#![forbid(unsafe_code)]
//! Provider adapters: a uniform `ProviderAdapter` trait implemented by HTTP
//! chat-style adapters and by subprocess-driven CLI agents, spec.md §4.4.

mod adapter;
mod capabilities;
mod http;
mod subprocess;

pub use adapter::{AdapterCapabilities, DynStreamEvents, ProviderAdapter};
pub use capabilities::{
    parse_version, BinaryFingerprint, CapabilityCachePolicy, CapabilitySnapshot, VersionInfo,
};
pub use http::{HttpAdapter, HttpAdapterConfig};
pub use subprocess::claude_code::ClaudeCodeCallbacks;
pub use subprocess::codex::CodexCallbacks;
pub use subprocess::{IdlePromptProfile, SubprocessDriver, VendorCallbacks, DIFF_ENFORCEMENT_INSTRUCTION};
