use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use conductor_types::{ProviderRequest, ProviderResponse, StreamEvent};
use futures_core::Stream;
use std::pin::Pin;

/// Type-erased stream of provider delta events, mirroring the Codex
/// wrapper's `DynThreadEventStream` shape.
pub type DynStreamEvents = Pin<Box<dyn Stream<Item = Result<StreamEvent, OrchestratorError>> + Send>>;

/// Capabilities an adapter reports about itself, consulted by callers that
/// need to know before building a request (e.g. whether JSON mode or tool
/// calling is available for this vendor/binary).
#[derive(Debug, Clone, Default)]
pub struct AdapterCapabilities {
    pub supports_json_mode: bool,
    pub supports_tool_calls: bool,
    pub supports_streaming: bool,
}

/// The uniform provider interface spec.md §4.4 requires: every HTTP and
/// subprocess adapter implements this, so the retry engine and run engine
/// never branch on vendor.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> AdapterCapabilities;

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, OrchestratorError>;

    /// Streaming is optional; adapters that can't stream return an error
    /// rather than silently falling back, so callers can detect the gap via
    /// `capabilities().supports_streaming` before calling this.
    async fn stream(&self, request: &ProviderRequest) -> Result<DynStreamEvents, OrchestratorError> {
        let _ = request;
        Err(OrchestratorError::config(format!(
            "{} does not support streaming",
            self.id()
        )))
    }
}
