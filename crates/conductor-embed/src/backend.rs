use async_trait::async_trait;
use conductor_errors::OrchestratorError;

/// A text-embedding backend, spec.md §4.5. `dims()` and `id()` are cheap,
/// synchronous metadata; `embed_texts` is the only operation that talks to a
/// backend (HTTP call, local model, subprocess) and so is async.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OrchestratorError>;

    fn dims(&self) -> usize;

    fn id(&self) -> &str;
}
