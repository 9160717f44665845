pub mod openai;

use async_trait::async_trait;

use crate::modules::error::InboxResult;

/// Collaborator seam (spec.md §6): the embedding model is external.
/// `modules::embedder` batches/prefixes/packs around this trait; it
/// never depends on a specific model's inference runtime.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Output vector dimension, probed once at startup.
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> InboxResult<Vec<Vec<f32>>>;
}
