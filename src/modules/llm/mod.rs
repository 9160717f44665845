pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::modules::error::InboxResult;

/// Collaborator seam (spec.md §6): triage classification, thread
/// summarization, working-memory extraction and alert-rule parsing all
/// delegate to an external model. This engine depends only on the
/// typed request/response contract, never on a concrete provider SDK.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> InboxResult<CompletionResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// When set, the caller expects the response to be JSON matching
    /// this shape and the implementation should request structured
    /// output from the provider if it supports it.
    pub json_schema_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}
