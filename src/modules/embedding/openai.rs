use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::modules::embedding::EmbeddingModel;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::InboxResult;
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;

/// OpenAI-compatible `/embeddings` client. `embedding_base_url` defaults
/// to a local text-embeddings server (the same API shape `fastembed`-
/// style local runtimes and hosted providers both speak), so this one
/// client covers both "local-embedding" and a hosted model by pointing
/// it at a different base URL — grounded on the same reqwest-direct
/// shape as `modules::llm::openai::OpenAiClient` (C2b).
pub struct OpenAiEmbeddingModel {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingModel {
    pub fn from_settings() -> InboxResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(SETTINGS.llm_request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: SETTINGS.embedding_base_url.clone(),
            api_key: SETTINGS.embedding_api_key.clone(),
            model: SETTINGS.embedding_model.clone(),
            dimension: SETTINGS.embedding_dimension,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> InboxResult<Vec<Vec<f32>>> {
        let mut req = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingsRequest { model: &self.model, input: texts });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("embeddings request failed: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }

        let mut parsed: EmbeddingsResponse = resp.json().await?;
        parsed.data.sort_by_key(|e| e.index);
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}
