use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::InboxResult;
use crate::modules::llm::{CompletionRequest, CompletionResponse, LlmClient};
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;

/// OpenAI-compatible chat-completions client, grounded on
/// `OutlookGraphClient`'s bearer-token reqwest wrapper (C2) rather than
/// a provider SDK — the same thin-HTTP-client shape the teacher already
/// uses for its one external dependency, kept consistent here instead
/// of introducing a second, heavier client style for a second seam.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> InboxResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self { http, base_url, api_key })
    }

    /// Builds a client from process-wide settings; fails only if
    /// `llm_api_key` is unset, a fatal configuration error (spec.md §7.6).
    pub fn from_settings() -> InboxResult<Self> {
        let api_key = SETTINGS.llm_api_key.clone().ok_or_else(|| {
            raise_error!("LLM_API_KEY is not configured", ErrorCode::MissingConfiguration)
        })?;
        Self::new(api_key, SETTINGS.llm_base_url.clone(), SETTINGS.llm_request_timeout_secs)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> InboxResult<CompletionResponse> {
        let response_format = request
            .json_schema_hint
            .as_ref()
            .map(|_| serde_json::json!({ "type": "json_object" }));

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system_prompt },
                ChatMessage { role: "user", content: &request.user_prompt },
            ],
            response_format,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(raise_error!(
                "LLM provider rate limit exceeded",
                ErrorCode::CollaboratorQuotaExhausted
            ));
        }
        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("LLM completion request failed: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }

        let parsed: ChatResponse = resp.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(CompletionResponse { text })
    }
}
