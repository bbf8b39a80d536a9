//! OpenAI-compatible chat completion client.

use super::{Completion, CompletionRequest, LlmClient, LlmError};
use crate::config::LlmEndpoint;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl OpenAiClient {
    pub fn new(endpoint: LlmEndpoint) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, endpoint })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let raw_body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        parse_response(&raw_body)
    }
}

fn parse_response(raw_body: &str) -> Result<Completion, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(raw_body)
        .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::MalformedResponse("response has no message content".into()))?;

    debug!(
        model = ?parsed.model,
        content_len = text.len(),
        "Completion received"
    );

    Ok(Completion {
        text,
        model: parsed.model,
        total_tokens: parsed.usage.and_then(|u| u.total_tokens),
    })
}
