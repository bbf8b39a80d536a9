//! LLM abstraction layer.
//!
//! The bridge talks to the completion service only through [`LlmClient`], so
//! tests substitute an in-process implementation.

pub mod bridge;
pub mod openai;
pub mod retry;

pub use bridge::{SqlGenerator, strip_code_fence};
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use thiserror::Error;

/// One chat-style completion request: a system and a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model reported by the service, when it reports one
    pub model: Option<String>,
    pub total_tokens: Option<u32>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether another attempt may succeed.
    ///
    /// Network failures, rate limiting and server errors are transient;
    /// other client errors and unparseable replies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}

/// External completion service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Network("reset".into()).is_transient());
        assert!(
            LlmError::Http {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            LlmError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !LlmError::Http {
                status: 401,
                body: "bad key".into()
            }
            .is_transient()
        );
        assert!(!LlmError::MalformedResponse("no choices".into()).is_transient());
    }
}
