//! Provider Traits
//!
//! The two contracts the orchestrator consumes. Adapters translate a
//! concrete HTTP API into these result-or-error shapes so that callers never
//! see raw provider payloads.

use async_trait::async_trait;

use super::types::{
    Completion, GeneratedCode, GenerationOptions, LlmError, LlmResult, ProviderKind,
};

/// Planning/detection provider: free-form instructions in, text out.
#[async_trait]
pub trait PlanningProvider: Send + Sync {
    /// Which provider this is (used for cost accounting)
    fn kind(&self) -> ProviderKind;

    /// Run one completion.
    ///
    /// # Arguments
    /// * `instructions` - The full instruction text
    /// * `temperature` - Optional temperature override
    async fn complete(&self, instructions: &str, temperature: Option<f32>)
        -> LlmResult<Completion>;
}

/// Code generation provider: constructed prompt in, application code out.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Which provider this is (used for cost accounting)
    fn kind(&self) -> ProviderKind;

    /// Generate code for a constructed prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions)
        -> LlmResult<GeneratedCode>;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: ProviderKind) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: ProviderKind) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        408 | 504 => LlmError::Timeout { seconds: 0 },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
