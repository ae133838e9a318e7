//! DeepSeek Provider
//!
//! OpenAI-compatible chat completions adapter. Serves as the default code
//! generation provider and can also act as a planning provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::extract::extract_code;
use super::http_client::build_http_client;
use super::provider::{missing_api_key_error, parse_http_error, GenerationProvider, PlanningProvider};
use super::types::{
    Completion, GeneratedCode, GenerationOptions, LlmError, LlmResult, ProviderConfig,
    ProviderKind, TokenUsage,
};

/// Default DeepSeek API endpoint
const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";

/// Transport timeout for the underlying client
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// DeepSeek provider
pub struct DeepSeekProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl DeepSeekProvider {
    /// Create a new DeepSeek provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))?;
        Ok(Self { config, client })
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEEPSEEK_API_URL)
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        user: &str,
        system: Option<&str>,
        temperature: Option<f32>,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": user
        }));

        serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": temperature.unwrap_or(self.config.temperature),
            "stream": false,
            "messages": messages,
        })
    }

    /// Send one chat completion and decode the response
    async fn send(&self, body: serde_json::Value) -> LlmResult<ChatResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error(ProviderKind::DeepSeek))?;

        let response = self
            .client
            .post(self.base_url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        seconds: CLIENT_TIMEOUT_SECS,
                    }
                } else {
                    LlmError::NetworkError {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, ProviderKind::DeepSeek));
        }

        serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
            message: format!("Failed to parse response: {}", e),
        })
    }
}

/// Flattened view of a chat response
struct ParsedChat {
    text: String,
    usage: TokenUsage,
    model: String,
    truncated: bool,
}

fn parse_response(response: ChatResponse) -> LlmResult<ParsedChat> {
    let choice = response.choices.into_iter().next();
    let truncated = choice
        .as_ref()
        .and_then(|c| c.finish_reason.as_deref())
        .map(|r| r == "length")
        .unwrap_or(false);
    let text = choice
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| LlmError::ParseError {
            message: "DeepSeek returned no message content".to_string(),
        })?;

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(ParsedChat {
        text,
        usage,
        model: response.model,
        truncated,
    })
}

#[async_trait]
impl PlanningProvider for DeepSeekProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    async fn complete(
        &self,
        instructions: &str,
        temperature: Option<f32>,
    ) -> LlmResult<Completion> {
        let body = self.build_request_body(instructions, None, temperature);
        let parsed = parse_response(self.send(body).await?)?;
        debug!(
            provider = "deepseek",
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );
        Ok(Completion {
            text: parsed.text,
            usage: parsed.usage,
            model: parsed.model,
        })
    }
}

#[async_trait]
impl GenerationProvider for DeepSeekProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> LlmResult<GeneratedCode> {
        let body = self.build_request_body(prompt, options.system.as_deref(), options.temperature);
        let parsed = parse_response(self.send(body).await?)?;

        let mut issues = Vec::new();
        if parsed.truncated {
            issues.push("Output hit the token limit and may be incomplete".to_string());
        }

        Ok(GeneratedCode {
            code: extract_code(&parsed.text),
            usage: parsed.usage,
            model: parsed.model,
            issues,
            vulnerabilities: Vec::new(),
        })
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
