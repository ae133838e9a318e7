//! Gemini Provider
//!
//! Adapter for the Gemini `generateContent` REST API. Default planning and
//! detection provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::extract_code;
use super::http_client::build_http_client;
use super::provider::{missing_api_key_error, parse_http_error, GenerationProvider, PlanningProvider};
use super::types::{
    Completion, GeneratedCode, GenerationOptions, LlmError, LlmResult, ProviderConfig,
    ProviderKind, TokenUsage,
};

/// Default Gemini API base
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Gemini provider
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_URL)
            .trim_end_matches('/');
        format!("{}/models/{}:generateContent", base, self.config.model)
    }

    fn build_request(
        &self,
        user: &str,
        system: Option<&str>,
        temperature: Option<f32>,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: user.to_string(),
                }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: temperature.unwrap_or(self.config.temperature),
                max_output_tokens: self.config.max_tokens,
            },
        }
    }

    async fn send(&self, request: &GenerateContentRequest) -> LlmResult<(String, TokenUsage, bool)> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error(ProviderKind::GeminiPro))?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
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
            return Err(parse_http_error(
                status,
                &error_message(&body_text),
                ProviderKind::GeminiPro,
            ));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse Gemini response: {}", e),
            })?;
        parse_response(parsed)
    }
}

/// Text, usage, and whether the candidate was cut off by the token limit
fn parse_response(response: GenerateContentResponse) -> LlmResult<(String, TokenUsage, bool)> {
    let usage = response
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    let candidate = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| LlmError::ParseError {
            message: "Gemini returned no candidates".to_string(),
        })?;

    let truncated = candidate.finish_reason.as_deref() == Some("MAX_TOKENS");
    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::ParseError {
            message: "Gemini returned no text in the response candidates".to_string(),
        });
    }
    Ok((text, usage, truncated))
}

/// Prefer the structured `error.message` when the body carries one
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| {
            let msg = w.error.message?;
            Some(match w.error.status {
                Some(status) if !status.is_empty() => format!("{}: {}", status, msg),
                _ => msg,
            })
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl PlanningProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GeminiPro
    }

    async fn complete(
        &self,
        instructions: &str,
        temperature: Option<f32>,
    ) -> LlmResult<Completion> {
        let request = self.build_request(instructions, None, temperature);
        let (text, usage, _) = self.send(&request).await?;
        debug!(
            provider = "geminiPro",
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "completion received"
        );
        Ok(Completion {
            text,
            usage,
            model: self.config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GeminiPro
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> LlmResult<GeneratedCode> {
        let request = self.build_request(prompt, options.system.as_deref(), options.temperature);
        let (text, usage, truncated) = self.send(&request).await?;
        let mut issues = Vec::new();
        if truncated {
            issues.push("Output hit the token limit and may be incomplete".to_string());
        }
        Ok(GeneratedCode {
            code: extract_code(&text),
            usage,
            model: self.config.model.clone(),
            issues,
            vulnerabilities: Vec::new(),
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
