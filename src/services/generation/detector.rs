//! Parameter Detector
//!
//! One planning-provider call per prompt. The provider is asked for a JSON
//! object keyed by parameter name; the reply is parsed into the closed
//! parameter model. Keys outside the model, and values that do not fit their
//! key, are rejected and reported instead of merged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use bunyan_core::{DetectedParameters, ParameterKey, ParameterValue};
use bunyan_llm::extract::extract_json_object;
use bunyan_llm::{call_bounded, CallPolicy, PlanningProvider, ProviderKind, TokenUsage};

use crate::models::generation::DetectionContext;
use crate::utils::error::{AppError, AppResult};

/// Temperature for detection calls; extraction wants little creativity
const DETECTION_TEMPERATURE: f32 = 0.2;

/// Confidence assumed for a bare value with no confidence attached
const BARE_VALUE_CONFIDENCE: f64 = 0.5;

/// What a detection call produced
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub parameters: DetectedParameters,
    pub usage: TokenUsage,
    pub provider: ProviderKind,
    /// Keys the provider reported that were unknown or ill-shaped
    pub rejected_keys: Vec<String>,
}

/// A detection that produced no parameters.
///
/// `usage` is set when the provider answered but the reply could not be
/// parsed; those tokens were still spent.
#[derive(Debug)]
pub struct DetectionFailure {
    pub error: AppError,
    pub usage: Option<TokenUsage>,
    pub provider: ProviderKind,
}

impl From<DetectionFailure> for AppError {
    fn from(failure: DetectionFailure) -> Self {
        failure.error
    }
}

/// Extracts structured parameters from a free-text request
pub struct ParameterDetector {
    provider: Arc<dyn PlanningProvider>,
    policy: CallPolicy,
}

impl ParameterDetector {
    pub fn new(provider: Arc<dyn PlanningProvider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    /// Detect parameters for `prompt`. Never touches the session store.
    pub async fn detect(
        &self,
        prompt: &str,
        context: &DetectionContext,
    ) -> Result<DetectionOutcome, DetectionFailure> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(self.failure(AppError::missing_field("prompt"), None));
        }

        let instructions = build_detection_instructions(prompt, context);
        let provider = self.provider.clone();
        let completion = call_bounded(&self.policy, "detection", || {
            let provider = provider.clone();
            let instructions = instructions.clone();
            async move {
                provider
                    .complete(&instructions, Some(DETECTION_TEMPERATURE))
                    .await
            }
        })
        .await
        .map_err(|e| self.failure(e.into(), None))?;

        let (parameters, rejected_keys) = parse_detection(&completion.text).map_err(|e| {
            warn!(tokens = completion.tokens_used(), error = %e, "detection reply was unusable");
            self.failure(e, Some(completion.usage))
        })?;
        if !rejected_keys.is_empty() {
            warn!(rejected = ?rejected_keys, "detector reported keys outside the parameter model");
        }
        debug!(
            fields = parameters.fields.len(),
            tokens = completion.tokens_used(),
            "parameters detected"
        );

        Ok(DetectionOutcome {
            parameters,
            usage: completion.usage,
            provider: self.provider.kind(),
            rejected_keys,
        })
    }

    fn failure(&self, error: AppError, usage: Option<TokenUsage>) -> DetectionFailure {
        DetectionFailure {
            error,
            usage,
            provider: self.provider.kind(),
        }
    }
}

/// Fixed instruction template for detection
pub fn build_detection_instructions(prompt: &str, context: &DetectionContext) -> String {
    let mut keys = String::new();
    for key in ParameterKey::ALL {
        let shape = match key.options() {
            [] => match key.kind() {
                bunyan_core::ValueKind::List => "array of strings".to_string(),
                _ => "string".to_string(),
            },
            options => format!("one of {}", options.join("|")),
        };
        keys.push_str(&format!("- \"{}\": {}\n", key.as_str(), shape));
    }

    let mut context_section = String::new();
    if let Some(name) = context.project_name.as_deref().filter(|n| !n.trim().is_empty()) {
        context_section.push_str(&format!("\n## Project Name\n{}\n", name.trim()));
    }
    if !context.previous_prompts.is_empty() {
        context_section.push_str("\n## Earlier Requests (oldest first)\n");
        for previous in &context.previous_prompts {
            context_section.push_str(&format!("- {}\n", previous));
        }
    }

    format!(
        "You extract structured requirements from an Arabic request to build a web application.\n\n\
         Respond with ONLY a JSON object. Each key is one of the parameters below; each value is\n\
         an object {{\"value\": ..., \"confidence\": 0.0-1.0}}. Omit parameters the request does not\n\
         mention. Do not invent parameters outside this list.\n\n\
         ## Parameters\n{keys}{context_section}\n\
         ## Request\n{prompt}\n"
    )
}

/// Parse provider output into parameters plus rejected keys.
///
/// Accepts either a flat object or one wrapped in `"parameters"`. Output with
/// no JSON object in it is a detection failure.
pub fn parse_detection(text: &str) -> AppResult<(DetectedParameters, Vec<String>)> {
    let json_str = extract_json_object(text)
        .ok_or_else(|| AppError::detection("No JSON found in detection response"))?;
    let parsed: Value = serde_json::from_str(&json_str)
        .map_err(|e| AppError::detection(format!("Failed to parse detection JSON: {e}")))?;

    let object = match parsed.get("parameters") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => match parsed {
            Value::Object(map) => map,
            _ => return Err(AppError::detection("Detection response is not a JSON object")),
        },
    };

    let mut parameters = DetectedParameters::new();
    let mut rejected = Vec::new();
    for (name, raw) in object {
        let Ok(key) = name.parse::<ParameterKey>() else {
            rejected.push(name);
            continue;
        };
        let (raw_value, confidence) = match &raw {
            Value::Object(field) => (
                field.get("value").cloned().unwrap_or(Value::Null),
                field
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(BARE_VALUE_CONFIDENCE),
            ),
            other => (other.clone(), BARE_VALUE_CONFIDENCE),
        };
        if raw_value.is_null() {
            continue;
        }
        let Some(value) = ParameterValue::from_json(key, &raw_value) else {
            rejected.push(name);
            continue;
        };
        if parameters.set(key, value, confidence).is_err() {
            rejected.push(name);
        }
    }

    Ok((parameters, rejected))
}
