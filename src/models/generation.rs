//! Generation Models
//!
//! Questions, plans, constructed prompts, and the request/response payloads
//! of the generation command handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use bunyan_core::{DetectedParameters, ParameterKey, SessionStage};
use bunyan_quality_gates::ValidationResult;

use super::analytics::CostSummary;
use super::session::Session;

/// Rough size of the requested app (telemetry only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }
}

/// One selectable answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
}

/// A structured clarifying question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyingQuestion {
    /// Question id; equal to the parameter key it resolves
    pub id: String,
    pub key: ParameterKey,
    /// Arabic question text
    pub text: String,
    /// Permissible options; empty means free text
    pub options: Vec<QuestionOption>,
    /// Accepts several values (list parameters)
    pub multiple: bool,
    pub priority: u8,
    /// Current confidence of the parameter
    pub confidence: f64,
}

impl ClarifyingQuestion {
    pub fn is_free_text(&self) -> bool {
        self.options.is_empty()
    }
}

/// Question-id to answer; a string for single answers, an array for lists
pub type ClarifyingAnswers = BTreeMap<String, serde_json::Value>;

/// A section of the planned app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
}

/// Optional intermediate structure from the planning provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPlan {
    #[serde(default)]
    pub sections: Vec<PlanSection>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl GenerationPlan {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.notes.is_empty()
    }
}

/// Final instruction text plus its size estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructedPrompt {
    pub text: String,
    pub complexity: Complexity,
}

/// Extra context for a detection call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionContext {
    #[serde(default)]
    pub previous_prompts: Vec<String>,
    pub project_name: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub prompt: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub answers: ClarifyingAnswers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    pub session_id: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub session_id: Option<String>,
    pub code: Option<String>,
    /// Provider name to total tokens, e.g. `{"geminiPro": 100, "deepseek": 2000}`
    pub tokens_used: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumableRequest {
    pub project_id: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub session_id: String,
    pub stage: SessionStage,
    pub confidence: f64,
    pub ready_for_generation: bool,
    pub parameters: DetectedParameters,
    pub questions: Vec<ClarifyingQuestion>,
    /// Keys the provider reported that are outside the parameter model
    pub rejected_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersResponse {
    pub ready_for_generation: bool,
    pub confidence: f64,
    pub stage: SessionStage,
    pub questions: Vec<ClarifyingQuestion>,
    /// Answer ids that were unknown or did not fit the question
    pub ignored_answers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub session_id: String,
    pub stage: SessionStage,
    pub code: String,
    pub complexity: Complexity,
    pub credits_debited: i64,
    pub cost_usd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_fixed_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostSummary>,
    pub stage: SessionStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumableResponse {
    pub has_resumable_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}
