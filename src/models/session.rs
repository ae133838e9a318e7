//! Session Models
//!
//! The orchestration session: the unit of state persisted between stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bunyan_core::{DetectedParameters, SessionStage};
use bunyan_quality_gates::{ProviderReport, ValidationResult};

use super::analytics::CostLedger;
use super::generation::{ClarifyingAnswers, Complexity, GenerationPlan};
use crate::utils::error::ErrorCode;

/// Why a session ended in `failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    /// Stage the session was in when it failed
    pub stage: SessionStage,
    /// Error code when the failure came from an error; `None` for a rejected validation
    pub code: Option<ErrorCode>,
    pub message: String,
}

/// Everything a session accumulates besides its core fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Latest overall confidence
    #[serde(default)]
    pub confidence: f64,
    pub project_name: Option<String>,
    /// Earlier prompts, oldest first, fed back into re-detection
    #[serde(default)]
    pub previous_prompts: Vec<String>,
    #[serde(default)]
    pub detection_tokens: u64,
    pub complexity: Option<Complexity>,
    pub plan: Option<GenerationPlan>,
    pub generated_code: Option<String>,
    pub provider_report: Option<ProviderReport>,
    pub validation: Option<ValidationResult>,
    pub auto_fixed_code: Option<String>,
    #[serde(default)]
    pub cost_ledger: CostLedger,
    pub failure: Option<FailureInfo>,
}

/// Orchestration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub stage: SessionStage,
    /// Raw request; never changes after creation
    pub original_prompt: String,
    pub detected_parameters: Option<DetectedParameters>,
    pub answers: ClarifyingAnswers,
    /// Present exactly while the stage is generating, validating, or completed
    pub constructed_prompt: Option<String>,
    pub context: SessionContext,
    /// Bumped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Past its expiry
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Can be picked up again by its owner
    pub fn is_resumable(&self, now: DateTime<Utc>) -> bool {
        !self.is_stale(now) && !self.stage.is_terminal()
    }

    pub fn confidence(&self) -> f64 {
        self.context.confidence
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Partial update: every `Some` field replaces the stored field wholesale.
///
/// `expected_stage` and `expected_version` are preconditions; a mismatch
/// makes the store reject the write with `STAGE_CONFLICT`.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub stage: Option<SessionStage>,
    pub detected_parameters: Option<DetectedParameters>,
    pub answers: Option<ClarifyingAnswers>,
    /// `Some(None)` clears the prompt
    pub constructed_prompt: Option<Option<String>>,
    pub context: Option<SessionContext>,
    pub expected_stage: Option<SessionStage>,
    pub expected_version: Option<i64>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard the write on the session as the caller last read it
    pub fn guarded_by(session: &Session) -> Self {
        Self {
            expected_stage: Some(session.stage),
            expected_version: Some(session.version),
            ..Default::default()
        }
    }

    pub fn stage(mut self, stage: SessionStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn detected_parameters(mut self, parameters: DetectedParameters) -> Self {
        self.detected_parameters = Some(parameters);
        self
    }

    pub fn answers(mut self, answers: ClarifyingAnswers) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn constructed_prompt(mut self, prompt: Option<String>) -> Self {
        self.constructed_prompt = Some(prompt);
        self
    }

    pub fn context(mut self, context: SessionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none()
            && self.detected_parameters.is_none()
            && self.answers.is_none()
            && self.constructed_prompt.is_none()
            && self.context.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(stage: SessionStage, expires_in_minutes: i64) -> Session {
        let now = Utc::now();
        Session {
            id: "s1".into(),
            user_id: "u1".into(),
            project_id: None,
            stage,
            original_prompt: "متجر".into(),
            detected_parameters: None,
            answers: Default::default(),
            constructed_prompt: None,
            context: SessionContext::default(),
            version: 1,
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::minutes(expires_in_minutes),
        }
    }

    #[test]
    fn test_resumable_rules() {
        let now = Utc::now();
        assert!(session(SessionStage::Clarifying, 30).is_resumable(now));
        assert!(!session(SessionStage::Completed, 30).is_resumable(now));
        assert!(!session(SessionStage::Clarifying, -1).is_resumable(now));
        assert!(session(SessionStage::Clarifying, -1).is_stale(now));
    }

    #[test]
    fn test_guarded_update() {
        let s = session(SessionStage::Constructing, 30);
        let update = SessionUpdate::guarded_by(&s).stage(SessionStage::Generating);
        assert_eq!(update.expected_version, Some(1));
        assert_eq!(update.expected_stage, Some(SessionStage::Constructing));
        assert!(!update.is_empty());
        assert!(SessionUpdate::guarded_by(&s).is_empty());
    }

    #[test]
    fn test_context_tolerates_missing_fields() {
        let ctx: SessionContext = serde_json::from_str(r#"{"confidence": 0.5}"#).unwrap();
        assert_eq!(ctx.confidence, 0.5);
        assert!(ctx.previous_prompts.is_empty());
        assert_eq!(ctx.cost_ledger.calls, 0);
    }
}
