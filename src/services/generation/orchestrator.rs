//! Generation Orchestrator
//!
//! Owns the session state machine. Each public operation does one stage's
//! worth of work and persists the result before returning:
//!
//! ```text
//! detection    -> clarifying | constructing | failed
//! clarifying   -> clarifying | constructing
//! constructing -> generating (credit check first) | clarifying (re-detection)
//! generating   -> validating | failed
//! validating   -> completed | failed
//! ```
//!
//! Every write is guarded by the stage and version the operation read, so a
//! concurrent writer on the same session gets `STAGE_CONFLICT`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use bunyan_core::SessionStage;
use bunyan_llm::{
    call_bounded, CallPolicy, GenerationOptions, GenerationProvider, PlanningProvider, ProviderKind,
    TokenUsage,
};
use bunyan_quality_gates::{CodeValidator, ProviderReport};

use crate::models::analytics::{CostSummary, OperationType};
use crate::models::generation::{
    AnswersResponse, ClarifyingAnswers, DetectResponse, DetectionContext, GenerateResponse,
    ResumableResponse, ValidateResponse,
};
use crate::models::session::{FailureInfo, Session, SessionContext, SessionUpdate};
use crate::models::settings::AppConfig;
use crate::services::analytics::UsageAccountant;
use crate::services::billing::CreditLedger;
use crate::utils::error::{AppError, AppResult};

use super::clarifier::{generate_questions, merge_answers, DEFAULT_QUESTION_BUDGET};
use super::confidence::{overall_confidence, DEFAULT_CONFIDENCE_THRESHOLD};
use super::detector::{DetectionFailure, ParameterDetector};
use super::planner::GenerationPlanner;
use super::prompt::{construct, GENERATION_SYSTEM_PROMPT};
use super::session_store::SessionStore;

/// Tunables taken from `AppConfig`
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub confidence_threshold: f64,
    pub max_questions: usize,
    pub enable_planning: bool,
    pub call_policy: CallPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_questions: DEFAULT_QUESTION_BUDGET,
            enable_planning: true,
            call_policy: CallPolicy::default(),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            max_questions: config.max_questions,
            enable_planning: config.enable_planning,
            call_policy: CallPolicy::new(
                Duration::from_secs(config.provider_timeout_secs),
                config.provider_retries,
            ),
        }
    }
}

/// Coordinates detection, clarification, generation, and validation
pub struct GenerationOrchestrator {
    store: Arc<dyn SessionStore>,
    detector: ParameterDetector,
    planner: GenerationPlanner,
    generator: Arc<dyn GenerationProvider>,
    ledger: Arc<dyn CreditLedger>,
    accountant: Arc<UsageAccountant>,
    validator: CodeValidator,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        planning: Arc<dyn PlanningProvider>,
        generator: Arc<dyn GenerationProvider>,
        ledger: Arc<dyn CreditLedger>,
        accountant: Arc<UsageAccountant>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            detector: ParameterDetector::new(planning.clone(), settings.call_policy),
            planner: GenerationPlanner::new(planning, settings.call_policy),
            generator,
            ledger,
            accountant,
            validator: CodeValidator::new(),
            settings,
        }
    }

    /// Replace the code validator (e.g. to disable auto-fix)
    pub fn with_validator(mut self, validator: CodeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn accountant(&self) -> &Arc<UsageAccountant> {
        &self.accountant
    }

    // ========================================================================
    // Detection
    // ========================================================================

    /// Create a session for `prompt` and run detection on it
    pub async fn detect(
        &self,
        user_id: &str,
        prompt: &str,
        project_id: Option<&str>,
        project_name: Option<&str>,
    ) -> AppResult<DetectResponse> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::missing_field("prompt"));
        }

        let session = self.store.create(user_id, prompt, project_id)?;
        info!(session_id = %session.id, stage = %session.stage, "detection started");

        let detection_context = DetectionContext {
            previous_prompts: Vec::new(),
            project_name: project_name.map(str::to_string),
        };
        let mut context = session.context.clone();
        context.project_name = project_name.map(str::to_string);

        let outcome = match self.detector.detect(prompt, &detection_context).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                self.account_failed_detection(&session.id, &failure, &mut context);
                return Err(self.fail_with_context(&session, context, failure.error));
            }
        };

        self.account(
            &session.id,
            outcome.provider,
            OperationType::Detection,
            outcome.usage,
            &mut context,
        )?;
        context.detection_tokens += outcome.usage.total();

        let confidence = overall_confidence(&outcome.parameters);
        context.confidence = confidence;
        let ready = confidence >= self.settings.confidence_threshold;
        let next_stage = if ready {
            SessionStage::Constructing
        } else {
            SessionStage::Clarifying
        };

        let updated = self.store.update(
            &session.id,
            SessionUpdate::guarded_by(&session)
                .stage(next_stage)
                .detected_parameters(outcome.parameters.clone())
                .context(context),
        )?;
        info!(
            session_id = %updated.id,
            stage = %updated.stage,
            confidence,
            "detection finished"
        );

        Ok(DetectResponse {
            session_id: updated.id,
            stage: updated.stage,
            confidence,
            ready_for_generation: ready,
            questions: self.questions_for(&outcome.parameters, ready),
            parameters: outcome.parameters,
            rejected_keys: outcome.rejected_keys,
        })
    }

    /// Re-run detection with a follow-up prompt; earlier answers are re-applied
    pub async fn refine(&self, user_id: &str, session_id: &str, follow_up: &str) -> AppResult<DetectResponse> {
        let follow_up = follow_up.trim();
        if follow_up.is_empty() {
            return Err(AppError::missing_field("prompt"));
        }
        let session = self.load_owned(user_id, session_id)?;
        if !matches!(session.stage, SessionStage::Clarifying | SessionStage::Constructing) {
            return Err(AppError::invalid_stage(session.stage, "refine"));
        }

        let mut previous_prompts = vec![session.original_prompt.clone()];
        previous_prompts.extend(session.context.previous_prompts.iter().cloned());
        let detection_context = DetectionContext {
            previous_prompts,
            project_name: session.context.project_name.clone(),
        };

        // a failed re-detection leaves the session where it was
        let outcome = match self.detector.detect(follow_up, &detection_context).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                let mut context = session.context.clone();
                self.account_failed_detection(&session.id, &failure, &mut context);
                if let Err(store_err) = self
                    .store
                    .update(&session.id, SessionUpdate::guarded_by(&session).context(context))
                {
                    warn!(session_id = %session.id, error = %store_err, "could not record refine usage");
                }
                warn!(
                    session_id = %session.id,
                    stage = %session.stage,
                    error = %failure.error,
                    "refine detection failed"
                );
                return Err(failure.error);
            }
        };

        let merged = merge_answers(&outcome.parameters, &session.answers);
        let mut context = session.context.clone();
        self.account(
            &session.id,
            outcome.provider,
            OperationType::Detection,
            outcome.usage,
            &mut context,
        )?;
        context.detection_tokens += outcome.usage.total();
        context.previous_prompts.push(follow_up.to_string());

        let confidence = overall_confidence(&merged.parameters);
        context.confidence = confidence;
        let ready = confidence >= self.settings.confidence_threshold;
        let next_stage = if ready {
            SessionStage::Constructing
        } else {
            SessionStage::Clarifying
        };

        let updated = self.store.update(
            &session.id,
            SessionUpdate::guarded_by(&session)
                .stage(next_stage)
                .detected_parameters(merged.parameters.clone())
                .context(context),
        )?;
        info!(
            session_id = %updated.id,
            from = %session.stage,
            stage = %updated.stage,
            confidence,
            "session refined"
        );

        Ok(DetectResponse {
            session_id: updated.id,
            stage: updated.stage,
            confidence,
            ready_for_generation: ready,
            questions: self.questions_for(&merged.parameters, ready),
            parameters: merged.parameters,
            rejected_keys: outcome.rejected_keys,
        })
    }

    // ========================================================================
    // Clarification
    // ========================================================================

    /// Merge answers into the session's parameters and recompute confidence
    pub fn submit_answers(
        &self,
        user_id: &str,
        session_id: &str,
        answers: &ClarifyingAnswers,
    ) -> AppResult<AnswersResponse> {
        let session = self.load_owned(user_id, session_id)?;
        let parameters = session
            .detected_parameters
            .as_ref()
            .ok_or_else(|| AppError::NoParameters(session.id.clone()))?;
        if !matches!(session.stage, SessionStage::Clarifying | SessionStage::Constructing) {
            return Err(AppError::invalid_stage(session.stage, "answers"));
        }

        let merged = merge_answers(parameters, answers);
        let mut stored_answers = session.answers.clone();
        for id in &merged.applied {
            if let Some(value) = answers.get(id) {
                stored_answers.insert(id.clone(), value.clone());
            }
        }

        let confidence = overall_confidence(&merged.parameters);
        let ready = confidence >= self.settings.confidence_threshold;
        let next_stage = if ready {
            SessionStage::Constructing
        } else {
            SessionStage::Clarifying
        };

        let mut context = session.context.clone();
        context.confidence = confidence;
        let updated = self.store.update(
            &session.id,
            SessionUpdate::guarded_by(&session)
                .stage(next_stage)
                .detected_parameters(merged.parameters.clone())
                .answers(stored_answers)
                .context(context),
        )?;
        info!(
            session_id = %updated.id,
            stage = %updated.stage,
            applied = merged.applied.len(),
            ignored = merged.ignored.len(),
            confidence,
            "answers merged"
        );

        Ok(AnswersResponse {
            ready_for_generation: ready,
            confidence,
            stage: updated.stage,
            questions: self.questions_for(&merged.parameters, ready),
            ignored_answers: merged.ignored,
        })
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Check credits, plan (optionally), construct the prompt, generate, debit
    pub async fn generate(&self, user_id: &str, session_id: &str) -> AppResult<GenerateResponse> {
        let session = self.load_owned(user_id, session_id)?;
        if session.stage != SessionStage::Constructing {
            return Err(AppError::invalid_stage(session.stage, "generate"));
        }
        let parameters = session
            .detected_parameters
            .clone()
            .ok_or_else(|| AppError::NoParameters(session.id.clone()))?;

        let required = OperationType::Generation.credit_cost();
        let balance = self.ledger.get_balance(user_id).await?;
        if balance < required {
            warn!(session_id = %session.id, balance, required, "insufficient credits for generation");
            return Err(AppError::InsufficientCredits { required, balance });
        }

        let mut context = session.context.clone();
        let plan = if self.settings.enable_planning {
            match self.planner.plan(&session.original_prompt, &parameters).await {
                Ok(outcome) => {
                    self.account(
                        &session.id,
                        outcome.provider,
                        OperationType::Planning,
                        outcome.usage,
                        &mut context,
                    )?;
                    outcome.plan
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "planning failed, generating without a plan");
                    None
                }
            }
        } else {
            None
        };

        let constructed = construct(&session.original_prompt, &parameters, plan.as_ref());
        context.plan = plan;
        context.complexity = Some(constructed.complexity);

        let generating = self.store.update(
            &session.id,
            SessionUpdate::guarded_by(&session)
                .stage(SessionStage::Generating)
                .constructed_prompt(Some(constructed.text.clone()))
                .context(context),
        )?;
        info!(
            session_id = %generating.id,
            stage = %generating.stage,
            complexity = constructed.complexity.as_str(),
            "generation started"
        );

        let options = GenerationOptions {
            system: Some(GENERATION_SYSTEM_PROMPT.to_string()),
            temperature: None,
        };
        let generator = self.generator.clone();
        let prompt_text = constructed.text.clone();
        let result = call_bounded(&self.settings.call_policy, "generation", || {
            let generator = generator.clone();
            let prompt_text = prompt_text.clone();
            let options = options.clone();
            async move { generator.generate(&prompt_text, &options).await }
        })
        .await;

        let generated = match result {
            Ok(generated) if !generated.code.trim().is_empty() => generated,
            Ok(_) => {
                return Err(self.fail(
                    &generating,
                    AppError::Provider(bunyan_llm::LlmError::ParseError {
                        message: "generation provider returned no code".to_string(),
                    }),
                ))
            }
            Err(e) => return Err(self.fail(&generating, e.into())),
        };

        let mut context = generating.context.clone();
        self.account(
            &generating.id,
            self.generator.kind(),
            OperationType::Generation,
            generated.usage,
            &mut context,
        )?;

        let credits_debited = match self
            .ledger
            .debit(
                user_id,
                required,
                json!({
                    "sessionId": generating.id,
                    "operation": OperationType::Generation.as_str(),
                    "provider": self.generator.kind().as_str(),
                    "tokens": generated.usage.total(),
                }),
            )
            .await
        {
            Ok(_) => required,
            Err(e) => {
                error!(session_id = %generating.id, error = %e, "credit debit failed after generation");
                0
            }
        };

        context.generated_code = Some(generated.code.clone());
        context.provider_report = Some(ProviderReport {
            issues: generated.issues.clone(),
            vulnerabilities: generated.vulnerabilities.clone(),
        });
        let validating = self.store.update(
            &generating.id,
            SessionUpdate::guarded_by(&generating)
                .stage(SessionStage::Validating)
                .context(context),
        )?;
        info!(
            session_id = %validating.id,
            stage = %validating.stage,
            tokens = generated.usage.total(),
            credits_debited,
            "generation finished"
        );

        Ok(GenerateResponse {
            session_id: validating.id.clone(),
            stage: validating.stage,
            code: generated.code,
            complexity: constructed.complexity,
            credits_debited,
            cost_usd: validating.context.cost_ledger.cost_usd(),
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate code for a session in `validating`, costing any reported usage
    pub fn validate(
        &self,
        user_id: &str,
        session_id: &str,
        code: &str,
        tokens_used: Option<&std::collections::BTreeMap<String, u64>>,
    ) -> AppResult<ValidateResponse> {
        if code.trim().is_empty() {
            return Err(AppError::missing_field("code"));
        }
        let session = self.load_owned(user_id, session_id)?;
        if session.stage != SessionStage::Validating {
            return Err(AppError::invalid_stage(session.stage, "validate"));
        }

        // price everything before touching state so an unknown provider changes nothing
        let cost: Option<CostSummary> = tokens_used
            .map(|tokens| self.accountant.calculator().cost_tokens_used(tokens))
            .transpose()?;

        let mut context = session.context.clone();
        if let Some(summary) = &cost {
            for entry in &summary.breakdown {
                self.account(
                    &session.id,
                    entry.provider,
                    OperationType::Validation,
                    TokenUsage::new(entry.tokens, 0),
                    &mut context,
                )?;
            }
        }

        let report = context.provider_report.clone().unwrap_or_default();
        let result = self.validator.validate(code, &session.original_prompt, &report);

        let acceptable = result.is_acceptable();
        let mut update = SessionUpdate::guarded_by(&session);
        if acceptable {
            update = update.stage(SessionStage::Completed);
        } else {
            update = update
                .stage(SessionStage::Failed)
                .constructed_prompt(None);
            context.failure = Some(FailureInfo {
                stage: SessionStage::Validating,
                code: None,
                message: format!(
                    "validation failed with {} blocking finding(s)",
                    result.findings.iter().filter(|f| f.severity.is_blocking()).count()
                ),
            });
        }
        context.generated_code = Some(code.to_string());
        context.auto_fixed_code = result.auto_fixed_code.clone();
        context.validation = Some(result.clone());

        let updated = self.store.update(&session.id, update.context(context))?;
        info!(
            session_id = %updated.id,
            stage = %updated.stage,
            passed = result.passed,
            auto_fixed = result.auto_fixed_code.is_some(),
            "validation finished"
        );

        Ok(ValidateResponse {
            auto_fixed_code: result.auto_fixed_code.clone(),
            validation: result,
            cost,
            stage: updated.stage,
        })
    }

    // ========================================================================
    // Session management
    // ========================================================================

    /// Most recent resumable session for the user
    pub fn check_resumable(&self, user_id: &str, project_id: Option<&str>) -> AppResult<ResumableResponse> {
        let session = self.store.find_resumable(user_id, project_id)?;
        Ok(ResumableResponse {
            has_resumable_session: session.is_some(),
            session,
        })
    }

    pub fn get_session(&self, user_id: &str, session_id: &str) -> AppResult<Session> {
        self.load_owned(user_id, session_id)
    }

    /// Delete a session the user owns
    pub fn discard(&self, user_id: &str, session_id: &str) -> AppResult<bool> {
        let session = self.load_owned(user_id, session_id)?;
        let removed = self.store.delete(&session.id)?;
        info!(session_id = %session.id, "session discarded");
        Ok(removed)
    }

    /// Physically delete every stale session
    pub fn sweep_expired(&self) -> AppResult<usize> {
        self.store.sweep_expired(Utc::now())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn load_owned(&self, user_id: &str, session_id: &str) -> AppResult<Session> {
        let session = self.store.get(session_id)?;
        if !session.is_owned_by(user_id) {
            warn!(session_id = %session_id, user_id = %user_id, "session access denied");
            return Err(AppError::Forbidden(session_id.to_string()));
        }
        Ok(session)
    }

    fn questions_for(
        &self,
        parameters: &bunyan_core::DetectedParameters,
        ready: bool,
    ) -> Vec<crate::models::generation::ClarifyingQuestion> {
        if ready {
            Vec::new()
        } else {
            generate_questions(
                parameters,
                self.settings.confidence_threshold,
                self.settings.max_questions,
            )
        }
    }

    /// Record one provider call and fold it into the session ledger
    fn account(
        &self,
        session_id: &str,
        provider: ProviderKind,
        operation: OperationType,
        usage: TokenUsage,
        context: &mut SessionContext,
    ) -> AppResult<()> {
        let record = self.accountant.record(session_id, provider, operation, usage)?;
        context.cost_ledger.add(&record);
        Ok(())
    }

    /// Record tokens a failed detection still spent. Accounting errors are
    /// logged; the detection error is what the caller reports.
    fn account_failed_detection(
        &self,
        session_id: &str,
        failure: &DetectionFailure,
        context: &mut SessionContext,
    ) {
        let Some(usage) = failure.usage else {
            return;
        };
        match self.account(session_id, failure.provider, OperationType::Detection, usage, context) {
            Ok(()) => context.detection_tokens += usage.total(),
            Err(e) => warn!(session_id, error = %e, "could not record failed detection usage"),
        }
    }

    /// Move the session to `failed`, keeping it inspectable, and hand back
    /// the error tagged with the session id for the caller to return
    fn fail(&self, session: &Session, err: AppError) -> AppError {
        self.fail_with_context(session, session.context.clone(), err)
    }

    fn fail_with_context(&self, session: &Session, mut context: SessionContext, err: AppError) -> AppError {
        context.failure = Some(FailureInfo {
            stage: session.stage,
            code: Some(err.code()),
            message: err.to_string(),
        });
        let update = SessionUpdate::guarded_by(session)
            .stage(SessionStage::Failed)
            .constructed_prompt(None)
            .context(context);

        match self.store.update(&session.id, update) {
            Ok(_) => error!(
                session_id = %session.id,
                stage = %session.stage,
                error = %err,
                "session failed"
            ),
            Err(store_err) => warn!(
                session_id = %session.id,
                error = %store_err,
                "could not record session failure"
            ),
        }
        err.in_session(&session.id)
    }
}
