//! End-to-end pipeline tests through the command handlers

use std::collections::BTreeMap;

use serde_json::json;

use bunyan::models::generation::{
    AnswersRequest, DetectRequest, GenerateRequest, RefineRequest, ValidateRequest,
};
use bunyan::models::session::SessionUpdate;
use bunyan::services::billing::CreditLedger;
use bunyan::services::generation::SessionStore;
use bunyan::{
    detect_parameters, generate_code, refine_prompt, submit_answers, validate_code, ErrorCode,
};
use bunyan_core::{ParameterKey, SessionStage};
use bunyan_llm::{LlmError, ProviderKind};

use super::support::*;

fn detect_request(prompt: &str) -> DetectRequest {
    DetectRequest {
        prompt: Some(prompt.to_string()),
        project_id: Some("proj-1".to_string()),
        project_name: None,
    }
}

fn answers(session_id: &str, pairs: &[(&str, serde_json::Value)]) -> AnswersRequest {
    AnswersRequest {
        session_id: Some(session_id.to_string()),
        answers: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

fn generate_request(session_id: &str) -> GenerateRequest {
    GenerateRequest {
        session_id: Some(session_id.to_string()),
    }
}

fn validate_request(session_id: &str, code: &str) -> ValidateRequest {
    ValidateRequest {
        session_id: Some(session_id.to_string()),
        code: Some(code.to_string()),
        tokens_used: None,
    }
}

/// Detect a confident store prompt and return its session id (in `constructing`)
async fn constructing_session(h: &Harness) -> String {
    let response = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let data = response.data.expect("detection should succeed");
    assert_eq!(data.stage, SessionStage::Constructing);
    data.session_id
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_arabic_store_full_pipeline() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    h.credits.set_balance(USER, 20).unwrap();

    // detection: businessType 0.95, pages 0.9, commerce => (2.85 + 1.8) / 8.5
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    assert!(detected.success, "{:?}", detected.error);
    let detected = detected.data.unwrap();
    assert_eq!(detected.stage, SessionStage::Clarifying);
    assert!(!detected.ready_for_generation);
    assert!((detected.confidence - 4.65 / 8.5).abs() < 1e-9);

    let ids: Vec<&str> = detected.questions.iter().map(|q| q.id.as_str()).collect();
    assert!(ids.contains(&"paymentMethod"));
    assert!(ids.contains(&"shipping"));
    assert!(detected.questions.len() <= 3);
    assert_eq!(detected.questions[0].key, ParameterKey::PaymentMethod);

    let session_id = detected.session_id.clone();

    // first answer raises confidence but stays below the gate
    let first = submit_answers(&h.state, USER, answers(&session_id, &[("paymentMethod", json!("cod"))])).await;
    let first = first.data.unwrap();
    assert_eq!(first.stage, SessionStage::Clarifying);
    assert!(first.confidence > detected.confidence);
    assert!((first.confidence - 6.65 / 8.5).abs() < 1e-9);
    assert!(first.ignored_answers.is_empty());

    let stored = h.store.get(&session_id).unwrap();
    let payment = stored
        .detected_parameters
        .as_ref()
        .unwrap()
        .get(ParameterKey::PaymentMethod)
        .unwrap();
    assert_eq!(payment.confidence, 1.0);

    // second answer crosses the threshold
    let second = submit_answers(&h.state, USER, answers(&session_id, &[("shipping", json!("local"))])).await;
    let second = second.data.unwrap();
    assert_eq!(second.stage, SessionStage::Constructing);
    assert!(second.ready_for_generation);
    assert!(second.questions.is_empty());

    // generation debits 10 credits and moves to validating
    let generated = generate_code(&h.state, USER, generate_request(&session_id)).await;
    assert!(generated.success, "{:?}", generated.error);
    let generated = generated.data.unwrap();
    assert_eq!(generated.stage, SessionStage::Validating);
    assert_eq!(generated.credits_debited, 10);
    assert_eq!(generated.code, VALID_ARABIC_HTML);
    assert_eq!(h.credits.get_balance(USER).await.unwrap(), 10);
    assert_eq!(h.credits.debit_count(&session_id).unwrap(), 1);
    assert_eq!(h.generator.call_count(), 1);

    let generating = h.store.get(&session_id).unwrap();
    assert!(generating.constructed_prompt.is_some());

    // validation prices the reported usage exactly
    let mut request = validate_request(&session_id, VALID_ARABIC_HTML);
    request.tokens_used = Some(BTreeMap::from([
        ("geminiPro".to_string(), 100),
        ("deepseek".to_string(), 2000),
    ]));
    let validated = validate_code(&h.state, USER, request).await;
    assert!(validated.success, "{:?}", validated.error);
    let validated = validated.data.unwrap();
    assert!(validated.validation.passed);
    assert!(validated.auto_fixed_code.is_none());
    assert_eq!(validated.stage, SessionStage::Completed);
    let cost = validated.cost.unwrap();
    assert_eq!(cost.total_cost_usd, "0.000330");
    assert_eq!(cost.total_tokens, 2100);

    let completed = h.store.get(&session_id).unwrap();
    assert_eq!(completed.stage, SessionStage::Completed);
    assert!(completed.constructed_prompt.is_some());
    assert!(completed.context.validation.is_some());

    // detection + generation + one validation record per provider
    let records = h
        .state
        .orchestrator()
        .accountant()
        .list_for_session(&session_id)
        .unwrap();
    assert_eq!(records.len(), 4);
    let credits: i64 = records.iter().map(|r| r.credits).sum();
    assert_eq!(credits, 10);
}

#[tokio::test]
async fn test_confident_prompt_skips_clarification() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], VALID_ARABIC_HTML);

    let response = detect_parameters(&h.state, USER, detect_request("متجر عطور")).await;
    let data = response.data.unwrap();
    assert_eq!(data.stage, SessionStage::Constructing);
    assert!(data.ready_for_generation);
    assert!(data.questions.is_empty());
    assert!(data.confidence >= 0.8);
}

#[tokio::test]
async fn test_planning_enriches_constructed_prompt() {
    let planner = ScriptedPlanner::new(vec![
        Ok(CONFIDENT_STORE_DETECTION.to_string()),
        Ok(r#"{"sections": [{"name": "معرض العطور", "purpose": "عرض المنتجات"}], "notes": ["ألوان هادئة"]}"#
            .to_string()),
    ]);
    let h = harness_with(
        planner,
        MockGenerator::returning(VALID_ARABIC_HTML),
        fast_settings(true),
    );
    h.credits.set_balance(USER, 10).unwrap();

    let session_id = constructing_session(&h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(h.planner.call_count(), 2);

    let session = h.store.get(&session_id).unwrap();
    let prompt = session.constructed_prompt.unwrap();
    assert!(prompt.contains("معرض العطور"));
    assert!(session.context.plan.is_some());
}

#[tokio::test]
async fn test_planning_failure_is_not_fatal() {
    let planner = ScriptedPlanner::new(vec![
        Ok(CONFIDENT_STORE_DETECTION.to_string()),
        Err(LlmError::InvalidRequest {
            message: "bad request".into(),
        }),
    ]);
    let h = harness_with(
        planner,
        MockGenerator::returning(VALID_ARABIC_HTML),
        fast_settings(true),
    );
    h.credits.set_balance(USER, 10).unwrap();

    let session_id = constructing_session(&h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;
    let data = response.data.unwrap();
    assert_eq!(data.stage, SessionStage::Validating);
    assert!(h.store.get(&session_id).unwrap().context.plan.is_none());
}

// ============================================================================
// Failures and guards
// ============================================================================

#[tokio::test]
async fn test_insufficient_credits_keeps_session_constructing() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], VALID_ARABIC_HTML);
    h.credits.set_balance(USER, 5).unwrap();

    let session_id = constructing_session(&h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;

    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::InsufficientCredits));
    assert_eq!(response.status, Some(402));
    assert_eq!(h.generator.call_count(), 0);

    let session = h.store.get(&session_id).unwrap();
    assert_eq!(session.stage, SessionStage::Constructing);
    assert!(session.constructed_prompt.is_none());
    assert_eq!(h.credits.get_balance(USER).await.unwrap(), 5);
}

#[tokio::test]
async fn test_generation_failure_marks_session_failed() {
    let h = harness_with(
        ScriptedPlanner::new(vec![Ok(CONFIDENT_STORE_DETECTION.to_string())]),
        MockGenerator::failing(LlmError::ServerError {
            message: "overloaded".into(),
            status: Some(503),
        }),
        fast_settings(false),
    );
    h.credits.set_balance(USER, 10).unwrap();

    let session_id = constructing_session(&h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;

    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::ProviderFailed));
    // one retry for a retryable failure
    assert_eq!(h.generator.call_count(), 2);

    let session = h.store.get(&session_id).unwrap();
    assert_eq!(session.stage, SessionStage::Failed);
    assert!(session.constructed_prompt.is_none());
    let failure = session.context.failure.unwrap();
    assert_eq!(failure.stage, SessionStage::Generating);
    assert_eq!(failure.code, Some(ErrorCode::ProviderFailed));

    // nothing debited for a failed generation
    assert_eq!(h.credits.get_balance(USER).await.unwrap(), 10);
}

#[tokio::test]
async fn test_empty_generation_output_fails() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], "   ");
    h.credits.set_balance(USER, 10).unwrap();

    let session_id = constructing_session(&h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;

    assert!(!response.success);
    assert_eq!(h.store.get(&session_id).unwrap().stage, SessionStage::Failed);
}

#[tokio::test]
async fn test_garbage_detection_reply() {
    let h = harness(&["عذراً، لا أستطيع المساعدة"], VALID_ARABIC_HTML);

    let response = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::DetectionFailed));
    assert!(response.message_ar.is_some());

    // the failed session is named in the response and stays inspectable
    let session_id = response.session_id.expect("failed session id");
    let session = h.store.get(&session_id).unwrap();
    assert_eq!(session.stage, SessionStage::Failed);
    let failure = session.context.failure.unwrap();
    assert_eq!(failure.stage, SessionStage::Detection);
    assert_eq!(failure.code, Some(ErrorCode::DetectionFailed));

    // the provider answered, so its tokens are billed to the session
    let records = h
        .state
        .orchestrator()
        .accountant()
        .list_for_session(&session_id)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, ProviderKind::GeminiPro);
    assert_eq!(records[0].input_tokens + records[0].output_tokens, 100);
    assert_eq!(session.context.detection_tokens, 100);
    assert_eq!(session.context.cost_ledger.calls, 1);
}

#[tokio::test]
async fn test_detection_provider_outage_names_session_without_usage() {
    let h = harness_with(
        ScriptedPlanner::new(vec![Err(LlmError::AuthenticationFailed {
            message: "bad key".into(),
        })]),
        MockGenerator::returning(VALID_ARABIC_HTML),
        fast_settings(false),
    );

    let response = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    assert_eq!(response.code, Some(ErrorCode::ProviderFailed));
    let session_id = response.session_id.expect("failed session id");
    assert_eq!(h.store.get(&session_id).unwrap().stage, SessionStage::Failed);
    assert!(h
        .state
        .orchestrator()
        .accountant()
        .list_for_session(&session_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_blank_prompt_is_rejected() {
    let h = harness(&[], VALID_ARABIC_HTML);

    let response = detect_parameters(&h.state, USER, detect_request("   ")).await;
    assert_eq!(response.code, Some(ErrorCode::MissingField));
    assert_eq!(response.status, Some(400));
    assert_eq!(h.planner.call_count(), 0);
}

#[tokio::test]
async fn test_answers_for_missing_session() {
    let h = harness(&[], VALID_ARABIC_HTML);

    let response = submit_answers(&h.state, USER, answers("no-such-session", &[("shipping", json!("local"))])).await;
    assert_eq!(response.code, Some(ErrorCode::SessionNotFound));
    assert_eq!(response.status, Some(404));
}

#[tokio::test]
async fn test_answers_without_session_id() {
    let h = harness(&[], VALID_ARABIC_HTML);

    let response = submit_answers(&h.state, USER, AnswersRequest::default()).await;
    assert_eq!(response.code, Some(ErrorCode::MissingSessionId));
    assert_eq!(response.status, Some(400));
}

#[tokio::test]
async fn test_answers_before_detection() {
    let h = harness(&[], VALID_ARABIC_HTML);
    let session = h.store.create(USER, STORE_PROMPT, None).unwrap();

    let response = submit_answers(&h.state, USER, answers(&session.id, &[("shipping", json!("local"))])).await;
    assert_eq!(response.code, Some(ErrorCode::NoParameters));
    assert_eq!(response.status, Some(400));
}

#[tokio::test]
async fn test_other_users_session_is_forbidden() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let session_id = detected.data.unwrap().session_id;

    let response = submit_answers(&h.state, OTHER_USER, answers(&session_id, &[("shipping", json!("local"))])).await;
    assert_eq!(response.code, Some(ErrorCode::Forbidden));
    assert_eq!(response.status, Some(403));

    // untouched
    let session = h.store.get(&session_id).unwrap();
    assert!(session.answers.is_empty());
}

#[tokio::test]
async fn test_unknown_answers_are_reported_not_applied() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let detected = detected.data.unwrap();

    let response = submit_answers(
        &h.state,
        USER,
        answers(
            &detected.session_id,
            &[("favoriteColor", json!("أزرق")), ("paymentMethod", json!("bitcoin"))],
        ),
    )
    .await;
    let data = response.data.unwrap();
    assert_eq!(data.ignored_answers.len(), 2);
    assert!((data.confidence - detected.confidence).abs() < 1e-9);
}

#[tokio::test]
async fn test_generate_in_wrong_stage() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    h.credits.set_balance(USER, 10).unwrap();
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let session_id = detected.data.unwrap().session_id;

    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;
    assert_eq!(response.code, Some(ErrorCode::InvalidStage));
    assert_eq!(response.status, Some(409));
    assert_eq!(h.generator.call_count(), 0);
}

// ============================================================================
// Validation
// ============================================================================

async fn validating_session(h: &Harness) -> String {
    h.credits.set_balance(USER, 10).unwrap();
    let session_id = constructing_session(h).await;
    let response = generate_code(&h.state, USER, generate_request(&session_id)).await;
    assert_eq!(response.data.unwrap().stage, SessionStage::Validating);
    session_id
}

#[tokio::test]
async fn test_validation_rejects_unsafe_code() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = validating_session(&h).await;

    let unsafe_code = VALID_ARABIC_HTML.replace(
        "<h1>مرحباً بكم</h1>",
        "<script>eval(location.hash.slice(1))</script>",
    );
    let response = validate_code(&h.state, USER, validate_request(&session_id, &unsafe_code)).await;
    let data = response.data.unwrap();
    assert!(!data.validation.passed);
    assert!(data.auto_fixed_code.is_none());
    assert_eq!(data.stage, SessionStage::Failed);

    let session = h.store.get(&session_id).unwrap();
    assert!(session.constructed_prompt.is_none());
    let failure = session.context.failure.unwrap();
    assert_eq!(failure.stage, SessionStage::Validating);
    assert_eq!(failure.code, None);
}

#[tokio::test]
async fn test_validation_auto_fixes_missing_charset_and_direction() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = validating_session(&h).await;

    let broken = VALID_ARABIC_HTML
        .replace("<meta charset=\"utf-8\">\n", "")
        .replace(" dir=\"rtl\"", "");
    let response = validate_code(&h.state, USER, validate_request(&session_id, &broken)).await;
    let data = response.data.unwrap();

    assert!(!data.validation.passed);
    assert!(data.validation.was_rescued());
    assert_eq!(data.stage, SessionStage::Completed);
    let fixed = data.auto_fixed_code.unwrap();
    assert!(fixed.contains("dir=\"rtl\""));
    assert!(fixed.contains("charset=\"utf-8\""));

    let session = h.store.get(&session_id).unwrap();
    assert_eq!(session.context.auto_fixed_code.as_deref(), Some(fixed.as_str()));
}

#[tokio::test]
async fn test_validation_unknown_provider_changes_nothing() {
    let h = harness(&[CONFIDENT_STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = validating_session(&h).await;
    let before = h.store.get(&session_id).unwrap();

    let mut request = validate_request(&session_id, VALID_ARABIC_HTML);
    request.tokens_used = Some(BTreeMap::from([("openai".to_string(), 500)]));
    let response = validate_code(&h.state, USER, request).await;

    assert_eq!(response.code, Some(ErrorCode::UnknownProvider));
    assert_eq!(response.status, Some(400));
    let after = h.store.get(&session_id).unwrap();
    assert_eq!(after.stage, SessionStage::Validating);
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn test_validation_requires_code() {
    let h = harness(&[], VALID_ARABIC_HTML);

    let mut request = validate_request("s1", "");
    request.code = None;
    let response = validate_code(&h.state, USER, request).await;
    assert_eq!(response.code, Some(ErrorCode::MissingField));
}

#[tokio::test]
async fn test_validation_outside_validating_stage() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let session_id = detected.data.unwrap().session_id;

    let response = validate_code(&h.state, USER, validate_request(&session_id, VALID_ARABIC_HTML)).await;
    assert_eq!(response.code, Some(ErrorCode::InvalidStage));
    assert_eq!(response.status, Some(409));
}

// ============================================================================
// Refinement
// ============================================================================

#[tokio::test]
async fn test_refine_can_return_to_clarifying() {
    // confident first, then a follow-up that reads as a vague store
    let h = harness(&[CONFIDENT_STORE_DETECTION, STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = constructing_session(&h).await;

    let response = refine_prompt(
        &h.state,
        USER,
        RefineRequest {
            session_id: Some(session_id.clone()),
            prompt: Some("أريد تغيير المتجر ليبيع الملابس".to_string()),
        },
    )
    .await;
    assert!(response.success, "{:?}", response.error);
    let data = response.data.unwrap();
    assert_eq!(data.session_id, session_id);
    assert_eq!(data.stage, SessionStage::Clarifying);
    assert!(!data.questions.is_empty());

    let session = h.store.get(&session_id).unwrap();
    assert_eq!(session.original_prompt, "متجر إلكتروني لبيع الملابس");
    assert_eq!(session.context.previous_prompts.len(), 1);
}

#[tokio::test]
async fn test_refine_detection_failure_keeps_stage() {
    let h = harness(&[CONFIDENT_STORE_DETECTION, "لا أعرف"], VALID_ARABIC_HTML);
    let session_id = constructing_session(&h).await;
    let before = h.store.get(&session_id).unwrap();

    let response = refine_prompt(
        &h.state,
        USER,
        RefineRequest {
            session_id: Some(session_id.clone()),
            prompt: Some("أضف صفحة للعروض".to_string()),
        },
    )
    .await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::DetectionFailed));
    assert!(response.session_id.is_none());

    let after = h.store.get(&session_id).unwrap();
    assert_eq!(after.stage, SessionStage::Constructing);
    assert!(after.context.failure.is_none());
    assert_eq!(after.detected_parameters, before.detected_parameters);
    assert!(after.context.previous_prompts.is_empty());
    // both detection calls are billed
    assert_eq!(after.context.cost_ledger.calls, 2);
    let records = h
        .state
        .orchestrator()
        .accountant()
        .list_for_session(&session_id)
        .unwrap();
    assert_eq!(records.len(), 2);

    // the session can still go on to generation
    h.credits.set_balance(USER, 10).unwrap();
    let generated = generate_code(&h.state, USER, generate_request(&session_id)).await;
    assert!(generated.success, "{:?}", generated.error);
}

#[tokio::test]
async fn test_refine_terminal_session_is_rejected() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let detected = detect_parameters(&h.state, USER, detect_request(STORE_PROMPT)).await;
    let session_id = detected.data.unwrap().session_id;

    let session = h.store.get(&session_id).unwrap();
    h.store
        .update(&session_id, SessionUpdate::guarded_by(&session).stage(SessionStage::Failed))
        .unwrap();

    let response = refine_prompt(
        &h.state,
        USER,
        RefineRequest {
            session_id: Some(session_id),
            prompt: Some("متجر أحذية".to_string()),
        },
    )
    .await;
    assert_eq!(response.code, Some(ErrorCode::InvalidStage));
}

#[test]
fn test_provider_names_match_tokens_used_keys() {
    assert_eq!(ProviderKind::GeminiPro.as_str(), "geminiPro");
    assert_eq!(ProviderKind::DeepSeek.as_str(), "deepseek");
}
