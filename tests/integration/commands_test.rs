//! Session, health, and settings command tests

use bunyan::models::generation::{DetectRequest, ResumableRequest, SessionRequest};
use bunyan::models::settings::SettingsUpdate;
use bunyan::state::AppState;
use bunyan::storage::ConfigService;
use bunyan::{
    check_resumable, detect_parameters, discard_session, get_health, get_session, get_settings,
    sweep_expired_sessions, update_settings, ErrorCode,
};
use bunyan_core::SessionStage;

use super::support::*;

async fn start_session(h: &Harness, project_id: Option<&str>) -> String {
    let response = detect_parameters(
        &h.state,
        USER,
        DetectRequest {
            prompt: Some(STORE_PROMPT.to_string()),
            project_id: project_id.map(str::to_string),
            project_name: Some("متجري".to_string()),
        },
    )
    .await;
    response.data.unwrap().session_id
}

fn session_request(session_id: &str) -> SessionRequest {
    SessionRequest {
        session_id: Some(session_id.to_string()),
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_resume_round_trip() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = start_session(&h, Some("proj-7")).await;

    let response = check_resumable(
        &h.state,
        USER,
        ResumableRequest {
            project_id: Some("proj-7".to_string()),
        },
    );
    let data = response.data.unwrap();
    assert!(data.has_resumable_session);
    let session = data.session.unwrap();
    assert_eq!(session.id, session_id);
    assert_eq!(session.stage, SessionStage::Clarifying);
    assert_eq!(session.context.project_name.as_deref(), Some("متجري"));

    // a blank project id means "any project"
    let any = check_resumable(
        &h.state,
        USER,
        ResumableRequest {
            project_id: Some("  ".to_string()),
        },
    );
    assert!(any.data.unwrap().has_resumable_session);

    let other = check_resumable(&h.state, OTHER_USER, ResumableRequest::default());
    assert!(!other.data.unwrap().has_resumable_session);
}

#[tokio::test]
async fn test_get_and_discard_session() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    let session_id = start_session(&h, None).await;

    let fetched = get_session(&h.state, USER, session_request(&session_id));
    assert_eq!(fetched.data.unwrap().original_prompt, STORE_PROMPT);

    let forbidden = discard_session(&h.state, OTHER_USER, session_request(&session_id));
    assert_eq!(forbidden.code, Some(ErrorCode::Forbidden));

    let discarded = discard_session(&h.state, USER, session_request(&session_id));
    assert_eq!(discarded.data, Some(true));

    let gone = get_session(&h.state, USER, session_request(&session_id));
    assert_eq!(gone.code, Some(ErrorCode::SessionNotFound));
    assert_eq!(gone.status, Some(404));
}

#[tokio::test]
async fn test_get_session_requires_id() {
    let h = harness(&[], VALID_ARABIC_HTML);
    let response = get_session(&h.state, USER, SessionRequest::default());
    assert_eq!(response.code, Some(ErrorCode::MissingSessionId));
    assert!(response.message_ar.is_some());
}

#[tokio::test]
async fn test_sweep_with_nothing_expired() {
    let h = harness(&[STORE_DETECTION], VALID_ARABIC_HTML);
    start_session(&h, None).await;

    let response = sweep_expired_sessions(&h.state);
    assert_eq!(response.data, Some(0));
}

// ============================================================================
// Health and settings
// ============================================================================

#[tokio::test]
async fn test_health_without_config_is_degraded() {
    let h = harness(&[], VALID_ARABIC_HTML);
    let health = get_health(&h.state).data.unwrap();
    assert!(health.database);
    assert!(!health.config);
    assert_eq!(health.status, "degraded");

    let settings = get_settings(&h.state).await;
    assert_eq!(settings.code, Some(ErrorCode::ConfigError));
}

#[tokio::test]
async fn test_state_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ConfigService::at_path(dir.path().join("config.json")).unwrap();
    config
        .update_config(SettingsUpdate {
            database_path: Some(dir.path().join("data.db").to_string_lossy().into_owned()),
            ..Default::default()
        })
        .unwrap();

    let state = AppState::from_config_service(config).unwrap();
    let health = get_health(&state).data.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(dir.path().join("data.db").exists());

    let updated = update_settings(
        &state,
        SettingsUpdate {
            confidence_threshold: Some(0.7),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(updated.data.unwrap().confidence_threshold, 0.7);

    let rejected = update_settings(
        &state,
        SettingsUpdate {
            max_questions: Some(0),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(rejected.code, Some(ErrorCode::ConfigError));
    let current = get_settings(&state).await.data.unwrap();
    assert_eq!(current.max_questions, 3);
}
