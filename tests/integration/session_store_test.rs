//! Session store behavior across concurrent writers and expiry

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};

use bunyan::models::session::SessionUpdate;
use bunyan::services::generation::{SessionStore, SqliteSessionStore};
use bunyan::storage::database::Database;
use bunyan::ErrorCode;
use bunyan_core::{DetectedParameters, ParameterKey, ParameterValue, SessionStage};

use super::support::{STORE_PROMPT, USER};

fn store() -> SqliteSessionStore {
    let db = Database::new_in_memory().unwrap();
    SqliteSessionStore::new(db.pool().clone())
}

fn store_parameters() -> DetectedParameters {
    let mut params = DetectedParameters::new();
    params
        .set(
            ParameterKey::BusinessType,
            ParameterValue::Text("متجر ملابس".into()),
            0.95,
        )
        .unwrap();
    params
}

// ============================================================================
// Optimistic concurrency
// ============================================================================

#[test]
fn test_concurrent_writers_only_one_wins() {
    let store = Arc::new(store());
    let session = store.create(USER, STORE_PROMPT, None).unwrap();
    let clarifying = store
        .update(
            &session.id,
            SessionUpdate::guarded_by(&session)
                .stage(SessionStage::Clarifying)
                .detected_parameters(store_parameters()),
        )
        .unwrap();

    // every writer read the same version
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let snapshot = clarifying.clone();
            thread::spawn(move || {
                store.update(
                    &snapshot.id,
                    SessionUpdate::guarded_by(&snapshot).stage(SessionStage::Constructing),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), ErrorCode::StageConflict);
    }

    let stored = store.get(&session.id).unwrap();
    assert_eq!(stored.stage, SessionStage::Constructing);
    assert_eq!(stored.version, clarifying.version + 1);
}

#[test]
fn test_expected_stage_mismatch_is_conflict() {
    let store = store();
    let session = store.create(USER, STORE_PROMPT, None).unwrap();

    let update = SessionUpdate {
        expected_stage: Some(SessionStage::Clarifying),
        ..SessionUpdate::new().stage(SessionStage::Clarifying)
    };
    let err = store.update(&session.id, update).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StageConflict);
    assert_eq!(err.status(), 409);
}

#[test]
fn test_unguarded_update_still_checks_transitions() {
    let store = store();
    let session = store.create(USER, STORE_PROMPT, None).unwrap();

    let err = store
        .update(&session.id, SessionUpdate::new().stage(SessionStage::Completed))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStage);
    assert_eq!(store.get(&session.id).unwrap().stage, SessionStage::Detection);
}

// ============================================================================
// Expiry and resumability
// ============================================================================

#[test]
fn test_every_write_slides_expiry() {
    let store = store();
    let session = store.create(USER, STORE_PROMPT, None).unwrap();
    assert!(session.expires_at > Utc::now());

    let updated = store
        .update(
            &session.id,
            SessionUpdate::guarded_by(&session).stage(SessionStage::Clarifying),
        )
        .unwrap();
    assert!(updated.expires_at >= session.expires_at);
    assert!(updated.last_activity >= session.last_activity);
}

#[test]
fn test_expired_sessions_vanish_and_sweep() {
    let db = Database::new_in_memory().unwrap();
    let expired = SqliteSessionStore::with_ttl(db.pool().clone(), Duration::zero());
    let live = SqliteSessionStore::new(db.pool().clone());

    let stale = expired.create(USER, STORE_PROMPT, Some("p1")).unwrap();
    let fresh = live.create(USER, STORE_PROMPT, Some("p1")).unwrap();

    assert_eq!(live.get(&stale.id).unwrap_err().code(), ErrorCode::SessionNotFound);
    let resumable = live.find_resumable(USER, Some("p1")).unwrap().unwrap();
    assert_eq!(resumable.id, fresh.id);

    assert_eq!(live.sweep_expired(Utc::now()).unwrap(), 1);
    assert!(live.get(&fresh.id).is_ok());
}

#[test]
fn test_resumable_is_scoped_to_user_and_project() {
    let store = store();
    store.create(USER, STORE_PROMPT, Some("p1")).unwrap();

    assert!(store.find_resumable(USER, Some("p2")).unwrap().is_none());
    assert!(store.find_resumable("someone-else", None).unwrap().is_none());
    assert!(store.find_resumable(USER, None).unwrap().is_some());
}
