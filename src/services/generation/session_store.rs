//! Session Store
//!
//! Durable keyed storage for orchestration sessions, behind the
//! `SessionStore` trait. The SQLite implementation keeps one row per session
//! in `generation_sessions`, with JSON columns for the parameter set, the
//! answers, and the context.
//!
//! Staleness: a session whose `expires_at` has passed reads as not found.
//! Every write refreshes `last_activity` and slides `expires_at` forward.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use bunyan_core::{DetectedParameters, SessionStage};

use crate::models::session::{Session, SessionContext, SessionUpdate};
use crate::storage::database::DbPool;
use crate::utils::error::{AppError, AppResult};

/// Default session time-to-live
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Storage contract for orchestration sessions
pub trait SessionStore: Send + Sync {
    /// Create a session in the `detection` stage
    fn create(&self, user_id: &str, prompt: &str, project_id: Option<&str>) -> AppResult<Session>;

    /// Fetch a live session; stale or missing sessions are `SESSION_NOT_FOUND`
    fn get(&self, id: &str) -> AppResult<Session>;

    /// Apply a partial update atomically, checking preconditions, the stage
    /// transition, and the constructed-prompt invariant
    fn update(&self, id: &str, update: SessionUpdate) -> AppResult<Session>;

    /// Delete a session; returns whether a row was removed
    fn delete(&self, id: &str) -> AppResult<bool>;

    /// Most recently active live, non-terminal session for the owner
    fn find_resumable(&self, user_id: &str, project_id: Option<&str>)
        -> AppResult<Option<Session>>;

    /// Physically delete every session stale at `now`
    fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
    ttl: Duration,
}

const SELECT_COLUMNS: &str = "id, user_id, project_id, stage, original_prompt, detected_parameters,
     answers, constructed_prompt, context, version, created_at, last_activity, expires_at";

/// Raw row, converted outside the rusqlite closure so JSON errors surface as AppError
struct SessionRow {
    id: String,
    user_id: String,
    project_id: Option<String>,
    stage: String,
    original_prompt: String,
    detected_parameters: Option<String>,
    answers: String,
    constructed_prompt: Option<String>,
    context: String,
    version: i64,
    created_at: i64,
    last_activity: i64,
    expires_at: i64,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            project_id: row.get(2)?,
            stage: row.get(3)?,
            original_prompt: row.get(4)?,
            detected_parameters: row.get(5)?,
            answers: row.get(6)?,
            constructed_prompt: row.get(7)?,
            context: row.get(8)?,
            version: row.get(9)?,
            created_at: row.get(10)?,
            last_activity: row.get(11)?,
            expires_at: row.get(12)?,
        })
    }

    fn into_session(self) -> AppResult<Session> {
        let detected_parameters = match self.detected_parameters {
            Some(json) => Some(serde_json::from_str::<DetectedParameters>(&json)?),
            None => None,
        };
        Ok(Session {
            stage: self.stage.parse::<SessionStage>()?,
            detected_parameters,
            answers: serde_json::from_str(&self.answers)?,
            context: serde_json::from_str::<SessionContext>(&self.context)?,
            created_at: from_millis(self.created_at)?,
            last_activity: from_millis(self.last_activity)?,
            expires_at: from_millis(self.expires_at)?,
            id: self.id,
            user_id: self.user_id,
            project_id: self.project_id,
            original_prompt: self.original_prompt,
            constructed_prompt: self.constructed_prompt,
            version: self.version,
        })
    }
}

fn from_millis(ms: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::database(format!("Invalid timestamp in session row: {}", ms)))
}

/// Current time truncated to the millisecond precision we persist
fn now_millis() -> AppResult<DateTime<Utc>> {
    from_millis(Utc::now().timestamp_millis())
}

impl SqliteSessionStore {
    /// Create a store with the default TTL
    pub fn new(pool: DbPool) -> Self {
        Self::with_ttl(pool, Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
    }

    /// Create a store with a custom TTL
    pub fn with_ttl(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn connection(&self) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Fetch a row regardless of staleness
    fn load(conn: &rusqlite::Connection, id: &str) -> AppResult<Option<Session>> {
        let sql = format!("SELECT {} FROM generation_sessions WHERE id = ?1", SELECT_COLUMNS);
        let row = conn
            .query_row(&sql, params![id], SessionRow::from_row)
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, user_id: &str, prompt: &str, project_id: Option<&str>) -> AppResult<Session> {
        let now = now_millis()?;
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.map(str::to_string),
            stage: SessionStage::Detection,
            original_prompt: prompt.to_string(),
            detected_parameters: None,
            answers: Default::default(),
            constructed_prompt: None,
            context: SessionContext::default(),
            version: 1,
            created_at: now,
            last_activity: now,
            expires_at: now + self.ttl,
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO generation_sessions (id, user_id, project_id, stage, original_prompt,
             detected_parameters, answers, constructed_prompt, context, version,
             created_at, last_activity, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.id,
                session.user_id,
                session.project_id,
                session.stage.as_str(),
                session.original_prompt,
                serde_json::to_string(&session.answers)?,
                serde_json::to_string(&session.context)?,
                session.version,
                session.created_at.timestamp_millis(),
                session.last_activity.timestamp_millis(),
                session.expires_at.timestamp_millis(),
            ],
        )?;

        info!(session_id = %session.id, user_id = %user_id, "generation session created");
        Ok(session)
    }

    fn get(&self, id: &str) -> AppResult<Session> {
        let conn = self.connection()?;
        match Self::load(&conn, id)? {
            Some(session) if !session.is_stale(Utc::now()) => Ok(session),
            _ => Err(AppError::session_not_found(id)),
        }
    }

    fn update(&self, id: &str, update: SessionUpdate) -> AppResult<Session> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = match Self::load(&tx, id)? {
            Some(session) if !session.is_stale(Utc::now()) => session,
            _ => return Err(AppError::session_not_found(id)),
        };

        if let Some(expected) = update.expected_version {
            if current.version != expected {
                return Err(AppError::stage_conflict(format!(
                    "session {} is at version {}, expected {}",
                    id, current.version, expected
                )));
            }
        }
        if let Some(expected) = update.expected_stage {
            if current.stage != expected {
                return Err(AppError::stage_conflict(format!(
                    "session {} is in stage {}, expected {}",
                    id, current.stage, expected
                )));
            }
        }

        let mut next = current.clone();
        if let Some(stage) = update.stage {
            if stage != current.stage {
                next.stage = current.stage.transition(stage)?;
            }
        }
        if let Some(parameters) = update.detected_parameters {
            parameters.validate()?;
            next.detected_parameters = Some(parameters);
        }
        if let Some(answers) = update.answers {
            next.answers = answers;
        }
        if let Some(prompt) = update.constructed_prompt {
            next.constructed_prompt = prompt;
        }
        if let Some(context) = update.context {
            next.context = context;
        }

        if next.stage.carries_constructed_prompt() != next.constructed_prompt.is_some() {
            return Err(AppError::validation(format!(
                "constructed prompt must be present exactly in generating/validating/completed (stage {})",
                next.stage
            )));
        }

        let now = now_millis()?;
        next.version = current.version + 1;
        next.last_activity = now;
        next.expires_at = now + self.ttl;

        let detected_json = next
            .detected_parameters
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let changed = tx.execute(
            "UPDATE generation_sessions SET stage = ?3, detected_parameters = ?4, answers = ?5,
             constructed_prompt = ?6, context = ?7, version = ?8, last_activity = ?9, expires_at = ?10
             WHERE id = ?1 AND version = ?2",
            params![
                id,
                current.version,
                next.stage.as_str(),
                detected_json,
                serde_json::to_string(&next.answers)?,
                next.constructed_prompt,
                serde_json::to_string(&next.context)?,
                next.version,
                next.last_activity.timestamp_millis(),
                next.expires_at.timestamp_millis(),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::stage_conflict(format!(
                "session {} was modified concurrently",
                id
            )));
        }
        tx.commit()?;

        debug!(
            session_id = %id,
            from = %current.stage,
            to = %next.stage,
            version = next.version,
            "session updated"
        );
        Ok(next)
    }

    fn delete(&self, id: &str) -> AppResult<bool> {
        let conn = self.connection()?;
        let removed = conn.execute("DELETE FROM generation_sessions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn find_resumable(
        &self,
        user_id: &str,
        project_id: Option<&str>,
    ) -> AppResult<Option<Session>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {} FROM generation_sessions
             WHERE user_id = ?1
               AND (?2 IS NULL OR project_id = ?2)
               AND expires_at > ?3
               AND stage NOT IN ('completed', 'failed')
             ORDER BY last_activity DESC
             LIMIT 1",
            SELECT_COLUMNS
        );
        let row = conn
            .query_row(
                &sql,
                params![user_id, project_id, Utc::now().timestamp_millis()],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM generation_sessions WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        if removed > 0 {
            info!(removed, "expired generation sessions swept");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use crate::utils::error::ErrorCode;

    fn store() -> SqliteSessionStore {
        let db = Database::new_in_memory().unwrap();
        SqliteSessionStore::new(db.pool().clone())
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let created = store.create("u1", "متجر ملابس", Some("p1")).unwrap();
        let loaded = store.get(&created.id).unwrap();
        assert_eq!(created, loaded);
        assert_eq!(loaded.stage, SessionStage::Detection);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_get_missing() {
        let err = store().get("nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
    }

    #[test]
    fn test_update_bumps_version_and_slides_expiry() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        let updated = store
            .update(
                &created.id,
                SessionUpdate::guarded_by(&created).stage(SessionStage::Clarifying),
            )
            .unwrap();
        assert_eq!(updated.stage, SessionStage::Clarifying);
        assert_eq!(updated.version, 2);
        assert!(updated.expires_at >= created.expires_at);
        assert_eq!(updated.original_prompt, "prompt");
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        store
            .update(
                &created.id,
                SessionUpdate::guarded_by(&created).stage(SessionStage::Clarifying),
            )
            .unwrap();
        let err = store
            .update(
                &created.id,
                SessionUpdate::guarded_by(&created).stage(SessionStage::Constructing),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StageConflict);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        let err = store
            .update(&created.id, SessionUpdate::new().stage(SessionStage::Completed))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStage);
    }

    #[test]
    fn test_constructed_prompt_invariant() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        let constructing = store
            .update(&created.id, SessionUpdate::new().stage(SessionStage::Constructing))
            .unwrap();

        // generating without a prompt is rejected
        let err = store
            .update(&constructing.id, SessionUpdate::new().stage(SessionStage::Generating))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        // a prompt while still constructing is rejected too
        let err = store
            .update(
                &constructing.id,
                SessionUpdate::new().constructed_prompt(Some("text".into())),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);

        let generating = store
            .update(
                &constructing.id,
                SessionUpdate::new()
                    .stage(SessionStage::Generating)
                    .constructed_prompt(Some("text".into())),
            )
            .unwrap();
        assert_eq!(generating.constructed_prompt.as_deref(), Some("text"));
    }

    #[test]
    fn test_zero_ttl_reads_as_not_found() {
        let db = Database::new_in_memory().unwrap();
        let store = SqliteSessionStore::with_ttl(db.pool().clone(), Duration::zero());
        let created = store.create("u1", "prompt", None).unwrap();
        assert_eq!(
            store.get(&created.id).unwrap_err().code(),
            ErrorCode::SessionNotFound
        );
        assert!(store.find_resumable("u1", None).unwrap().is_none());
        assert_eq!(store.sweep_expired(Utc::now()).unwrap(), 1);
    }

    #[test]
    fn test_find_resumable_prefers_latest_and_filters() {
        let store = store();
        let first = store.create("u1", "first", Some("p1")).unwrap();
        let second = store.create("u1", "second", Some("p2")).unwrap();
        store.create("u2", "other user", Some("p1")).unwrap();

        // touch `first` so it becomes the most recent
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .update(&first.id, SessionUpdate::new().stage(SessionStage::Clarifying))
            .unwrap();

        let any = store.find_resumable("u1", None).unwrap().unwrap();
        assert_eq!(any.id, first.id);

        let p2 = store.find_resumable("u1", Some("p2")).unwrap().unwrap();
        assert_eq!(p2.id, second.id);

        assert!(store.find_resumable("u3", None).unwrap().is_none());
    }

    #[test]
    fn test_terminal_sessions_not_resumable_but_readable() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        store
            .update(&created.id, SessionUpdate::new().stage(SessionStage::Failed))
            .unwrap();
        assert!(store.find_resumable("u1", None).unwrap().is_none());
        assert_eq!(store.get(&created.id).unwrap().stage, SessionStage::Failed);
    }

    #[test]
    fn test_delete() {
        let store = store();
        let created = store.create("u1", "prompt", None).unwrap();
        assert!(store.delete(&created.id).unwrap());
        assert!(!store.delete(&created.id).unwrap());
        assert!(store.get(&created.id).is_err());
    }
}
