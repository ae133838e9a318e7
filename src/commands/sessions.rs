//! Session Commands
//!
//! Resumability, inspection, and cleanup of generation sessions.

use crate::models::generation::{ResumableRequest, ResumableResponse, SessionRequest};
use crate::models::response::CommandResponse;
use crate::models::session::Session;
use crate::state::AppState;

use super::generation::require_session_id;

/// Most recent resumable session for the user (optionally within a project)
pub fn check_resumable(
    state: &AppState,
    user_id: &str,
    request: ResumableRequest,
) -> CommandResponse<ResumableResponse> {
    let project_id = request
        .project_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    state
        .orchestrator()
        .check_resumable(user_id, project_id)
        .into()
}

/// Full session state
pub fn get_session(state: &AppState, user_id: &str, request: SessionRequest) -> CommandResponse<Session> {
    require_session_id(request.session_id.as_deref())
        .and_then(|id| state.orchestrator().get_session(user_id, id))
        .into()
}

/// Delete a session
pub fn discard_session(state: &AppState, user_id: &str, request: SessionRequest) -> CommandResponse<bool> {
    require_session_id(request.session_id.as_deref())
        .and_then(|id| state.orchestrator().discard(user_id, id))
        .into()
}

/// Administrative sweep of stale sessions
pub fn sweep_expired_sessions(state: &AppState) -> CommandResponse<usize> {
    state.orchestrator().sweep_expired().into()
}
