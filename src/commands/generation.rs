//! Generation Commands
//!
//! Entry points for the generation pipeline. Each handler takes the
//! authenticated user id plus a request payload and always answers with a
//! `CommandResponse`; failures carry a stable code, a status, and an Arabic
//! message.

use crate::models::generation::{
    AnswersRequest, AnswersResponse, DetectRequest, DetectResponse, GenerateRequest,
    GenerateResponse, RefineRequest, ValidateRequest, ValidateResponse,
};
use crate::models::response::CommandResponse;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// Session id from a request, rejecting absent or blank ids
pub(crate) fn require_session_id(session_id: Option<&str>) -> AppResult<&str> {
    match session_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(AppError::MissingSessionId),
    }
}

/// Non-blank text field from a request
pub(crate) fn require_text<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(AppError::missing_field(field)),
    }
}

/// Start a session and detect parameters for the prompt
pub async fn detect_parameters(
    state: &AppState,
    user_id: &str,
    request: DetectRequest,
) -> CommandResponse<DetectResponse> {
    let result: AppResult<DetectResponse> = async {
        let prompt = require_text(request.prompt.as_deref(), "prompt")?;
        state
            .orchestrator()
            .detect(
                user_id,
                prompt,
                request.project_id.as_deref(),
                request.project_name.as_deref(),
            )
            .await
    }
    .await;
    result.into()
}

/// Submit answers to clarifying questions
pub async fn submit_answers(
    state: &AppState,
    user_id: &str,
    request: AnswersRequest,
) -> CommandResponse<AnswersResponse> {
    let result = require_session_id(request.session_id.as_deref()).and_then(|session_id| {
        state
            .orchestrator()
            .submit_answers(user_id, session_id, &request.answers)
    });
    result.into()
}

/// Refine a session with a follow-up prompt
pub async fn refine_prompt(
    state: &AppState,
    user_id: &str,
    request: RefineRequest,
) -> CommandResponse<DetectResponse> {
    let result: AppResult<DetectResponse> = async {
        let session_id = require_session_id(request.session_id.as_deref())?;
        let prompt = require_text(request.prompt.as_deref(), "prompt")?;
        state.orchestrator().refine(user_id, session_id, prompt).await
    }
    .await;
    result.into()
}

/// Generate code for a session in `constructing`
pub async fn generate_code(
    state: &AppState,
    user_id: &str,
    request: GenerateRequest,
) -> CommandResponse<GenerateResponse> {
    let result: AppResult<GenerateResponse> = async {
        let session_id = require_session_id(request.session_id.as_deref())?;
        state.orchestrator().generate(user_id, session_id).await
    }
    .await;
    result.into()
}

/// Validate generated code, costing any reported token usage
pub async fn validate_code(
    state: &AppState,
    user_id: &str,
    request: ValidateRequest,
) -> CommandResponse<ValidateResponse> {
    let result: AppResult<ValidateResponse> = (|| {
        let session_id = require_session_id(request.session_id.as_deref())?;
        let code = require_text(request.code.as_deref(), "code")?;
        state
            .orchestrator()
            .validate(user_id, session_id, code, request.tokens_used.as_ref())
    })();
    result.into()
}
