//! Response Types
//!
//! Standard envelope returned by every command handler.

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, ErrorCode};

/// Generic command response for all commands.
///
/// `code`, `status`, and `messageAr` are set only on failure. `sessionId` is
/// set when the failure left a session behind that can still be inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl<T> CommandResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            status: None,
            message_ar: None,
            session_id: None,
        }
    }

    /// Create an error response with message
    pub fn err(message: impl Into<String>) -> Self {
        Self::err_with_code(ErrorCode::InternalError, message)
    }

    /// Create an error response carrying a stable code
    pub fn err_with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            status: Some(code.status()),
            message_ar: Some(code.message_ar().to_string()),
            session_id: None,
        }
    }
}

impl<T> From<AppError> for CommandResponse<T> {
    fn from(e: AppError) -> Self {
        let mut response = Self::err_with_code(e.code(), e.to_string());
        response.session_id = e.session_id().map(str::to_string);
        response
    }
}

impl<T> From<Result<T, AppError>> for CommandResponse<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => e.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub database: bool,
    pub config: bool,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: "bunyan".to_string(),
            database: false,
            config: false,
        }
    }
}
