//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions. Every error maps to a
//! stable machine-readable `ErrorCode`, an HTTP-style status, and an Arabic
//! message for end users.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bunyan_core::CoreError;
use bunyan_llm::LlmError;

/// Stable error codes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingSessionId,
    MissingField,
    InvalidInput,
    NoParameters,
    UnknownProvider,
    Forbidden,
    SessionNotFound,
    InsufficientCredits,
    StageConflict,
    InvalidStage,
    DetectionFailed,
    ProviderFailed,
    DatabaseError,
    ConfigError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingSessionId => "MISSING_SESSION_ID",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NoParameters => "NO_PARAMETERS",
            ErrorCode::UnknownProvider => "UNKNOWN_PROVIDER",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::InsufficientCredits => "INSUFFICIENT_CREDITS",
            ErrorCode::StageConflict => "STAGE_CONFLICT",
            ErrorCode::InvalidStage => "INVALID_STAGE",
            ErrorCode::DetectionFailed => "DETECTION_FAILED",
            ErrorCode::ProviderFailed => "PROVIDER_FAILED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP-style status for transports that want one
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::MissingSessionId
            | ErrorCode::MissingField
            | ErrorCode::InvalidInput
            | ErrorCode::NoParameters
            | ErrorCode::UnknownProvider => 400,
            ErrorCode::InsufficientCredits => 402,
            ErrorCode::Forbidden => 403,
            ErrorCode::SessionNotFound => 404,
            ErrorCode::StageConflict | ErrorCode::InvalidStage => 409,
            ErrorCode::DetectionFailed | ErrorCode::ProviderFailed => 502,
            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => 500,
        }
    }

    /// User-facing Arabic message
    pub fn message_ar(&self) -> &'static str {
        match self {
            ErrorCode::MissingSessionId => "معرّف الجلسة مطلوب",
            ErrorCode::MissingField => "حقل مطلوب مفقود",
            ErrorCode::InvalidInput => "المدخلات غير صالحة",
            ErrorCode::NoParameters => "لم يتم تحليل الطلب بعد، لا توجد معايير لتحديثها",
            ErrorCode::UnknownProvider => "مزوّد غير معروف في بيانات الاستهلاك",
            ErrorCode::Forbidden => "لا تملك صلاحية الوصول إلى هذه الجلسة",
            ErrorCode::SessionNotFound => "الجلسة غير موجودة أو انتهت صلاحيتها",
            ErrorCode::InsufficientCredits => "رصيدك غير كافٍ لإتمام العملية",
            ErrorCode::StageConflict => "تم تعديل الجلسة من طلب آخر، يرجى إعادة المحاولة",
            ErrorCode::InvalidStage => "لا يمكن تنفيذ هذه العملية في المرحلة الحالية",
            ErrorCode::DetectionFailed => "تعذّر تحليل طلبك، يرجى المحاولة مرة أخرى",
            ErrorCode::ProviderFailed => "تعذّر الاتصال بخدمة الذكاء الاصطناعي",
            ErrorCode::DatabaseError => "حدث خطأ في قاعدة البيانات",
            ErrorCode::ConfigError => "خطأ في إعدادات التطبيق",
            ErrorCode::InternalError => "حدث خطأ داخلي",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Domain model errors (bad parameter values, illegal stage moves)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required request field is absent
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Request carried no session id
    #[error("Missing session id")]
    MissingSessionId,

    /// Session absent or stale
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session belongs to another user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Answers submitted before detection produced parameters
    #[error("Session {0} has no detected parameters")]
    NoParameters(String),

    /// Token usage keyed by a provider we have no rate for
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Credit balance below the operation's cost
    #[error("Insufficient credits: required {required}, balance {balance}")]
    InsufficientCredits { required: i64, balance: i64 },

    /// Optimistic concurrency check failed
    #[error("Stage conflict: {0}")]
    StageConflict(String),

    /// Operation not allowed in the session's current stage
    #[error("Operation '{operation}' not allowed in stage '{stage}'")]
    InvalidStage { stage: String, operation: String },

    /// Planning provider output could not be turned into parameters
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    /// Provider call failed after retries
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error that moved the named session to `failed`
    #[error("{source}")]
    InSession {
        session_id: String,
        source: Box<AppError>,
    },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a not found error for a session id
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound(id.into())
    }

    /// Create a stage conflict error
    pub fn stage_conflict(msg: impl Into<String>) -> Self {
        Self::StageConflict(msg.into())
    }

    /// Create an invalid stage error
    pub fn invalid_stage(stage: impl std::fmt::Display, operation: impl Into<String>) -> Self {
        Self::InvalidStage {
            stage: stage.to_string(),
            operation: operation.into(),
        }
    }

    /// Create a detection error
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attach the id of the session this error left behind
    pub fn in_session(self, session_id: impl Into<String>) -> Self {
        if self.session_id().is_some() {
            return self;
        }
        AppError::InSession {
            session_id: session_id.into(),
            source: Box::new(self),
        }
    }

    /// Session the caller can inspect or discard after this error
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AppError::InSession { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) | AppError::Sqlite(_) => ErrorCode::DatabaseError,
            AppError::Config(_) | AppError::Io(_) => ErrorCode::ConfigError,
            AppError::Serialization(_) | AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Core(CoreError::InvalidTransition { .. }) => ErrorCode::InvalidStage,
            AppError::Core(_) | AppError::Validation(_) => ErrorCode::InvalidInput,
            AppError::MissingField(_) => ErrorCode::MissingField,
            AppError::MissingSessionId => ErrorCode::MissingSessionId,
            AppError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::NoParameters(_) => ErrorCode::NoParameters,
            AppError::UnknownProvider(_) => ErrorCode::UnknownProvider,
            AppError::InsufficientCredits { .. } => ErrorCode::InsufficientCredits,
            AppError::StageConflict(_) => ErrorCode::StageConflict,
            AppError::InvalidStage { .. } => ErrorCode::InvalidStage,
            AppError::DetectionFailed(_) => ErrorCode::DetectionFailed,
            AppError::Provider(_) => ErrorCode::ProviderFailed,
            AppError::InSession { source, .. } => source.code(),
        }
    }

    pub fn status(&self) -> u16 {
        self.code().status()
    }

    pub fn message_ar(&self) -> &'static str {
        self.code().message_ar()
    }

    /// Errors a user can fix by changing the request (never retried)
    pub fn is_user_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

/// Convert AppError to a string suitable for command responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
