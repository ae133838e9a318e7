//! Bunyan - Generation Orchestration Backend
//!
//! Turns a free-text Arabic request into generated application code:
//! parameter detection, clarifying questions, prompt construction,
//! generation, validation, and usage accounting, with every stage persisted
//! so a session can be resumed.
//!
//! It includes:
//! - Transport-agnostic command handlers
//! - Business logic services (generation pipeline, analytics, billing)
//! - Storage layer (SQLite, JSON config)
//! - Data models and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export the command surface
pub use commands::{
    // Generation commands
    detect_parameters, generate_code, refine_prompt, submit_answers, validate_code,
    // Session commands
    check_resumable, discard_session, get_session, sweep_expired_sessions,
    // Health and settings commands
    get_health, get_settings, update_settings,
};
pub use models::response::*;
pub use models::settings::{AppConfig, SettingsUpdate};
pub use state::AppState;
pub use utils::error::{AppError, AppResult, ErrorCode};
