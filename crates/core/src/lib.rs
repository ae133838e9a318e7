//! Bunyan Core
//!
//! Foundational types for the Bunyan generation pipeline. This crate has zero
//! dependencies on application-level code (database, HTTP, LLM providers).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `parameters` - Closed, versioned parameter model (`ParameterKey`, `DetectedParameters`)
//! - `stage` - Session stage machine (`SessionStage`)
//!
//! ## Design Principles
//!
//! 1. **Only serde/thiserror** - keeps build times minimal
//! 2. **Closed types** - unknown parameter keys and illegal stage moves are errors
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod error;
pub mod parameters;
pub mod stage;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Parameter Model ────────────────────────────────────────────────────
pub use parameters::{
    DetectedField, DetectedParameters, ParameterKey, ParameterValue, ValueKind,
    PARAMETER_SCHEMA_VERSION,
};

// ── Stage Machine ──────────────────────────────────────────────────────
pub use stage::SessionStage;
