//! Services
//!
//! Business logic services for the application.
//! Services handle the core functionality and are called by commands.

pub mod analytics;
pub mod billing;
pub mod generation;

pub use analytics::{CostCalculator, UsageAccountant};
pub use billing::{CreditLedger, SqliteCreditLedger};
pub use generation::{GenerationOrchestrator, OrchestratorSettings, SessionStore, SqliteSessionStore};
