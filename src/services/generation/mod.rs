//! Generation Pipeline
//!
//! Session storage, parameter detection, confidence scoring, clarifying
//! questions, prompt construction, and the orchestrator that drives a
//! session from a free-text request to validated code.

pub mod clarifier;
pub mod confidence;
pub mod detector;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod session_store;

pub use clarifier::{generate_questions, merge_answers, MergeOutcome};
pub use confidence::{overall_confidence, DEFAULT_CONFIDENCE_THRESHOLD};
pub use detector::{DetectionOutcome, ParameterDetector};
pub use orchestrator::{GenerationOrchestrator, OrchestratorSettings};
pub use planner::{GenerationPlanner, PlanOutcome};
pub use prompt::construct;
pub use session_store::{SessionStore, SqliteSessionStore};
