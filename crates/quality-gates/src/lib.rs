//! Bunyan Quality Gates
//!
//! Static validation of generated application code:
//!
//! - `models` - Findings, severities, and the validation result
//! - `checks` - The fixed, ordered checklist and the per-check fixers
//! - `pipeline` - `CodeValidator`, which runs the whole checklist and the
//!   optional auto-fix pass
//!
//! Everything here is pure and synchronous; persistence and provider calls
//! stay in the main crate.

pub mod checks;
pub mod models;
pub mod pipeline;

pub use checks::{is_arabic_text, CheckContext, CheckId};
pub use models::{Finding, FindingSource, ProviderReport, Severity, ValidationResult};
pub use pipeline::CodeValidator;
