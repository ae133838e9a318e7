//! Bunyan LLM
//!
//! Typed adapters for the two AI services the generation pipeline talks to:
//! - a planning provider (parameter detection, optional structural plan)
//! - a generation provider (final application code)
//!
//! Bundled adapters:
//! - Gemini (`generateContent` API)
//! - DeepSeek (OpenAI-compatible chat completions)
//!
//! Every call is wrapped by `bounded::call_bounded` (timeout + single retry),
//! and all response-format fragility lives in `extract`.

pub mod bounded;
pub mod deepseek;
pub mod extract;
pub mod gemini;
pub mod http_client;
pub mod provider;
pub mod types;

// Re-export main types
pub use bounded::{call_bounded, CallPolicy};
pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use http_client::build_http_client;
pub use provider::{GenerationProvider, PlanningProvider};
pub use types::*;
