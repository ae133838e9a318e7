//! Integration tests for the generation pipeline
//!
//! Everything runs against in-memory SQLite with scripted providers.

mod support;

mod commands_test;
mod generation_pipeline_test;
mod session_store_test;
