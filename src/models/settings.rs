//! Settings Models
//!
//! Application configuration and settings data structures.

use serde::{Deserialize, Serialize};

use bunyan_llm::{ProviderConfig, ProviderKind};

/// Application configuration stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Session time-to-live, refreshed on every write
    pub session_ttl_minutes: u32,
    /// Overall confidence needed to skip clarification
    pub confidence_threshold: f64,
    /// Question display budget per round
    pub max_questions: usize,
    /// Per-attempt provider timeout
    pub provider_timeout_secs: u64,
    /// Extra attempts for retryable provider failures
    pub provider_retries: u32,
    /// Ask the planning provider for a structural plan before generating
    pub enable_planning: bool,
    pub planning_provider: ProviderConfig,
    pub generation_provider: ProviderConfig,
    /// Database file override (defaults to ~/.bunyan/data.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 30,
            confidence_threshold: 0.8,
            max_questions: 3,
            provider_timeout_secs: 60,
            provider_retries: 1,
            enable_planning: true,
            planning_provider: ProviderConfig::for_provider(ProviderKind::GeminiPro),
            generation_provider: ProviderConfig::for_provider(ProviderKind::DeepSeek),
            database_path: None,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub session_ttl_minutes: Option<u32>,
    pub confidence_threshold: Option<f64>,
    pub max_questions: Option<usize>,
    pub provider_timeout_secs: Option<u64>,
    pub provider_retries: Option<u32>,
    pub enable_planning: Option<bool>,
    pub planning_provider: Option<ProviderConfig>,
    pub generation_provider: Option<ProviderConfig>,
    pub database_path: Option<String>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(ttl) = update.session_ttl_minutes {
            self.session_ttl_minutes = ttl;
        }
        if let Some(threshold) = update.confidence_threshold {
            self.confidence_threshold = threshold;
        }
        if let Some(max) = update.max_questions {
            self.max_questions = max;
        }
        if let Some(timeout) = update.provider_timeout_secs {
            self.provider_timeout_secs = timeout;
        }
        if let Some(retries) = update.provider_retries {
            self.provider_retries = retries;
        }
        if let Some(enabled) = update.enable_planning {
            self.enable_planning = enabled;
        }
        if let Some(provider) = update.planning_provider {
            self.planning_provider = provider;
        }
        if let Some(provider) = update.generation_provider {
            self.generation_provider = provider;
        }
        if let Some(path) = update.database_path {
            self.database_path = Some(path);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl_minutes == 0 {
            return Err("session_ttl_minutes must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "Invalid confidence_threshold: {}. Must be within [0, 1]",
                self.confidence_threshold
            ));
        }

        if self.max_questions == 0 || self.max_questions > 10 {
            return Err("max_questions must be between 1 and 10".to_string());
        }

        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > 600 {
            return Err("provider_timeout_secs must be between 1 and 600".to_string());
        }

        if self.provider_retries > 3 {
            return Err("provider_retries cannot exceed 3".to_string());
        }

        for (role, provider) in [
            ("planning", &self.planning_provider),
            ("generation", &self.generation_provider),
        ] {
            if provider.model.trim().is_empty() {
                return Err(format!("{} provider model must not be empty", role));
            }
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(format!(
                    "{} provider temperature must be within [0, 2]",
                    role
                ));
            }
        }

        Ok(())
    }
}
