//! Application State
//!
//! Shared state handed to every command handler: the database, the config
//! service, the local credit ledger, and the generation orchestrator wired
//! to its providers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use bunyan_llm::{
    DeepSeekProvider, GeminiProvider, GenerationProvider, PlanningProvider, ProviderConfig,
    ProviderKind,
};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::analytics::{CostCalculator, UsageAccountant};
use crate::services::billing::SqliteCreditLedger;
use crate::services::generation::{GenerationOrchestrator, OrchestratorSettings, SqliteSessionStore};
use crate::storage::{ConfigService, Database};
use crate::utils::error::{AppError, AppResult};

/// Build the planning provider named by `config`
pub fn build_planning_provider(config: &ProviderConfig) -> AppResult<Arc<dyn PlanningProvider>> {
    let provider: Arc<dyn PlanningProvider> = match config.provider {
        ProviderKind::GeminiPro => Arc::new(GeminiProvider::new(config.clone())?),
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(config.clone())?),
    };
    Ok(provider)
}

/// Build the generation provider named by `config`
pub fn build_generation_provider(config: &ProviderConfig) -> AppResult<Arc<dyn GenerationProvider>> {
    let provider: Arc<dyn GenerationProvider> = match config.provider {
        ProviderKind::GeminiPro => Arc::new(GeminiProvider::new(config.clone())?),
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(config.clone())?),
    };
    Ok(provider)
}

/// Application state shared by all command handlers
pub struct AppState {
    /// SQLite database with connection pool
    database: Database,
    /// Configuration service; absent when the state was assembled in memory
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Local credit balances
    credits: Arc<SqliteCreditLedger>,
    orchestrator: Arc<GenerationOrchestrator>,
}

impl AppState {
    /// Load `~/.bunyan/config.json` and wire everything from it
    pub fn initialize() -> AppResult<Self> {
        Self::from_config_service(ConfigService::new()?)
    }

    /// Wire the state from an already-loaded config service
    pub fn from_config_service(config_service: ConfigService) -> AppResult<Self> {
        let config = config_service.get_config_clone();
        let database = match config.database_path.as_deref() {
            Some(path) => Database::open(&PathBuf::from(path))?,
            None => Database::new()?,
        };

        let planning = build_planning_provider(&config.planning_provider)?;
        let generation = build_generation_provider(&config.generation_provider)?;
        let credits = Arc::new(SqliteCreditLedger::new(database.pool().clone()));
        let store = Arc::new(SqliteSessionStore::with_ttl(
            database.pool().clone(),
            chrono::Duration::minutes(i64::from(config.session_ttl_minutes)),
        ));
        let accountant = Arc::new(UsageAccountant::new(
            database.pool().clone(),
            Arc::new(CostCalculator::new()),
        ));

        let orchestrator = GenerationOrchestrator::new(
            store,
            planning,
            generation,
            credits.clone(),
            accountant,
            OrchestratorSettings::from(&config),
        );

        info!(
            planning = %config.planning_provider.provider,
            generation = %config.generation_provider.provider,
            "application state initialized"
        );
        Ok(Self::from_parts(
            database,
            Some(config_service),
            credits,
            Arc::new(orchestrator),
        ))
    }

    /// Assemble the state from prebuilt components
    pub fn from_parts(
        database: Database,
        config: Option<ConfigService>,
        credits: Arc<SqliteCreditLedger>,
        orchestrator: Arc<GenerationOrchestrator>,
    ) -> Self {
        Self {
            database,
            config: Arc::new(RwLock::new(config)),
            credits,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<GenerationOrchestrator> {
        &self.orchestrator
    }

    pub fn credits(&self) -> &Arc<SqliteCreditLedger> {
        &self.credits
    }

    /// Check if database is healthy
    pub fn is_database_healthy(&self) -> bool {
        self.database.is_healthy()
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config_clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration. Provider and pipeline settings apply on the
    /// next `initialize`.
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Get database access for direct queries
    pub fn with_database<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T>,
    {
        f(&self.database)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("database_healthy", &self.is_database_healthy())
            .finish()
    }
}
