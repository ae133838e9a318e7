//! Health Check Commands
//!
//! Commands for checking the health status of backend services.

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of all backend services
pub fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse::default();

    health.database = state.is_database_healthy();
    health.config = state.is_config_healthy();

    health.status = if health.database && health.config {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
