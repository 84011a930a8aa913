//! Sync configuration API endpoints.

use axum::extract::State;
use axum::Json;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateConfigRequest, SeguimientoConfig};
use crate::AppState;

/// GET /api/configs - List sync configs of the active school year.
pub async fn list_configs(State(state): State<AppState>) -> ApiResult<Vec<SeguimientoConfig>> {
    let year = state.repo.get_active_school_year().await?;
    let configs = state.repo.list_configs(&year.id).await?;
    success(configs)
}

/// POST /api/configs - Register a sync config for the active school year.
pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> ApiResult<SeguimientoConfig> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Config name is required".to_string()));
    }
    if request.poll_id <= 0 {
        return Err(AppError::Validation(
            "pollId must be a positive Phidias poll id".to_string(),
        ));
    }

    let year = state.repo.get_active_school_year().await?;
    let config = state.repo.create_config(&year.id, &request).await?;
    success(config)
}
