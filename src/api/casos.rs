//! Case and follow-up API endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::{success, ApiResult};
use crate::casos::derive_casos;
use crate::errors::AppError;
use crate::models::{
    AcademicLevel, Caso, CreateSeguimientoRequest, InfractionType, Seguimiento,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasosQuery {
    #[serde(default)]
    pub level: Option<AcademicLevel>,
}

/// GET /api/casos - Derived case view over moderada faltas.
pub async fn list_casos(
    State(state): State<AppState>,
    Query(query): Query<CasosQuery>,
) -> ApiResult<Vec<Caso>> {
    let year = state.repo.get_active_school_year().await?;
    let faltas = state.repo.list_faltas_by_type(InfractionType::Moderada).await?;
    let seguimientos = state.repo.list_seguimientos().await?;
    let students = state.repo.list_students(&year.id).await?;

    let casos = derive_casos(
        &faltas,
        &seguimientos,
        &students,
        query.level,
        Utc::now().date_naive(),
    );
    success(casos)
}

/// POST /api/casos/:hash/seguimientos - Record a follow-up on a falta.
pub async fn create_seguimiento(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(request): Json<CreateSeguimientoRequest>,
) -> ApiResult<Seguimiento> {
    if !(1..=3).contains(&request.number) {
        return Err(AppError::Validation(
            "Follow-up number must be 1, 2 or 3".to_string(),
        ));
    }
    if request.author.trim().is_empty() {
        return Err(AppError::Validation("Author is required".to_string()));
    }

    let falta = state
        .repo
        .find_falta_by_hash(&hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Falta {} not found", hash)))?;

    if falta.infraction_type != InfractionType::Moderada {
        return Err(AppError::Validation(
            "Follow-ups only apply to moderada faltas".to_string(),
        ));
    }

    let existing = state.repo.list_seguimientos_for_falta(&hash).await?;
    if existing.iter().any(|s| s.number == request.number) {
        return Err(AppError::Conflict(format!(
            "Follow-up {} already recorded for this falta",
            request.number
        )));
    }

    let seguimiento = state.repo.insert_seguimiento(&hash, &request).await?;
    success(seguimiento)
}
