use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppError;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::Sla;

#[derive(Debug, Serialize)]
pub struct ListSlaResponse {
    pub slas: Vec<Sla>,
}

/// Attaching an SLA is what puts a slice under closed-loop control.
pub async fn create_sla(
    State(state): State<AppState>,
    Json(sla): Json<Sla>,
) -> Result<Json<Sla>, AppError> {
    sla.validate().map_err(AppError::BadRequest)?;

    match state.store.get_slice_by_slice_id(&sla.slice_id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            return Err(AppError::NotFound(format!(
                "slice {} not found",
                sla.slice_id
            )))
        }
        Err(e) => return Err(e.into()),
    }

    if state
        .store
        .get_sla_by_slice_id(&sla.slice_id)
        .await
        .is_ok()
    {
        return Err(AppError::Conflict(format!(
            "sla for slice {} already exists",
            sla.slice_id
        )));
    }

    let sla = state.store.create_sla(sla).await?;
    state.controller.add_slice(&sla.slice_id).await;

    tracing::info!(slice_id = %sla.slice_id, "sla created, slice registered with controller");
    Ok(Json(sla))
}

pub async fn update_sla(
    State(state): State<AppState>,
    Path(sla_id): Path<String>,
    Json(mut sla): Json<Sla>,
) -> Result<Json<Sla>, AppError> {
    sla.validate().map_err(AppError::BadRequest)?;

    let existing = state.store.get_sla(&sla_id).await?;
    sla.id = existing.id;

    let sla = state.store.update_sla(sla).await?;

    tracing::info!(sla_id = %sla_id, slice_id = %sla.slice_id, "sla updated");
    Ok(Json(sla))
}

/// Deleting the SLA also takes the slice out of the controller's rotation.
pub async fn delete_sla(
    State(state): State<AppState>,
    Path(sla_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let sla = state.store.get_sla(&sla_id).await?;

    state.store.delete_sla(&sla_id).await?;
    state.controller.remove_slice(&sla.slice_id).await;

    tracing::info!(sla_id = %sla_id, slice_id = %sla.slice_id, "sla deleted, slice deregistered");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_sla(
    State(state): State<AppState>,
    Path(sla_id): Path<String>,
) -> Result<Json<Sla>, AppError> {
    let sla = state.store.get_sla(&sla_id).await?;
    Ok(Json(sla))
}

pub async fn list_slas(State(state): State<AppState>) -> Result<Json<ListSlaResponse>, AppError> {
    let slas = state.store.list_slas().await?;
    Ok(Json(ListSlaResponse { slas }))
}
