use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppError;
use crate::state::AppState;
use crate::types::{Slice, SliceRecord};

#[derive(Debug, Deserialize)]
pub struct CreateSliceRequest {
    pub slice: Slice,
}

#[derive(Debug, Serialize)]
pub struct SliceResponse {
    pub slice: SliceRecord,
}

#[derive(Debug, Serialize)]
pub struct ListSliceResponse {
    pub slices: Vec<SliceRecord>,
}

pub async fn create_slice(
    State(state): State<AppState>,
    Json(payload): Json<CreateSliceRequest>,
) -> Result<Json<SliceResponse>, AppError> {
    let slice = payload.slice;
    slice
        .validate()
        .map_err(AppError::BadRequest)?;

    let record = state.lifecycle.create(slice).await?;

    tracing::info!(slice_id = %record.slice_id(), "slice created");
    Ok(Json(SliceResponse { slice: record }))
}

pub async fn delete_slice(
    State(state): State<AppState>,
    Path(slice_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if slice_id.is_empty() {
        return Err(AppError::BadRequest("slice_id is required".to_string()));
    }

    state.lifecycle.delete(&slice_id).await?;

    tracing::info!(slice_id = %slice_id, "slice deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_slice(
    State(state): State<AppState>,
    Path(slice_id): Path<String>,
) -> Result<Json<SliceResponse>, AppError> {
    let record = state.store.get_slice_by_slice_id(&slice_id).await?;
    Ok(Json(SliceResponse { slice: record }))
}

pub async fn list_slices(
    State(state): State<AppState>,
) -> Result<Json<ListSliceResponse>, AppError> {
    let slices = state.store.list_slices().await?;
    Ok(Json(ListSliceResponse { slices }))
}
