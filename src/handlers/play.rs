use axum::extract::{Path, State};
use axum::Json;

use super::AppError;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::Play;

pub async fn create_play(
    State(state): State<AppState>,
    Json(play): Json<Play>,
) -> Result<Json<Play>, AppError> {
    play.validate().map_err(AppError::BadRequest)?;

    // The play is 1:1 with a live slice.
    match state.store.get_slice_by_slice_id(&play.slice_id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            return Err(AppError::NotFound(format!(
                "slice {} not found",
                play.slice_id
            )))
        }
        Err(e) => return Err(e.into()),
    }

    if state
        .store
        .get_play_by_slice_id(&play.slice_id)
        .await
        .is_ok()
    {
        return Err(AppError::Conflict(format!(
            "play for slice {} already exists",
            play.slice_id
        )));
    }

    let play = state.store.create_play(play).await?;

    // Creation is persist-then-apply; a failed apply rolls the record back.
    if let Err(e) = state
        .kube
        .apply_play(&play, &state.config.kube.namespace)
        .await
    {
        if let Some(id) = play.id {
            if let Err(del) = state.store.delete_play(&id.to_hex()).await {
                tracing::error!(error = %del, "rollback of stored play failed");
            }
        }
        return Err(AppError::Upstream(format!("apply play: {}", e)));
    }

    tracing::info!(slice_id = %play.slice_id, "play created");
    Ok(Json(play))
}

pub async fn update_play(
    State(state): State<AppState>,
    Path(play_id): Path<String>,
    Json(mut play): Json<Play>,
) -> Result<Json<Play>, AppError> {
    play.validate().map_err(AppError::BadRequest)?;

    let existing = state.store.get_play(&play_id).await?;
    play.id = existing.id;

    let play = state.store.update_play(play).await?;

    state
        .kube
        .apply_play(&play, &state.config.kube.namespace)
        .await
        .map_err(|e| AppError::Upstream(format!("apply play: {}", e)))?;

    tracing::info!(play_id = %play_id, slice_id = %play.slice_id, "play updated");
    Ok(Json(play))
}

pub async fn get_play(
    State(state): State<AppState>,
    Path(play_id): Path<String>,
) -> Result<Json<Play>, AppError> {
    let play = state.store.get_play(&play_id).await?;
    Ok(Json(play))
}
