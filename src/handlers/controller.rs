use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ControllerResponse {
    pub running: bool,
    pub frequency_ns: u128,
    pub slices: Vec<String>,
    pub strategies: Vec<String>,
    pub used_strategy: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateControllerRequest {
    pub running: Option<bool>,
    /// Nanoseconds.
    pub frequency: Option<u64>,
    pub used_strategy: Option<String>,
}

pub async fn get_controller(State(state): State<AppState>) -> Json<ControllerResponse> {
    let status = state.controller.status().await;
    Json(ControllerResponse {
        running: status.running,
        frequency_ns: status.frequency.as_nanos(),
        slices: status.slices,
        strategies: status.strategies,
        used_strategy: status.used_strategy,
    })
}

/// Partial update: absent fields are untouched, identical values are no-ops.
pub async fn update_controller(
    State(state): State<AppState>,
    Json(req): Json<UpdateControllerRequest>,
) -> Result<StatusCode, AppError> {
    let controller = &state.controller;

    if let Some(running) = req.running {
        if running == controller.is_running().await {
            tracing::warn!(running, "controller already in requested state");
        } else if running {
            controller.start().await;
            tracing::info!("controller started via API");
        } else {
            controller.stop().await;
            tracing::info!("controller stopped via API");
        }
    }

    if let Some(frequency) = req.frequency {
        let frequency = Duration::from_nanos(frequency);
        controller.set_frequency(frequency).await;
        tracing::info!(frequency = ?frequency, "controller frequency updated");
    }

    if let Some(name) = req.used_strategy {
        if controller.active_strategy().await.as_deref() == Some(name.as_str()) {
            tracing::warn!(strategy = %name, "strategy unchanged, skipping");
        } else {
            controller
                .set_strategy(&name)
                .await
                .map_err(AppError::BadRequest)?;
            tracing::info!(strategy = %name, "controller strategy updated");
        }
    }

    Ok(StatusCode::OK)
}
