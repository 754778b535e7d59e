use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppError;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::{Monitor, SupportedKpi};

#[derive(Debug, Deserialize)]
pub struct CreateMonitorRequest {
    pub monitor: Monitor,
}

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub monitor: Monitor,
}

#[derive(Debug, Serialize)]
pub struct ListMonitorResponse {
    pub monitors: Vec<Monitor>,
}

#[derive(Debug, Serialize)]
pub struct SupportedKpisResponse {
    pub supported_kpis: Vec<SupportedKpi>,
}

pub async fn get_supported_kpis(
    State(state): State<AppState>,
) -> Result<Json<SupportedKpisResponse>, AppError> {
    let supported_kpis = state.monarch.get_supported_kpis().await?;
    Ok(Json(SupportedKpisResponse { supported_kpis }))
}

/// Installs the monitoring artifacts for one slice locally: MDE
/// ServiceMonitors plus the KPI calculator, then persists the request.
pub async fn create_monitor(
    State(state): State<AppState>,
    Json(payload): Json<CreateMonitorRequest>,
) -> Result<Json<MonitorResponse>, AppError> {
    let monitor = payload.monitor;
    monitor.validate().map_err(AppError::BadRequest)?;

    let slice_id = monitor.kpi.sub_counter.sub_counter_ids[0].clone();
    if slice_id.is_empty() {
        return Err(AppError::BadRequest("slice id is required".to_string()));
    }
    ensure_slice_exists(&state, &slice_id).await?;

    let mde = state.renderer.render_mde(&slice_id)?;
    let kpic = state.renderer.render_kpi_calc(&slice_id)?;

    state.kube.apply_mde(&mde).await?;
    state.kube.apply_kpic(&kpic).await?;

    let monitor = state.store.create_monitor(monitor).await?;

    tracing::info!(slice_id = %slice_id, "monitor installed");
    Ok(Json(MonitorResponse { monitor }))
}

/// Brokers the request to the external monitoring stack instead of
/// installing anything locally. A slice id is mandatory here.
pub async fn create_monitor_external(
    State(state): State<AppState>,
    Json(payload): Json<CreateMonitorRequest>,
) -> Result<Json<MonitorResponse>, AppError> {
    let monitor = payload.monitor;
    monitor.validate().map_err(AppError::BadRequest)?;

    let slice_id = monitor.kpi.sub_counter.sub_counter_ids[0].clone();
    if slice_id.is_empty() {
        return Err(AppError::BadRequest("slice id is required".to_string()));
    }
    ensure_slice_exists(&state, &slice_id).await?;

    let monitor = state.monarch.submit_monitoring(monitor).await?;
    let monitor = state.store.create_monitor(monitor).await?;

    tracing::info!(slice_id = %slice_id, request_id = ?monitor.request_id, "external monitor submitted");
    Ok(Json(MonitorResponse { monitor }))
}

pub async fn delete_monitor(
    State(state): State<AppState>,
    Path(monitor_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let monitor = state.store.get_monitor(&monitor_id).await?;
    let slice_id = monitor
        .kpi
        .sub_counter
        .sub_counter_ids
        .first()
        .cloned()
        .unwrap_or_default();

    let mde = state.renderer.render_mde(&slice_id)?;
    let kpic = state.renderer.render_kpi_calc(&slice_id)?;

    state.kube.delete_mde(&mde).await?;
    state.kube.delete_kpic(&kpic).await?;

    state.store.delete_monitor(&monitor_id).await?;

    tracing::info!(monitor_id = %monitor_id, slice_id = %slice_id, "monitor uninstalled");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_monitor_external(
    State(state): State<AppState>,
    Path(monitor_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let monitor = state.store.get_monitor(&monitor_id).await?;

    let request_id = monitor.request_id.as_deref().ok_or_else(|| {
        AppError::BadRequest(format!("monitor {} was not brokered externally", monitor_id))
    })?;
    state.monarch.delete_monitoring(request_id).await?;

    state.store.delete_monitor(&monitor_id).await?;

    tracing::info!(monitor_id = %monitor_id, request_id = %request_id, "external monitor deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_monitor(
    State(state): State<AppState>,
    Path(monitor_id): Path<String>,
) -> Result<Json<MonitorResponse>, AppError> {
    let monitor = state.store.get_monitor(&monitor_id).await?;
    Ok(Json(MonitorResponse { monitor }))
}

pub async fn list_monitors(
    State(state): State<AppState>,
) -> Result<Json<ListMonitorResponse>, AppError> {
    let monitors = state.store.list_monitors().await?;
    Ok(Json(ListMonitorResponse { monitors }))
}

async fn ensure_slice_exists(state: &AppState, slice_id: &str) -> Result<(), AppError> {
    match state.store.get_slice_by_slice_id(slice_id).await {
        Ok(_) => Ok(()),
        Err(StoreError::NotFound) => Err(AppError::NotFound(format!(
            "slice {} not found",
            slice_id
        ))),
        Err(e) => Err(e.into()),
    }
}
