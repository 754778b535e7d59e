use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppError;
use crate::services::monarch::MonarchResponse;
use crate::state::AppState;
use crate::store::StoreError;

// Endpoints consumed by the monitoring stack's orchestrator shims rather
// than by operators.

#[derive(Debug, Serialize)]
pub struct SliceComponentsResponse {
    pub pods: Vec<SlicePod>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SlicePod {
    pub name: String,
    pub nf: String,
    pub nss: String,
    pub pod_ip: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstallRequest {
    /// Empty (or absent body) means global scope.
    #[serde(default)]
    pub slice_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(flatten)]
    pub response: MonarchResponse,
    pub output: String,
}

/// Lists the NF pods of a slice, matched by the `name == "{nf}{slice_id}"`
/// labelling convention of the rendered deployments.
pub async fn so_slice_components(
    State(state): State<AppState>,
    Path(slice_id): Path<String>,
) -> Result<Json<SliceComponentsResponse>, AppError> {
    match state.store.get_slice_by_slice_id(&slice_id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            return Err(AppError::NotFound(format!("slice {} not found", slice_id)))
        }
        Err(e) => return Err(e.into()),
    }

    let pods = state
        .kube
        .get_pods(&state.config.kube.namespace, &[])
        .await?;

    let mut components = Vec::new();
    for pod in pods {
        let labels = pod.metadata.labels.clone().unwrap_or_default();
        let (Some(name_label), Some(nf)) = (labels.get("name"), labels.get("nf")) else {
            continue;
        };
        if *name_label != format!("{}{}", nf, slice_id) {
            continue;
        }
        components.push(SlicePod {
            name: pod.metadata.name.clone().unwrap_or_default(),
            nf: nf.clone(),
            nss: "edge".to_string(),
            pod_ip: pod
                .status
                .as_ref()
                .and_then(|s| s.pod_ip.clone())
                .unwrap_or_default(),
        });
    }

    Ok(Json(SliceComponentsResponse {
        pods: components,
        status: "success".to_string(),
    }))
}

pub async fn so_health() -> Json<MonarchResponse> {
    Json(MonarchResponse {
        status: "success".to_string(),
        message: "service orchestrator is healthy".to_string(),
    })
}

pub async fn no_health() -> Json<MonarchResponse> {
    Json(MonarchResponse {
        status: "success".to_string(),
        message: "NFV orchestrator is healthy".to_string(),
    })
}

/// Installs the MDE ServiceMonitors. An empty body (or empty slice id)
/// installs the global exporters.
pub async fn mde_install(
    State(state): State<AppState>,
    payload: Option<Json<InstallRequest>>,
) -> Result<Json<MonarchResponse>, AppError> {
    let slice_id = payload.map(|Json(req)| req.slice_id).unwrap_or_default();

    if !slice_id.is_empty() {
        ensure_slice_exists(&state, &slice_id).await?;
    }

    let yaml = state.renderer.render_mde(&slice_id)?;
    state.kube.apply_mde(&yaml).await?;

    tracing::info!(slice_id = %slice_id, "MDE installed");
    Ok(Json(MonarchResponse {
        status: "success".to_string(),
        message: "MDE installed".to_string(),
    }))
}

pub async fn mde_uninstall(
    State(state): State<AppState>,
) -> Result<Json<MonarchResponse>, AppError> {
    let yaml = state.renderer.render_mde("")?;
    state.kube.delete_mde(&yaml).await?;

    tracing::info!("MDE uninstalled");
    Ok(Json(MonarchResponse {
        status: "success".to_string(),
        message: "MDE uninstalled".to_string(),
    }))
}

pub async fn mde_check(State(state): State<AppState>) -> (StatusCode, Json<CheckResponse>) {
    match state
        .kube
        .get_services(&state.config.kube.monitor_namespace, &["app=monarch"])
        .await
    {
        Ok(services) => {
            let names: Vec<String> = services
                .iter()
                .filter_map(|s| s.metadata.name.clone())
                .collect();
            (
                StatusCode::OK,
                Json(CheckResponse {
                    response: MonarchResponse {
                        status: "success".to_string(),
                        message: "MDE check passed".to_string(),
                    },
                    output: format!("services: {:?}", names),
                }),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CheckResponse {
                response: MonarchResponse {
                    status: "error".to_string(),
                    message: "MDE check failed".to_string(),
                },
                output: format!("listing services failed: {}", e),
            }),
        ),
    }
}

pub async fn kpi_install(
    State(state): State<AppState>,
    payload: Option<Json<InstallRequest>>,
) -> Result<Json<MonarchResponse>, AppError> {
    let slice_id = payload.map(|Json(req)| req.slice_id).unwrap_or_default();

    if !slice_id.is_empty() {
        ensure_slice_exists(&state, &slice_id).await?;
    }

    let yaml = state.renderer.render_kpi_calc(&slice_id)?;
    state.kube.apply_kpic(&yaml).await?;

    tracing::info!(slice_id = %slice_id, "KPI calculator installed");
    Ok(Json(MonarchResponse {
        status: "success".to_string(),
        message: "KPI computation installed".to_string(),
    }))
}

pub async fn kpi_uninstall(
    State(state): State<AppState>,
) -> Result<Json<MonarchResponse>, AppError> {
    let yaml = state.renderer.render_kpi_calc("")?;
    state.kube.delete_kpic(&yaml).await?;

    tracing::info!("KPI calculator uninstalled");
    Ok(Json(MonarchResponse {
        status: "success".to_string(),
        message: "KPI computation uninstalled".to_string(),
    }))
}

pub async fn kpi_check(State(state): State<AppState>) -> (StatusCode, Json<CheckResponse>) {
    match state
        .kube
        .get_pods(
            &state.config.kube.monitor_namespace,
            &["app=monarch", "component=kpi-calculator"],
        )
        .await
    {
        Ok(pods) => {
            let names: Vec<String> = pods
                .iter()
                .filter_map(|p| p.metadata.name.clone())
                .collect();
            (
                StatusCode::OK,
                Json(CheckResponse {
                    response: MonarchResponse {
                        status: "success".to_string(),
                        message: "KPI computation check passed".to_string(),
                    },
                    output: format!("pods: {:?}", names),
                }),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CheckResponse {
                response: MonarchResponse {
                    status: "error".to_string(),
                    message: "KPI computation check failed".to_string(),
                },
                output: format!("listing pods failed: {}", e),
            }),
        ),
    }
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
