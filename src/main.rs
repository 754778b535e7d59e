mod config;
mod controller;
mod handlers;
mod kubeclient;
mod render;
mod services;
mod state;
mod store;
mod types;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use controller::{AiStrategy, BasicStrategy, Controller, OpenAiChatModel};
use services::ipam::IpamService;
use services::lifecycle::SliceLifecycle;
use services::metrics::{Metrics, ThanosMetrics};
use services::monarch::MonarchClient;
use state::AppState;
use store::MongoStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slicer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(config::Config::from_env()?);

    // Monitoring stack reachability is advisory at startup; the monitor
    // endpoints will surface hard failures per request.
    let monarch = Arc::new(MonarchClient::new(
        &config.monitor.request_translator_uri,
        config.monitor.timeout,
    )?);
    if let Err(e) = monarch.ready().await {
        tracing::warn!(error = %e, "monarch request translator not reachable");
    }

    let thanos = Arc::new(ThanosMetrics::new(&config.monitor.thanos_uri)?);
    if let Err(e) = thanos.ready().await {
        tracing::warn!(error = %e, "thanos not reachable");
    }

    let store = Arc::new(MongoStore::connect(&config.mongo, config.server.clone()).await?);

    let renderer = Arc::new(render::Renderer::new(config.as_ref()));

    let kube = Arc::new(kubeclient::KubeClient::new(&config.kube).await?);
    kube.bootstrap_namespaces().await?;

    let ipam = Arc::new(IpamService::new(store.mongo_database(), &config.ipam).await?);

    let lifecycle = Arc::new(SliceLifecycle::new(
        store.clone(),
        ipam.clone(),
        renderer.clone(),
        kube.clone(),
    ));

    let controller = Controller::new(store.clone(), kube.clone(), &config.kube.namespace);

    let metrics: Arc<dyn Metrics> = thanos.clone();
    controller
        .register_strategy(Arc::new(BasicStrategy::new(metrics.clone())))
        .await
        .expect("basic strategy registers once");
    controller
        .set_strategy("basic")
        .await
        .expect("basic strategy is registered");

    match OpenAiChatModel::from_config(&config.ai) {
        Ok(model) => {
            let ai = AiStrategy::new(Arc::new(model), metrics.clone(), config.ai.timeout);
            if let Err(e) = controller.register_strategy(Arc::new(ai)).await {
                tracing::warn!(error = %e, "ai strategy not registered");
            }
        }
        Err(e) => tracing::warn!(error = %e, "ai strategy disabled"),
    }

    let app_state = AppState {
        config: config.clone(),
        store,
        kube,
        renderer,
        monarch,
        lifecycle,
        controller,
    };

    // Slices under SLA go back into the controller's rotation on restart.
    match app_state.store.list_slas().await {
        Ok(slas) => {
            for sla in slas {
                app_state.controller.add_slice(&sla.slice_id).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not reload SLA registrations"),
    }

    let app = Router::new()
        .route(
            "/slice",
            post(handlers::slice::create_slice).get(handlers::slice::list_slices),
        )
        .route(
            "/slice/:slice_id",
            get(handlers::slice::get_slice).delete(handlers::slice::delete_slice),
        )
        .route(
            "/monitor",
            post(handlers::monitor::create_monitor).get(handlers::monitor::list_monitors),
        )
        .route(
            "/monitor/supported_kpis",
            get(handlers::monitor::get_supported_kpis),
        )
        .route(
            "/monitor/external",
            post(handlers::monitor::create_monitor_external),
        )
        .route(
            "/monitor/external/:monitor_id",
            delete(handlers::monitor::delete_monitor_external),
        )
        .route(
            "/monitor/:monitor_id",
            get(handlers::monitor::get_monitor).delete(handlers::monitor::delete_monitor),
        )
        .route("/play", post(handlers::play::create_play))
        .route(
            "/play/:play_id",
            put(handlers::play::update_play).get(handlers::play::get_play),
        )
        .route(
            "/sla",
            post(handlers::sla::create_sla).get(handlers::sla::list_slas),
        )
        .route(
            "/sla/:sla_id",
            put(handlers::sla::update_sla)
                .delete(handlers::sla::delete_sla)
                .get(handlers::sla::get_sla),
        )
        .route(
            "/controller",
            get(handlers::controller::get_controller).put(handlers::controller::update_controller),
        )
        .route(
            "/service-orchestrator/slices/:slice_id",
            get(handlers::orchestrator::so_slice_components),
        )
        .route(
            "/service-orchestrator/api/health",
            get(handlers::orchestrator::so_health),
        )
        .route(
            "/nfv-orchestrator/api/health",
            get(handlers::orchestrator::no_health),
        )
        .route(
            "/nfv-orchestrator/mde/install",
            post(handlers::orchestrator::mde_install),
        )
        .route(
            "/nfv-orchestrator/mde/uninstall",
            post(handlers::orchestrator::mde_uninstall),
        )
        .route(
            "/nfv-orchestrator/mde/check",
            post(handlers::orchestrator::mde_check),
        )
        .route(
            "/nfv-orchestrator/kpi-computation/install",
            post(handlers::orchestrator::kpi_install),
        )
        .route(
            "/nfv-orchestrator/kpi-computation/uninstall",
            post(handlers::orchestrator::kpi_uninstall),
        )
        .route(
            "/nfv-orchestrator/kpi-computation/check",
            post(handlers::orchestrator::kpi_check),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    tracing::info!(
        address = %config.server.http_server_address,
        "starting slice control plane"
    );
    let listener = tokio::net::TcpListener::bind(&config.server.http_server_address).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    app_state.controller.stop().await;
    tracing::info!("slice control plane shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
