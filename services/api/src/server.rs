use crate::cli::ServeArgs;
use crate::infra::{open_service, AppState};
use crate::routes::with_placement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use placement_ready::config::AppConfig;
use placement_ready::error::AppError;
use placement_ready::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database) = args.database.take() {
        config.storage.database_path = database;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let storage = config.storage.clone();
    let service = tokio::task::spawn_blocking(move || open_service(&storage))
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;

    let app = with_placement_routes(service.clone())
        .layer(Extension(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement readiness service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
