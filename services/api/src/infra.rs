use metrics_exporter_prometheus::PrometheusHandle;
use placement_ready::config::StorageConfig;
use placement_ready::eligibility::PlacementService;
use placement_ready::error::AppError;
use placement_ready::storage::{ConnectionManager, PlacementStore, SqliteConnector};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store for operator commands. The schema is not touched until first use.
pub(crate) fn store(config: &StorageConfig) -> PlacementStore {
    PlacementStore::from_config(config)
}

/// Open the database, bring the schema up to date, and wrap it in the service.
pub(crate) fn open_service(config: &StorageConfig) -> Result<Arc<PlacementService>, AppError> {
    let connector = SqliteConnector::new(config.database_path.clone(), config.busy_timeout);
    let store = PlacementStore::open(ConnectionManager::new(connector, config.retry))?;
    info!(
        path = %config.database_path.display(),
        max_attempts = config.retry.max_attempts,
        "placement storage ready"
    );
    Ok(Arc::new(PlacementService::new(Arc::new(store))))
}
