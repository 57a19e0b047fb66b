use crate::export::{export_filename, write_eligible_csv};
use crate::infra::AppState;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use chrono::Local;
use placement_ready::eligibility::router::{error_response, request_context};
use placement_ready::eligibility::{placement_router, PlacementService};
use placement_ready::error::AppError;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_placement_routes(service: Arc<PlacementService>) -> axum::Router {
    placement_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/students/eligible/export",
            axum::routing::get(eligible_export_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Download of `ListEligible()` as a CSV attachment.
pub(crate) async fn eligible_export_endpoint(
    Extension(service): Extension<Arc<PlacementService>>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    let students = match tokio::task::spawn_blocking(move || service.list_eligible(&ctx)).await {
        Ok(Ok(students)) => students,
        Ok(Err(err)) => return error_response(err),
        Err(err) => return AppError::Io(std::io::Error::other(err)).into_response(),
    };

    let mut body = Vec::new();
    if let Err(err) = write_eligible_csv(&mut body, &students) {
        return AppError::Io(err).into_response();
    }

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(Local::now().date_naive())
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
