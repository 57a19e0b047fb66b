use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    Criteria, NewStudent, ProfileFields, ProfileSubmission, RequestContext, Role, StudentId,
};
use super::service::{Missing, PlacementError, PlacementService};
use crate::storage::Connector;

/// Set by the authentication layer in front of this service.
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLE_HEADER: &str = "x-actor-role";

/// Router exposing criteria, profile, and directory operations as JSON endpoints.
pub fn placement_router<C>(service: Arc<PlacementService<C>>) -> Router
where
    C: Connector + 'static,
{
    Router::new()
        .route(
            "/api/v1/criteria",
            get(criteria_handler::<C>).put(upsert_criteria_handler::<C>),
        )
        .route(
            "/api/v1/students",
            get(list_students_handler::<C>).post(register_student_handler::<C>),
        )
        .route("/api/v1/students/eligible", get(list_eligible_handler::<C>))
        .route("/api/v1/students/:student_id", get(student_handler::<C>))
        .route(
            "/api/v1/students/:student_id/profile",
            get(profile_handler::<C>).put(upsert_profile_handler::<C>),
        )
        .route(
            "/api/v1/students/:student_id/profile/form",
            post(submit_profile_handler::<C>),
        )
        .route(
            "/api/v1/students/:student_id/eligibility",
            get(eligibility_handler::<C>).post(recompute_one_handler::<C>),
        )
        .route(
            "/api/v1/students/:student_id/approval",
            post(approval_handler::<C>),
        )
        .route(
            "/api/v1/eligibility/recompute",
            post(recompute_all_handler::<C>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectoryQuery {
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ApprovalRequest {
    approved: bool,
}

pub(crate) async fn criteria_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match run(service, move |service| service.criteria(&ctx)).await {
        Ok(Some(criteria)) => (StatusCode::OK, Json(criteria)).into_response(),
        Ok(None) => error_response(PlacementError::NotFound(Missing::Criteria)),
        Err(response) => response,
    }
}

pub(crate) async fn upsert_criteria_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Json(criteria): Json<Criteria>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match run(service, move |service| service.upsert_criteria(&ctx, criteria)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_students_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Query(query): Query<DirectoryQuery>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let department = query.department.filter(|value| !value.trim().is_empty());
    match run(service, move |service| {
        service.list_students(&ctx, department.as_deref())
    })
    .await
    {
        Ok(students) => (StatusCode::OK, Json(students)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn register_student_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Json(student): Json<NewStudent>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match run(service, move |service| service.register_student(&ctx, student)).await {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_eligible_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match run(service, move |service| service.list_eligible(&ctx)).await {
        Ok(students) => (StatusCode::OK, Json(students)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn student_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| service.student(&ctx, student)).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn profile_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| service.profile(&ctx, student)).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => error_response(PlacementError::NotFound(Missing::Profile(student))),
        Err(response) => response,
    }
}

pub(crate) async fn upsert_profile_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
    Json(fields): Json<ProfileFields>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| {
        service.upsert_profile(&ctx, student, fields)
    })
    .await
    {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn submit_profile_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
    Form(submission): Form<ProfileSubmission>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| {
        service.submit_profile(&ctx, student, submission)
    })
    .await
    {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn eligibility_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| service.eligibility_status(&ctx, student)).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn recompute_one_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| service.recompute_one(&ctx, student)).await {
        Ok(eligible) => {
            let payload = json!({
                "student_id": student,
                "is_eligible": eligible,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn approval_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
    Path(student_id): Path<i64>,
    Json(request): Json<ApprovalRequest>,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let student = StudentId(student_id);
    match run(service, move |service| {
        service.set_approval(&ctx, student, request.approved)
    })
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn recompute_all_handler<C: Connector + 'static>(
    State(service): State<Arc<PlacementService<C>>>,
    headers: HeaderMap,
) -> Response {
    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match run(service, move |service| service.recompute_all(&ctx)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

/// Read the caller identity forwarded by the authentication layer.
pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, Response> {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok());
    let role = headers
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    match (actor, role) {
        (Some(actor), Some(role)) => Ok(RequestContext { actor, role }),
        _ => {
            let payload = json!({
                "error": format!("requests must carry {ACTOR_HEADER} and {ROLE_HEADER} headers"),
            });
            Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
        }
    }
}

/// The service is synchronous, so each call runs on the blocking pool.
async fn run<C, T, F>(service: Arc<PlacementService<C>>, op: F) -> Result<T, Response>
where
    C: Connector + 'static,
    T: Send + 'static,
    F: FnOnce(&PlacementService<C>) -> Result<T, PlacementError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "placement task aborted");
            let payload = json!({ "error": "internal error" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response())
        }
    }
}

pub fn error_response(err: PlacementError) -> Response {
    match err {
        PlacementError::PartialCascade(report) => {
            let payload = json!({
                "error": format!(
                    "eligibility recompute failed for {} student(s)",
                    report.failures.len()
                ),
                "report": report,
            });
            (StatusCode::MULTI_STATUS, Json(payload)).into_response()
        }
        other => {
            let status = match &other {
                PlacementError::NotFound(_) => StatusCode::NOT_FOUND,
                PlacementError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PlacementError::Forbidden { .. } => StatusCode::FORBIDDEN,
                PlacementError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                PlacementError::Storage(_) | PlacementError::PartialCascade(_) => {
                    error!(error = %other, "placement storage failure");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let payload = json!({
                "error": other.to_string(),
            });
            (status, Json(payload)).into_response()
        }
    }
}
