//! services/coordinator/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use tutoring_core::attendance::{self, AttendanceEntry, AttendanceSummary};
use tutoring_core::checker::run_data_checker;
use tutoring_core::client::ClientError;
use tutoring_core::domain::{Booking, Learner, Matching, Tutor};
use tutoring_core::ports::PortError;
use tutoring_core::scheduling::build_tutor_index;
use tutoring_core::store::{self, RawRecord, StoreError};
use tutoring_core::workflow::{self, WorkflowError};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        step2_handler,
        convert_submission_handler,
    ),
    components(
        schemas(Step2Payload, ConvertResponse)
    ),
    tags(
        (name = "Tutoring Coordinator API", description = "API endpoints for the tutoring scheduling workflow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The payload for moving a request from the booking step to the pass step.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Step2Payload {
    /// Ids of the bookings the coordinator wants to keep.
    pub chosen_bookings: Vec<i64>,
    /// Must be `true`; the UI asks the coordinator to confirm before
    /// bookings are committed.
    #[serde(default)]
    pub confirmed: bool,
}

/// The response payload sent after converting a request submission.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    request_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    summary: AttendanceSummary,
    entries: Vec<AttendanceEntry>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps every error to a status code and a human-readable message. The
/// message is the whole contract: clients show it verbatim.
fn client_error(err: ClientError) -> (StatusCode, String) {
    match err {
        ClientError::Port(e) => port_error(e),
        ClientError::Store(e) => store_error(e),
    }
}

fn port_error(err: PortError) -> (StatusCode, String) {
    match err {
        PortError::Timeout => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        PortError::Backend(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        PortError::InvalidResponse(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::RecordNotAvailable { .. } | StoreError::UnknownResource(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        StoreError::NotLoaded(_) => (StatusCode::CONFLICT, err.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn workflow_error(err: WorkflowError) -> (StatusCode, String) {
    match err {
        WorkflowError::NoBookingsChosen
        | WorkflowError::CannotGoBack(_)
        | WorkflowError::AlreadyConverted => (StatusCode::CONFLICT, err.to_string()),
        WorkflowError::DuplicateStudentId(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        WorkflowError::Client(e) => client_error(e),
        WorkflowError::Store(e) => store_error(e),
    }
}

//=========================================================================================
// Resource CRUD Handlers
//=========================================================================================

pub async fn list_records_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cache = app_state.client.cache(&name).map_err(store_error)?;
    let records = cache.snapshot().map_err(store_error)?;
    Ok(Json(records))
}

pub async fn create_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(record): Json<RawRecord>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let created = app_state
        .client
        .create_record(&name, record)
        .await
        .map_err(client_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, i64)>,
    Json(mut record): Json<RawRecord>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // The path is authoritative for the id.
    record.insert("id".to_string(), Value::from(id));
    app_state
        .client
        .update_record(&name, record)
        .await
        .map_err(client_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .client
        .delete_record(&name, id)
        .await
        .map_err(client_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-pulls every resource from the backend in one round-trip.
pub async fn refresh_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state.client.refresh_all().await.map_err(client_error)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Data Checker and Scheduling Handlers
//=========================================================================================

pub async fn datachecker_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = run_data_checker(app_state.client.store()).map_err(store_error)?;
    Ok(Json(report))
}

pub async fn tutor_index_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = app_state.client.store();
    let tutors: Vec<Tutor> = store.tutors().decode_all().map_err(store_error)?;
    let bookings: Vec<Booking> = store.bookings().decode_all().map_err(store_error)?;
    let matchings: Vec<Matching> = store.matchings().decode_all().map_err(store_error)?;
    let index = build_tutor_index(&tutors, &bookings, &matchings)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(Json(index))
}

//=========================================================================================
// Workflow Handlers
//=========================================================================================

/// Move a request from the booking step to the pass step.
///
/// The chosen bookings are committed to the request. The request is
/// refused if nothing is chosen, or if the coordinator did not confirm.
#[utoipa::path(
    post,
    path = "/requests/{id}/step2",
    request_body = Step2Payload,
    responses(
        (status = 204, description = "Request advanced to the pass step"),
        (status = 409, description = "No bookings chosen, or not confirmed"),
        (status = 404, description = "No such request")
    ),
    params(
        ("id" = i64, Path, description = "The request's record id.")
    )
)]
pub async fn step2_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<Step2Payload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !payload.confirmed {
        return Err((
            StatusCode::CONFLICT,
            "The step was not confirmed.".to_string(),
        ));
    }
    workflow::advance_to_step2(&app_state.client, id, &payload.chosen_bookings)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn step3_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    workflow::advance_to_step3(&app_state.client, id)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn step4_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    workflow::advance_to_step4(&app_state.client, id)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn go_back_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    workflow::go_back_a_step(&app_state.client, id)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Convert a raw request submission into a request (and possibly a learner).
#[utoipa::path(
    post,
    path = "/submissions/{id}/convert",
    responses(
        (status = 201, description = "Submission converted", body = ConvertResponse),
        (status = 409, description = "Submission was already converted"),
        (status = 404, description = "No such submission")
    ),
    params(
        ("id" = i64, Path, description = "The submission's record id.")
    )
)]
pub async fn convert_submission_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let request_id = workflow::convert_request_submission(&app_state.client, id)
        .await
        .map_err(workflow_error)?;
    Ok((StatusCode::CREATED, Json(ConvertResponse { request_id })))
}

//=========================================================================================
// Attendance and Command Handlers
//=========================================================================================

pub async fn attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = app_state.client.store();
    // Only the two student-shaped resources carry attendance blobs.
    let (data, additional_hours) = match resource.as_str() {
        store::TUTORS => {
            let tutor: Tutor = store.tutors().decode(id).map_err(store_error)?;
            (tutor.attendance, tutor.additional_hours)
        }
        store::LEARNERS => {
            let learner: Learner = store.learners().decode(id).map_err(store_error)?;
            (learner.attendance, None)
        }
        other => {
            return Err((
                StatusCode::NOT_FOUND,
                format!("resource {other} has no attendance"),
            ))
        }
    };
    let summary = attendance::summarize(&data, additional_hours)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    let entries =
        attendance::flatten(&data).map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(Json(AttendanceResponse { summary, entries }))
}

/// Pass a command straight through to the backend. No deadline applies.
pub async fn command_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(args): Json<Vec<Value>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let val = app_state
        .client
        .backend()
        .command(&name, args)
        .await
        .map_err(|e| {
            error!("command {} failed: {:?}", name, e);
            port_error(e)
        })?;
    Ok(Json(val))
}

//=========================================================================================
// Router Assembly
//=========================================================================================

/// Builds the API router. The binary layers CORS and the Swagger UI on
/// top; the integration tests drive this router directly.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/resources/{name}",
            get(list_records_handler).post(create_record_handler),
        )
        .route(
            "/resources/{name}/{id}",
            put(update_record_handler).delete(delete_record_handler),
        )
        .route("/refresh", post(refresh_handler))
        .route("/datachecker", get(datachecker_handler))
        .route("/scheduling/tutor-index", get(tutor_index_handler))
        .route("/requests/{id}/step2", post(step2_handler))
        .route("/requests/{id}/step3", post(step3_handler))
        .route("/requests/{id}/step4", post(step4_handler))
        .route("/requests/{id}/back", post(go_back_handler))
        .route("/submissions/{id}/convert", post(convert_submission_handler))
        .route("/attendance/{resource}/{id}", get(attendance_handler))
        .route("/commands/{name}", post(command_handler))
        .with_state(app_state)
}
