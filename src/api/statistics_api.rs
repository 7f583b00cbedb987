use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};
use validator::Validate;

use super::AppState;
use crate::object_store::file_name;
use crate::stats::{NewSegmentRequest, StatsError, SubmitProcessRequest};

/// Poll response while a job is running or once it finished.
#[derive(Debug, Serialize)]
pub struct ProcessStatusResponse {
    pub status_code: u16,
    pub progress: i32,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub sig: String,
}

/// API-facing error: maps domain failures to a status and a JSON body
/// carrying a user-ready message. Internal detail goes to the log only.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Poll-time response for a job with a recorded permanent failure.
    fn failed_job() -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: "Statistics generation failed. Please retry the request.".to_string(),
        }
    }
}

impl From<StatsError> for ApiError {
    fn from(e: StatsError) -> Self {
        let (status, message) = match &e {
            StatsError::NotFound { what, id } => (
                StatusCode::NOT_FOUND,
                format!("No {what} found with id {id}"),
            ),
            StatsError::DuplicateSegmentName { name } => (
                StatusCode::CONFLICT,
                format!("Segment name already exists: {name}"),
            ),
            StatsError::UnknownClassifierCode { .. }
            | StatsError::MetricIndexOutOfRange { .. }
            | StatsError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            StatsError::InvalidShareToken => (
                StatusCode::FORBIDDEN,
                "Share link is invalid or has expired".to_string(),
            ),
            StatsError::Upstream { message } => (StatusCode::BAD_GATEWAY, message.clone()),
            _ => {
                error!("Internal error while handling request: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        Self { status, message }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("Request parameter validation failed: {e}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status_code": self.status.as_u16(),
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// Submit a new aggregation process. Returns its id immediately; the
/// computation happens in the background worker.
pub async fn submit_process(
    State(state): State<AppState>,
    Json(request): Json<SubmitProcessRequest>,
) -> Result<Json<Value>, ApiError> {
    request.validate()?;
    let request_id = state.repository.submit_process(&request).await?;
    Ok(Json(json!({
        "status_code": 200,
        "request_id": request_id,
        "message": "OK",
    })))
}

/// Current progress of an aggregation process, with a share URL once the
/// artifact is ready.
pub async fn get_process_status(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
) -> Result<Json<ProcessStatusResponse>, ApiError> {
    let process = state.repository.get_process(request_id).await?;

    if let Some(error_msg) = &process.error_msg {
        // Surface only a generic retry suggestion; the reason stays here
        warn!(process_id = process.id, error = %error_msg, "Polled a failed process");
        return Err(ApiError::failed_job());
    }

    let mut progress = process.progress;
    let mut file_url = None;
    let mut file_name_out = None;

    if process.progress == 100 {
        match &process.data_file {
            Some(data_file) => {
                let link = state.store.share_url(data_file)?;
                file_url = Some(link.url);
                file_name_out = Some(file_name(data_file));
            }
            // The artifact has not landed yet; report "finalizing" rather
            // than a completion we cannot serve
            None => progress = 99,
        }
    }

    Ok(Json(ProcessStatusResponse {
        status_code: 200,
        progress,
        file_url,
        file_name: file_name_out,
        message: "OK",
    }))
}

/// Metrics and regions the submission form offers.
pub async fn get_metrics_regions(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let metrics = state.repository.list_metrics().await?;
    let regions = state.repository.list_region_codifiers().await?;

    Ok(Json(json!({
        "metrics": metrics
            .iter()
            .map(|m| json!({"id": m.id, "metric_name": m.name}))
            .collect::<Vec<_>>(),
        "regions": regions
            .iter()
            .map(|r| json!({
                "region_code": r.region_code,
                "name": r.region_name,
                "region_id": r.region_id,
            }))
            .collect::<Vec<_>>(),
    })))
}

/// Saved segments plus the top level of the classifier tree.
pub async fn get_classifier_segments(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let segments = state.repository.list_segments().await?;
    let roots = state.repository.classifier_roots().await?;

    Ok(Json(json!({
        "segments": segments
            .iter()
            .map(|s| json!({"id": s.id, "segment_name": s.name}))
            .collect::<Vec<_>>(),
        "okpd2": roots
            .iter()
            .map(|n| json!({"id": n.id, "code": n.code, "description": n.description}))
            .collect::<Vec<_>>(),
    })))
}

/// Direct children of one classifier node, for lazy tree expansion.
pub async fn get_classifier_children(
    State(state): State<AppState>,
    Path(parent_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let children = state.repository.classifier_children(parent_id).await?;
    Ok(Json(json!(children
        .iter()
        .map(|n| json!({"id": n.id, "code": n.code, "description": n.description}))
        .collect::<Vec<_>>())))
}

/// Create a named segment of classifier leaf codes.
pub async fn create_segment(
    State(state): State<AppState>,
    Json(request): Json<NewSegmentRequest>,
) -> Result<Json<Value>, ApiError> {
    request.validate()?;
    let segment = state.repository.create_segment(&request).await?;
    Ok(Json(json!({
        "status_code": 200,
        "segment_id": segment.id,
        "message": "OK",
    })))
}

/// A segment's leaf codes expanded to classifier-tree records.
pub async fn get_segment_data(
    State(state): State<AppState>,
    Path(segment_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let nodes = state.repository.segment_codifier_nodes(segment_id).await?;
    Ok(Json(json!({
        "okpd2": nodes
            .iter()
            .map(|n| json!({"id": n.id, "code": n.code, "description": n.description}))
            .collect::<Vec<_>>(),
    })))
}

/// Root-to-leaf classifier paths for each code in a segment.
pub async fn get_segment_paths(
    State(state): State<AppState>,
    Path(segment_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let paths = state.repository.segment_code_paths(segment_id).await?;
    Ok(Json(json!({ "paths": paths })))
}

/// Download an artifact through a signed share link.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let path = state.store.verify_share_token(&token, &query.sig)?;
    let bytes = state.store.get(&path).await?;

    let disposition = format!("attachment; filename=\"{}\"", file_name(&path));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| ApiError::from(StatsError::InvalidShareToken))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
