//! Job API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use sluice_core::domain::job::JobInfo;
use sluice_core::dto::job::{
    CreateJobRequest, CreateJobResponse, ListJobRequest, RestartDatumRequest,
};

use crate::api::error::ApiResult;
use crate::api::ndjson;
use crate::service;
use crate::state::AppState;

/// POST /job/create
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<Json<CreateJobResponse>> {
    let job_id = service::job::create_job(&state, request).await?;
    Ok(Json(CreateJobResponse { job_id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct InspectJobQuery {
    #[serde(default)]
    pub block_state: bool,
}

/// GET /job/{id}?block_state=true
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<InspectJobQuery>,
) -> ApiResult<Json<JobInfo>> {
    Ok(Json(
        service::job::inspect_job(&state, &id, query.block_state).await?,
    ))
}

/// POST /job/list
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListJobRequest>,
) -> ApiResult<Json<Vec<JobInfo>>> {
    Ok(Json(service::job::list_jobs(&state, &request).await?))
}

/// POST /job/list/stream
pub async fn list_jobs_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListJobRequest>,
) -> ApiResult<Response> {
    let infos = service::job::list_jobs(&state, &request).await?;
    Ok(ndjson(infos))
}

/// DELETE /job/{id}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service::job::delete_job(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /job/{id}/stop
pub async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service::job::stop_job(&state, &id).await?;
    Ok(StatusCode::OK)
}

/// POST /job/{id}/restart-datum
pub async fn restart_datum(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RestartDatumRequest>,
) -> ApiResult<StatusCode> {
    service::job::restart_datum(&state, &id, request.data_filters).await?;
    Ok(StatusCode::OK)
}
