//! Pipeline API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use sluice_core::domain::pipeline::PipelineSpec;
use sluice_core::dto::pipeline::CreatePipelineRequest;

use crate::api::error::ApiResult;
use crate::error::Error;
use crate::service;
use crate::state::AppState;

/// POST /pipeline/create
/// Create a new pipeline, or update one when the request asks for it
pub async fn create_pipeline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePipelineRequest>,
) -> ApiResult<StatusCode> {
    tracing::info!("creating pipeline: {}", request.name);
    service::pipeline::create_pipeline(&state, request).await?;
    Ok(StatusCode::CREATED)
}

/// GET /pipeline/list
pub async fn list_pipelines(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<PipelineSpec>>> {
    Ok(Json(service::pipeline::list_pipelines(&state).await?))
}

/// GET /pipeline/{name}
pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<PipelineSpec>> {
    Ok(Json(service::pipeline::inspect_pipeline(&state, &name).await?))
}

/// DELETE /pipeline/{name}
pub async fn delete_pipeline(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("deleting pipeline: {}", name);
    service::pipeline::delete_pipeline(&state, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pipeline/delete-all
pub async fn delete_all_pipelines(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    tracing::info!("deleting all pipelines");
    service::pipeline::delete_all_pipelines(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pipeline/{name}/start
pub async fn start_pipeline(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    service::pipeline::start_pipeline(&state, &name).await?;
    Ok(StatusCode::OK)
}

/// POST /pipeline/{name}/stop
pub async fn stop_pipeline(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    service::pipeline::stop_pipeline(&state, &name).await?;
    Ok(StatusCode::OK)
}

/// POST /pipeline/{name}/rerun
/// Reserved; has never been implemented
pub async fn rerun_pipeline(
    State(_state): State<Arc<AppState>>,
    Path(_name): Path<String>,
) -> ApiResult<StatusCode> {
    Err(Error::Unimplemented.into())
}
