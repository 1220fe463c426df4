//! Administrative API handlers

use axum::{extract::State, http::StatusCode};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service;
use crate::state::AppState;

/// POST /admin/delete-all
/// Delete every pipeline and job. Requires cluster-admin when auth is
/// active.
pub async fn delete_all(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    tracing::info!("deleting all cluster data");
    service::pipeline::delete_all(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/garbage-collect
pub async fn garbage_collect(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    tracing::info!("starting garbage collection");
    service::gc::garbage_collect(&state).await?;
    Ok(StatusCode::OK)
}
