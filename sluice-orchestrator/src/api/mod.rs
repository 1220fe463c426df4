//! HTTP API layer
//!
//! One submodule per domain; streaming endpoints emit
//! newline-delimited JSON.

pub mod admin;
pub mod datum;
pub mod error;
pub mod health;
pub mod job;
pub mod log;
pub mod pipeline;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Serialize a finished collection as an NDJSON response
pub(crate) fn ndjson<T: Serialize>(items: impl IntoIterator<Item = T>) -> Response {
    let mut body = Vec::new();
    for item in items {
        if serde_json::to_writer(&mut body, &item).is_ok() {
            body.push(b'\n');
        }
    }
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

/// Create the main API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/delete-all", post(pipeline::delete_all_pipelines))
        .route("/pipeline/{name}", get(pipeline::get_pipeline))
        .route("/pipeline/{name}", delete(pipeline::delete_pipeline))
        .route("/pipeline/{name}/start", post(pipeline::start_pipeline))
        .route("/pipeline/{name}/stop", post(pipeline::stop_pipeline))
        .route("/pipeline/{name}/rerun", post(pipeline::rerun_pipeline))
        // Job endpoints
        .route("/job/create", post(job::create_job))
        .route("/job/list", post(job::list_jobs))
        .route("/job/list/stream", post(job::list_jobs_stream))
        .route("/job/{id}", get(job::get_job))
        .route("/job/{id}", delete(job::delete_job))
        .route("/job/{id}/stop", post(job::stop_job))
        .route("/job/{id}/restart-datum", post(job::restart_datum))
        // Datum endpoints
        .route("/datum/list", post(datum::list_datum))
        .route("/datum/list/stream", post(datum::list_datum_stream))
        .route("/datum/{job_id}/{datum_id}", get(datum::get_datum))
        // Logs
        .route("/logs", post(log::get_logs))
        // Administrative
        .route("/admin/delete-all", post(admin::delete_all))
        .route("/admin/garbage-collect", post(admin::garbage_collect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
