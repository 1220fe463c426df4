//! Datum API handlers

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use std::sync::Arc;

use sluice_core::domain::datum::DatumInfo;
use sluice_core::dto::datum::{ListDatumRequest, ListDatumResponse, ListDatumStreamResponse};

use crate::api::error::ApiResult;
use crate::api::ndjson;
use crate::service;
use crate::state::AppState;

/// POST /datum/list
pub async fn list_datum(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListDatumRequest>,
) -> ApiResult<Json<ListDatumResponse>> {
    Ok(Json(service::datum::list_datum(&state, &request).await?))
}

/// POST /datum/list/stream
/// Page metadata rides on the first record only
pub async fn list_datum_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListDatumRequest>,
) -> ApiResult<Response> {
    let response = service::datum::list_datum(&state, &request).await?;
    let page = response.page;
    let total_pages = response.total_pages;
    let records = response
        .datum_infos
        .into_iter()
        .enumerate()
        .map(move |(i, datum_info)| ListDatumStreamResponse {
            datum_info,
            page: (i == 0).then_some(page),
            total_pages: (i == 0).then_some(total_pages),
        });
    Ok(ndjson(records))
}

/// GET /datum/{job_id}/{datum_id}
pub async fn get_datum(
    State(state): State<Arc<AppState>>,
    Path((job_id, datum_id)): Path<(String, String)>,
) -> ApiResult<Json<DatumInfo>> {
    Ok(Json(
        service::datum::inspect_datum(&state, &job_id, &datum_id).await?,
    ))
}
