//! Log streaming API handler

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use sluice_core::dto::log::GetLogsRequest;

use crate::service;
use crate::state::AppState;

/// POST /logs
/// Streams matching log messages as NDJSON until the producers run dry
/// (or forever, with `follow`). Producer failures terminate the stream
/// with a trailing error record.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GetLogsRequest>,
) -> Response {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if let Err(e) = service::log::get_logs(state, request, tx.clone()).await {
            tracing::error!("log stream failed: {}", e);
            let _ = tx
                .send(sluice_core::domain::log::LogMessage::raw(&format!(
                    "error: {}",
                    e
                )))
                .await;
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let message = rx.recv().await?;
        let mut line = serde_json::to_vec(&message).unwrap_or_default();
        line.push(b'\n');
        Some((Ok::<Bytes, Infallible>(Bytes::from(line)), rx))
    });
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response()
}
