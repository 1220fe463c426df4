//! Log aggregator
//!
//! Multiplexes worker-pod logs (or stats-commit log files) into one
//! filtered stream. With `follow` the pods are tailed in parallel and
//! lines interleave as they arrive; without it the pods are walked
//! sequentially in name order so the merged stream is deterministic.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use sluice_core::domain::cafs::Commit;
use sluice_core::domain::log::LogMessage;
use sluice_core::domain::pipeline::rc_name;
use sluice_core::dto::log::GetLogsRequest;

use crate::clients::cafs::CafsClient;
use crate::clients::kube::{KubeClient, Pod};
use crate::error::{Error, Result};
use crate::repository::{jobs, pipelines};
use crate::service::auth::{self, PipelineOperation};
use crate::service::{kube, pipeline};
use crate::state::AppState;

/// Container name the control plane runs in
const CONTROL_PLANE_CONTAINER: &str = "sluiced";
/// Container running user transforms inside worker pods
const WORKER_USER_CONTAINER: &str = "user";

fn passes_filters(request: &GetLogsRequest, message: &LogMessage) -> bool {
    if let Some(pipeline) = &request.pipeline {
        if pipeline != &message.pipeline_name {
            return false;
        }
    }
    if let Some(job_id) = &request.job_id {
        if job_id != &message.job_id {
            return false;
        }
    }
    if let Some(datum_id) = &request.datum_id {
        if datum_id != &message.datum_id {
            return false;
        }
    }
    if request.master != message.master {
        return false;
    }
    message.matches_data_filters(&request.data_filters)
}

/// Stream logs matching `request` into `tx`. Closing the receiver
/// cancels the producers.
pub async fn get_logs(
    state: Arc<AppState>,
    request: GetLogsRequest,
    tx: mpsc::Sender<LogMessage>,
) -> Result<()> {
    let (rc, container) = if request.pipeline.is_none() && request.job_id.is_none() {
        // Scraping the control plane itself; no authorization
        (
            CONTROL_PLANE_CONTAINER.to_string(),
            CONTROL_PLANE_CONTAINER.to_string(),
        )
    } else {
        // Resolve the pipeline (directly, or through the job pointer)
        let (pipeline_name, stats_commit) = match (&request.pipeline, &request.job_id) {
            (Some(name), _) => (name.clone(), None),
            (None, Some(job_id)) => {
                let pointer = jobs::read(state.kv.as_ref(), &state.prefix, job_id)
                    .await
                    .map_err(|e| {
                        Error::TransientRpc(format!(
                            "could not get job information for \"{}\": {}",
                            job_id, e
                        ))
                    })?
                    .ok_or_else(|| Error::JobNotFound(job_id.clone()))?;
                (pointer.pipeline, pointer.stats_commit)
            }
            (None, None) => unreachable!("handled above"),
        };
        let pointer = pipelines::read(state.kv.as_ref(), &state.prefix, &pipeline_name)
            .await?
            .ok_or_else(|| Error::PipelineNotFound(pipeline_name.clone()))?;
        let spec = pipeline::resolve_spec(&state, &pipeline_name, &pointer)
            .await
            .map_err(|e| {
                Error::TransientRpc(format!(
                    "could not get pipeline information for {}: {}",
                    pipeline_name, e
                ))
            })?;
        auth::authorize_pipeline_op(&state, PipelineOperation::GetLogs, &spec.input, &spec.name)
            .await?;

        // A stats commit holds the job's logs verbatim and beats
        // scraping pods that may be gone
        if let Some(stats_commit) = stats_commit {
            return get_logs_from_stats(&state, &request, &tx, &stats_commit).await;
        }
        (
            rc_name(&spec.name, spec.version),
            WORKER_USER_CONTAINER.to_string(),
        )
    };

    let mut pods = kube::rc_pods(&state, &rc).await.map_err(|e| Error::Unavailable {
        subsystem: "worker pods",
        message: format!("could not get pods in rc \"{}\": {}", rc, e),
    })?;
    if pods.is_empty() {
        return Err(Error::Unavailable {
            subsystem: "worker pods",
            message: format!("no pods belonging to the rc \"{}\" were found", rc),
        });
    }
    // Stable order across calls
    pods.sort_by(|a, b| a.name.cmp(&b.name));

    if request.follow {
        let mut tasks = Vec::new();
        for pod in pods {
            let state = state.clone();
            let request = request.clone();
            let tx = tx.clone();
            let container = container.clone();
            tasks.push(tokio::spawn(async move {
                stream_pod(&state, &pod, &container, &request, &tx).await
            }));
        }
        for task in tasks {
            task.await
                .map_err(|e| Error::Invariant(format!("log task panicked: {}", e)))??;
        }
    } else {
        for pod in &pods {
            stream_pod(&state, pod, &container, &request, &tx).await?;
        }
    }
    Ok(())
}

async fn stream_pod(
    state: &AppState,
    pod: &Pod,
    container: &str,
    request: &GetLogsRequest,
    tx: &mpsc::Sender<LogMessage>,
) -> Result<()> {
    let tail = (request.tail > 0).then_some(request.tail);
    let opened = tokio::time::timeout(
        kube::COR_TIMEOUT,
        state
            .kube
            .pod_logs(&state.namespace, &pod.name, container, request.follow, tail),
    )
    .await
    .unwrap_or_else(|_| {
        Err(Error::TransientRpc(format!(
            "timed out opening log stream for pod {}",
            pod.name
        )))
    });
    let mut lines = match opened {
        // No logs to collect from this pod yet, just skip it
        Err(e) if e.to_string().contains("PodInitializing") => return Ok(()),
        other => other?,
    };

    while let Some(line) = lines.recv().await {
        let message = if container == CONTROL_PLANE_CONTAINER {
            // Control-plane lines are opaque text
            LogMessage::raw(&line)
        } else {
            // Worker lines are structured; parse failures are dropped
            let Ok(message) = serde_json::from_str::<LogMessage>(&line) else {
                continue;
            };
            if !passes_filters(request, &message) {
                continue;
            }
            message
        };
        if tx.send(message).await.is_err() {
            // Receiver cancelled; drop the message in flight
            return Ok(());
        }
    }
    Ok(())
}

async fn get_logs_from_stats(
    state: &Arc<AppState>,
    request: &GetLogsRequest,
    tx: &mpsc::Sender<LogMessage>,
    stats_commit: &Commit,
) -> Result<()> {
    // One log file per datum directory
    let files = state
        .cafs
        .glob_file(&stats_commit.repo, &stats_commit.id, "*/logs")
        .await?;

    let limiter = Arc::new(Semaphore::new(20));
    let mut tasks = Vec::new();
    for info in files {
        let state = state.clone();
        let request = request.clone();
        let tx = tx.clone();
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|_| Error::Invariant("semaphore closed".to_string()))?;
            let data = state
                .cafs
                .get_file(&info.file.commit.repo, &info.file.commit.id, &info.file.path)
                .await?;
            for line in String::from_utf8_lossy(&data).lines() {
                let Ok(message) = serde_json::from_str::<LogMessage>(line) else {
                    continue;
                };
                if !passes_filters(&request, &message) {
                    continue;
                }
                if tx.send(message).await.is_err() {
                    return Ok(());
                }
            }
            Ok::<(), Error>(())
        }));
    }
    for task in tasks {
        task.await
            .map_err(|e| Error::Invariant(format!("log task panicked: {}", e)))??;
    }
    Ok(())
}
