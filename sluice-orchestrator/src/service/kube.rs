//! COR adapter
//!
//! Label conventions, bootstrap smoke tests and worker-deployment
//! cleanup. None of this is essential to the core's correctness: every
//! failure here is logged and the service continues with reduced
//! functionality.

use std::collections::HashMap;

use sluice_core::domain::pipeline::{rc_name, PipelineSpec, DEFAULT_USER_IMAGE};

use crate::clients::kube::{KubeClient, Pod};
use crate::error::Result;
use crate::state::AppState;

const SUITE: &str = "sluice";

/// Hard timeout on COR operations that open streams
pub(crate) const COR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub fn worker_labels(app: &str) -> HashMap<String, String> {
    HashMap::from([
        ("app".to_string(), app.to_string()),
        ("suite".to_string(), SUITE.to_string()),
        ("component".to_string(), "worker".to_string()),
    ])
}

/// Pods backing a replication controller
pub async fn rc_pods(state: &AppState, rc_name: &str) -> Result<Vec<Pod>> {
    state
        .kube
        .list_pods(&state.namespace, &worker_labels(rc_name))
        .await
}

/// External URL of the git-webhook ingress, if it has an address yet
pub async fn githook_url(state: &AppState) -> Option<String> {
    let ingress = match state
        .kube
        .get_service_ingress(&state.namespace, "githook")
        .await
    {
        Ok(ingress) => ingress?,
        Err(e) => {
            tracing::error!("could not resolve githook service: {}", e);
            return None;
        }
    };
    let domain = ingress.ip.or(ingress.hostname)?;
    Some(format!("http://{}/v1/handle/push", domain))
}

/// Delete a pipeline's worker deployment. Failure is logged and
/// swallowed; the deployment may already be gone.
pub async fn delete_workers_for_pipeline(state: &AppState, spec: &PipelineSpec) {
    let rc = rc_name(&spec.name, spec.version);
    if let Err(e) = state.kube.delete_rc(&state.namespace, &rc).await {
        tracing::error!(
            "could not delete workers for pipeline {}: {}",
            spec.name,
            e
        );
    }
}

/// Read-only smoke tests plus a create-and-delete round-trip of a
/// trivial replication controller, run once at bootstrap.
pub async fn validate_cluster(state: &AppState) {
    let mut errors = false;

    if let Err(e) = state.kube.list_nodes().await {
        errors = true;
        tracing::error!(
            "unable to access cluster nodes, the service will keep working but \
             coefficient parallelism will not be available: {}",
            e
        );
    }
    if let Err(e) = state.kube.watch_pods(&state.namespace).await {
        errors = true;
        tracing::error!(
            "unable to watch pods, the service will keep working but certain pipeline \
             failures will leave pipelines stuck in the starting state: {}",
            e
        );
    }
    match rc_pods(state, "sluiced").await {
        Err(e) => {
            errors = true;
            tracing::error!(
                "unable to list control-plane pods, the service will keep working but \
                 get-logs will not: {}",
                e
            );
        }
        Ok(pods) => {
            if let Some(pod) = pods.first() {
                let probe = tokio::time::timeout(
                    COR_TIMEOUT,
                    state
                        .kube
                        .pod_logs(&state.namespace, &pod.name, "sluiced", false, None),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(crate::error::Error::TransientRpc(
                        "timed out reading control-plane logs".to_string(),
                    ))
                });
                if let Err(e) = probe {
                    errors = true;
                    tracing::error!(
                        "unable to read control-plane logs, the service will keep working \
                         but get-logs will not: {}",
                        e
                    );
                }
            }
        }
    }

    let probe = format!("probe-{}", uuid::Uuid::new_v4().simple());
    let labels = HashMap::from([("app".to_string(), probe.clone())]);
    if let Err(e) = state
        .kube
        .create_rc(
            &state.namespace,
            &probe,
            &labels,
            DEFAULT_USER_IMAGE,
            &["true".to_string()],
        )
        .await
    {
        errors = true;
        tracing::error!(
            "unable to create replication controllers, pipelines will not run until \
             this is fixed: {}",
            e
        );
    }
    if let Err(e) = state.kube.delete_rc(&state.namespace, &probe).await {
        errors = true;
        tracing::error!(
            "unable to delete replication controllers, pipeline cleanup will not \
             work: {}",
            e
        );
    }

    if !errors {
        tracing::info!("validating cluster access returned no errors");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::kube::ServiceIngress;
    use crate::testutil::TestCluster;

    #[tokio::test]
    async fn test_rc_pods_filters_on_worker_labels() {
        let cluster = TestCluster::new().await;
        cluster
            .kube
            .add_pod("worker-0", worker_labels("pipeline-edges-v1"), vec![]);
        cluster
            .kube
            .add_pod("stranger", HashMap::new(), vec![]);

        let pods = rc_pods(&cluster.state, "pipeline-edges-v1").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "worker-0");
    }

    #[tokio::test]
    async fn test_githook_url_prefers_ip() {
        let cluster = TestCluster::new().await;
        assert_eq!(githook_url(&cluster.state).await, None);

        cluster.kube.set_service(
            "githook",
            ServiceIngress {
                ip: Some("10.0.0.9".to_string()),
                hostname: Some("lb.example.com".to_string()),
            },
        );
        assert_eq!(
            githook_url(&cluster.state).await.as_deref(),
            Some("http://10.0.0.9/v1/handle/push")
        );
    }

    #[tokio::test]
    async fn test_validate_cluster_probe_cleans_up() {
        let cluster = TestCluster::new().await;
        cluster.kube.add_node("node-0");
        validate_cluster(&cluster.state).await;
        // The probe RC was created and deleted again
        assert!(!cluster.kube.has_rc("sluiced"));
    }
}
