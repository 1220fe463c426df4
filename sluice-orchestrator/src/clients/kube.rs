//! Container-orchestrator client trait
//!
//! Primitive operations only; the label conventions and degraded-mode
//! policies live in `service::kube`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// External address of a load-balanced service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceIngress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[async_trait]
pub trait KubeClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<String>>;

    /// Pods in `namespace` matching every label in `selector`, unordered
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<Pod>>;

    /// Open (and immediately close) a pod watch, as an access probe
    async fn watch_pods(&self, namespace: &str) -> Result<()>;

    /// Stream log lines from one container. Streams carry a 10s open
    /// timeout on the orchestrator side; a pod that is still
    /// initializing fails with a message containing "PodInitializing".
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
        tail: Option<i64>,
    ) -> Result<mpsc::UnboundedReceiver<String>>;

    async fn create_rc(
        &self,
        namespace: &str,
        name: &str,
        labels: &HashMap<String, String>,
        image: &str,
        command: &[String],
    ) -> Result<()>;

    async fn delete_rc(&self, namespace: &str, name: &str) -> Result<()>;

    /// External ingress of a named service, None if the service exists
    /// without an external address
    async fn get_service_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceIngress>>;
}
