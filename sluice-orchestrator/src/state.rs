//! Shared application state
//!
//! Handles to the external collaborators plus the TX-KV key prefix and
//! COR namespace. Cheap to clone behind an `Arc`; every request handler
//! and service function works against this.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::clients::auth::AuthClient;
use crate::clients::cafs::CafsClient;
use crate::clients::kube::KubeClient;
use crate::clients::kv::KvStore;
use crate::error::Result;

pub struct AppState {
    pub cafs: Arc<dyn CafsClient>,
    pub kv: Arc<dyn KvStore>,
    pub auth: Arc<dyn AuthClient>,
    pub kube: Arc<dyn KubeClient>,
    /// TX-KV key prefix for every collection and scalar key
    pub prefix: String,
    /// COR namespace the worker pools live in
    pub namespace: String,
    pps_token: OnceCell<String>,
}

impl AppState {
    pub fn new(
        cafs: Arc<dyn CafsClient>,
        kv: Arc<dyn KvStore>,
        auth: Arc<dyn AuthClient>,
        kube: Arc<dyn KubeClient>,
        prefix: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cafs,
            kv,
            auth,
            kube,
            prefix: prefix.into(),
            namespace: namespace.into(),
            pps_token: OnceCell::new(),
        }
    }

    /// Ensure the spec repo exists. Called once at startup.
    pub async fn bootstrap(&self) -> Result<()> {
        match self
            .cafs
            .create_repo(sluice_core::domain::pipeline::SPEC_REPO)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn pps_token_key(&self) -> String {
        format!("{}/pps-token", self.prefix)
    }

    pub fn gc_generation_key(&self) -> String {
        format!("{}/gc-generation", self.prefix)
    }

    /// Prefix under which a worker pool publishes per-worker status
    pub fn worker_status_prefix(&self, rc_name: &str) -> String {
        format!("{}/workers/{}/status/", self.prefix, rc_name)
    }

    /// Key for one datum-cancellation record posted to a worker pool
    pub fn worker_cancel_key(&self, rc_name: &str, id: &str) -> String {
        format!("{}/workers/{}/cancel/{}", self.prefix, rc_name, id)
    }

    /// The admin token the control plane uses for its own writes to the
    /// spec repo. Read from TX-KV exactly once per process; the control
    /// plane cannot function without it.
    pub async fn pps_token(&self) -> &str {
        self.pps_token
            .get_or_init(|| async {
                let entry = self
                    .kv
                    .get(&self.pps_token_key())
                    .await
                    .unwrap_or_else(|e| panic!("could not read PPS token: {}", e));
                match entry {
                    Some(entry) => String::from_utf8(entry.value)
                        .unwrap_or_else(|_| panic!("PPS token is not valid UTF-8")),
                    None => panic!("got an unexpected number of PPS tokens: 0"),
                }
            })
            .await
    }
}
