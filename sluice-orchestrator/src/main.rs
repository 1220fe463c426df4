use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod clients;
pub mod error;
pub mod repository;
pub mod service;
pub mod state;

#[cfg(test)]
mod testutil;

use clients::auth::AuthClient;
use clients::cafs::CafsClient;
use clients::http::{HttpAuth, HttpCafs};
use clients::kube::KubeClient;
use clients::kv::KvStore;
use clients::memory::{MemoryAuth, MemoryCafs, MemoryKube, MemoryKv};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting sluice orchestrator...");

    let prefix = std::env::var("SLUICE_ETCD_PREFIX").unwrap_or_else(|_| "sluice".to_string());
    let namespace = std::env::var("SLUICE_NAMESPACE").unwrap_or_else(|_| "default".to_string());

    let cafs: Arc<dyn CafsClient> = match std::env::var("SLUICE_CAFS_ADDR") {
        Ok(addr) => {
            tracing::info!("using CAFS at {}", addr);
            Arc::new(HttpCafs::new(addr))
        }
        Err(_) => {
            tracing::warn!("SLUICE_CAFS_ADDR not set, using the in-process CAFS");
            Arc::new(MemoryCafs::new())
        }
    };
    let auth: Arc<dyn AuthClient> = match std::env::var("SLUICE_AUTH_ADDR") {
        Ok(addr) => {
            tracing::info!("using auth service at {}", addr);
            Arc::new(HttpAuth::new(addr))
        }
        Err(_) => Arc::new(MemoryAuth::deactivated()),
    };
    // The etcd and kubernetes bindings are wired at deployment time;
    // standalone runs use the in-process implementations
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let kube: Arc<dyn KubeClient> = Arc::new(MemoryKube::new());

    // A fresh in-process store has no PPS token yet; mint one
    let token_key = format!("{}/pps-token", prefix);
    if kv.get(&token_key).await?.is_none() {
        let token = uuid::Uuid::new_v4().simple().to_string();
        kv.put(&token_key, token.into_bytes()).await?;
    }

    let state = Arc::new(AppState::new(cafs, kv, auth, kube, prefix, namespace));
    state.bootstrap().await?;
    service::kube::validate_cluster(&state).await;

    let app = api::create_router(state);

    let addr = std::env::var("SLUICE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
