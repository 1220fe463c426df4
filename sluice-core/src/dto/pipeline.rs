//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::input::Input;
use crate::domain::pipeline::{
    ChunkSpec, ParallelismSpec, ResourceSpec, ServiceSpec, Transform,
};

/// Request to create a pipeline, or to update one when `update` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipelineRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub transform: Transform,
    #[serde(default)]
    pub parallelism_spec: Option<ParallelismSpec>,
    pub input: Input,
    #[serde(default)]
    pub output_branch: String,
    #[serde(default)]
    pub resource_requests: Option<ResourceSpec>,
    #[serde(default)]
    pub resource_limits: Option<ResourceSpec>,
    #[serde(default)]
    pub cache_size: String,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub enable_stats: bool,
    #[serde(default)]
    pub max_queue_size: i64,
    #[serde(default)]
    pub service: Option<ServiceSpec>,
    #[serde(default)]
    pub chunk_spec: Option<ChunkSpec>,
    #[serde(default)]
    pub datum_timeout: Option<String>,
    #[serde(default)]
    pub job_timeout: Option<String>,
    /// Update the existing pipeline instead of creating a new one
    #[serde(default)]
    pub update: bool,
    /// On update, take a fresh salt so every datum reprocesses
    #[serde(default)]
    pub reprocess: bool,
}
