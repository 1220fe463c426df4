//! Pipeline domain types
//!
//! A pipeline is persisted in two places: the marshalled `PipelineSpec`
//! lives in a commit on the pipeline's branch of the spec repo, and the
//! TX-KV `PipelinePointer` names that commit. The pointer is the unit of
//! addressability; the spec commit is the unit of lineage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::cafs::Commit;
use crate::domain::input::Input;
use crate::domain::job::JobState;

/// Well-known repo holding one branch per pipeline with marshalled specs
pub const SPEC_REPO: &str = "__spec__";
/// The single file inside each spec commit
pub const SPEC_FILE: &str = "/spec";
/// Image used for transforms when the user does not specify one
pub const DEFAULT_USER_IMAGE: &str = "ubuntu:16.04";
/// Default worker cache size, also the default memory request
pub const DEFAULT_CACHE_SIZE: &str = "64M";

/// Name of the replication controller backing a pipeline's worker pool
pub fn rc_name(pipeline: &str, version: u64) -> String {
    format!("pipeline-{}-v{}", pipeline, version)
}

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Starting,
    Running,
    Restarting,
    Paused,
    Failure,
}

impl PipelineState {
    /// Stopped pipelines are not reconciled by the PPS master
    pub fn is_stopped(self) -> bool {
        matches!(self, PipelineState::Paused | PipelineState::Failure)
    }
}

/// The user's transform: a command run in a container over each datum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub cmd: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub stdin: Vec<String>,
}

/// How many workers to run: a fixed count or a per-node coefficient.
/// At most one of the two may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelismSpec {
    #[serde(default)]
    pub constant: u64,
    #[serde(default)]
    pub coefficient: f64,
}

/// Resource requests or limits for worker containers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub gpu: Option<i64>,
}

/// Exposes a pipeline as a long-running service instead of a batch job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub internal_port: u16,
    pub external_port: u16,
}

/// Bounds on how datums are grouped into chunks for distribution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpec {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub size_bytes: u64,
}

/// The canonical, versioned definition of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    /// Strictly monotone across updates, starting at 1
    pub version: u64,
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
    /// Stable across versions unless a reprocess is requested
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub max_queue_size: i64,
    #[serde(default)]
    pub service: Option<ServiceSpec>,
    #[serde(default)]
    pub chunk_spec: Option<ChunkSpec>,
    /// Humantime duration, e.g. "30m"; published to workers, not enforced here
    #[serde(default)]
    pub datum_timeout: Option<String>,
    #[serde(default)]
    pub job_timeout: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Resolved on read when the input tree has a git input; "pending"
    /// until the webhook ingress has an address
    #[serde(default)]
    pub githook_url: Option<String>,
}

/// The TX-KV record addressing a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePointer {
    pub spec_commit: Commit,
    pub state: PipelineState,
    #[serde(default)]
    pub capability: Option<String>,
    /// Per-state job counts; sums to the number of this pipeline's jobs
    #[serde(default)]
    pub job_counts: BTreeMap<JobState, i64>,
}
