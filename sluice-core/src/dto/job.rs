//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::cafs::Commit;

/// Request to create a job for an output commit. Normally issued by the
/// PPS master; exposed for explicit job creation too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub pipeline: String,
    pub output_commit: Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// Filters for listing jobs. At most one index (pipeline or output
/// commit) is used; input commits filter after the fact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobRequest {
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub output_commit: Option<Commit>,
    #[serde(default)]
    pub input_commits: Vec<Commit>,
}

/// Request to cancel specific datums of a running job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartDatumRequest {
    #[serde(default)]
    pub data_filters: Vec<String>,
}
