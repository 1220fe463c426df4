//! Job domain types
//!
//! A `JobPointer` is the durable TX-KV record; the full `JobInfo` is
//! reconstructed on read by joining the pointer with the output commit's
//! metadata and the pipeline spec found through its provenance.

use serde::{Deserialize, Serialize};

use crate::domain::cafs::Commit;
use crate::domain::input::Input;
use crate::domain::pipeline::{ChunkSpec, ParallelismSpec, ResourceSpec, ServiceSpec, Transform};

/// Job lifecycle states; the last three are absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobState {
    Starting,
    Running,
    Failure,
    Success,
    Killed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Failure | JobState::Success | JobState::Killed)
    }
}

/// Aggregate processing statistics, reported by workers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStats {
    #[serde(default)]
    pub download_time_secs: f64,
    #[serde(default)]
    pub process_time_secs: f64,
    #[serde(default)]
    pub upload_time_secs: f64,
    #[serde(default)]
    pub download_bytes: u64,
    #[serde(default)]
    pub upload_bytes: u64,
}

/// The TX-KV record for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPointer {
    pub job_id: String,
    pub pipeline: String,
    pub output_commit: Commit,
    #[serde(default)]
    pub stats_commit: Option<Commit>,
    pub state: JobState,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub restart: u64,
    #[serde(default)]
    pub data_processed: i64,
    #[serde(default)]
    pub data_skipped: i64,
    #[serde(default)]
    pub data_total: i64,
    #[serde(default)]
    pub data_failed: i64,
    #[serde(default)]
    pub stats: ProcessStats,
}

/// Live status of one worker, read from the worker pool's TX-KV keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub job_id: String,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub started: Option<chrono::DateTime<chrono::Utc>>,
}

/// The fully-joined view of a job returned by inspect/list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub pipeline: String,
    pub pipeline_version: u64,
    pub spec_commit: Commit,
    pub transform: Transform,
    #[serde(default)]
    pub parallelism_spec: Option<ParallelismSpec>,
    pub input: Input,
    pub output_repo: String,
    pub output_branch: String,
    pub output_commit: Commit,
    #[serde(default)]
    pub stats_commit: Option<Commit>,
    #[serde(default)]
    pub resource_requests: Option<ResourceSpec>,
    #[serde(default)]
    pub resource_limits: Option<ResourceSpec>,
    #[serde(default)]
    pub service: Option<ServiceSpec>,
    #[serde(default)]
    pub chunk_spec: Option<ChunkSpec>,
    #[serde(default)]
    pub datum_timeout: Option<String>,
    #[serde(default)]
    pub job_timeout: Option<String>,
    pub incremental: bool,
    pub enable_stats: bool,
    pub salt: String,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    pub state: JobState,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub restart: u64,
    #[serde(default)]
    pub data_processed: i64,
    #[serde(default)]
    pub data_skipped: i64,
    #[serde(default)]
    pub data_total: i64,
    #[serde(default)]
    pub data_failed: i64,
    #[serde(default)]
    pub stats: ProcessStats,
    #[serde(default)]
    pub worker_status: Vec<WorkerStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failure.is_terminal());
        assert!(JobState::Killed.is_terminal());
        assert!(!JobState::Starting.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_job_pointer_round_trip() {
        let ptr = JobPointer {
            job_id: "j1".to_string(),
            pipeline: "edges".to_string(),
            output_commit: Commit::new("edges", "c1"),
            stats_commit: None,
            state: JobState::Starting,
            reason: String::new(),
            restart: 0,
            data_processed: 0,
            data_skipped: 0,
            data_total: 0,
            data_failed: 0,
            stats: ProcessStats::default(),
        };
        let json = serde_json::to_string(&ptr).unwrap();
        let parsed: JobPointer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job_id, "j1");
        assert_eq!(parsed.state, JobState::Starting);
    }
}
