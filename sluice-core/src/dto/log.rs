//! Log DTOs

use serde::{Deserialize, Serialize};

/// Filters for the streaming log endpoint.
///
/// With neither `pipeline` nor `job_id` set, the control plane's own
/// logs are returned (no authorization, opaque text lines).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLogsRequest {
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub datum_id: Option<String>,
    #[serde(default)]
    pub data_filters: Vec<String>,
    /// Only lines from the worker master (exact match on the flag)
    #[serde(default)]
    pub master: bool,
    /// Tail the streams instead of reading to their current end
    #[serde(default)]
    pub follow: bool,
    /// Number of trailing lines per pod, 0 for all
    #[serde(default)]
    pub tail: i64,
}
