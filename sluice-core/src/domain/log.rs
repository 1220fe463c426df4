//! Log domain types

use serde::{Deserialize, Serialize};

/// One log line from a worker, or an opaque control-plane line.
///
/// Worker lines arrive as JSON in this shape; control-plane lines carry
/// only `message` with every other field at its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub pipeline_name: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub datum_id: String,
    /// Paths of the datum's input files, used by data filters
    #[serde(default)]
    pub data: Vec<String>,
    /// True for lines emitted by the worker master rather than user code
    #[serde(default)]
    pub master: bool,
    pub message: String,
    #[serde(default)]
    pub ts: Option<chrono::DateTime<chrono::Utc>>,
}

impl LogMessage {
    /// A control-plane line: raw text, no structure
    pub fn raw(text: &str) -> Self {
        Self {
            message: format!("{}\n", text),
            ..Default::default()
        }
    }

    /// True if every requested filter matches one of this line's data paths
    pub fn matches_data_filters(&self, filters: &[String]) -> bool {
        filters
            .iter()
            .all(|filter| self.data.iter().any(|d| d == filter))
    }
}
