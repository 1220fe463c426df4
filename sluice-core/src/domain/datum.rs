//! Datum domain types
//!
//! A datum is one unit of work within a job. Datums are never stored as
//! such; they are identified by a hash over the pipeline name, the salt
//! and the ordered file infos, and reconstructed from stats commits.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::cafs::{File, FileInfo};
use crate::domain::job::ProcessStats;

/// State of a single datum. The variant order is the display order:
/// failed datums sort first, then skipped, then successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatumState {
    Failed,
    Skipped,
    Success,
    Starting,
}

/// Identity of a datum within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum {
    pub id: String,
    pub job_id: String,
}

/// Everything known about one datum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatumInfo {
    pub datum: Datum,
    pub state: DatumState,
    #[serde(default)]
    pub data: Vec<FileInfo>,
    #[serde(default)]
    pub stats: Option<ProcessStats>,
    /// Location of the datum's preserved filesystem state in the stats commit
    #[serde(default)]
    pub pfs_state: Option<File>,
}

/// Hash identifying a datum: pipeline name, salt, and the ordered tuple
/// of input files.
pub fn hash_datum(pipeline: &str, salt: &str, inputs: &[FileInfo]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline.as_bytes());
    hasher.update(salt.as_bytes());
    for info in inputs {
        hasher.update(info.file.repo_path_key().as_bytes());
        if let Some(hash) = &info.hash {
            hasher.update(hash.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Prefix under which a pipeline's datum tags live, derived from its salt
pub fn datum_tag_prefix(salt: &str) -> String {
    let digest = Sha256::digest(salt.as_bytes());
    format!("{:x}", digest)[..8].to_string()
}

impl File {
    fn repo_path_key(&self) -> String {
        format!("{}@{}:{}", self.commit.repo, self.commit.id, self.path)
    }
}
