//! Error taxonomy for the control plane
//!
//! Validation and authorization errors go back to the caller verbatim.
//! CAFS errors are classified by message substring ("not found" /
//! "already exists") so recovery paths stay idempotent.

use thiserror::Error;

use crate::clients::auth::Scope;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("pipeline {0} not found")]
    PipelineNotFound(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {0} was deleted")]
    JobDeleted(String),

    #[error("pipeline {0} already exists")]
    PipelineExists(String),

    #[error("not authorized: {required:?} access to repo {repo} is required")]
    NotAuthorized { repo: String, required: Scope },

    #[error("not authorized to delete all cluster data, must be a cluster admin")]
    NotClusterAdmin,

    #[error("the auth service is not activated")]
    AuthNotActivated,

    #[error("{0}")]
    Validation(String),

    #[error("job was not started due to empty input at commit {0}")]
    EmptyInput(String),

    #[error("job does not have the same set of inputs as its parent {0}")]
    ParentInputsMismatch(String),

    /// An error surfaced by the CAFS collaborator, classified by message
    #[error("{0}")]
    Cafs(String),

    #[error("transient RPC failure: {0}")]
    TransientRpc(String),

    #[error("{subsystem} is unavailable: {message}")]
    Unavailable {
        subsystem: &'static str,
        message: String,
    },

    /// A broken internal invariant; reaching this is a bug
    #[error("internal error: {0}")]
    Invariant(String),

    #[error("unimplemented")]
    Unimplemented,
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::PipelineNotFound(_) | Error::JobNotFound(_) | Error::JobDeleted(_) => true,
            other => other.to_string().contains("not found"),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::PipelineExists(_) => true,
            other => other.to_string().contains("already exists"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Invariant(format!("marshalling failed: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransientRpc(err.to_string())
    }
}
