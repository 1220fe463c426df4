//! Auth mediator
//!
//! Maps pipeline operations onto repo-scope checks and manages the
//! capability tokens that delegate the operator's rights to a pipeline.
//! When the auth service reports NotActivated, every check passes.

use std::sync::Arc;

use sluice_core::domain::input::Input;

use crate::clients::auth::{AuthClient, Scope};
use crate::clients::cafs::CafsClient;
use crate::error::{Error, Result};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOperation {
    Create,
    ListDatum,
    GetLogs,
    Update,
    Delete,
}

/// Check that the caller may perform `operation` on a pipeline with the
/// given input tree and output repo.
pub async fn authorize_pipeline_op(
    state: &AppState,
    operation: PipelineOperation,
    input: &Input,
    output_repo: &str,
) -> Result<()> {
    match state.auth.who_am_i().await {
        Ok(_) => {}
        // Auth isn't activated, the caller may proceed
        Err(Error::AuthNotActivated) => return Ok(()),
        Err(e) => return Err(e),
    }

    // Reader access to every distinct atom repo, checked in parallel
    let mut checks = Vec::new();
    for repo in input.atom_repos() {
        let auth = state.auth.clone();
        checks.push(tokio::spawn(async move {
            match auth.authorize(&repo, Scope::Reader).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::NotAuthorized {
                    repo,
                    required: Scope::Reader,
                }),
                Err(e) => Err(e),
            }
        }));
    }
    for check in checks {
        check
            .await
            .map_err(|e| Error::Invariant(format!("authorization task panicked: {}", e)))??;
    }

    // The output repo: Create requires that it doesn't exist yet (the
    // control plane is about to create it); other operations map to a
    // scope.
    let required = match operation {
        PipelineOperation::Create => {
            return match state.cafs.inspect_repo(output_repo).await {
                Ok(()) => Err(Error::Validation(format!(
                    "cannot overwrite repo \"{}\" with new output repo",
                    output_repo
                ))),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e),
            };
        }
        PipelineOperation::ListDatum | PipelineOperation::GetLogs => Scope::Reader,
        PipelineOperation::Update => Scope::Writer,
        PipelineOperation::Delete => Scope::Owner,
    };
    if !state.auth.authorize(output_repo, required).await? {
        return Err(Error::NotAuthorized {
            repo: output_repo.to_string(),
            required,
        });
    }
    Ok(())
}

/// Mint a capability for the caller; None when auth is off
pub async fn capability(state: &AppState) -> Result<Option<String>> {
    match state.auth.get_capability().await {
        Ok(token) => Ok(Some(token)),
        Err(Error::AuthNotActivated) => Ok(None),
        Err(e) => Err(Error::TransientRpc(format!(
            "error getting capability for the user: {}",
            e
        ))),
    }
}

/// Revoke a capability inline, swallowing NotActivated
pub async fn revoke_capability(state: &AppState, token: &str) -> Result<()> {
    match state.auth.revoke_auth_token(token).await {
        Ok(()) | Err(Error::AuthNotActivated) => Ok(()),
        Err(e) => Err(Error::TransientRpc(format!(
            "error revoking old capability: {}",
            e
        ))),
    }
}

/// Revoke a superseded capability in the background (used after Update)
pub fn revoke_capability_async(auth: Arc<dyn AuthClient>, token: String) {
    tokio::spawn(async move {
        match auth.revoke_auth_token(&token).await {
            Ok(()) | Err(Error::AuthNotActivated) => {}
            Err(e) => tracing::error!("error revoking old capability: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::{MemoryAuth, MemoryCafs, MemoryKube, MemoryKv};
    use sluice_core::domain::input::AtomInput;

    fn state_with_auth(auth: MemoryAuth, cafs: MemoryCafs) -> AppState {
        AppState::new(
            Arc::new(cafs),
            Arc::new(MemoryKv::new()),
            Arc::new(auth),
            Arc::new(MemoryKube::new()),
            "sluice",
            "default",
        )
    }

    fn atom_input(repo: &str) -> Input {
        Input::Atom(AtomInput {
            name: repo.to_string(),
            repo: repo.to_string(),
            branch: "master".to_string(),
            glob: "/*".to_string(),
            commit: None,
        })
    }

    #[tokio::test]
    async fn test_inactive_auth_allows_everything() {
        let state = state_with_auth(MemoryAuth::deactivated(), MemoryCafs::new());
        authorize_pipeline_op(
            &state,
            PipelineOperation::Delete,
            &atom_input("images"),
            "edges",
        )
        .await
        .unwrap();
        assert_eq!(capability(&state).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_required_on_input_repos() {
        let auth = MemoryAuth::activated("alice");
        auth.grant("edges", "alice", Scope::Owner);
        let state = state_with_auth(auth, MemoryCafs::new());

        let err = authorize_pipeline_op(
            &state,
            PipelineOperation::Delete,
            &atom_input("images"),
            "edges",
        )
        .await
        .unwrap_err();
        match err {
            Error::NotAuthorized { repo, required } => {
                assert_eq!(repo, "images");
                assert_eq!(required, Scope::Reader);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scope_table_on_output_repo() {
        let auth = MemoryAuth::activated("alice");
        auth.grant("images", "alice", Scope::Reader);
        auth.grant("edges", "alice", Scope::Writer);
        let state = state_with_auth(auth, MemoryCafs::new());
        let input = atom_input("images");

        authorize_pipeline_op(&state, PipelineOperation::GetLogs, &input, "edges")
            .await
            .unwrap();
        authorize_pipeline_op(&state, PipelineOperation::Update, &input, "edges")
            .await
            .unwrap();
        let err = authorize_pipeline_op(&state, PipelineOperation::Delete, &input, "edges")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotAuthorized {
                required: Scope::Owner,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_requires_missing_output_repo() {
        let auth = MemoryAuth::activated("alice");
        auth.grant("images", "alice", Scope::Reader);
        let cafs = MemoryCafs::new();
        cafs.create_repo("edges").await.unwrap();
        let state = state_with_auth(auth, cafs);

        let err = authorize_pipeline_op(
            &state,
            PipelineOperation::Create,
            &atom_input("images"),
            "edges",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cannot overwrite repo"));
    }

    #[tokio::test]
    async fn test_capability_round_trip() {
        let auth = MemoryAuth::activated("alice");
        let state = state_with_auth(auth.clone(), MemoryCafs::new());

        let token = capability(&state).await.unwrap().unwrap();
        assert!(auth.is_token_live(&token));
        revoke_capability(&state, &token).await.unwrap();
        assert!(!auth.is_token_live(&token));
    }
}
