//! Pipeline store
//!
//! A pipeline lives in two places: its marshalled spec is a commit on
//! the pipeline's branch of the spec repo, and the TX-KV pointer names
//! that commit. Spec commits are written before pointer transactions so
//! that a pointer, once visible, always resolves; a crashed write leaves
//! an open spec-branch HEAD which Update's preflight refuses.

use std::collections::BTreeMap;
use std::sync::Arc;

use sluice_core::domain::cafs::{Branch, Commit};
use sluice_core::domain::input::Input;
use sluice_core::domain::pipeline::{
    PipelinePointer, PipelineSpec, PipelineState, SPEC_FILE, SPEC_REPO,
};
use sluice_core::dto::pipeline::CreatePipelineRequest;

use crate::clients::cafs::CafsClient;
use crate::error::{Error, Result};
use crate::repository::stm::Stm;
use crate::repository::{jobs, pipelines};
use crate::service::auth::{self, PipelineOperation};
use crate::service::{job, kube, validate};
use crate::state::AppState;

/// Create a pipeline, or update one when the request says so
pub async fn create_pipeline(state: &Arc<AppState>, request: CreatePipelineRequest) -> Result<()> {
    let update = request.update;
    let reprocess = request.reprocess;
    let mut spec = PipelineSpec {
        name: request.name,
        version: 1,
        description: request.description,
        transform: request.transform,
        parallelism_spec: request.parallelism_spec,
        input: request.input,
        output_branch: request.output_branch,
        resource_requests: request.resource_requests,
        resource_limits: request.resource_limits,
        cache_size: request.cache_size,
        incremental: request.incremental,
        enable_stats: request.enable_stats,
        salt: uuid::Uuid::new_v4().simple().to_string(),
        max_queue_size: request.max_queue_size,
        service: request.service,
        chunk_spec: request.chunk_spec,
        datum_timeout: request.datum_timeout,
        job_timeout: request.job_timeout,
        created_at: chrono::Utc::now(),
        githook_url: None,
    };
    validate::set_pipeline_defaults(&mut spec);
    validate::validate_pipeline(state.cafs.as_ref(), &spec).await?;

    // Cron and git inputs read from repos the control plane owns
    let mut input_repos = Vec::new();
    spec.input.visit(&mut |input| match input {
        Input::Cron(cron) => input_repos.push(cron.repo.clone()),
        Input::Git(git) => input_repos.push(git.name.clone()),
        _ => {}
    });
    for repo in input_repos {
        match state.cafs.create_repo(&repo).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }
    }

    let operation = if update {
        PipelineOperation::Update
    } else {
        PipelineOperation::Create
    };
    auth::authorize_pipeline_op(state, operation, &spec.input, &spec.name).await?;
    let capability = auth::capability(state).await?;

    if update {
        update_pipeline(state, &mut spec, capability, reprocess).await?;
    } else {
        // Output repo holds future pipeline output and stats
        match state.cafs.create_repo(&spec.name).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }
        let commit = write_spec_commit(state, &spec, false).await?;

        let created = loop {
            let mut stm = Stm::new(state.kv.as_ref());
            if pipelines::get(&mut stm, &state.prefix, &spec.name).await?.is_some() {
                break false;
            }
            pipelines::put(
                &mut stm,
                &state.prefix,
                &spec.name,
                &PipelinePointer {
                    spec_commit: commit.clone(),
                    state: PipelineState::Starting,
                    capability: capability.clone(),
                    job_counts: BTreeMap::new(),
                },
            )?;
            if stm.commit().await? {
                break true;
            }
        };
        if !created {
            // Roll back the spec commit written above
            if let Err(e) = state.cafs.delete_commit(SPEC_REPO, &commit.id).await {
                tracing::error!("failed to clean up spec commit for {}: {}", spec.name, e);
            }
            return Err(Error::PipelineExists(spec.name));
        }
        tracing::info!("pipeline created: {}", spec.name);
    }

    set_output_provenance(state, &spec).await?;
    Ok(())
}

async fn update_pipeline(
    state: &Arc<AppState>,
    spec: &mut PipelineSpec,
    capability: Option<String>,
    reprocess: bool,
) -> Result<()> {
    let name = spec.name.clone();

    // An open HEAD means a prior update crashed between starting and
    // finishing its spec commit
    let head = state.cafs.inspect_commit(SPEC_REPO, &name).await?;
    if head.finished.is_none() {
        return Err(Error::Validation(
            "the HEAD commit of this pipeline's spec branch is open. Either another \
             update is running or a previous update crashed. If you're sure no other \
             update is running, you can run 'update-pipeline --clean' to delete the \
             open commit"
                .to_string(),
        ));
    }

    let old_pointer = pipelines::read(state.kv.as_ref(), &state.prefix, &name)
        .await?
        .ok_or_else(|| Error::PipelineNotFound(name.clone()))?;
    let old_spec = resolve_spec(state, &name, &old_pointer).await?;

    if let Err(e) = hard_stop_pipeline(state, &old_spec).await {
        tracing::error!("hard-stopping {} failed: {}", name, e);
    }

    spec.version = old_spec.version + 1;
    if !reprocess {
        spec.salt = old_spec.salt.clone();
    }

    // The spec commit goes to CAFS first; the pointer transaction stays
    // free of CAFS I/O and aborts if another update moved the pointer in
    // the meantime
    let commit = write_spec_commit(state, spec, true).await?;
    let observed = old_pointer.spec_commit.clone();
    let old_capability = loop {
        let mut stm = Stm::new(state.kv.as_ref());
        let mut pointer = pipelines::get_or_not_found(&mut stm, &state.prefix, &name).await?;
        if pointer.spec_commit != observed {
            return Err(Error::TransientRpc(format!(
                "pipeline {} was updated concurrently",
                name
            )));
        }
        let old_capability = pointer.capability.take();
        pointer.spec_commit = commit.clone();
        pointer.capability = capability.clone();
        pipelines::put(&mut stm, &state.prefix, &name, &pointer)?;
        if stm.commit().await? {
            break old_capability;
        }
    };

    if let Some(token) = old_capability {
        auth::revoke_capability_async(state.auth.clone(), token);
    }
    tracing::info!("pipeline updated: {} (version {})", name, spec.version);
    Ok(())
}

/// Write the marshalled spec as a new commit on the pipeline's spec
/// branch, using the control plane's admin token.
async fn write_spec_commit(
    state: &AppState,
    spec: &PipelineSpec,
    update: bool,
) -> Result<Commit> {
    let cafs = state.cafs.with_token(state.pps_token().await);
    let name = &spec.name;

    if !update {
        if cafs.inspect_branch(SPEC_REPO, name).await.is_ok() {
            return Err(Error::Validation(format!(
                "pipeline spec branch for \"{}\" already exists: delete it with DeletePipeline",
                name
            )));
        }
        cafs.create_branch(SPEC_REPO, name, None, &[])
            .await
            .map_err(|e| {
                Error::Cafs(format!(
                    "could not create pipeline spec branch for \"{}\": {}",
                    name, e
                ))
            })?;
    }

    let commit = cafs.start_commit(SPEC_REPO, name).await?;
    // Puts append in CAFS; drop the previous spec so the new one
    // replaces it
    match cafs.delete_file(SPEC_REPO, &commit.id, SPEC_FILE).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    cafs.put_file(SPEC_REPO, &commit.id, SPEC_FILE, serde_json::to_vec(spec)?)
        .await?;
    cafs.finish_commit(SPEC_REPO, &commit.id, false).await?;
    Ok(commit)
}

/// The output branch is provenant on every input branch plus the
/// pipeline's spec branch.
async fn set_output_provenance(state: &AppState, spec: &PipelineSpec) -> Result<()> {
    let mut provenance = spec.input.branches();
    provenance.push(Branch::new(SPEC_REPO, &spec.name));
    state
        .cafs
        .create_branch(&spec.name, &spec.output_branch, None, &provenance)
        .await
        .map_err(|e| Error::Cafs(format!("could not update output branch provenance: {}", e)))
}

/// Read the spec the pointer refers to (which may lag the branch HEAD)
pub(crate) async fn resolve_spec(
    state: &AppState,
    name: &str,
    pointer: &PipelinePointer,
) -> Result<PipelineSpec> {
    spec_at_commit(state, &pointer.spec_commit)
        .await
        .map_err(|e| Error::Invariant(format!("could not read spec for pipeline {}: {}", name, e)))
}

/// Read the spec stored at an arbitrary spec commit
pub(crate) async fn spec_at_commit(state: &AppState, commit: &Commit) -> Result<PipelineSpec> {
    let bytes = state
        .cafs
        .get_file(SPEC_REPO, &commit.id, SPEC_FILE)
        .await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn inspect_pipeline(state: &Arc<AppState>, name: &str) -> Result<PipelineSpec> {
    let pointer = pipelines::read(state.kv.as_ref(), &state.prefix, name)
        .await?
        .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
    let mut spec = resolve_spec(state, name, &pointer).await?;
    if spec.input.has_git() {
        // Resolved lazily; the ingress may not have an address yet
        spec.githook_url = Some(
            kube::githook_url(state)
                .await
                .unwrap_or_else(|| "pending".to_string()),
        );
    }
    Ok(spec)
}

pub async fn list_pipelines(state: &Arc<AppState>) -> Result<Vec<PipelineSpec>> {
    let mut specs = Vec::new();
    for (name, pointer) in pipelines::list(state.kv.as_ref(), &state.prefix).await? {
        specs.push(resolve_spec(state, &name, &pointer).await?);
    }
    Ok(specs)
}

/// Compare-and-set the pointer's state
pub async fn set_pipeline_state(
    state: &Arc<AppState>,
    name: &str,
    new_state: PipelineState,
) -> Result<()> {
    loop {
        let mut stm = Stm::new(state.kv.as_ref());
        let mut pointer = pipelines::get_or_not_found(&mut stm, &state.prefix, name).await?;
        pointer.state = new_state;
        pipelines::put(&mut stm, &state.prefix, name, &pointer)?;
        if stm.commit().await? {
            return Ok(());
        }
    }
}

pub async fn start_pipeline(state: &Arc<AppState>, name: &str) -> Result<()> {
    let pointer = pipelines::read(state.kv.as_ref(), &state.prefix, name)
        .await?
        .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
    let spec = resolve_spec(state, name, &pointer).await?;
    auth::authorize_pipeline_op(state, PipelineOperation::Update, &spec.input, &spec.name).await?;

    // Restore the input-side provenance removed by StopPipeline
    set_output_provenance(state, &spec).await?;
    set_pipeline_state(state, name, PipelineState::Running).await
}

pub async fn stop_pipeline(state: &Arc<AppState>, name: &str) -> Result<()> {
    let pointer = pipelines::read(state.kv.as_ref(), &state.prefix, name)
        .await?
        .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
    let spec = resolve_spec(state, name, &pointer).await?;
    auth::authorize_pipeline_op(state, PipelineOperation::Update, &spec.input, &spec.name).await?;

    // Drop the input-side provenance so no new output commits are
    // admitted; the spec branch stays
    state
        .cafs
        .create_branch(
            &spec.name,
            &spec.output_branch,
            None,
            &[Branch::new(SPEC_REPO, &spec.name)],
        )
        .await?;
    set_pipeline_state(state, name, PipelineState::Paused).await
}

/// Force a pipeline quiescent right now, without waiting for the PPS
/// master: clear the output branch's provenance, then finish any open
/// output commits newest first so the oldest (in-flight) commit unblocks
/// downstream readers last.
pub(crate) async fn hard_stop_pipeline(state: &AppState, spec: &PipelineSpec) -> Result<()> {
    match state
        .cafs
        .create_branch(&spec.name, &spec.output_branch, None, &[])
        .await
    {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(Error::Cafs(format!(
                "could not clear output branch provenance: {}",
                e
            )))
        }
    }

    let commits = match state
        .cafs
        .list_commits(&spec.name, Some(&spec.output_branch))
        .await
    {
        Ok(commits) => commits,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => {
            return Err(Error::Cafs(format!(
                "couldn't get open commits on '{}': {}",
                spec.output_branch, e
            )))
        }
    };
    for info in commits {
        if info.finished.is_none() {
            if let Err(e) = state
                .cafs
                .finish_commit(&spec.name, &info.commit.id, true)
                .await
            {
                tracing::warn!("could not finish open commit {}: {}", info.commit.id, e);
            }
        }
    }
    Ok(())
}

async fn delete_spec_branch(state: &AppState, name: &str) -> Result<()> {
    // Branch only; the commits stay to preserve downstream provenance
    state
        .cafs
        .with_token(state.pps_token().await)
        .delete_branch(SPEC_REPO, name)
        .await
}

pub async fn delete_pipeline(state: &Arc<AppState>, name: &str) -> Result<()> {
    let pointer = match pipelines::read(state.kv.as_ref(), &state.prefix, name).await? {
        Some(pointer) => pointer,
        None => {
            // A spec branch with no commits and no pointer is the
            // recoverable half of a crashed create; clean it up without
            // authorization
            if let Ok(info) = state.cafs.inspect_branch(SPEC_REPO, name).await {
                if info.head.is_none() {
                    delete_spec_branch(state, name).await?;
                    return Ok(());
                }
            }
            return Err(Error::PipelineNotFound(name.to_string()));
        }
    };

    let spec = resolve_spec(state, name, &pointer).await?;
    auth::authorize_pipeline_op(state, PipelineOperation::Delete, &spec.input, name).await?;

    if let Err(e) = hard_stop_pipeline(state, &spec).await {
        tracing::error!("hard-stopping {} failed: {}", name, e);
    }
    kube::delete_workers_for_pipeline(state, &spec).await;

    if let Some(token) = &pointer.capability {
        auth::revoke_capability(state, token).await?;
    }

    for job_id in jobs::ids_by_pipeline(state.kv.as_ref(), &state.prefix, name).await? {
        job::delete_job(state, &job_id).await?;
    }

    let mut cron_repos = Vec::new();
    spec.input.visit(&mut |input| {
        if let Input::Cron(cron) = input {
            cron_repos.push(cron.repo.clone());
        }
    });

    let delete_pointer = async {
        let mut stm = Stm::new(state.kv.as_ref());
        pipelines::delete(&mut stm, &state.prefix, name);
        stm.commit().await.map(|_| ())
    };
    let delete_crons = async {
        for repo in &cron_repos {
            state.cafs.delete_repo(repo, true).await?;
        }
        Ok::<(), Error>(())
    };
    tokio::try_join!(
        delete_spec_branch(state, name),
        delete_pointer,
        state.cafs.delete_repo(name, true),
        delete_crons,
    )?;
    tracing::info!("pipeline deleted: {}", name);
    Ok(())
}

/// Delete every pipeline
pub async fn delete_all_pipelines(state: &Arc<AppState>) -> Result<()> {
    for (name, _) in pipelines::list(state.kv.as_ref(), &state.prefix).await? {
        delete_pipeline(state, &name).await?;
    }
    Ok(())
}

/// Admin-only: delete every pipeline, then every remaining job
pub async fn delete_all(state: &Arc<AppState>) -> Result<()> {
    match state.auth.who_am_i().await {
        Ok(me) if !me.is_admin => return Err(Error::NotClusterAdmin),
        Ok(_) | Err(Error::AuthNotActivated) => {}
        Err(e) => {
            return Err(Error::TransientRpc(format!(
                "could not verify that caller is admin: {}",
                e
            )))
        }
    }
    delete_all_pipelines(state).await?;
    for pointer in jobs::list(state.kv.as_ref(), &state.prefix).await? {
        job::delete_job(state, &pointer.job_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestCluster;
    use sluice_core::domain::input::AtomInput;

    fn request(name: &str, repo: &str) -> CreatePipelineRequest {
        CreatePipelineRequest {
            name: name.to_string(),
            description: None,
            transform: sluice_core::domain::pipeline::Transform {
                cmd: vec!["sh".to_string()],
                ..Default::default()
            },
            parallelism_spec: None,
            input: Input::Atom(AtomInput {
                name: String::new(),
                repo: repo.to_string(),
                branch: String::new(),
                glob: "/*".to_string(),
                commit: None,
            }),
            output_branch: String::new(),
            resource_requests: None,
            resource_limits: None,
            cache_size: String::new(),
            incremental: false,
            enable_stats: false,
            max_queue_size: 0,
            service: None,
            chunk_spec: None,
            datum_timeout: None,
            job_timeout: None,
            update: false,
            reprocess: false,
        }
    }

    #[tokio::test]
    async fn test_create_then_update_then_inspect() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();

        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();
        let v1 = inspect_pipeline(&cluster.state, "edges").await.unwrap();
        assert_eq!(v1.version, 1);
        let salt = v1.salt.clone();
        assert!(!salt.is_empty());

        // Same salt without reprocess
        let mut update = request("edges", "images");
        update.update = true;
        create_pipeline(&cluster.state, update).await.unwrap();
        let v2 = inspect_pipeline(&cluster.state, "edges").await.unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.salt, salt);

        // Fresh salt with reprocess
        let mut reprocess = request("edges", "images");
        reprocess.update = true;
        reprocess.reprocess = true;
        create_pipeline(&cluster.state, reprocess).await.unwrap();
        let v3 = inspect_pipeline(&cluster.state, "edges").await.unwrap();
        assert_eq!(v3.version, 3);
        assert_ne!(v3.salt, salt);
    }

    #[tokio::test]
    async fn test_pointer_resolves_to_finished_commit() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        let pointer = pipelines::read(cluster.state.kv.as_ref(), &cluster.state.prefix, "edges")
            .await
            .unwrap()
            .unwrap();
        let info = cluster
            .cafs
            .inspect_commit(SPEC_REPO, &pointer.spec_commit.id)
            .await
            .unwrap();
        assert!(info.finished.is_some());
        assert_eq!(pointer.state, PipelineState::Starting);
    }

    #[tokio::test]
    async fn test_create_duplicate_cleans_up_spec_commit() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        let err = create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_) | Error::PipelineExists(_)));

        // Still exactly one (finished) commit on the spec branch
        let commits = cluster.cafs.list_commits(SPEC_REPO, None).await.unwrap();
        assert_eq!(commits.len(), 1);
    }

    #[tokio::test]
    async fn test_update_refuses_open_spec_head() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        // Simulate a crashed update: open commit left on the spec branch
        cluster.cafs.start_commit(SPEC_REPO, "edges").await.unwrap();

        let mut update = request("edges", "images");
        update.update = true;
        let err = create_pipeline(&cluster.state, update).await.unwrap_err();
        assert!(err.to_string().contains("--clean"));
    }

    #[tokio::test]
    async fn test_half_state_delete_needs_no_auth() {
        let cluster = TestCluster::new().await;
        // A spec branch with no commits and no pointer
        cluster
            .cafs
            .create_branch(SPEC_REPO, "p2", None, &[])
            .await
            .unwrap();

        delete_pipeline(&cluster.state, "p2").await.unwrap();
        assert!(cluster.cafs.inspect_branch(SPEC_REPO, "p2").await.is_err());
        // And a second delete reports not-found
        let err = delete_pipeline(&cluster.state, "p2").await.unwrap_err();
        assert!(matches!(err, Error::PipelineNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        delete_pipeline(&cluster.state, "edges").await.unwrap();
        assert!(
            pipelines::read(cluster.state.kv.as_ref(), &cluster.state.prefix, "edges")
                .await
                .unwrap()
                .is_none()
        );
        assert!(cluster.cafs.inspect_repo("edges").await.is_err());
        assert!(cluster.cafs.inspect_branch(SPEC_REPO, "edges").await.is_err());
        let err = inspect_pipeline(&cluster.state, "edges").await.unwrap_err();
        assert!(matches!(err, Error::PipelineNotFound(_)));
    }

    #[tokio::test]
    async fn test_stop_and_start_toggle_provenance_and_state() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        stop_pipeline(&cluster.state, "edges").await.unwrap();
        let branch = cluster.cafs.inspect_branch("edges", "master").await.unwrap();
        assert_eq!(branch.provenance.len(), 1);
        assert_eq!(branch.provenance[0].repo, SPEC_REPO);
        let pointer = pipelines::read(cluster.state.kv.as_ref(), &cluster.state.prefix, "edges")
            .await
            .unwrap()
            .unwrap();
        assert!(pointer.state.is_stopped());

        start_pipeline(&cluster.state, "edges").await.unwrap();
        let branch = cluster.cafs.inspect_branch("edges", "master").await.unwrap();
        assert_eq!(branch.provenance.len(), 2);
        let pointer = pipelines::read(cluster.state.kv.as_ref(), &cluster.state.prefix, "edges")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pointer.state, PipelineState::Running);
    }

    #[tokio::test]
    async fn test_capability_follows_the_pipeline() {
        use crate::clients::auth::Scope;
        use crate::clients::memory::MemoryAuth;

        let auth = MemoryAuth::activated("alice");
        auth.grant("images", "alice", Scope::Reader);
        auth.grant("edges", "alice", Scope::Owner);
        let cluster = TestCluster::with_auth(auth.clone()).await;
        cluster.cafs.create_repo("images").await.unwrap();

        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();
        let pointer = pipelines::read(cluster.state.kv.as_ref(), &cluster.state.prefix, "edges")
            .await
            .unwrap()
            .unwrap();
        let token = pointer.capability.clone().unwrap();
        assert!(auth.is_token_live(&token));

        delete_pipeline(&cluster.state, "edges").await.unwrap();
        assert!(!auth.is_token_live(&token));
    }

    #[tokio::test]
    async fn test_delete_all_requires_cluster_admin() {
        use crate::clients::memory::MemoryAuth;

        let auth = MemoryAuth::activated("alice");
        let cluster = TestCluster::with_auth(auth.clone()).await;

        let err = delete_all(&cluster.state).await.unwrap_err();
        assert!(matches!(err, Error::NotClusterAdmin));

        auth.make_admin("alice");
        delete_all(&cluster.state).await.unwrap();
    }

    #[tokio::test]
    async fn test_hard_stop_finishes_open_output_commits() {
        let cluster = TestCluster::new().await;
        cluster.cafs.create_repo("images").await.unwrap();
        create_pipeline(&cluster.state, request("edges", "images"))
            .await
            .unwrap();

        let open = cluster.cafs.start_commit("edges", "master").await.unwrap();
        let spec = inspect_pipeline(&cluster.state, "edges").await.unwrap();
        hard_stop_pipeline(&cluster.state, &spec).await.unwrap();

        let info = cluster.cafs.inspect_commit("edges", &open.id).await.unwrap();
        assert!(info.finished.is_some());
        let branch = cluster.cafs.inspect_branch("edges", "master").await.unwrap();
        assert!(branch.provenance.is_empty());
    }
}
