//! Shared test fixtures: an in-process cluster wired from the memory
//! clients, plus helpers for the repetitive setup steps.

use std::collections::BTreeMap;
use std::sync::Arc;

use sluice_core::domain::cafs::Commit;
use sluice_core::domain::input::{AtomInput, Input};
use sluice_core::domain::job::JobState;
use sluice_core::domain::pipeline::Transform;
use sluice_core::dto::job::CreateJobRequest;
use sluice_core::dto::pipeline::CreatePipelineRequest;

use crate::clients::cafs::CafsClient;
use crate::clients::kv::KvStore;
use crate::clients::memory::{MemoryAuth, MemoryCafs, MemoryKube, MemoryKv};
use crate::repository::pipelines;
use crate::service::{job, pipeline};
use crate::state::AppState;

pub struct TestCluster {
    pub state: Arc<AppState>,
    pub cafs: MemoryCafs,
    pub kv: MemoryKv,
    pub auth: MemoryAuth,
    pub kube: MemoryKube,
}

impl TestCluster {
    pub async fn new() -> Self {
        Self::with_auth(MemoryAuth::deactivated()).await
    }

    pub async fn with_auth(auth: MemoryAuth) -> Self {
        let cafs = MemoryCafs::new();
        let kv = MemoryKv::new();
        let kube = MemoryKube::new();
        kv.put("sluice/pps-token", b"pps-admin-token".to_vec())
            .await
            .unwrap();
        let state = Arc::new(AppState::new(
            Arc::new(cafs.clone()),
            Arc::new(kv.clone()),
            Arc::new(auth.clone()),
            Arc::new(kube.clone()),
            "sluice",
            "default",
        ));
        state.bootstrap().await.unwrap();
        Self {
            state,
            cafs,
            kv,
            auth,
            kube,
        }
    }

    /// Commit one file on a branch, creating the repo as needed
    pub async fn commit_file(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        content: &[u8],
    ) -> Commit {
        if self.cafs.inspect_repo(repo).await.is_err() {
            self.cafs.create_repo(repo).await.unwrap();
        }
        let commit = self.cafs.start_commit(repo, branch).await.unwrap();
        self.cafs
            .put_file(repo, &commit.id, path, content.to_vec())
            .await
            .unwrap();
        self.cafs.finish_commit(repo, &commit.id, false).await.unwrap();
        commit
    }

    pub fn create_request(&self, name: &str, input_repo: &str) -> CreatePipelineRequest {
        CreatePipelineRequest {
            name: name.to_string(),
            description: None,
            transform: Transform {
                cmd: vec!["sh".to_string()],
                ..Default::default()
            },
            parallelism_spec: None,
            input: Input::Atom(AtomInput {
                name: String::new(),
                repo: input_repo.to_string(),
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

    /// A pipeline over a one-file input repo, plus one job in STARTING
    /// on a fresh output commit. Returns the job ID.
    pub async fn pipeline_with_job(&self, name: &str, input_repo: &str) -> String {
        self.commit_file(input_repo, "master", "/1.png", b"pixels")
            .await;
        pipeline::create_pipeline(&self.state, self.create_request(name, input_repo))
            .await
            .unwrap();
        self.new_job(name).await
    }

    /// Another job for an existing pipeline, on a fresh output commit
    pub async fn new_job(&self, name: &str) -> String {
        let output = self.cafs.start_commit(name, "master").await.unwrap();
        job::create_job(
            &self.state,
            CreateJobRequest {
                pipeline: name.to_string(),
                output_commit: output,
            },
        )
        .await
        .unwrap()
    }

    pub async fn job_counts(&self, name: &str) -> BTreeMap<JobState, i64> {
        pipelines::read(self.state.kv.as_ref(), &self.state.prefix, name)
            .await
            .unwrap()
            .unwrap()
            .job_counts
    }
}
