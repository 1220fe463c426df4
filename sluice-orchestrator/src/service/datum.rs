//! Datum view
//!
//! Datums are reconstructed rather than stored. For an unfinished job
//! they are synthesized from the datum factory over the job's input;
//! for a finished job with stats they are read back from the stats
//! commit, failed datums first.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Semaphore;

use sluice_core::domain::cafs::{Commit, File, FileInfo};
use sluice_core::domain::datum::{hash_datum, Datum, DatumInfo, DatumState};
use sluice_core::domain::input::Input;
use sluice_core::domain::job::ProcessStats;
use sluice_core::dto::datum::{ListDatumRequest, ListDatumResponse};

use crate::clients::cafs::CafsClient;
use crate::error::{Error, Result};
use crate::service::auth::{self, PipelineOperation};
use crate::service::job;
use crate::state::AppState;

/// Enumerates the units of work a job's input expands into. The real
/// factory lives in the worker runtime; this implementation mirrors its
/// expansion (glob per atom, cartesian product for cross, concatenation
/// for union) over CAFS file listings.
pub trait DatumFactory: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The ordered file infos of datum `index`
    fn datum(&self, index: usize) -> Vec<FileInfo>;
}

struct UnitFactory {
    datums: Vec<Vec<FileInfo>>,
}

impl DatumFactory for UnitFactory {
    fn len(&self) -> usize {
        self.datums.len()
    }

    fn datum(&self, index: usize) -> Vec<FileInfo> {
        self.datums[index].clone()
    }
}

fn expand<'a>(
    cafs: &'a dyn CafsClient,
    input: &'a Input,
) -> BoxFuture<'a, Result<Vec<Vec<FileInfo>>>> {
    async move {
        match input {
            Input::Atom(atom) => {
                // No commit means the input branch had no data yet
                let Some(commit) = &atom.commit else {
                    return Ok(vec![]);
                };
                let files = cafs.glob_file(&atom.repo, commit, &atom.glob).await?;
                Ok(files.into_iter().map(|info| vec![info]).collect())
            }
            Input::Cron(cron) => {
                let files = cafs.glob_file(&cron.repo, "master", "/*").await?;
                Ok(files.into_iter().map(|info| vec![info]).collect())
            }
            Input::Git(git) => {
                let files = cafs.glob_file(&git.name, &git.branch, "/*").await?;
                Ok(files.into_iter().map(|info| vec![info]).collect())
            }
            Input::Union(children) => {
                let mut datums = Vec::new();
                for child in children {
                    datums.extend(expand(cafs, child).await?);
                }
                Ok(datums)
            }
            Input::Cross(children) => {
                let mut datums: Vec<Vec<FileInfo>> = vec![vec![]];
                for child in children {
                    let expanded = expand(cafs, child).await?;
                    let mut next = Vec::new();
                    for datum in &datums {
                        for extension in &expanded {
                            let mut combined = datum.clone();
                            combined.extend(extension.clone());
                            next.push(combined);
                        }
                    }
                    datums = next;
                }
                Ok(datums)
            }
        }
    }
    .boxed()
}

pub async fn new_datum_factory(
    cafs: &dyn CafsClient,
    input: &Input,
) -> Result<Arc<dyn DatumFactory>> {
    let datums = expand(cafs, input).await?;
    Ok(Arc::new(UnitFactory { datums }))
}

fn total_pages(total: usize, page_size: i64) -> i64 {
    (total as i64 + page_size - 1) / page_size
}

fn page_bounds(total: usize, page: i64, page_size: i64) -> Result<(usize, usize)> {
    let start = page * page_size;
    let end = (page + 1) * page_size;
    if page < 0 || total as i64 <= start {
        return Err(Error::Validation(format!("page {} does not exist", page)));
    }
    Ok((start as usize, (total as i64).min(end) as usize))
}

/// STARTING for a fresh datum; derived from the datum directory's
/// children for a finished one. A `job:` child naming another job means
/// the datum was skipped (its result was reused).
fn datum_file_state(info: &FileInfo, job_id: &str) -> DatumState {
    for child in &info.children {
        if let Some(owner) = child.strip_prefix("job:") {
            if owner != job_id {
                return DatumState::Skipped;
            }
        }
        if child == "failure" {
            return DatumState::Failed;
        }
    }
    DatumState::Success
}

fn datum_base_name(info: &FileInfo) -> String {
    info.file
        .path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Assemble one datum's details from its directory in the stats commit
async fn get_datum(
    state: &AppState,
    stats_commit: &Commit,
    job_id: &str,
    datum_id: &str,
    factory: &dyn DatumFactory,
) -> Result<DatumInfo> {
    let repo = &stats_commit.repo;
    let commit = &stats_commit.id;

    let job_files = state
        .cafs
        .glob_file(repo, commit, &format!("/{}/job:*", datum_id))
        .await?;
    if job_files.len() != 1 {
        return Err(Error::Invariant(format!(
            "couldn't find job file for datum {}",
            datum_id
        )));
    }
    let owner = job_files[0]
        .file
        .path
        .rsplit(':')
        .next()
        .unwrap_or_default();
    let mut datum_state = if owner == job_id {
        DatumState::Success
    } else {
        DatumState::Skipped
    };

    match state
        .cafs
        .inspect_file(repo, commit, &format!("/{}/failure", datum_id))
        .await
    {
        Ok(_) => datum_state = DatumState::Failed,
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let stats_bytes = state
        .cafs
        .get_file(repo, commit, &format!("/{}/stats", datum_id))
        .await?;
    let stats: ProcessStats = serde_json::from_slice(&stats_bytes)?;

    let index_bytes = state
        .cafs
        .get_file(repo, commit, &format!("/{}/index", datum_id))
        .await?;
    let index: usize = String::from_utf8_lossy(&index_bytes)
        .trim()
        .parse()
        .map_err(|e| Error::Invariant(format!("bad datum index for {}: {}", datum_id, e)))?;
    if index >= factory.len() {
        return Err(Error::Invariant(format!(
            "datum index {} out of range",
            index
        )));
    }

    Ok(DatumInfo {
        datum: Datum {
            id: datum_id.to_string(),
            job_id: job_id.to_string(),
        },
        state: datum_state,
        data: factory.datum(index),
        stats: Some(stats),
        pfs_state: Some(File {
            commit: stats_commit.clone(),
            path: format!("/{}/pfs", datum_id),
        }),
    })
}

pub async fn list_datum(
    state: &Arc<AppState>,
    request: &ListDatumRequest,
) -> Result<ListDatumResponse> {
    let job_info = job::inspect_job(state, &request.job_id, false).await?;
    auth::authorize_pipeline_op(
        state,
        PipelineOperation::ListDatum,
        &job_info.input,
        &job_info.pipeline,
    )
    .await?;

    let factory = new_datum_factory(state.cafs.as_ref(), &job_info.input).await?;
    let mut response = ListDatumResponse::default();

    let Some(stats_commit) = job_info.stats_commit.clone() else {
        // Unfinished job: synthesize datums straight from the factory
        let (start, end) = if request.page_size > 0 {
            response.page = request.page;
            response.total_pages = total_pages(factory.len(), request.page_size);
            page_bounds(factory.len(), request.page, request.page_size)?
        } else {
            (0, factory.len())
        };
        for index in start..end {
            let data = factory.datum(index);
            let id = hash_datum(&job_info.pipeline, &job_info.salt, &data);
            response.datum_infos.push(DatumInfo {
                datum: Datum {
                    id,
                    job_id: job_info.job_id.clone(),
                },
                state: DatumState::Starting,
                data,
                stats: None,
                pfs_state: None,
            });
        }
        return Ok(response);
    };

    // Finished job: every top-level entry of the stats commit except
    // the aggregate artifacts is a datum directory
    let mut entries = state
        .cafs
        .list_files(&stats_commit.repo, &stats_commit.id, "/")
        .await?;
    entries.retain(|info| {
        !matches!(datum_base_name(info).as_str(), "stats" | "logs" | "pfs")
    });
    entries.sort_by_key(|info| datum_file_state(info, &job_info.job_id));

    if request.page_size > 0 {
        response.page = request.page;
        response.total_pages = total_pages(entries.len(), request.page_size);
        let (start, end) = page_bounds(entries.len(), request.page, request.page_size)?;
        entries = entries[start..end].to_vec();
    }

    let limiter = Arc::new(Semaphore::new(200));
    let mut tasks = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let state = state.clone();
        let stats_commit = stats_commit.clone();
        let job_id = job_info.job_id.clone();
        let datum_id = datum_base_name(entry);
        let factory = factory.clone();
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|_| Error::Invariant("semaphore closed".to_string()))?;
            let info = get_datum(&state, &stats_commit, &job_id, &datum_id, factory.as_ref()).await?;
            Ok::<(usize, DatumInfo), Error>((index, info))
        }));
    }
    let mut infos: Vec<Option<DatumInfo>> = vec![None; entries.len()];
    for task in tasks {
        let (index, info) = task
            .await
            .map_err(|e| Error::Invariant(format!("datum fetch panicked: {}", e)))??;
        infos[index] = Some(info);
    }
    response.datum_infos = infos.into_iter().flatten().collect();
    Ok(response)
}

pub async fn inspect_datum(
    state: &Arc<AppState>,
    job_id: &str,
    datum_id: &str,
) -> Result<DatumInfo> {
    let job_info = job::inspect_job(state, job_id, false).await?;
    if !job_info.enable_stats {
        return Err(Error::Validation(format!(
            "stats not enabled on {}",
            job_info.pipeline
        )));
    }
    let Some(stats_commit) = job_info.stats_commit.clone() else {
        return Err(Error::Validation(
            "job not finished, no stats output yet".to_string(),
        ));
    };
    let factory = new_datum_factory(state.cafs.as_ref(), &job_info.input).await?;
    get_datum(state, &stats_commit, job_id, datum_id, factory.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{jobs, stm::Stm};
    use crate::testutil::TestCluster;

    #[test]
    fn test_page_math() {
        assert_eq!(total_pages(10, 3), 4);
        assert_eq!(total_pages(9, 3), 3);
        assert_eq!(page_bounds(10, 0, 3).unwrap(), (0, 3));
        assert_eq!(page_bounds(10, 3, 3).unwrap(), (9, 10));
        assert!(page_bounds(10, 4, 3).is_err());
        assert!(page_bounds(0, 0, 3).is_err());
    }

    #[test]
    fn test_datum_file_state_from_children() {
        let info = |children: Vec<&str>| FileInfo {
            file: File {
                commit: Commit::new("p", "c"),
                path: "/abc".to_string(),
            },
            hash: None,
            size_bytes: 0,
            children: children.into_iter().map(str::to_string).collect(),
        };
        assert_eq!(datum_file_state(&info(vec!["job:me"]), "me"), DatumState::Success);
        assert_eq!(
            datum_file_state(&info(vec!["job:other"]), "me"),
            DatumState::Skipped
        );
        assert_eq!(
            datum_file_state(&info(vec!["job:me", "failure"]), "me"),
            DatumState::Failed
        );
    }

    async fn cluster_with_running_job() -> (TestCluster, String) {
        let cluster = TestCluster::new().await;
        cluster.commit_file("images", "master", "/2.png", b"b").await;
        let job_id = cluster.pipeline_with_job("edges", "images").await;
        (cluster, job_id)
    }

    #[tokio::test]
    async fn test_synthesized_datums_for_unfinished_job() {
        let (cluster, job_id) = cluster_with_running_job().await;

        let response = list_datum(
            &cluster.state,
            &ListDatumRequest {
                job_id: job_id.clone(),
                page: 0,
                page_size: 0,
            },
        )
        .await
        .unwrap();
        // Two files in the input repo, one datum each
        assert_eq!(response.datum_infos.len(), 2);
        for info in &response.datum_infos {
            assert_eq!(info.state, DatumState::Starting);
            assert_eq!(info.data.len(), 1);
            assert!(!info.datum.id.is_empty());
        }
    }

    #[tokio::test]
    async fn test_pagination_bounds_and_out_of_range() {
        let (cluster, job_id) = cluster_with_running_job().await;

        let page = list_datum(
            &cluster.state,
            &ListDatumRequest {
                job_id: job_id.clone(),
                page: 1,
                page_size: 1,
            },
        )
        .await
        .unwrap();
        assert_eq!(page.datum_infos.len(), 1);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 2);

        assert!(list_datum(
            &cluster.state,
            &ListDatumRequest {
                job_id,
                page: 2,
                page_size: 1,
            },
        )
        .await
        .is_err());
    }

    /// Build a stats commit with three datums (failed, skipped,
    /// succeeded) and point the job at it
    async fn attach_stats_commit(cluster: &TestCluster, job_id: &str) {
        let stats = cluster.cafs.start_commit("edges", "stats").await.unwrap();
        let put = |path: &str, data: &[u8]| {
            let cafs = cluster.cafs.clone();
            let id = stats.id.clone();
            let path = path.to_string();
            let data = data.to_vec();
            async move { cafs.put_file("edges", &id, &path, data).await.unwrap() }
        };
        let stats_json = serde_json::to_vec(&ProcessStats::default()).unwrap();

        put("/aaa/job:other-job", b"").await;
        put("/aaa/stats", &stats_json).await;
        put("/aaa/index", b"0").await;
        put(&format!("/bbb/job:{}", job_id), b"").await;
        put("/bbb/failure", b"boom").await;
        put("/bbb/stats", &stats_json).await;
        put("/bbb/index", b"1").await;
        put(&format!("/ccc/job:{}", job_id), b"").await;
        put("/ccc/stats", &stats_json).await;
        put("/ccc/index", b"0").await;
        // Aggregate artifacts are not datums
        put("/logs", b"").await;
        put("/stats", b"").await;
        put("/pfs/out", b"").await;
        cluster.cafs.finish_commit("edges", &stats.id, false).await.unwrap();

        loop {
            let mut stm = Stm::new(cluster.state.kv.as_ref());
            let mut pointer = jobs::get_or_not_found(&mut stm, &cluster.state.prefix, job_id)
                .await
                .unwrap();
            pointer.stats_commit = Some(stats.clone());
            jobs::put(&mut stm, &cluster.state.prefix, &pointer).unwrap();
            if stm.commit().await.unwrap() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_stats_commit_datums_sort_failed_first() {
        let (cluster, job_id) = cluster_with_running_job().await;
        attach_stats_commit(&cluster, &job_id).await;

        let response = list_datum(
            &cluster.state,
            &ListDatumRequest {
                job_id,
                page: 0,
                page_size: 0,
            },
        )
        .await
        .unwrap();
        let states: Vec<DatumState> = response.datum_infos.iter().map(|d| d.state).collect();
        assert_eq!(
            states,
            vec![DatumState::Failed, DatumState::Skipped, DatumState::Success]
        );
        // Details came back from the stats files
        assert!(response.datum_infos[0].stats.is_some());
        assert!(response.datum_infos[0]
            .pfs_state
            .as_ref()
            .unwrap()
            .path
            .ends_with("/pfs"));
    }

    #[tokio::test]
    async fn test_inspect_datum_requires_stats() {
        let (cluster, job_id) = cluster_with_running_job().await;
        let err = inspect_datum(&cluster.state, &job_id, "aaa").await.unwrap_err();
        assert!(err.to_string().contains("stats not enabled"));
    }

    #[tokio::test]
    async fn test_inspect_datum_detail() {
        let cluster = TestCluster::new().await;
        cluster.commit_file("images", "master", "/1.png", b"a").await;
        cluster.commit_file("images", "master", "/2.png", b"b").await;
        let mut request = cluster.create_request("edges", "images");
        request.enable_stats = true;
        crate::service::pipeline::create_pipeline(&cluster.state, request)
            .await
            .unwrap();
        let job_id = cluster.new_job("edges").await;
        attach_stats_commit(&cluster, &job_id).await;

        let info = inspect_datum(&cluster.state, &job_id, "bbb").await.unwrap();
        assert_eq!(info.state, DatumState::Failed);
        assert_eq!(info.data.len(), 1);
        assert_eq!(info.datum.id, "bbb");
    }
}
