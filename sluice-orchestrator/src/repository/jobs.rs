//! The job pointer collection
//!
//! One `JobPointer` per job at `<prefix>/jobs/<id>`, with two secondary
//! indices (by pipeline, by output commit) written in the same
//! transaction as the pointer itself.

use sluice_core::domain::cafs::Commit;
use sluice_core::domain::job::JobPointer;

use crate::clients::kv::KvStore;
use crate::error::{Error, Result};
use crate::repository::stm::Stm;

pub fn key(prefix: &str, id: &str) -> String {
    format!("{}/jobs/{}", prefix, id)
}

fn pipeline_index_key(prefix: &str, pipeline: &str, id: &str) -> String {
    format!("{}/jobs.pipeline/{}/{}", prefix, pipeline, id)
}

fn output_index_key(prefix: &str, commit: &Commit, id: &str) -> String {
    format!("{}/jobs.output/{}@{}/{}", prefix, commit.repo, commit.id, id)
}

pub async fn get(stm: &mut Stm<'_>, prefix: &str, id: &str) -> Result<Option<JobPointer>> {
    stm.get(&key(prefix, id)).await
}

pub async fn get_or_not_found(stm: &mut Stm<'_>, prefix: &str, id: &str) -> Result<JobPointer> {
    get(stm, prefix, id)
        .await?
        .ok_or_else(|| Error::JobNotFound(id.to_string()))
}

/// Write the pointer and both index entries
pub fn put(stm: &mut Stm<'_>, prefix: &str, pointer: &JobPointer) -> Result<()> {
    stm.put(&key(prefix, &pointer.job_id), pointer)?;
    stm.put_raw(
        &pipeline_index_key(prefix, &pointer.pipeline, &pointer.job_id),
        vec![],
    );
    stm.put_raw(
        &output_index_key(prefix, &pointer.output_commit, &pointer.job_id),
        vec![],
    );
    Ok(())
}

/// Delete the pointer and both index entries
pub fn delete(stm: &mut Stm<'_>, prefix: &str, pointer: &JobPointer) {
    stm.delete(&key(prefix, &pointer.job_id));
    stm.delete(&pipeline_index_key(prefix, &pointer.pipeline, &pointer.job_id));
    stm.delete(&output_index_key(
        prefix,
        &pointer.output_commit,
        &pointer.job_id,
    ));
}

/// Non-transactional point read
pub async fn read(kv: &dyn KvStore, prefix: &str, id: &str) -> Result<Option<JobPointer>> {
    match kv.get(&key(prefix, id)).await? {
        Some(entry) => Ok(Some(serde_json::from_slice(&entry.value)?)),
        None => Ok(None),
    }
}

/// All job pointers, in key order
pub async fn list(kv: &dyn KvStore, prefix: &str) -> Result<Vec<JobPointer>> {
    let collection_prefix = format!("{}/jobs/", prefix);
    let mut result = Vec::new();
    for entry in kv.list(&collection_prefix).await? {
        result.push(serde_json::from_slice(&entry.value)?);
    }
    Ok(result)
}

/// Job IDs of a pipeline, via the secondary index
pub async fn ids_by_pipeline(
    kv: &dyn KvStore,
    prefix: &str,
    pipeline: &str,
) -> Result<Vec<String>> {
    let index_prefix = format!("{}/jobs.pipeline/{}/", prefix, pipeline);
    Ok(kv
        .list(&index_prefix)
        .await?
        .into_iter()
        .filter_map(|entry| entry.key.strip_prefix(&index_prefix).map(str::to_string))
        .collect())
}

/// Job IDs for an output commit, via the secondary index
pub async fn ids_by_output(kv: &dyn KvStore, prefix: &str, commit: &Commit) -> Result<Vec<String>> {
    let index_prefix = format!("{}/jobs.output/{}@{}/", prefix, commit.repo, commit.id);
    Ok(kv
        .list(&index_prefix)
        .await?
        .into_iter()
        .filter_map(|entry| entry.key.strip_prefix(&index_prefix).map(str::to_string))
        .collect())
}
