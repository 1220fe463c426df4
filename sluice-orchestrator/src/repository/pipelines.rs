//! The pipeline pointer collection
//!
//! One `PipelinePointer` per pipeline at `<prefix>/pipelines/<name>`.

use sluice_core::domain::pipeline::PipelinePointer;

use crate::clients::kv::KvStore;
use crate::error::{Error, Result};
use crate::repository::stm::Stm;

pub fn key(prefix: &str, name: &str) -> String {
    format!("{}/pipelines/{}", prefix, name)
}

pub async fn get(stm: &mut Stm<'_>, prefix: &str, name: &str) -> Result<Option<PipelinePointer>> {
    stm.get(&key(prefix, name)).await
}

pub async fn get_or_not_found(
    stm: &mut Stm<'_>,
    prefix: &str,
    name: &str,
) -> Result<PipelinePointer> {
    get(stm, prefix, name)
        .await?
        .ok_or_else(|| Error::PipelineNotFound(name.to_string()))
}

pub fn put(stm: &mut Stm<'_>, prefix: &str, name: &str, pointer: &PipelinePointer) -> Result<()> {
    stm.put(&key(prefix, name), pointer)
}

pub fn delete(stm: &mut Stm<'_>, prefix: &str, name: &str) {
    stm.delete(&key(prefix, name));
}

/// Non-transactional point read
pub async fn read(
    kv: &dyn KvStore,
    prefix: &str,
    name: &str,
) -> Result<Option<PipelinePointer>> {
    match kv.get(&key(prefix, name)).await? {
        Some(entry) => Ok(Some(serde_json::from_slice(&entry.value)?)),
        None => Ok(None),
    }
}

/// All pipeline pointers, keyed by pipeline name
pub async fn list(kv: &dyn KvStore, prefix: &str) -> Result<Vec<(String, PipelinePointer)>> {
    let collection_prefix = format!("{}/pipelines/", prefix);
    let mut result = Vec::new();
    for entry in kv.list(&collection_prefix).await? {
        let name = entry
            .key
            .strip_prefix(&collection_prefix)
            .unwrap_or(&entry.key)
            .to_string();
        result.push((name, serde_json::from_slice(&entry.value)?));
    }
    Ok(result)
}
