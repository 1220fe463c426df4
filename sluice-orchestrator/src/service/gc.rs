//! Garbage collector
//!
//! Mark-and-sweep over the CAFS object space. Everything reachable from
//! a commit tree or from a pipeline's datum tags is live; the rest is
//! deleted in batches. A generation counter in TX-KV ticks afterwards
//! so worker pools invalidate their caches.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use sluice_core::domain::cafs::HashTree;
use sluice_core::domain::datum::datum_tag_prefix;

use crate::clients::cafs::CafsClient;
use crate::clients::kv::KvStore;
use crate::error::{Error, Result};
use crate::repository::pipelines;
use crate::service::pipeline;
use crate::state::AppState;

const TREE_WALK_CONCURRENCY: usize = 100;
const DELETE_BATCH: usize = 100;

/// Mark a tree object and everything its file nodes reference
async fn mark_tree(
    cafs: Arc<dyn CafsClient>,
    tree_hash: String,
    active: Arc<Mutex<HashSet<String>>>,
) -> Result<()> {
    active.lock().unwrap().insert(tree_hash.clone());
    let bytes = cafs
        .get_object(&tree_hash)
        .await
        .map_err(|e| Error::Cafs(format!("error getting commit tree: {}", e)))?;
    let tree: HashTree = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Cafs(format!("error reading commit tree: {}", e)))?;
    let mut active = active.lock().unwrap();
    tree.walk_objects(|object| {
        active.insert(object.to_string());
    });
    Ok(())
}

async fn join_all(tasks: Vec<tokio::task::JoinHandle<Result<()>>>) -> Result<()> {
    for task in tasks {
        task.await
            .map_err(|e| Error::Invariant(format!("mark task panicked: {}", e)))??;
    }
    Ok(())
}

pub async fn garbage_collect(state: &Arc<AppState>) -> Result<()> {
    let active_objects = Arc::new(Mutex::new(HashSet::new()));
    let limiter = Arc::new(Semaphore::new(TREE_WALK_CONCURRENCY));

    // Mark from commit trees
    let mut tasks = Vec::new();
    for repo in state.cafs.list_repos().await? {
        for info in state.cafs.list_commits(&repo, None).await? {
            let Some(tree) = info.tree else { continue };
            let cafs = state.cafs.clone();
            let active = active_objects.clone();
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Invariant("semaphore closed".to_string()))?;
                mark_tree(cafs, tree, active).await
            }));
        }
    }
    join_all(tasks).await?;

    // Mark from pipeline datum tags
    let active_tags = Arc::new(Mutex::new(HashSet::new()));
    let mut tasks = Vec::new();
    for (name, pointer) in pipelines::list(state.kv.as_ref(), &state.prefix).await? {
        let spec = pipeline::resolve_spec(state, &name, &pointer).await?;
        let tags = state
            .cafs
            .list_tags(Some(&datum_tag_prefix(&spec.salt)), true)
            .await
            .map_err(|e| Error::Cafs(format!("error listing tagged objects: {}", e)))?;
        for tag in tags {
            active_tags.lock().unwrap().insert(tag.tag);
            let Some(object) = tag.object else { continue };
            let cafs = state.cafs.clone();
            let active = active_objects.clone();
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Invariant("semaphore closed".to_string()))?;
                mark_tree(cafs, object, active).await
            }));
        }
    }
    join_all(tasks).await?;

    // Sweep objects
    let active_objects = active_objects.lock().unwrap().clone();
    let mut to_delete = Vec::new();
    let mut swept_objects = 0usize;
    for object in state.cafs.list_objects().await? {
        if !active_objects.contains(&object) {
            to_delete.push(object);
        }
        if to_delete.len() > DELETE_BATCH {
            swept_objects += to_delete.len();
            state.cafs.delete_objects(&to_delete).await?;
            to_delete.clear();
        }
    }
    if !to_delete.is_empty() {
        swept_objects += to_delete.len();
        state.cafs.delete_objects(&to_delete).await?;
    }

    // Sweep tags
    let active_tags = active_tags.lock().unwrap().clone();
    let mut to_delete = Vec::new();
    let mut swept_tags = 0usize;
    for tag in state.cafs.list_tags(None, false).await? {
        if !active_tags.contains(&tag.tag) {
            to_delete.push(tag.tag);
        }
        if to_delete.len() > DELETE_BATCH {
            swept_tags += to_delete.len();
            state.cafs.delete_tags(&to_delete).await?;
            to_delete.clear();
        }
    }
    if !to_delete.is_empty() {
        swept_tags += to_delete.len();
        state.cafs.delete_tags(&to_delete).await?;
    }

    increment_gc_generation(state).await?;
    tracing::info!(
        "garbage collection swept {} objects and {} tags",
        swept_objects,
        swept_tags
    );
    Ok(())
}

/// Bump the generation counter, creating it at 1 (the first generation
/// is implicitly 0)
async fn increment_gc_generation(state: &AppState) -> Result<()> {
    let key = state.gc_generation_key();
    let next = match state.kv.get(&key).await? {
        None => 1,
        Some(entry) => {
            let current: i64 = String::from_utf8_lossy(&entry.value)
                .trim()
                .parse()
                .map_err(|e| Error::Invariant(format!("bad GC generation: {}", e)))?;
            current + 1
        }
    };
    state.kv.put(&key, next.to_string().into_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestCluster;
    use sha2::{Digest, Sha256};
    use sluice_core::domain::cafs::FileNode;

    async fn generation(cluster: &TestCluster) -> Option<String> {
        cluster
            .state
            .kv
            .get(&cluster.state.gc_generation_key())
            .await
            .unwrap()
            .map(|e| String::from_utf8(e.value).unwrap())
    }

    #[tokio::test]
    async fn test_orphan_object_is_swept_and_generation_bumped() {
        let cluster = TestCluster::new().await;
        let live = cluster.commit_file("images", "master", "/1.png", b"pixels").await;
        let live_tree = cluster
            .cafs
            .inspect_commit("images", &live.id)
            .await
            .unwrap()
            .tree
            .unwrap();

        cluster.cafs.put_object("orphan-x", b"unreferenced".to_vec());

        garbage_collect(&cluster.state).await.unwrap();

        assert!(!cluster.cafs.has_object("orphan-x"));
        assert!(cluster.cafs.has_object(&live_tree));
        assert_eq!(generation(&cluster).await.as_deref(), Some("1"));

        garbage_collect(&cluster.state).await.unwrap();
        assert_eq!(generation(&cluster).await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_commit_file_objects_survive() {
        let cluster = TestCluster::new().await;
        cluster.commit_file("images", "master", "/1.png", b"pixels").await;
        let content_hash = format!("{:x}", Sha256::digest(b"pixels"));
        assert!(cluster.cafs.has_object(&content_hash));

        garbage_collect(&cluster.state).await.unwrap();
        assert!(cluster.cafs.has_object(&content_hash));
    }

    #[tokio::test]
    async fn test_pipeline_tags_keep_their_trees() {
        let cluster = TestCluster::new().await;
        cluster.pipeline_with_job("edges", "images").await;
        let spec = crate::service::pipeline::inspect_pipeline(&cluster.state, "edges")
            .await
            .unwrap();

        // A datum result: a tagged tree referencing one object
        let mut tree = HashTree::default();
        tree.files.insert(
            "/out".to_string(),
            FileNode {
                objects: vec!["datum-object".to_string()],
            },
        );
        let tree_bytes = serde_json::to_vec(&tree).unwrap();
        cluster.cafs.put_object("datum-tree", tree_bytes);
        cluster.cafs.put_object("datum-object", b"result".to_vec());
        let tag = format!("{}-d1", datum_tag_prefix(&spec.salt));
        cluster.cafs.put_tag(&tag, "datum-tree");

        // And one stale tag from an older salt
        cluster.cafs.put_object("stale-tree", b"{\"files\":{}}".to_vec());
        cluster.cafs.put_tag("stale-prefix-d9", "stale-tree");

        garbage_collect(&cluster.state).await.unwrap();

        assert!(cluster.cafs.has_tag(&tag));
        assert!(cluster.cafs.has_object("datum-tree"));
        assert!(cluster.cafs.has_object("datum-object"));
        assert!(!cluster.cafs.has_tag("stale-prefix-d9"));
        assert!(!cluster.cafs.has_object("stale-tree"));
    }
}
