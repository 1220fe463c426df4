//! In-process implementations of the collaborator traits
//!
//! These back the test suite and the standalone (single binary) mode.
//! State lives behind mutexes; no lock is held across an await point.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use sluice_core::domain::cafs::{
    Branch, BranchInfo, Commit, CommitInfo, CommitProvenance, File, FileInfo, HashTree, TagInfo,
};

use crate::clients::auth::{AuthClient, Scope, WhoAmI};
use crate::clients::cafs::CafsClient;
use crate::clients::kube::{KubeClient, Pod, ServiceIngress};
use crate::clients::kv::{KvEntry, KvStore, KvWrite, WatchEvent};
use crate::error::{Error, Result};

// =============================================================================
// TX-KV
// =============================================================================

#[derive(Default, Clone)]
pub struct MemoryKv {
    inner: Arc<Mutex<KvInner>>,
}

#[derive(Default)]
struct KvInner {
    entries: BTreeMap<String, (Vec<u8>, i64)>,
    revision: i64,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<WatchEvent>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvInner {
    fn notify(&mut self, key: &str, event: WatchEvent) {
        if let Some(senders) = self.watchers.get_mut(key) {
            senders.retain(|s| s.send(event.clone()).is_ok());
        }
    }

    fn apply(&mut self, writes: &[KvWrite]) {
        self.revision += 1;
        let revision = self.revision;
        for write in writes {
            match write {
                KvWrite::Put { key, value } => {
                    self.entries.insert(key.clone(), (value.clone(), revision));
                    self.notify(
                        key,
                        WatchEvent::Put(KvEntry {
                            key: key.clone(),
                            value: value.clone(),
                            revision,
                        }),
                    );
                }
                KvWrite::Delete { key } => {
                    self.entries.remove(key);
                    self.notify(key, WatchEvent::Delete(key.clone()));
                }
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(key).map(|(value, revision)| KvEntry {
            key: key.to_string(),
            value: value.clone(),
            revision: *revision,
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (value, revision))| KvEntry {
                key: k.clone(),
                value: value.clone(),
                revision: *revision,
            })
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.apply(&[KvWrite::Put {
            key: key.to_string(),
            value,
        }]);
        Ok(())
    }

    async fn commit(&self, reads: &[(String, i64)], writes: &[KvWrite]) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        for (key, revision) in reads {
            let current = inner.entries.get(key).map(|(_, r)| *r).unwrap_or(0);
            if current != *revision {
                return Ok(false);
            }
        }
        inner.apply(writes);
        Ok(true)
    }

    async fn watch(&self, key: &str) -> Result<mpsc::UnboundedReceiver<WatchEvent>> {
        let mut inner = self.inner.lock().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some((value, revision)) = inner.entries.get(key) {
            let _ = tx.send(WatchEvent::Put(KvEntry {
                key: key.to_string(),
                value: value.clone(),
                revision: *revision,
            }));
        }
        inner.watchers.entry(key.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

// =============================================================================
// CAFS
// =============================================================================

#[derive(Default, Clone)]
pub struct MemoryCafs {
    inner: Arc<Mutex<CafsInner>>,
}

#[derive(Default)]
struct CafsInner {
    repos: BTreeSet<String>,
    branches: BTreeMap<(String, String), BranchRecord>,
    commits: HashMap<(String, String), CommitRecord>,
    objects: BTreeMap<String, Vec<u8>>,
    tags: BTreeMap<String, String>,
    sequence: u64,
}

#[derive(Default)]
struct BranchRecord {
    head: Option<String>,
    provenance: Vec<Branch>,
}

struct CommitRecord {
    started: chrono::DateTime<chrono::Utc>,
    finished: Option<chrono::DateTime<chrono::Utc>>,
    parent: Option<String>,
    provenance: Vec<CommitProvenance>,
    files: BTreeMap<String, Vec<u8>>,
    tree: Option<String>,
    sequence: u64,
}

impl MemoryCafs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw object, bypassing any commit (test helper)
    pub fn put_object(&self, hash: &str, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert(hash.to_string(), data);
    }

    /// Tag an object directly (test helper)
    pub fn put_tag(&self, tag: &str, object: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.tags.insert(tag.to_string(), object.to_string());
    }

    pub fn has_object(&self, hash: &str) -> bool {
        self.inner.lock().unwrap().objects.contains_key(hash)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.inner.lock().unwrap().tags.contains_key(tag)
    }
}

impl CafsInner {
    fn resolve(&self, repo: &str, commit: &str) -> Result<String> {
        if self.commits.contains_key(&(repo.to_string(), commit.to_string())) {
            return Ok(commit.to_string());
        }
        if let Some(branch) = self.branches.get(&(repo.to_string(), commit.to_string())) {
            if let Some(head) = &branch.head {
                return Ok(head.clone());
            }
        }
        Err(Error::Cafs(format!(
            "commit {} not found in repo {}",
            commit, repo
        )))
    }

    fn commit(&self, repo: &str, id: &str) -> Result<&CommitRecord> {
        self.commits
            .get(&(repo.to_string(), id.to_string()))
            .ok_or_else(|| Error::Cafs(format!("commit {} not found in repo {}", id, repo)))
    }
}

fn hex_digest(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Immediate child names under `dir` given a flat path->content map
fn child_names(files: &BTreeMap<String, Vec<u8>>, dir: &str) -> Vec<String> {
    let prefix = if dir == "/" { "/".to_string() } else { format!("{}/", dir) };
    let mut names: Vec<String> = Vec::new();
    for path in files.keys() {
        if let Some(rest) = path.strip_prefix(&prefix) {
            if rest.is_empty() {
                continue;
            }
            let name = rest.split('/').next().unwrap().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn info_at(commit: &Commit, files: &BTreeMap<String, Vec<u8>>, path: &str) -> Option<FileInfo> {
    if let Some(content) = files.get(path) {
        return Some(FileInfo {
            file: File {
                commit: commit.clone(),
                path: path.to_string(),
            },
            hash: Some(hex_digest(content)),
            size_bytes: content.len() as u64,
            children: vec![],
        });
    }
    let children = child_names(files, path);
    if children.is_empty() {
        return None;
    }
    Some(FileInfo {
        file: File {
            commit: commit.clone(),
            path: path.to_string(),
        },
        hash: None,
        size_bytes: 0,
        children,
    })
}

/// Every path present in the map, including implicit directories
fn all_paths(files: &BTreeMap<String, Vec<u8>>) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for path in files.keys() {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{}/{}", current, segment);
            paths.insert(current.clone());
        }
    }
    paths
}

fn segment_matches(pattern: &str, name: &str) -> bool {
    match pattern.find('*') {
        None => pattern == name,
        Some(pos) => {
            let (prefix, suffix) = (&pattern[..pos], &pattern[pos + 1..]);
            name.starts_with(prefix) && name.ends_with(suffix) && name.len() >= prefix.len() + suffix.len()
        }
    }
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    pattern.len() == segments.len()
        && pattern
            .iter()
            .zip(&segments)
            .all(|(p, s)| segment_matches(p, s))
}

#[async_trait]
impl CafsClient for MemoryCafs {
    fn with_token(&self, _token: &str) -> Arc<dyn CafsClient> {
        Arc::new(self.clone())
    }

    async fn create_repo(&self, repo: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.repos.insert(repo.to_string()) {
            return Err(Error::Cafs(format!("repo {} already exists", repo)));
        }
        Ok(())
    }

    async fn inspect_repo(&self, repo: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if inner.repos.contains(repo) {
            Ok(())
        } else {
            Err(Error::Cafs(format!("repo {} not found", repo)))
        }
    }

    async fn list_repos(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.repos.iter().cloned().collect())
    }

    async fn delete_repo(&self, repo: &str, _force: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.repos.remove(repo) {
            return Err(Error::Cafs(format!("repo {} not found", repo)));
        }
        inner.branches.retain(|(r, _), _| r != repo);
        inner.commits.retain(|(r, _), _| r != repo);
        Ok(())
    }

    async fn create_branch(
        &self,
        repo: &str,
        branch: &str,
        head: Option<&str>,
        provenance: &[Branch],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.repos.contains(repo) {
            return Err(Error::Cafs(format!("repo {} not found", repo)));
        }
        let resolved = match head {
            Some(h) => Some(inner.resolve(repo, h)?),
            None => inner
                .branches
                .get(&(repo.to_string(), branch.to_string()))
                .and_then(|b| b.head.clone()),
        };
        inner.branches.insert(
            (repo.to_string(), branch.to_string()),
            BranchRecord {
                head: resolved,
                provenance: provenance.to_vec(),
            },
        );
        Ok(())
    }

    async fn inspect_branch(&self, repo: &str, branch: &str) -> Result<BranchInfo> {
        let inner = self.inner.lock().unwrap();
        let record = inner
            .branches
            .get(&(repo.to_string(), branch.to_string()))
            .ok_or_else(|| Error::Cafs(format!("branch {} not found in repo {}", branch, repo)))?;
        Ok(BranchInfo {
            branch: Branch::new(repo, branch),
            head: record.head.as_ref().map(|h| Commit::new(repo, h.clone())),
            provenance: record.provenance.clone(),
        })
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .branches
            .remove(&(repo.to_string(), branch.to_string()))
            .ok_or_else(|| Error::Cafs(format!("branch {} not found in repo {}", branch, repo)))?;
        Ok(())
    }

    async fn start_commit(&self, repo: &str, branch: &str) -> Result<Commit> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.repos.contains(repo) {
            return Err(Error::Cafs(format!("repo {} not found", repo)));
        }
        let id = uuid::Uuid::new_v4().simple().to_string();

        let branch_key = (repo.to_string(), branch.to_string());
        let (parent, branch_provenance) = match inner.branches.get(&branch_key) {
            Some(record) => (record.head.clone(), record.provenance.clone()),
            None => (None, vec![]),
        };

        // Provenance: the current head of every provenance branch
        let mut provenance = Vec::new();
        for prov_branch in &branch_provenance {
            let head = inner
                .branches
                .get(&(prov_branch.repo.clone(), prov_branch.name.clone()))
                .and_then(|b| b.head.clone());
            if let Some(head) = head {
                provenance.push(CommitProvenance {
                    commit: Commit::new(&prov_branch.repo, head),
                    branch: prov_branch.clone(),
                });
            }
        }

        let files = parent
            .as_ref()
            .and_then(|p| inner.commits.get(&(repo.to_string(), p.clone())))
            .map(|c| c.files.clone())
            .unwrap_or_default();

        inner.sequence += 1;
        let sequence = inner.sequence;
        inner.commits.insert(
            (repo.to_string(), id.clone()),
            CommitRecord {
                started: chrono::Utc::now(),
                finished: None,
                parent,
                provenance,
                files,
                tree: None,
                sequence,
            },
        );
        inner
            .branches
            .entry(branch_key)
            .or_default()
            .head = Some(id.clone());
        Ok(Commit::new(repo, id))
    }

    async fn finish_commit(&self, repo: &str, commit: &str, empty: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let mut new_objects: Vec<(String, Vec<u8>)> = Vec::new();
        let record = inner
            .commits
            .get_mut(&(repo.to_string(), id.clone()))
            .ok_or_else(|| Error::Cafs(format!("commit {} not found in repo {}", id, repo)))?;
        if record.finished.is_some() {
            return Err(Error::Cafs(format!("commit {} is already finished", id)));
        }
        record.finished = Some(chrono::Utc::now());
        if empty {
            record.files.clear();
            record.tree = None;
        } else {
            let mut tree = HashTree::default();
            for (path, content) in &record.files {
                let hash = hex_digest(content);
                new_objects.push((hash.clone(), content.clone()));
                tree.files.insert(
                    path.clone(),
                    sluice_core::domain::cafs::FileNode {
                        objects: vec![hash],
                    },
                );
            }
            let tree_bytes = serde_json::to_vec(&tree)?;
            let tree_hash = hex_digest(&tree_bytes);
            new_objects.push((tree_hash.clone(), tree_bytes));
            record.tree = Some(tree_hash);
        }
        for (hash, data) in new_objects {
            inner.objects.insert(hash, data);
        }
        Ok(())
    }

    async fn inspect_commit(&self, repo: &str, commit: &str) -> Result<CommitInfo> {
        let inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner.commit(repo, &id)?;
        Ok(CommitInfo {
            commit: Commit::new(repo, id),
            started: record.started,
            finished: record.finished,
            provenance: record.provenance.clone(),
            tree: record.tree.clone(),
        })
    }

    async fn list_commits(&self, repo: &str, to: Option<&str>) -> Result<Vec<CommitInfo>> {
        let inner = self.inner.lock().unwrap();
        if !inner.repos.contains(repo) {
            return Err(Error::Cafs(format!("repo {} not found", repo)));
        }
        if let Some(to) = to {
            inner.resolve(repo, to)?;
        }
        let mut infos: Vec<(u64, CommitInfo)> = inner
            .commits
            .iter()
            .filter(|((r, _), _)| r == repo)
            .map(|((_, id), record)| {
                (
                    record.sequence,
                    CommitInfo {
                        commit: Commit::new(repo, id.clone()),
                        started: record.started,
                        finished: record.finished,
                        provenance: record.provenance.clone(),
                        tree: record.tree.clone(),
                    },
                )
            })
            .collect();
        infos.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(infos.into_iter().map(|(_, info)| info).collect())
    }

    async fn delete_commit(&self, repo: &str, commit: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let parent = inner
            .commits
            .remove(&(repo.to_string(), id.clone()))
            .and_then(|record| record.parent);
        for record in inner.branches.values_mut() {
            if record.head.as_deref() == Some(id.as_str()) {
                record.head = parent.clone();
            }
        }
        Ok(())
    }

    async fn put_file(&self, repo: &str, commit: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner
            .commits
            .get_mut(&(repo.to_string(), id.clone()))
            .ok_or_else(|| Error::Cafs(format!("commit {} not found in repo {}", id, repo)))?;
        if record.finished.is_some() {
            return Err(Error::Cafs(format!("commit {} is already finished", id)));
        }
        record.files.entry(path.to_string()).or_default().extend(data);
        Ok(())
    }

    async fn get_file(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner.commit(repo, &id)?;
        record
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Cafs(format!("file {} not found in commit {}", path, id)))
    }

    async fn delete_file(&self, repo: &str, commit: &str, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner
            .commits
            .get_mut(&(repo.to_string(), id.clone()))
            .ok_or_else(|| Error::Cafs(format!("commit {} not found in repo {}", id, repo)))?;
        record
            .files
            .remove(path)
            .ok_or_else(|| Error::Cafs(format!("file {} not found in commit {}", path, id)))?;
        Ok(())
    }

    async fn inspect_file(&self, repo: &str, commit: &str, path: &str) -> Result<FileInfo> {
        let inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner.commit(repo, &id)?;
        info_at(&Commit::new(repo, id.clone()), &record.files, path)
            .ok_or_else(|| Error::Cafs(format!("file {} not found in commit {}", path, id)))
    }

    async fn list_files(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<FileInfo>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner.commit(repo, &id)?;
        let commit = Commit::new(repo, id);
        let dir = if path.is_empty() { "/" } else { path };
        Ok(child_names(&record.files, dir)
            .into_iter()
            .filter_map(|name| {
                let child = if dir == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", dir, name)
                };
                info_at(&commit, &record.files, &child)
            })
            .collect())
    }

    async fn glob_file(&self, repo: &str, commit: &str, pattern: &str) -> Result<Vec<FileInfo>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.resolve(repo, commit)?;
        let record = inner.commit(repo, &id)?;
        let commit = Commit::new(repo, id);
        Ok(all_paths(&record.files)
            .into_iter()
            .filter(|path| glob_matches(pattern, path))
            .filter_map(|path| info_at(&commit, &record.files, &path))
            .collect())
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.objects.keys().cloned().collect())
    }

    async fn get_object(&self, hash: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::Cafs(format!("object {} not found", hash)))
    }

    async fn delete_objects(&self, hashes: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for hash in hashes {
            inner.objects.remove(hash);
        }
        Ok(())
    }

    async fn list_tags(&self, prefix: Option<&str>, include_object: bool) -> Result<Vec<TagInfo>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tags
            .iter()
            .filter(|(tag, _)| prefix.map(|p| tag.starts_with(p)).unwrap_or(true))
            .map(|(tag, object)| TagInfo {
                tag: tag.clone(),
                object: include_object.then(|| object.clone()),
            })
            .collect())
    }

    async fn delete_tags(&self, tags: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for tag in tags {
            inner.tags.remove(tag);
        }
        Ok(())
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Clone)]
pub struct MemoryAuth {
    inner: Arc<Mutex<AuthInner>>,
}

struct AuthInner {
    activated: bool,
    current: String,
    admins: HashSet<String>,
    acls: HashMap<String, HashMap<String, Scope>>,
    tokens: HashSet<String>,
    next_token: u64,
}

impl MemoryAuth {
    /// Auth switched off cluster-wide: every probe reports NotActivated
    pub fn deactivated() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuthInner {
                activated: false,
                current: String::new(),
                admins: HashSet::new(),
                acls: HashMap::new(),
                tokens: HashSet::new(),
                next_token: 0,
            })),
        }
    }

    pub fn activated(user: &str) -> Self {
        let auth = Self::deactivated();
        {
            let mut inner = auth.inner.lock().unwrap();
            inner.activated = true;
            inner.current = user.to_string();
        }
        auth
    }

    pub fn grant(&self, repo: &str, user: &str, scope: Scope) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .acls
            .entry(repo.to_string())
            .or_default()
            .insert(user.to_string(), scope);
    }

    pub fn make_admin(&self, user: &str) {
        self.inner.lock().unwrap().admins.insert(user.to_string());
    }

    pub fn is_token_live(&self, token: &str) -> bool {
        self.inner.lock().unwrap().tokens.contains(token)
    }
}

#[async_trait]
impl AuthClient for MemoryAuth {
    async fn who_am_i(&self) -> Result<WhoAmI> {
        let inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(Error::AuthNotActivated);
        }
        Ok(WhoAmI {
            username: inner.current.clone(),
            is_admin: inner.admins.contains(&inner.current),
        })
    }

    async fn authorize(&self, repo: &str, scope: Scope) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(Error::AuthNotActivated);
        }
        if inner.admins.contains(&inner.current) {
            return Ok(true);
        }
        let held = inner
            .acls
            .get(repo)
            .and_then(|users| users.get(&inner.current))
            .copied()
            .unwrap_or(Scope::None);
        Ok(held >= scope)
    }

    async fn get_capability(&self) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(Error::AuthNotActivated);
        }
        inner.next_token += 1;
        let token = format!("cap-{}-{}", inner.current, inner.next_token);
        inner.tokens.insert(token.clone());
        Ok(token)
    }

    async fn revoke_auth_token(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(Error::AuthNotActivated);
        }
        inner.tokens.remove(token);
        Ok(())
    }
}

// =============================================================================
// COR
// =============================================================================

#[derive(Default, Clone)]
pub struct MemoryKube {
    inner: Arc<Mutex<KubeInner>>,
}

#[derive(Default)]
struct KubeInner {
    nodes: Vec<String>,
    pods: Vec<PodRecord>,
    services: HashMap<String, ServiceIngress>,
    rcs: HashSet<String>,
}

struct PodRecord {
    pod: Pod,
    logs: Vec<String>,
    initializing: bool,
}

impl MemoryKube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, name: &str) {
        self.inner.lock().unwrap().nodes.push(name.to_string());
    }

    pub fn add_pod(&self, name: &str, labels: HashMap<String, String>, logs: Vec<String>) {
        self.inner.lock().unwrap().pods.push(PodRecord {
            pod: Pod {
                name: name.to_string(),
                labels,
            },
            logs,
            initializing: false,
        });
    }

    pub fn set_pod_initializing(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.pods.iter_mut().find(|p| p.pod.name == name) {
            record.initializing = true;
        }
    }

    pub fn set_service(&self, name: &str, ingress: ServiceIngress) {
        self.inner
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), ingress);
    }

    pub fn has_rc(&self, name: &str) -> bool {
        self.inner.lock().unwrap().rcs.contains(name)
    }
}

#[async_trait]
impl KubeClient for MemoryKube {
    async fn list_nodes(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().nodes.clone())
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pods
            .iter()
            .filter(|record| {
                selector
                    .iter()
                    .all(|(k, v)| record.pod.labels.get(k) == Some(v))
            })
            .map(|record| record.pod.clone())
            .collect())
    }

    async fn watch_pods(&self, _namespace: &str) -> Result<()> {
        Ok(())
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
        _follow: bool,
        tail: Option<i64>,
    ) -> Result<mpsc::UnboundedReceiver<String>> {
        let inner = self.inner.lock().unwrap();
        let record = inner
            .pods
            .iter()
            .find(|p| p.pod.name == pod)
            .ok_or_else(|| Error::TransientRpc(format!("pod {} not found", pod)))?;
        if record.initializing {
            return Err(Error::TransientRpc("PodInitializing".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let lines = match tail {
            Some(n) if n > 0 && (n as usize) < record.logs.len() => {
                record.logs[record.logs.len() - n as usize..].to_vec()
            }
            _ => record.logs.clone(),
        };
        for line in lines {
            let _ = tx.send(line);
        }
        Ok(rx)
    }

    async fn create_rc(
        &self,
        _namespace: &str,
        name: &str,
        _labels: &HashMap<String, String>,
        _image: &str,
        _command: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.rcs.insert(name.to_string()) {
            return Err(Error::Cafs(format!(
                "replication controller {} already exists",
                name
            )));
        }
        Ok(())
    }

    async fn delete_rc(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.rcs.remove(name) {
            return Err(Error::Cafs(format!(
                "replication controller {} not found",
                name
            )));
        }
        Ok(())
    }

    async fn get_service_ingress(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceIngress>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.services.get(name).cloned())
    }
}
