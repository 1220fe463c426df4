//! CAFS client trait
//!
//! Repos, branches, commits, files, objects and tags. Commit arguments
//! accept either a commit ID or a branch name; implementations resolve
//! branch names to the branch HEAD.

use async_trait::async_trait;
use std::sync::Arc;

use sluice_core::domain::cafs::{BranchInfo, Branch, Commit, CommitInfo, FileInfo, TagInfo};

use crate::error::Result;

#[async_trait]
pub trait CafsClient: Send + Sync {
    /// A copy of this client that authenticates with `token` instead of
    /// the ambient credentials. Used for control-plane self-writes.
    fn with_token(&self, token: &str) -> Arc<dyn CafsClient>;

    // Repos
    async fn create_repo(&self, repo: &str) -> Result<()>;
    async fn inspect_repo(&self, repo: &str) -> Result<()>;
    async fn list_repos(&self) -> Result<Vec<String>>;
    async fn delete_repo(&self, repo: &str, force: bool) -> Result<()>;

    // Branches
    /// Create or reconfigure a branch. `head` (a commit ID or branch
    /// name) is resolved when given, otherwise the current head is kept.
    /// Provenance is replaced wholesale.
    async fn create_branch(
        &self,
        repo: &str,
        branch: &str,
        head: Option<&str>,
        provenance: &[Branch],
    ) -> Result<()>;
    async fn inspect_branch(&self, repo: &str, branch: &str) -> Result<BranchInfo>;
    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()>;

    // Commits
    async fn start_commit(&self, repo: &str, branch: &str) -> Result<Commit>;
    /// Close a commit. With `empty` the commit finishes with no tree,
    /// which is how hard-stop unblocks downstream readers.
    async fn finish_commit(&self, repo: &str, commit: &str, empty: bool) -> Result<()>;
    async fn inspect_commit(&self, repo: &str, commit: &str) -> Result<CommitInfo>;
    /// All commits in a repo, newest first, optionally bounded by `to`
    async fn list_commits(&self, repo: &str, to: Option<&str>) -> Result<Vec<CommitInfo>>;
    async fn delete_commit(&self, repo: &str, commit: &str) -> Result<()>;

    // Files
    /// Append `data` to the file at `path` (CAFS writes are appends;
    /// replace means delete-then-put)
    async fn put_file(&self, repo: &str, commit: &str, path: &str, data: Vec<u8>) -> Result<()>;
    async fn get_file(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<u8>>;
    async fn delete_file(&self, repo: &str, commit: &str, path: &str) -> Result<()>;
    async fn inspect_file(&self, repo: &str, commit: &str, path: &str) -> Result<FileInfo>;
    /// Direct children of `path`
    async fn list_files(&self, repo: &str, commit: &str, path: &str) -> Result<Vec<FileInfo>>;
    /// Entries matching a glob like "*/logs" or "/abc/job:*"
    async fn glob_file(&self, repo: &str, commit: &str, pattern: &str) -> Result<Vec<FileInfo>>;

    // Objects and tags
    async fn list_objects(&self) -> Result<Vec<String>>;
    async fn get_object(&self, hash: &str) -> Result<Vec<u8>>;
    async fn delete_objects(&self, hashes: &[String]) -> Result<()>;
    async fn list_tags(&self, prefix: Option<&str>, include_object: bool) -> Result<Vec<TagInfo>>;
    async fn delete_tags(&self, tags: &[String]) -> Result<()>;
}
