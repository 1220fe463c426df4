//! CAFS value types
//!
//! Plain data shared with the content-addressed file system. The CAFS
//! service itself is external; these are the shapes that cross its wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A commit in a CAFS repo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub repo: String,
    pub id: String,
}

impl Commit {
    pub fn new(repo: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            id: id.into(),
        }
    }
}

/// A branch in a CAFS repo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub repo: String,
    pub name: String,
}

impl Branch {
    pub fn new(repo: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            name: name.into(),
        }
    }
}

/// One provenance edge of a commit: the upstream commit and the branch it
/// was the head of when this commit was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitProvenance {
    pub commit: Commit,
    pub branch: Branch,
}

/// Commit metadata as reported by CAFS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub commit: Commit,
    pub started: chrono::DateTime<chrono::Utc>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub provenance: Vec<CommitProvenance>,
    /// Hash of the commit's tree object, absent for open commits
    #[serde(default)]
    pub tree: Option<String>,
}

/// Branch metadata as reported by CAFS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub branch: Branch,
    pub head: Option<Commit>,
    #[serde(default)]
    pub provenance: Vec<Branch>,
}

/// A file (or directory) within a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub commit: Commit,
    pub path: String,
}

/// File metadata as reported by list/glob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file: File,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Base names of direct children, for directory entries
    #[serde(default)]
    pub children: Vec<String>,
}

/// A tag pointing at an object, as reported by list-tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag: String,
    /// Resolved object hash, present when the listing requested it
    #[serde(default)]
    pub object: Option<String>,
}

/// The wire format of a commit's tree object: every file node lists the
/// content objects that back it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashTree {
    pub files: BTreeMap<String, FileNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileNode {
    pub objects: Vec<String>,
}

impl HashTree {
    /// Walk every file node, yielding the object hashes it references
    pub fn walk_objects(&self, mut f: impl FnMut(&str)) {
        for node in self.files.values() {
            for object in &node.objects {
                f(object);
            }
        }
    }
}
