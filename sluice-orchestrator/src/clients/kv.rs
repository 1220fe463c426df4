//! TX-KV client trait
//!
//! An ordered key-value store with per-key watch and multi-key
//! compare-and-swap commits. All cross-task consistency in the control
//! plane goes through this interface.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// A key-value entry with the revision of its last modification
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: i64,
}

/// One buffered write applied by a commit
#[derive(Debug, Clone)]
pub enum KvWrite {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// An event on a watched key
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put(KvEntry),
    Delete(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>>;

    /// All entries whose key starts with `prefix`, in key order
    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>>;

    /// Unconditional write, for keys with no cross-key invariants
    /// (e.g. the GC generation counter and worker cancellation records)
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Apply `writes` atomically iff every key in `reads` still has the
    /// recorded modification revision (0 for a key read as absent).
    /// Returns false without applying anything on conflict.
    async fn commit(&self, reads: &[(String, i64)], writes: &[KvWrite]) -> Result<bool>;

    /// Watch a single key. The current value, if any, is delivered as the
    /// first event; later events preserve per-key order. The channel
    /// closing without a delete means the watch ended.
    async fn watch(&self, key: &str) -> Result<mpsc::UnboundedReceiver<WatchEvent>>;
}
