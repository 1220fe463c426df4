//! Software-transactional access to the TX-KV store
//!
//! A transaction records the revision of every key it reads and buffers
//! its writes. Commit applies the writes iff no read key moved. Bodies
//! must be deterministic and free of CAFS/COR I/O so the caller's retry
//! loop is safe:
//!
//! ```ignore
//! loop {
//!     let mut stm = Stm::new(kv);
//!     // reads and buffered writes
//!     if stm.commit().await? {
//!         break;
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::clients::kv::{KvStore, KvWrite};
use crate::error::Result;

pub struct Stm<'a> {
    kv: &'a dyn KvStore,
    /// Key -> (revision, value) as first observed
    reads: HashMap<String, (i64, Option<Vec<u8>>)>,
    /// Key -> buffered value (None = delete)
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> Stm<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self {
            kv,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    pub async fn get_raw(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        if let Some((_, value)) = self.reads.get(key) {
            return Ok(value.clone());
        }
        let entry = self.kv.get(key).await?;
        let (revision, value) = match entry {
            Some(e) => (e.revision, Some(e.value)),
            None => (0, None),
        };
        self.reads.insert(key.to_string(), (revision, value.clone()));
        Ok(value)
    }

    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_raw(&mut self, key: &str, value: Vec<u8>) {
        self.writes.insert(key.to_string(), Some(value));
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.put_raw(key, serde_json::to_vec(value)?);
        Ok(())
    }

    pub fn delete(&mut self, key: &str) {
        self.writes.insert(key.to_string(), None);
    }

    /// Commit the buffered writes. Returns false on conflict, in which
    /// case nothing was applied and the caller should rebuild and retry.
    pub async fn commit(self) -> Result<bool> {
        if self.writes.is_empty() {
            return Ok(true);
        }
        let reads: Vec<(String, i64)> = self
            .reads
            .iter()
            .map(|(key, (revision, _))| (key.clone(), *revision))
            .collect();
        let writes: Vec<KvWrite> = self
            .writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => KvWrite::Put { key, value },
                None => KvWrite::Delete { key },
            })
            .collect();
        self.kv.commit(&reads, &writes).await
    }
}
