//! TX-KV collections
//!
//! All durable control-plane state is a pair of collections (`pipelines`
//! and `jobs`) plus a handful of scalar keys. State-bearing mutations go
//! through `Stm`, a read-set/write-buffer transaction that commits with
//! a multi-key compare-and-swap and is retried on conflict.

pub mod jobs;
pub mod pipelines;
pub mod stm;
