//! Business logic
//!
//! One module per concern: validation/defaulting, the auth mediator,
//! the pipeline and job stores, the datum view, the log aggregator, the
//! garbage collector and the COR adapter.

pub mod auth;
pub mod datum;
pub mod gc;
pub mod job;
pub mod kube;
pub mod log;
pub mod pipeline;
pub mod validate;
