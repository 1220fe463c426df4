//! DTOs for the control-plane API
//!
//! Request and response shapes exchanged with the orchestrator. Domain
//! types are reused directly where the wire shape matches.

pub mod datum;
pub mod job;
pub mod log;
pub mod pipeline;
