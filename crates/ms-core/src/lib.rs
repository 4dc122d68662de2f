//! ms-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other ms-* crates,
//! providing type-safe identifiers, a unified error type, job and media
//! domain types, application configuration, and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::{JobPayload, JobStatus, JobType};
pub use media::*;
