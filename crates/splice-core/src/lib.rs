//! splice-core: shared types, IDs, errors, configuration and the job input
//! shape.
//!
//! This crate is the foundational dependency for the other splice-* crates,
//! providing type-safe identifiers, a unified error type, the media domain
//! (tracks, clips, markers) and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;
pub mod request;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
pub use request::{JobSpec, SegmentSpec};
