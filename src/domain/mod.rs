//! Domain layer types and invariants.

pub mod error;
pub mod reviews;
pub mod snapshot;
pub mod types;
