//! Application services and the collaborator contracts they depend on.

pub mod coalesce;
pub mod error;
pub mod ids;
pub mod listing;
pub mod moderation;
pub mod repos;
pub mod reviews;
