//! Infrastructure adapters and runtime bootstrap.

pub mod cache;
pub mod db;
pub mod error;
pub mod http;
mod lock;
pub mod search;
pub mod snowflake;
pub mod telemetry;
