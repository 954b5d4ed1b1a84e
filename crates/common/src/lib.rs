//! Shared types, config, and error definitions for the AQI dashboard.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, FieldIssue};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
