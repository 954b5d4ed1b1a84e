//! AQI dashboard backend: current conditions, station history, and the
//! dual-store write path behind an HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod fallback;
pub mod state;

pub use api::build_router;
pub use state::AppState;
