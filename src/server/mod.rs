//! Server module
//!
//! HTTP routes and the metrics registry.

pub mod http;
pub mod metrics;

pub use http::{build_router, serve, AppState, ServerError};
