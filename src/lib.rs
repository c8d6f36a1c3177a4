//! Sentient Race service library
//!
//! Avatar proxy (handle → profile image with tiered fallbacks and HTTP
//! caching) and the race leaderboard, served over one axum router.

pub mod avatar;
pub mod cli;
pub mod config;
pub mod leaderboard;
pub mod logging;
pub mod server;
