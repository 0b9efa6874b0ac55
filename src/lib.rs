// Library interface for rust_manga_sync
// The binary and the integration tests both build on these modules

pub mod app_state;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod error;
pub mod helpers;
pub mod http_client;
pub mod limiter;
pub mod models;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod sync;
pub mod transport;
