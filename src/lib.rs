pub mod api;
pub mod config;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod progress;
pub mod store;
