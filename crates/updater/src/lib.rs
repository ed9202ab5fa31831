//! Runtime wiring for the updater binary: configuration, HTTP collaborators
//! and the health/metrics API.

pub mod api;
pub mod client;
pub mod config;
