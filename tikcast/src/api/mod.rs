//! HTTP API.
//!
//! A thin polling surface over the ingestion service: one snapshot endpoint
//! plus a health check.

pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
