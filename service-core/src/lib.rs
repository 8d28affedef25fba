//! Plumbing every identity binary shares: listen address config, the
//! `AppError` response mapping, request middleware and telemetry setup.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::AppError;
