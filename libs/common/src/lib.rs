//! Common library for the media information service
//!
//! This crate provides the ambient pieces the service builds on:
//! configuration loading, configuration errors and per-request log files.

pub mod config;
pub mod error;
pub mod request_log;

/// Example usage of the configuration module
///
/// ```rust,no_run
/// use common::config::ServiceConfig;
/// use common::request_log::RequestLog;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServiceConfig::from_env()?;
///     let log = RequestLog::create(&config.log_dir(), "example-request").await;
///     log.append("Configuration loaded").await;
///     Ok(())
/// }
/// ```
pub fn example_usage() {}
