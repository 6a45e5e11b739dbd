//! Service configuration
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional `config/media-info` file, then `MEDIA_INFO_*` environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};

/// Prefix shared by every environment variable the service reads
pub const ENV_PREFIX: &str = "MEDIA_INFO";

/// Configuration for the media information service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    /// Path to the ffprobe executable
    pub ffprobe_path: PathBuf,
    /// Root for downloaded files and the `logs` subdirectory
    pub temp_dir: PathBuf,
    /// Overall wall-clock budget for one probe request, download and analysis combined
    pub max_processing_secs: u64,
    /// Connect timeout for media downloads
    pub connect_timeout_secs: u64,
    /// Total transfer timeout for media downloads
    pub download_timeout_secs: u64,
    /// Maximum number of redirects followed by the downloader
    pub max_redirects: usize,
    /// Write one log file per request under `temp_dir/logs`
    pub request_logs: bool,
    /// Echo the decoded ffprobe document in successful responses
    pub include_raw_output: bool,
}

impl ServiceConfig {
    /// Create a new ServiceConfig from defaults, the optional config file and
    /// the environment
    ///
    /// # Environment Variables
    /// - `MEDIA_INFO_BIND_ADDRESS` (default: "0.0.0.0:8080")
    /// - `MEDIA_INFO_FFPROBE_PATH` (default: "/usr/bin/ffprobe")
    /// - `MEDIA_INFO_TEMP_DIR` (default: "<system temp>/media-info")
    /// - `MEDIA_INFO_MAX_PROCESSING_SECS` (default: 300)
    /// - `MEDIA_INFO_CONNECT_TIMEOUT_SECS` (default: 30)
    /// - `MEDIA_INFO_DOWNLOAD_TIMEOUT_SECS` (default: 240)
    /// - `MEDIA_INFO_MAX_REDIRECTS` (default: 10)
    /// - `MEDIA_INFO_REQUEST_LOGS` (default: true)
    /// - `MEDIA_INFO_INCLUDE_RAW_OUTPUT` (default: false)
    pub fn from_env() -> ConfigResult<Self> {
        let default_temp_dir = std::env::temp_dir().join("media-info");

        let settings = Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("ffprobe_path", "/usr/bin/ffprobe")?
            .set_default("temp_dir", default_temp_dir.to_string_lossy().into_owned())?
            .set_default("max_processing_secs", 300_i64)?
            .set_default("connect_timeout_secs", 30_i64)?
            .set_default("download_timeout_secs", 240_i64)?
            .set_default("max_redirects", 10_i64)?
            .set_default("request_logs", true)?
            .set_default("include_raw_output", false)?
            .add_source(File::with_name("config/media-info").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServiceConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            "Loaded configuration: ffprobe at {}, temp dir {}",
            config.ffprobe_path.display(),
            config.temp_dir.display()
        );

        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ffprobe_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ffprobe_path must not be empty".to_string()));
        }

        if self.temp_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("temp_dir must not be empty".to_string()));
        }

        if self.max_processing_secs == 0 {
            return Err(ConfigError::Invalid(
                "max_processing_secs must be greater than zero".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 || self.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "download timeouts must be greater than zero".to_string(),
            ));
        }

        if self.max_redirects == 0 {
            return Err(ConfigError::Invalid(
                "max_redirects must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn max_processing_time(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Directory holding the per-request log files
    pub fn log_dir(&self) -> PathBuf {
        self.temp_dir.join("logs")
    }
}
