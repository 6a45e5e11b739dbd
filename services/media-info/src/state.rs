//! Application state shared across handlers

use std::sync::Arc;

use common::config::ServiceConfig;

use crate::{downloader::Downloader, prober::Prober};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub downloader: Downloader,
    pub prober: Prober,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> reqwest::Result<Self> {
        let downloader = Downloader::new(&config)?;
        let prober = Prober::new(config.ffprobe_path.clone());

        Ok(Self {
            config: Arc::new(config),
            downloader,
            prober,
        })
    }
}
