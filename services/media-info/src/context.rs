//! Per-request context passed to every pipeline step

use common::config::ServiceConfig;
use common::request_log::RequestLog;
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceError;

/// Identity and log destination of one probe request
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    log: RequestLog,
}

impl RequestContext {
    /// Start a new request, opening its log file when request logs are enabled
    pub async fn begin(config: &ServiceConfig) -> Self {
        let id = Uuid::new_v4();
        let log = if config.request_logs {
            RequestLog::create(&config.log_dir(), &id.to_string()).await
        } else {
            RequestLog::disabled()
        };

        Self { id, log }
    }

    /// A context that only reports to the process log
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            id: Uuid::new_v4(),
            log: RequestLog::disabled(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }

    /// Record a pipeline event in the process log and the request log
    pub async fn log(&self, message: &str) {
        info!(request_id = %self.id, "{}", message);
        self.log.append(message).await;
    }

    /// Record a terminal failure together with its server-side detail
    pub async fn log_failure(&self, error: &ServiceError) {
        let detail = error.detail();
        self.log.append_failure(
            error.status_code().as_u16(),
            &error.to_string(),
            detail.as_deref(),
        )
        .await;
    }
}
