//! Per-request diagnostic log files
//!
//! Each probe request gets its own file under the configured log directory.
//! Writes are best effort: a log file that cannot be written never fails the
//! request, it only produces a warning on the process log.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Longest detail text kept in a single log entry
pub const MAX_DETAIL_CHARS: usize = 2048;

/// Log file dedicated to a single request
#[derive(Debug, Clone)]
pub struct RequestLog {
    path: Option<PathBuf>,
}

impl RequestLog {
    /// Create a log file named after the current time and the request id
    ///
    /// The directory is created when missing. If that fails the returned log
    /// silently discards its entries.
    pub async fn create(log_dir: &Path, request_id: &str) -> Self {
        if let Err(e) = fs::create_dir_all(log_dir).await {
            warn!("Failed to create log directory {}: {}", log_dir.display(), e);
            return Self::disabled();
        }

        let short_id: String = request_id.chars().take(8).collect();
        let file_name = format!(
            "media_info_{}_{}.log",
            Local::now().format("%Y%m%d_%H%M%S"),
            short_id
        );

        Self {
            path: Some(log_dir.join(file_name)),
        }
    }

    /// A log that writes nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a timestamped line
    pub async fn append(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let line = timestamped(message);
        let result = match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(mut file) => match file.write_all(line.as_bytes()).await {
                // tokio buffers the write; flush so the line is on disk before returning
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!("Failed to write request log {}: {}", path.display(), e);
        }
    }

    /// Synchronous [`append`](Self::append) for `Drop` impls, which cannot await
    pub fn append_blocking(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(timestamped(message).as_bytes()));

        if let Err(e) = result {
            warn!("Failed to write request log {}: {}", path.display(), e);
        }
    }

    /// Append a failure entry followed by its (truncated) diagnostic detail
    pub async fn append_failure(&self, status: u16, message: &str, detail: Option<&str>) {
        let mut entry = format!("Error (HTTP {}): {}", status, message);
        if let Some(detail) = detail.filter(|d| !d.is_empty()) {
            entry.push_str("\nContext/Details:\n");
            entry.push_str(&truncate_for_log(detail, MAX_DETAIL_CHARS));
        }
        self.append(&entry).await;
    }
}

fn timestamped(message: &str) -> String {
    format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}... (truncated)", &text[..byte_index]),
        None => text.to_string(),
    }
}
