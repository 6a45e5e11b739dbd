//! Downloads a remote media file into the temporary directory
//!
//! The file is owned by a [`DownloadedAsset`] guard from the moment it is
//! created, so every exit path (failed transfer, failed probe, expired request
//! budget, success) removes it exactly once.

use std::error::Error as _;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use common::config::ServiceConfig;
use common::request_log::RequestLog;
use reqwest::{Client, redirect::Policy};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::context::RequestContext;

/// Extension used when the URL path does not carry a usable one
const FALLBACK_EXTENSION: &str = "tmp";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid URL provided: {0}")]
    InvalidUrl(String),

    #[error("Failed to open temporary file for writing: {}", .path.display())]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download media file from: {0}")]
    Failed(DownloadFailure),
}

impl DownloadError {
    pub fn detail(&self) -> String {
        match self {
            DownloadError::TempFile { path, source } => {
                format!("{}: {}", path.display(), source)
            }
            other => other.to_string(),
        }
    }
}

/// Everything known about a transfer that did not produce a usable file
#[derive(Debug, Clone, Default)]
pub struct DownloadFailure {
    pub url: String,
    pub http_status: Option<u16>,
    /// Length announced by the server
    pub expected_bytes: Option<u64>,
    /// Bytes received from the transport
    pub received_bytes: u64,
    /// Size of the file on disk, if it exists
    pub disk_bytes: Option<u64>,
    pub transport_error: Option<String>,
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        let disk = self
            .disk_bytes
            .map(|b| b.to_string())
            .unwrap_or_else(|| "missing".to_string());
        let expected = self
            .expected_bytes
            .map(|b| b.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        write!(
            f,
            "{} (HTTP: {}, Size: (Disk: {} / Received: {} / Header: {})",
            self.url, status, disk, self.received_bytes, expected
        )?;
        if let Some(error) = &self.transport_error {
            write!(f, ", Error: {}", error)?;
        }
        write!(f, ")")
    }
}

/// A downloaded file, removed from disk when dropped
#[derive(Debug)]
pub struct DownloadedAsset {
    local_path: PathBuf,
    originating_url: String,
    log: RequestLog,
}

impl DownloadedAsset {
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn originating_url(&self) -> &str {
        &self.originating_url
    }

    /// Basename of the local file
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Drop for DownloadedAsset {
    fn drop(&mut self) {
        self.log
            .append_blocking(&format!("Cleaning up temp file: {}", self.local_path.display()));
        match std::fs::remove_file(&self.local_path) {
            Ok(()) => debug!("Removed temp file {}", self.local_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temp file {}: {}",
                self.local_path.display(),
                e
            ),
        }
    }
}

#[derive(Clone)]
pub struct Downloader {
    client: Client,
    temp_dir: PathBuf,
}

impl Downloader {
    /// Build the HTTP client with the configured redirect and timeout policy.
    /// Certificate and hostname verification stay enabled.
    pub fn new(config: &ServiceConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .connect_timeout(config.connect_timeout())
            .timeout(config.download_timeout())
            .user_agent(concat!("media-info/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            temp_dir: config.temp_dir.clone(),
        })
    }

    /// Stream `url` into a fresh file under the temp directory
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        url: &Url,
    ) -> Result<DownloadedAsset, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        ctx.log(&format!("Downloading media file from {}", url)).await;

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|source| DownloadError::TempFile {
                path: self.temp_dir.clone(),
                source,
            })?;

        let file_name = format!("{}.{}", temp_file_base("media"), extension_from_url(url));
        let local_path = self.temp_dir.join(file_name);
        let mut file = create_exclusive(&local_path).await?;

        let asset = DownloadedAsset {
            local_path,
            originating_url: url.to_string(),
            log: ctx.request_log().clone(),
        };

        let mut failure = DownloadFailure {
            url: url.to_string(),
            ..Default::default()
        };

        if let Err(e) = self.transfer(url, &mut file, &mut failure).await {
            failure.transport_error = Some(e);
        }
        if let Err(e) = file.flush().await {
            failure.transport_error.get_or_insert_with(|| e.to_string());
        }
        drop(file);

        failure.disk_bytes = tokio::fs::metadata(asset.local_path())
            .await
            .ok()
            .map(|m| m.len());

        let failed = failure.transport_error.is_some()
            || failure.http_status.is_some_and(|s| s >= 400)
            || failure.disk_bytes.unwrap_or(0) == 0;
        if failed {
            // dropping `asset` removes the partial file
            return Err(DownloadError::Failed(failure));
        }

        ctx.log(&format!(
            "Media file download complete: {} ({} bytes)",
            asset.local_path().display(),
            failure.disk_bytes.unwrap_or(0)
        ))
        .await;

        Ok(asset)
    }

    async fn transfer(
        &self,
        url: &Url,
        file: &mut File,
        failure: &mut DownloadFailure,
    ) -> Result<(), String> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| describe_reqwest_error(&e))?;

        let status = response.status();
        failure.http_status = Some(status.as_u16());
        failure.expected_bytes = response.content_length();

        if status.is_client_error() || status.is_server_error() {
            return Err(format!("The requested URL returned error: {}", status));
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| describe_reqwest_error(&e))?
        {
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            failure.received_bytes += chunk.len() as u64;
        }

        Ok(())
    }
}

/// Create `path` for writing, failing if it already exists
async fn create_exclusive(path: &Path) -> Result<File, DownloadError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|source| DownloadError::TempFile {
            path: path.to_path_buf(),
            source,
        })
}

fn describe_reqwest_error(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Lower-cased extension of the last URL path segment, or `tmp`
pub fn extension_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// `<prefix>_<unix seconds>_<8 random hex chars>`
pub fn temp_file_base(prefix: &str) -> String {
    let safe_prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!(
        "{}_{}_{:08x}",
        safe_prefix,
        Utc::now().timestamp(),
        rand::random::<u32>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    fn test_config(temp_dir: &Path) -> ServiceConfig {
        ServiceConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ffprobe_path: PathBuf::from("/usr/bin/ffprobe"),
            temp_dir: temp_dir.to_path_buf(),
            max_processing_secs: 30,
            connect_timeout_secs: 5,
            download_timeout_secs: 10,
            max_redirects: 10,
            request_logs: false,
            include_raw_output: false,
        }
    }

    async fn spawn_origin() -> String {
        let app = Router::new()
            .route("/clip.mp4", get(|| async { vec![0u8; 4096] }))
            .route("/empty.mp4", get(|| async { Vec::<u8>::new() }))
            .route(
                "/missing.mp4",
                get(|| async { (StatusCode::NOT_FOUND, "not found") }),
            )
            .route(
                "/moved",
                get(|| async { axum::response::Redirect::temporary("/clip.mp4") }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_extension_from_url() {
        let ext = |s: &str| extension_from_url(&Url::parse(s).unwrap());

        assert_eq!(ext("https://example.com/clip.MP4"), "mp4");
        assert_eq!(ext("https://example.com/a/b/song.flac?x=1#t"), "flac");
        assert_eq!(ext("https://example.com/stream"), "tmp");
        assert_eq!(ext("https://example.com/"), "tmp");
        assert_eq!(ext("https://example.com/.hidden"), "tmp");
        assert_eq!(ext("https://example.com/clip.m%20p4"), "tmp");
    }

    #[test]
    fn test_temp_file_base_is_unique() {
        let a = temp_file_base("media");
        let b = temp_file_base("media");
        assert!(a.starts_with("media_"));
        assert_eq!(a.rsplit('_').next().unwrap().len(), 8);
        assert_ne!(a, b);
        assert!(temp_file_base("../evil").starts_with("evil_"));
    }

    #[tokio::test]
    async fn test_create_exclusive_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media_1700000000_0badf00d.mp4");
        std::fs::write(&path, b"first request").unwrap();

        let err = create_exclusive(&path).await.unwrap_err();
        assert!(matches!(err, DownloadError::TempFile { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"first request");

        let fresh = dir.path().join("media_1700000000_00c0ffee.mp4");
        assert!(create_exclusive(&fresh).await.is_ok());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_fetch_downloads_file_and_cleans_up_on_drop() {
        let origin = spawn_origin().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();
        let ctx = RequestContext::detached();

        let url = Url::parse(&format!("{}/clip.mp4", origin)).unwrap();
        let asset = downloader.fetch(&ctx, &url).await.expect("download succeeds");

        assert!(asset.file_name().starts_with("media_"));
        assert!(asset.file_name().ends_with(".mp4"));
        assert_eq!(asset.originating_url(), url.as_str());
        assert_eq!(std::fs::metadata(asset.local_path()).unwrap().len(), 4096);

        let path = asset.local_path().to_path_buf();
        drop(asset);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let origin = spawn_origin().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();

        let url = Url::parse(&format!("{}/moved", origin)).unwrap();
        let asset = downloader
            .fetch(&RequestContext::detached(), &url)
            .await
            .expect("redirect is followed");
        assert!(asset.file_name().ends_with(".tmp"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_leaves_no_file() {
        let origin = spawn_origin().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();

        let url = Url::parse(&format!("{}/missing.mp4", origin)).unwrap();
        let err = downloader
            .fetch(&RequestContext::detached(), &url)
            .await
            .unwrap_err();

        match &err {
            DownloadError::Failed(failure) => {
                assert_eq!(failure.http_status, Some(404));
                assert_eq!(failure.received_bytes, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("Failed to download media file from:"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_a_failure() {
        let origin = spawn_origin().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();

        let url = Url::parse(&format!("{}/empty.mp4", origin)).unwrap();
        let err = downloader
            .fetch(&RequestContext::detached(), &url)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Failed(ref f) if f.http_status == Some(200)));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_reports_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();

        // Bind then drop a listener so the port is very likely closed.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let url = Url::parse(&format!("http://{}/clip.mp4", addr)).unwrap();
        let err = downloader
            .fetch(&RequestContext::detached(), &url)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Failed(ref f) if f.transport_error.is_some() && f.http_status.is_none()));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(&test_config(dir.path())).unwrap();

        let url = Url::parse("ftp://example.com/clip.mp4").unwrap();
        let err = downloader
            .fetch(&RequestContext::detached(), &url)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::InvalidUrl(_)));
        assert!(dir_entries(dir.path()).is_empty());
    }
}
