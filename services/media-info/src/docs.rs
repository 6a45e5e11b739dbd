//! Status and usage documentation served on `GET /`
//!
//! Gathers a capability report (ffprobe, HTTP client, temp directory) and
//! renders it together with the API documentation as a single HTML page.
//! Nothing here downloads or probes media.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use common::config::ServiceConfig;
use serde_json::json;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// How long `ffprobe -version` may take before its status is reported unknown
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Public test video used in the curl example
const EXAMPLE_MEDIA_URL: &str = "https://www.w3schools.com/html/mov_bbb.mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Installed { version: String },
    NotFound,
    Unknown { detail: String },
}

impl ToolStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolStatus::Installed { .. })
    }
}

/// What the service needs at runtime and whether it is there
#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub ffprobe_path: PathBuf,
    pub ffprobe: ToolStatus,
    pub http_client: ToolStatus,
    pub temp_dir: PathBuf,
    pub temp_dir_writable: bool,
    pub max_processing_secs: u64,
    pub download_timeout_secs: u64,
}

impl CapabilityReport {
    pub async fn gather(config: &ServiceConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            ffprobe: check_ffprobe(&config.ffprobe_path).await,
            http_client: ToolStatus::Installed {
                version: "reqwest (built in, TLS verification enabled)".to_string(),
            },
            temp_dir: config.temp_dir.clone(),
            temp_dir_writable: check_temp_dir(&config.temp_dir).await,
            max_processing_secs: config.max_processing_secs,
            download_timeout_secs: config.download_timeout_secs,
        }
    }

    pub fn all_ok(&self) -> bool {
        self.ffprobe.is_ok() && self.http_client.is_ok() && self.temp_dir_writable
    }
}

/// Run `ffprobe -version` and classify the result
pub async fn check_ffprobe(ffprobe_path: &Path) -> ToolStatus {
    let run = Command::new(ffprobe_path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match timeout(VERSION_CHECK_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => return ToolStatus::NotFound,
        Ok(Err(e)) => {
            return ToolStatus::Unknown {
                detail: format!("failed to run: {}", e),
            };
        }
        Err(_) => {
            return ToolStatus::Unknown {
                detail: format!("no answer within {}s", VERSION_CHECK_TIMEOUT.as_secs()),
            };
        }
    };

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    classify_version_output(output.status.code(), &text)
}

fn classify_version_output(exit_code: Option<i32>, text: &str) -> ToolStatus {
    let lowered = text.to_lowercase();

    if exit_code == Some(0) && lowered.contains("ffprobe version") {
        let version = text.lines().next().unwrap_or_default().trim().to_string();
        return ToolStatus::Installed { version };
    }

    if exit_code == Some(127)
        || lowered.contains("no such file")
        || lowered.contains("not found")
    {
        return ToolStatus::NotFound;
    }

    let excerpt: String = text.trim().chars().take(100).collect();
    ToolStatus::Unknown {
        detail: format!(
            "command failed or output unexpected. RC: {}, Output: {}...",
            exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            excerpt
        ),
    }
}

/// Create the directory if needed and try to write a scratch file into it
pub async fn check_temp_dir(temp_dir: &Path) -> bool {
    if let Err(e) = tokio::fs::create_dir_all(temp_dir).await {
        warn!("Failed to create temp directory {}: {}", temp_dir.display(), e);
        return false;
    }

    let dir = temp_dir.to_path_buf();
    let probe = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(".write_check")
            .tempfile_in(&dir)
            .map(drop)
    })
    .await;

    match probe {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Temp directory {} is not writable: {}", temp_dir.display(), e);
            false
        }
        Err(e) => {
            warn!("Temp directory check did not complete: {}", e);
            false
        }
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn status_item(label: &str, ok: bool, text: &str) -> String {
    let (class, icon) = if ok { ("success", "&#9989;") } else { ("error", "&#10060;") };
    format!(
        "<li class=\"{}\"><span class=\"status-icon\">{}</span><strong>{}:</strong> {}</li>",
        class,
        icon,
        escape_html(label),
        escape_html(text)
    )
}

fn describe_tool(status: &ToolStatus, path: Option<&Path>) -> String {
    match status {
        ToolStatus::Installed { version } => format!("Installed ({})", version),
        ToolStatus::NotFound => match path {
            Some(path) => format!(
                "Not Found (path '{}' incorrect, or the tool is not installed/accessible)",
                path.display()
            ),
            None => "Not Found".to_string(),
        },
        ToolStatus::Unknown { detail } => format!("Unknown Status ({})", detail),
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Render the documentation page
///
/// `endpoint` is the absolute URL clients should POST to.
pub fn render_page(report: &CapabilityReport, endpoint: &str) -> String {
    let ffprobe_path = report.ffprobe_path.display().to_string();

    let status_items = [
        status_item("FFprobe Path Configured", true, &ffprobe_path),
        status_item(
            "FFprobe Status",
            report.ffprobe.is_ok(),
            &describe_tool(&report.ffprobe, Some(&report.ffprobe_path)),
        ),
        status_item(
            "HTTP Client",
            report.http_client.is_ok(),
            &describe_tool(&report.http_client, None),
        ),
        status_item(
            "Temp Dir",
            report.temp_dir_writable,
            &format!(
                "{} ({})",
                report.temp_dir.display(),
                if report.temp_dir_writable { "Writable" } else { "Not Writable" }
            ),
        ),
    ]
    .join("\n");

    let action_required = if report.all_ok() {
        String::new()
    } else {
        "<p class=\"error note\"><strong>Action Required:</strong> Please address the items \
         marked above. Ensure FFprobe is installed and accessible at the configured path and \
         that the temp directory is writable. Check the service log for details.</p>"
            .to_string()
    };

    let request_example = pretty(&json!({
        "media_url": "https://example.com/path/to/your/media.mp4_or_audio.mp3"
    }));
    let success_example = pretty(&json!({
        "filename": "media_1700000000_0badf00d.mp4",
        "size_bytes": 1234567,
        "duration_seconds": 120.53,
        "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
        "format_long_name": "QuickTime / MOV",
        "bit_rate_bps": 819200,
        "video_stream": {
            "codec_name": "h264",
            "codec_long_name": "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10",
            "profile": "High",
            "width": 1920,
            "height": 1080,
            "display_aspect_ratio": "16:9",
            "frame_rate": "30000/1001",
            "bit_rate_bps": 750000,
            "pixel_format": "yuv420p",
            "tags": {"rotate": "90"}
        },
        "audio_stream": {
            "codec_name": "aac",
            "codec_long_name": "AAC (Advanced Audio Coding)",
            "sample_rate_hz": 48000,
            "channels": 2,
            "channel_layout": "stereo",
            "bit_rate_bps": 128000,
            "tags": null
        }
    }));
    let error_example = pretty(&json!({ "error": "Concise error message." }));
    let curl_command = format!(
        "curl -X POST '{}' \\\n  -H \"Content-Type: application/json\" \\\n  -d '{}'",
        endpoint,
        json!({ "media_url": EXAMPLE_MEDIA_URL })
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Media File Information API</title>
    <style>
        body {{ font-family: sans-serif; background-color: #f3f4f6; margin: 0; color: #333; line-height: 1.6; }}
        h1 {{ background-color: #10b981; color: white; padding: 20px; text-align: center; margin: 0; font-weight: 500; }}
        div.container {{ padding: 20px 30px 40px 30px; margin: 30px auto; max-width: 900px; background: white; border-radius: 10px; }}
        h2 {{ border-bottom: 2px solid #e5e7eb; padding-bottom: 10px; margin-top: 30px; color: #059669; font-weight: 500; }}
        pre, code {{ background-color: #f0fdf4; padding: 12px 15px; border: 1px solid #d1fae5; border-radius: 5px; display: block; white-space: pre-wrap; word-wrap: break-word; }}
        .note {{ background-color: #fffbeb; border-left: 4px solid #f59e0b; padding: 12px 15px; margin: 20px 0; }}
        .error {{ color: #dc2626; font-weight: bold; }}
        .success {{ color: #059669; font-weight: bold; }}
        .status-list li {{ list-style-type: none; margin-bottom: 5px; }}
        .status-icon {{ display: inline-block; width: 24px; }}
    </style>
</head>
<body>
    <h1>Media File Information API</h1>
    <div class="container">
        <p>This API downloads a media file (audio or video) from a URL, analyses it with FFprobe and returns its container and stream details. Input is a <strong>JSON payload</strong>.</p>
        <p class="note"><strong>Logging:</strong> each request writes a log file (e.g. <code>media_info_&lt;timestamp&gt;.log</code>) into the <code>logs</code> folder of the temp directory. Check it for full FFprobe error details.</p>

        <h2>Server Status</h2>
        <ul class="status-list" id="server-status">
{status_items}
        </ul>
        {action_required}

        <h2>API Usage</h2>
        <h3>Endpoint</h3>
        <code>{endpoint}</code>
        <h3>HTTP Method</h3>
        <code>POST</code>
        <h3>Headers</h3>
        <code>Content-Type: application/json</code>
        <h3>Request Body (JSON Payload)</h3>
        <pre>{request_example}</pre>
        <ul>
            <li><code>media_url</code> (<strong>Required</strong>): absolute http(s) URL of the audio or video file.</li>
        </ul>
        <h3>Success Response (JSON Example for a Video File)</h3>
        <pre>{success_example}</pre>
        <p><em><code>video_stream</code> or <code>audio_stream</code> is <code>null</code> when the file has no stream of that type. Only the first stream of each type is reported. Unknown values are <code>null</code>.</em></p>
        <h3>Error Response (JSON)</h3>
        <pre>{error_example}</pre>
        <p>Invalid input returns HTTP 400; download, analysis or parsing failures return HTTP 500; other methods return HTTP 405.</p>

        <h2>How to Use (cURL Example)</h2>
        <pre id="curl-command">{curl_command}</pre>

        <h2>Important Notes</h2>
        <ul>
            <li><strong>FFprobe Path:</strong> <code>{ffprobe_path}</code></li>
            <li><strong>Download Time:</strong> the whole file is downloaded before analysis (download limit {download_timeout}s).</li>
            <li><strong>Processing Limit:</strong> {max_processing}s per request, download and analysis combined.</li>
        </ul>
    </div>
</body>
</html>
"#,
        status_items = status_items,
        action_required = action_required,
        endpoint = escape_html(endpoint),
        request_example = escape_html(&request_example),
        success_example = escape_html(&success_example),
        error_example = escape_html(&error_example),
        curl_command = escape_html(&curl_command),
        ffprobe_path = escape_html(&ffprobe_path),
        download_timeout = report.download_timeout_secs,
        max_processing = report.max_processing_secs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(ffprobe: ToolStatus, writable: bool) -> CapabilityReport {
        CapabilityReport {
            ffprobe_path: PathBuf::from("/usr/bin/ffprobe"),
            ffprobe,
            http_client: ToolStatus::Installed {
                version: "reqwest".to_string(),
            },
            temp_dir: PathBuf::from("/tmp/media-info"),
            temp_dir_writable: writable,
            max_processing_secs: 300,
            download_timeout_secs: 240,
        }
    }

    #[test]
    fn test_classify_version_output() {
        assert_eq!(
            classify_version_output(Some(0), "ffprobe version 6.1.1 Copyright (c) 2007-2023\nbuilt with gcc"),
            ToolStatus::Installed {
                version: "ffprobe version 6.1.1 Copyright (c) 2007-2023".to_string()
            }
        );
        assert_eq!(classify_version_output(Some(127), ""), ToolStatus::NotFound);
        assert_eq!(
            classify_version_output(Some(1), "sh: ffprobe: not found"),
            ToolStatus::NotFound
        );
        assert!(matches!(
            classify_version_output(Some(0), "something else"),
            ToolStatus::Unknown { ref detail } if detail.contains("RC: 0")
        ));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_page_with_all_capabilities() {
        let page = render_page(
            &report(
                ToolStatus::Installed {
                    version: "ffprobe version 6.1".to_string(),
                },
                true,
            ),
            "http://media.local:8080/",
        );

        assert!(page.contains("<h2>Server Status</h2>"));
        assert!(page.contains("Installed (ffprobe version 6.1)"));
        assert!(page.contains("http://media.local:8080/"));
        assert!(page.contains("&quot;media_url&quot;"));
        assert!(!page.contains("Action Required"));
    }

    #[test]
    fn test_render_page_flags_missing_capabilities() {
        let page = render_page(&report(ToolStatus::NotFound, false), "http://<script>/");

        assert!(page.contains("Action Required"));
        assert!(page.contains("Not Found (path &#39;/usr/bin/ffprobe&#39; incorrect"));
        assert!(page.contains("Not Writable"));
        assert!(!page.contains("<script>"));
    }

    #[tokio::test]
    async fn test_check_temp_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");

        assert!(check_temp_dir(&nested).await);
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_check_ffprobe_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            check_ffprobe(&dir.path().join("missing-ffprobe")).await,
            ToolStatus::NotFound
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_ffprobe_installed() {
        let dir = tempfile::tempdir().unwrap();
        let script = crate::test_support::write_script(
            dir.path(),
            "ffprobe",
            "echo 'ffprobe version 7.0 Copyright (c) 2007-2024 the FFmpeg developers'",
        );

        assert_eq!(
            check_ffprobe(&script).await,
            ToolStatus::Installed {
                version: "ffprobe version 7.0 Copyright (c) 2007-2024 the FFmpeg developers".to_string()
            }
        );
    }
}
