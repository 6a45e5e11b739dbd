use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ServiceError;

const MEDIA_URL_REQUIRED: &str = "JSON key 'media_url' (valid URL) is required.";

/// Body of a probe request
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub media_url: Url,
}

impl ProbeRequest {
    /// Parse and validate a raw request body
    ///
    /// The body must be a JSON object whose `media_url` is an absolute
    /// http(s) URL with a host.
    pub fn parse(body: &[u8]) -> Result<Self, ServiceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid JSON received: {}", e)))?;

        let raw_url = value
            .get("media_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::InvalidInput(MEDIA_URL_REQUIRED.to_string()))?;

        let media_url = Url::parse(raw_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or_else(|| ServiceError::InvalidInput(MEDIA_URL_REQUIRED.to_string()))?;

        Ok(Self { media_url })
    }
}

/// Classification of an ffprobe stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    #[default]
    #[serde(other)]
    Other,
}

/// Document printed by `ffprobe -print_format json -show_format -show_streams`
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeReport {
    #[serde(default, deserialize_with = "lenient_section")]
    pub format: Option<FormatSection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub streams: Vec<StreamSection>,
}

/// Container-level section of the probe report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatSection {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
}

/// One elementary stream of the probe report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamSection {
    #[serde(default, deserialize_with = "lenient_codec_type")]
    pub codec_type: CodecType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub codec_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub codec_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub width: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub height: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_aspect_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub r_frame_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub avg_frame_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pix_fmt: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub sample_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub channels: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_layout: Option<String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub tags: Option<Map<String, Value>>,
}

/// Normalized response for a probed media file
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfoResponse {
    pub filename: String,
    pub size_bytes: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub bit_rate_bps: Option<u64>,
    pub video_stream: Option<VideoStreamInfo>,
    pub audio_stream: Option<AudioStreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_ffprobe_output: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoStreamInfo {
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub profile: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub display_aspect_ratio: Option<String>,
    pub frame_rate: Option<String>,
    pub bit_rate_bps: Option<u64>,
    pub pixel_format: Option<String>,
    pub tags: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioStreamInfo {
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub sample_rate_hz: Option<u64>,
    pub channels: Option<u64>,
    pub channel_layout: Option<String>,
    pub bit_rate_bps: Option<u64>,
    pub tags: Option<Map<String, Value>>,
}

/// Body of every failed response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ffprobe prints most numbers as strings ("bit_rate": "128000") but some as
// JSON numbers. Values that are neither become None.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_map<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    })
}

fn lenient_codec_type<'de, D>(deserializer: D) -> Result<CodecType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(value @ Value::String(_)) => serde_json::from_value(value).unwrap_or_default(),
        _ => CodecType::Other,
    })
}

// A `format` that is not an object is treated as missing
fn lenient_section<'de, D>(deserializer: D) -> Result<Option<FormatSection>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_request_accepts_absolute_url() {
        let request = ProbeRequest::parse(br#"{"media_url": "https://example.com/clip.mp4"}"#)
            .expect("valid request");
        assert_eq!(request.media_url.as_str(), "https://example.com/clip.mp4");
    }

    #[test]
    fn test_probe_request_rejects_invalid_json() {
        let err = ProbeRequest::parse(b"{not json").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(ref msg) if msg.starts_with("Invalid JSON")));
    }

    #[test]
    fn test_probe_request_requires_media_url() {
        for body in [
            &br#"{}"#[..],
            br#"{"media_url": ""}"#,
            br#"{"media_url": 42}"#,
            br#"{"media_url": "not-a-url"}"#,
            br#"{"media_url": "/relative/clip.mp4"}"#,
            br#"{"media_url": "file:///etc/passwd"}"#,
            br#"["https://example.com/clip.mp4"]"#,
        ] {
            let err = ProbeRequest::parse(body).unwrap_err();
            assert_eq!(err.to_string(), MEDIA_URL_REQUIRED, "body: {}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn test_probe_report_tolerates_mixed_number_encodings() {
        let report: ProbeReport = serde_json::from_str(
            r#"{
                "format": {"size": 1048576, "duration": "10.5", "bit_rate": "N/A"},
                "streams": [
                    {"codec_type": "video", "width": "1920", "height": 1080, "profile": 100},
                    {"codec_type": "data"},
                    {"codec_name": "mov_text"}
                ]
            }"#,
        )
        .unwrap();

        let format = report.format.unwrap();
        assert_eq!(format.size, Some(1_048_576));
        assert_eq!(format.duration, Some(10.5));
        assert_eq!(format.bit_rate, None);

        assert_eq!(report.streams.len(), 3);
        assert_eq!(report.streams[0].codec_type, CodecType::Video);
        assert_eq!(report.streams[0].width, Some(1920));
        assert_eq!(report.streams[0].profile.as_deref(), Some("100"));
        assert_eq!(report.streams[1].codec_type, CodecType::Other);
        assert_eq!(report.streams[2].codec_type, CodecType::Other);
    }

    #[test]
    fn test_probe_report_tolerates_mistyped_fields() {
        let report: ProbeReport = serde_json::from_str(
            r#"{
                "format": {"format_name": 5, "format_long_name": ["QuickTime"], "duration": "10.0"},
                "streams": [
                    {"codec_type": "video", "codec_name": 264, "pix_fmt": null, "tags": "x"},
                    {"codec_type": 1, "codec_name": "aac", "tags": {"language": "eng"}}
                ]
            }"#,
        )
        .unwrap();

        let format = report.format.unwrap();
        assert_eq!(format.format_name.as_deref(), Some("5"));
        assert_eq!(format.format_long_name, None);
        assert_eq!(format.duration, Some(10.0));

        assert_eq!(report.streams[0].codec_type, CodecType::Video);
        assert_eq!(report.streams[0].codec_name.as_deref(), Some("264"));
        assert_eq!(report.streams[0].pix_fmt, None);
        assert!(report.streams[0].tags.is_none());
        assert_eq!(report.streams[1].codec_type, CodecType::Other);
        assert_eq!(
            report.streams[1].tags.as_ref().and_then(|t| t.get("language")),
            Some(&Value::String("eng".to_string()))
        );
    }

    #[test]
    fn test_probe_report_without_sections() {
        let report: ProbeReport = serde_json::from_str(r#"{"streams": null}"#).unwrap();
        assert!(report.format.is_none());
        assert!(report.streams.is_empty());
    }
}
