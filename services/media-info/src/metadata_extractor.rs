use serde_json::Value;

use crate::models::{
    AudioStreamInfo, CodecType, MediaInfoResponse, ProbeReport, StreamSection, VideoStreamInfo,
};

pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Decode ffprobe's JSON report
    pub fn parse_report(raw: &str) -> Result<ProbeReport, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Flatten a probe report into the response shape
    ///
    /// Only the first video and the first audio stream are kept; later
    /// streams of either type and all other stream types are ignored.
    pub fn extract(filename: String, report: &ProbeReport) -> MediaInfoResponse {
        let format = report.format.clone().unwrap_or_default();

        let mut video_stream = None;
        let mut audio_stream = None;

        for stream in &report.streams {
            match stream.codec_type {
                CodecType::Video if video_stream.is_none() => {
                    video_stream = Some(Self::video_stream(stream));
                }
                CodecType::Audio if audio_stream.is_none() => {
                    audio_stream = Some(Self::audio_stream(stream));
                }
                _ => {}
            }

            if video_stream.is_some() && audio_stream.is_some() {
                break;
            }
        }

        MediaInfoResponse {
            filename,
            size_bytes: format.size,
            duration_seconds: format.duration,
            format_name: format.format_name,
            format_long_name: format.format_long_name,
            bit_rate_bps: format.bit_rate,
            video_stream,
            audio_stream,
            raw_ffprobe_output: None,
        }
    }

    /// Same as [`extract`](Self::extract), with the decoded document attached
    pub fn extract_with_raw(filename: String, report: &ProbeReport, raw: &str) -> MediaInfoResponse {
        let mut info = Self::extract(filename, report);
        info.raw_ffprobe_output = serde_json::from_str::<Value>(raw).ok();
        info
    }

    fn video_stream(stream: &StreamSection) -> VideoStreamInfo {
        VideoStreamInfo {
            codec_name: stream.codec_name.clone(),
            codec_long_name: stream.codec_long_name.clone(),
            profile: stream.profile.clone(),
            width: stream.width,
            height: stream.height,
            display_aspect_ratio: stream.display_aspect_ratio.clone(),
            frame_rate: stated_frame_rate(stream.r_frame_rate.as_deref())
                .or_else(|| stated_frame_rate(stream.avg_frame_rate.as_deref())),
            bit_rate_bps: stream.bit_rate,
            pixel_format: stream.pix_fmt.clone(),
            tags: stream.tags.clone(),
        }
    }

    fn audio_stream(stream: &StreamSection) -> AudioStreamInfo {
        AudioStreamInfo {
            codec_name: stream.codec_name.clone(),
            codec_long_name: stream.codec_long_name.clone(),
            sample_rate_hz: stream.sample_rate,
            channels: stream.channels,
            channel_layout: stream.channel_layout.clone(),
            bit_rate_bps: stream.bit_rate,
            tags: stream.tags.clone(),
        }
    }
}

// ffprobe writes "0/0" when it cannot determine a rate
fn stated_frame_rate(rate: Option<&str>) -> Option<String> {
    rate.map(str::trim)
        .filter(|r| !r.is_empty() && *r != "0/0")
        .map(str::to_string)
}
