use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};

/// Video stream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

/// Audio stream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: f64,
}

/// Container-level probe result. Only the first stream of each kind is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format_name: String,
    pub duration: f64,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// Parse an ffprobe rate such as `30000/1001` or `25`. Undefined rates
/// (`0/0`) give 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

/// ffprobe reports some codecs under names that differ from the encoder's.
pub fn normalize_codec(codec: &str) -> String {
    match codec.to_ascii_lowercase().as_str() {
        "hevc" => "h265".to_string(),
        "avc" | "avc1" => "h264".to_string(),
        other => other.to_string(),
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_json(json: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()));

    let stream_duration =
        |s: &ProbeStream| parse_seconds(s.duration.as_deref()).or(format_duration).unwrap_or(0.0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| {
            let fps = s
                .r_frame_rate
                .as_deref()
                .map(parse_frame_rate)
                .filter(|&f| f > 0.0)
                .or_else(|| s.avg_frame_rate.as_deref().map(parse_frame_rate))
                .unwrap_or(0.0);
            VideoInfo {
                codec: normalize_codec(s.codec_name.as_deref().unwrap_or("unknown")),
                width: s.width.unwrap_or(0),
                height: s.height.unwrap_or(0),
                fps,
                duration: stream_duration(s),
            }
        });

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStreamInfo {
            codec: normalize_codec(s.codec_name.as_deref().unwrap_or("unknown")),
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
            channels: s.channels.unwrap_or(0),
            duration: stream_duration(s),
        });

    if video.is_none() && audio.is_none() {
        return Err(DubError::Media("no audio or video streams found".to_string()));
    }

    let duration = format_duration
        .or_else(|| video.as_ref().map(|v| v.duration))
        .or_else(|| audio.as_ref().map(|a| a.duration))
        .unwrap_or(0.0);

    Ok(MediaInfo {
        format_name: probe
            .format
            .and_then(|f| f.format_name)
            .unwrap_or_else(|| "unknown".to_string()),
        duration,
        video,
        audio,
    })
}
