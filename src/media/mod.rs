//! ffmpeg/ffprobe wrappers: probing, audio extraction and audio-track
//! replacement with post-replacement verification.

pub mod probe;

pub use probe::{parse_probe_json, AudioStreamInfo, MediaInfo, VideoInfo};

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AssemblyConfig;
use crate::error::{DubError, Result};

pub const SUPPORTED_VIDEO_FORMATS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv"];
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "wav", "aac", "flac", "m4a"];

/// Outcome of replacing a video's audio track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioReplacementResult {
    pub output_path: PathBuf,
    pub original_video: VideoInfo,
    pub replacement_audio: AudioStreamInfo,
    pub processing_time: Duration,
    /// Resolution, frame rate and duration survived the replacement.
    pub quality_preserved: bool,
    /// Both inputs use container formats from the supported sets.
    pub format_compatible: bool,
    /// The video stream was copied rather than re-encoded.
    pub video_copied: bool,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported_video(path: &Path) -> bool {
    extension(path).is_some_and(|e| SUPPORTED_VIDEO_FORMATS.contains(&e.as_str()))
}

pub fn is_supported_audio(path: &Path) -> bool {
    extension(path).is_some_and(|e| SUPPORTED_AUDIO_FORMATS.contains(&e.as_str()))
}

pub fn check_format_compatibility(video: &Path, audio: &Path) -> bool {
    is_supported_video(video) && is_supported_audio(audio)
}

/// Whether a video stream with `codec` can be stream-copied into a
/// `container` without re-encoding.
pub fn can_copy_codec(container: &str, codec: &str) -> bool {
    let compatible: &[&str] = match container.to_ascii_lowercase().as_str() {
        "mp4" => &["h264", "h265", "mpeg4"],
        "mov" => &["h264", "h265", "prores"],
        "avi" => &["h264", "mpeg4", "xvid"],
        "mkv" => &["h264", "h265", "vp8", "vp9"],
        _ => &[],
    };
    compatible.contains(&probe::normalize_codec(codec).as_str())
}

/// Compare the output video against the original: same resolution, frame
/// rate and duration within the configured tolerances.
pub fn verify_replacement(original: &VideoInfo, output: &VideoInfo, config: &AssemblyConfig) -> bool {
    let resolution = output.width == original.width && output.height == original.height;
    let fps = (output.fps - original.fps).abs() < config.fps_tolerance;
    let duration = (output.duration - original.duration).abs() < config.duration_tolerance;

    if !(resolution && fps && duration) {
        warn!(
            "Output differs from source: {}x{} @ {:.2}fps {:.2}s vs {}x{} @ {:.2}fps {:.2}s",
            output.width,
            output.height,
            output.fps,
            output.duration,
            original.width,
            original.height,
            original.fps,
            original.duration
        );
    }
    resolution && fps && duration
}

fn check_tool(binary: &Path) -> Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .map_err(|e| {
            DubError::ToolUnavailable(format!(
                "{} not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}",
                binary.display()
            ))
        })?;

    if !output.status.success() {
        return Err(DubError::ToolUnavailable(format!(
            "{} -version failed",
            binary.display()
        )));
    }

    debug!("{} is available", binary.display());
    Ok(())
}

/// Handle to the ffmpeg/ffprobe binaries. Construction fails when either is
/// missing, so every later call can assume the tools exist.
#[derive(Debug, Clone)]
pub struct MediaToolkit {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    config: AssemblyConfig,
}

impl MediaToolkit {
    pub fn new(config: AssemblyConfig) -> Result<Self> {
        Self::with_binaries("ffmpeg", "ffprobe", config)
    }

    pub fn with_binaries(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        config: AssemblyConfig,
    ) -> Result<Self> {
        let toolkit = Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            config,
        };
        check_tool(&toolkit.ffmpeg)?;
        check_tool(&toolkit.ffprobe)?;
        Ok(toolkit)
    }

    fn run_ffmpeg(&self, command: &mut Command, what: &str) -> Result<()> {
        let output = command
            .output()
            .map_err(|e| DubError::Media(format!("Failed to run FFmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DubError::Media(format!("{what} failed: {}", stderr.trim())));
        }
        Ok(())
    }

    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-v", "error"]);
        cmd
    }

    /// Probe container and first audio/video streams.
    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.exists() {
            return Err(DubError::FileNotFound(path.display().to_string()));
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| DubError::Media(format!("Failed to run FFprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DubError::Media(format!("FFprobe failed: {}", stderr.trim())));
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    /// Extract the first audio stream as mono 16-bit PCM at 16 kHz, the
    /// format speech recognition expects.
    pub fn extract_audio(&self, input: &Path, output: &Path) -> Result<AudioStreamInfo> {
        let source = self.probe(input)?;
        if !source.has_audio() {
            return Err(DubError::Media(format!(
                "{} has no audio stream",
                input.display()
            )));
        }

        info!("Extracting audio from {}", input.display());

        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(output);
        self.run_ffmpeg(&mut cmd, "Audio extraction")?;

        if !output.exists() {
            return Err(DubError::Media("Output file was not created".to_string()));
        }

        Ok(AudioStreamInfo {
            codec: "pcm_s16le".to_string(),
            sample_rate: 16000,
            channels: 1,
            duration: source.duration,
        })
    }

    fn replace_command(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        copy_video: bool,
        pad_audio: bool,
    ) -> Command {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-map", "0:v:0", "-map", "1:a:0"]);

        if copy_video {
            cmd.args(["-c:v", "copy"]);
        } else {
            cmd.args([
                "-c:v",
                self.config.fallback_video_codec.as_str(),
                "-preset",
                "medium",
                "-crf",
                "18",
            ]);
        }

        cmd.args([
            "-c:a",
            self.config.audio_codec.as_str(),
            "-b:a",
            self.config.audio_bitrate.as_str(),
        ]);

        if pad_audio {
            cmd.args(["-af", "apad", "-shortest"]);
        }
        cmd.arg(output);
        cmd
    }

    /// Swap the audio track of `video` for `audio`, writing `output`.
    ///
    /// With `preserve_quality` the video stream is copied when the output
    /// container accepts its codec, otherwise it is re-encoded. A failed copy
    /// falls back to re-encoding. Verification mismatches are reported through
    /// `quality_preserved`, never as errors.
    pub fn replace_audio_track(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        preserve_quality: bool,
    ) -> Result<AudioReplacementResult> {
        let start = Instant::now();

        let source = self.probe(video)?;
        let original_video = source.video.ok_or_else(|| {
            DubError::Media(format!("{} has no video stream", video.display()))
        })?;
        let replacement_audio = self.probe(audio)?.audio.ok_or_else(|| {
            DubError::Media(format!("{} has no audio stream", audio.display()))
        })?;

        let format_compatible = check_format_compatibility(video, audio);
        if !format_compatible {
            warn!(
                "Unusual formats: {} / {}",
                video.display(),
                audio.display()
            );
        }

        let container = extension(output).unwrap_or_default();
        let mut copy_video = preserve_quality && can_copy_codec(&container, &original_video.codec);
        let pad_audio = (original_video.duration - replacement_audio.duration).abs() > 0.1;

        info!(
            "Replacing audio track ({} video, {})",
            original_video.codec,
            if copy_video { "stream copy" } else { "re-encode" }
        );

        let mut cmd = self.replace_command(video, audio, output, copy_video, pad_audio);
        if let Err(e) = self.run_ffmpeg(&mut cmd, "Audio replacement") {
            if !copy_video {
                return Err(e);
            }
            warn!("Stream copy failed, re-encoding video: {}", e);
            copy_video = false;
            let mut cmd = self.replace_command(video, audio, output, false, pad_audio);
            self.run_ffmpeg(&mut cmd, "Audio replacement")?;
        }

        let quality_preserved = match self.probe(output).map(|m| m.video) {
            Ok(Some(out)) => verify_replacement(&original_video, &out, &self.config),
            Ok(None) => false,
            Err(e) => {
                warn!("Could not verify {}: {}", output.display(), e);
                false
            }
        };

        Ok(AudioReplacementResult {
            output_path: output.to_path_buf(),
            original_video,
            replacement_audio,
            processing_time: start.elapsed(),
            quality_preserved,
            format_compatible,
            video_copied: copy_video,
        })
    }

    /// Remux or transcode into another supported container.
    pub fn convert_format(
        &self,
        video: &Path,
        output: &Path,
        preserve_quality: bool,
    ) -> Result<()> {
        let target = extension(output).unwrap_or_default();
        if !SUPPORTED_VIDEO_FORMATS.contains(&target.as_str()) {
            return Err(DubError::InvalidInput(format!(
                "unsupported target format: {target}"
            )));
        }

        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(video);
        if preserve_quality {
            cmd.args([
                "-c:v",
                self.config.fallback_video_codec.as_str(),
                "-preset",
                "medium",
                "-crf",
                "18",
                "-c:a",
                self.config.audio_codec.as_str(),
            ]);
        } else {
            let codec = self
                .probe(video)?
                .video
                .map(|v| v.codec)
                .unwrap_or_default();
            let vcodec = if can_copy_codec(&target, &codec) {
                "copy"
            } else {
                self.config.fallback_video_codec.as_str()
            };
            cmd.args(["-c:v", vcodec, "-c:a", "copy"]);
        }
        cmd.arg(output);
        self.run_ffmpeg(&mut cmd, "Format conversion")
    }
}
