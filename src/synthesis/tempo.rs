use std::process::Command;

use tracing::debug;

use crate::audio::AudioClip;
use crate::config::SynthesisConfig;
use crate::error::{DubError, Result};

/// Playback-speed correction needed to fit `synthesized` seconds of speech
/// into a `target` window.
///
/// Returns `None` when the window is too short to correct or the mismatch is
/// within tolerance. Otherwise the ratio `synthesized / target`, clamped to
/// `[1 - max_adjustment, 1 + max_adjustment]`. Values above 1.0 speed up.
pub fn speed_ratio(synthesized: f64, target: f64, config: &SynthesisConfig) -> Option<f64> {
    if target <= config.min_segment_duration || synthesized <= 0.0 {
        return None;
    }

    let ratio = synthesized / target;
    if (ratio - 1.0).abs() <= config.timing_tolerance {
        return None;
    }

    let bound = config.max_adjustment;
    Some(ratio.clamp(1.0 - bound, 1.0 + bound))
}

/// Changes the playback speed of a clip.
///
/// The orchestrator calls adjusters on the blocking thread pool, so an
/// implementation may block on I/O or a child process.
pub trait TempoAdjuster: Send + Sync {
    /// Return `clip` played `ratio` times faster.
    fn adjust(&self, clip: &AudioClip, ratio: f64) -> Result<AudioClip>;

    fn name(&self) -> &'static str;
}

/// In-process speed change by linear-interpolation resampling. Pitch follows
/// the speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResampleTempo;

impl TempoAdjuster for ResampleTempo {
    fn adjust(&self, clip: &AudioClip, ratio: f64) -> Result<AudioClip> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(DubError::InvalidInput(format!("invalid speed ratio {ratio}")));
        }
        Ok(clip.stretch(ratio))
    }

    fn name(&self) -> &'static str {
        "resample"
    }
}

/// Pitch-preserving speed change through ffmpeg's `atempo` filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegTempo;

/// `atempo` only accepts factors in `[0.5, 2.0]`, so larger changes are
/// expressed as a chain.
pub fn atempo_filter(ratio: f64) -> String {
    let mut remaining = ratio;
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    stages.push(remaining);

    stages
        .iter()
        .map(|f| format!("atempo={f:.4}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl TempoAdjuster for FfmpegTempo {
    fn adjust(&self, clip: &AudioClip, ratio: f64) -> Result<AudioClip> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(DubError::InvalidInput(format!("invalid speed ratio {ratio}")));
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        clip.write_wav(&input)?;

        let filter = atempo_filter(ratio);
        debug!("Applying {} to {:.2}s clip", filter, clip.duration());

        let result = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-i"])
            .arg(&input)
            .args(["-filter:a", &filter])
            .arg(&output)
            .output()
            .map_err(|e| DubError::ToolUnavailable(format!("ffmpeg: {e}")))?;

        if !result.status.success() {
            return Err(DubError::Media(format!(
                "atempo failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        AudioClip::read_wav(&output)
    }

    fn name(&self) -> &'static str {
        "ffmpeg-atempo"
    }
}
