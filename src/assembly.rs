use tracing::debug;

use crate::audio::AudioClip;
use crate::config::AssemblyConfig;
use crate::error::{DubError, Result};
use crate::timeline::{gap_between, TimedSegment};

/// Sample rate of the placeholder track produced for empty input.
pub const FALLBACK_SAMPLE_RATE: u32 = 24000;

/// Stitch per-segment clips into one continuous track.
///
/// Clips are concatenated in order at the first clip's sample rate. Between
/// consecutive segments whose source timestamps are more than
/// `config.padding` apart, `gap - padding` seconds of silence are inserted so
/// speech keeps its place in the timeline. Empty input produces one second of
/// silence.
pub fn assemble_track(
    clips: &[AudioClip],
    segments: &[TimedSegment],
    config: &AssemblyConfig,
) -> Result<AudioClip> {
    assemble_track_with_starts(clips, segments, config).map(|(track, _)| track)
}

/// Like [`assemble_track`], also returning the second at which each clip
/// starts in the track.
pub fn assemble_track_with_starts(
    clips: &[AudioClip],
    segments: &[TimedSegment],
    config: &AssemblyConfig,
) -> Result<(AudioClip, Vec<f64>)> {
    if clips.len() != segments.len() {
        return Err(DubError::InvalidInput(format!(
            "{} clips for {} segments",
            clips.len(),
            segments.len()
        )));
    }

    let Some(first) = clips.first() else {
        return Ok((AudioClip::silence(1.0, FALLBACK_SAMPLE_RATE), Vec::new()));
    };

    let total: usize = clips.iter().map(|c| c.samples.len()).sum();
    let mut track = AudioClip::new(Vec::with_capacity(total), first.sample_rate);
    let mut starts = Vec::with_capacity(clips.len());

    for (i, clip) in clips.iter().enumerate() {
        if i > 0 {
            let gap = gap_between(&segments[i - 1], &segments[i]);
            if gap > config.padding {
                debug!("Inserting {:.3}s of silence before segment {}", gap - config.padding, i);
                track.pad(gap - config.padding);
            }
        }
        starts.push(track.duration());
        track.append(clip);
    }

    debug!(
        "Assembled {} clips into {:.2}s track",
        clips.len(),
        track.duration()
    );
    Ok((track, starts))
}
