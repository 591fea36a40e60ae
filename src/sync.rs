//! Post-hoc sync check: where each segment's speech landed in the assembled
//! track compared with where it started in the source.
//!
//! Offsets are measured on the track's own clock, whose zero is the first
//! segment's start. A positive offset means the speech starts late.

use std::fmt;

use serde::Serialize;

use crate::config::AssemblyConfig;
use crate::error::{DubError, Result};
use crate::quality::timing_accuracy;
use crate::timeline::TimedSegment;

/// Segment counts per absolute-offset band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OffsetDistribution {
    /// At most 0.1s.
    pub excellent: usize,
    /// Over 0.1s up to 0.3s.
    pub good: usize,
    /// Over 0.3s up to 0.5s.
    pub fair: usize,
    /// Over 0.5s.
    pub poor: usize,
}

impl OffsetDistribution {
    fn from_offsets(offsets: &[(usize, f64)]) -> Self {
        let mut dist = Self::default();
        for &(_, offset) in offsets {
            match offset.abs() {
                o if o <= 0.1 => dist.excellent += 1,
                o if o <= 0.3 => dist.good += 1,
                o if o <= 0.5 => dist.fair += 1,
                _ => dist.poor += 1,
            }
        }
        dist
    }
}

/// A sync problem found in an assembled track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncIssue {
    LowTimingAccuracy { accuracy: f64 },
    HighAverageOffset { offset: f64 },
    SevereOffset { offset: f64 },
    WidespreadDrift { share: f64 },
    InconsistentDrift { variance: f64 },
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncIssue::LowTimingAccuracy { accuracy } => {
                write!(f, "low overall timing accuracy ({accuracy:.2})")
            }
            SyncIssue::HighAverageOffset { offset } => {
                write!(f, "average offset too large ({offset:.3}s)")
            }
            SyncIssue::SevereOffset { offset } => write!(f, "severe offset of {offset:.3}s"),
            SyncIssue::WidespreadDrift { share } => {
                write!(f, "{:.0}% of segments drift noticeably", share * 100.0)
            }
            SyncIssue::InconsistentDrift { variance } => {
                write!(f, "offsets vary widely (variance {variance:.3})")
            }
        }
    }
}

/// Result of comparing actual clip positions with source timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncAnalysis {
    /// `(segment index, actual start - expected start)` in seconds.
    pub segment_offsets: Vec<(usize, f64)>,
    /// Mean absolute offset.
    pub avg_offset: f64,
    /// Largest absolute offset.
    pub max_offset: f64,
    /// Mean of track-length accuracy and offset accuracy, in `[0, 1]`.
    pub timing_accuracy: f64,
    /// Weighted sync score in `[0, 1]`.
    pub sync_score: f64,
    pub distribution: OffsetDistribution,
    pub issues: Vec<SyncIssue>,
}

impl SyncAnalysis {
    pub fn is_in_sync(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare `clip_starts` (seconds into the track) against `segments`.
///
/// `track_duration` is the length of the assembled track.
pub fn analyze_sync(
    segments: &[TimedSegment],
    clip_starts: &[f64],
    track_duration: f64,
    config: &AssemblyConfig,
) -> Result<SyncAnalysis> {
    if segments.is_empty() {
        return Err(DubError::InvalidInput("no segments to analyze".to_string()));
    }
    if clip_starts.len() != segments.len() {
        return Err(DubError::InvalidInput(format!(
            "{} clip positions for {} segments",
            clip_starts.len(),
            segments.len()
        )));
    }

    let origin = segments[0].start_time;
    let segment_offsets: Vec<(usize, f64)> = segments
        .iter()
        .zip(clip_starts)
        .enumerate()
        .map(|(i, (seg, &actual))| (i, actual - (seg.start_time - origin)))
        .collect();

    let count = segment_offsets.len() as f64;
    let avg_offset = segment_offsets.iter().map(|(_, o)| o.abs()).sum::<f64>() / count;
    let max_offset = segment_offsets
        .iter()
        .map(|(_, o)| o.abs())
        .fold(0.0, f64::max);

    let limit = config.max_sync_offset;
    let offset_accuracy = (1.0 - avg_offset / limit).max(0.0);
    let timing_accuracy = (timing_accuracy(segments, track_duration) + offset_accuracy) / 2.0;

    let sync_score = timing_accuracy * 0.4
        + offset_accuracy * 0.3
        + (1.0 - max_offset / (limit * 2.0)).max(0.0) * 0.3;

    let issues = detect_issues(&segment_offsets, avg_offset, max_offset, timing_accuracy, config);

    Ok(SyncAnalysis {
        distribution: OffsetDistribution::from_offsets(&segment_offsets),
        segment_offsets,
        avg_offset,
        max_offset,
        timing_accuracy,
        sync_score,
        issues,
    })
}

fn detect_issues(
    offsets: &[(usize, f64)],
    avg_offset: f64,
    max_offset: f64,
    accuracy: f64,
    config: &AssemblyConfig,
) -> Vec<SyncIssue> {
    let limit = config.max_sync_offset;
    let mut issues = Vec::new();

    if accuracy < config.min_sync_accuracy {
        issues.push(SyncIssue::LowTimingAccuracy { accuracy });
    }
    if avg_offset > limit {
        issues.push(SyncIssue::HighAverageOffset { offset: avg_offset });
    }
    if max_offset > limit * 2.0 {
        issues.push(SyncIssue::SevereOffset { offset: max_offset });
    }

    let drifting = offsets.iter().filter(|(_, o)| o.abs() > limit).count();
    let share = drifting as f64 / offsets.len() as f64;
    if share > config.max_drifting_share {
        issues.push(SyncIssue::WidespreadDrift { share });
    }

    if offsets.len() > 1 {
        let n = offsets.len() as f64;
        let mean = offsets.iter().map(|(_, o)| o).sum::<f64>() / n;
        let variance = offsets.iter().map(|(_, o)| (o - mean).powi(2)).sum::<f64>() / n;
        if variance > config.max_offset_variance {
            issues.push(SyncIssue::InconsistentDrift { variance });
        }
    }

    issues
}
