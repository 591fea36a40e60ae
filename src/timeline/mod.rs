//! Timed text segments and the stages that reshape them before synthesis.

pub mod diarize;
pub mod merge;
pub mod stats;
pub mod words;

use crate::config::TimingConfig;
use crate::error::{DubError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub use diarize::identify_speakers;
pub use merge::{filter_by_confidence, merge_adjacent_segments};
pub use stats::{
    analyze_timing_quality, calculate_confidence_scores, speaker_statistics,
    ConfidenceDistribution, ConfidenceStats, SpeakerStats, TimingQualityMetrics,
};
pub use words::{expand_segment, extract_word_level_timing};

/// A contiguous span of speech with its text, optional translation,
/// recognition confidence and speaker tag. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
}

impl TimedSegment {
    pub fn new(start_time: f64, end_time: f64, original_text: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            original_text: original_text.into(),
            translated_text: None,
            confidence: None,
            speaker_id: None,
        }
    }

    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translated_text = Some(text.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker_id = Some(speaker.into());
        self
    }

    /// Length of the segment in seconds (zero for degenerate segments).
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// Translated text with surrounding whitespace removed, empty when absent.
    pub fn translation(&self) -> &str {
        self.translated_text.as_deref().map(str::trim).unwrap_or("")
    }
}

fn word_separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,，、]+").expect("valid separator regex"))
}

/// Split text into word tokens on whitespace and ASCII/CJK commas.
pub fn tokenize(text: &str) -> Vec<&str> {
    word_separators()
        .split(text.trim())
        .filter(|w| !w.trim().is_empty())
        .collect()
}

/// Gap in seconds between the end of `prev` and the start of `next`.
/// Negative values are overlaps.
pub fn gap_between(prev: &TimedSegment, next: &TimedSegment) -> f64 {
    next.start_time - prev.end_time
}

/// Check that a sequence is usable as a timeline: non-empty, finite times,
/// `end >= start`, and start times never decreasing.
pub fn validate_order(segments: &[TimedSegment]) -> Result<()> {
    if segments.is_empty() {
        return Err(DubError::InvalidInput("segment list is empty".to_string()));
    }

    for (i, seg) in segments.iter().enumerate() {
        if !seg.start_time.is_finite() || !seg.end_time.is_finite() {
            return Err(DubError::InvalidInput(format!(
                "segment {i} has non-finite timestamps"
            )));
        }
        if seg.end_time < seg.start_time {
            return Err(DubError::InvalidInput(format!(
                "segment {i} ends before it starts ({:.3} < {:.3})",
                seg.end_time, seg.start_time
            )));
        }
    }

    if let Some(i) = segments
        .windows(2)
        .position(|w| w[1].start_time < w[0].start_time)
    {
        return Err(DubError::InvalidInput(format!(
            "segment {} starts before segment {}",
            i + 1,
            i
        )));
    }

    Ok(())
}

/// Stateless facade over the timeline stages, bound to one set of thresholds.
#[derive(Debug, Clone, Default)]
pub struct TimingProcessor {
    config: TimingConfig,
}

impl TimingProcessor {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn extract_word_level_timing(&self, segments: &[TimedSegment]) -> Vec<TimedSegment> {
        extract_word_level_timing(segments)
    }

    pub fn identify_speakers(
        &self,
        segments: &[TimedSegment],
        use_silence_detection: bool,
    ) -> Vec<TimedSegment> {
        identify_speakers(
            segments,
            self.config.speaker_change_threshold,
            use_silence_detection,
        )
    }

    pub fn calculate_confidence_scores(&self, segments: &[TimedSegment]) -> ConfidenceStats {
        calculate_confidence_scores(segments, &self.config)
    }

    pub fn analyze_timing_quality(&self, segments: &[TimedSegment]) -> TimingQualityMetrics {
        analyze_timing_quality(segments, &self.config)
    }

    pub fn speaker_statistics(&self, segments: &[TimedSegment]) -> Vec<SpeakerStats> {
        speaker_statistics(segments)
    }

    pub fn merge_adjacent_segments(
        &self,
        segments: &[TimedSegment],
        max_gap: f64,
    ) -> Vec<TimedSegment> {
        merge_adjacent_segments(segments, max_gap)
    }

    pub fn filter_by_confidence(
        &self,
        segments: &[TimedSegment],
        min_confidence: f64,
    ) -> Vec<TimedSegment> {
        filter_by_confidence(segments, min_confidence)
    }
}
