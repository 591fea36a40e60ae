use super::{gap_between, tokenize, TimedSegment};
use crate::config::TimingConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate recognition confidence over a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfidenceStats {
    /// Mean over segments that carry a confidence value.
    pub average_confidence: f64,
    pub high_ratio: f64,
    pub medium_ratio: f64,
    pub low_ratio: f64,
    /// All segments, including those without a confidence value.
    pub total_segments: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Diagnostic timing report for a sequence. Never gates the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingQualityMetrics {
    pub total_segments: usize,
    pub average_segment_duration: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub speaker_distribution: BTreeMap<String, usize>,
    pub gaps_count: usize,
    pub overlaps_count: usize,
    pub total_speech_time: f64,
    pub total_silence_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakerStats {
    pub speaker_id: String,
    pub total_duration: f64,
    pub segment_count: usize,
    pub average_confidence: f64,
    pub word_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    High,
    Medium,
    Low,
}

fn bucket(confidence: f64, config: &TimingConfig) -> Bucket {
    if confidence >= config.high_confidence {
        Bucket::High
    } else if confidence >= config.medium_confidence {
        Bucket::Medium
    } else {
        Bucket::Low
    }
}

fn distribution<'a>(
    confidences: impl Iterator<Item = &'a f64>,
    config: &TimingConfig,
) -> ConfidenceDistribution {
    confidences.fold(ConfidenceDistribution::default(), |mut dist, &c| {
        match bucket(c, config) {
            Bucket::High => dist.high += 1,
            Bucket::Medium => dist.medium += 1,
            Bucket::Low => dist.low += 1,
        }
        dist
    })
}

/// Average confidence and high/medium/low ratios.
///
/// Segments without a confidence are excluded from the average and the ratios
/// but still counted in `total_segments`. Empty or all-undefined input gives
/// zeroed statistics.
pub fn calculate_confidence_scores(
    segments: &[TimedSegment],
    config: &TimingConfig,
) -> ConfidenceStats {
    let confidences: Vec<f64> = segments.iter().filter_map(|s| s.confidence).collect();

    if confidences.is_empty() {
        return ConfidenceStats {
            total_segments: segments.len(),
            ..Default::default()
        };
    }

    let total = confidences.len() as f64;
    let dist = distribution(confidences.iter(), config);

    ConfidenceStats {
        average_confidence: confidences.iter().sum::<f64>() / total,
        high_ratio: dist.high as f64 / total,
        medium_ratio: dist.medium as f64 / total,
        low_ratio: dist.low as f64 / total,
        total_segments: segments.len(),
    }
}

/// Durations, confidence buckets, speaker counts, gaps and overlaps.
pub fn analyze_timing_quality(
    segments: &[TimedSegment],
    config: &TimingConfig,
) -> TimingQualityMetrics {
    if segments.is_empty() {
        return TimingQualityMetrics::default();
    }

    let total_speech_time: f64 = segments.iter().map(TimedSegment::duration).sum();

    let mut speaker_distribution = BTreeMap::new();
    for speaker in segments.iter().filter_map(|s| s.speaker_id.as_ref()) {
        *speaker_distribution.entry(speaker.clone()).or_insert(0) += 1;
    }

    let mut gaps_count = 0;
    let mut overlaps_count = 0;
    let mut total_silence_time = 0.0;
    for pair in segments.windows(2) {
        let gap = gap_between(&pair[0], &pair[1]);
        if gap > config.gap_threshold {
            gaps_count += 1;
            total_silence_time += gap;
        } else if gap < config.overlap_threshold {
            overlaps_count += 1;
        }
    }

    TimingQualityMetrics {
        total_segments: segments.len(),
        average_segment_duration: total_speech_time / segments.len() as f64,
        confidence_distribution: distribution(
            segments.iter().filter_map(|s| s.confidence.as_ref()),
            config,
        ),
        speaker_distribution,
        gaps_count,
        overlaps_count,
        total_speech_time,
        total_silence_time,
    }
}

/// Per-speaker totals, longest speaking time first. Untagged segments are
/// grouped under `"unknown"`.
pub fn speaker_statistics(segments: &[TimedSegment]) -> Vec<SpeakerStats> {
    #[derive(Default)]
    struct Acc {
        duration: f64,
        count: usize,
        confidences: Vec<f64>,
        words: usize,
    }

    let mut by_speaker: BTreeMap<&str, Acc> = BTreeMap::new();
    for seg in segments {
        let acc = by_speaker
            .entry(seg.speaker_id.as_deref().unwrap_or("unknown"))
            .or_default();
        acc.duration += seg.duration();
        acc.count += 1;
        acc.confidences.extend(seg.confidence);
        acc.words += tokenize(&seg.original_text).len();
    }

    let mut stats: Vec<SpeakerStats> = by_speaker
        .into_iter()
        .map(|(speaker, acc)| SpeakerStats {
            speaker_id: speaker.to_string(),
            total_duration: acc.duration,
            segment_count: acc.count,
            average_confidence: if acc.confidences.is_empty() {
                0.0
            } else {
                acc.confidences.iter().sum::<f64>() / acc.confidences.len() as f64
            },
            word_count: acc.words,
        })
        .collect();

    stats.sort_by(|a, b| b.total_duration.total_cmp(&a.total_duration));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TimingConfig {
        TimingConfig::default()
    }

    #[test]
    fn test_confidence_empty_input() {
        let stats = calculate_confidence_scores(&[], &config());
        assert_eq!(stats, ConfidenceStats::default());
    }

    #[test]
    fn test_confidence_all_undefined() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "a"),
            TimedSegment::new(1.0, 2.0, "b"),
        ];
        let stats = calculate_confidence_scores(&segments, &config());

        assert_eq!(stats.average_confidence, 0.0);
        assert_eq!(stats.high_ratio, 0.0);
        assert_eq!(stats.medium_ratio, 0.0);
        assert_eq!(stats.low_ratio, 0.0);
        assert_eq!(stats.total_segments, 2);
    }

    #[test]
    fn test_confidence_buckets() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "a").with_confidence(-0.1),
            TimedSegment::new(1.0, 2.0, "b").with_confidence(-0.2),
            TimedSegment::new(2.0, 3.0, "c").with_confidence(-0.5),
            TimedSegment::new(3.0, 4.0, "d").with_confidence(-0.9),
            TimedSegment::new(4.0, 5.0, "e"),
        ];
        let stats = calculate_confidence_scores(&segments, &config());

        assert!((stats.average_confidence - (-0.425)).abs() < 1e-9);
        assert_eq!(stats.high_ratio, 0.5);
        assert_eq!(stats.medium_ratio, 0.25);
        assert_eq!(stats.low_ratio, 0.25);
        assert_eq!(stats.total_segments, 5);
    }

    #[test]
    fn test_timing_quality_empty() {
        let metrics = analyze_timing_quality(&[], &config());
        assert_eq!(metrics.total_segments, 0);
        assert!(metrics.speaker_distribution.is_empty());
    }

    #[test]
    fn test_timing_quality_gaps_and_overlaps() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "a")
                .with_speaker("speaker_1")
                .with_confidence(-0.1),
            // 0.5s gap
            TimedSegment::new(1.5, 2.5, "b").with_speaker("speaker_2"),
            // 0.05s gap: neither gap nor overlap
            TimedSegment::new(2.55, 3.0, "c").with_speaker("speaker_2"),
            // 0.2s overlap
            TimedSegment::new(2.8, 4.0, "d")
                .with_speaker("speaker_1")
                .with_confidence(-0.7),
        ];
        let metrics = analyze_timing_quality(&segments, &config());

        assert_eq!(metrics.total_segments, 4);
        assert_eq!(metrics.gaps_count, 1);
        assert_eq!(metrics.overlaps_count, 1);
        assert!((metrics.total_silence_time - 0.5).abs() < 1e-9);
        assert!((metrics.total_speech_time - 3.65).abs() < 1e-9);
        assert!((metrics.average_segment_duration - 3.65 / 4.0).abs() < 1e-9);
        assert_eq!(metrics.speaker_distribution["speaker_1"], 2);
        assert_eq!(metrics.speaker_distribution["speaker_2"], 2);
        assert_eq!(
            metrics.confidence_distribution,
            ConfidenceDistribution {
                high: 1,
                medium: 0,
                low: 1
            }
        );
    }

    #[test]
    fn test_speaker_statistics() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "one two")
                .with_speaker("speaker_1")
                .with_confidence(-0.2),
            TimedSegment::new(1.0, 4.0, "three four five").with_speaker("speaker_2"),
            TimedSegment::new(4.0, 5.0, "six")
                .with_speaker("speaker_1")
                .with_confidence(-0.4),
            TimedSegment::new(5.0, 5.5, "seven"),
        ];
        let stats = speaker_statistics(&segments);

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].speaker_id, "speaker_2");
        assert_eq!(stats[0].total_duration, 3.0);
        assert_eq!(stats[0].average_confidence, 0.0);
        assert_eq!(stats[1].speaker_id, "speaker_1");
        assert_eq!(stats[1].segment_count, 2);
        assert_eq!(stats[1].word_count, 3);
        assert!((stats[1].average_confidence - (-0.3)).abs() < 1e-9);
        assert_eq!(stats[2].speaker_id, "unknown");
    }
}
