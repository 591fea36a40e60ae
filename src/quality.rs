//! Diagnostic scoring of an assembled dub. Scores never gate the pipeline.

use serde::Serialize;

use crate::audio::AudioClip;
use crate::timeline::TimedSegment;

/// Component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityReport {
    pub timing_accuracy: f64,
    pub adjustment_score: f64,
    pub audio_quality: f64,
    pub completeness: f64,
    /// Unweighted mean of timing accuracy, adjustment score and audio quality.
    pub overall: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityEvaluator;

impl QualityEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Score `track` as the rendering of `segments`, given the speed
    /// corrections `(segment index, ratio)` applied while synthesizing.
    pub fn evaluate(
        &self,
        segments: &[TimedSegment],
        track: &AudioClip,
        adjustments: &[(usize, f64)],
    ) -> QualityReport {
        let timing_accuracy = timing_accuracy(segments, track.duration());
        let adjustment_score = adjustment_score(segments.len(), adjustments);
        let audio_quality = audio_quality(track);

        QualityReport {
            timing_accuracy,
            adjustment_score,
            audio_quality,
            completeness: completeness(segments, track.duration()),
            overall: (timing_accuracy + adjustment_score + audio_quality) / 3.0,
        }
    }
}

/// Span from the first segment's start to the last segment's end.
fn expected_span(segments: &[TimedSegment]) -> f64 {
    match (segments.first(), segments.last()) {
        (Some(first), Some(last)) => last.end_time - first.start_time,
        _ => 0.0,
    }
}

pub fn timing_accuracy(segments: &[TimedSegment], actual: f64) -> f64 {
    let expected = expected_span(segments);
    if expected <= 0.0 {
        return 0.5;
    }
    (1.0 - (actual - expected).abs() / expected).clamp(0.0, 1.0)
}

/// Penalize both how many segments needed speed correction and how large the
/// corrections were.
pub fn adjustment_score(segment_count: usize, adjustments: &[(usize, f64)]) -> f64 {
    if segment_count == 0 || adjustments.is_empty() {
        return 1.0;
    }
    let proportion = (adjustments.len() as f64 / segment_count as f64).min(1.0);
    let mean_deviation =
        adjustments.iter().map(|(_, r)| (r - 1.0).abs()).sum::<f64>() / adjustments.len() as f64;

    (1.0 - 0.5 * proportion - 0.5 * mean_deviation).clamp(0.0, 1.0)
}

fn length_band(seconds: f64) -> f64 {
    if seconds < 0.1 {
        0.2
    } else if seconds < 0.5 {
        0.6
    } else {
        1.0
    }
}

fn loudness_band(dbfs: Option<f64>) -> f64 {
    match dbfs {
        None => 0.2,
        Some(db) if db < -45.0 => 0.2,
        Some(db) if db < -35.0 => 0.6,
        Some(db) if db > -3.0 => 0.6,
        Some(_) => 1.0,
    }
}

fn sample_rate_band(rate: u32) -> f64 {
    match rate {
        r if r >= 44100 => 1.0,
        r if r >= 22050 => 0.9,
        r if r >= 16000 => 0.7,
        _ => 0.4,
    }
}

/// Signal heuristic from clip length, loudness and sample rate.
pub fn audio_quality(clip: &AudioClip) -> f64 {
    (length_band(clip.duration()) + loudness_band(clip.dbfs()) + sample_rate_band(clip.sample_rate))
        / 3.0
}

/// Share of segments with translated text, averaged with how much of the
/// expected span the track covers.
pub fn completeness(segments: &[TimedSegment], actual: f64) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    let translated = segments
        .iter()
        .filter(|s| !s.translation().is_empty())
        .count() as f64
        / segments.len() as f64;

    let expected = expected_span(segments);
    let coverage = if expected <= 0.0 {
        1.0
    } else {
        (actual / expected).min(1.0)
    };

    (translated + coverage) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sine tone at the given RMS level in dBFS.
    fn tone(seconds: f64, rate: u32, dbfs: f64) -> AudioClip {
        let rms = 10f64.powf(dbfs / 20.0);
        let amplitude = (rms * std::f64::consts::SQRT_2) as f32;
        let len = (seconds * rate as f64) as usize;
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
            .collect();
        AudioClip::new(samples, rate)
    }

    fn segments() -> Vec<TimedSegment> {
        vec![
            TimedSegment::new(0.0, 1.0, "Hello").with_translation("Hola"),
            TimedSegment::new(1.0, 2.0, "world").with_translation("mundo"),
        ]
    }

    #[test]
    fn test_good_audio_scores_high() {
        let clip = tone(2.0, 44100, -20.0);
        let report = QualityEvaluator::new().evaluate(&segments(), &clip, &[]);

        assert!(report.audio_quality > 0.99);
        assert!(report.overall >= 0.8, "overall {}", report.overall);
        assert!(report.timing_accuracy > 0.99);
        assert!(report.completeness > 0.99);
    }

    #[test]
    fn test_poor_audio_scores_low() {
        let clip = tone(0.05, 8000, -50.0);
        assert!(audio_quality(&clip) < 0.3);

        let report = QualityEvaluator::new().evaluate(&segments(), &clip, &[]);
        assert!(report.overall < 0.8);
    }

    #[test]
    fn test_adjustments_lower_score() {
        let clip = tone(2.0, 44100, -20.0);
        let evaluator = QualityEvaluator::new();
        let clean = evaluator.evaluate(&segments(), &clip, &[]);
        let adjusted = evaluator.evaluate(&segments(), &clip, &[(0, 1.3), (1, 0.7)]);

        assert!(adjusted.overall < clean.overall);
        assert!(adjusted.overall < 0.9);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let clip = tone(1.7, 22050, -12.0);
        let evaluator = QualityEvaluator::new();
        let adjustments = [(1, 1.15)];

        let first = evaluator.evaluate(&segments(), &clip, &adjustments);
        let second = evaluator.evaluate(&segments(), &clip, &adjustments);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_segments() {
        let clip = AudioClip::silence(1.0, 24000);
        let report = QualityEvaluator::new().evaluate(&[], &clip, &[]);

        assert_eq!(report.completeness, 0.0);
        assert_eq!(report.timing_accuracy, 0.5);
        assert_eq!(report.adjustment_score, 1.0);
    }

    #[test]
    fn test_timing_accuracy_clamps() {
        assert_eq!(timing_accuracy(&segments(), 2.0), 1.0);
        assert!((timing_accuracy(&segments(), 1.5) - 0.75).abs() < 1e-9);
        assert_eq!(timing_accuracy(&segments(), 10.0), 0.0);
    }

    #[test]
    fn test_bands() {
        assert_eq!(loudness_band(None), 0.2);
        assert_eq!(loudness_band(Some(-40.0)), 0.6);
        assert_eq!(loudness_band(Some(-1.0)), 0.6);
        assert_eq!(loudness_band(Some(-20.0)), 1.0);
        assert_eq!(sample_rate_band(24000), 0.9);
        assert_eq!(sample_rate_band(16000), 0.7);
        assert_eq!(length_band(0.3), 0.6);
    }

    #[test]
    fn test_completeness_counts_missing_translations() {
        let segs = vec![
            TimedSegment::new(0.0, 1.0, "a").with_translation("x"),
            TimedSegment::new(1.0, 2.0, "b"),
        ];
        assert!((completeness(&segs, 2.0) - 0.75).abs() < 1e-9);
        assert!((completeness(&segs, 1.0) - 0.5).abs() < 1e-9);
    }
}
