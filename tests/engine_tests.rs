//! End-to-end tests for the dubbing engine using in-process mock providers.
//!
//! Tests that need ffmpeg skip themselves when it is not installed.

use async_trait::async_trait;
use autodub::audio::AudioClip;
use autodub::config::{AssemblyConfig, Config, SynthesisConfig, TimingConfig};
use autodub::error::Result;
use autodub::media::MediaToolkit;
use autodub::pipeline::{DubbingOptions, DubbingPipeline};
use autodub::providers::{
    Recognizer, SpeechSynthesizer, Transcription, TranslationOutput, Translator, VoiceConfig,
};
use autodub::synthesis::{speed_ratio, CancelToken};
use autodub::timeline::{merge_adjacent_segments, TimedSegment, TimingProcessor};
use autodub::{DubError, QualityEvaluator};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Mock providers
// ============================================================================

struct MockRecognizer {
    segments: Vec<TimedSegment>,
    calls: AtomicUsize,
}

impl MockRecognizer {
    fn new(segments: Vec<TimedSegment>) -> Self {
        Self {
            segments,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn transcribe(&self, audio: &Path, _language: Option<&str>) -> Result<Transcription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !audio.exists() {
            return Err(DubError::FileNotFound(audio.display().to_string()));
        }
        Ok(Transcription {
            text: self
                .segments
                .iter()
                .map(|s| s.original_text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            language: "en".to_string(),
            segments: self.segments.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "MockRecognizer"
    }
}

/// Prefixes every segment with the target language code.
struct MockTranslator;

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        segments: &[TimedSegment],
        target_language: &str,
    ) -> Result<TranslationOutput> {
        Ok(TranslationOutput {
            segments: segments
                .iter()
                .map(|s| {
                    s.clone()
                        .with_translation(format!("{target_language} {}", s.original_text))
                })
                .collect(),
            quality_score: 1.0,
        })
    }

    fn name(&self) -> &'static str {
        "MockTranslator"
    }
}

/// Produces a constant-level tone lasting `seconds_per_char` per character.
struct MockSynthesizer {
    seconds_per_char: f64,
    fail_containing: Option<&'static str>,
}

impl MockSynthesizer {
    fn new(seconds_per_char: f64) -> Self {
        Self {
            seconds_per_char,
            fail_containing: None,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>> {
        if self.fail_containing.is_some_and(|needle| text.contains(needle)) {
            return Err(DubError::Api {
                status: 400,
                message: "rejected".to_string(),
            });
        }
        let seconds = text.chars().count() as f64 * self.seconds_per_char;
        AudioClip::new(vec![0.3; (seconds * 24000.0) as usize], 24000).to_wav_bytes()
    }

    fn max_text_length(&self) -> usize {
        4096
    }

    fn name(&self) -> &'static str {
        "MockSynthesizer"
    }
}

fn conversation() -> Vec<TimedSegment> {
    vec![
        TimedSegment::new(0.5, 1.5, "Hello there").with_confidence(-0.1),
        TimedSegment::new(1.55, 2.6, "how are you?").with_confidence(-0.3),
        TimedSegment::new(5.0, 6.5, "Fine thanks.").with_confidence(-0.6),
    ]
}

fn write_source_wav(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("source.wav");
    AudioClip::new(vec![0.1; 16000 * 7], 16000)
        .write_wav(&path)
        .unwrap();
    path
}

fn quiet_options(target: &str) -> DubbingOptions {
    let mut options = DubbingOptions::new(target);
    options.show_progress = false;
    options
}

fn pipeline_with(
    recognizer: Arc<MockRecognizer>,
    synthesizer: MockSynthesizer,
    config: Config,
) -> DubbingPipeline {
    DubbingPipeline::new(
        recognizer,
        Arc::new(MockTranslator),
        Arc::new(synthesizer),
        config,
    )
}

// ============================================================================
// Timeline behaviour
// ============================================================================

mod timeline_tests {
    use super::*;

    #[test]
    fn test_merge_same_speaker_within_gap() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "Hello")
                .with_speaker("A")
                .with_confidence(-0.1),
            TimedSegment::new(1.1, 2.0, "world")
                .with_speaker("A")
                .with_confidence(-0.4),
        ];

        let merged = merge_adjacent_segments(&segments, 0.2);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].original_text, "Hello world");
        assert_eq!(merged[0].start_time, 0.0);
        assert_eq!(merged[0].end_time, 2.0);
        assert_eq!(merged[0].confidence, Some(-0.4));
    }

    #[test]
    fn test_long_silence_starts_new_speaker() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "and then"),
            TimedSegment::new(4.0, 5.0, "we left"),
        ];
        let processor = TimingProcessor::new(TimingConfig::default());

        let tagged = processor.identify_speakers(&segments, true);
        assert_ne!(tagged[0].speaker_id, tagged[1].speaker_id);

        let untagged_gap = processor.identify_speakers(&segments, false);
        assert_eq!(untagged_gap[0].speaker_id, untagged_gap[1].speaker_id);
    }

    #[test]
    fn test_word_timing_covers_segment() {
        let processor = TimingProcessor::default();
        let words = processor
            .extract_word_level_timing(&[TimedSegment::new(2.0, 3.0, "uno, dos tres")]);

        assert_eq!(words.len(), 3);
        assert_eq!(words[0].start_time, 2.0);
        assert_eq!(words[2].end_time, 3.0);
        for pair in words.windows(2) {
            assert!((pair[0].end_time - pair[1].start_time).abs() < 1e-9);
        }
    }

    #[test]
    fn test_undefined_confidence_gives_zeroed_stats() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "a"),
            TimedSegment::new(1.0, 2.0, "b"),
        ];
        let stats = TimingProcessor::default().calculate_confidence_scores(&segments);

        assert_eq!(stats.total_segments, 2);
        assert_eq!(stats.average_confidence, 0.0);
        assert_eq!(stats.high_ratio, 0.0);
        assert_eq!(stats.medium_ratio, 0.0);
        assert_eq!(stats.low_ratio, 0.0);
    }

    #[test]
    fn test_timing_quality_counts_gaps() {
        let metrics = TimingProcessor::default().analyze_timing_quality(&conversation());

        assert_eq!(metrics.total_segments, 3);
        assert_eq!(metrics.gaps_count, 1);
        assert_eq!(metrics.overlaps_count, 0);
        assert_eq!(metrics.confidence_distribution.high, 1);
        assert_eq!(metrics.confidence_distribution.medium, 1);
        assert_eq!(metrics.confidence_distribution.low, 1);
    }
}

// ============================================================================
// Synthesis and scoring
// ============================================================================

mod synthesis_tests {
    use super::*;

    #[test]
    fn test_speed_ratio_bounds() {
        let config = SynthesisConfig::default();

        let ratio = speed_ratio(3.0, 2.0, &config).unwrap();
        assert!((ratio - 1.3).abs() < 1e-9);

        let ratio = speed_ratio(20.0, 2.0, &config).unwrap();
        assert!((ratio - 1.3).abs() < 1e-9);

        let ratio = speed_ratio(0.2, 2.0, &config).unwrap();
        assert!((ratio - 0.7).abs() < 1e-9);

        assert_eq!(speed_ratio(2.05, 2.0, &config), None);
        assert_eq!(speed_ratio(3.0, 0.05, &config), None);
    }

    #[test]
    fn test_quality_evaluation_is_deterministic() {
        let segments: Vec<_> = conversation()
            .into_iter()
            .map(|s| {
                let text = s.original_text.clone();
                s.with_translation(text)
            })
            .collect();
        let track = AudioClip::new(vec![0.2; 24000 * 6], 24000);
        let evaluator = QualityEvaluator::new();

        let first = evaluator.evaluate(&segments, &track, &[(2, 1.2)]);
        let second = evaluator.evaluate(&segments, &track, &[(2, 1.2)]);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.overall));
    }
}

// ============================================================================
// Full pipeline on WAV input
// ============================================================================

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_wav_in_wav_out() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);
        let output = dir.path().join("dubbed.wav");

        let recognizer = Arc::new(MockRecognizer::new(conversation()));
        let pipeline = pipeline_with(
            recognizer.clone(),
            MockSynthesizer::new(0.06),
            Config::default(),
        );

        let outcome = pipeline
            .run(&input, &output, &quiet_options("es"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.stats.segments_recognized, 3);
        // First two segments share a speaker and sit 50ms apart
        assert_eq!(outcome.stats.segments_dubbed, 2);
        assert_eq!(outcome.segments[0].original_text, "Hello there how are you?");
        assert_eq!(outcome.segments[0].translation(), "es Hello there how are you?");
        assert_eq!(outcome.speakers.len(), 2);
        assert!(outcome.replacement.is_none());
        assert!(outcome.synthesis.complete);
        assert_eq!(outcome.synthesis.segments_count, 2);
        assert_eq!(outcome.synthesis.sync.segment_offsets.len(), 2);

        let written = AudioClip::read_wav(&output).unwrap();
        assert_eq!(written.sample_rate, 24000);
        assert!((written.duration() - outcome.synthesis.total_duration).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_confidence_floor_drops_segments() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);
        let output = dir.path().join("dubbed.wav");

        let mut config = Config::default();
        config.timing.min_confidence = Some(-0.5);

        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            MockSynthesizer::new(0.06),
            config,
        );
        let outcome = pipeline
            .run(&input, &output, &quiet_options("es"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.segments_dubbed, 1);
        assert_eq!(outcome.segments[0].end_time, 2.6);
    }

    #[tokio::test]
    async fn test_failed_segment_becomes_silence() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);
        let output = dir.path().join("dubbed.wav");

        let synthesizer = MockSynthesizer {
            seconds_per_char: 0.06,
            fail_containing: Some("Fine"),
        };
        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            synthesizer,
            Config::default(),
        );
        let outcome = pipeline
            .run(&input, &output, &quiet_options("es"), &CancelToken::new())
            .await
            .unwrap();

        assert!(!outcome.synthesis.complete);
        assert_eq!(outcome.synthesis.failed_segments.len(), 1);
        assert_eq!(outcome.synthesis.failed_segments[0].index, 1);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_before_recognition() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);

        let recognizer = Arc::new(MockRecognizer::new(conversation()));
        let pipeline = pipeline_with(
            recognizer.clone(),
            MockSynthesizer::new(0.06),
            Config::default(),
        );
        let result = pipeline
            .run(
                &input,
                &dir.path().join("out.wav"),
                &quiet_options("tlh"),
                &CancelToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DubError::UnsupportedLanguage(_))));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_wav_audio_output_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);
        let output = dir.path().join("out.mp3");

        let recognizer = Arc::new(MockRecognizer::new(conversation()));
        let pipeline = pipeline_with(
            recognizer.clone(),
            MockSynthesizer::new(0.06),
            Config::default(),
        );
        let result = pipeline
            .run(&input, &output, &quiet_options("es"), &CancelToken::new())
            .await;

        match result {
            Err(DubError::InvalidInput(message)) => assert!(message.contains("out.mp3")),
            other => panic!("expected invalid input, got {other:?}"),
        }
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = write_source_wav(&dir);
        let output = dir.path().join("dubbed.wav");
        let cancel = CancelToken::new();
        cancel.cancel();

        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            MockSynthesizer::new(0.06),
            Config::default(),
        );
        let err = pipeline
            .run(&input, &output, &quiet_options("es"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_video_without_toolkit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            MockSynthesizer::new(0.06),
            Config::default(),
        );
        let result = pipeline
            .run(
                &input,
                &dir.path().join("out.wav"),
                &quiet_options("es"),
                &CancelToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DubError::ToolUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            MockSynthesizer::new(0.06),
            Config::default(),
        );
        let result = pipeline
            .run(
                Path::new("/tmp/autodub-missing.wav"),
                Path::new("/tmp/autodub-out.wav"),
                &quiet_options("es"),
                &CancelToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DubError::FileNotFound(_))));
    }
}

// ============================================================================
// ffmpeg-backed tests
// ============================================================================

mod media_tests {
    use super::*;

    fn toolkit() -> Option<MediaToolkit> {
        match MediaToolkit::new(AssemblyConfig::default()) {
            Ok(toolkit) => Some(toolkit),
            Err(e) => {
                eprintln!("Skipping: {e}");
                None
            }
        }
    }

    /// Seven-second test pattern with a sine soundtrack.
    fn make_test_video(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("source.mp4");
        let status = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=7:size=160x120:rate=25",
                "-f",
                "lavfi",
                "-i",
                "sine=frequency=440:duration=7",
                "-c:v",
                "mpeg4",
                "-c:a",
                "aac",
                "-shortest",
            ])
            .arg(&path)
            .output()
            .unwrap();
        assert!(status.status.success(), "ffmpeg failed to build test video");
        path
    }

    #[test]
    fn test_probe_and_extract() {
        let Some(media) = toolkit() else { return };
        let dir = TempDir::new().unwrap();
        let video = make_test_video(&dir);

        let info = media.probe(&video).unwrap();
        assert!(info.has_video());
        assert!(info.has_audio());
        let stream = info.video.as_ref().unwrap();
        assert_eq!((stream.width, stream.height), (160, 120));

        let wav = dir.path().join("extracted.wav");
        let extracted = media.extract_audio(&video, &wav).unwrap();
        assert_eq!(extracted.sample_rate, 16000);
        assert_eq!(extracted.channels, 1);
        assert!(AudioClip::read_wav(&wav).unwrap().duration() > 6.0);
    }

    #[test]
    fn test_convert_to_avi() {
        let Some(media) = toolkit() else { return };
        let dir = TempDir::new().unwrap();
        let video = make_test_video(&dir);
        let output = dir.path().join("converted.avi");

        media.convert_format(&video, &output, false).unwrap();

        let info = media.probe(&output).unwrap();
        assert!(info.has_video());
        assert!(info.has_audio());

        let rejected = media.convert_format(&video, &dir.path().join("out.gif"), false);
        assert!(matches!(rejected, Err(DubError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_video_in_video_out() {
        let Some(media) = toolkit() else { return };
        let dir = TempDir::new().unwrap();
        let video = make_test_video(&dir);
        let output = dir.path().join("dubbed.mp4");

        let pipeline = pipeline_with(
            Arc::new(MockRecognizer::new(conversation())),
            MockSynthesizer::new(0.06),
            Config::default(),
        )
        .with_media(media);

        let outcome = pipeline
            .run(&video, &output, &quiet_options("es"), &CancelToken::new())
            .await
            .unwrap();

        let replacement = outcome.replacement.expect("video output replaces audio");
        assert!(replacement.video_copied);
        assert!(replacement.quality_preserved);
        assert!(output.exists());
    }
}
