use crate::audio::AudioClip;
use crate::config::Config;
use crate::error::{DubError, Result, StageContext};
use crate::media::{is_supported_video, AudioReplacementResult, MediaInfo, MediaToolkit};
use crate::providers::{Recognizer, SpeechSynthesizer, Translator, VoiceConfig};
use crate::synthesis::{CancelToken, SpeechSynthesisResult, SynthesisOrchestrator, TempoAdjuster};
use crate::timeline::{
    filter_by_confidence, validate_order, ConfidenceStats, SpeakerStats, TimedSegment,
    TimingProcessor, TimingQualityMetrics,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Per-run options for the dubbing pipeline.
#[derive(Debug, Clone)]
pub struct DubbingOptions {
    /// Language to dub into.
    pub target_language: String,
    /// Source language hint for recognition. `None` lets the provider detect it.
    pub source_language: Option<String>,
    /// Synthesis voice id.
    pub voice: String,
    /// Copy the video stream when possible instead of re-encoding.
    pub preserve_quality: bool,
    /// Show progress bars.
    pub show_progress: bool,
}

impl DubbingOptions {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
            source_language: None,
            voice: "alloy".to_string(),
            preserve_quality: true,
            show_progress: true,
        }
    }
}

/// Timing of each pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub translation_time: Duration,
    pub synthesis_time: Duration,
    pub replacement_time: Duration,
    /// Segments returned by recognition.
    pub segments_recognized: usize,
    /// Segments left after merging and filtering.
    pub segments_dubbed: usize,
    /// Source duration in seconds.
    pub source_duration: f64,
}

/// Everything a dubbing run produced.
#[derive(Debug)]
pub struct DubbingOutcome {
    pub output_path: PathBuf,
    pub detected_language: String,
    pub segments: Vec<TimedSegment>,
    pub confidence: ConfidenceStats,
    pub timing: TimingQualityMetrics,
    pub speakers: Vec<SpeakerStats>,
    pub translation_quality: f64,
    pub synthesis: SpeechSynthesisResult,
    /// Present when the output is a video with its audio track replaced.
    pub replacement: Option<AudioReplacementResult>,
    pub stats: PipelineStats,
}

/// Cleanup guard that removes the temp directory when dropped.
struct TempCleanupGuard {
    temp_dir: Option<TempDir>,
    cancel: CancelToken,
}

impl TempCleanupGuard {
    fn path(&self) -> &Path {
        self.temp_dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for TempCleanupGuard {
    fn drop(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.path().to_path_buf();
            if self.cancel.is_cancelled() {
                warn!("Pipeline cancelled, cleaning up temp files: {:?}", path);
            } else {
                debug!("Cleaning up temp directory: {:?}", path);
            }
            // TempDir deletes itself on drop
        }
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// End-to-end dubbing: recognize, shape the timeline, translate, synthesize,
/// assemble and (for video) replace the audio track.
pub struct DubbingPipeline {
    recognizer: Arc<dyn Recognizer>,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tempo: Option<Arc<dyn TempoAdjuster>>,
    media: Option<MediaToolkit>,
    config: Config,
}

impl DubbingPipeline {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: Config,
    ) -> Self {
        Self {
            recognizer,
            translator,
            synthesizer,
            tempo: None,
            media: None,
            config,
        }
    }

    /// Enable video input/output. Without a toolkit only WAV input works.
    pub fn with_media(mut self, media: MediaToolkit) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_tempo(mut self, tempo: Arc<dyn TempoAdjuster>) -> Self {
        self.tempo = Some(tempo);
        self
    }

    fn media(&self) -> Result<&MediaToolkit> {
        self.media.as_ref().ok_or_else(|| {
            DubError::ToolUnavailable("ffmpeg is required for non-WAV media".to_string())
        })
    }

    /// Shape recognized segments into the timeline that gets translated.
    fn prepare_timeline(&self, segments: &[TimedSegment]) -> Result<Vec<TimedSegment>> {
        let timing = &self.config.timing;
        let processor = TimingProcessor::new(timing.clone());

        let diarized = processor.identify_speakers(segments, timing.use_silence_detection);
        let merged = processor.merge_adjacent_segments(&diarized, timing.merge_max_gap);
        debug!("Merged {} segments into {}", diarized.len(), merged.len());

        let kept = match timing.min_confidence {
            Some(min) => {
                let kept = filter_by_confidence(&merged, min);
                if kept.len() < merged.len() {
                    info!(
                        "Dropped {} low-confidence segments (below {:.2})",
                        merged.len() - kept.len(),
                        min
                    );
                }
                kept
            }
            None => merged,
        };

        if kept.is_empty() {
            return Err(DubError::InvalidInput(
                "no segments left after confidence filtering".to_string(),
            ));
        }
        Ok(kept)
    }

    /// Run the whole pipeline on `input`, writing `output`.
    ///
    /// A video `output` (by extension) gets the source video with its audio
    /// replaced. A `.wav` output receives the dubbed speech track. Any other
    /// extension is rejected before work starts.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &DubbingOptions,
        cancel: &CancelToken,
    ) -> Result<DubbingOutcome> {
        let start_time = Instant::now();
        let mut stats = PipelineStats::default();

        if !input.exists() {
            return Err(DubError::FileNotFound(input.display().to_string()));
        }
        let wants_video = is_supported_video(output);
        if !wants_video && !is_wav(output) {
            return Err(DubError::InvalidInput(format!(
                "cannot write {}: output must be a supported video format or .wav",
                output.display()
            )));
        }
        self.config
            .synthesis
            .check_language(&options.target_language)?;

        let temp_dir = TempDir::new().stage("setup")?;
        let guard = TempCleanupGuard {
            temp_dir: Some(temp_dir),
            cancel: cancel.clone(),
        };
        let temp_path = guard.path().to_path_buf();
        debug!("Using temp directory: {:?}", temp_path);

        // ═══════════════════════════════════════════════════════════════════
        // Stage 1: Audio Extraction
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 1/5: Preparing audio from {:?}", input);
        let extraction_start = Instant::now();

        let source: Option<MediaInfo> = match &self.media {
            Some(media) => Some(media.probe(input).stage("probe")?),
            None => None,
        };

        if wants_video && !source.as_ref().is_some_and(MediaInfo::has_video) {
            return Err(DubError::InvalidInput(format!(
                "{} has no video stream to dub into {}",
                input.display(),
                output.display()
            )));
        }

        let audio_path = if is_wav(input) {
            input.to_path_buf()
        } else {
            let extracted = temp_path.join("source.wav");
            self.media()?
                .extract_audio(input, &extracted)
                .stage("extraction")?;
            extracted
        };

        stats.source_duration = match &source {
            Some(info) => info.duration,
            None => AudioClip::read_wav(&audio_path)
                .stage("extraction")?
                .duration(),
        };
        stats.extraction_time = extraction_start.elapsed();

        cancel.check()?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 2: Transcription
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 2/5: Transcribing with {}", self.recognizer.name());
        let transcription_start = Instant::now();

        let transcription = self
            .recognizer
            .transcribe(&audio_path, options.source_language.as_deref())
            .await
            .stage("transcription")?;
        validate_order(&transcription.segments).stage("transcription")?;

        stats.segments_recognized = transcription.segments.len();
        stats.transcription_time = transcription_start.elapsed();
        info!(
            "Transcription complete: {} segments ({}) in {:.2}s",
            transcription.segments.len(),
            transcription.language,
            stats.transcription_time.as_secs_f64()
        );

        let processor = TimingProcessor::new(self.config.timing.clone());
        let timeline = self.prepare_timeline(&transcription.segments)?;
        let confidence = processor.calculate_confidence_scores(&timeline);
        let timing = processor.analyze_timing_quality(&timeline);
        stats.segments_dubbed = timeline.len();

        debug!(
            "Confidence: avg {:.3}, high {:.0}%, low {:.0}%",
            confidence.average_confidence,
            confidence.high_ratio * 100.0,
            confidence.low_ratio * 100.0
        );

        cancel.check()?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 3: Translation
        // ═══════════════════════════════════════════════════════════════════
        info!(
            "Stage 3/5: Translating {} segments to {} with {}",
            timeline.len(),
            options.target_language,
            self.translator.name()
        );
        let translation_start = Instant::now();

        let translation = self
            .translator
            .translate(&timeline, &options.target_language)
            .await
            .stage("translation")?;
        if translation.segments.len() != timeline.len() {
            return Err(DubError::InvalidInput(format!(
                "translator returned {} segments for {}",
                translation.segments.len(),
                timeline.len()
            ))
            .in_stage("translation"));
        }
        stats.translation_time = translation_start.elapsed();

        cancel.check()?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 4: Synthesis and assembly
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 4/5: Synthesizing speech");
        let synthesis_start = Instant::now();

        let mut orchestrator =
            SynthesisOrchestrator::new(self.synthesizer.clone(), self.config.synthesis.clone())
                .with_progress(options.show_progress);
        if let Some(tempo) = &self.tempo {
            orchestrator = orchestrator.with_tempo(tempo.clone());
        }

        let voice = VoiceConfig::new(&options.voice, &options.target_language);
        let track_path = if wants_video {
            temp_path.join("dub.wav")
        } else {
            output.to_path_buf()
        };

        let (synthesis, track) = orchestrator
            .synthesize_speech(
                &translation.segments,
                &voice,
                &track_path,
                &self.config.assembly,
                cancel,
            )
            .await
            .stage("synthesis")?;
        stats.synthesis_time = synthesis_start.elapsed();

        cancel.check()?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 5: Audio track replacement
        // ═══════════════════════════════════════════════════════════════════
        let replacement = if wants_video {
            info!("Stage 5/5: Replacing audio track");
            let replacement_start = Instant::now();

            // Line the dub up with the source: the track starts at the first segment
            let lead_in = translation
                .segments
                .first()
                .map(|s| s.start_time)
                .unwrap_or(0.0);
            let mut aligned = AudioClip::silence(lead_in, track.sample_rate);
            aligned.append(&track);
            let aligned_path = temp_path.join("dub_aligned.wav");
            aligned.write_wav(&aligned_path).stage("replacement")?;

            let result = self
                .media()?
                .replace_audio_track(input, &aligned_path, output, options.preserve_quality)
                .stage("replacement")?;
            if !result.quality_preserved {
                warn!("Output video properties differ from the source");
            }
            stats.replacement_time = replacement_start.elapsed();
            Some(result)
        } else {
            info!("Stage 5/5: Wrote dubbed audio to {:?}", output);
            None
        };

        stats.total_time = start_time.elapsed();

        Ok(DubbingOutcome {
            output_path: output.to_path_buf(),
            detected_language: transcription.language,
            speakers: processor.speaker_statistics(&translation.segments),
            segments: translation.segments,
            confidence,
            timing,
            translation_quality: translation.quality_score,
            synthesis,
            replacement,
            stats,
        })
    }
}

/// Print a summary of the dubbing results.
pub fn print_summary(outcome: &DubbingOutcome) {
    let synthesis = &outcome.synthesis;
    let quality = &synthesis.quality;

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Dubbing Complete                        ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", outcome.output_path.display());
    println!("  Language:   {} (source)", outcome.detected_language);
    println!(
        "  Segments:   {} dubbed of {} recognized, {} speakers",
        outcome.stats.segments_dubbed,
        outcome.stats.segments_recognized,
        outcome.speakers.len()
    );
    println!(
        "  Duration:   {:.1}s source, {:.1}s dubbed speech",
        outcome.stats.source_duration, synthesis.total_duration
    );
    println!();
    println!("  Quality:");
    println!("    Overall:     {:.2}", quality.overall);
    println!("    Timing:      {:.2}", quality.timing_accuracy);
    println!(
        "    Adjustments: {:.2} ({} segments sped up or slowed down)",
        quality.adjustment_score,
        synthesis.timing_adjustments.len()
    );
    println!("    Audio:       {:.2}", quality.audio_quality);
    println!(
        "    Sync:        {:.2} (avg offset {:.2}s, max {:.2}s)",
        synthesis.sync.sync_score, synthesis.sync.avg_offset, synthesis.sync.max_offset
    );
    println!("    Translation: {:.2}", outcome.translation_quality);
    if let Some(ref replacement) = outcome.replacement {
        println!(
            "    Video:       {} ({})",
            if replacement.quality_preserved {
                "preserved"
            } else {
                "changed"
            },
            if replacement.video_copied {
                "stream copy"
            } else {
                "re-encoded"
            }
        );
    }
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        outcome.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Transcribe:  {:.2}s",
        outcome.stats.transcription_time.as_secs_f64()
    );
    println!(
        "    Translate:   {:.2}s",
        outcome.stats.translation_time.as_secs_f64()
    );
    println!(
        "    Synthesize:  {:.2}s",
        outcome.stats.synthesis_time.as_secs_f64()
    );
    if outcome.replacement.is_some() {
        println!(
            "    Replace:     {:.2}s",
            outcome.stats.replacement_time.as_secs_f64()
        );
    }
    println!(
        "    Total:       {:.2}s",
        outcome.stats.total_time.as_secs_f64()
    );
    if !synthesis.complete {
        println!();
        println!(
            "  Warning: {} segment(s) failed and were replaced with silence:",
            synthesis.failed_segments.len()
        );
        for failure in &synthesis.failed_segments {
            println!("    #{}: {}", failure.index, failure.message);
        }
    }
    if !synthesis.sync.is_in_sync() {
        println!();
        println!("  Sync issues:");
        for issue in &synthesis.sync.issues {
            println!("    - {}", issue);
        }
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
