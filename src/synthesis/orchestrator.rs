use crate::assembly::assemble_track_with_starts;
use crate::audio::AudioClip;
use crate::config::{AssemblyConfig, SynthesisConfig};
use crate::error::{DubError, Result};
use crate::providers::{SpeechSynthesizer, VoiceConfig};
use crate::quality::{QualityEvaluator, QualityReport};
use crate::synthesis::chunk::split_text;
use crate::synthesis::retry::{with_retry, CancelToken};
use crate::synthesis::tempo::{speed_ratio, ResampleTempo, TempoAdjuster};
use crate::sync::{analyze_sync, SyncAnalysis};
use crate::timeline::{validate_order, TimedSegment};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Rendered audio for one segment.
#[derive(Debug)]
pub enum SegmentAudio {
    /// Synthesized speech, with the speed correction applied if any.
    Speech {
        clip: AudioClip,
        speed_ratio: Option<f64>,
    },
    /// Placeholder for a segment with no translated text.
    Silence { clip: AudioClip },
    /// Synthesis failed after retries.
    Failed { error: DubError },
}

impl SegmentAudio {
    pub fn clip(&self) -> Option<&AudioClip> {
        match self {
            SegmentAudio::Speech { clip, .. } | SegmentAudio::Silence { clip } => Some(clip),
            SegmentAudio::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SegmentAudio::Failed { .. })
    }
}

/// Outcome for a single segment, tagged with its position in the input.
#[derive(Debug)]
pub struct SegmentResult {
    pub index: usize,
    /// Duration of the source segment in seconds.
    pub target_duration: f64,
    pub audio: SegmentAudio,
    pub elapsed: Duration,
}

/// A segment that could not be synthesized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFailure {
    pub index: usize,
    pub message: String,
}

/// Statistics from a synthesis run.
#[derive(Debug, Clone, Default)]
pub struct SynthesisStats {
    pub total_segments: usize,
    pub spoken_segments: usize,
    pub silent_segments: usize,
    pub failed_segments: usize,
    pub adjusted_segments: usize,
    pub total_time: Duration,
    pub avg_segment_time: Duration,
}

/// Per-segment results in input order.
#[derive(Debug)]
pub struct SynthesisOutput {
    pub results: Vec<SegmentResult>,
    pub stats: SynthesisStats,
    sample_rate: u32,
}

impl SynthesisOutput {
    /// One clip per segment. Failed segments become silence of their source
    /// duration so the timeline keeps its length.
    pub fn clips(&self) -> Vec<AudioClip> {
        self.results
            .iter()
            .map(|r| match r.audio.clip() {
                Some(clip) => clip.clone(),
                None => AudioClip::silence(r.target_duration, self.sample_rate),
            })
            .collect()
    }

    /// Speed corrections as `(segment index, ratio)`.
    pub fn timing_adjustments(&self) -> Vec<(usize, f64)> {
        self.results
            .iter()
            .filter_map(|r| match r.audio {
                SegmentAudio::Speech {
                    speed_ratio: Some(ratio),
                    ..
                } => Some((r.index, ratio)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<SegmentFailure> {
        self.results
            .iter()
            .filter_map(|r| match &r.audio {
                SegmentAudio::Failed { error } => Some(SegmentFailure {
                    index: r.index,
                    message: error.to_string(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| !r.audio.is_failed())
    }
}

/// Summary of a synthesized and assembled speech track.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechSynthesisResult {
    pub audio_path: PathBuf,
    pub total_duration: f64,
    pub segments_count: usize,
    pub processing_time: Duration,
    pub quality_score: f64,
    pub quality: QualityReport,
    pub timing_adjustments: Vec<(usize, f64)>,
    /// Where each segment's speech landed relative to its source start.
    pub sync: SyncAnalysis,
    pub failed_segments: Vec<SegmentFailure>,
    /// False when any segment failed and was filled with silence.
    pub complete: bool,
}

/// Orchestrates concurrent, duration-matched synthesis of segments.
pub struct SynthesisOrchestrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tempo: Arc<dyn TempoAdjuster>,
    config: SynthesisConfig,
    show_progress: bool,
}

impl SynthesisOrchestrator {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, config: SynthesisConfig) -> Self {
        Self {
            synthesizer,
            tempo: Arc::new(ResampleTempo),
            config,
            show_progress: true,
        }
    }

    /// Use a different speed-correction backend.
    pub fn with_tempo(mut self, tempo: Arc<dyn TempoAdjuster>) -> Self {
        self.tempo = tempo;
        self
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn chunk_limit(&self) -> usize {
        self.config
            .max_text_length
            .min(self.synthesizer.max_text_length())
            .max(1)
    }

    /// Synthesize one segment: chunk, call the provider with retries, join
    /// chunks, then match the segment duration.
    async fn render_segment(
        &self,
        segment: &TimedSegment,
        voice: &VoiceConfig,
        cancel: &CancelToken,
    ) -> Result<SegmentAudio> {
        let text = segment.translation();
        if text.is_empty() {
            return Ok(SegmentAudio::Silence {
                clip: AudioClip::silence(segment.duration(), self.config.sample_rate),
            });
        }

        let policy = self.config.retry.policy();
        let mut pieces = Vec::new();
        for chunk in split_text(text, self.chunk_limit()) {
            let bytes = with_retry(&policy, cancel, |_| {
                self.synthesizer.synthesize(&chunk, voice)
            })
            .await?;
            pieces.push(AudioClip::from_wav_bytes(&bytes)?);
        }

        let speech = AudioClip::concat(&pieces)?;
        let ratio = speed_ratio(speech.duration(), segment.duration(), &self.config);

        let clip = match ratio {
            Some(r) => {
                debug!(
                    "Adjusting {:.2}s of speech to {:.2}s window (x{:.2}, {})",
                    speech.duration(),
                    segment.duration(),
                    r,
                    self.tempo.name()
                );
                // Adjusters may shell out, so keep them off the task that
                // drives the other segments
                let tempo = Arc::clone(&self.tempo);
                let adjusting = tokio::task::spawn_blocking(move || tempo.adjust(&speech, r));
                tokio::select! {
                    joined = adjusting => joined.map_err(|e| {
                        DubError::Media(format!("speed correction task failed: {e}"))
                    })??,
                    _ = cancel.cancelled() => return Err(DubError::Cancelled),
                }
            }
            None => speech,
        };

        Ok(SegmentAudio::Speech {
            clip,
            speed_ratio: ratio,
        })
    }

    /// Synthesize every segment with bounded concurrency.
    ///
    /// A segment whose retries are exhausted is reported as
    /// [`SegmentAudio::Failed`] without affecting its siblings. Cancelling
    /// `cancel` aborts in-flight calls and discards all results.
    pub async fn synthesize_segments(
        &self,
        segments: &[TimedSegment],
        voice: &VoiceConfig,
        cancel: &CancelToken,
    ) -> Result<SynthesisOutput> {
        validate_order(segments)?;
        self.config.check_language(&voice.language)?;

        let total_segments = segments.len();
        let start_time = Instant::now();

        info!(
            "Synthesizing {} segments with {} concurrent requests using {}",
            total_segments,
            self.config.concurrency,
            self.synthesizer.name()
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_segments as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        // Use semaphore to limit concurrency
        let semaphore = Semaphore::new(self.config.concurrency.max(1));
        let mut futures = FuturesUnordered::new();

        for (index, segment) in segments.iter().enumerate() {
            let semaphore = &semaphore;
            let pb = progress_bar.clone();

            futures.push(async move {
                let segment_start = Instant::now();
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => self.render_segment(segment, voice, cancel).await,
                    Err(_) => Err(DubError::Cancelled),
                };

                if let Some(ref pb) = pb {
                    pb.inc(1);
                }

                let audio = match outcome {
                    Ok(audio) => audio,
                    Err(e) if e.is_cancelled() => SegmentAudio::Failed { error: e },
                    Err(e) => {
                        warn!("Segment {} failed: {}", index, e);
                        SegmentAudio::Failed {
                            error: DubError::Synthesis {
                                index,
                                message: e.to_string(),
                            },
                        }
                    }
                };

                SegmentResult {
                    index,
                    target_duration: segment.duration(),
                    audio,
                    elapsed: segment_start.elapsed(),
                }
            });
        }

        // Collect results
        let mut results: Vec<SegmentResult> = Vec::with_capacity(total_segments);
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Synthesis complete");
        }

        if cancel.is_cancelled() {
            warn!("Synthesis cancelled, discarding {} results", results.len());
            return Err(DubError::Cancelled);
        }

        // Sort results by segment index to maintain order
        results.sort_by_key(|r| r.index);

        let sample_rate = results
            .iter()
            .find_map(|r| match &r.audio {
                SegmentAudio::Speech { clip, .. } => Some(clip.sample_rate),
                _ => None,
            })
            .unwrap_or(self.config.sample_rate);

        let mut stats = SynthesisStats {
            total_segments,
            total_time: start_time.elapsed(),
            ..Default::default()
        };
        let mut total_segment_time = Duration::ZERO;
        for result in &results {
            total_segment_time += result.elapsed;
            match &result.audio {
                SegmentAudio::Speech { speed_ratio, .. } => {
                    stats.spoken_segments += 1;
                    if speed_ratio.is_some() {
                        stats.adjusted_segments += 1;
                    }
                }
                SegmentAudio::Silence { .. } => stats.silent_segments += 1,
                SegmentAudio::Failed { .. } => stats.failed_segments += 1,
            }
        }
        stats.avg_segment_time = total_segment_time / total_segments as u32;

        info!(
            "Synthesis complete: {} spoken, {} silent, {} failed in {:.2}s",
            stats.spoken_segments,
            stats.silent_segments,
            stats.failed_segments,
            stats.total_time.as_secs_f64()
        );

        Ok(SynthesisOutput {
            results,
            stats,
            sample_rate,
        })
    }

    /// Synthesize, assemble and write the dubbed speech track as WAV.
    pub async fn synthesize_speech(
        &self,
        segments: &[TimedSegment],
        voice: &VoiceConfig,
        output_path: &Path,
        assembly: &AssemblyConfig,
        cancel: &CancelToken,
    ) -> Result<(SpeechSynthesisResult, AudioClip)> {
        let start = Instant::now();

        let output = self.synthesize_segments(segments, voice, cancel).await?;
        let (track, clip_starts) = assemble_track_with_starts(&output.clips(), segments, assembly)?;
        track.write_wav(output_path)?;

        let timing_adjustments = output.timing_adjustments();
        let quality = QualityEvaluator::new().evaluate(segments, &track, &timing_adjustments);
        let sync = analyze_sync(segments, &clip_starts, track.duration(), assembly)?;
        for issue in &sync.issues {
            warn!("Sync issue: {}", issue);
        }
        let failed_segments = output.failures();

        if !failed_segments.is_empty() {
            warn!(
                "{} of {} segments failed and were replaced with silence",
                failed_segments.len(),
                segments.len()
            );
        }

        let result = SpeechSynthesisResult {
            audio_path: output_path.to_path_buf(),
            total_duration: track.duration(),
            segments_count: segments.len(),
            processing_time: start.elapsed(),
            quality_score: quality.overall,
            quality,
            timing_adjustments,
            sync,
            complete: failed_segments.is_empty(),
            failed_segments,
        };

        Ok((result, track))
    }
}
