use crate::error::{DubError, Result};
use crate::synthesis::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Thresholds used by the timeline stages (diarization, scoring, merging).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Confidence at or above this is bucketed as high.
    pub high_confidence: f64,
    /// Confidence at or above this (and below high) is bucketed as medium.
    pub medium_confidence: f64,
    /// Silence gap (seconds) that starts a new speaker turn.
    pub speaker_change_threshold: f64,
    /// Gaps longer than this (seconds) are counted as silence.
    pub gap_threshold: f64,
    /// Gaps more negative than this (seconds) are counted as overlaps.
    pub overlap_threshold: f64,
    /// Maximum gap (seconds) bridged when merging same-speaker segments.
    pub merge_max_gap: f64,
    /// Segments below this confidence are dropped before translation.
    pub min_confidence: Option<f64>,
    /// Use silence gaps as a speaker-change signal.
    pub use_silence_detection: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            high_confidence: -0.2,
            medium_confidence: -0.5,
            speaker_change_threshold: 2.0,
            gap_threshold: 0.1,
            overlap_threshold: -0.05,
            merge_max_gap: 0.2,
            min_confidence: None,
            use_silence_detection: true,
        }
    }
}

/// Retry settings as they appear in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            attempt_timeout_secs: 30,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

/// Parameters for duration-matched synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Segments shorter than this (seconds) are never speed-corrected.
    pub min_segment_duration: f64,
    /// Allowed deviation of synthesized/target ratio from 1.0 before correcting.
    pub timing_tolerance: f64,
    /// Speed correction is clamped to `[1 - max_adjustment, 1 + max_adjustment]`.
    pub max_adjustment: f64,
    /// Maximum characters per synthesis call.
    pub max_text_length: usize,
    /// Number of concurrent synthesis calls.
    pub concurrency: usize,
    /// Sample rate used for silence placeholders when no speech sets one.
    pub sample_rate: u32,
    /// Languages the synthesis voices support. Empty means unrestricted.
    pub supported_languages: Vec<String>,
    pub retry: RetrySettings,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_segment_duration: 0.1,
            timing_tolerance: 0.1,
            max_adjustment: 0.3,
            max_text_length: 4096,
            concurrency: 4,
            sample_rate: 24000,
            supported_languages: ["en", "zh", "es", "fr", "de"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            retry: RetrySettings::default(),
        }
    }
}

impl SynthesisConfig {
    /// Reject languages outside the configured voice set.
    pub fn check_language(&self, language: &str) -> Result<()> {
        if self.supported_languages.is_empty() {
            return Ok(());
        }
        let base = language.split(['-', '_']).next().unwrap_or(language);
        if self
            .supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language) || l.eq_ignore_ascii_case(base))
        {
            Ok(())
        } else {
            Err(DubError::UnsupportedLanguage(language.to_string()))
        }
    }
}

/// Parameters for track stitching and audio replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Gaps up to this many seconds are absorbed without inserting silence.
    pub padding: f64,
    /// Allowed frame-rate drift after replacing the audio track.
    pub fps_tolerance: f64,
    /// Allowed duration drift (seconds) after replacing the audio track.
    pub duration_tolerance: f64,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Encoder used when the video stream cannot be copied.
    pub fallback_video_codec: String,
    /// Largest acceptable drift (seconds) between where a segment's speech
    /// lands in the track and where it started in the source.
    pub max_sync_offset: f64,
    /// Sync timing accuracy below this is reported as an issue.
    pub min_sync_accuracy: f64,
    /// Share of segments allowed to drift past `max_sync_offset`.
    pub max_drifting_share: f64,
    /// Variance of segment offsets (seconds squared) above which drift is
    /// reported as inconsistent.
    pub max_offset_variance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            padding: 0.05,
            fps_tolerance: 0.1,
            duration_tolerance: 1.0,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            fallback_video_codec: "libx264".to_string(),
            max_sync_offset: 0.5,
            min_sync_accuracy: 0.7,
            max_drifting_share: 0.3,
            max_offset_variance: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub base_url: String,
    pub voice: String,
    pub timing: TimingConfig,
    pub synthesis: SynthesisConfig,
    pub assembly: AssemblyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            voice: "alloy".to_string(),
            timing: TimingConfig::default(),
            synthesis: SynthesisConfig::default(),
            assembly: AssemblyConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    DubError::Config(format!("{}: {e}", config_path.display()))
                })?;
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("AUTODUB_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(voice) = std::env::var("AUTODUB_VOICE") {
            config.voice = voice;
        }
        if let Ok(concurrency) = std::env::var("AUTODUB_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.synthesis.concurrency = c;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(DubError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            ));
        }

        if self.synthesis.concurrency == 0 {
            return Err(DubError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.synthesis.max_adjustment) {
            return Err(DubError::Config(format!(
                "max_adjustment must be in [0, 1), got {}",
                self.synthesis.max_adjustment
            )));
        }

        if self.synthesis.max_text_length == 0 {
            return Err(DubError::Config(
                "max_text_length must be greater than 0".to_string(),
            ));
        }

        if self.synthesis.retry.max_attempts == 0 {
            return Err(DubError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.assembly.max_sync_offset <= 0.0 {
            return Err(DubError::Config(format!(
                "max_sync_offset must be positive, got {}",
                self.assembly.max_sync_offset
            )));
        }

        if self.timing.medium_confidence > self.timing.high_confidence {
            return Err(DubError::Config(
                "medium_confidence must not exceed high_confidence".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autodub").join("config.toml"))
    }
}
