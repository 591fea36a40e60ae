//! Capability interfaces for the external speech and language services the
//! dubbing engine consumes, plus one HTTP backend.

pub mod openai;

pub use openai::OpenAiClient;

use crate::error::Result;
use crate::timeline::TimedSegment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Speech recognition output.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub segments: Vec<TimedSegment>,
}

/// Translation output: the input segments with `translated_text` filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutput {
    pub segments: Vec<TimedSegment>,
    /// Provider-reported or estimated quality in `[0, 1]`.
    pub quality_score: f64,
}

/// Voice selection passed to a synthesis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub language: String,
    /// Native provider speed, 1.0 is normal.
    pub speed: f64,
}

impl VoiceConfig {
    pub fn new(voice_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            language: language.into(),
            speed: 1.0,
        }
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe an audio file. `language` is a hint; `None` lets the
    /// provider detect it.
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcription>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        segments: &[TimedSegment],
        target_language: &str,
    ) -> Result<TranslationOutput>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and return a complete WAV file.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>>;
    /// Longest text accepted by a single call, in characters.
    fn max_text_length(&self) -> usize;
    fn name(&self) -> &'static str;
}
