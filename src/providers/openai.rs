use crate::error::{DubError, Result};
use crate::providers::{
    Recognizer, SpeechSynthesizer, Transcription, TranslationOutput, Translator, VoiceConfig,
};
use crate::synthesis::retry::{with_retry, CancelToken, RetryPolicy};
use crate::timeline::TimedSegment;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum upload size for the transcription endpoint (25 MB).
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Maximum characters per speech request.
const MAX_SPEECH_CHARS: usize = 4096;

/// Segments sent per translation request.
const TRANSLATION_BATCH: usize = 40;

/// Client for OpenAI-compatible transcription, chat and speech endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
    chat_model: String,
    speech_model: String,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            speech_model: "tts-1".to_string(),
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Point the client at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_speech_model(mut self, model: impl Into<String>) -> Self {
        self.speech_model = model.into();
        self
    }

    /// Retry policy for transcription and translation requests. Speech
    /// requests are retried by the synthesis orchestrator instead.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn a non-success response into [`DubError::Api`].
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        debug!("API response status: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        Err(DubError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn build_form(&self, audio: &Path, language: Option<&str>) -> Result<Form> {
        let file_bytes = fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mime_type = match audio.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.transcription_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        Ok(form)
    }

    async fn call_transcription(&self, audio: &Path, language: Option<&str>) -> Result<WhisperResponse> {
        // Forms are consumed by the request, so each attempt builds a new one
        let form = self.build_form(audio, language).await?;

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let body = Self::check_status(response).await?.text().await?;
        debug!("Transcription response: {}", preview(&body, 500));
        Ok(serde_json::from_str(&body)?)
    }

    async fn call_chat(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a professional translator for video dubbing. \
                              Keep translations natural and close in length to the source.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let parsed: ChatResponse = Self::check_status(response).await?.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Leading `max_chars` characters of `body`, cut on a char boundary.
fn preview(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Convert a verbose transcription response into timed segments.
fn parse_transcription(response: WhisperResponse) -> Transcription {
    let segments = match response.segments {
        Some(segments) if !segments.is_empty() => segments
            .into_iter()
            .map(|seg| {
                let mut out = TimedSegment::new(seg.start, seg.end, seg.text.trim());
                // Mean token log-probability, the scale the confidence buckets use
                out.confidence = seg.avg_logprob;
                out
            })
            .collect(),
        _ => vec![TimedSegment::new(
            0.0,
            response.duration.unwrap_or(0.0),
            response.text.trim(),
        )],
    };

    Transcription {
        text: response.text.trim().to_string(),
        language: response.language.unwrap_or_else(|| "unknown".to_string()),
        segments,
    }
}

fn build_translation_prompt(texts: &[&str], target_lang: &str) -> String {
    let lang_name = language_code_to_name(target_lang);
    let numbered_texts: String = texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Translate each of the following numbered texts to {lang_name}.
Return ONLY the translations in the same numbered format, one per line.

Texts to translate:
{numbered_texts}"#
    )
}

/// Pull `[n] text` entries out of a batch reply. Missing entries come back
/// empty.
fn parse_batch_response(response: &str, count: usize) -> Vec<String> {
    let mut results = Vec::with_capacity(count);

    for i in 1..=count {
        let pattern = format!("[{i}]");
        let next_pattern = format!("[{}]", i + 1);

        if let Some(start) = response.find(&pattern) {
            let text_start = start + pattern.len();
            let text_end = if i < count {
                response[text_start..]
                    .find(&next_pattern)
                    .map(|p| text_start + p)
                    .unwrap_or(response.len())
            } else {
                response.len()
            };
            results.push(response[text_start..text_end].trim().to_string());
        }
    }

    if results.len() != count {
        warn!(
            "Batch parse failed (got {} of {}), using line-based fallback",
            results.len(),
            count
        );
        results = response
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(count)
            .map(|l| l.trim().to_string())
            .collect();
    }

    results.resize(count, String::new());
    results
}

fn language_code_to_name(code: &str) -> &'static str {
    let base = code.split(['-', '_']).next().unwrap_or(code).to_lowercase();
    match base.as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "nl" => "Dutch",
        "pl" => "Polish",
        "tr" => "Turkish",
        _ => "the target language",
    }
}

#[async_trait]
impl Recognizer for OpenAiClient {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcription> {
        let metadata = fs::metadata(audio)
            .await
            .map_err(|_| DubError::FileNotFound(audio.display().to_string()))?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(DubError::InvalidInput(format!(
                "File too large for transcription: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let response = with_retry(&self.retry, &self.cancel, |_| {
            self.call_transcription(audio, language)
        })
        .await?;

        let transcription = parse_transcription(response);
        debug!(
            "Transcription returned {} segments ({})",
            transcription.segments.len(),
            transcription.language
        );
        Ok(transcription)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }
}

#[async_trait]
impl Translator for OpenAiClient {
    async fn translate(
        &self,
        segments: &[TimedSegment],
        target_language: &str,
    ) -> Result<TranslationOutput> {
        if segments.is_empty() {
            return Ok(TranslationOutput {
                segments: Vec::new(),
                quality_score: 1.0,
            });
        }

        debug!(
            "Translating {} segment(s) to {}",
            segments.len(),
            target_language
        );

        let mut translated = Vec::with_capacity(segments.len());
        for batch in segments.chunks(TRANSLATION_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|s| s.original_text.trim()).collect();
            let prompt = build_translation_prompt(&texts, target_language);

            let reply = with_retry(&self.retry, &self.cancel, |_| self.call_chat(&prompt)).await?;
            let lines = parse_batch_response(&reply, batch.len());

            translated.extend(
                batch
                    .iter()
                    .zip(lines)
                    .map(|(seg, text)| seg.clone().with_translation(text)),
            );
        }

        // Share of segments that came back with text
        let filled = translated
            .iter()
            .filter(|s: &&TimedSegment| !s.translation().is_empty())
            .count();
        let quality_score = filled as f64 / translated.len() as f64;

        Ok(TranslationOutput {
            segments: translated,
            quality_score,
        })
    }

    fn name(&self) -> &'static str {
        "OpenAI Chat"
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.speech_model,
            input: text,
            voice: &voice.voice_id,
            response_format: "wav",
            speed: voice.speed,
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let bytes = Self::check_status(response).await?.bytes().await?;
        debug!("Synthesized {} chars into {} bytes", text.chars().count(), bytes.len());
        Ok(bytes.to_vec())
    }

    fn max_text_length(&self) -> usize {
        MAX_SPEECH_CHARS
    }

    fn name(&self) -> &'static str {
        "OpenAI TTS"
    }
}

// API request/response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcription_with_segments() {
        let response: WhisperResponse = serde_json::from_str(
            r#"{
                "text": "Hello world. How are you?",
                "language": "english",
                "duration": 4.0,
                "segments": [
                    {"start": 0.0, "end": 2.0, "text": " Hello world.", "avg_logprob": -0.15},
                    {"start": 2.5, "end": 4.0, "text": " How are you?"}
                ]
            }"#,
        )
        .unwrap();

        let transcription = parse_transcription(response);
        assert_eq!(transcription.language, "english");
        assert_eq!(transcription.segments.len(), 2);
        assert_eq!(transcription.segments[0].original_text, "Hello world.");
        assert_eq!(transcription.segments[0].confidence, Some(-0.15));
        assert_eq!(transcription.segments[1].confidence, None);
        assert_eq!(transcription.segments[1].start_time, 2.5);
    }

    #[test]
    fn test_parse_transcription_without_segments() {
        let response: WhisperResponse =
            serde_json::from_str(r#"{"text": " Hello world ", "duration": 2.0}"#).unwrap();

        let transcription = parse_transcription(response);
        assert_eq!(transcription.language, "unknown");
        assert_eq!(
            transcription.segments,
            vec![TimedSegment::new(0.0, 2.0, "Hello world")]
        );
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let body = format!("{{\"text\":\"{}\"}}", "你".repeat(200));
        let head = preview(&body, 500);
        assert_eq!(head.chars().count(), 200 + 11);
        assert!(body.starts_with(head));

        let cjk = "你".repeat(200);
        assert_eq!(preview(&cjk, 167).chars().count(), 167);
        assert_eq!(preview("short", 500), "short");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_build_prompt_batch() {
        let prompt = build_translation_prompt(&["Hello", "Goodbye"], "ja");
        assert!(prompt.contains("Japanese"));
        assert!(prompt.contains("[1] Hello"));
        assert!(prompt.contains("[2] Goodbye"));
    }

    #[test]
    fn test_parse_batch_response() {
        let results = parse_batch_response("[1] Hola\n[2] Adiós", 2);
        assert_eq!(results, vec!["Hola", "Adiós"]);
    }

    #[test]
    fn test_parse_batch_response_fallbacks() {
        let results = parse_batch_response("Hola\nAdiós", 2);
        assert_eq!(results, vec!["Hola", "Adiós"]);

        let results = parse_batch_response("Hola", 3);
        assert_eq!(results, vec!["Hola", "", ""]);
    }

    #[test]
    fn test_language_code_to_name() {
        assert_eq!(language_code_to_name("en"), "English");
        assert_eq!(language_code_to_name("ES"), "Spanish");
        assert_eq!(language_code_to_name("zh-CN"), "Chinese");
        assert_eq!(language_code_to_name("xyz"), "the target language");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OpenAiClient::new("key").with_base_url("http://localhost:9000/v1/");
        assert_eq!(
            client.url("audio/speech"),
            "http://localhost:9000/v1/audio/speech"
        );
        assert_eq!(client.max_text_length(), 4096);
    }
}
