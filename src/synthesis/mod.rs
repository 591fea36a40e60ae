//! Duration-matched speech synthesis: text chunking, provider retries, speed
//! correction and the concurrent per-segment orchestrator.

pub mod chunk;
pub mod orchestrator;
pub mod retry;
pub mod tempo;

pub use chunk::split_text;
pub use orchestrator::{
    SegmentAudio, SegmentFailure, SegmentResult, SpeechSynthesisResult, SynthesisOrchestrator,
    SynthesisOutput, SynthesisStats,
};
pub use retry::{with_retry, CancelToken, RetryPolicy};
pub use tempo::{speed_ratio, FfmpegTempo, ResampleTempo, TempoAdjuster};
