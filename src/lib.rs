pub mod assembly;
pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod providers;
pub mod quality;
pub mod synthesis;
pub mod sync;
pub mod timeline;

pub use audio::AudioClip;
pub use config::Config;
pub use error::{DubError, Result};
pub use pipeline::{print_summary, DubbingOptions, DubbingOutcome, DubbingPipeline, PipelineStats};
pub use quality::{QualityEvaluator, QualityReport};
pub use sync::{analyze_sync, SyncAnalysis, SyncIssue};
pub use timeline::{TimedSegment, TimingProcessor};
