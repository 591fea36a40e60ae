use anyhow::{Context, Result};
use autodub::config::Config;
use autodub::media::{is_supported_audio, is_supported_video, MediaToolkit};
use autodub::pipeline::{print_summary, DubbingOptions, DubbingPipeline};
use autodub::providers::OpenAiClient;
use autodub::synthesis::{CancelToken, FfmpegTempo};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "autodub")]
#[command(version, about = "Timing-preserving AI dubbing")]
#[command(
    long_about = "Transcribe a video or audio file, translate it and re-voice it with synthesized speech that keeps the original timing."
)]
struct Cli {
    /// Input video/audio file
    input: PathBuf,

    /// Target language code (e.g., es, fr, ja)
    #[arg(short, long)]
    target: String,

    /// Output file (defaults to <input>.<target>.<ext>). A video extension
    /// replaces the audio track, a .wav extension writes only the dubbed
    /// speech. Other extensions are rejected.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source language code. Detected automatically when omitted.
    #[arg(short, long)]
    source: Option<String>,

    /// Synthesis voice
    #[arg(long)]
    voice: Option<String>,

    /// Number of concurrent synthesis requests
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Drop segments whose recognition confidence is below this value
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Merge same-speaker segments separated by at most this many seconds
    #[arg(long)]
    merge_gap: Option<f64>,

    /// Only use punctuation cues for speaker changes
    #[arg(long)]
    no_silence_diarization: bool,

    /// Re-encode video instead of copying the stream
    #[arg(long)]
    reencode: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("autodub={level}")));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_output_path(input: &Path, target: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let extension = if is_supported_video(input) {
        input
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "mp4".to_string())
    } else {
        "wav".to_string()
    };
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{stem}.{target}.{extension}"));
    output
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(concurrency) = cli.concurrency {
        config.synthesis.concurrency = concurrency;
    }
    if let Some(ref voice) = cli.voice {
        config.voice = voice.clone();
    }
    if cli.min_confidence.is_some() {
        config.timing.min_confidence = cli.min_confidence;
    }
    if let Some(gap) = cli.merge_gap {
        config.timing.merge_max_gap = gap;
    }
    if cli.no_silence_diarization {
        config.timing.use_silence_detection = false;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }
    if !is_supported_video(&cli.input) && !is_supported_audio(&cli.input) {
        anyhow::bail!("Unsupported input format: {}", cli.input.display());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(&cli.input, &cli.target));

    let mut config = Config::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Configuration validation failed")?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupted, cancelling outstanding work");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    let api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY not set")?;
    let client = Arc::new(
        OpenAiClient::new(api_key)
            .with_base_url(&config.base_url)
            .with_retry_policy(config.synthesis.retry.policy())
            .with_cancel_token(cancel.clone()),
    );

    let mut pipeline = DubbingPipeline::new(
        client.clone(),
        client.clone(),
        client,
        config.clone(),
    );
    match MediaToolkit::new(config.assembly.clone()) {
        Ok(media) => {
            pipeline = pipeline.with_media(media);
            pipeline = pipeline.with_tempo(Arc::new(FfmpegTempo::default()));
        }
        Err(e) => warn!("{e}; only WAV input and output are available"),
    }

    info!("Input:    {}", cli.input.display());
    info!("Output:   {}", output.display());
    info!("Target:   {}", cli.target);
    if let Some(ref source) = cli.source {
        info!("Source:   {}", source);
    }
    info!("Voice:    {}", config.voice);

    let options = DubbingOptions {
        target_language: cli.target.clone(),
        source_language: cli.source.clone(),
        voice: config.voice.clone(),
        preserve_quality: !cli.reencode,
        show_progress: true,
    };

    let outcome = pipeline
        .run(&cli.input, &output, &options, &cancel)
        .await
        .context("Dubbing failed")?;

    print_summary(&outcome);

    if !outcome.synthesis.complete {
        warn!(
            "{} segment(s) could not be synthesized",
            outcome.synthesis.failed_segments.len()
        );
    }

    Ok(())
}
