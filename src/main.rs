use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tempo_normalizer::{
    config::Config,
    normalize::{NormalizationEngine, OutputOptions},
};

#[derive(Parser)]
#[command(
    name = "tempo-normalizer",
    version,
    about = "Speed up sluggish video clips to a natural motion tempo",
    long_about = "Tempo-Normalizer measures the motion in each clip with optical flow, classifies its native tempo, and replays the original frames along a smoothed speed curve so slow footage reaches a minimum tempo. Frames are repeated or skipped, never blended."
)]
struct Cli {
    /// Video files or directories of numbered frame images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Save a TOML report per clip
    #[arg(long)]
    report: bool,

    /// Re-measure motion on the output (slower)
    #[arg(long)]
    verify: bool,

    /// Write PNG frame sequences instead of encoded video
    #[arg(long)]
    png: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    info!("Starting Tempo-Normalizer v{}", env!("CARGO_PKG_VERSION"));
    info!("Inputs: {}", cli.inputs.len());
    info!("Output: {:?}", cli.output);

    // Load configuration
    let config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let engine = NormalizationEngine::new(config)?;
    let options = OutputOptions {
        png_sequence: cli.png,
        write_report: cli.report,
        verify: cli.verify,
    };

    let results = engine.normalize_batch(&cli.inputs, &cli.output, &options).await;

    // Each clip has already logged its own summary or error
    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} clip(s) failed", failed, results.len());
    }

    info!("Normalization complete! Output saved to: {:?}", cli.output);
    Ok(())
}
