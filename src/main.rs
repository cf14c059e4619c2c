mod config;
mod error;
mod gemini;
mod ledger;
mod normalize;
mod pipeline;
mod workspace;

use gemini::GeminiClient;
use ledger::Ledger;
use pipeline::Pacer;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "receipt_archiver.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load(&config_path)?;
    info!(source_dir = %cfg.source_dir.display(), model = %cfg.model, "Configuration loaded");

    let period = workspace::current_period()?;
    let archive_dir = workspace::find_or_create_archive(&cfg.source_dir, &period)?;
    let ledger = Ledger::open(&archive_dir, &period)?;

    let client = GeminiClient::new(cfg.api_key.clone(), cfg.model.clone());
    let pacer = Pacer::fixed(cfg.pacing_ms);

    let summary = pipeline::run_batch(
        &client,
        &ledger,
        &cfg.source_dir,
        &archive_dir,
        &pacer,
    )
    .await?;

    info!(
        processed = summary.processed,
        extracted = summary.extracted,
        failed = summary.failed,
        period = %period,
        "Run finished"
    );

    Ok(())
}
