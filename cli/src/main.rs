use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use cli::args::Cli;
use cli::output::writer_sink;
use cli::{AppConfig, FeedNormalizer, FileQuoteSource, Pipeline, run_poller};
use common::logger::{LogFormat, init_logger};
use market::{Instrument, InstrumentClass, InstrumentRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger("snapdiff", LogFormat::from_env());

    let mut cfg = AppConfig::from_env().context("invalid environment configuration")?;
    cli.apply(&mut cfg)?;

    let registry = Arc::new(load_registry(cli.instruments.as_deref()).await?);
    if registry.class_of(cfg.headline_index) != Some(InstrumentClass::Index) {
        warn!(
            id = cfg.headline_index,
            "headline index is not a registered index; level stays 0"
        );
    }

    let session_date = cli
        .session_date
        .unwrap_or_else(|| Utc::now().with_timezone(&cfg.utc_offset).date_naive());

    info!(
        feed = %cli.feed.display(),
        interval = %cfg.interval,
        top_n = cfg.top_n,
        %session_date,
        instruments = registry.len(),
        "snapdiff starting"
    );

    let normalizer = FeedNormalizer::new(Arc::clone(&registry), cfg.utc_offset, session_date);
    let mut source = FileQuoteSource::open(&cli.feed, &normalizer).await?;
    let mut pipeline = Pipeline::new(registry, &cfg);

    let pace = cli.paced.then_some(cfg.poll_every);
    let sink = writer_sink(std::io::stdout().lock(), cli.output);

    tokio::select! {
        stats = run_poller(&mut source, &mut pipeline, pace, sink) => {
            let stats = stats?;
            info!(batches = stats.batches, insights = stats.insights, "feed exhausted");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; stopping poller");
        }
    }

    Ok(())
}

/// Builtin instruments plus any listed in `extra`.
async fn load_registry(extra: Option<&Path>) -> Result<InstrumentRegistry> {
    let mut registry = InstrumentRegistry::builtin();

    if let Some(path) = extra {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read instruments {}", path.display()))?;
        let list: Vec<Instrument> = serde_json::from_str(&text)
            .with_context(|| format!("invalid instruments file {}", path.display()))?;

        for i in list {
            if let Some(old) = registry.register(i.id, i.symbol, i.class) {
                warn!(id = old.id, symbol = %old.symbol, "builtin instrument replaced");
            }
        }
    }

    Ok(registry)
}
