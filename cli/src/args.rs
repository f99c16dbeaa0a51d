use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Short human readable block per insight
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Parser)]
#[clap(name = "snapdiff", version)]
pub struct Cli {
    /// JSON-lines feed to replay, one quote row per line
    pub feed: PathBuf,

    /// Aggregation interval in minutes (overrides SNAPDIFF_INTERVAL_MINUTES)
    #[clap(long)]
    pub interval: Option<i64>,

    /// Length of the top buy/sell lists (overrides SNAPDIFF_TOP_N)
    #[clap(long)]
    pub top_n: Option<usize>,

    /// Pull one batch per poll interval instead of draining the feed
    #[clap(long)]
    pub paced: bool,

    /// Poll interval in milliseconds when paced (overrides SNAPDIFF_POLL_MS)
    #[clap(long)]
    pub poll_ms: Option<u64>,

    /// Trading date for rows stamped `HH:mm` (defaults to today, exchange time)
    #[clap(long)]
    pub session_date: Option<NaiveDate>,

    /// Extra instruments, JSON array of {"id", "symbol", "class"}
    #[clap(long)]
    pub instruments: Option<PathBuf>,

    /// Instrument id of the headline index (overrides SNAPDIFF_HEADLINE_INDEX)
    #[clap(long)]
    pub headline_index: Option<u64>,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

impl Cli {
    /// Flags win over whatever the environment configured.
    pub fn apply(&self, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(m) = self.interval {
            cfg.interval = market::Interval::new(m)?;
        }
        if let Some(n) = self.top_n {
            cfg.top_n = n;
        }
        if let Some(id) = self.headline_index {
            cfg.headline_index = id;
        }
        if let Some(ms) = self.poll_ms {
            cfg.poll_every = std::time::Duration::from_millis(ms);
        }
        cfg.validate()
    }
}
