//! Feed normalizer
//!
//! Converts loosely typed quote rows (JSON lines, one row per instrument per
//! poll) into engine [`Quote`]s:
//! - rows without an instrument id are rejected
//! - numeric fields default to 0 when absent
//! - Unix seconds are shifted to exchange local time; `HH:mm` strings are
//!   placed on the session date
//! - symbol and class come from the registry, or from the row for contracts
//!   the registry does not know (option strikes roll every expiry)

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use market::{InstrumentClass, InstrumentRegistry, OptionQuote, Quote, QuoteBase};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("row has no instrument id")]
    MissingInstrumentId,

    #[error("unknown instrument {0} and the row carries no symbol")]
    UnknownInstrument(u64),

    #[error("unparseable timestamp: {0}")]
    BadTimestamp(String),

    #[error("row has no timestamp")]
    MissingTimestamp,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timestamp as delivered upstream.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Unix seconds, UTC.
    Unix(i64),
    /// `HH:mm`, `HH:mm:ss` or `YYYY-MM-DDTHH:mm:ss`, exchange local time.
    Text(String),
}

/// One feed row before validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawQuote {
    pub instrument_id: Option<u64>,
    pub symbol: Option<String>,
    pub class: Option<InstrumentClass>,
    pub last_price: Option<f64>,
    pub buy_qty: Option<f64>,
    pub sell_qty: Option<f64>,
    pub volume_traded: Option<f64>,
    pub open_interest: Option<f64>,
    pub oi_change_raw: Option<f64>,
    pub timestamp: Option<RawTimestamp>,
}

pub struct FeedNormalizer {
    registry: Arc<InstrumentRegistry>,
    utc_offset: FixedOffset,
    session_date: NaiveDate,
}

impl FeedNormalizer {
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        utc_offset: FixedOffset,
        session_date: NaiveDate,
    ) -> Self {
        Self {
            registry,
            utc_offset,
            session_date,
        }
    }

    pub fn parse_line(&self, line: &str) -> Result<Quote, FeedError> {
        let raw: RawQuote = serde_json::from_str(line)?;
        self.normalize(raw)
    }

    pub fn normalize(&self, raw: RawQuote) -> Result<Quote, FeedError> {
        let id = raw.instrument_id.ok_or(FeedError::MissingInstrumentId)?;

        let (symbol, class) = match self.registry.get(id) {
            Some(i) => (i.symbol.clone(), i.class),
            None => {
                let symbol = raw.symbol.clone().ok_or(FeedError::UnknownInstrument(id))?;
                (symbol, raw.class.unwrap_or(InstrumentClass::Equity))
            }
        };

        let raw_ts = raw.timestamp.as_ref().ok_or(FeedError::MissingTimestamp)?;
        let timestamp = self.timestamp(raw_ts)?;

        let base = QuoteBase {
            instrument_id: id,
            symbol,
            last_price: raw.last_price.unwrap_or(0.0),
            buy_qty: raw.buy_qty.unwrap_or(0.0),
            sell_qty: raw.sell_qty.unwrap_or(0.0),
            timestamp,
        };

        Ok(match class {
            InstrumentClass::Option => Quote::Option(OptionQuote {
                base,
                volume_traded: raw.volume_traded.unwrap_or(0.0),
                open_interest: raw.open_interest.unwrap_or(0.0),
                oi_change_raw: raw.oi_change_raw.unwrap_or(0.0),
            }),
            InstrumentClass::Equity | InstrumentClass::Index => Quote::Equity(base),
        })
    }

    fn timestamp(&self, raw: &RawTimestamp) -> Result<NaiveDateTime, FeedError> {
        match raw {
            RawTimestamp::Unix(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|utc| utc.with_timezone(&self.utc_offset).naive_local())
                .ok_or_else(|| FeedError::BadTimestamp(secs.to_string())),
            RawTimestamp::Text(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                    .or_else(|_| {
                        NaiveTime::parse_from_str(s, "%H:%M")
                            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                            .map(|t| self.session_date.and_time(t))
                    })
                    .map_err(|_| FeedError::BadTimestamp(s.to_string()))
            }
        }
    }
}

/// Source of polled batches.
#[async_trait]
pub trait QuoteSource: Send {
    /// Next poll's batch, `None` once the feed is exhausted.
    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Quote>>>;
}

/// Replays a recorded JSON-lines feed, one batch per distinct timestamp.
pub struct FileQuoteSource {
    batches: VecDeque<Vec<Quote>>,
}

impl FileQuoteSource {
    pub async fn open(path: &Path, normalizer: &FeedNormalizer) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read feed {}", path.display()))?;

        let source = Self::from_lines(text.lines(), normalizer);
        info!(
            path = %path.display(),
            batches = source.batches.len(),
            "feed loaded"
        );
        Ok(source)
    }

    /// Rows that fail normalization are logged and skipped.
    pub fn from_lines<'a, I>(lines: I, normalizer: &FeedNormalizer) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut by_ts: BTreeMap<NaiveDateTime, Vec<Quote>> = BTreeMap::new();
        let mut rejected = 0usize;

        for (n, line) in lines.into_iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match normalizer.parse_line(line) {
                Ok(q) => push_unique(by_ts.entry(q.timestamp()).or_default(), q),
                Err(e) => {
                    rejected += 1;
                    warn!(line = n + 1, error = %e, "feed row rejected");
                }
            }
        }

        debug!(rejected, "feed normalized");

        Self {
            batches: by_ts.into_values().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

/// Keep (instrument, timestamp) unique inside a batch; the later row wins.
fn push_unique(batch: &mut Vec<Quote>, q: Quote) {
    if let Some(pos) = batch.iter().position(|x| x.symbol() == q.symbol()) {
        warn!(
            symbol = %q.symbol(),
            ts = %q.timestamp(),
            "duplicate row in batch; keeping the later one"
        );
        batch.remove(pos);
    }
    batch.push(q);
}

#[async_trait]
impl QuoteSource for FileQuoteSource {
    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Quote>>> {
        Ok(self.batches.pop_front())
    }
}
