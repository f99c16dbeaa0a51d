//! Snapshot poller
//!
//! Drives the engine once per polled batch:
//!
//! QuoteSource → market-hours gate → DiffTracker → RecordStore
//!   → 1-min buckets → re-aggregation at the configured interval
//!   → InsightBuilder → InsightLedger → sink
//!
//! A batch stamped on a new trading date resets every tracker baseline
//! before it is observed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use common::logger::{TraceId, child_span, cycle_span};
use market::aggregate::aggregate_with;
use market::{
    DiffTracker, EnrichedQuote, InsightBuilder, InsightInput, InstrumentRegistry, Interval,
    MarketError, MarketInsight, Quote, SentimentClassifier,
};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::feed::QuoteSource;
use crate::store::RecordStore;

/// Counters reported when the loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub batches: usize,
    pub insights: usize,
    pub skipped: usize,
}

pub struct Pipeline {
    registry: Arc<InstrumentRegistry>,
    tracker: DiffTracker,
    builder: InsightBuilder,
    store: RecordStore,
    config: AppConfig,
    session_date: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(registry: Arc<InstrumentRegistry>, config: &AppConfig) -> Self {
        Self {
            builder: InsightBuilder::new(
                Arc::clone(&registry),
                SentimentClassifier::default(),
                config.top_n,
            )
            .with_headline(config.headline_index),
            registry,
            tracker: DiffTracker::new(),
            store: RecordStore::new(),
            config: config.clone(),
            session_date: None,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn tracker(&self) -> &DiffTracker {
        &self.tracker
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        self.session_date
    }

    /// Run one batch through the engine. Returns the recorded insight, or
    /// `None` when nothing inside market hours arrived or an insight for the
    /// same (timestamp, interval) already exists.
    pub fn process_batch(&mut self, batch: Vec<Quote>) -> Result<Option<MarketInsight>> {
        let received = batch.len();
        let batch: Vec<Quote> = batch
            .into_iter()
            .filter(|q| self.config.in_market_hours(q.timestamp().time()))
            .collect();

        if batch.len() < received {
            debug!(dropped = received - batch.len(), "rows outside market hours dropped");
        }

        let Some(stamp) = batch.iter().map(Quote::timestamp).max() else {
            return Ok(None);
        };

        let date = stamp.date();
        match self.session_date {
            Some(current) if current == date => {}
            Some(current) => {
                info!(from = %current, to = %date, "trading date changed");
                self.tracker.reset_session();
                self.session_date = Some(date);
            }
            None => self.session_date = Some(date),
        }

        let latest = self.tracker.observe_batch(batch);
        self.store.append_enriched(latest.iter().cloned());

        // Index rows feed the headline level only; buckets hold tradables.
        let tradable: Vec<EnrichedQuote> = latest
            .iter()
            .filter(|q| !self.registry.is_index(q.symbol()))
            .cloned()
            .collect();
        let minute = aggregate_with(&tradable, Interval::ONE_MIN);
        self.store.append_minute_buckets(minute);

        let buckets = {
            let _span = child_span("aggregate").entered();
            aggregate_with(&self.store.minute_buckets_on(date), self.config.interval)
        };

        let insight = self.builder.build(&InsightInput {
            timestamp: stamp,
            interval: self.config.interval,
            latest: &latest,
            buckets: &buckets,
        });

        match self.store.record_insight(insight) {
            Ok(recorded) => Ok(Some(recorded.clone())),
            Err(MarketError::DuplicateInsight {
                timestamp,
                interval_minutes,
            }) => {
                warn!(%timestamp, interval_minutes, "insight already recorded; skipping");
                Ok(None)
            }
            Err(e) => Err(e).context("failed to record insight"),
        }
    }
}

/// Pull batches until the source is exhausted, handing every recorded
/// insight to `sink`.
///
/// With `pace` set, one batch is pulled per tick and late ticks are skipped
/// rather than bursted. Without it the source is drained as fast as it yields.
pub async fn run_poller<S, F>(
    source: &mut S,
    pipeline: &mut Pipeline,
    pace: Option<Duration>,
    mut sink: F,
) -> Result<PollStats>
where
    S: QuoteSource + ?Sized,
    F: FnMut(&MarketInsight) -> Result<()>,
{
    let mut ticker = pace.map(|every| {
        let mut t = interval(every);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        t
    });

    info!(
        interval = %pipeline.config.interval,
        paced_ms = pace.map(|d| d.as_millis() as u64),
        "snapshot poller started"
    );

    let mut stats = PollStats::default();

    loop {
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }

        let Some(batch) = source.next_batch().await.context("failed to fetch batch")? else {
            break;
        };

        let trace_id = TraceId::new();
        let span = cycle_span("poll", &trace_id);
        span.record("batch_size", batch.len());
        let _guard = span.enter();

        stats.batches += 1;
        match pipeline.process_batch(batch)? {
            Some(insight) => {
                stats.insights += 1;
                info!(
                    ts = %insight.timestamp,
                    points_changed = insight.points_changed,
                    hints = insight.classification.hints.len(),
                    "insight published"
                );
                sink(&insight)?;
            }
            None => stats.skipped += 1,
        }
    }

    info!(
        batches = stats.batches,
        insights = stats.insights,
        skipped = stats.skipped,
        "snapshot poller finished"
    );

    Ok(stats)
}
