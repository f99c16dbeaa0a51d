//! In-memory, append-only record store for one process lifetime.
//!
//! Holds what a persistence layer would: every enriched observation, the
//! one-minute buckets the poller derives from them, and the insight ledger.
//! Coarser intervals are always re-derived from the one-minute history.

use chrono::NaiveDate;
use market::{EnrichedQuote, InsightLedger, MarketError, MarketInsight, SummaryBucket};

#[derive(Debug, Default)]
pub struct RecordStore {
    enriched: Vec<EnrichedQuote>,
    minute_buckets: Vec<SummaryBucket>,
    ledger: InsightLedger,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_enriched<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = EnrichedQuote>,
    {
        self.enriched.extend(records);
    }

    pub fn append_minute_buckets<I>(&mut self, buckets: I)
    where
        I: IntoIterator<Item = SummaryBucket>,
    {
        self.minute_buckets.extend(buckets);
    }

    pub fn record_insight(
        &mut self,
        insight: MarketInsight,
    ) -> Result<&MarketInsight, MarketError> {
        self.ledger.record(insight)
    }

    /// One-minute buckets that start on `date`, in arrival order.
    pub fn minute_buckets_on(&self, date: NaiveDate) -> Vec<SummaryBucket> {
        self.minute_buckets
            .iter()
            .filter(|b| b.bucket_start.date() == date)
            .cloned()
            .collect()
    }

    pub fn ledger(&self) -> &InsightLedger {
        &self.ledger
    }

    pub fn enriched_len(&self) -> usize {
        self.enriched.len()
    }

    pub fn minute_bucket_len(&self) -> usize {
        self.minute_buckets.len()
    }
}
