//! Time-Bucket Aggregator
//!
//! Groups records into fixed-size windows and reduces each window to one
//! [`SummaryBucket`] per quote kind.
//!
//! ## Bucket boundaries
//! Windows are anchored to the **earliest timestamp in the batch**, not to a
//! wall-clock grid:
//!
//! ```text
//! offset       = whole minutes from anchor to ts
//! bucket_start = anchor + floor(offset / interval) * interval
//! ```
//!
//! A feed that starts at 09:17 therefore buckets as 09:17, 09:22, ... at a
//! five minute interval. Two overlapping batches with different minima bucket
//! differently.
//!
//! ## Reducers
//! | field class                                    | rule              |
//! |------------------------------------------------|-------------------|
//! | symbol, last price, open interest, raw OI change | most recent record |
//! | buy/sell quantity, volume traded               | sum               |
//! | diff/strength percents, sentiment, OI percents | arithmetic mean   |

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::MarketError;
use crate::types::{
    BucketSummary, EnrichedQuote, EquitySummary, FlowDeltas, OiDeltas, OptionSummary, QuoteKind,
    SummaryBucket,
};

/// Positive aggregation granularity in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Interval(u32);

impl Interval {
    pub const ONE_MIN: Interval = Interval(1);
    pub const FIVE_MIN: Interval = Interval(5);
    pub const TEN_MIN: Interval = Interval(10);
    pub const FIFTEEN_MIN: Interval = Interval(15);

    /// Granularities offered by default.
    pub const PRESETS: [Interval; 4] = [
        Self::ONE_MIN,
        Self::FIVE_MIN,
        Self::TEN_MIN,
        Self::FIFTEEN_MIN,
    ];

    pub fn new(minutes: i64) -> Result<Self, MarketError> {
        match u32::try_from(minutes) {
            Ok(m) if m > 0 => Ok(Self(m)),
            _ => Err(MarketError::InvalidInterval(minutes)),
        }
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    /// Display label, e.g. `"5 min"`.
    pub fn label(self) -> String {
        format!("{} min", self.0)
    }
}

impl TryFrom<i64> for Interval {
    type Error = MarketError;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<Interval> for u32 {
    fn from(i: Interval) -> Self {
        i.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

/// A record the aggregator can place in a bucket and reduce.
///
/// Implemented for raw [`EnrichedQuote`]s and for [`SummaryBucket`]s, so
/// finer buckets can be rolled up into coarser ones.
pub trait Bucketable {
    /// Time used to place the record in a window.
    fn bucket_time(&self) -> NaiveDateTime;

    /// Time used to pick the most recent record of a window.
    fn recency(&self) -> NaiveDateTime;

    fn kind(&self) -> QuoteKind;

    fn symbol(&self) -> &str;

    /// Number of raw observations this record stands for.
    fn sample_count(&self) -> usize;

    /// The record's own fields, as a one-record summary.
    fn sample(&self) -> BucketSummary;
}

impl Bucketable for EnrichedQuote {
    fn bucket_time(&self) -> NaiveDateTime {
        self.timestamp()
    }

    fn recency(&self) -> NaiveDateTime {
        self.timestamp()
    }

    fn kind(&self) -> QuoteKind {
        EnrichedQuote::kind(self)
    }

    fn symbol(&self) -> &str {
        EnrichedQuote::symbol(self)
    }

    fn sample_count(&self) -> usize {
        1
    }

    fn sample(&self) -> BucketSummary {
        match self {
            EnrichedQuote::Equity(e) => BucketSummary::Equity(EquitySummary {
                symbol: e.quote.symbol.clone(),
                last_price: e.quote.last_price,
                buy_qty: e.quote.buy_qty,
                sell_qty: e.quote.sell_qty,
                flow: e.flow,
            }),
            EnrichedQuote::Option(o) => BucketSummary::Option(OptionSummary {
                symbol: o.quote.base.symbol.clone(),
                last_price: o.quote.base.last_price,
                buy_qty: o.quote.base.buy_qty,
                sell_qty: o.quote.base.sell_qty,
                volume_traded: o.quote.volume_traded,
                open_interest: o.quote.open_interest,
                oi_change_raw: o.quote.oi_change_raw,
                flow: o.flow,
                oi: o.oi,
            }),
        }
    }
}

impl Bucketable for SummaryBucket {
    fn bucket_time(&self) -> NaiveDateTime {
        self.bucket_start
    }

    fn recency(&self) -> NaiveDateTime {
        self.last_sample_at
    }

    fn kind(&self) -> QuoteKind {
        self.summary.kind()
    }

    fn symbol(&self) -> &str {
        self.summary.symbol()
    }

    fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn sample(&self) -> BucketSummary {
        self.summary.clone()
    }
}

/// Start of the window `ts` falls into, for windows anchored at `anchor`.
pub fn bucket_start_for(
    anchor: NaiveDateTime,
    ts: NaiveDateTime,
    interval: Interval,
) -> NaiveDateTime {
    let step = i64::from(interval.minutes());
    let offset = (ts - anchor).num_minutes();
    anchor + TimeDelta::minutes(offset.div_euclid(step) * step)
}

/// Aggregate `records` into windows of `interval_minutes`.
///
/// Fails fast on a non-positive interval, before looking at the records.
/// An empty batch yields no buckets.
#[instrument(
    level = "debug",
    target = "aggregator",
    skip(records),
    fields(records = records.len())
)]
pub fn aggregate<R: Bucketable>(
    records: &[R],
    interval_minutes: i64,
) -> Result<Vec<SummaryBucket>, MarketError> {
    let interval = Interval::new(interval_minutes)?;
    Ok(aggregate_with(records, interval))
}

/// [`aggregate`] with an already validated interval.
pub fn aggregate_with<R: Bucketable>(records: &[R], interval: Interval) -> Vec<SummaryBucket> {
    let Some(anchor) = earliest(records) else {
        return vec![];
    };

    let buckets = bucketize(records.iter(), anchor, interval);
    debug!(%anchor, buckets = buckets.len(), "batch aggregated");
    buckets
}

/// Aggregate each symbol separately, all on the batch-wide anchor so the
/// windows of different symbols line up.
#[instrument(
    level = "debug",
    target = "aggregator",
    skip(records),
    fields(records = records.len())
)]
pub fn aggregate_per_instrument<R: Bucketable>(
    records: &[R],
    interval_minutes: i64,
) -> Result<BTreeMap<String, Vec<SummaryBucket>>, MarketError> {
    let interval = Interval::new(interval_minutes)?;
    let Some(anchor) = earliest(records) else {
        return Ok(BTreeMap::new());
    };

    let mut by_symbol: BTreeMap<&str, Vec<&R>> = BTreeMap::new();
    for r in records {
        by_symbol.entry(r.symbol()).or_default().push(r);
    }

    Ok(by_symbol
        .into_iter()
        .map(|(symbol, rs)| (symbol.to_string(), bucketize(rs.into_iter(), anchor, interval)))
        .collect())
}

fn earliest<R: Bucketable>(records: &[R]) -> Option<NaiveDateTime> {
    records.iter().map(Bucketable::bucket_time).min()
}

fn bucketize<'a, R, I>(records: I, anchor: NaiveDateTime, interval: Interval) -> Vec<SummaryBucket>
where
    R: Bucketable + 'a,
    I: Iterator<Item = &'a R>,
{
    // Ordered by (start, kind): ascending start, equity before option.
    let mut groups: BTreeMap<(NaiveDateTime, QuoteKind), Vec<&R>> = BTreeMap::new();
    for r in records {
        let start = bucket_start_for(anchor, r.bucket_time(), interval);
        groups.entry((start, r.kind())).or_default().push(r);
    }

    groups
        .into_iter()
        .filter_map(|((start, _), members)| reduce(start, interval, &members))
        .collect()
}

fn reduce<R: Bucketable>(
    bucket_start: NaiveDateTime,
    interval: Interval,
    members: &[&R],
) -> Option<SummaryBucket> {
    // On equal timestamps the later record in input order wins.
    let latest = members.iter().max_by_key(|r| r.recency())?;
    let last_sample_at = latest.recency();
    let sample_count = members.iter().map(|r| r.sample_count()).sum();

    let summary = match latest.sample() {
        BucketSummary::Equity(head) => {
            let items: Vec<EquitySummary> = members
                .iter()
                .filter_map(|r| match r.sample() {
                    BucketSummary::Equity(e) => Some(e),
                    BucketSummary::Option(_) => None,
                })
                .collect();
            BucketSummary::Equity(reduce_equity(head, &items))
        }
        BucketSummary::Option(head) => {
            let items: Vec<OptionSummary> = members
                .iter()
                .filter_map(|r| match r.sample() {
                    BucketSummary::Option(o) => Some(o),
                    BucketSummary::Equity(_) => None,
                })
                .collect();
            BucketSummary::Option(reduce_option(head, &items))
        }
    };

    Some(SummaryBucket {
        bucket_start,
        interval_minutes: interval.minutes(),
        sample_count,
        last_sample_at,
        summary,
    })
}

fn reduce_equity(latest: EquitySummary, items: &[EquitySummary]) -> EquitySummary {
    EquitySummary {
        symbol: latest.symbol,
        last_price: latest.last_price,
        buy_qty: sum(items.iter().map(|e| e.buy_qty)),
        sell_qty: sum(items.iter().map(|e| e.sell_qty)),
        flow: mean_flow(items.iter().map(|e| &e.flow)),
    }
}

fn reduce_option(latest: OptionSummary, items: &[OptionSummary]) -> OptionSummary {
    let oi: Vec<&OiDeltas> = items.iter().map(|o| &o.oi).collect();

    OptionSummary {
        symbol: latest.symbol,
        last_price: latest.last_price,
        buy_qty: sum(items.iter().map(|o| o.buy_qty)),
        sell_qty: sum(items.iter().map(|o| o.sell_qty)),
        volume_traded: sum(items.iter().map(|o| o.volume_traded)),
        open_interest: latest.open_interest,
        oi_change_raw: latest.oi_change_raw,
        flow: mean_flow(items.iter().map(|o| &o.flow)),
        oi: OiDeltas {
            oi_diff_pct: mean(oi.iter().map(|d| d.oi_diff_pct)),
            oi_strength_pct: mean(oi.iter().map(|d| d.oi_strength_pct)),
        },
    }
}

fn mean_flow<'a>(flows: impl Iterator<Item = &'a FlowDeltas>) -> FlowDeltas {
    let flows: Vec<&FlowDeltas> = flows.collect();

    FlowDeltas {
        buy_diff_pct: mean(flows.iter().map(|f| f.buy_diff_pct)),
        sell_diff_pct: mean(flows.iter().map(|f| f.sell_diff_pct)),
        buy_strength_pct: mean(flows.iter().map(|f| f.buy_strength_pct)),
        sell_strength_pct: mean(flows.iter().map(|f| f.sell_strength_pct)),
        sentiment: mean(flows.iter().map(|f| f.sentiment)),
    }
}

fn sum(values: impl Iterator<Item = f64>) -> f64 {
    values.sum()
}

/// Arithmetic mean, taken as offsets from the first value so that a run of
/// identical values reproduces that value exactly. Empty input is 0.
pub fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut values = values.peekable();
    let Some(&first) = values.peek() else {
        return 0.0;
    };

    let (n, offset) = values.fold((0usize, 0.0f64), |(n, acc), v| (n + 1, acc + (v - first)));
    first + offset / n as f64
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::types::{EnrichedEquity, QuoteBase};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn record(minute: u32, buy: f64, diff: f64) -> EnrichedQuote {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap()
            + TimeDelta::minutes(i64::from(minute));

        EnrichedQuote::Equity(EnrichedEquity {
            quote: QuoteBase {
                instrument_id: 1,
                symbol: "INFY".into(),
                last_price: 100.0,
                buy_qty: buy,
                sell_qty: 0.0,
                timestamp: ts,
            },
            flow: FlowDeltas {
                buy_diff_pct: diff,
                sell_diff_pct: diff,
                buy_strength_pct: diff,
                sell_strength_pct: diff,
                sentiment: diff,
            },
            points_change: 0.0,
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn buckets_partition_the_batch(
            minutes in prop::collection::vec(0u32..400, 0..60),
            interval in 1i64..=30,
        ) {
            let records: Vec<EnrichedQuote> =
                minutes.iter().map(|&m| record(m, 1.0, 0.0)).collect();

            let out = aggregate(&records, interval).unwrap();

            let total: usize = out.iter().map(|b| b.sample_count).sum();
            prop_assert_eq!(total, records.len());

            for pair in out.windows(2) {
                prop_assert!(pair[0].bucket_start < pair[1].bucket_start);
            }

            if let Some(anchor) = records.iter().map(|r| r.timestamp()).min() {
                let interval = Interval::new(interval).unwrap();
                for r in &records {
                    let start = bucket_start_for(anchor, r.timestamp(), interval);
                    let hits = out.iter().filter(|b| b.bucket_start == start).count();
                    prop_assert_eq!(hits, 1);
                    prop_assert!(start <= r.timestamp());
                    let end = start + TimeDelta::minutes(interval.minutes().into());
                    prop_assert!(r.timestamp() < end);
                }
            }
        }

        #[test]
        fn averaging_is_idempotent_under_repetition(
            diff in -1.0e6..1.0e6f64,
            n in 1usize..30,
        ) {
            let records: Vec<EnrichedQuote> = (0..n).map(|_| record(0, 1.0, diff)).collect();

            let out = aggregate(&records, 5).unwrap();
            prop_assert_eq!(out.len(), 1);
            prop_assert_eq!(out[0].summary.flow().buy_diff_pct, diff);
            prop_assert_eq!(out[0].summary.flow().sentiment, diff);
        }
    }
}
