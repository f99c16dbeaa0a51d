//! Market insight assembly.
//!
//! Combines the latest enriched observations of a poll with the aggregated
//! history at one interval into a single write-once [`MarketInsight`]:
//! index level and move, rendered stock/option/sentiment summaries, top
//! buy/sell fluctuations and the classifier's trading hints.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::aggregate::{Interval, mean};
use crate::classifier::{
    Classification, Label, SentimentClassifier, SentimentField, SentimentSnapshot,
};
use crate::error::MarketError;
use crate::registry::{InstrumentRegistry, NIFTY_50};
use crate::types::{BucketSummary, EnrichedQuote, QuoteKind, SummaryBucket};

/// One entry of a top-N fluctuation list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fluctuation {
    pub symbol: String,
    /// Change against the previous observation, percent.
    pub diff_pct: f64,
    /// Change against the session baseline, percent.
    pub strength_pct: f64,
}

/// Narrative artifact for one (timestamp, interval).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketInsight {
    pub timestamp: NaiveDateTime,
    pub interval_minutes: u32,
    pub interval_label: String,
    pub index_symbol: Option<String>,
    pub index_level: f64,
    pub points_changed: f64,
    pub stock_summary: String,
    pub option_summary: String,
    pub sentiment_summary: String,
    pub snapshot: SentimentSnapshot,
    pub classification: Classification,
    pub top_buy_fluctuations: Vec<Fluctuation>,
    pub top_sell_fluctuations: Vec<Fluctuation>,
    pub trading_hints: String,
}

/// What one insight is built from.
#[derive(Clone, Copy, Debug)]
pub struct InsightInput<'a> {
    pub timestamp: NaiveDateTime,
    pub interval: Interval,
    /// Enriched observations of the latest poll.
    pub latest: &'a [EnrichedQuote],
    /// History aggregated at `interval`.
    pub buckets: &'a [SummaryBucket],
}

pub struct InsightBuilder {
    registry: Arc<InstrumentRegistry>,
    classifier: SentimentClassifier,
    top_n: usize,
    /// Index whose level and move head every insight.
    headline: u64,
}

impl InsightBuilder {
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        classifier: SentimentClassifier,
        top_n: usize,
    ) -> Self {
        Self {
            registry,
            classifier,
            top_n,
            headline: NIFTY_50,
        }
    }

    /// Head insights with index `id` instead of NIFTY 50.
    pub fn with_headline(mut self, id: u64) -> Self {
        self.headline = id;
        self
    }

    fn is_index(&self, q: &EnrichedQuote) -> bool {
        self.registry.is_index(q.symbol())
    }

    fn index_quote<'q>(&self, latest: &'q [EnrichedQuote]) -> Option<&'q EnrichedQuote> {
        let symbol = self.registry.symbol(self.headline)?;
        latest.iter().find(|q| q.symbol() == symbol)
    }

    /// Classifier input from the latest poll.
    ///
    /// 1-min changes are mean net buy pressure against the previous poll,
    /// overall changes mean net pressure against the session baseline.
    /// A class with no observations contributes 0.
    pub fn snapshot(&self, latest: &[EnrichedQuote]) -> SentimentSnapshot {
        let stocks: Vec<&EnrichedQuote> = latest
            .iter()
            .filter(|q| q.kind() == QuoteKind::Equity && !self.is_index(q))
            .collect();
        let options: Vec<&EnrichedQuote> = latest
            .iter()
            .filter(|q| q.kind() == QuoteKind::Option)
            .collect();

        SentimentSnapshot {
            points_changed: self
                .index_quote(latest)
                .map(EnrichedQuote::points_change)
                .unwrap_or(0.0),
            stock_1min_change: mean(stocks.iter().map(|q| q.flow().sentiment)),
            stock_overall_change: mean(stocks.iter().map(|q| q.flow().net_strength())),
            option_1min_change: mean(options.iter().map(|q| q.flow().sentiment)),
            option_overall_change: mean(options.iter().map(|q| q.flow().net_strength())),
            oi_1min_change: mean(options.iter().filter_map(|q| q.oi()).map(|d| d.oi_diff_pct)),
            oi_overall_change: mean(
                options
                    .iter()
                    .filter_map(|q| q.oi())
                    .map(|d| d.oi_strength_pct),
            ),
        }
    }

    #[instrument(
        target = "insight",
        skip(self, input),
        fields(ts = %input.timestamp, interval = %input.interval, latest = input.latest.len())
    )]
    pub fn build(&self, input: &InsightInput<'_>) -> MarketInsight {
        let snapshot = self.snapshot(input.latest);
        let classification = self.classifier.classify(&snapshot);

        let index = self.index_quote(input.latest);
        let movers: Vec<&EnrichedQuote> = input
            .latest
            .iter()
            .filter(|q| !self.is_index(q))
            .collect();

        let insight = MarketInsight {
            timestamp: input.timestamp,
            interval_minutes: input.interval.minutes(),
            interval_label: input.interval.label(),
            index_symbol: index.map(|q| q.symbol().to_string()),
            index_level: index.map(|q| q.base().last_price).unwrap_or(0.0),
            points_changed: snapshot.points_changed,
            stock_summary: render_bucket("Stocks", latest_bucket(input.buckets, QuoteKind::Equity)),
            option_summary: render_bucket(
                "Options",
                latest_bucket(input.buckets, QuoteKind::Option),
            ),
            sentiment_summary: render_sentiment(&classification),
            snapshot,
            top_buy_fluctuations: top_n(&movers, self.top_n, |q| {
                (q.flow().buy_diff_pct, q.flow().buy_strength_pct)
            }),
            top_sell_fluctuations: top_n(&movers, self.top_n, |q| {
                (q.flow().sell_diff_pct, q.flow().sell_strength_pct)
            }),
            trading_hints: classification.rendered().join("\n"),
            classification,
        };

        debug!(
            hints = insight.classification.hints.len(),
            index_level = insight.index_level,
            "insight built"
        );

        insight
    }
}

fn latest_bucket(buckets: &[SummaryBucket], kind: QuoteKind) -> Option<&SummaryBucket> {
    buckets
        .iter()
        .filter(|b| b.summary.kind() == kind)
        .max_by_key(|b| b.bucket_start)
}

fn render_bucket(title: &str, bucket: Option<&SummaryBucket>) -> String {
    let Some(b) = bucket else {
        return format!("{title}: no data");
    };

    let start = b.bucket_start.format("%H:%M");
    let f = b.summary.flow();
    let mut out = match &b.summary {
        BucketSummary::Equity(e) => format!(
            "{title} [{start}, {} min]: buy {:.0} / sell {:.0}",
            b.interval_minutes, e.buy_qty, e.sell_qty
        ),
        BucketSummary::Option(o) => format!(
            "{title} [{start}, {} min]: buy {:.0} / sell {:.0}, volume {:.0}, OI {:.0} ({:+.2}%)",
            b.interval_minutes,
            o.buy_qty,
            o.sell_qty,
            o.volume_traded,
            o.open_interest,
            o.oi.oi_diff_pct
        ),
    };
    out.push_str(&format!(
        ", buy {:+.2}% / sell {:+.2}%, strength {:+.2}% / {:+.2}%",
        f.buy_diff_pct, f.sell_diff_pct, f.buy_strength_pct, f.sell_strength_pct
    ));
    out
}

fn render_sentiment(c: &Classification) -> String {
    let pair = |one: SentimentField, all: SentimentField| -> (Label, Label) {
        (c.label(one), c.label(all))
    };

    let (s1, sa) = pair(SentimentField::Stock1Min, SentimentField::StockOverall);
    let (o1, oa) = pair(SentimentField::Option1Min, SentimentField::OptionOverall);
    let (i1, ia) = pair(SentimentField::Oi1Min, SentimentField::OiOverall);

    format!("Stocks {s1}/{sa}, Options {o1}/{oa}, OI {i1}/{ia} (1 min/overall)")
}

/// Non-zero values, largest first; ties broken by symbol.
fn top_n<F>(quotes: &[&EnrichedQuote], n: usize, metric: F) -> Vec<Fluctuation>
where
    F: Fn(&EnrichedQuote) -> (f64, f64),
{
    let mut out: Vec<Fluctuation> = quotes
        .iter()
        .map(|q| {
            let (diff_pct, strength_pct) = metric(q);
            Fluctuation {
                symbol: q.symbol().to_string(),
                diff_pct,
                strength_pct,
            }
        })
        .filter(|f| f.diff_pct != 0.0)
        .collect();

    out.sort_by(|a, b| {
        b.diff_pct
            .total_cmp(&a.diff_pct)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    out.truncate(n);
    out
}

/// Write-once store of insights keyed by (timestamp, interval).
#[derive(Debug, Default)]
pub struct InsightLedger {
    entries: BTreeMap<(NaiveDateTime, u32), MarketInsight>,
}

impl InsightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `insight`; a second insight for the same key is rejected.
    pub fn record(&mut self, insight: MarketInsight) -> Result<&MarketInsight, MarketError> {
        let key = (insight.timestamp, insight.interval_minutes);
        if self.entries.contains_key(&key) {
            return Err(MarketError::DuplicateInsight {
                timestamp: key.0,
                interval_minutes: key.1,
            });
        }
        Ok(self.entries.entry(key).or_insert(insight))
    }

    pub fn get(&self, timestamp: NaiveDateTime, interval: Interval) -> Option<&MarketInsight> {
        self.entries.get(&(timestamp, interval.minutes()))
    }

    /// Most recent insight, any interval.
    pub fn latest(&self) -> Option<&MarketInsight> {
        self.entries.values().next_back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketInsight> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Hint;
    use crate::types::{
        EnrichedEquity, EnrichedOption, EquitySummary, FlowDeltas, InstrumentClass, OiDeltas,
        OptionQuote, QuoteBase,
    };
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn registry() -> Arc<InstrumentRegistry> {
        let mut reg = InstrumentRegistry::builtin();
        reg.register(9001, "NIFTY22000CE", InstrumentClass::Option);
        Arc::new(reg)
    }

    fn base(symbol: &str, price: f64) -> QuoteBase {
        QuoteBase {
            instrument_id: 0,
            symbol: symbol.into(),
            last_price: price,
            buy_qty: 100.0,
            sell_qty: 100.0,
            timestamp: at(9, 20),
        }
    }

    fn stock(symbol: &str, buy_diff: f64, sell_diff: f64, strength: f64) -> EnrichedQuote {
        EnrichedQuote::Equity(EnrichedEquity {
            quote: base(symbol, 1_000.0),
            flow: FlowDeltas {
                buy_diff_pct: buy_diff,
                sell_diff_pct: sell_diff,
                buy_strength_pct: strength,
                sell_strength_pct: 0.0,
                sentiment: buy_diff - sell_diff,
            },
            points_change: 0.0,
        })
    }

    fn index(level: f64, points: f64) -> EnrichedQuote {
        index_named("NIFTY 50", level, points)
    }

    fn index_named(symbol: &str, level: f64, points: f64) -> EnrichedQuote {
        EnrichedQuote::Equity(EnrichedEquity {
            quote: base(symbol, level),
            flow: FlowDeltas::default(),
            points_change: points,
        })
    }

    fn option(sentiment: f64, strength: f64, oi_diff: f64) -> EnrichedQuote {
        EnrichedQuote::Option(EnrichedOption {
            quote: OptionQuote {
                base: base("NIFTY22000CE", 80.0),
                volume_traded: 10.0,
                open_interest: 1_000.0,
                oi_change_raw: 0.0,
            },
            flow: FlowDeltas {
                buy_diff_pct: sentiment,
                sell_diff_pct: 0.0,
                buy_strength_pct: strength,
                sell_strength_pct: 0.0,
                sentiment,
            },
            oi: OiDeltas {
                oi_diff_pct: oi_diff,
                oi_strength_pct: oi_diff,
            },
            points_change: 0.0,
        })
    }

    fn builder(top_n: usize) -> InsightBuilder {
        InsightBuilder::new(registry(), SentimentClassifier::default(), top_n)
    }

    #[test]
    fn snapshot_excludes_index_from_stock_means() {
        let latest = vec![
            index(22_000.0, 35.0),
            stock("INFY", 2.0, 0.5, 3.0),
            stock("TCS", 1.0, 0.0, 1.0),
            option(0.8, 1.8, -0.4),
        ];

        let s = builder(3).snapshot(&latest);
        assert_eq!(s.points_changed, 35.0);
        assert_eq!(s.stock_1min_change, 1.25);
        assert_eq!(s.stock_overall_change, 2.0);
        assert_eq!(s.option_1min_change, 0.8);
        assert_eq!(s.oi_1min_change, -0.4);
    }

    #[test]
    fn empty_poll_gives_flat_snapshot() {
        assert_eq!(builder(3).snapshot(&[]), SentimentSnapshot::default());
    }

    #[test]
    fn build_fills_every_section() {
        let latest = vec![
            index(22_000.0, -12.0),
            stock("INFY", 2.0, 0.5, 3.0),
            stock("TCS", 0.5, 1.5, 1.0),
            stock("SBIN", 3.0, 0.0, 1.0),
            option(0.8, 1.8, -0.4),
        ];
        let buckets = vec![SummaryBucket {
            bucket_start: at(9, 15),
            interval_minutes: 5,
            sample_count: 3,
            last_sample_at: at(9, 19),
            summary: BucketSummary::Equity(EquitySummary {
                symbol: "INFY".into(),
                last_price: 1_500.0,
                buy_qty: 600.0,
                sell_qty: 400.0,
                flow: FlowDeltas::default(),
            }),
        }];

        let insight = builder(2).build(&InsightInput {
            timestamp: at(9, 20),
            interval: Interval::FIVE_MIN,
            latest: &latest,
            buckets: &buckets,
        });

        assert_eq!(insight.index_symbol.as_deref(), Some("NIFTY 50"));
        assert_eq!(insight.index_level, 22_000.0);
        assert_eq!(insight.points_changed, -12.0);
        assert_eq!(insight.interval_label, "5 min");
        assert!(insight.stock_summary.starts_with("Stocks [09:15, 5 min]: buy 600 / sell 400"));
        assert_eq!(insight.option_summary, "Options: no data");

        let buys: Vec<&str> = insight
            .top_buy_fluctuations
            .iter()
            .map(|f| f.symbol.as_str())
            .collect();
        assert_eq!(buys, vec!["SBIN", "INFY"]);

        let sells: Vec<&str> = insight
            .top_sell_fluctuations
            .iter()
            .map(|f| f.symbol.as_str())
            .collect();
        assert_eq!(sells, vec!["TCS", "INFY"]);

        assert!(insight.classification.has(Hint::BullishMomentum));
        assert!(insight.classification.has(Hint::BullTrap));
        assert!(insight.trading_hints.contains("Bull trap"));
        assert!(insight.sentiment_summary.starts_with("Stocks Bullish/"));
    }

    #[test]
    fn headline_index_does_not_depend_on_row_order() {
        let latest = vec![
            index_named("NIFTY BANK", 48_000.0, 120.0),
            index(22_000.0, -12.0),
            stock("INFY", 1.0, 0.0, 1.0),
        ];
        let input = InsightInput {
            timestamp: at(9, 20),
            interval: Interval::FIVE_MIN,
            latest: &latest,
            buckets: &[],
        };

        let nifty = builder(3).build(&input);
        assert_eq!(nifty.index_symbol.as_deref(), Some("NIFTY 50"));
        assert_eq!(nifty.index_level, 22_000.0);
        assert_eq!(nifty.points_changed, -12.0);
        assert_eq!(nifty.snapshot.points_changed, -12.0);

        let bank = builder(3).with_headline(260105).build(&input);
        assert_eq!(bank.index_symbol.as_deref(), Some("NIFTY BANK"));
        assert_eq!(bank.index_level, 48_000.0);
        assert_eq!(bank.points_changed, 120.0);
    }

    #[test]
    fn headline_missing_from_poll_leaves_level_flat() {
        let latest = vec![index_named("NIFTY BANK", 48_000.0, 120.0)];
        let insight = builder(3).build(&InsightInput {
            timestamp: at(9, 20),
            interval: Interval::FIVE_MIN,
            latest: &latest,
            buckets: &[],
        });

        assert_eq!(insight.index_symbol, None);
        assert_eq!(insight.index_level, 0.0);
        assert_eq!(insight.points_changed, 0.0);
    }

    #[test]
    fn falling_pressure_still_ranks_movers() {
        let latest = vec![
            stock("INFY", -20.0, -50.0, -20.0),
            stock("TCS", -10.0, -40.0, -10.0),
            stock("SBIN", 0.0, 0.0, 0.0),
        ];

        let insight = builder(3).build(&InsightInput {
            timestamp: at(9, 20),
            interval: Interval::FIVE_MIN,
            latest: &latest,
            buckets: &[],
        });

        let buys: Vec<(&str, f64)> = insight
            .top_buy_fluctuations
            .iter()
            .map(|f| (f.symbol.as_str(), f.diff_pct))
            .collect();
        assert_eq!(buys, vec![("TCS", -10.0), ("INFY", -20.0)]);

        let sells: Vec<(&str, f64)> = insight
            .top_sell_fluctuations
            .iter()
            .map(|f| (f.symbol.as_str(), f.diff_pct))
            .collect();
        assert_eq!(sells, vec![("TCS", -40.0), ("INFY", -50.0)]);
    }

    #[test]
    fn ledger_is_write_once_per_timestamp_and_interval() {
        let b = builder(3);
        let input = InsightInput {
            timestamp: at(9, 20),
            interval: Interval::FIVE_MIN,
            latest: &[],
            buckets: &[],
        };

        let mut ledger = InsightLedger::new();
        assert!(ledger.record(b.build(&input)).is_ok());

        let dup = ledger.record(b.build(&input));
        assert_eq!(
            dup.err(),
            Some(MarketError::DuplicateInsight {
                timestamp: at(9, 20),
                interval_minutes: 5,
            })
        );

        let other = InsightInput {
            interval: Interval::FIFTEEN_MIN,
            ..input
        };
        assert!(ledger.record(b.build(&other)).is_ok());
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(at(9, 20), Interval::FIVE_MIN).is_some());
        assert_eq!(ledger.latest().map(|i| i.interval_minutes), Some(15));
    }
}
