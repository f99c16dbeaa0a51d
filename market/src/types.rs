use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Partition of the instrument universe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Equity,
    Index,
    Option,
}

/// Field-set carried by a record. Index quotes share the equity field set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteKind {
    Equity,
    Option,
}

/// Fields every observation carries, whatever its class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteBase {
    pub instrument_id: u64,
    pub symbol: String,
    pub last_price: f64,
    pub buy_qty: f64,
    pub sell_qty: f64,
    /// Local exchange time.
    pub timestamp: NaiveDateTime,
}

/// Option-chain observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub base: QuoteBase,
    pub volume_traded: f64,
    pub open_interest: f64,
    /// Change in open interest as reported by the feed.
    pub oi_change_raw: f64,
}

/// One instrument observation produced by the feed normalizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quote {
    Equity(QuoteBase),
    Option(OptionQuote),
}

impl Quote {
    pub fn base(&self) -> &QuoteBase {
        match self {
            Quote::Equity(b) => b,
            Quote::Option(o) => &o.base,
        }
    }

    pub fn kind(&self) -> QuoteKind {
        match self {
            Quote::Equity(_) => QuoteKind::Equity,
            Quote::Option(_) => QuoteKind::Option,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.base().symbol
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.base().timestamp
    }
}

/// Buy/sell pressure deltas, in percent.
///
/// `*_diff_pct` compares against the previous observation of the same
/// instrument, `*_strength_pct` against the first observation of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDeltas {
    pub buy_diff_pct: f64,
    pub sell_diff_pct: f64,
    pub buy_strength_pct: f64,
    pub sell_strength_pct: f64,
    /// Net buy pressure: `buy_diff_pct - sell_diff_pct`.
    pub sentiment: f64,
}

impl FlowDeltas {
    /// Net buy pressure against the session baseline.
    pub fn net_strength(&self) -> f64 {
        self.buy_strength_pct - self.sell_strength_pct
    }
}

/// Open-interest deltas, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OiDeltas {
    pub oi_diff_pct: f64,
    pub oi_strength_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEquity {
    pub quote: QuoteBase,
    pub flow: FlowDeltas,
    /// `last_price - previous.last_price`, in price points.
    pub points_change: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedOption {
    pub quote: OptionQuote,
    pub flow: FlowDeltas,
    pub oi: OiDeltas,
    pub points_change: f64,
}

/// A quote plus the deltas derived by the tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichedQuote {
    Equity(EnrichedEquity),
    Option(EnrichedOption),
}

impl EnrichedQuote {
    pub fn base(&self) -> &QuoteBase {
        match self {
            EnrichedQuote::Equity(e) => &e.quote,
            EnrichedQuote::Option(o) => &o.quote.base,
        }
    }

    pub fn kind(&self) -> QuoteKind {
        match self {
            EnrichedQuote::Equity(_) => QuoteKind::Equity,
            EnrichedQuote::Option(_) => QuoteKind::Option,
        }
    }

    pub fn flow(&self) -> &FlowDeltas {
        match self {
            EnrichedQuote::Equity(e) => &e.flow,
            EnrichedQuote::Option(o) => &o.flow,
        }
    }

    pub fn oi(&self) -> Option<&OiDeltas> {
        match self {
            EnrichedQuote::Equity(_) => None,
            EnrichedQuote::Option(o) => Some(&o.oi),
        }
    }

    pub fn points_change(&self) -> f64 {
        match self {
            EnrichedQuote::Equity(e) => e.points_change,
            EnrichedQuote::Option(o) => o.points_change,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.base().symbol
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.base().timestamp
    }
}

/// Reduced equity fields of one bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquitySummary {
    pub symbol: String,
    pub last_price: f64,
    pub buy_qty: f64,
    pub sell_qty: f64,
    pub flow: FlowDeltas,
}

/// Reduced option fields of one bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionSummary {
    pub symbol: String,
    pub last_price: f64,
    pub buy_qty: f64,
    pub sell_qty: f64,
    pub volume_traded: f64,
    pub open_interest: f64,
    pub oi_change_raw: f64,
    pub flow: FlowDeltas,
    pub oi: OiDeltas,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketSummary {
    Equity(EquitySummary),
    Option(OptionSummary),
}

impl BucketSummary {
    pub fn kind(&self) -> QuoteKind {
        match self {
            BucketSummary::Equity(_) => QuoteKind::Equity,
            BucketSummary::Option(_) => QuoteKind::Option,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            BucketSummary::Equity(e) => &e.symbol,
            BucketSummary::Option(o) => &o.symbol,
        }
    }

    pub fn last_price(&self) -> f64 {
        match self {
            BucketSummary::Equity(e) => e.last_price,
            BucketSummary::Option(o) => o.last_price,
        }
    }

    pub fn flow(&self) -> &FlowDeltas {
        match self {
            BucketSummary::Equity(e) => &e.flow,
            BucketSummary::Option(o) => &o.flow,
        }
    }
}

/// One aggregation window of a single quote kind. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryBucket {
    pub bucket_start: NaiveDateTime,
    pub interval_minutes: u32,
    /// Number of records reduced into this bucket.
    pub sample_count: usize,
    /// Timestamp of the most recent record in the bucket.
    pub last_sample_at: NaiveDateTime,
    pub summary: BucketSummary,
}
