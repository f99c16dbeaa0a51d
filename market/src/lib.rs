//! Snapshot diff & aggregation engine.
//!
//! Polled quote snapshots flow through four stages:
//!
//! ```text
//! Quote ─► DiffTracker ─► EnrichedQuote ─► aggregate() ─► SummaryBucket
//!                             │                              │
//!                             └─────► InsightBuilder ◄───────┘
//!                                        │ SentimentClassifier
//!                                        ▼
//!                                   MarketInsight
//! ```
//!
//! The crate performs no I/O; fetching, storage and rendering belong to the
//! caller.

pub mod aggregate;
pub mod classifier;
pub mod error;
pub mod insight;
pub mod registry;
pub mod tracker;
pub mod types;

pub use aggregate::{Bucketable, Interval, aggregate, aggregate_per_instrument};
pub use classifier::{
    Classification, Hint, Label, SentimentClassifier, SentimentSnapshot, Thresholds, classify,
};
pub use error::MarketError;
pub use insight::{InsightBuilder, InsightInput, InsightLedger, MarketInsight};
pub use registry::{Instrument, InstrumentRegistry, NIFTY_50};
pub use tracker::{DiffTracker, TrackerState, percent_change};
pub use types::{
    EnrichedQuote, InstrumentClass, OptionQuote, Quote, QuoteBase, QuoteKind, SummaryBucket,
};
