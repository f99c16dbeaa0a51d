//! Replay driver for the snapshot diff engine: feed normalization, an
//! in-memory record store, the poll loop and insight rendering.

pub mod args;
pub mod config;
pub mod feed;
pub mod output;
pub mod poller;
pub mod store;

pub use config::AppConfig;
pub use feed::{FeedError, FeedNormalizer, FileQuoteSource, QuoteSource};
pub use poller::{Pipeline, PollStats, run_poller};
pub use store::RecordStore;
