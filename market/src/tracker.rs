//! Diff/Strength Tracker
//!
//! Turns each incoming [`Quote`] into an [`EnrichedQuote`] by comparing it
//! against two per-instrument references:
//!
//! ```text
//! diff     = (current - previous) / previous * 100   (previous observation)
//! strength = (current - first)    / first    * 100   (first observation of the session)
//! ```
//!
//! A zero reference always yields `0.0`.
//!
//! ## State
//! [`TrackerState`] is partitioned by instrument symbol. Each instrument has
//! its own lock, so different instruments can be observed from several
//! threads at once while observations of the same instrument serialize.
//! `first` is written once per session and only cleared by an explicit
//! [`DiffTracker::reset_session`] / [`DiffTracker::reset_instrument`] call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::types::{EnrichedEquity, EnrichedOption, EnrichedQuote, FlowDeltas, OiDeltas, Quote};

/// Zero-guarded percentage change of `current` relative to `reference`.
pub fn percent_change(current: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    ((current - reference) / reference) * 100.0
}

/// The two references kept for one instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct Baseline {
    /// Most recent enriched observation.
    pub previous: EnrichedQuote,
    /// First observation seen this session.
    pub first: EnrichedQuote,
}

type Slot = Arc<Mutex<Option<Baseline>>>;

/// Per-instrument rolling state, owned by one [`DiffTracker`].
#[derive(Default)]
pub struct TrackerState {
    slots: RwLock<HashMap<String, Slot>>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock slot for `symbol`, created empty on first use.
    fn slot(&self, symbol: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(symbol) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(symbol.to_string()).or_default())
    }

    fn get(&self, symbol: &str) -> Option<Baseline> {
        let slot = self.slots.read().get(symbol).cloned()?;
        let guard = slot.lock();
        guard.clone()
    }

    fn len(&self) -> usize {
        self.slots.read().len()
    }

    fn clear(&self) -> usize {
        let mut slots = self.slots.write();
        let n = slots.len();
        slots.clear();
        n
    }

    fn remove(&self, symbol: &str) -> bool {
        self.slots.write().remove(symbol).is_some()
    }
}

/// Stateful per-instrument diff/strength computation.
#[derive(Clone, Default)]
pub struct DiffTracker {
    state: Arc<TrackerState>,
}

impl DiffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker over an existing state.
    pub fn with_state(state: Arc<TrackerState>) -> Self {
        Self { state }
    }

    /// Enrich one observation and advance the instrument's `previous`.
    #[instrument(
        level = "debug",
        target = "tracker",
        skip(self, quote),
        fields(symbol = %quote.symbol(), ts = %quote.timestamp())
    )]
    pub fn observe(&self, quote: Quote) -> EnrichedQuote {
        let slot = self.state.slot(quote.symbol());
        let mut baseline = slot.lock();

        let enriched = enrich(quote, baseline.as_ref());

        match baseline.as_mut() {
            Some(b) => b.previous = enriched.clone(),
            None => {
                debug!("session baseline captured");
                *baseline = Some(Baseline {
                    previous: enriched.clone(),
                    first: enriched.clone(),
                });
            }
        }

        let flow = enriched.flow();
        debug!(
            buy_diff_pct = flow.buy_diff_pct,
            sell_diff_pct = flow.sell_diff_pct,
            buy_strength_pct = flow.buy_strength_pct,
            sell_strength_pct = flow.sell_strength_pct,
            "observation enriched"
        );

        enriched
    }

    /// Process one poll cycle in arrival order.
    pub fn observe_batch<I>(&self, quotes: I) -> Vec<EnrichedQuote>
    where
        I: IntoIterator<Item = Quote>,
    {
        quotes.into_iter().map(|q| self.observe(q)).collect()
    }

    /// Session boundary: forget every baseline.
    #[instrument(skip(self), target = "tracker")]
    pub fn reset_session(&self) {
        let cleared = self.state.clear();
        info!(cleared, "tracker session reset");
    }

    /// Forget one instrument's baseline. Returns whether it was tracked.
    #[instrument(skip(self), target = "tracker")]
    pub fn reset_instrument(&self, symbol: &str) -> bool {
        let removed = self.state.remove(symbol);
        if removed {
            info!("instrument baseline reset");
        }
        removed
    }

    /// Copy of the references currently held for `symbol`.
    pub fn baseline(&self, symbol: &str) -> Option<Baseline> {
        self.state.get(symbol)
    }

    /// Number of instruments with state.
    pub fn tracked(&self) -> usize {
        self.state.len()
    }
}

fn open_interest(q: &EnrichedQuote) -> Option<f64> {
    match q {
        EnrichedQuote::Option(o) => Some(o.quote.open_interest),
        EnrichedQuote::Equity(_) => None,
    }
}

/// Pure delta computation. With no baseline the quote is its own reference.
fn enrich(quote: Quote, baseline: Option<&Baseline>) -> EnrichedQuote {
    let cur = quote.base();
    let (prev, first) = match baseline {
        Some(b) => (b.previous.base(), b.first.base()),
        None => (cur, cur),
    };

    let buy_diff_pct = percent_change(cur.buy_qty, prev.buy_qty);
    let sell_diff_pct = percent_change(cur.sell_qty, prev.sell_qty);
    let flow = FlowDeltas {
        buy_diff_pct,
        sell_diff_pct,
        buy_strength_pct: percent_change(cur.buy_qty, first.buy_qty),
        sell_strength_pct: percent_change(cur.sell_qty, first.sell_qty),
        sentiment: buy_diff_pct - sell_diff_pct,
    };
    let points_change = cur.last_price - prev.last_price;

    match quote {
        Quote::Equity(base) => EnrichedQuote::Equity(EnrichedEquity {
            quote: base,
            flow,
            points_change,
        }),
        Quote::Option(opt) => {
            let oi_now = opt.open_interest;
            let prev_oi = baseline
                .and_then(|b| open_interest(&b.previous))
                .unwrap_or(oi_now);
            let first_oi = baseline
                .and_then(|b| open_interest(&b.first))
                .unwrap_or(oi_now);

            EnrichedQuote::Option(EnrichedOption {
                quote: opt,
                flow,
                oi: OiDeltas {
                    oi_diff_pct: percent_change(oi_now, prev_oi),
                    oi_strength_pct: percent_change(oi_now, first_oi),
                },
                points_change,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionQuote, QuoteBase};
    use chrono::{NaiveDate, NaiveDateTime};
    use tracing_test::traced_test;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn base(symbol: &str, buy: f64, sell: f64, price: f64, ts: NaiveDateTime) -> QuoteBase {
        QuoteBase {
            instrument_id: 1,
            symbol: symbol.into(),
            last_price: price,
            buy_qty: buy,
            sell_qty: sell,
            timestamp: ts,
        }
    }

    fn equity(symbol: &str, buy: f64, sell: f64, ts: NaiveDateTime) -> Quote {
        Quote::Equity(base(symbol, buy, sell, 100.0, ts))
    }

    fn option(symbol: &str, buy: f64, oi: f64, ts: NaiveDateTime) -> Quote {
        Quote::Option(OptionQuote {
            base: base(symbol, buy, 50.0, 12.5, ts),
            volume_traded: 1_000.0,
            open_interest: oi,
            oi_change_raw: 0.0,
        })
    }

    #[test]
    fn zero_reference_yields_zero() {
        assert_eq!(percent_change(150.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(150.0, 100.0), 50.0);
        assert_eq!(percent_change(80.0, 100.0), -20.0);
    }

    #[test]
    fn first_observation_has_all_zero_deltas() {
        let t = DiffTracker::new();
        let e = t.observe(equity("INFY", 100.0, 70.0, at(9, 15)));

        assert_eq!(e.flow(), &FlowDeltas::default());
        assert_eq!(e.points_change(), 0.0);

        let b = t.baseline("INFY").unwrap();
        assert_eq!(b.first, e);
        assert_eq!(b.previous, e);
    }

    #[test]
    fn diff_tracks_previous_and_strength_tracks_first() {
        let t = DiffTracker::new();

        t.observe(equity("INFY", 100.0, 100.0, at(9, 15)));
        let e1 = t.observe(equity("INFY", 150.0, 100.0, at(9, 16)));
        assert_eq!(e1.flow().buy_diff_pct, 50.0);
        assert_eq!(e1.flow().buy_strength_pct, 50.0);

        let e2 = t.observe(equity("INFY", 120.0, 100.0, at(9, 17)));
        assert_eq!(e2.flow().buy_diff_pct, -20.0);
        assert_eq!(e2.flow().buy_strength_pct, 20.0);
        assert_eq!(e2.flow().sentiment, -20.0);

        let b = t.baseline("INFY").unwrap();
        assert_eq!(b.first.base().buy_qty, 100.0);
        assert_eq!(b.previous.base().buy_qty, 120.0);
    }

    #[test]
    fn zero_previous_quantity_does_not_divide() {
        let t = DiffTracker::new();

        t.observe(equity("SBIN", 0.0, 0.0, at(9, 15)));
        let e = t.observe(equity("SBIN", 500.0, 20.0, at(9, 16)));

        assert_eq!(e.flow().buy_diff_pct, 0.0);
        assert_eq!(e.flow().sell_strength_pct, 0.0);
        assert!(e.flow().sentiment.is_finite());
    }

    #[test]
    fn option_open_interest_uses_same_rule() {
        let t = DiffTracker::new();

        let e0 = t.observe(option("NIFTY22000CE", 10.0, 2_000.0, at(9, 15)));
        assert_eq!(e0.oi(), Some(&OiDeltas::default()));

        t.observe(option("NIFTY22000CE", 10.0, 2_500.0, at(9, 16)));
        let e2 = t.observe(option("NIFTY22000CE", 10.0, 3_000.0, at(9, 17)));

        let oi = e2.oi().unwrap();
        assert_eq!(oi.oi_diff_pct, 20.0);
        assert_eq!(oi.oi_strength_pct, 50.0);
    }

    #[test]
    fn instruments_do_not_share_state() {
        let t = DiffTracker::new();

        t.observe(equity("INFY", 100.0, 100.0, at(9, 15)));
        let tcs = t.observe(equity("TCS", 400.0, 100.0, at(9, 15)));

        assert_eq!(tcs.flow().buy_diff_pct, 0.0);
        assert_eq!(t.tracked(), 2);
    }

    #[test]
    fn points_change_is_against_previous_price() {
        let t = DiffTracker::new();

        t.observe(Quote::Equity(base("NIFTY 50", 0.0, 0.0, 22_000.0, at(9, 15))));
        let e = t.observe(Quote::Equity(base("NIFTY 50", 0.0, 0.0, 22_012.5, at(9, 16))));

        assert_eq!(e.points_change(), 12.5);
    }

    #[test]
    #[traced_test]
    fn reset_session_restarts_baselines() {
        let t = DiffTracker::new();

        t.observe(equity("INFY", 100.0, 100.0, at(9, 15)));
        t.observe(equity("INFY", 200.0, 100.0, at(9, 16)));
        t.reset_session();

        assert_eq!(t.tracked(), 0);
        assert!(logs_contain("tracker session reset"));

        let e = t.observe(equity("INFY", 300.0, 100.0, at(9, 15)));
        assert_eq!(e.flow().buy_strength_pct, 0.0);
        assert_eq!(t.baseline("INFY").unwrap().first.base().buy_qty, 300.0);
    }

    #[test]
    fn reset_instrument_only_touches_one_symbol() {
        let t = DiffTracker::new();

        t.observe(equity("INFY", 100.0, 100.0, at(9, 15)));
        t.observe(equity("TCS", 100.0, 100.0, at(9, 15)));

        assert!(t.reset_instrument("INFY"));
        assert!(!t.reset_instrument("INFY"));
        assert!(t.baseline("INFY").is_none());
        assert!(t.baseline("TCS").is_some());
    }

    #[test]
    fn batch_is_processed_in_arrival_order() {
        let t = DiffTracker::new();

        let out = t.observe_batch(vec![
            equity("INFY", 100.0, 10.0, at(9, 15)),
            equity("INFY", 200.0, 10.0, at(9, 16)),
            equity("INFY", 100.0, 10.0, at(9, 17)),
        ]);

        let diffs: Vec<f64> = out.iter().map(|e| e.flow().buy_diff_pct).collect();
        assert_eq!(diffs, vec![0.0, 100.0, -50.0]);
    }

    #[test]
    fn concurrent_instruments_keep_their_own_first() {
        let t = DiffTracker::new();
        let symbols: Vec<String> = (0..8).map(|i| format!("SYM{i}")).collect();

        std::thread::scope(|s| {
            for (i, sym) in symbols.iter().enumerate() {
                let t = t.clone();
                s.spawn(move || {
                    for m in 0..50u32 {
                        let buy = (i as f64 + 1.0) * 100.0 + f64::from(m);
                        t.observe(equity(sym, buy, 10.0, at(9, 15 + m % 45)));
                    }
                });
            }
        });

        assert_eq!(t.tracked(), 8);
        for (i, sym) in symbols.iter().enumerate() {
            let b = t.baseline(sym).unwrap();
            assert_eq!(b.first.base().buy_qty, (i as f64 + 1.0) * 100.0);
            assert_eq!(b.previous.base().buy_qty, (i as f64 + 1.0) * 100.0 + 49.0);
        }
    }
}
