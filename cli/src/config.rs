use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use market::{Interval, NIFTY_50};

/// Indian Standard Time, UTC+05:30.
const IST_OFFSET_SECS: i32 = 330 * 60;

/// Runtime configuration. Environment first, CLI flags override.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Aggregation granularity for the insight history.
    pub interval: Interval,

    /// Length of the top buy/sell fluctuation lists.
    pub top_n: usize,

    /// Poll cadence when replay is paced.
    pub poll_every: Duration,

    /// Exchange local time relative to UTC. Unix timestamps from the feed are
    /// shifted by this before they reach the engine.
    pub utc_offset: FixedOffset,

    /// Rows outside `[market_open, market_close]` are dropped by the poller.
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,

    /// Instrument id of the index that heads every insight.
    pub headline_index: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval: Interval::FIVE_MIN,
            top_n: 5,
            poll_every: Duration::from_secs(60),
            utc_offset: FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or(Utc.fix()),
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
            headline_index: NIFTY_50,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(m) = parse::<i64, _>(&lookup, "SNAPDIFF_INTERVAL_MINUTES")? {
            cfg.interval = Interval::new(m)?;
        }
        if let Some(n) = parse::<usize, _>(&lookup, "SNAPDIFF_TOP_N")? {
            cfg.top_n = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SNAPDIFF_POLL_MS")? {
            cfg.poll_every = Duration::from_millis(ms);
        }
        if let Some(min) = parse::<i32, _>(&lookup, "SNAPDIFF_UTC_OFFSET_MINUTES")? {
            cfg.utc_offset = offset_from_minutes(min)?;
        }
        if let Some(id) = parse::<u64, _>(&lookup, "SNAPDIFF_HEADLINE_INDEX")? {
            cfg.headline_index = id;
        }
        if let Some(t) = lookup("SNAPDIFF_MARKET_OPEN") {
            cfg.market_open = parse_hhmm(&t).context("SNAPDIFF_MARKET_OPEN")?;
        }
        if let Some(t) = lookup("SNAPDIFF_MARKET_CLOSE") {
            cfg.market_close = parse_hhmm(&t).context("SNAPDIFF_MARKET_CLOSE")?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_open >= self.market_close {
            bail!(
                "market open {} must be before market close {}",
                self.market_open,
                self.market_close
            );
        }
        if self.poll_every.is_zero() {
            bail!("poll interval must be positive");
        }
        Ok(())
    }

    pub fn in_market_hours(&self, t: NaiveTime) -> bool {
        t >= self.market_open && t <= self.market_close
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {key}: {v:?}")))
        .transpose()
}

pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("utc offset out of range: {minutes} minutes"))
}

/// `HH:mm` wall-clock time.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("expected HH:mm, got {s:?}"))
}
