//! Sentiment Classifier
//!
//! Turns one [`SentimentSnapshot`] into per-field [`Label`]s and a list of
//! trading [`Hint`]s. Every rule is an independent predicate over the
//! snapshot; all matching hints are emitted in table order.
//!
//! Momentum is three-way (bullish / bearish / mixed) and the trap pair is
//! mutually exclusive by construction. A zero value matches either sign, so
//! reversals are only flagged for strictly opposite signs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Stock/option/OI deltas at one timestamp, in percentage points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// Index move since the previous poll, in index points.
    pub points_changed: f64,
    pub stock_1min_change: f64,
    pub stock_overall_change: f64,
    pub option_1min_change: f64,
    pub option_overall_change: f64,
    pub oi_1min_change: f64,
    pub oi_overall_change: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Bullish => "Bullish",
            Label::Bearish => "Bearish",
            Label::Neutral => "Neutral",
        })
    }
}

/// Snapshot fields that receive a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentField {
    Stock1Min,
    StockOverall,
    Option1Min,
    OptionOverall,
    Oi1Min,
    OiOverall,
}

impl SentimentField {
    pub const ALL: [SentimentField; 6] = [
        Self::Stock1Min,
        Self::StockOverall,
        Self::Option1Min,
        Self::OptionOverall,
        Self::Oi1Min,
        Self::OiOverall,
    ];

    pub fn value(self, s: &SentimentSnapshot) -> f64 {
        match self {
            Self::Stock1Min => s.stock_1min_change,
            Self::StockOverall => s.stock_overall_change,
            Self::Option1Min => s.option_1min_change,
            Self::OptionOverall => s.option_overall_change,
            Self::Oi1Min => s.oi_1min_change,
            Self::OiOverall => s.oi_overall_change,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    BullishMomentum,
    BearishMomentum,
    MixedSignals,
    HighOiBuildup,
    StrongBuyingDominance,
    StrongSellingDominance,
    StockReversal,
    OptionReversal,
    Breakout,
    BullTrap,
    BearTrap,
}

impl Hint {
    /// Stable identifier.
    pub fn id(self) -> &'static str {
        match self {
            Hint::BullishMomentum => "bullish_momentum",
            Hint::BearishMomentum => "bearish_momentum",
            Hint::MixedSignals => "mixed_signals",
            Hint::HighOiBuildup => "high_oi_buildup",
            Hint::StrongBuyingDominance => "strong_buying_dominance",
            Hint::StrongSellingDominance => "strong_selling_dominance",
            Hint::StockReversal => "stock_reversal",
            Hint::OptionReversal => "option_reversal",
            Hint::Breakout => "breakout",
            Hint::BullTrap => "bull_trap",
            Hint::BearTrap => "bear_trap",
        }
    }

    /// Narrative text.
    pub fn text(self) -> &'static str {
        match self {
            Hint::BullishMomentum => {
                "Bullish momentum: stocks and options are both gaining buy pressure."
            }
            Hint::BearishMomentum => {
                "Bearish momentum: stocks and options are both losing buy pressure."
            }
            Hint::MixedSignals => {
                "Mixed signals: stocks and options disagree, wait for confirmation."
            }
            Hint::HighOiBuildup => {
                "High OI buildup: fresh positions are being written, expect volatility."
            }
            Hint::StrongBuyingDominance => {
                "Strong buying dominance since the open across stocks and options."
            }
            Hint::StrongSellingDominance => {
                "Strong selling dominance since the open across stocks and options."
            }
            Hint::StockReversal => {
                "Possible stock reversal: the last minute runs against the session trend."
            }
            Hint::OptionReversal => {
                "Possible option reversal: the last minute runs against the session trend."
            }
            Hint::Breakout => {
                "Breakout underway: sharp one-minute move in both stocks and options."
            }
            Hint::BullTrap => "Bull trap warning: option buying without open-interest support.",
            Hint::BearTrap => "Bear trap warning: option selling while open interest unwinds.",
        }
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Numeric cut-offs, in percentage points. Comparisons are strict.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// `|value| > label` leaves the neutral band.
    pub label: f64,
    /// `oi_1min > oi_buildup`.
    pub oi_buildup: f64,
    /// `stock_overall` and `option_overall` beyond `±dominance`.
    pub dominance: f64,
    /// `|stock_1min|` and `|option_1min|` above `breakout`.
    pub breakout: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            label: 0.5,
            oi_buildup: 1.0,
            dominance: 1.5,
            breakout: 2.0,
        }
    }
}

type Predicate = fn(&SentimentSnapshot, &Thresholds) -> bool;

struct Rule {
    hint: Hint,
    applies: Predicate,
}

fn bullish(s: &SentimentSnapshot) -> bool {
    s.stock_1min_change > 0.0 && s.option_1min_change > 0.0
}

fn bearish(s: &SentimentSnapshot) -> bool {
    s.stock_1min_change < 0.0 && s.option_1min_change < 0.0
}

/// Strictly opposite signs; zero never counts as a flip.
fn opposite(a: f64, b: f64) -> bool {
    (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0)
}

const RULES: &[Rule] = &[
    Rule {
        hint: Hint::BullishMomentum,
        applies: |s, _| bullish(s),
    },
    Rule {
        hint: Hint::BearishMomentum,
        applies: |s, _| bearish(s),
    },
    Rule {
        hint: Hint::MixedSignals,
        applies: |s, _| !bullish(s) && !bearish(s),
    },
    Rule {
        hint: Hint::HighOiBuildup,
        applies: |s, t| s.oi_1min_change > t.oi_buildup,
    },
    Rule {
        hint: Hint::StrongBuyingDominance,
        applies: |s, t| {
            s.stock_overall_change > t.dominance && s.option_overall_change > t.dominance
        },
    },
    Rule {
        hint: Hint::StrongSellingDominance,
        applies: |s, t| {
            s.stock_overall_change < -t.dominance && s.option_overall_change < -t.dominance
        },
    },
    Rule {
        hint: Hint::StockReversal,
        applies: |s, _| opposite(s.stock_1min_change, s.stock_overall_change),
    },
    Rule {
        hint: Hint::OptionReversal,
        applies: |s, _| opposite(s.option_1min_change, s.option_overall_change),
    },
    Rule {
        hint: Hint::Breakout,
        applies: |s, t| {
            s.stock_1min_change.abs() > t.breakout && s.option_1min_change.abs() > t.breakout
        },
    },
    Rule {
        hint: Hint::BullTrap,
        applies: |s, _| s.option_1min_change > 0.0 && s.oi_1min_change < 0.0,
    },
    Rule {
        hint: Hint::BearTrap,
        applies: |s, _| s.option_1min_change < 0.0 && s.oi_1min_change < 0.0,
    },
];

/// Classifier output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub labels: BTreeMap<SentimentField, Label>,
    pub hints: Vec<Hint>,
}

impl Classification {
    pub fn has(&self, hint: Hint) -> bool {
        self.hints.contains(&hint)
    }

    pub fn label(&self, field: SentimentField) -> Label {
        self.labels.get(&field).copied().unwrap_or(Label::Neutral)
    }

    /// Hint texts in rule order.
    pub fn rendered(&self) -> Vec<&'static str> {
        self.hints.iter().map(|h| h.text()).collect()
    }
}

/// Stateless, deterministic threshold engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct SentimentClassifier {
    thresholds: Thresholds,
}

impl SentimentClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Categorical label for one value.
    pub fn label(&self, value: f64) -> Label {
        if value > self.thresholds.label {
            Label::Bullish
        } else if value < -self.thresholds.label {
            Label::Bearish
        } else {
            Label::Neutral
        }
    }

    #[instrument(level = "debug", target = "classifier", skip(self))]
    pub fn classify(&self, snapshot: &SentimentSnapshot) -> Classification {
        let labels = SentimentField::ALL
            .iter()
            .map(|f| (*f, self.label(f.value(snapshot))))
            .collect();

        let hints: Vec<Hint> = RULES
            .iter()
            .filter(|r| (r.applies)(snapshot, &self.thresholds))
            .map(|r| r.hint)
            .collect();

        debug!(hints = ?hints, "snapshot classified");

        Classification { labels, hints }
    }
}

/// Classify with the default threshold table.
pub fn classify(snapshot: &SentimentSnapshot) -> Classification {
    SentimentClassifier::default().classify(snapshot)
}
