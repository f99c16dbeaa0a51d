//! Instrument Registry
//!
//! Static mapping of instrument id to display symbol, partitioned by class.
//! Every other component only uses it for naming and for deciding which field
//! set an observation carries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::InstrumentClass;

/// A tradable security, index or option contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: u64,
    pub symbol: String,
    pub class: InstrumentClass,
}

/// Default headline index.
pub const NIFTY_50: u64 = 256265;

/// NSE instruments tracked out of the box (exchange instrument tokens).
const BUILTIN: &[(u64, &str, InstrumentClass)] = &[
    (NIFTY_50, "NIFTY 50", InstrumentClass::Index),
    (260105, "NIFTY BANK", InstrumentClass::Index),
    (738561, "RELIANCE", InstrumentClass::Equity),
    (341249, "HDFCBANK", InstrumentClass::Equity),
    (1270529, "ICICIBANK", InstrumentClass::Equity),
    (408065, "INFY", InstrumentClass::Equity),
    (2953217, "TCS", InstrumentClass::Equity),
    (2714625, "BHARTIARTL", InstrumentClass::Equity),
    (2939649, "LT", InstrumentClass::Equity),
    (424961, "ITC", InstrumentClass::Equity),
    (779521, "SBIN", InstrumentClass::Equity),
    (1510401, "AXISBANK", InstrumentClass::Equity),
    (492033, "KOTAKBANK", InstrumentClass::Equity),
];

#[derive(Clone, Debug, Default)]
pub struct InstrumentRegistry {
    by_id: HashMap<u64, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the benchmark indices and index heavyweights.
    /// Option contracts roll every expiry and are registered by the feed.
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .map(|(id, symbol, class)| Instrument {
                id: *id,
                symbol: (*symbol).to_string(),
                class: *class,
            })
            .collect()
    }

    /// Insert or replace an instrument. Returns the entry it replaced.
    pub fn register(
        &mut self,
        id: u64,
        symbol: impl Into<String>,
        class: InstrumentClass,
    ) -> Option<Instrument> {
        self.by_id.insert(
            id,
            Instrument {
                id,
                symbol: symbol.into(),
                class,
            },
        )
    }

    pub fn get(&self, id: u64) -> Option<&Instrument> {
        self.by_id.get(&id)
    }

    pub fn symbol(&self, id: u64) -> Option<&str> {
        self.by_id.get(&id).map(|i| i.symbol.as_str())
    }

    pub fn class_of(&self, id: u64) -> Option<InstrumentClass> {
        self.by_id.get(&id).map(|i| i.class)
    }

    /// Reverse lookup by display symbol.
    pub fn by_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.by_id.values().find(|i| i.symbol == symbol)
    }

    /// All instruments of one class, ordered by symbol.
    pub fn of_class(&self, class: InstrumentClass) -> Vec<&Instrument> {
        let mut out: Vec<&Instrument> = self.by_id.values().filter(|i| i.class == class).collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    pub fn is_index(&self, symbol: &str) -> bool {
        self.by_symbol(symbol)
            .is_some_and(|i| i.class == InstrumentClass::Index)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<Instrument> for InstrumentRegistry {
    fn from_iter<I: IntoIterator<Item = Instrument>>(iter: I) -> Self {
        Self {
            by_id: iter.into_iter().map(|i| (i.id, i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_partitions_by_class() {
        let reg = InstrumentRegistry::builtin();

        assert_eq!(reg.symbol(408065), Some("INFY"));
        assert_eq!(reg.class_of(256265), Some(InstrumentClass::Index));
        assert!(reg.of_class(InstrumentClass::Option).is_empty());

        let indices: Vec<&str> = reg
            .of_class(InstrumentClass::Index)
            .iter()
            .map(|i| i.symbol.as_str())
            .collect();
        assert_eq!(indices, vec!["NIFTY 50", "NIFTY BANK"]);
    }

    #[test]
    fn register_replaces_and_returns_previous() {
        let mut reg = InstrumentRegistry::new();

        assert!(reg.register(1, "NIFTY25000CE", InstrumentClass::Option).is_none());
        let old = reg.register(1, "NIFTY25100CE", InstrumentClass::Option);

        assert_eq!(old.map(|i| i.symbol), Some("NIFTY25000CE".to_string()));
        assert_eq!(reg.symbol(1), Some("NIFTY25100CE"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_ids_resolve_to_none() {
        let reg = InstrumentRegistry::builtin();

        assert!(reg.get(42).is_none());
        assert!(reg.by_symbol("NOPE").is_none());
        assert!(!reg.is_index("INFY"));
        assert!(reg.is_index("NIFTY 50"));
    }
}
