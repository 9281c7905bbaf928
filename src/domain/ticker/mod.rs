//! Ticker Domain Types
//!
//! Value types for live ticker collection:
//!
//! - [`TickRecord`]: one decoded price update delivered by the exchange gateway
//! - [`SymbolRef`]: descriptor of a target subscription
//! - [`SubscriptionKey`]: canonical `"exchange:symbol"` identity of a subscription
//!
//! `TickRecord`s are transient - they live for the duration of one callback
//! invocation and are never stored by the collector itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Subscription Key
// =============================================================================

/// Canonical identity of an active subscription: `"exchange:symbol"`.
///
/// Used as the key for the active set, the rate gate, and the process-id
/// ledger. The `(exchange, symbol)` pair uniquely identifies a subscription,
/// so two keys are equal iff they name the same subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Build a key from its exchange and symbol parts.
    #[must_use]
    pub fn new(exchange: &str, symbol: &str) -> Self {
        Self(format!("{exchange}:{symbol}"))
    }

    /// The key as a string slice (the registry's component label form).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tick Record
// =============================================================================

/// One decoded price update for a symbol on an exchange.
///
/// Emitted by the exchange gateway for every wire update. `time` is
/// non-decreasing per `(exchange, symbol)` on a single connection but may
/// step backwards across reconnects; consumers only ever read the latest
/// value, so that is acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Trading symbol in exchange-native form (e.g. `"BTC/USD"`).
    pub symbol: String,
    /// Stable canonical exchange name (e.g. `"kraken"`).
    pub exchange: String,
    /// Last traded price.
    pub price: Decimal,
    /// Best bid, when the exchange reports one.
    pub bid: Option<Decimal>,
    /// Best ask, when the exchange reports one.
    pub ask: Option<Decimal>,
    /// Rolling volume, when the exchange reports one.
    pub volume: Option<Decimal>,
    /// Exchange-reported tick time.
    pub time: DateTime<Utc>,
}

impl TickRecord {
    /// Create a tick with price only; bid/ask/volume absent.
    #[must_use]
    pub fn new(exchange: &str, symbol: &str, price: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            price,
            bid: None,
            ask: None,
            volume: None,
            time,
        }
    }

    /// The subscription key this tick belongs to.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.exchange, &self.symbol)
    }
}

// =============================================================================
// Symbol Reference
// =============================================================================

/// Descriptor of a target subscription.
///
/// Produced by the symbol catalog and held by the collector for the
/// lifetime of its sessions. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Trading symbol in exchange-native form.
    pub symbol: String,
    /// Stable canonical exchange name.
    pub exchange_name: String,
    /// Stable exchange id, used for credential lookup.
    pub exchange_id: u32,
}

impl SymbolRef {
    /// Create a new symbol reference.
    #[must_use]
    pub fn new(exchange_name: &str, exchange_id: u32, symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange_name: exchange_name.to_string(),
            exchange_id,
        }
    }

    /// The subscription key for this reference.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.exchange_name, &self.symbol)
    }

    /// Check that all required fields are present.
    ///
    /// # Errors
    ///
    /// Returns the name of the first missing field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.exchange_name.trim().is_empty() {
            return Err("exchange_name");
        }
        if self.symbol.trim().is_empty() {
            return Err("symbol");
        }
        if self.exchange_id == 0 {
            return Err("exchange_id");
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn subscription_key_canonical_form() {
        let key = SubscriptionKey::new("kraken", "BTC/USD");
        assert_eq!(key.as_str(), "kraken:BTC/USD");
        assert_eq!(key.to_string(), "kraken:BTC/USD");
    }

    #[test]
    fn subscription_key_identity() {
        let a = SubscriptionKey::new("kraken", "BTC/USD");
        let b = SymbolRef::new("kraken", 1, "BTC/USD").key();
        assert_eq!(a, b);

        let other = SubscriptionKey::new("bitmex", "BTC/USD");
        assert_ne!(a, other);
    }

    #[test]
    fn tick_key_matches_symbol_ref_key() {
        let tick = TickRecord::new("kraken", "ETH/USD", dec!(2500.5), Utc::now());
        let sref = SymbolRef::new("kraken", 1, "ETH/USD");
        assert_eq!(tick.key(), sref.key());
    }

    #[test]
    fn tick_new_leaves_optionals_empty() {
        let tick = TickRecord::new("kraken", "BTC/USD", dec!(50000), Utc::now());
        assert!(tick.bid.is_none());
        assert!(tick.ask.is_none());
        assert!(tick.volume.is_none());
    }

    #[test]
    fn symbol_ref_validation() {
        assert!(SymbolRef::new("kraken", 1, "BTC/USD").validate().is_ok());

        assert_eq!(
            SymbolRef::new("", 1, "BTC/USD").validate(),
            Err("exchange_name")
        );
        assert_eq!(SymbolRef::new("kraken", 1, " ").validate(), Err("symbol"));
        assert_eq!(
            SymbolRef::new("kraken", 0, "BTC/USD").validate(),
            Err("exchange_id")
        );
    }

    #[test]
    fn tick_record_serializes_round_trip() {
        let mut tick = TickRecord::new("kraken", "BTC/USD", dec!(50000.25), Utc::now());
        tick.bid = Some(dec!(50000.00));
        tick.ask = Some(dec!(50000.50));

        let json = serde_json::to_string(&tick).unwrap();
        let back: TickRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tick);
    }
}
