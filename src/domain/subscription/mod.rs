//! Subscription Ledger
//!
//! Domain bookkeeping for the set of active subscriptions.
//!
//! # Design
//!
//! The ledger tracks two things that must stay in lockstep:
//! - the active set: which subscription keys are currently live
//! - the process-id map: the registry id obtained for each key at
//!   subscription time
//!
//! A key enters the ledger only with its process id, so "every active key
//! has a registry id" holds by construction. Membership is added only after
//! the gateway confirms a subscription and removed only at teardown.
//!
//! The ledger itself is not synchronized; the collector guards it together
//! with its session map under a single lock.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::domain::ticker::SubscriptionKey;

// =============================================================================
// Process Id
// =============================================================================

/// Opaque registry id returned by the process registry at registration time.
///
/// The collector never interprets the contents; it only stores the id per
/// subscription and hands it back on status updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Wrap a raw registry id.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active-subscription bookkeeping for one collector.
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    active: HashSet<SubscriptionKey>,
    process_ids: HashMap<SubscriptionKey, ProcessId>,
}

impl SubscriptionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed subscription and its registry id.
    ///
    /// Re-inserting an existing key replaces its process id; the caller
    /// checks membership before subscribing, so this only happens when a
    /// subscription is deliberately re-established.
    pub fn insert(&mut self, key: SubscriptionKey, process_id: ProcessId) {
        self.active.insert(key.clone());
        self.process_ids.insert(key, process_id);
    }

    /// Membership test against the canonical key.
    #[must_use]
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.active.contains(key)
    }

    /// The registry id recorded for a key, if the key is active.
    #[must_use]
    pub fn process_id(&self, key: &SubscriptionKey) -> Option<ProcessId> {
        self.process_ids.get(key).cloned()
    }

    /// Remove one key and its process id.
    pub fn remove(&mut self, key: &SubscriptionKey) -> Option<ProcessId> {
        self.active.remove(key);
        self.process_ids.remove(key)
    }

    /// Drop all entries (collector teardown).
    pub fn clear(&mut self) {
        self.active.clear();
        self.process_ids.clear();
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no subscription is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Sorted distinct exchange names across the active set.
    #[must_use]
    pub fn exchanges(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .active
            .iter()
            .filter_map(|k| k.as_str().split_once(':').map(|(ex, _)| ex))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// All registry ids currently held (teardown bookkeeping).
    #[must_use]
    pub fn all_process_ids(&self) -> Vec<ProcessId> {
        self.process_ids.values().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(exchange: &str, symbol: &str) -> SubscriptionKey {
        SubscriptionKey::new(exchange, symbol)
    }

    fn pid(raw: &str) -> ProcessId {
        ProcessId::new(raw)
    }

    #[test]
    fn insert_makes_key_active_with_process_id() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(key("kraken", "BTC/USD"), pid("proc-1"));

        assert!(ledger.contains(&key("kraken", "BTC/USD")));
        assert_eq!(
            ledger.process_id(&key("kraken", "BTC/USD")),
            Some(pid("proc-1"))
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn every_active_key_has_a_process_id() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(key("kraken", "BTC/USD"), pid("proc-1"));
        ledger.insert(key("kraken", "ETH/USD"), pid("proc-2"));
        ledger.insert(key("bitmex", "XBT/USD"), pid("proc-3"));

        for k in [
            key("kraken", "BTC/USD"),
            key("kraken", "ETH/USD"),
            key("bitmex", "XBT/USD"),
        ] {
            assert!(ledger.contains(&k));
            assert!(ledger.process_id(&k).is_some());
        }
    }

    #[test]
    fn remove_only_touches_the_named_key() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(key("kraken", "BTC/USD"), pid("proc-1"));
        ledger.insert(key("kraken", "ETH/USD"), pid("proc-2"));

        let removed = ledger.remove(&key("kraken", "BTC/USD"));
        assert_eq!(removed, Some(pid("proc-1")));

        assert!(!ledger.contains(&key("kraken", "BTC/USD")));
        assert!(ledger.contains(&key("kraken", "ETH/USD")));
        assert_eq!(
            ledger.process_id(&key("kraken", "ETH/USD")),
            Some(pid("proc-2"))
        );
    }

    #[test]
    fn clear_empties_both_maps() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(key("kraken", "BTC/USD"), pid("proc-1"));
        ledger.insert(key("bitmex", "XBT/USD"), pid("proc-2"));

        ledger.clear();

        assert!(ledger.is_empty());
        assert!(ledger.process_id(&key("kraken", "BTC/USD")).is_none());
        assert!(ledger.all_process_ids().is_empty());
    }

    #[test]
    fn exchanges_are_distinct_and_sorted() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(key("kraken", "BTC/USD"), pid("proc-1"));
        ledger.insert(key("kraken", "ETH/USD"), pid("proc-2"));
        ledger.insert(key("bitmex", "XBT/USD"), pid("proc-3"));

        assert_eq!(ledger.exchanges(), vec!["bitmex", "kraken"]);
    }

    #[test]
    fn unknown_key_reads_as_absent() {
        let ledger = SubscriptionLedger::new();
        assert!(!ledger.contains(&key("kraken", "BTC/USD")));
        assert!(ledger.process_id(&key("kraken", "BTC/USD")).is_none());
    }
}
