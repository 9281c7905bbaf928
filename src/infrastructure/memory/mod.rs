//! In-Process Port Implementations
//!
//! In-memory adapters for the ticker store, process registry, symbol
//! catalog, and credential resolver ports. The daemon is fully runnable
//! against these; production deployments substitute the ecosystem's shared
//! cache services behind the same traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{
    CatalogError, CredentialError, CredentialResolver, Credentials, ProcessId, ProcessRegistry,
    ProcessStatus, ProcessType, RegistryError, StoreError, SymbolCatalog, TickerStore,
};
use crate::domain::ticker::{SubscriptionKey, SymbolRef, TickRecord};

// =============================================================================
// Ticker Store
// =============================================================================

/// In-memory latest-value tick store keyed by `(exchange, symbol)`.
///
/// Last-writer-wins under concurrent writers; only the newest record per
/// key is retained.
#[derive(Debug, Default)]
pub struct InMemoryTickerStore {
    ticks: RwLock<HashMap<SubscriptionKey, TickRecord>>,
}

impl InMemoryTickerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    /// Whether no key holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.read().is_empty()
    }
}

#[async_trait]
impl TickerStore for InMemoryTickerStore {
    async fn set_ticker(&self, tick: &TickRecord) -> Result<(), StoreError> {
        self.ticks.write().insert(tick.key(), tick.clone());
        Ok(())
    }

    async fn get_ticker(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Option<TickRecord>, StoreError> {
        let key = SubscriptionKey::new(exchange, symbol);
        Ok(self.ticks.read().get(&key).cloned())
    }
}

// =============================================================================
// Process Registry
// =============================================================================

/// One registry entry.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    /// Kind of registered process.
    pub process_type: ProcessType,
    /// Component label (the subscription key form).
    pub component: String,
    /// Registration parameters.
    pub params: HashMap<String, String>,
    /// Last status message.
    pub message: String,
    /// Current liveness status.
    pub status: ProcessStatus,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// In-memory liveness directory.
#[derive(Debug, Default)]
pub struct InMemoryProcessRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<ProcessId, ProcessEntry>>,
}

impl InMemoryProcessRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn entry(&self, id: &ProcessId) -> Option<ProcessEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entry is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries currently in a given status.
    #[must_use]
    pub fn entries_with_status(&self, status: ProcessStatus) -> Vec<ProcessEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProcessRegistry for InMemoryProcessRegistry {
    async fn register_process(
        &self,
        process_type: ProcessType,
        component: &str,
        params: HashMap<String, String>,
        message: &str,
        status: ProcessStatus,
    ) -> Result<ProcessId, RegistryError> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ProcessId::new(&format!("proc-{seq}"));
        let now = Utc::now();
        let entry = ProcessEntry {
            process_type,
            component: component.to_string(),
            params,
            message: message.to_string(),
            status,
            registered_at: now,
            updated_at: now,
        };
        self.entries.write().insert(id.clone(), entry);
        Ok(id)
    }

    async fn update_process(
        &self,
        process_id: &ProcessId,
        status: ProcessStatus,
        message: &str,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(process_id)
            .ok_or_else(|| RegistryError::UnknownProcess(process_id.to_string()))?;
        entry.status = status;
        entry.message = message.to_string();
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn unregister_process(&self, process_id: &ProcessId) -> Result<(), RegistryError> {
        self.entries
            .write()
            .remove(process_id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownProcess(process_id.to_string()))
    }
}

// =============================================================================
// Symbol Catalog
// =============================================================================

/// Fixed symbol catalog seeded from configuration.
#[derive(Debug, Default)]
pub struct StaticSymbolCatalog {
    symbols: Vec<SymbolRef>,
}

impl StaticSymbolCatalog {
    /// Create a catalog over a fixed symbol list.
    #[must_use]
    pub fn new(symbols: Vec<SymbolRef>) -> Self {
        Self { symbols }
    }
}

#[async_trait]
impl SymbolCatalog for StaticSymbolCatalog {
    async fn list_all_symbols(&self) -> Result<Vec<SymbolRef>, CatalogError> {
        Ok(self.symbols.clone())
    }
}

// =============================================================================
// Credential Resolver
// =============================================================================

/// Environment-variable credential resolver.
///
/// Looks up `TICKER_<IDENTITY>_KEY_<id>` and `TICKER_<IDENTITY>_SECRET_<id>`
/// where `<IDENTITY>` is the configured admin identity uppercased. Missing
/// variables resolve to [`CredentialError::NotConfigured`], which sessions
/// treat as "use the public stream".
#[derive(Debug, Clone)]
pub struct EnvCredentialResolver {
    identity: String,
}

impl EnvCredentialResolver {
    /// Create a resolver for an account identity namespace.
    #[must_use]
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_uppercase().replace(['-', '.', '@'], "_"),
        }
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, exchange_id: u32) -> Result<Credentials, CredentialError> {
        let key_var = format!("TICKER_{}_KEY_{exchange_id}", self.identity);
        let secret_var = format!("TICKER_{}_SECRET_{exchange_id}", self.identity);

        match (std::env::var(&key_var), std::env::var(&secret_var)) {
            (Ok(key), Ok(secret)) if !key.is_empty() => Ok(Credentials::new(key, secret)),
            _ => Err(CredentialError::NotConfigured(exchange_id)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    fn tick(exchange: &str, symbol: &str, price: rust_decimal::Decimal) -> TickRecord {
        TickRecord::new(exchange, symbol, price, Utc::now())
    }

    #[tokio::test]
    async fn store_returns_what_was_set() {
        let store = InMemoryTickerStore::new();
        let t = tick("kraken", "BTC/USD", dec!(50000.25));

        store.set_ticker(&t).await.unwrap();

        let got = store.get_ticker("kraken", "BTC/USD").await.unwrap();
        assert_eq!(got, Some(t));
    }

    #[tokio::test]
    async fn store_keeps_only_the_latest_value() {
        let store = InMemoryTickerStore::new();
        store
            .set_ticker(&tick("kraken", "BTC/USD", dec!(50000)))
            .await
            .unwrap();
        store
            .set_ticker(&tick("kraken", "BTC/USD", dec!(50001)))
            .await
            .unwrap();

        let got = store.get_ticker("kraken", "BTC/USD").await.unwrap().unwrap();
        assert_eq!(got.price, dec!(50001));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn store_keys_are_per_exchange() {
        let store = InMemoryTickerStore::new();
        store
            .set_ticker(&tick("kraken", "BTC/USD", dec!(50000)))
            .await
            .unwrap();
        store
            .set_ticker(&tick("bitmex", "BTC/USD", dec!(50002)))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let kraken = store.get_ticker("kraken", "BTC/USD").await.unwrap().unwrap();
        assert_eq!(kraken.price, dec!(50000));
    }

    #[tokio::test]
    async fn store_miss_reads_none() {
        let store = InMemoryTickerStore::new();
        assert_eq!(store.get_ticker("kraken", "BTC/USD").await.unwrap(), None);
    }

    #[tokio::test]
    async fn registry_register_update_round_trip() {
        let registry = InMemoryProcessRegistry::new();

        let id = registry
            .register_process(
                ProcessType::Tick,
                "kraken:BTC/USD",
                HashMap::new(),
                "Starting live ticker collection",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();

        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.status, ProcessStatus::Starting);
        assert_eq!(entry.component, "kraken:BTC/USD");

        registry
            .update_process(&id, ProcessStatus::Running, "Received ticker")
            .await
            .unwrap();

        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.status, ProcessStatus::Running);
        assert_eq!(entry.message, "Received ticker");
        assert!(entry.updated_at >= entry.registered_at);
    }

    #[tokio::test]
    async fn registry_ids_are_unique() {
        let registry = InMemoryProcessRegistry::new();
        let a = registry
            .register_process(
                ProcessType::Tick,
                "a",
                HashMap::new(),
                "",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();
        let b = registry
            .register_process(
                ProcessType::Tick,
                "b",
                HashMap::new(),
                "",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_ids() {
        let registry = InMemoryProcessRegistry::new();
        let ghost = ProcessId::new("proc-999");

        let err = registry
            .update_process(&ghost, ProcessStatus::Running, "")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProcess(_)));

        let err = registry.unregister_process(&ghost).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProcess(_)));
    }

    #[tokio::test]
    async fn registry_unregister_removes_entry() {
        let registry = InMemoryProcessRegistry::new();
        let id = registry
            .register_process(
                ProcessType::Tick,
                "kraken:BTC/USD",
                HashMap::new(),
                "",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();

        registry.unregister_process(&id).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.entry(&id).is_none());
    }

    #[tokio::test]
    async fn registry_filters_by_status() {
        let registry = InMemoryProcessRegistry::new();
        let a = registry
            .register_process(
                ProcessType::Tick,
                "a",
                HashMap::new(),
                "",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();
        registry
            .register_process(
                ProcessType::Tick,
                "b",
                HashMap::new(),
                "",
                ProcessStatus::Starting,
            )
            .await
            .unwrap();
        registry
            .update_process(&a, ProcessStatus::Running, "")
            .await
            .unwrap();

        assert_eq!(
            registry.entries_with_status(ProcessStatus::Starting).len(),
            1
        );
        assert_eq!(
            registry.entries_with_status(ProcessStatus::Running).len(),
            1
        );
    }

    #[tokio::test]
    async fn static_catalog_lists_its_seed() {
        let catalog = StaticSymbolCatalog::new(vec![
            SymbolRef::new("kraken", 1, "BTC/USD"),
            SymbolRef::new("bitmex", 2, "XBT/USD"),
        ]);

        let symbols = catalog.list_all_symbols().await.unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].exchange_name, "kraken");
    }

    #[test]
    fn env_resolver_misses_read_as_not_configured() {
        let resolver = EnvCredentialResolver::new("admin");
        let err = resolver.resolve(9999).unwrap_err();
        assert!(matches!(err, CredentialError::NotConfigured(9999)));
    }

    #[test]
    fn env_resolver_normalizes_identity() {
        let resolver = EnvCredentialResolver::new("admin@example.com");
        assert_eq!(resolver.identity, "ADMIN_EXAMPLE_COM");
    }
}
