//! Shared test doubles for the integration suites.
//!
//! `ScriptedGateway` stands in for the WebSocket gateway: it records handler
//! acquisitions and subscriptions, can be scripted to fail whole exchanges
//! or single symbols, and lets tests push ticks through the callbacks a
//! session captured. `CountingRegistry` wraps the in-memory registry to
//! count update calls.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use ticker_collector::{
    CredentialProvider, DaemonDeps, ExchangeDescriptor, ExchangeGateway, GatewayError,
    InMemoryProcessRegistry, InMemoryTickerStore, ProcessId, ProcessRegistry, ProcessStatus,
    ProcessType, RegistryError, StaticSymbolCatalog, SymbolRef, TickRecord, TickerCallback,
    TickerDaemon, TickerHandle,
};

// =============================================================================
// Scripted Gateway
// =============================================================================

pub struct ScriptedHandle {
    fail_symbols: HashSet<String>,
    subscriptions: Mutex<Vec<(String, TickerCallback)>>,
}

#[async_trait]
impl TickerHandle for ScriptedHandle {
    async fn subscribe_ticker(
        &self,
        symbol: &str,
        callback: TickerCallback,
    ) -> Result<(), GatewayError> {
        if self.fail_symbols.contains(symbol) {
            return Err(GatewayError::SubscriptionRejected {
                symbol: symbol.to_string(),
                reason: "unknown instrument".to_string(),
            });
        }
        self.subscriptions
            .lock()
            .push((symbol.to_string(), callback));
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    pub fail_exchanges: HashSet<String>,
    pub fail_symbols: HashSet<String>,
    handles: Mutex<HashMap<String, Arc<ScriptedHandle>>>,
    handler_calls: AtomicU64,
    shutdowns: AtomicU64,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_calls(&self) -> u64 {
        self.handler_calls.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> u64 {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self, exchange: &str) -> usize {
        self.handles
            .lock()
            .get(exchange)
            .map_or(0, |h| h.subscriptions.lock().len())
    }

    pub fn total_subscribe_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .map(|h| h.subscriptions.lock().len())
            .sum()
    }

    /// The callback a session captured for one symbol.
    pub fn callback_for(&self, exchange: &str, symbol: &str) -> TickerCallback {
        let handles = self.handles.lock();
        let handle = handles.get(exchange).expect("no session for exchange");
        let subs = handle.subscriptions.lock();
        let (_, callback) = subs
            .iter()
            .find(|(s, _)| s == symbol)
            .expect("symbol not subscribed");
        Arc::clone(callback)
    }

    /// Push a tick through the captured callback, as the gateway would.
    pub async fn deliver(&self, exchange: &str, tick: TickRecord) {
        let callback = self.callback_for(exchange, &tick.symbol);
        callback(tick).await;
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn websocket_handler(
        &self,
        exchange: &ExchangeDescriptor,
        _credentials: CredentialProvider,
    ) -> Result<Arc<dyn TickerHandle>, GatewayError> {
        self.handler_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchanges.contains(&exchange.name) {
            return Err(GatewayError::ConnectionFailed {
                exchange: exchange.name.clone(),
                reason: "connection refused".to_string(),
            });
        }
        let handle = Arc::new(ScriptedHandle {
            fail_symbols: self.fail_symbols.clone(),
            subscriptions: Mutex::new(Vec::new()),
        });
        self.handles
            .lock()
            .insert(exchange.name.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Counting Registry
// =============================================================================

/// Forwards to the in-memory registry while counting calls.
pub struct CountingRegistry {
    pub inner: Arc<InMemoryProcessRegistry>,
    registrations: AtomicU64,
    updates: AtomicU64,
}

impl CountingRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryProcessRegistry::new()),
            registrations: AtomicU64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Default for CountingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRegistry for CountingRegistry {
    async fn register_process(
        &self,
        process_type: ProcessType,
        component: &str,
        params: HashMap<String, String>,
        message: &str,
        status: ProcessStatus,
    ) -> Result<ProcessId, RegistryError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.inner
            .register_process(process_type, component, params, message, status)
            .await
    }

    async fn update_process(
        &self,
        process_id: &ProcessId,
        status: ProcessStatus,
        message: &str,
    ) -> Result<(), RegistryError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_process(process_id, status, message).await
    }

    async fn unregister_process(&self, process_id: &ProcessId) -> Result<(), RegistryError> {
        self.inner.unregister_process(process_id).await
    }
}

// =============================================================================
// Fixture
// =============================================================================

/// Credential resolver that never has anything configured.
pub struct NoCredentials;

impl ticker_collector::CredentialResolver for NoCredentials {
    fn resolve(
        &self,
        exchange_id: u32,
    ) -> Result<ticker_collector::Credentials, ticker_collector::CredentialError> {
        Err(ticker_collector::CredentialError::NotConfigured(exchange_id))
    }
}

pub struct Fixture {
    pub gateway: Arc<ScriptedGateway>,
    pub store: Arc<InMemoryTickerStore>,
    pub registry: Arc<CountingRegistry>,
    pub daemon: TickerDaemon,
}

/// Daemon fixture over the scripted gateway and in-memory adapters.
pub fn fixture_with(gateway: ScriptedGateway, catalog: Vec<SymbolRef>) -> Fixture {
    let gateway = Arc::new(gateway);
    let store = Arc::new(InMemoryTickerStore::new());
    let registry = Arc::new(CountingRegistry::new());

    let daemon = TickerDaemon::new(
        DaemonDeps {
            gateway: Arc::clone(&gateway) as Arc<dyn ExchangeGateway>,
            ticker_store: Arc::clone(&store) as Arc<dyn ticker_collector::TickerStore>,
            registry: Arc::clone(&registry) as Arc<dyn ProcessRegistry>,
            credentials: Arc::new(NoCredentials),
            catalog: Arc::new(StaticSymbolCatalog::new(catalog)),
        },
        std::time::Duration::from_secs(30),
    );

    Fixture {
        gateway,
        store,
        registry,
        daemon,
    }
}

pub fn fixture(catalog: Vec<SymbolRef>) -> Fixture {
    fixture_with(ScriptedGateway::new(), catalog)
}

/// A tick with the given price and the current time.
pub fn tick(exchange: &str, symbol: &str, price: Decimal) -> TickRecord {
    TickRecord::new(exchange, symbol, price, Utc::now())
}
