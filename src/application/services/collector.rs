//! Live Ticker Collector
//!
//! Aggregate over all exchange sessions. Maintains the session map, the
//! subscription ledger, and the rate gate; exposes bulk start, single-symbol
//! start, membership check, and teardown.
//!
//! # Isolation
//!
//! A failure to start, subscribe, or receive ticks for one symbol never
//! prevents other symbols from starting or continuing, and a failure to
//! bring up a whole exchange never prevents other exchanges from starting.
//! Per-symbol and per-exchange failures are logged at `warn` and skipped.
//!
//! # Locking
//!
//! One mutex guards the session map and the subscription ledger. Lifecycle
//! operations mutate them; tick callbacks only perform O(1) reads under the
//! lock and never hold it across a suspension point. The running flag is an
//! atomic so callbacks can observe shutdown without locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{
    CredentialResolver, Credentials, ExchangeDescriptor, ExchangeGateway, ProcessRegistry,
    ProcessStatus, ProcessType, TickerCallback, TickerHandle, TickerStore,
};
use crate::domain::subscription::SubscriptionLedger;
use crate::domain::throttle::RateGate;
use crate::domain::ticker::{SymbolRef, TickRecord};

// =============================================================================
// Collaborators
// =============================================================================

/// External collaborators injected into the collector.
#[derive(Clone)]
pub struct CollectorDeps {
    /// Exchange session factory.
    pub gateway: Arc<dyn ExchangeGateway>,
    /// Latest-value tick store.
    pub ticker_store: Arc<dyn TickerStore>,
    /// Liveness directory.
    pub registry: Arc<dyn ProcessRegistry>,
    /// Credential lookup by exchange id.
    pub credentials: Arc<dyn CredentialResolver>,
}

// =============================================================================
// Exchange Session
// =============================================================================

/// One logical WebSocket session to one exchange.
///
/// Owns the gateway handle, the shared callback serving every symbol on
/// this exchange, and the received-tick counter. Internal to the collector.
#[derive(Clone)]
struct ExchangeSession {
    handle: Arc<dyn TickerHandle>,
    callback: TickerCallback,
    ticks_received: Arc<AtomicU64>,
}

// =============================================================================
// Collector State
// =============================================================================

/// Session map plus subscription ledger, guarded by one lock.
#[derive(Default)]
struct CollectorState {
    sessions: HashMap<String, ExchangeSession>,
    ledger: SubscriptionLedger,
}

struct CollectorCore {
    deps: CollectorDeps,
    state: Mutex<CollectorState>,
    gate: RateGate,
    running: AtomicBool,
}

/// Point-in-time view of the collector, copied out without long-held locks.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorHealth {
    /// Distinct exchange names with at least one active subscription.
    pub exchanges: Vec<String>,
    /// Total active subscriptions.
    pub active_subscriptions: usize,
    /// Ticks received per exchange since session creation.
    pub ticks_received: HashMap<String, u64>,
}

// =============================================================================
// Live Collector
// =============================================================================

/// Aggregate over all exchange sessions for one daemon.
pub struct LiveCollector {
    core: Arc<CollectorCore>,
}

impl LiveCollector {
    /// Create a collector around the injected collaborators.
    ///
    /// `gate_window` is the minimum interval between registry status
    /// updates per subscription key.
    #[must_use]
    pub fn new(deps: CollectorDeps, gate_window: Duration) -> Self {
        Self {
            core: Arc::new(CollectorCore {
                deps,
                state: Mutex::new(CollectorState::default()),
                gate: RateGate::new(gate_window),
                running: AtomicBool::new(true),
            }),
        }
    }

    /// Subscribe every symbol in the list, grouped by exchange.
    ///
    /// Exchanges are brought up one at a time; a session that cannot be
    /// established marks its whole group as failed and the next exchange
    /// proceeds. Individual subscription failures are logged and skipped.
    pub async fn start_all(&self, symbols: &[SymbolRef]) {
        let mut by_exchange: BTreeMap<String, Vec<&SymbolRef>> = BTreeMap::new();
        for symbol in symbols {
            by_exchange
                .entry(symbol.exchange_name.clone())
                .or_default()
                .push(symbol);
        }

        tracing::info!(
            symbol_count = symbols.len(),
            exchange_count = by_exchange.len(),
            "Starting live ticker collection"
        );

        for (exchange, group) in by_exchange {
            let exchange_id = group.first().map_or(0, |s| s.exchange_id);
            let session = match self.ensure_session(&exchange, exchange_id).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        exchange = %exchange,
                        skipped_symbols = group.len(),
                        error = %e,
                        "Exchange session failed; skipping its symbols"
                    );
                    continue;
                }
            };

            for symbol in group {
                self.subscribe_symbol(&session, symbol).await;
            }
        }
    }

    /// Subscribe a single symbol, reusing or creating its exchange session.
    ///
    /// Idempotent: a symbol that is already collecting is left untouched.
    pub async fn start_one(&self, symbol: &SymbolRef) {
        if self.is_collecting(symbol) {
            tracing::debug!(
                exchange = %symbol.exchange_name,
                symbol = %symbol.symbol,
                "Symbol already collecting"
            );
            return;
        }

        let session = match self
            .ensure_session(&symbol.exchange_name, symbol.exchange_id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    error = %e,
                    "Exchange session failed; symbol not started"
                );
                return;
            }
        };

        self.subscribe_symbol(&session, symbol).await;
    }

    /// Whether the symbol's key is in the active set.
    #[must_use]
    pub fn is_collecting(&self, symbol: &SymbolRef) -> bool {
        self.core.state.lock().ledger.contains(&symbol.key())
    }

    /// Stop collection: flag shutdown, drop all bookkeeping, close sessions.
    ///
    /// Callbacks in flight observe the running flag and skip cleanly. Gateway
    /// teardown errors are logged, never raised. Per-symbol registry entries
    /// are left to the registry's own liveness policy.
    pub async fn stop_all(&self) {
        self.core.running.store(false, Ordering::SeqCst);

        {
            let mut state = self.core.state.lock();
            state.ledger.clear();
            state.sessions.clear();
        }
        self.core.gate.reset();

        if let Err(e) = self.core.deps.gateway.shutdown().await {
            tracing::warn!(error = %e, "Gateway shutdown reported an error");
        }

        tracing::info!("Live ticker collection stopped");
    }

    /// Copy-out health snapshot.
    #[must_use]
    pub fn health(&self) -> CollectorHealth {
        let state = self.core.state.lock();
        let ticks_received = state
            .sessions
            .iter()
            .map(|(name, s)| (name.clone(), s.ticks_received.load(Ordering::Relaxed)))
            .collect();
        CollectorHealth {
            exchanges: state.ledger.exchanges(),
            active_subscriptions: state.ledger.len(),
            ticks_received,
        }
    }

    /// Resolve or create the session for an exchange.
    ///
    /// At most one session exists per exchange for the collector's lifetime;
    /// later symbols on the same exchange reuse it.
    async fn ensure_session(
        &self,
        exchange: &str,
        exchange_id: u32,
    ) -> Result<ExchangeSession, crate::application::ports::GatewayError> {
        if let Some(existing) = self.core.state.lock().sessions.get(exchange) {
            return Ok(existing.clone());
        }

        let provider = credential_provider(&self.core.deps.credentials, exchange_id);
        let descriptor = ExchangeDescriptor::new(exchange, exchange_id);
        let handle = self
            .core
            .deps
            .gateway
            .websocket_handler(&descriptor, provider)
            .await?;

        let ticks_received = Arc::new(AtomicU64::new(0));
        let fanout = Arc::new(TickerFanout {
            exchange: exchange.to_string(),
            core: Arc::clone(&self.core),
            ticks_received: Arc::clone(&ticks_received),
        });
        let callback: TickerCallback = Arc::new(move |tick: TickRecord| {
            let fanout = Arc::clone(&fanout);
            Box::pin(async move { fanout.on_tick(tick).await })
        });

        let session = ExchangeSession {
            handle,
            callback,
            ticks_received,
        };

        let mut state = self.core.state.lock();
        let entry = state
            .sessions
            .entry(exchange.to_string())
            .or_insert_with(|| session.clone());
        tracing::debug!(exchange = %exchange, "Exchange session ready");
        Ok(entry.clone())
    }

    /// Per-symbol subscription body shared by `start_all` and `start_one`.
    ///
    /// Registers the liveness entry first, then subscribes; the key enters
    /// the active set only after the gateway confirms the subscription. A
    /// failed subscription leaves the registry entry in `starting`, to be
    /// reaped by the registry's liveness policy.
    async fn subscribe_symbol(&self, session: &ExchangeSession, symbol: &SymbolRef) {
        let key = symbol.key();

        let params = HashMap::from([
            ("exchange".to_string(), symbol.exchange_name.clone()),
            ("symbol".to_string(), symbol.symbol.clone()),
            ("type".to_string(), "live_ticker".to_string()),
        ]);
        let process_id = match self
            .core
            .deps
            .registry
            .register_process(
                ProcessType::Tick,
                key.as_str(),
                params,
                "Starting live ticker collection",
                ProcessStatus::Starting,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    error = %e,
                    "Process registration failed; symbol not started"
                );
                return;
            }
        };

        match session
            .handle
            .subscribe_ticker(&symbol.symbol, Arc::clone(&session.callback))
            .await
        {
            Ok(()) => {
                self.core.state.lock().ledger.insert(key, process_id);
                tracing::info!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    "Ticker subscription active"
                );
            }
            Err(e) => {
                tracing::warn!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    error = %e,
                    "Ticker subscription failed"
                );
            }
        }
    }
}

// =============================================================================
// Tick Callback Pipeline
// =============================================================================

/// Shared per-exchange tick callback.
///
/// One value serves every symbol subscribed on its exchange. Step one
/// (store write) runs for every tick; step two (registry update) only when
/// the rate gate admits the key.
struct TickerFanout {
    exchange: String,
    core: Arc<CollectorCore>,
    ticks_received: Arc<AtomicU64>,
}

impl TickerFanout {
    async fn on_tick(&self, mut tick: TickRecord) {
        if !self.core.running.load(Ordering::SeqCst) {
            tracing::debug!(
                exchange = %self.exchange,
                symbol = %tick.symbol,
                "Tick received after shutdown; skipping"
            );
            return;
        }

        self.ticks_received.fetch_add(1, Ordering::Relaxed);

        // The gateway labels ticks with its own exchange notion; the store
        // key must use the session's canonical name.
        if tick.exchange != self.exchange {
            tick.exchange.clone_from(&self.exchange);
        }

        if let Err(e) = self.core.deps.ticker_store.set_ticker(&tick).await {
            tracing::warn!(
                exchange = %self.exchange,
                symbol = %tick.symbol,
                error = %e,
                "Ticker store write failed; next tick supersedes"
            );
            return;
        }

        let key = tick.key();
        let Some(process_id) = self.core.state.lock().ledger.process_id(&key) else {
            return;
        };

        // The gate advances whether or not the update below succeeds, so a
        // failing registry cannot turn every tick into a registry write.
        if self.core.gate.admit(&key, Utc::now()) {
            let message = format!("Received ticker at {}", tick.time);
            if let Err(e) = self
                .core
                .deps
                .registry
                .update_process(&process_id, ProcessStatus::Running, &message)
                .await
            {
                tracing::warn!(
                    exchange = %self.exchange,
                    symbol = %tick.symbol,
                    error = %e,
                    "Process status update failed"
                );
            }
        }
    }
}

/// Build the credential provider handed to the gateway.
///
/// Resolution failure falls back to anonymous credentials; public ticker
/// streams accept them.
fn credential_provider(
    resolver: &Arc<dyn CredentialResolver>,
    exchange_id: u32,
) -> crate::application::ports::CredentialProvider {
    let resolver = Arc::clone(resolver);
    Arc::new(move || match resolver.resolve(exchange_id) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::debug!(exchange_id, error = %e, "Using anonymous credentials");
            Credentials::anonymous()
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
