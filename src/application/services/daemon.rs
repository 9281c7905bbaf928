//! Ticker Daemon
//!
//! Top-level lifecycle object: owns the live collector, tracks the daemon
//! status tag, registers the daemon-level liveness entry, and dispatches
//! single-symbol admissions through the three-valued state check.
//!
//! # State machine
//!
//! | status    | collector | meaning                          |
//! |-----------|-----------|----------------------------------|
//! | `stopped` | absent    | idle                             |
//! | `running` | present   | collecting                       |
//! | `error`   | absent    | startup failed; recoverable      |
//! | anything else         | inconsistent - programmer error  |
//!
//! The inconsistent pairings are never produced by this type; operations
//! that observe one log an error and refuse to act. Checking the status tag
//! alone or collector presence alone is not enough - the dispatch always
//! consults both.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::application::ports::{
    CatalogError, CredentialResolver, ExchangeGateway, ProcessId, ProcessRegistry, ProcessStatus,
    ProcessType, RegistryError, SymbolCatalog, TickerStore,
};
use crate::application::services::collector::{CollectorDeps, LiveCollector};
use crate::domain::ticker::SymbolRef;

/// Registry component label for the daemon-level entry.
const DAEMON_COMPONENT: &str = "ticker_daemon";

// =============================================================================
// Status
// =============================================================================

/// Daemon lifecycle status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    /// No collector; idle.
    Stopped,
    /// Collector present and collecting.
    Running,
    /// Startup failed; no collector. Recoverable via stop/start or admission.
    #[serde(rename = "error")]
    Errored,
}

impl DaemonStatus {
    /// The wire/string form of the tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Errored => "error",
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by daemon lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A required field of the admitted symbol reference is missing.
    #[error("invalid symbol reference: missing {0}")]
    InvalidSymbol(&'static str),

    /// The symbol catalog failed during startup.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The process registry failed during startup.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// =============================================================================
// Collaborators
// =============================================================================

/// External collaborators injected into the daemon.
#[derive(Clone)]
pub struct DaemonDeps {
    /// Exchange session factory.
    pub gateway: Arc<dyn ExchangeGateway>,
    /// Latest-value tick store.
    pub ticker_store: Arc<dyn TickerStore>,
    /// Liveness directory.
    pub registry: Arc<dyn ProcessRegistry>,
    /// Credential lookup by exchange id.
    pub credentials: Arc<dyn CredentialResolver>,
    /// Configured subscription targets.
    pub catalog: Arc<dyn SymbolCatalog>,
}

impl DaemonDeps {
    fn collector_deps(&self) -> CollectorDeps {
        CollectorDeps {
            gateway: Arc::clone(&self.gateway),
            ticker_store: Arc::clone(&self.ticker_store),
            registry: Arc::clone(&self.registry),
            credentials: Arc::clone(&self.credentials),
        }
    }
}

// =============================================================================
// Health Snapshot
// =============================================================================

/// Point-in-time daemon health, safe to serialize for the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Lifecycle status tag.
    pub status: DaemonStatus,
    /// Whether the daemon is currently running.
    pub running: bool,
    /// Registry id of the daemon-level entry, when one was registered.
    pub daemon_process_id: Option<ProcessId>,
    /// Whether a collector is present.
    pub collector_present: bool,
    /// Exchanges with at least one active subscription.
    pub exchanges: Vec<String>,
    /// Total active subscriptions.
    pub active_subscriptions: usize,
    /// Ticks received per exchange since the collector started.
    pub ticks_received: HashMap<String, u64>,
}

// =============================================================================
// Daemon
// =============================================================================

struct DaemonInner {
    status: DaemonStatus,
    collector: Option<Arc<LiveCollector>>,
    process_id: Option<ProcessId>,
}

/// Live ticker collection daemon.
///
/// Lifecycle operations (`start`, `stop`, `process_ticker`) serialize on an
/// async lock, so overlapping calls observe consistent state.
pub struct TickerDaemon {
    deps: DaemonDeps,
    gate_window: Duration,
    inner: Mutex<DaemonInner>,
}

impl TickerDaemon {
    /// Create a stopped daemon around the injected collaborators.
    #[must_use]
    pub fn new(deps: DaemonDeps, gate_window: Duration) -> Self {
        Self {
            deps,
            gate_window,
            inner: Mutex::new(DaemonInner {
                status: DaemonStatus::Stopped,
                collector: None,
                process_id: None,
            }),
        }
    }

    /// Start collection for every symbol the catalog lists.
    ///
    /// Idempotent when already running. Partial subscription failures are
    /// isolated inside the collector and do not fail the start; a catalog or
    /// registry failure before bulk subscription transitions the daemon to
    /// `error` and propagates.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] if the symbol catalog or the daemon-level
    /// registry registration fails.
    pub async fn start(&self) -> Result<(), DaemonError> {
        let mut inner = self.inner.lock().await;

        if inner.status == DaemonStatus::Running {
            if inner.collector.is_none() {
                tracing::error!(
                    status = inner.status.as_str(),
                    collector_present = false,
                    "Inconsistent daemon state; start refused"
                );
            } else {
                tracing::debug!("Daemon already running");
            }
            return Ok(());
        }

        let symbols = match self.deps.catalog.list_all_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                inner.status = DaemonStatus::Errored;
                inner.collector = None;
                tracing::error!(error = %e, "Symbol catalog unavailable; daemon errored");
                return Err(e.into());
            }
        };

        let process_id = match self.register_daemon_entry().await {
            Ok(id) => id,
            Err(e) => {
                inner.status = DaemonStatus::Errored;
                inner.collector = None;
                tracing::error!(error = %e, "Daemon registration failed; daemon errored");
                return Err(e.into());
            }
        };

        let collector = Arc::new(LiveCollector::new(
            self.deps.collector_deps(),
            self.gate_window,
        ));
        inner.collector = Some(Arc::clone(&collector));
        inner.process_id = Some(process_id.clone());
        inner.status = DaemonStatus::Running;

        collector.start_all(&symbols).await;

        if let Err(e) = self
            .deps
            .registry
            .update_process(&process_id, ProcessStatus::Running, "Ticker daemon running")
            .await
        {
            tracing::warn!(error = %e, "Daemon status update failed");
        }

        tracing::info!(symbol_count = symbols.len(), "Ticker daemon started");
        Ok(())
    }

    /// Stop collection and settle into `stopped`.
    ///
    /// Idempotent; teardown errors are logged, never raised.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;

        if inner.status == DaemonStatus::Stopped && inner.collector.is_none() {
            return;
        }

        if let Some(collector) = inner.collector.take() {
            collector.stop_all().await;
        }

        if let Some(process_id) = inner.process_id.take() {
            if let Err(e) = self.deps.registry.unregister_process(&process_id).await {
                tracing::warn!(error = %e, "Daemon deregistration failed");
            }
        }

        inner.status = DaemonStatus::Stopped;
        tracing::info!("Ticker daemon stopped");
    }

    /// Admit one symbol into collection.
    ///
    /// Validates the reference, then dispatches on the
    /// (collector presence, status tag) pair:
    ///
    /// - collector present and `running`: no-op when already collecting,
    ///   otherwise subscribe on the running collector
    /// - collector absent and not `running`: cold-start a collector around
    ///   this single symbol
    /// - anything else: inconsistent - logged and refused, no state change
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::InvalidSymbol`] when a required field is
    /// missing. Inconsistent state is not an error to the caller; it is
    /// recoverable by calling [`stop`](Self::stop) and retrying.
    pub async fn process_ticker(&self, symbol: &SymbolRef) -> Result<(), DaemonError> {
        symbol.validate().map_err(DaemonError::InvalidSymbol)?;

        let mut inner = self.inner.lock().await;
        match (inner.collector.clone(), inner.status) {
            (Some(collector), DaemonStatus::Running) => {
                if collector.is_collecting(symbol) {
                    tracing::debug!(
                        exchange = %symbol.exchange_name,
                        symbol = %symbol.symbol,
                        "Already collecting; admission is a no-op"
                    );
                    return Ok(());
                }
                let symbol = self.canonical_ref(symbol).await;
                collector.start_one(&symbol).await;
                Ok(())
            }
            (None, DaemonStatus::Stopped | DaemonStatus::Errored) => {
                let collector = Arc::new(LiveCollector::new(
                    self.deps.collector_deps(),
                    self.gate_window,
                ));
                inner.collector = Some(Arc::clone(&collector));
                inner.status = DaemonStatus::Running;
                tracing::info!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    "Cold-starting collector for single symbol"
                );

                let symbol = self.canonical_ref(symbol).await;
                collector.start_one(&symbol).await;
                Ok(())
            }
            (collector, status) => {
                tracing::error!(
                    status = status.as_str(),
                    collector_present = collector.is_some(),
                    "Inconsistent daemon state; admission refused"
                );
                Ok(())
            }
        }
    }

    /// Whether the daemon is currently running.
    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.status == DaemonStatus::Running
    }

    /// The current status tag.
    pub async fn status(&self) -> DaemonStatus {
        self.inner.lock().await.status
    }

    /// Copy-out health snapshot; holds no lock across collaborator calls.
    pub async fn get_health(&self) -> DaemonHealth {
        let inner = self.inner.lock().await;
        let collector_health = inner.collector.as_ref().map(|c| c.health());
        DaemonHealth {
            status: inner.status,
            running: inner.status == DaemonStatus::Running,
            daemon_process_id: inner.process_id.clone(),
            collector_present: inner.collector.is_some(),
            exchanges: collector_health
                .as_ref()
                .map(|h| h.exchanges.clone())
                .unwrap_or_default(),
            active_subscriptions: collector_health
                .as_ref()
                .map_or(0, |h| h.active_subscriptions),
            ticks_received: collector_health.map(|h| h.ticks_received).unwrap_or_default(),
        }
    }

    /// Register the daemon-level liveness entry.
    async fn register_daemon_entry(&self) -> Result<ProcessId, RegistryError> {
        let params = HashMap::from([("type".to_string(), "ticker_daemon".to_string())]);
        self.deps
            .registry
            .register_process(
                ProcessType::Tick,
                DAEMON_COMPONENT,
                params,
                "Ticker daemon starting",
                ProcessStatus::Starting,
            )
            .await
    }

    /// Resolve the catalog's canonical reference for an admitted symbol.
    ///
    /// Falls back to the caller's reference when the catalog has no entry or
    /// is unreachable - the reference already carries everything a
    /// subscription needs.
    async fn canonical_ref(&self, symbol: &SymbolRef) -> SymbolRef {
        match self.deps.catalog.list_all_symbols().await {
            Ok(all) => all
                .into_iter()
                .find(|s| s.exchange_name == symbol.exchange_name && s.symbol == symbol.symbol)
                .unwrap_or_else(|| symbol.clone()),
            Err(e) => {
                tracing::warn!(
                    exchange = %symbol.exchange_name,
                    symbol = %symbol.symbol,
                    error = %e,
                    "Catalog lookup failed; using caller's reference"
                );
                symbol.clone()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
