//! Port Interfaces
//!
//! Interfaces (ports) for the external systems the collector depends on,
//! following the Hexagonal Architecture pattern. Infrastructure adapters
//! implement these contracts; the orchestration services consume them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`ExchangeGateway`] / [`TickerHandle`]: WebSocket sessions and ticker
//!   subscriptions, one logical session per exchange
//! - [`TickerStore`]: latest-value tick storage keyed by exchange + symbol
//! - [`ProcessRegistry`]: liveness directory receiving starting/running/error
//!   updates
//! - [`SymbolCatalog`]: the configured set of target subscriptions
//! - [`CredentialResolver`]: API key material by exchange id

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::domain::ticker::{SymbolRef, TickRecord};

// =============================================================================
// Credentials
// =============================================================================

/// API credential pair for one exchange account.
///
/// Empty key and secret are valid - public ticker streams do not require
/// authentication.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create credentials from a key/secret pair.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Empty credentials for public streams.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Whether both key and secret are empty.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.api_key.is_empty() && self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Exchange Gateway
// =============================================================================

/// Identity of an exchange handed to the gateway when opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDescriptor {
    /// Stable canonical exchange name.
    pub name: String,
    /// Stable exchange id.
    pub exchange_id: u32,
}

impl ExchangeDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: &str, exchange_id: u32) -> Self {
        Self {
            name: name.to_string(),
            exchange_id,
        }
    }
}

/// Callback invoked by the gateway for every decoded tick.
///
/// Runs on a gateway-chosen task; must be short-running and must not panic.
pub type TickerCallback = Arc<dyn Fn(TickRecord) -> BoxFuture<'static, ()> + Send + Sync>;

/// Credential provider invoked by the gateway when a session authenticates.
pub type CredentialProvider = Arc<dyn Fn() -> Credentials + Send + Sync>;

/// One logical WebSocket session to one exchange.
///
/// The gateway owns connection establishment, authentication, and
/// auto-reconnection; subscriptions survive reconnects without caller
/// involvement.
#[async_trait]
pub trait TickerHandle: Send + Sync {
    /// Subscribe one symbol, routing every tick through `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the exchange rejects the subscription.
    async fn subscribe_ticker(
        &self,
        symbol: &str,
        callback: TickerCallback,
    ) -> Result<(), GatewayError>;
}

/// Factory for exchange sessions. Initialize-once, shutdown-once lifecycle.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Acquire the session handle for an exchange, connecting if needed.
    ///
    /// The credential provider is invoked by the gateway itself; returning
    /// empty credentials selects the public stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the session cannot be established.
    async fn websocket_handler(
        &self,
        exchange: &ExchangeDescriptor,
        credentials: CredentialProvider,
    ) -> Result<Arc<dyn TickerHandle>, GatewayError>;

    /// Close all sessions and cancel outstanding subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if teardown fails; callers log and continue.
    async fn shutdown(&self) -> Result<(), GatewayError>;
}

/// Exchange gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Session to the exchange could not be established.
    #[error("connection to {exchange} failed: {reason}")]
    ConnectionFailed {
        /// Exchange name.
        exchange: String,
        /// Failure detail.
        reason: String,
    },

    /// The exchange rejected a subscription.
    #[error("subscription rejected for {symbol}: {reason}")]
    SubscriptionRejected {
        /// Symbol the exchange rejected.
        symbol: String,
        /// Failure detail.
        reason: String,
    },

    /// The gateway has already been shut down.
    #[error("gateway is shut down")]
    ShutDown,
}

// =============================================================================
// Ticker Store
// =============================================================================

/// Latest-value tick store keyed by `(exchange, symbol)`.
///
/// The contract is last-writer-wins: concurrent writes for the same key
/// resolve to whichever completes last.
#[async_trait]
pub trait TickerStore: Send + Sync {
    /// Write the latest value for the tick's key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails; the next tick supersedes.
    async fn set_ticker(&self, tick: &TickRecord) -> Result<(), StoreError>;

    /// Read the latest value for a key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn get_ticker(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<Option<TickRecord>, StoreError>;
}

/// Ticker store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejected or lost the operation.
    #[error("ticker store unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Process Registry
// =============================================================================

pub use crate::domain::subscription::ProcessId;

/// Kind of registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    /// Ticker collection process.
    Tick,
}

/// Liveness status of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Registered, not yet delivering.
    Starting,
    /// Actively delivering.
    Running,
    /// Failed; awaiting operator attention or reaping.
    Error,
}

/// Liveness directory for collection processes.
///
/// Updates are advisory: failures are logged by callers and never block the
/// tick path.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    /// Register a process entry; returns the registry's id for it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if registration fails.
    async fn register_process(
        &self,
        process_type: ProcessType,
        component: &str,
        params: HashMap<String, String>,
        message: &str,
        status: ProcessStatus,
    ) -> Result<ProcessId, RegistryError>;

    /// Update the status and message of an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the entry is unknown or the write fails.
    async fn update_process(
        &self,
        process_id: &ProcessId,
        status: ProcessStatus,
        message: &str,
    ) -> Result<(), RegistryError>;

    /// Remove an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the entry is unknown or removal fails.
    async fn unregister_process(&self, process_id: &ProcessId) -> Result<(), RegistryError>;
}

/// Process registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No entry exists for the given id.
    #[error("unknown process id: {0}")]
    UnknownProcess(String),

    /// The registry rejected or lost the operation.
    #[error("process registry unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Symbol Catalog
// =============================================================================

/// Configured set of target subscriptions.
#[async_trait]
pub trait SymbolCatalog: Send + Sync {
    /// All configured symbol references.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the configuration store is unreachable.
    async fn list_all_symbols(&self) -> Result<Vec<SymbolRef>, CatalogError>;
}

/// Symbol catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The configuration store is unreachable or returned garbage.
    #[error("symbol catalog unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Credential Resolver
// =============================================================================

/// API key material lookup by exchange id.
///
/// Resolution failure is not an error for callers: sessions fall back to
/// anonymous credentials, which public ticker streams accept.
pub trait CredentialResolver: Send + Sync {
    /// Resolve the credential pair for an exchange id.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if no credentials are configured.
    fn resolve(&self, exchange_id: u32) -> Result<Credentials, CredentialError>;
}

/// Credential resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Nothing configured for the exchange id.
    #[error("no credentials configured for exchange id {0}")]
    NotConfigured(u32),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn anonymous_credentials_are_empty() {
        let creds = Credentials::anonymous();
        assert!(creds.is_anonymous());
        assert_eq!(creds.api_key(), "");
        assert_eq!(creds.api_secret(), "");
    }

    #[test]
    fn process_id_round_trip() {
        let id = ProcessId::new("proc-42");
        assert_eq!(id.as_str(), "proc-42");
        assert_eq!(id.to_string(), "proc-42");
    }

    #[test]
    fn process_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Starting).unwrap(),
            "\"starting\""
        );
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
