#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Ticker Collector - Live Exchange Ticker Daemon
//!
//! A long-running daemon that maintains real-time WebSocket subscriptions to
//! cryptocurrency exchanges, receives a continuous stream of price updates
//! for a dynamic set of trading symbols, and publishes the latest value of
//! each `(exchange, symbol)` pair into a shared latest-value store used by
//! downstream trading processes.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core collection logic and data types
//!   - `ticker`: Tick records, symbol references, subscription keys
//!   - `subscription`: Active-set and process-id bookkeeping
//!   - `throttle`: Per-key rate gate for registry updates
//!
//! - **Application**: Orchestration and port definitions
//!   - `ports`: Interfaces for the exchange gateway, ticker store, process
//!     registry, symbol catalog, and credential resolver
//!   - `services`: The live collector and the daemon state machine
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: WebSocket gateway with transparent reconnection
//!   - `memory`: In-process store/registry/catalog/credential adapters
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!   - `telemetry`: Logging initialization
//!
//! # Data Flow
//!
//! ```text
//! kraken WS ──┐
//!             │    ┌───────────────┐ every tick ┌──────────────┐
//!             ├───►│ LiveCollector │───────────►│ ticker store │
//! bitmex WS ──┤    │  (callbacks)  │            └──────────────┘
//!             │    └───────┬───────┘ throttled  ┌──────────────┐
//! ...      ───┘            └───────────────────►│   registry   │
//!                                               └──────────────┘
//! ```
//!
//! Every tick lands in the store; at most one registry status update per
//! symbol passes the rate gate per window.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core collection types with no external dependencies.
pub mod domain;

/// Application layer - Orchestration services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::subscription::SubscriptionLedger;
pub use domain::throttle::RateGate;
pub use domain::ticker::{SubscriptionKey, SymbolRef, TickRecord};

// Ports
pub use application::ports::{
    CatalogError, CredentialError, CredentialProvider, CredentialResolver, Credentials,
    ExchangeDescriptor, ExchangeGateway, GatewayError, ProcessId, ProcessRegistry, ProcessStatus,
    ProcessType, RegistryError, StoreError, SymbolCatalog, TickerCallback, TickerHandle,
    TickerStore,
};

// Services
pub use application::services::collector::{CollectorDeps, CollectorHealth, LiveCollector};
pub use application::services::daemon::{
    DaemonDeps, DaemonError, DaemonHealth, DaemonStatus, TickerDaemon,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, DaemonConfig, ReconnectSettings, ServerSettings, SymbolSeed, ThrottleSettings,
};

// In-process adapters (also used by integration tests)
pub use infrastructure::memory::{
    EnvCredentialResolver, InMemoryProcessRegistry, InMemoryTickerStore, ProcessEntry,
    StaticSymbolCatalog,
};

// WebSocket gateway
pub use infrastructure::exchange::{WsExchangeGateway, WsGatewayConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
