//! Daemon Configuration Settings
//!
//! Configuration types for the ticker collection daemon, loaded from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `TICKER_SYMBOLS`: seed subscription list, `exchange:id:symbol` entries
//!   separated by commas (e.g. `kraken:1:BTC/USD,bitmex:2:XBT/USD`)
//! - `TICKER_RATE_GATE_SECS`: registry-update window per symbol (default 30)
//! - `TICKER_SHUTDOWN_TIMEOUT_SECS`: bound on graceful stop (default none)
//! - `TICKER_HEALTH_PORT`: health endpoint port (default 8082)
//! - `TICKER_ADMIN_IDENTITY`: account namespace for credential lookup
//!   (default `admin`)
//! - `TICKER_WS_*`: reconnect tuning (see [`ReconnectSettings`])

use std::time::Duration;

use crate::domain::ticker::SymbolRef;

/// One `exchange:id:symbol` entry from the seed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSeed {
    /// Canonical exchange name.
    pub exchange_name: String,
    /// Stable exchange id.
    pub exchange_id: u32,
    /// Exchange-native symbol.
    pub symbol: String,
}

impl SymbolSeed {
    /// Parse one `exchange:id:symbol` entry.
    ///
    /// The symbol part may itself contain `:`; only the first two separators
    /// split fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSymbolEntry`] when the entry does not
    /// have three non-empty parts or the id is not a positive integer.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSymbolEntry(entry.to_string());

        let (exchange_name, rest) = entry.split_once(':').ok_or_else(invalid)?;
        let (id, symbol) = rest.split_once(':').ok_or_else(invalid)?;

        let exchange_name = exchange_name.trim();
        let symbol = symbol.trim();
        let exchange_id: u32 = id.trim().parse().map_err(|_| invalid())?;

        if exchange_name.is_empty() || symbol.is_empty() || exchange_id == 0 {
            return Err(invalid());
        }

        Ok(Self {
            exchange_name: exchange_name.to_string(),
            exchange_id,
            symbol: symbol.to_string(),
        })
    }

    /// Convert into the domain reference.
    #[must_use]
    pub fn to_symbol_ref(&self) -> SymbolRef {
        SymbolRef::new(&self.exchange_name, self.exchange_id, &self.symbol)
    }
}

/// Registry-update throttling settings.
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    /// Minimum interval between registry status updates per symbol.
    pub rate_gate_window: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            rate_gate_window: Duration::from_secs(30),
        }
    }
}

/// WebSocket reconnect tuning.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Maximum reconnection attempts before a session gives up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Seed subscription list for the static catalog.
    pub symbols: Vec<SymbolSeed>,
    /// Registry-update throttling.
    pub throttle: ThrottleSettings,
    /// Bound on graceful stop; `None` waits indefinitely.
    pub shutdown_timeout: Option<Duration>,
    /// Account namespace for credential lookup.
    pub admin_identity: String,
    /// Server ports.
    pub server: ServerSettings,
    /// WebSocket reconnect tuning.
    pub reconnect: ReconnectSettings,
}

impl DaemonConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TICKER_SYMBOLS` contains a malformed entry.
    pub fn from_env() -> Result<Self, ConfigError> {
        let symbols = std::env::var("TICKER_SYMBOLS")
            .ok()
            .map(|raw| parse_symbol_list(&raw))
            .transpose()?
            .unwrap_or_default();

        let throttle = ThrottleSettings {
            rate_gate_window: parse_env_duration_secs(
                "TICKER_RATE_GATE_SECS",
                ThrottleSettings::default().rate_gate_window,
            ),
        };

        let shutdown_timeout = std::env::var("TICKER_SHUTDOWN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let admin_identity =
            std::env::var("TICKER_ADMIN_IDENTITY").unwrap_or_else(|_| "admin".to_string());

        let server = ServerSettings {
            health_port: parse_env_u16("TICKER_HEALTH_PORT", ServerSettings::default().health_port),
        };

        let reconnect = ReconnectSettings {
            delay_initial: parse_env_duration_millis(
                "TICKER_WS_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().delay_initial,
            ),
            delay_max: parse_env_duration_secs(
                "TICKER_WS_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().delay_max,
            ),
            delay_multiplier: parse_env_f64(
                "TICKER_WS_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().delay_multiplier,
            ),
            max_attempts: parse_env_u32(
                "TICKER_WS_MAX_RECONNECT_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
        };

        Ok(Self {
            symbols,
            throttle,
            shutdown_timeout,
            admin_identity,
            server,
            reconnect,
        })
    }

    /// Seed symbols as domain references.
    #[must_use]
    pub fn symbol_refs(&self) -> Vec<SymbolRef> {
        self.symbols.iter().map(SymbolSeed::to_symbol_ref).collect()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A `TICKER_SYMBOLS` entry is not in `exchange:id:symbol` form.
    #[error("invalid symbol entry (expected exchange:id:symbol): {0}")]
    InvalidSymbolEntry(String),
}

fn parse_symbol_list(raw: &str) -> Result<Vec<SymbolSeed>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(SymbolSeed::parse)
        .collect()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
