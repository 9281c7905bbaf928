//! Configuration Module
//!
//! Configuration loading for the ticker collection daemon.

mod settings;

pub use settings::{
    ConfigError, DaemonConfig, ReconnectSettings, ServerSettings, SymbolSeed, ThrottleSettings,
};
