//! Exchange Gateway Adapters
//!
//! WebSocket implementation of the exchange gateway port:
//!
//! - [`gateway`]: session handles multiplexing many ticker subscriptions
//!   over one connection per exchange, with transparent reconnection
//! - [`reconnect`]: exponential backoff with jitter for connection retries

pub mod gateway;
pub mod reconnect;

pub use gateway::{WsExchangeGateway, WsGatewayConfig};
pub use reconnect::ReconnectPolicy;
