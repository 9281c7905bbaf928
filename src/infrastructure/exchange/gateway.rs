//! WebSocket Exchange Gateway
//!
//! Implements the exchange gateway port over `tokio-tungstenite`. One
//! session task runs per exchange, multiplexing every ticker subscription
//! for that exchange over a single connection:
//!
//! - subscriptions are registered with the session task and replayed after
//!   every reconnect, so callers never observe connection churn
//! - incoming ticker frames are decoded and routed to the callback
//!   registered for their symbol, in arrival order
//! - reconnection uses exponential backoff with jitter ([`ReconnectPolicy`])
//!
//! Endpoints are configured per exchange, either directly on
//! [`WsGatewayConfig`] or through `TICKER_WS_ENDPOINT_<NAME>` environment
//! variables. An exchange without an endpoint fails session construction,
//! which the collector isolates to that exchange's symbols.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    CredentialProvider, ExchangeDescriptor, ExchangeGateway, GatewayError, TickerCallback,
    TickerHandle,
};
use crate::domain::ticker::TickRecord;
use crate::infrastructure::config::ReconnectSettings;
use crate::infrastructure::exchange::reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffered subscribe commands per session.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct WsGatewayConfig {
    /// Reconnect tuning shared by all sessions.
    pub reconnect: ReconnectSettings,
    /// Explicit WebSocket endpoint per exchange name.
    pub endpoints: HashMap<String, String>,
}

impl WsGatewayConfig {
    /// Create a configuration with the given reconnect settings and no
    /// explicit endpoints (environment lookup only).
    #[must_use]
    pub fn new(reconnect: ReconnectSettings) -> Self {
        Self {
            reconnect,
            endpoints: HashMap::new(),
        }
    }

    /// Resolve the endpoint for an exchange: explicit entry first, then the
    /// `TICKER_WS_ENDPOINT_<NAME>` environment variable.
    fn resolve_endpoint(&self, exchange: &str) -> Option<String> {
        if let Some(url) = self.endpoints.get(exchange) {
            return Some(url.clone());
        }
        let var = format!(
            "TICKER_WS_ENDPOINT_{}",
            exchange.to_uppercase().replace(['-', '.'], "_")
        );
        std::env::var(var).ok()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// WebSocket implementation of the exchange gateway port.
pub struct WsExchangeGateway {
    config: WsGatewayConfig,
    cancel: CancellationToken,
    sessions: Mutex<HashMap<String, Arc<WsSession>>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl WsExchangeGateway {
    /// Create a gateway; sessions are spawned lazily per exchange.
    #[must_use]
    pub fn new(config: WsGatewayConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            sessions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ExchangeGateway for WsExchangeGateway {
    async fn websocket_handler(
        &self,
        exchange: &ExchangeDescriptor,
        credentials: CredentialProvider,
    ) -> Result<Arc<dyn TickerHandle>, GatewayError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(GatewayError::ShutDown);
        }

        if let Some(existing) = self.sessions.lock().get(&exchange.name) {
            return Ok(Arc::clone(existing) as Arc<dyn TickerHandle>);
        }

        let url = self
            .config
            .resolve_endpoint(&exchange.name)
            .ok_or_else(|| GatewayError::ConnectionFailed {
                exchange: exchange.name.clone(),
                reason: "no WebSocket endpoint configured".to_string(),
            })?;

        tracing::info!(exchange = %exchange.name, url = %url, "Connecting exchange session");
        let (mut ws, _response) =
            connect_async(&url)
                .await
                .map_err(|e| GatewayError::ConnectionFailed {
                    exchange: exchange.name.clone(),
                    reason: e.to_string(),
                })?;

        authenticate(&mut ws, &credentials)
            .await
            .map_err(|e| GatewayError::ConnectionFailed {
                exchange: exchange.name.clone(),
                reason: e.to_string(),
            })?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let session = Arc::new(WsSession {
            exchange: exchange.name.clone(),
            commands: command_tx,
        });

        let runner = SessionRunner {
            exchange: exchange.name.clone(),
            url,
            credentials,
            settings: self.config.reconnect.clone(),
            cancel: self.cancel.child_token(),
        };
        let task = tokio::spawn(runner.run(ws, command_rx));

        self.sessions
            .lock()
            .insert(exchange.name.clone(), Arc::clone(&session));
        self.tasks.lock().push(task);

        tracing::info!(exchange = %exchange.name, "Exchange session connected");
        Ok(session as Arc<dyn TickerHandle>)
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.sessions.lock().clear();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Session task ended abnormally");
                }
            }
        }

        tracing::info!("Exchange gateway shut down");
        Ok(())
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Caller-facing handle for one exchange session.
struct WsSession {
    exchange: String,
    commands: mpsc::Sender<SessionCommand>,
}

enum SessionCommand {
    Subscribe {
        symbol: String,
        callback: TickerCallback,
        ack: oneshot::Sender<Result<(), GatewayError>>,
    },
}

#[async_trait]
impl TickerHandle for WsSession {
    async fn subscribe_ticker(
        &self,
        symbol: &str,
        callback: TickerCallback,
    ) -> Result<(), GatewayError> {
        let session_gone = || GatewayError::ConnectionFailed {
            exchange: self.exchange.clone(),
            reason: "session task ended".to_string(),
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Subscribe {
                symbol: symbol.to_string(),
                callback,
                ack: ack_tx,
            })
            .await
            .map_err(|_| session_gone())?;

        ack_rx.await.map_err(|_| session_gone())?
    }
}

// =============================================================================
// Session Task
// =============================================================================

enum ConnectionEnd {
    Cancelled,
    HandleDropped,
    Lost(String),
}

struct SessionRunner {
    exchange: String,
    url: String,
    credentials: CredentialProvider,
    settings: ReconnectSettings,
    cancel: CancellationToken,
}

impl SessionRunner {
    /// Drive one exchange session: serve the established connection, then
    /// reconnect with backoff until cancelled or the attempt budget is spent.
    async fn run(self, first: WsStream, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut subscriptions: HashMap<String, TickerCallback> = HashMap::new();
        let mut policy = ReconnectPolicy::new(self.settings.clone());
        let mut connection = Some(first);

        loop {
            if let Some(ws) = connection.take() {
                policy.reset();
                match self.serve(ws, &mut commands, &mut subscriptions).await {
                    ConnectionEnd::Cancelled => {
                        tracing::debug!(exchange = %self.exchange, "Session cancelled");
                        return;
                    }
                    ConnectionEnd::HandleDropped => {
                        tracing::debug!(exchange = %self.exchange, "Session handle dropped");
                        return;
                    }
                    ConnectionEnd::Lost(reason) => {
                        tracing::warn!(
                            exchange = %self.exchange,
                            reason = %reason,
                            "Exchange connection lost"
                        );
                    }
                }
            }

            let Some(delay) = policy.next_delay() else {
                tracing::warn!(
                    exchange = %self.exchange,
                    attempts = policy.attempts(),
                    "Reconnect budget exhausted; session ending"
                );
                commands.close();
                while let Ok(SessionCommand::Subscribe { symbol, ack, .. }) = commands.try_recv() {
                    let _ = ack.send(Err(GatewayError::ConnectionFailed {
                        exchange: self.exchange.clone(),
                        reason: format!("session gave up; cannot subscribe {symbol}"),
                    }));
                }
                return;
            };

            tracing::info!(
                exchange = %self.exchange,
                attempt = policy.attempts(),
                delay_ms = delay.as_millis(),
                "Reconnecting exchange session"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = connect_async(&self.url) => result,
            };
            match attempt {
                Ok((mut ws, _response)) => {
                    if let Err(e) = authenticate(&mut ws, &self.credentials).await {
                        tracing::warn!(exchange = %self.exchange, error = %e, "Re-authentication failed");
                        continue;
                    }
                    if let Err(e) = resubscribe(&mut ws, subscriptions.keys()).await {
                        tracing::warn!(exchange = %self.exchange, error = %e, "Resubscribe failed");
                        continue;
                    }
                    connection = Some(ws);
                }
                Err(e) => {
                    tracing::warn!(exchange = %self.exchange, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }

    /// Serve one live connection until it drops or the session ends.
    async fn serve(
        &self,
        mut ws: WsStream,
        commands: &mut mpsc::Receiver<SessionCommand>,
        subscriptions: &mut HashMap<String, TickerCallback>,
    ) -> ConnectionEnd {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return ConnectionEnd::Cancelled;
                }
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Subscribe { symbol, callback, ack }) => {
                            let frame = subscribe_frame(&symbol);
                            match ws.send(Message::Text(frame.into())).await {
                                Ok(()) => {
                                    subscriptions.insert(symbol, callback);
                                    let _ = ack.send(Ok(()));
                                }
                                Err(e) => {
                                    let reason = e.to_string();
                                    let _ = ack.send(Err(GatewayError::SubscriptionRejected {
                                        symbol,
                                        reason: reason.clone(),
                                    }));
                                    return ConnectionEnd::Lost(reason);
                                }
                            }
                        }
                        None => {
                            let _ = ws.close(None).await;
                            return ConnectionEnd::HandleDropped;
                        }
                    }
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch_tick(text.as_str(), subscriptions).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws.send(Message::Pong(data)).await {
                                return ConnectionEnd::Lost(e.to_string());
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            return ConnectionEnd::Lost("server closed connection".to_string());
                        }
                        Some(Ok(_)) => {
                            // Binary, pong, and frame fragments are not part
                            // of the ticker protocol.
                        }
                        Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
                        None => return ConnectionEnd::Lost("stream ended".to_string()),
                    }
                }
            }
        }
    }

    /// Decode a text frame and route it to its symbol's callback.
    async fn dispatch_tick(&self, text: &str, subscriptions: &HashMap<String, TickerCallback>) {
        let Some(tick) = decode_tick(&self.exchange, text) else {
            return;
        };
        if let Some(callback) = subscriptions.get(&tick.symbol) {
            callback(tick).await;
        }
    }
}

/// Send the auth frame when credentials are present; public streams skip it.
async fn authenticate(
    ws: &mut WsStream,
    credentials: &CredentialProvider,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let creds = credentials();
    if creds.is_anonymous() {
        return Ok(());
    }
    let frame = serde_json::json!({
        "op": "auth",
        "key": creds.api_key(),
        "secret": creds.api_secret(),
    })
    .to_string();
    ws.send(Message::Text(frame.into())).await
}

/// Replay subscribe frames for every known symbol after a reconnect.
async fn resubscribe<'a>(
    ws: &mut WsStream,
    symbols: impl Iterator<Item = &'a String>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    for symbol in symbols {
        ws.send(Message::Text(subscribe_frame(symbol).into())).await?;
    }
    Ok(())
}

fn subscribe_frame(symbol: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "channel": "ticker",
        "symbol": symbol,
    })
    .to_string()
}

// =============================================================================
// Wire Decoding
// =============================================================================

/// Incoming ticker frame.
#[derive(Debug, Deserialize)]
struct WireTick {
    channel: String,
    symbol: String,
    price: Decimal,
    #[serde(default)]
    bid: Option<Decimal>,
    #[serde(default)]
    ask: Option<Decimal>,
    #[serde(default)]
    volume: Option<Decimal>,
    /// Seconds since epoch, fractional.
    time: f64,
}

/// Decode a ticker frame; control frames and garbage read as `None`.
fn decode_tick(exchange: &str, text: &str) -> Option<TickRecord> {
    let wire: WireTick = match serde_json::from_str(text) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::debug!(exchange = %exchange, error = %e, "Ignoring non-ticker frame");
            return None;
        }
    };
    if wire.channel != "ticker" {
        return None;
    }

    Some(TickRecord {
        symbol: wire.symbol,
        exchange: exchange.to_string(),
        price: wire.price,
        bid: wire.bid,
        ask: wire.ask,
        volume: wire.volume,
        time: epoch_to_datetime(wire.time),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn epoch_to_datetime(secs: f64) -> DateTime<Utc> {
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole, nanos).unwrap_or_else(Utc::now)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn decodes_full_ticker_frame() {
        let text = r#"{
            "channel": "ticker",
            "symbol": "BTC/USD",
            "price": "50000.25",
            "bid": "50000.00",
            "ask": "50000.50",
            "volume": "123.456",
            "time": 1700000000.5
        }"#;

        let tick = decode_tick("kraken", text).unwrap();
        assert_eq!(tick.exchange, "kraken");
        assert_eq!(tick.symbol, "BTC/USD");
        assert_eq!(tick.price, dec!(50000.25));
        assert_eq!(tick.bid, Some(dec!(50000.00)));
        assert_eq!(tick.ask, Some(dec!(50000.50)));
        assert_eq!(tick.volume, Some(dec!(123.456)));
        assert_eq!(tick.time.timestamp(), 1_700_000_000);
        assert_eq!(tick.time.nanosecond(), 500_000_000);
    }

    #[test]
    fn decodes_minimal_ticker_frame() {
        let text = r#"{"channel":"ticker","symbol":"ETH/USD","price":2500,"time":1700000000}"#;

        let tick = decode_tick("kraken", text).unwrap();
        assert_eq!(tick.price, dec!(2500));
        assert!(tick.bid.is_none());
        assert!(tick.ask.is_none());
        assert!(tick.volume.is_none());
    }

    #[test]
    fn non_ticker_channel_reads_as_none() {
        let text = r#"{"channel":"status","symbol":"BTC/USD","price":1,"time":0}"#;
        assert!(decode_tick("kraken", text).is_none());
    }

    #[test]
    fn garbage_frame_reads_as_none() {
        assert!(decode_tick("kraken", "not json").is_none());
        assert!(decode_tick("kraken", r#"{"op":"subscribed"}"#).is_none());
    }

    #[test]
    fn subscribe_frame_shape() {
        let frame = subscribe_frame("BTC/USD");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["channel"], "ticker");
        assert_eq!(value["symbol"], "BTC/USD");
    }

    #[test]
    fn endpoint_resolution_prefers_explicit_entry() {
        let mut config = WsGatewayConfig::default();
        config
            .endpoints
            .insert("kraken".to_string(), "wss://example/ws".to_string());

        assert_eq!(
            config.resolve_endpoint("kraken").as_deref(),
            Some("wss://example/ws")
        );
        assert_eq!(config.resolve_endpoint("unconfigured-exchange"), None);
    }
}
