//! Network transports for the broker connection.
//!
//! Architecture:
//! - [`NetworkTransport`] implements [`TransportSocket`] over a background
//!   task.  `open` spawns the task; the task negotiates a connection and then
//!   pumps text both ways until either side closes.
//! - Outbound text travels from `send` to the task over an `mpsc` channel.
//! - Inbound text and lifecycle changes are reported through the
//!   [`TransportEvents`] handle supplied to `open`.
//!
//! # Fallback negotiation
//!
//! Native WebSocket upgrades are sometimes blocked by proxies.  The task tries
//! each configured [`TransportStrategy`] in order and settles on the first
//! that opens:
//!
//! | Strategy           | URL                                              |
//! |--------------------|--------------------------------------------------|
//! | `websocket`        | `ws://host/chat/websocket`                       |
//! | `sockjs-websocket` | `ws://host/chat/{server}/{session}/websocket`    |
//! | `xhr-polling`      | `http://host/chat/{server}/{session}/xhr(_send)` |
//!
//! A failure after the connection opened never falls back; it is reported as
//! [`TransportEvent::Closed`].

pub mod memory;
pub mod websocket;
pub mod xhr;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::transport::{
    TransportError, TransportEvent, TransportEvents, TransportFactory, TransportSocket,
};

/// One way of reaching the broker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportStrategy {
    /// Plain WebSocket at `{endpoint}/websocket`.
    Websocket,
    /// SockJS session carried over a WebSocket.
    SockjsWebsocket,
    /// SockJS session carried over HTTP long-polling.
    XhrPolling,
}

impl std::fmt::Display for TransportStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportStrategy::Websocket => "websocket",
            TransportStrategy::SockjsWebsocket => "sockjs-websocket",
            TransportStrategy::XhrPolling => "xhr-polling",
        })
    }
}

/// Configuration for [`NetworkTransport`].
#[derive(Debug, Clone)]
pub struct NetworkTransportConfig {
    /// Strategies to try, in order.
    pub strategies: Vec<TransportStrategy>,
    /// Limit on each strategy's connection attempt.
    pub open_timeout: Duration,
    /// Pause between XHR polls that returned no messages.
    pub poll_interval: Duration,
}

impl Default for NetworkTransportConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                TransportStrategy::Websocket,
                TransportStrategy::SockjsWebsocket,
                TransportStrategy::XhrPolling,
            ],
            open_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Instruction from the socket handle to its connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Close,
}

/// An opened connection, ready to pump text.
pub(crate) enum Connection {
    WebSocket(websocket::WsConnection),
    Xhr(xhr::XhrConnection),
}

impl Connection {
    /// Pumps text until the connection ends, returning the reason it ended.
    /// `None` means the client asked to close.
    async fn run(
        self,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        events: &TransportEvents,
    ) -> Option<String> {
        match self {
            Connection::WebSocket(ws) => ws.run(outbound, events).await,
            Connection::Xhr(xhr) => xhr.run(outbound, events).await,
        }
    }
}

/// [`TransportSocket`] over real network connections.
pub struct NetworkTransport {
    config: NetworkTransportConfig,
    http: reqwest::Client,
    open: Arc<AtomicBool>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl NetworkTransport {
    pub fn new(config: NetworkTransportConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            open: Arc::new(AtomicBool::new(false)),
            outbound: None,
            task: None,
        }
    }
}

impl TransportSocket for NetworkTransport {
    fn open(&mut self, endpoint: &str, events: TransportEvents) {
        self.close();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(negotiate(
            endpoint.to_string(),
            self.config.clone(),
            self.http.clone(),
            Arc::clone(&self.open),
            rx,
            events,
        )));
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if let Some(tx) = self.outbound.take() {
            if was_open {
                // Let the task send a close frame and exit on its own.
                let _ = tx.send(Outbound::Close);
                self.task = None;
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for NetworkTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Creates a [`NetworkTransport`] per session, sharing one HTTP client.
pub struct NetworkTransportFactory {
    config: NetworkTransportConfig,
    http: reqwest::Client,
}

impl NetworkTransportFactory {
    pub fn new(config: NetworkTransportConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

impl TransportFactory for NetworkTransportFactory {
    fn create(&self) -> Box<dyn TransportSocket> {
        Box::new(NetworkTransport::new(self.config.clone(), self.http.clone()))
    }
}

// ── Negotiation task ──────────────────────────────────────────────────────────

async fn negotiate(
    endpoint: String,
    config: NetworkTransportConfig,
    http: reqwest::Client,
    open: Arc<AtomicBool>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: TransportEvents,
) {
    let mut failures = Vec::new();

    for strategy in &config.strategies {
        debug!(%strategy, %endpoint, "trying transport");
        let attempt = tokio::time::timeout(
            config.open_timeout,
            connect_strategy(*strategy, &endpoint, &config, &http),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::ConnectFailed(format!(
                "timed out after {:?}",
                config.open_timeout
            )))
        });

        match attempt {
            Ok(connection) => {
                info!(%strategy, %endpoint, "transport open");
                open.store(true, Ordering::Release);
                events.emit(TransportEvent::Opened);

                let ended = connection.run(outbound, &events).await;
                open.store(false, Ordering::Release);
                match ended {
                    Some(reason) => {
                        warn!(%strategy, %reason, "transport closed");
                        events.emit(TransportEvent::Closed { reason });
                    }
                    None => debug!(%strategy, "transport closed by client"),
                }
                return;
            }
            Err(e) => {
                warn!(%strategy, "transport unavailable: {e}");
                failures.push(format!("{strategy}: {e}"));
            }
        }
    }

    let reason = if failures.is_empty() {
        "no transport strategies configured".to_string()
    } else {
        failures.join("; ")
    };
    events.emit(TransportEvent::ConnectFailed { reason });
}

async fn connect_strategy(
    strategy: TransportStrategy,
    endpoint: &str,
    config: &NetworkTransportConfig,
    http: &reqwest::Client,
) -> Result<Connection, TransportError> {
    match strategy {
        TransportStrategy::Websocket => {
            let url = format!("{}/websocket", websocket_base(endpoint)?);
            websocket::connect(&url, false).await.map(Connection::WebSocket)
        }
        TransportStrategy::SockjsWebsocket => {
            let url = format!("{}/websocket", sockjs_session_path(&websocket_base(endpoint)?));
            websocket::connect(&url, true).await.map(Connection::WebSocket)
        }
        TransportStrategy::XhrPolling => {
            let base = sockjs_session_path(endpoint.trim_end_matches('/'));
            xhr::connect(http.clone(), base, config.poll_interval)
                .await
                .map(Connection::Xhr)
        }
    }
}

// ── URL helpers ───────────────────────────────────────────────────────────────

/// Maps an `http(s)` endpoint to its `ws(s)` equivalent.
///
/// # Errors
///
/// Returns [`TransportError::ConnectFailed`] for any other scheme.
pub fn websocket_base(endpoint: &str) -> Result<String, TransportError> {
    let endpoint = endpoint.trim_end_matches('/');
    if let Some(rest) = endpoint.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if let Some(rest) = endpoint.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(endpoint.to_string())
    } else {
        Err(TransportError::ConnectFailed(format!(
            "unsupported endpoint scheme: {endpoint}"
        )))
    }
}

/// Appends a random SockJS `{server-id}/{session-id}` pair to `base`.
pub fn sockjs_session_path(base: &str) -> String {
    let server_id = Uuid::new_v4().as_u128() % 1000;
    let session_id = Uuid::new_v4().simple();
    format!("{base}/{server_id:03}/{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_base_maps_schemes() {
        assert_eq!(
            websocket_base("http://localhost:8080/chat/").unwrap(),
            "ws://localhost:8080/chat"
        );
        assert_eq!(
            websocket_base("https://chat.example.com/chat").unwrap(),
            "wss://chat.example.com/chat"
        );
        assert_eq!(websocket_base("ws://h/chat").unwrap(), "ws://h/chat");
        assert!(websocket_base("ftp://h/chat").is_err());
    }

    #[test]
    fn test_sockjs_session_path_shape() {
        // Arrange / Act
        let path = sockjs_session_path("ws://h/chat");

        // Assert
        let rest = path.strip_prefix("ws://h/chat/").unwrap();
        let (server, session) = rest.split_once('/').unwrap();
        assert_eq!(server.len(), 3);
        assert!(server.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(session.len(), 32);
    }

    #[test]
    fn test_strategy_names_match_config_spelling() {
        let parsed: Vec<TransportStrategy> =
            serde_json::from_str(r#"["websocket","sockjs-websocket","xhr-polling"]"#).unwrap();
        assert_eq!(parsed, NetworkTransportConfig::default().strategies);
        assert_eq!(TransportStrategy::SockjsWebsocket.to_string(), "sockjs-websocket");
    }

    #[tokio::test]
    async fn test_send_before_open_is_not_connected() {
        let mut transport =
            NetworkTransport::new(NetworkTransportConfig::default(), reqwest::Client::new());
        assert_eq!(transport.send("x"), Err(TransportError::NotConnected));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_all_strategies_failing_reports_connect_failed() {
        // Arrange: nothing listens on this port
        let config = NetworkTransportConfig {
            open_timeout: Duration::from_secs(2),
            ..NetworkTransportConfig::default()
        };
        let mut transport = NetworkTransport::new(config, reqwest::Client::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        transport.open("http://127.0.0.1:9/chat", TransportEvents::new(4, tx));
        let (generation, event) = rx.recv().await.unwrap();

        // Assert
        assert_eq!(generation, 4);
        match event {
            TransportEvent::ConnectFailed { reason } => {
                assert!(reason.contains("websocket"));
                assert!(reason.contains("xhr-polling"));
            }
            other => panic!("expected ConnectFailed, got {other:?}"),
        }
    }
}
