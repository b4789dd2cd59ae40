//! SockJS XHR polling transport.
//!
//! The session lives at `{endpoint}/{server-id}/{session-id}`.  The client
//! receives by POSTing to `.../xhr` (each response is one SockJS frame ending
//! in `\n`) and sends by POSTing a JSON string array to `.../xhr_send`.

use std::time::Duration;

use chat_core::protocol::{decode_sockjs_frame, encode_sockjs_messages, SockJsFrame};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::Outbound;
use crate::application::transport::{TransportError, TransportEvent, TransportEvents};

const SOCKJS_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// An open XHR polling session.
pub(crate) struct XhrConnection {
    http: reqwest::Client,
    base: String,
    poll_interval: Duration,
}

/// Opens a SockJS session at `base` and waits for its open frame.
pub(crate) async fn connect(
    http: reqwest::Client,
    base: String,
    poll_interval: Duration,
) -> Result<XhrConnection, TransportError> {
    let body = poll(&http, &base)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    match decode_sockjs_frame(&body) {
        Ok(SockJsFrame::Open) => {
            debug!(%base, "SockJS XHR session open");
            Ok(XhrConnection {
                http,
                base,
                poll_interval,
            })
        }
        Ok(other) => Err(TransportError::ConnectFailed(format!(
            "expected SockJS open frame, got {other:?}"
        ))),
        Err(e) => Err(TransportError::ConnectFailed(e.to_string())),
    }
}

async fn poll(http: &reqwest::Client, base: &str) -> Result<String, TransportError> {
    let response = http
        .post(format!("{base}/xhr"))
        .send()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Io(format!("poll returned HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

impl XhrConnection {
    /// Pumps until either side closes.  Returns `None` when the client asked
    /// to close, otherwise the reason the session ended.
    pub(crate) async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        events: &TransportEvents,
    ) -> Option<String> {
        let mut receiver = tokio::spawn(receive_loop(
            self.http.clone(),
            self.base.clone(),
            self.poll_interval,
            events.clone(),
        ));

        let ended = loop {
            tokio::select! {
                out = outbound.recv() => match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = self.send(&text).await {
                            break Some(format!("send failed: {e}"));
                        }
                    }
                    Some(Outbound::Close) | None => break None,
                },
                finished = &mut receiver => {
                    break Some(finished.unwrap_or_else(|e| format!("receive task failed: {e}")));
                }
            }
        };
        receiver.abort();
        ended
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .post(format!("{}/xhr_send", self.base))
            .header(CONTENT_TYPE, SOCKJS_CONTENT_TYPE)
            .body(encode_sockjs_messages(&[text]))
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Io(format!("xhr_send returned HTTP {status}")))
        }
    }
}

/// Polls until the session closes; returns the reason.
async fn receive_loop(
    http: reqwest::Client,
    base: String,
    poll_interval: Duration,
    events: TransportEvents,
) -> String {
    loop {
        let body = match poll(&http, &base).await {
            Ok(body) => body,
            Err(e) => return e.to_string(),
        };

        let mut delivered = false;
        for line in body.lines().filter(|l| !l.is_empty()) {
            match decode_sockjs_frame(line) {
                Ok(SockJsFrame::Messages(messages)) => {
                    delivered = true;
                    for message in messages {
                        events.emit(TransportEvent::Message(message));
                    }
                }
                Ok(SockJsFrame::Close { code, reason }) => {
                    return format!("SockJS session closed ({code}): {reason}");
                }
                Ok(SockJsFrame::Heartbeat) | Ok(SockJsFrame::Open) => {}
                Err(e) => warn!("ignoring malformed SockJS frame: {e}"),
            }
        }
        if !delivered {
            tokio::time::sleep(poll_interval).await;
        }
    }
}
