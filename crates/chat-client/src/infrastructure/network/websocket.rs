//! WebSocket connections, native and SockJS-framed.
//!
//! A native connection carries broker frames as WebSocket text messages.  A
//! SockJS connection wraps them: the server opens with `o`, sends `h`
//! heartbeats and `a[...]` message arrays, and ends with `c[code,"reason"]`;
//! the client sends JSON string arrays.

use chat_core::protocol::{decode_sockjs_frame, encode_sockjs_messages, SockJsFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::Outbound;
use crate::application::transport::{TransportError, TransportEvent, TransportEvents};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open WebSocket, ready to pump.
pub(crate) struct WsConnection {
    stream: WsStream,
    sockjs: bool,
}

/// Opens a WebSocket to `url`.  For SockJS, also waits for the server's open
/// frame.
pub(crate) async fn connect(url: &str, sockjs: bool) -> Result<WsConnection, TransportError> {
    let (mut stream, response) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed(format!("{url}: {e}")))?;
    debug!(url, status = %response.status(), "websocket upgraded");

    if sockjs {
        await_sockjs_open(&mut stream).await?;
    }
    Ok(WsConnection { stream, sockjs })
}

async fn await_sockjs_open(stream: &mut WsStream) -> Result<(), TransportError> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let Some(text) = message_text(message) else {
            continue;
        };
        match decode_sockjs_frame(&text) {
            Ok(SockJsFrame::Open) => return Ok(()),
            Ok(SockJsFrame::Heartbeat) => continue,
            Ok(SockJsFrame::Close { code, reason }) => {
                return Err(TransportError::ConnectFailed(format!(
                    "SockJS session refused ({code}): {reason}"
                )))
            }
            Ok(SockJsFrame::Messages(_)) => {
                return Err(TransportError::ConnectFailed(
                    "SockJS messages before open frame".to_string(),
                ))
            }
            Err(e) => return Err(TransportError::ConnectFailed(e.to_string())),
        }
    }
    Err(TransportError::ConnectFailed(
        "stream ended before SockJS open frame".to_string(),
    ))
}

impl WsConnection {
    /// Pumps until either side closes.  Returns `None` when the client asked
    /// to close, otherwise the reason the connection ended.
    pub(crate) async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        events: &TransportEvents,
    ) -> Option<String> {
        let sockjs = self.sockjs;
        let (mut sink, mut stream) = self.stream.split();

        loop {
            tokio::select! {
                out = outbound.recv() => match out {
                    Some(Outbound::Text(text)) => {
                        let payload = if sockjs {
                            encode_sockjs_messages(&[text.as_str()])
                        } else {
                            text
                        };
                        if let Err(e) = sink.send(Message::Text(payload.into())).await {
                            return Some(format!("send failed: {e}"));
                        }
                    }
                    Some(Outbound::Close) | None => {
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            trace!("close frame not sent: {e}");
                        }
                        return None;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return Some(reason);
                    }
                    Some(Ok(message)) => {
                        let Some(text) = message_text(message) else {
                            continue;
                        };
                        if let Some(reason) = dispatch(&text, sockjs, events) {
                            return Some(reason);
                        }
                    }
                    Some(Err(e)) => return Some(e.to_string()),
                    None => return Some("stream ended".to_string()),
                },
            }
        }
    }
}

/// Forwards one inbound WebSocket text message.  Returns a reason when the
/// message ends the session.
fn dispatch(text: &str, sockjs: bool, events: &TransportEvents) -> Option<String> {
    if !sockjs {
        events.emit(TransportEvent::Message(text.to_string()));
        return None;
    }
    match decode_sockjs_frame(text) {
        Ok(SockJsFrame::Messages(messages)) => {
            for message in messages {
                events.emit(TransportEvent::Message(message));
            }
            None
        }
        Ok(SockJsFrame::Heartbeat) | Ok(SockJsFrame::Open) => None,
        Ok(SockJsFrame::Close { code, reason }) => {
            Some(format!("SockJS session closed ({code}): {reason}"))
        }
        Err(e) => {
            warn!("ignoring malformed SockJS frame: {e}");
            None
        }
    }
}

/// Text content of a data message; `None` for control frames.
fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!("ignoring non-UTF-8 binary message");
                None
            }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn events() -> (TransportEvents, mpsc::UnboundedReceiver<(u64, TransportEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TransportEvents::new(1, tx), rx)
    }

    #[test]
    fn test_dispatch_native_forwards_text_verbatim() {
        let (events, mut rx) = events();
        assert!(dispatch("MESSAGE\n\n\0", false, &events).is_none());
        assert_eq!(
            rx.try_recv().unwrap().1,
            TransportEvent::Message("MESSAGE\n\n\0".into())
        );
    }

    #[test]
    fn test_dispatch_sockjs_unwraps_message_array() {
        let (events, mut rx) = events();
        assert!(dispatch(r#"a["one","two"]"#, true, &events).is_none());
        assert_eq!(rx.try_recv().unwrap().1, TransportEvent::Message("one".into()));
        assert_eq!(rx.try_recv().unwrap().1, TransportEvent::Message("two".into()));
    }

    #[test]
    fn test_dispatch_sockjs_close_ends_session() {
        let (events, _rx) = events();
        let reason = dispatch(r#"c[3000,"Go away!"]"#, true, &events).unwrap();
        assert!(reason.contains("3000"));
    }

    #[tokio::test]
    async fn test_sockjs_connection_round_trip_over_loopback() {
        // Arrange: a SockJS-speaking echo peer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text("o".into())).await.unwrap();
            let Some(Ok(Message::Text(sent))) = ws.next().await else {
                panic!("expected client text");
            };
            let sent: Vec<String> = serde_json::from_str(&sent.to_string()).unwrap();
            let echoed = format!("a{}", serde_json::to_string(&sent).unwrap());
            ws.send(Message::Text(echoed.into())).await.unwrap();
            ws.send(Message::Text(r#"c[3000,"done"]"#.into())).await.unwrap();
        });

        // Act
        let conn = connect(&format!("ws://{addr}/chat/000/abc/websocket"), true)
            .await
            .unwrap();
        let (tx_out, rx_out) = mpsc::unbounded_channel();
        tx_out.send(Outbound::Text("SEND\n\nhi\0".into())).unwrap();
        let (events, mut rx) = events();
        let ended = conn.run(rx_out, &events).await;

        // Assert
        assert_eq!(
            rx.try_recv().unwrap().1,
            TransportEvent::Message("SEND\n\nhi\0".into())
        );
        assert!(ended.unwrap().contains("done"));
        server.await.unwrap();
    }
}
