//! WebSocket transport
//!
//! One socket, JSON messages in text frames. A community-proposed transport,
//! useful for long-lived bidirectional connections to remote servers.

use super::Transport;
use crate::error::BridgeError;
use crate::protocol::Message;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    stream: Option<WsStream>,
    connected: bool,
}

impl WebSocketTransport {
    /// Open the socket, passing configured headers with the handshake
    pub async fn connect(
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self, BridgeError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| BridgeError::connection(format!("invalid WebSocket URL: {}", e)))?;

        for (key, value) in headers {
            match (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(val)) => {
                    request.headers_mut().insert(name, val);
                }
                _ => warn!(header = key, "skipping malformed header"),
            }
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| BridgeError::connection(format!("WebSocket handshake failed: {}", e)))?;

        debug!(url, "WebSocket connected");

        Ok(Self {
            stream: Some(stream),
            connected: true,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::connection("WebSocket not connected"))?;

        let json = serde_json::to_string(&message)?;
        stream
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| BridgeError::connection(format!("WebSocket send failed: {}", e)))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<Message, BridgeError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::connection("WebSocket not connected"))?;

        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(&text).map_err(BridgeError::from);
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return serde_json::from_slice(&bytes).map_err(BridgeError::from);
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.connected = false;
                    return Err(BridgeError::connection("WebSocket closed by server"));
                }
                // Pings are answered by the protocol layer; skip control frames
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(BridgeError::connection(format!(
                        "WebSocket receive failed: {}",
                        e
                    )));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.connected = false;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("WebSocket close handshake failed: {}", e);
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:9", &HashMap::new()).await;
        assert!(matches!(result, Err(BridgeError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let mut transport = WebSocketTransport {
            stream: None,
            connected: false,
        };
        let result = transport
            .send(Message::Notification(crate::protocol::Notification::new("x")))
            .await;
        assert!(matches!(result, Err(BridgeError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_close_without_connection_is_ok() {
        let mut transport = WebSocketTransport {
            stream: None,
            connected: false,
        };
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }
}
