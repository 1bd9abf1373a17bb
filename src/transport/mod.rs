//! Transport channels for reaching tool servers
//!
//! Each transport moves JSON-RPC [`Message`]s over a different channel:
//!
//! - **stdio**: subprocess standard streams, newline-delimited JSON
//! - **sse**: legacy HTTP+SSE pair of endpoints (deprecated)
//! - **streamable_http**: single bidirectional HTTP endpoint
//! - **websocket**: one socket, text frames
//!
//! All of them converge on the same handshake and tool-discovery logic in
//! [`crate::session::McpSession`].

pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod websocket;

pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable_http::StreamableHttpTransport;
pub use websocket::WebSocketTransport;

use crate::error::BridgeError;
use crate::protocol::Message;
use async_trait::async_trait;

/// Bidirectional JSON-RPC channel to a tool server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message
    async fn send(&mut self, message: Message) -> Result<(), BridgeError>;

    /// Receive the next message
    async fn receive(&mut self) -> Result<Message, BridgeError>;

    /// Close the channel; must be idempotent
    async fn close(&mut self) -> Result<(), BridgeError>;

    /// Whether the channel is currently usable
    fn is_connected(&self) -> bool;
}

/// Parse a single SSE event body into a message, ignoring heartbeats and
/// unparseable payloads
pub(crate) fn parse_sse_event(event: &str) -> Option<Message> {
    let mut data = String::new();

    for line in event.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim());
        }
    }

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<Message>(&data) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("failed to parse SSE message: {} - data: {}", e, data);
            None
        }
    }
}

/// Extract the `event:` field of an SSE event, if any
pub(crate) fn sse_event_type(event: &str) -> Option<&str> {
    event
        .lines()
        .find_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_event_valid_response() {
        let event = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}";
        let msg = parse_sse_event(event).unwrap();
        assert!(msg.is_response());
    }

    #[test]
    fn test_parse_sse_event_heartbeat_ignored() {
        assert!(parse_sse_event("event: heartbeat").is_none());
    }

    #[test]
    fn test_parse_sse_event_garbage_ignored() {
        assert!(parse_sse_event("data: not json at all").is_none());
    }

    #[test]
    fn test_sse_event_type() {
        assert_eq!(sse_event_type("event: endpoint\ndata: /messages"), Some("endpoint"));
        assert_eq!(sse_event_type("data: {}"), None);
    }
}
