//! Streamable HTTP transport
//!
//! The modern single-endpoint scheme: every client message is POSTed to one
//! URL, and the response body carries the server's messages either as plain
//! JSON or as a short-lived SSE stream. Preferred over the legacy HTTP+SSE
//! pair for remote servers.

use super::{Transport, parse_sse_event, sse::build_client};
use crate::error::BridgeError;
use crate::protocol::Message;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

pub struct StreamableHttpTransport {
    client: Client,
    url: String,
    connected: bool,
    message_tx: mpsc::UnboundedSender<Message>,
    message_rx: mpsc::UnboundedReceiver<Message>,
}

impl StreamableHttpTransport {
    pub fn new(url: &str, headers: &HashMap<String, String>) -> Result<Self, BridgeError> {
        let client = build_client(headers)?;
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Ok(Self {
            client,
            url: normalize_endpoint(url),
            connected: true,
            message_tx,
            message_rx,
        })
    }

    fn ingest_json(&self, body: &str) -> Result<(), BridgeError> {
        let message: Message = serde_json::from_str(body)?;
        let _ = self.message_tx.send(message);
        Ok(())
    }

    fn ingest_event_stream(&self, body: &str) {
        for event in body.split("\n\n") {
            if let Some(message) = parse_sse_event(event) {
                let _ = self.message_tx.send(message);
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        if !self.connected {
            return Err(BridgeError::connection("HTTP transport not connected"));
        }

        let json = serde_json::to_string(&message)?;
        debug!(url = %self.url, "posting message");

        let response = self
            .client
            .post(&self.url)
            .body(json)
            .send()
            .await
            .map_err(|e| BridgeError::connection(format!("failed to post message: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::server(
                status.as_u16() as i32,
                format!("HTTP {}: {}", status, body),
            ));
        }

        // 202/204 acknowledge notifications without a body
        if status == reqwest::StatusCode::ACCEPTED || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::connection(format!("failed to read response: {}", e)))?;

        if body.trim().is_empty() {
            return Ok(());
        }

        if content_type.starts_with("text/event-stream") {
            self.ingest_event_stream(&body);
        } else {
            self.ingest_json(&body)?;
        }

        Ok(())
    }

    async fn receive(&mut self) -> Result<Message, BridgeError> {
        self.message_rx
            .recv()
            .await
            .ok_or_else(|| BridgeError::connection("message channel closed"))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.connected = false;
        debug!("streamable HTTP transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Servers conventionally mount the endpoint at `/mcp/`; append it when the
/// configured URL does not already point there
fn normalize_endpoint(url: &str) -> String {
    if url.trim_end_matches('/').ends_with("/mcp") {
        url.to_string()
    } else {
        format!("{}/mcp/", url.trim_end_matches('/'))
    }
}
