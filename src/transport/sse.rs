//! Legacy HTTP+SSE transport
//!
//! The old two-endpoint scheme: a GET event stream for server-to-client
//! messages and a separate POST endpoint for client-to-server messages. The
//! server may announce its POST endpoint in an `endpoint` event; otherwise
//! `<url>/messages` is assumed. Deprecated in favor of streamable HTTP and
//! kept for compatibility with older servers.

use super::{Transport, parse_sse_event, sse_event_type};
use crate::error::BridgeError;
use crate::protocol::Message;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// Bound on establishing the TCP connection; requests themselves are not
/// bounded because the GET stream is long-lived
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SseTransport {
    client: Client,
    /// POST endpoint; updated when the server sends an `endpoint` event
    post_url: watch::Receiver<String>,
    connected: Arc<AtomicBool>,
    message_rx: mpsc::Receiver<Message>,
    listener: Option<tokio::task::JoinHandle<()>>,
}

impl SseTransport {
    /// Open the event stream and start listening
    pub async fn connect(
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self, BridgeError> {
        let client = build_client(headers)?;

        let response = client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeError::timeout(CONNECT_TIMEOUT.as_secs())
                } else {
                    BridgeError::connection(format!("failed to open SSE stream: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(BridgeError::connection(format!(
                "SSE stream rejected with status {}",
                response.status()
            )));
        }

        let connected = Arc::new(AtomicBool::new(true));
        let (message_tx, message_rx) = mpsc::channel(100);
        let default_post = format!("{}/messages", url.trim_end_matches('/'));
        let (post_tx, post_rx) = watch::channel(default_post);
        let origin = origin_of(url);

        let listener_connected = Arc::clone(&connected);
        let listener = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while listener_connected.load(Ordering::SeqCst) {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        if let Ok(text) = String::from_utf8(chunk.to_vec()) {
                            buffer.push_str(&text);

                            while let Some(event_end) = buffer.find("\n\n") {
                                let event = buffer[..event_end].to_string();
                                buffer = buffer[event_end + 2..].to_string();

                                if sse_event_type(&event) == Some("endpoint") {
                                    if let Some(endpoint) = endpoint_from_event(&event, &origin) {
                                        debug!(endpoint, "server announced message endpoint");
                                        let _ = post_tx.send(endpoint);
                                    }
                                    continue;
                                }

                                if let Some(message) = parse_sse_event(&event) {
                                    if message_tx.send(message).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("SSE stream error: {}", e);
                        break;
                    }
                    None => {
                        debug!("SSE stream ended");
                        break;
                    }
                }
            }

            listener_connected.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            client,
            post_url: post_rx,
            connected,
            message_rx,
            listener: Some(listener),
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::connection("SSE transport not connected"));
        }

        let json = serde_json::to_string(&message)?;
        let url = self.post_url.borrow().clone();

        let response = self
            .client
            .post(&url)
            .body(json)
            .send()
            .await
            .map_err(|e| BridgeError::connection(format!("failed to post message: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BridgeError::server(
                status.as_u16() as i32,
                format!("HTTP {}: {}", status, body),
            ))
        }
    }

    async fn receive(&mut self) -> Result<Message, BridgeError> {
        self.message_rx
            .recv()
            .await
            .ok_or_else(|| BridgeError::connection("SSE stream closed"))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
        debug!("SSE transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

pub(crate) fn build_client(headers: &HashMap<String, String>) -> Result<Client, BridgeError> {
    let mut header_map = reqwest::header::HeaderMap::new();
    header_map.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    header_map.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json, text/event-stream"),
    );

    for (key, value) in headers {
        if let (Ok(name), Ok(val)) = (
            reqwest::header::HeaderName::try_from(key.as_str()),
            reqwest::header::HeaderValue::try_from(value.as_str()),
        ) {
            header_map.insert(name, val);
        } else {
            warn!(header = key, "skipping malformed header");
        }
    }

    // A whole-request timeout would kill long-lived event streams, so only
    // the TCP connect is bounded here; the handshake deadline lives in the
    // connection layer
    Client::builder()
        .default_headers(header_map)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| BridgeError::connection(format!("failed to build HTTP client: {}", e)))
}

/// `scheme://host[:port]` portion of a URL, used to resolve relative
/// endpoint announcements
fn origin_of(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        if let Some(path_start) = rest.find('/') {
            return url[..scheme_end + 3 + path_start].to_string();
        }
    }
    url.trim_end_matches('/').to_string()
}

fn endpoint_from_event(event: &str, origin: &str) -> Option<String> {
    let data: String = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    if data.is_empty() {
        return None;
    }

    if data.starts_with("http://") || data.starts_with("https://") {
        Some(data)
    } else {
        Some(format!("{}/{}", origin, data.trim_start_matches('/')))
    }
}
