//! Connection lifecycle: one server, one state machine
//!
//! Channel open and handshake run inside the retry loop; everything after the
//! handshake (tool discovery, wrapping) runs once.

use crate::config::{ServerConfig, TransportConfig};
use crate::error::BridgeError;
use crate::retry::{RetryObserver, RetryPolicy, retry};
use crate::schema::wrap_remote_tool;
use crate::session::McpSession;
use crate::tool::CallableTool;
use crate::transport::{
    SseTransport, StdioTransport, StreamableHttpTransport, Transport, WebSocketTransport,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deadline for channel open plus handshake, per attempt
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle states of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    /// Retry budget exhausted without a successful handshake
    Failed,
}

/// A provider of callable tools with an explicit lifecycle.
///
/// `close()` is idempotent and safe from every state, including a connection
/// that never connected or already failed.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn connect(&mut self) -> Result<Vec<CallableTool>, BridgeError>;
    async fn close(&mut self) -> Result<(), BridgeError>;
    fn is_connected(&self) -> bool;
    fn name(&self) -> &str;
    fn state(&self) -> ConnectionState;
}

/// Connection to a single tool server over one transport
pub struct ServerConnection {
    name: String,
    config: ServerConfig,
    policy: RetryPolicy,
    handshake_timeout: Duration,
    state: ConnectionState,
    session: Option<Arc<McpSession>>,
}

impl ServerConnection {
    /// Build from a validated single-server config; retry overrides in the
    /// config are layered on `defaults`
    pub fn new(name: impl Into<String>, config: ServerConfig, defaults: &RetryPolicy) -> Self {
        let policy = config.retry_policy(defaults);
        Self {
            name: name.into(),
            config,
            policy,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    /// Override the per-attempt handshake deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect with an optional per-attempt observer on retry backoff
    pub async fn connect_with_observer(
        &mut self,
        observer: Option<RetryObserver<'_>>,
    ) -> Result<Vec<CallableTool>, BridgeError> {
        if self.state == ConnectionState::Connected {
            return Err(BridgeError::protocol(format!(
                "connection '{}' already connected",
                self.name
            )));
        }

        let channel = self.config.to_transport()?;
        self.state = ConnectionState::Connecting;

        // Channel open plus handshake is the retryable unit; a session that
        // fails after initialize is not silently rebuilt. Each attempt runs
        // under a deadline, and expiry is a retryable timeout consuming that
        // attempt
        let deadline = self.handshake_timeout;
        let result = retry(&self.policy, observer, || async {
            tokio::time::timeout(deadline, async {
                let transport = open_transport(&channel).await?;
                let session = McpSession::new(transport);
                session.initialize().await?;
                Ok(Arc::new(session))
            })
            .await
            .map_err(|_| BridgeError::timeout(deadline.as_secs()))?
        })
        .await;

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                self.state = ConnectionState::Failed;
                return Err(e);
            }
        };

        let remote_tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                self.state = ConnectionState::Failed;
                let _ = session.close().await;
                return Err(e);
            }
        };

        let tools: Vec<CallableTool> = remote_tools
            .iter()
            .map(|tool| wrap_remote_tool(&self.name, tool, Arc::clone(&session)))
            .collect();

        info!(
            server = %self.name,
            tools = tools.len(),
            "connected"
        );

        self.session = Some(session);
        self.state = ConnectionState::Connected;
        Ok(tools)
    }
}

#[async_trait]
impl Connection for ServerConnection {
    async fn connect(&mut self) -> Result<Vec<CallableTool>, BridgeError> {
        self.connect_with_observer(None).await
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        if matches!(self.state, ConnectionState::Closed) {
            return Ok(());
        }

        self.state = ConnectionState::Closing;
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        self.state = ConnectionState::Closed;
        debug!(server = %self.name, "closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

async fn open_transport(channel: &TransportConfig) -> Result<Box<dyn Transport>, BridgeError> {
    match channel {
        TransportConfig::Stdio { command, args, env } => {
            Ok(Box::new(StdioTransport::spawn(command, args, env).await?))
        }
        TransportConfig::Sse { url, headers } => {
            Ok(Box::new(SseTransport::connect(url, headers).await?))
        }
        TransportConfig::StreamableHttp { url, headers } => {
            Ok(Box::new(StreamableHttpTransport::new(url, headers)?))
        }
        TransportConfig::WebSocket { url, headers } => {
            Ok(Box::new(WebSocketTransport::connect(url, headers).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable_stdio() -> ServerConfig {
        let mut config = ServerConfig::stdio("definitely-not-a-real-binary-xyz", vec![]);
        config.retry_attempts = Some(2);
        config.retry_delay = Some(0.01);
        config.retry_jitter = Some(false);
        config
    }

    #[tokio::test]
    async fn test_failed_connect_moves_to_failed_state() {
        let mut conn = ServerConnection::new("fs", unreachable_stdio(), &RetryPolicy::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let result = conn.connect().await;
        assert!(matches!(result, Err(BridgeError::Connection { .. })));
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_retry_observer_sees_each_attempt() {
        let observed = AtomicU32::new(0);
        let observer = |_: u32, _: &BridgeError, _: std::time::Duration| {
            observed.fetch_add(1, Ordering::SeqCst);
        };

        let mut conn = ServerConnection::new("fs", unreachable_stdio(), &RetryPolicy::default());
        let _ = conn.connect_with_observer(Some(&observer)).await;

        // 2 attempts means 1 backoff, so the observer fires once
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_safe_from_disconnected_and_failed() {
        let mut conn = ServerConnection::new("fs", unreachable_stdio(), &RetryPolicy::default());
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let mut conn = ServerConnection::new("fs", unreachable_stdio(), &RetryPolicy::default());
        let _ = conn.connect().await;
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out_as_retryable() {
        // `cat` accepts the channel but never answers the handshake
        let mut config = ServerConfig::stdio("cat", vec![]);
        config.retry_attempts = Some(1);

        let mut conn = ServerConnection::new("slow", config, &RetryPolicy::default())
            .with_handshake_timeout(Duration::from_millis(100));

        let result = conn.connect().await;
        match result {
            Err(e @ BridgeError::Timeout { .. }) => assert!(e.is_retryable()),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_connection_reports_name() {
        let conn = ServerConnection::new("billing", unreachable_stdio(), &RetryPolicy::default());
        assert_eq!(conn.name(), "billing");
    }
}
